use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::{Result, StandfastError};
use crate::config::Config;
use crate::domain::TargetSpec;
use crate::fetcher::{Fetcher, PageFetcher, RetryPolicy, RetryingFetcher};
use crate::pipeline::{Pipeline, RunReport};
use crate::remote::{RemoteBackend, RemoteSync, CREDENTIALS_ENV, FOLDER_ENV};
use crate::store::JsonFileStore;
use crate::writer::LocalWriter;

pub struct AppContext {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub writer: LocalWriter,
    pub remote: Option<RemoteSync>,
    pub targets: Vec<TargetSpec>,
}

impl AppContext {
    /// Wire up the fetcher, writer and remote backend from `config`.
    /// Remote sync is disabled (and says so) when no backend is configured.
    pub fn new(config: Config) -> Result<Self> {
        let page_fetcher = PageFetcher::new(&config.fetch, config.browser.clone())?;
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(RetryingFetcher::new(
            page_fetcher,
            RetryPolicy::from_config(&config.fetch),
        ));

        let backend = RemoteBackend::resolve(&config.remote, |key| std::env::var(key).ok());
        let remote = connect_remote(backend);

        Ok(Self::with_parts(config, fetcher, remote))
    }

    /// Assemble a context from ready-made parts.
    pub fn with_parts(
        config: Config,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        remote: Option<RemoteSync>,
    ) -> Self {
        let writer = LocalWriter::new(config.output_dir.clone());
        let targets = config.targets();
        Self {
            config,
            fetcher,
            writer,
            remote,
            targets,
        }
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn target(&self, name: &str) -> Result<&TargetSpec> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| StandfastError::UnknownTarget(name.to_string()))
    }

    pub fn fingerprint_store(&self, target: &str) -> Result<JsonFileStore> {
        JsonFileStore::open(self.config.fingerprint_path(target))
    }

    /// Run one target end to end. Errors only when the target is unknown or
    /// its fingerprint store cannot be opened; everything else is reported.
    /// See [`run_reported`](Self::run_reported) for the infallible form.
    pub async fn run_target(&self, name: &str) -> Result<RunReport> {
        let target = self.target(name)?;
        let store = self.fingerprint_store(name)?;
        let pipeline = Pipeline::new(
            target,
            self.fetcher.as_ref(),
            &self.writer,
            self.remote.as_ref(),
            store,
        );
        Ok(pipeline.run().await)
    }

    /// Like [`run_target`](Self::run_target), but a target that cannot
    /// start comes back as an aborted report instead of an error.
    pub async fn run_reported(&self, name: &str) -> RunReport {
        match self.run_target(name).await {
            Ok(report) => report,
            Err(e) => {
                warn!("[{}] {} could not run: {}", e.kind(), name, e);
                RunReport::aborted(name, &e)
            }
        }
    }

    /// Run every target in order. One broken target never stops the rest.
    pub async fn run_all(&self) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            reports.push(self.run_reported(&target.name).await);
        }
        reports
    }
}

/// Connect the resolved backend. Any failure leaves sync disabled so local
/// artifacts are still written.
fn connect_remote(backend: Option<RemoteBackend>) -> Option<RemoteSync> {
    let Some(backend) = backend else {
        warn!(
            "Remote sync disabled: {} and {} are not both set",
            FOLDER_ENV, CREDENTIALS_ENV
        );
        return None;
    };

    match backend.connect() {
        Ok(store) => {
            info!("Remote sync enabled: {}", store.describe());
            Some(RemoteSync::new(store))
        }
        Err(e) => {
            warn!("Remote sync disabled, backend rejected: {}", e);
            None
        }
    }
}
