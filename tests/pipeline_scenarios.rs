//! End-to-end runs against canned pages and an in-memory remote.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use standfast::app::{AppContext, Result, StandfastError};
use standfast::config::Config;
use standfast::domain::{
    ArtifactFormat, DetailSpec, FetchMode, FieldRule, IdentityRule, ListingSpec, Record,
    TargetSpec,
};
use standfast::fetcher::Fetcher;
use standfast::pipeline::PipelineState;
use standfast::remote::{MemoryStore, RemoteBackend, RemoteConfig, RemoteSync};
use standfast::store::FingerprintStore;

const LISTING_URL: &str = "https://judges.test/find-a-judge";

#[derive(Default)]
struct CannedSite {
    pages: Mutex<HashMap<String, String>>,
}

impl CannedSite {
    fn set(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl Fetcher for CannedSite {
    async fn fetch(&self, url: &str, _mode: &FetchMode) -> Result<String> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| StandfastError::fetch(url, "404 Not Found"))
    }
}

fn judges_target() -> TargetSpec {
    TargetSpec {
        name: "judges".into(),
        listing: ListingSpec::Html {
            url: LISTING_URL.into(),
            mode: FetchMode::Http,
            anchor: ".search-judge__item".into(),
            link: "a".into(),
            base_url: None,
            fields: vec![],
        },
        detail: DetailSpec {
            mode: FetchMode::Http,
            anchor: Some(".m-judge-profile".into()),
            fields: vec![
                FieldRule::text("name", "h1"),
                FieldRule::rows(
                    "appointments",
                    ".m-judge-profile__appointment",
                    vec![
                        FieldRule::text("date", ".m-appointment-date"),
                        FieldRule::text("club_name", ".m-appointment-club"),
                    ],
                ),
            ],
            derived: vec![],
        },
        identity: IdentityRule::Query {
            param: "JudgeId".into(),
        },
        format: ArtifactFormat::Json,
        rollup: false,
    }
}

fn listing(ids: &[&str]) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div class="search-judge__item"><a href="/judge?{}">Judge</a></div>"#,
                id
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", items)
}

fn profile(name: &str, club: &str) -> String {
    format!(
        r#"<html><body><div class="m-judge-profile">
  <h1>{}</h1>
  <div class="m-judge-profile__appointment">
    <span class="m-appointment-date">12 May 2019</span>
    <span class="m-appointment-club">{}</span>
  </div>
</div></body></html>"#,
        name, club
    )
}

fn judge_url(id: &str) -> String {
    format!("https://judges.test/judge?JudgeId={}", id)
}

struct Harness {
    dir: TempDir,
    site: Arc<CannedSite>,
    remote: Arc<MemoryStore>,
    ctx: AppContext,
}

impl Harness {
    fn new(with_remote: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let site = Arc::new(CannedSite::default());
        let remote = Arc::new(MemoryStore::new());

        let config = Config {
            output_dir: dir.path().join("out"),
            state_dir: dir.path().join("state"),
            targets: vec![judges_target()],
            ..Config::default()
        };
        let sync = with_remote.then(|| RemoteSync::new(remote.clone()));
        let ctx = AppContext::with_parts(config, site.clone(), sync);

        site.set(LISTING_URL, &listing(&["JudgeId=A", "JudgeId=B"]));
        site.set(&judge_url("A"), &profile("Ann Smith", "Leeds CS"));
        site.set(&judge_url("B"), &profile("Bob Jones", "Crufts"));

        Self {
            dir,
            site,
            remote,
            ctx,
        }
    }

    fn artifact(&self, id: &str) -> std::path::PathBuf {
        self.dir
            .path()
            .join("out")
            .join("judges")
            .join(format!("judges-{}.json", id))
    }

    fn fingerprint(&self, id: &str) -> Option<String> {
        self.ctx.fingerprint_store("judges").unwrap().get(id).unwrap()
    }
}

#[tokio::test]
async fn scenario_new_records_are_written_committed_and_synced() {
    let h = Harness::new(true);

    let report = h.ctx.run_target("judges").await.unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.new, 2);
    assert_eq!(report.written, 2);
    assert_eq!(report.synced, 2);
    assert!(h.artifact("A").exists());
    assert!(h.artifact("B").exists());
    assert_eq!(h.ctx.fingerprint_store("judges").unwrap().len().unwrap(), 2);
    assert_eq!(h.remote.calls().create, 2);
    assert_eq!(h.remote.names(), vec!["judges-A.json", "judges-B.json"]);

    let records: Vec<Record> = serde_json::from_slice(&fs::read(h.artifact("A")).unwrap()).unwrap();
    assert_eq!(records[0].identity, "A");
    assert_eq!(records[0].field("name").as_text(), Some("Ann Smith"));
}

#[tokio::test]
async fn scenario_rerun_touches_only_the_changed_record() {
    let h = Harness::new(true);
    h.ctx.run_target("judges").await.unwrap();
    let fingerprint_a = h.fingerprint("A");
    let fingerprint_b = h.fingerprint("B");

    // an unchanged record must not be rewritten, so a deleted artifact stays deleted
    fs::remove_file(h.artifact("A")).unwrap();
    h.site.set(&judge_url("B"), &profile("Bob Jones", "Crufts 2024"));

    let report = h.ctx.run_target("judges").await.unwrap();

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.changed, 1);
    assert_eq!(report.written, 1);
    assert_eq!(report.synced, 1);
    assert!(!h.artifact("A").exists());
    assert_eq!(h.fingerprint("A"), fingerprint_a);
    assert_ne!(h.fingerprint("B"), fingerprint_b);

    let calls = h.remote.calls();
    assert_eq!(calls.create, 2);
    assert_eq!(calls.update, 1);
    assert_eq!(
        h.remote.content("judges-B.json"),
        Some(fs::read(h.artifact("B")).unwrap())
    );
}

#[tokio::test]
async fn scenario_unparseable_identity_is_skipped() {
    let h = Harness::new(true);
    h.site.set(
        LISTING_URL,
        &listing(&["JudgeId=A", "Judge=C", "JudgeId=B"]),
    );

    let report = h.ctx.run_target("judges").await.unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.listed, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failures.get("IdentityParseError"), Some(&1));
    assert_eq!(report.new, 2);
    assert!(h.artifact("A").exists());
    assert!(h.artifact("B").exists());
}

#[tokio::test]
async fn scenario_without_credentials_artifacts_are_still_written() {
    assert_eq!(RemoteBackend::resolve(&RemoteConfig::default(), |_| None), None);
    let h = Harness::new(false);

    let report = h.ctx.run_target("judges").await.unwrap();

    assert!(h.ctx.remote.is_none());
    assert_eq!(report.new, 2);
    assert_eq!(report.written, 2);
    assert_eq!(report.synced, 0);
    assert!(report.is_clean());
    assert_eq!(h.remote.calls().find, 0);
    assert!(h.fingerprint("A").is_some());
}

#[tokio::test]
async fn ghost_reference_is_recovered_during_a_run() {
    let h = Harness::new(true);
    h.ctx.run_target("judges").await.unwrap();

    h.remote.mark_ghost("judges-B.json");
    h.site.set(&judge_url("B"), &profile("Bob Jones", "Windsor"));

    let report = h.ctx.run_target("judges").await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.changed, 1);
    assert_eq!(h.remote.count_named("judges-B.json"), 1);
    assert_eq!(
        h.remote.content("judges-B.json"),
        Some(fs::read(h.artifact("B")).unwrap())
    );
}

#[tokio::test]
async fn fingerprints_survive_a_restart() {
    let h = Harness::new(false);
    h.ctx.run_target("judges").await.unwrap();

    let config = h.ctx.config.clone();
    let restarted = AppContext::with_parts(config, h.site.clone(), None);
    let report = restarted.run_target("judges").await.unwrap();

    assert_eq!(report.unchanged, 2);
    assert_eq!(report.written, 0);
}
