use crate::app::{AppContext, Result};
use crate::domain::ListingSpec;
use crate::pipeline::RunReport;
use crate::store::FingerprintStore;

pub async fn run_targets(ctx: &AppContext, names: &[String]) -> Result<Vec<RunReport>> {
    // fail fast on typos before any network work
    for name in names {
        ctx.target(name)?;
    }

    let reports = if names.is_empty() {
        ctx.run_all().await
    } else {
        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            reports.push(ctx.run_reported(name).await);
        }
        reports
    };

    for report in &reports {
        println!("{}", report);
        for (kind, count) in &report.failures {
            println!("  {} × {}", count, kind);
        }
    }

    Ok(reports)
}

pub fn list_targets(ctx: &AppContext) {
    for target in &ctx.targets {
        let source = match &target.listing {
            ListingSpec::Html { url, .. } => url.clone(),
            ListingSpec::WaybackCdx { query, .. } => format!("wayback:{}", query),
        };
        let rollup = if target.rollup { ", rollup" } else { "" };
        println!(
            "{} ({}{})\n  {}",
            target.name,
            target.format.extension(),
            rollup,
            source
        );
    }
}

pub fn show_status(ctx: &AppContext) -> Result<()> {
    println!("Output: {}", ctx.writer.root().display());
    match &ctx.remote {
        Some(remote) => println!("Remote: {}", remote.store().describe()),
        None => println!("Remote: disabled"),
    }

    for target in &ctx.targets {
        let store = ctx.fingerprint_store(&target.name)?;
        println!(
            "{}: {} fingerprints\n  {}",
            target.name,
            store.len()?,
            ctx.writer.target_dir(&target.name).display()
        );
    }
    Ok(())
}
