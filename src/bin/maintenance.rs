use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use collector::{
    config::AppConfig,
    db,
    lifecycle::DocumentStatus,
    s3,
    schema::documents,
    state::AppState,
    storage::S3Storage,
    workers::reconcile::reconcile_dashboard,
};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("reconcile") => {
            let dashboard_id = args
                .next()
                .context("Usage: maintenance reconcile <dashboard-id>")?;
            let dashboard_id: Uuid = dashboard_id
                .parse()
                .context("dashboard id must be a UUID")?;
            reconcile(dashboard_id).await?;
        }
        Some("backfill-submission-counts") => backfill_submission_counts().await?,
        Some("purge-jobs") => {
            let days: i64 = args
                .next()
                .unwrap_or_else(|| "7".to_string())
                .parse()
                .context("purge-jobs takes an age in days")?;
            purge_jobs(days).await?;
        }
        Some(cmd) => {
            eprintln!(
                "Unknown command: {cmd}\nUsage: maintenance reconcile <dashboard-id> | backfill-submission-counts | purge-jobs [days]"
            );
            std::process::exit(1);
        }
        None => {
            eprintln!(
                "Usage: maintenance reconcile <dashboard-id> | backfill-submission-counts | purge-jobs [days]"
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn reconcile(dashboard_id: Uuid) -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded collector configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let s3_client = s3::build_client(&config).await?;
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let state = Arc::new(AppState::new(pool, config, storage));

    let corrected = tokio::task::spawn_blocking(move || reconcile_dashboard(state, dashboard_id))
        .await
        .context("reconciliation task panicked")?
        .map_err(|err| anyhow!(err))?;

    println!("Reconciliation corrected {corrected} record(s).");
    Ok(())
}

/// One-off repair for rows that predate submission generations: documents
/// that already moved past not-submitted get generation 1, and rejected
/// ones without a rejection payload get a generic one.
async fn backfill_submission_counts() -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let submitted_like = vec![
        DocumentStatus::Submitted.as_str(),
        DocumentStatus::AdminChecked.as_str(),
        DocumentStatus::Accepted.as_str(),
        DocumentStatus::Rejected.as_str(),
    ];

    let bumped = diesel::update(
        documents::table
            .filter(documents::status.eq_any(submitted_like))
            .filter(documents::submission_count.eq(0)),
    )
    .set(documents::submission_count.eq(1))
    .execute(&mut conn)
    .context("failed to backfill submission counts")?;

    let default_rejection = json!({
        "reasons": ["other"],
        "rejectedBy": "admin",
        "rejectedAt": Utc::now().naive_utc(),
        "message": "Please resubmit.",
    });
    let patched = diesel::update(
        documents::table
            .filter(documents::status.eq(DocumentStatus::Rejected.as_str()))
            .filter(documents::rejection.is_null()),
    )
    .set(documents::rejection.eq(default_rejection))
    .execute(&mut conn)
    .context("failed to backfill rejection payloads")?;

    println!("Backfilled {bumped} submission count(s), {patched} rejection payload(s).");
    Ok(())
}

async fn purge_jobs(days: i64) -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let cutoff = (Utc::now() - chrono::Duration::days(days)).naive_utc();
    let deleted = collector::jobs::purge_finished_jobs(&mut conn, cutoff, false)
        .map_err(|err| anyhow!(err.to_string()))?;

    println!("Purged {deleted} finished job(s) older than {days} day(s).");
    Ok(())
}
