use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    events::PageSnapshot,
    imaging::{self, ImageAdjustments},
    jobs::{JOB_FIX_PAGE_IMAGE, JOB_PAGE_DELETED},
    models::Page,
    paths, pdf,
    schema::{documents, pages},
    state::AppState,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct FixPagePayload {
    page_id: Uuid,
}

/// Re-runs the fix pipeline for one page with the admin's manual
/// adjustments and rewrites the fixed single-page PDF.
pub struct FixPageImageJob;

impl FixPageImageJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for FixPageImageJob {
    fn job_type(&self) -> &'static str {
        JOB_FIX_PAGE_IMAGE
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: FixPagePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid fix-page payload: {err}"),
                }
            }
        };

        let state_clone = state.clone();
        let page = match task::spawn_blocking(move || load_page(state_clone, payload.page_id)).await
        {
            Ok(Ok(page)) => page,
            Ok(Err(err)) => return JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "page load panicked");
                return JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        let adjustments: ImageAdjustments = match &page.image_properties {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(adjustments) => adjustments,
                Err(err) => {
                    return JobExecution::Failed {
                        error: format!("malformed image properties: {err}"),
                    }
                }
            },
            None => {
                info!(page_id = %page.id, "no image properties to apply");
                return JobExecution::Success;
            }
        };
        if adjustments.is_noop() {
            info!(page_id = %page.id, "image properties are a no-op");
            return JobExecution::Success;
        }

        let source = paths::original_doc_path(
            page.company_id,
            page.dashboard_id,
            page.applicant_id,
            &format!("{}.jpeg", page.name),
        );
        let bytes = match state.storage.get_object(&source).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "original fetch failed; will retry");
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err.to_string(),
                };
            }
        };

        let fixed_pdf = match task::spawn_blocking(move || -> Result<Vec<u8>, String> {
            let image = imaging::decode(&bytes).map_err(|err| err.to_string())?;
            let fixed = imaging::apply_adjustments(image, &adjustments)
                .map_err(|err| err.to_string())?;
            let jpeg = imaging::encode_jpeg(&fixed).map_err(|err| err.to_string())?;
            pdf::jpeg_to_pdf(&jpeg, fixed.width(), fixed.height()).map_err(|err| err.to_string())
        })
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => return JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "fix pipeline panicked");
                return JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        let destination = paths::fixed_doc_path(
            page.company_id,
            page.dashboard_id,
            page.applicant_id,
            &format!("{}.pdf", page.name),
        );
        if let Err(err) = state
            .storage
            .put_object(
                &destination,
                fixed_pdf,
                Some("application/pdf".into()),
                Some("inline; filename=\"fixed.pdf\"".into()),
            )
            .await
        {
            warn!(job_id = %job.id, error = %err, "fixed upload failed; will retry");
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        info!(page_id = %page.id, destination = %destination, "fixed image rewritten");
        JobExecution::Success
    }
}

fn load_page(state: Arc<AppState>, page_id: Uuid) -> Result<Page, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
    pages::table
        .find(page_id)
        .first(&mut conn)
        .map_err(|err| format!("page {page_id} not found: {err:?}"))
}

#[derive(Debug, Deserialize)]
struct PageDeletedPayload {
    page: PageSnapshot,
}

/// Cleans up after a page row is removed: its storage artifacts go away
/// and the parent document's page total drops by one.
pub struct PageDeletedJob;

impl PageDeletedJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for PageDeletedJob {
    fn job_type(&self) -> &'static str {
        JOB_PAGE_DELETED
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: PageDeletedPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid page-deleted payload: {err}"),
                }
            }
        };
        let page = payload.page;

        let original = paths::original_doc_path(
            page.company_id,
            page.dashboard_id,
            page.applicant_id,
            &format!("{}.jpeg", page.name),
        );
        let fixed = paths::fixed_doc_path(
            page.company_id,
            page.dashboard_id,
            page.applicant_id,
            &format!("{}.pdf", page.name),
        );

        // The blobs may already be gone on redelivery; a failed delete is
        // logged, not fatal.
        for key in [&original, &fixed] {
            if let Err(err) = state.storage.delete_object(key).await {
                warn!(job_id = %job.id, key = %key, error = %err, "failed to delete page blob");
            }
        }

        let doc_id = page.doc_id;
        let result = task::spawn_blocking(move || -> Result<(), String> {
            let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
            diesel::update(documents::table.find(doc_id))
                .set(documents::total_pages.eq(documents::total_pages - 1))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "page cleanup panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}
