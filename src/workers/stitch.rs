use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    jobs::JOB_STITCH_DOCUMENT,
    lifecycle::StitchStatus,
    models::{Document, Page},
    paths, pdf,
    schema::{documents, pages},
    state::AppState,
    storage::ObjectStorage,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct StitchPayload {
    document_id: Uuid,
}

/// Reassembles the accepted pages of one submission generation into the
/// final PDF. Pages from older generations are excluded by the query, not
/// filtered afterwards; a resubmitted document can never pick up stale
/// pages.
pub struct StitchDocumentJob;

impl StitchDocumentJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for StitchDocumentJob {
    fn job_type(&self) -> &'static str {
        JOB_STITCH_DOCUMENT
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: StitchPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid stitch payload: {err}"),
                }
            }
        };

        let state_clone = state.clone();
        let context = match task::spawn_blocking(move || {
            load_stitch_context(state_clone, payload.document_id)
        })
        .await
        {
            Ok(Ok(context)) => context,
            Ok(Err(err)) => return JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "stitch context task panicked");
                return JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        let sources: Vec<String> = context.pages.iter().map(page_pdf_source).collect();
        if sources.is_empty() {
            let error = format!(
                "no pages at generation {} for document {}",
                context.document.submission_count, context.document.id
            );
            warn!(job_id = %job.id, %error, "stitch aborted");
            finish(&state, context.document.id, StitchStatus::Failed, None).await;
            return JobExecution::Failed { error };
        }

        // Whole-or-nothing: a single failed page download discards the run
        // and nothing is written to the final location.
        let merged = match assemble_document(state.storage.as_ref(), &sources).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "stitch failed");
                finish(&state, context.document.id, StitchStatus::Failed, None).await;
                return JobExecution::Failed { error: err };
            }
        };

        let file_name = final_file_name(
            context.document.updated_name.as_deref(),
            &context.document.name,
        );
        let destination = paths::final_doc_path(
            context.document.company_id,
            context.document.dashboard_id,
            context.document.applicant_id,
            &file_name,
        );
        let checksum = hex::encode(Sha256::digest(&merged));

        if let Err(err) = state
            .storage
            .put_object(
                &destination,
                merged,
                Some("application/pdf".into()),
                Some(format!("attachment; filename=\"{file_name}\"")),
            )
            .await
        {
            warn!(job_id = %job.id, error = %err, "final upload failed");
            finish(&state, context.document.id, StitchStatus::Failed, None).await;
            return JobExecution::Failed {
                error: err.to_string(),
            };
        }

        finish(
            &state,
            context.document.id,
            StitchStatus::Succeeded,
            Some(checksum),
        )
        .await;
        info!(
            job_id = %job.id,
            document_id = %context.document.id,
            pages = sources.len(),
            destination = %destination,
            "document stitched"
        );
        JobExecution::Success
    }
}

struct StitchContext {
    document: Document,
    pages: Vec<Page>,
}

fn load_stitch_context(state: Arc<AppState>, document_id: Uuid) -> Result<StitchContext, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let document: Document = documents::table
        .find(document_id)
        .first(&mut conn)
        .map_err(|err| format!("document {document_id} not found: {err:?}"))?;

    diesel::update(documents::table.find(document_id))
        .set(documents::stitch_status.eq(StitchStatus::Pending.as_str()))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let current_pages: Vec<Page> = pages::table
        .filter(pages::doc_id.eq(document_id))
        .filter(pages::submission_count.eq(document.submission_count))
        .order(pages::page_number.asc())
        .load(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    Ok(StitchContext {
        document,
        pages: current_pages,
    })
}

/// Pages submitted as PDFs were stored verbatim under originals/; images
/// got a fixed single-page PDF rendition instead.
pub fn page_pdf_source(page: &Page) -> String {
    let file_name = format!("{}.pdf", page.name);
    if page.submitted_format == "application/pdf" {
        paths::original_doc_path(
            page.company_id,
            page.dashboard_id,
            page.applicant_id,
            &file_name,
        )
    } else {
        paths::fixed_doc_path(
            page.company_id,
            page.dashboard_id,
            page.applicant_id,
            &file_name,
        )
    }
}

pub fn final_file_name(updated_name: Option<&str>, document_name: &str) -> String {
    match updated_name {
        Some(name) => name.to_string(),
        None => format!("{document_name}.pdf"),
    }
}

/// Downloads every source in order and merges them into one document.
pub async fn assemble_document(
    storage: &dyn ObjectStorage,
    sources: &[String],
) -> Result<Vec<u8>, String> {
    let mut inputs = Vec::with_capacity(sources.len());
    for source in sources {
        let bytes = storage
            .get_object(source)
            .await
            .map_err(|err| format!("download {source}: {err}"))?;
        inputs.push(bytes);
    }
    pdf::merge_pdfs(&inputs).map_err(|err| err.to_string())
}

async fn finish(
    state: &Arc<AppState>,
    document_id: Uuid,
    status: StitchStatus,
    checksum: Option<String>,
) {
    let state = state.clone();
    let result = task::spawn_blocking(move || -> Result<(), String> {
        let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
        let now = Utc::now().naive_utc();
        // A failed run keeps the previous checksum: the last successfully
        // uploaded final document is still the one in storage.
        match checksum {
            Some(checksum) => diesel::update(documents::table.find(document_id))
                .set((
                    documents::stitch_status.eq(status.as_str()),
                    documents::final_checksum.eq(Some(checksum)),
                    documents::updated_at.eq(now),
                ))
                .execute(&mut conn),
            None => diesel::update(documents::table.find(document_id))
                .set((
                    documents::stitch_status.eq(status.as_str()),
                    documents::updated_at.eq(now),
                ))
                .execute(&mut conn),
        }
        .map_err(|err| format!("{err:?}"))?;
        Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(document_id = %document_id, error = %err, "failed to record stitch outcome")
        }
        Err(join_err) => {
            error!(document_id = %document_id, error = %join_err, "stitch outcome task panicked")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::final_file_name;

    #[test]
    fn final_name_prefers_the_updated_name() {
        assert_eq!(final_file_name(Some("Passport-v2.pdf"), "passport"), "Passport-v2.pdf");
        assert_eq!(final_file_name(None, "passport"), "passport.pdf");
    }
}
