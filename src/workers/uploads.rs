use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};

use crate::{
    events::{ReviewMetadata, UploadMetadata},
    imaging::{self, ImageAdjustments, QualityVerdict},
    jobs::{JOB_FILE_REVIEW, JOB_PROCESS_SAMPLE, JOB_PROCESS_UPLOAD},
    paths, pdf,
    state::AppState,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct UploadPayload {
    path: String,
    content_type: String,
    metadata: Option<UploadMetadata>,
}

/// Intake for applicant uploads landing in temporary-docs/: images are
/// resized and cleaned up into originals/ and fixed/, PDFs move to
/// originals/ verbatim, and the temporary blob is removed either way.
pub struct ProcessUploadJob;

impl ProcessUploadJob {
    pub fn new() -> Self {
        Self
    }
}

struct ProcessedImage {
    original_jpeg: Vec<u8>,
    fixed_artifact: Vec<u8>,
    fixed_jpeg: Vec<u8>,
    fixed_extension: &'static str,
    fixed_content_type: &'static str,
}

#[async_trait]
impl JobHandler for ProcessUploadJob {
    fn job_type(&self) -> &'static str {
        JOB_PROCESS_UPLOAD
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: UploadPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid upload payload: {err}"),
                }
            }
        };

        let Some(metadata) = payload.metadata else {
            return JobExecution::Failed {
                error: "upload event is missing document metadata".into(),
            };
        };

        let file_name = match payload.path.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return JobExecution::Failed {
                    error: format!("cannot derive file name from {:?}", payload.path),
                }
            }
        };

        if payload.content_type == "application/pdf" {
            return self
                .relocate_pdf(&state, &payload.path, &file_name, &metadata)
                .await;
        }

        if !payload.content_type.starts_with("image/") {
            warn!(job_id = %job.id, content_type = %payload.content_type, "not an applicant image; skipping");
            return JobExecution::Success;
        }

        let bytes = match state.storage.get_object(&payload.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "upload fetch failed; will retry");
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err.to_string(),
                };
            }
        };

        let wants_pdf = metadata.format == "pdf";
        let angle = metadata.angle;
        let processed =
            match task::spawn_blocking(move || process_image(&bytes, wants_pdf, angle)).await {
                Ok(Ok(processed)) => processed,
                Ok(Err(err)) => return JobExecution::Failed { error: err },
                Err(join_err) => {
                    error!(job_id = %job.id, error = %join_err, "image processing panicked");
                    return JobExecution::Failed {
                        error: format!("worker panicked: {join_err}"),
                    };
                }
            };

        // Quality scores are advisory: the verdict is logged for review
        // tooling, never used to block the upload here.
        if let Some(analyzer) = state.analyzer.as_ref() {
            match analyzer
                .analyze(processed.fixed_jpeg.clone(), &file_name)
                .await
            {
                Ok(scores) => {
                    let verdict = imaging::assess_quality(&scores, metadata.submission_count);
                    let accepted = verdict == QualityVerdict::Accepted;
                    info!(
                        job_id = %job.id,
                        brightness = scores.brightness,
                        sharpness = scores.sharpness,
                        contrast = scores.contrast,
                        accepted,
                        "image quality assessed"
                    );
                }
                Err(err) => warn!(job_id = %job.id, error = %err, "image analysis failed"),
            }
        }

        let original_path = paths::original_doc_path(
            metadata.company_id,
            metadata.dashboard_id,
            metadata.applicant_id,
            &format!("{file_name}.jpeg"),
        );
        let fixed_path = paths::fixed_doc_path(
            metadata.company_id,
            metadata.dashboard_id,
            metadata.applicant_id,
            &format!("{file_name}.{}", processed.fixed_extension),
        );

        if let Err(err) = state
            .storage
            .put_object(
                &original_path,
                processed.original_jpeg,
                Some("image/jpeg".into()),
                Some(format!("inline; filename=\"{file_name}.jpeg\"")),
            )
            .await
        {
            warn!(job_id = %job.id, error = %err, "original upload failed; will retry");
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        if let Err(err) = state
            .storage
            .put_object(
                &fixed_path,
                processed.fixed_artifact,
                Some(processed.fixed_content_type.into()),
                Some(format!(
                    "inline; filename=\"{file_name}-fixed.{}\"",
                    processed.fixed_extension
                )),
            )
            .await
        {
            warn!(job_id = %job.id, error = %err, "fixed upload failed; will retry");
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        if let Err(err) = state.storage.delete_object(&payload.path).await {
            warn!(job_id = %job.id, error = %err, "failed to delete temporary upload");
        }

        info!(job_id = %job.id, original = %original_path, fixed = %fixed_path, "upload processed");
        JobExecution::Success
    }
}

impl ProcessUploadJob {
    async fn relocate_pdf(
        &self,
        state: &Arc<AppState>,
        source: &str,
        file_name: &str,
        metadata: &UploadMetadata,
    ) -> JobExecution {
        let destination = paths::original_doc_path(
            metadata.company_id,
            metadata.dashboard_id,
            metadata.applicant_id,
            &format!("{file_name}.pdf"),
        );

        let bytes = match state.storage.get_object(source).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err.to_string(),
                }
            }
        };

        if let Err(err) = state
            .storage
            .put_object(
                &destination,
                bytes,
                Some("application/pdf".into()),
                Some(format!("inline; filename=\"{file_name}.pdf\"")),
            )
            .await
        {
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        if let Err(err) = state.storage.delete_object(source).await {
            warn!(source = %source, error = %err, "failed to delete temporary upload");
        }

        info!(destination = %destination, "pdf upload relocated");
        JobExecution::Success
    }
}

fn process_image(
    bytes: &[u8],
    wants_pdf: bool,
    angle: Option<u16>,
) -> Result<ProcessedImage, String> {
    let decoded = imaging::decode(bytes).map_err(|err| err.to_string())?;
    let resized = imaging::resize_to_upload_width(&decoded);
    let original_jpeg = imaging::encode_jpeg(&resized).map_err(|err| err.to_string())?;

    let mut adjustments = ImageAdjustments::standard();
    adjustments.rotate_right = angle;
    let fixed = imaging::apply_adjustments(resized, &adjustments).map_err(|err| err.to_string())?;
    let fixed_jpeg = imaging::encode_jpeg(&fixed).map_err(|err| err.to_string())?;

    let (fixed_artifact, fixed_extension, fixed_content_type) = if wants_pdf {
        let bytes = pdf::jpeg_to_pdf(&fixed_jpeg, fixed.width(), fixed.height())
            .map_err(|err| err.to_string())?;
        (bytes, "pdf", "application/pdf")
    } else {
        (fixed_jpeg.clone(), "jpeg", "image/jpeg")
    };

    Ok(ProcessedImage {
        original_jpeg,
        fixed_artifact,
        fixed_jpeg,
        fixed_extension,
        fixed_content_type,
    })
}

#[derive(Debug, Deserialize)]
struct SamplePayload {
    path: String,
    content_type: String,
}

/// Converts a freshly uploaded sample (new-samples/) into its servable
/// form under samples/ and removes the staging blob.
pub struct ProcessSampleJob;

impl ProcessSampleJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ProcessSampleJob {
    fn job_type(&self) -> &'static str {
        JOB_PROCESS_SAMPLE
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: SamplePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid sample payload: {err}"),
                }
            }
        };

        let Some(file_name) = payload.path.rsplit('/').next().map(str::to_string) else {
            return JobExecution::Failed {
                error: format!("cannot derive file name from {:?}", payload.path),
            };
        };
        let destination = payload.path.replace("new-samples", "samples");

        let is_image = payload.content_type.starts_with("image/");
        let is_pdf = payload.content_type == "application/pdf";
        if !is_image && !is_pdf {
            warn!(job_id = %job.id, content_type = %payload.content_type, "unsupported sample type; skipping");
            return JobExecution::Success;
        }

        let bytes = match state.storage.get_object(&payload.path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err.to_string(),
                }
            }
        };

        let (converted, content_type, disposition) = if is_image {
            let converted = match task::spawn_blocking(move || -> Result<Vec<u8>, String> {
                let decoded = imaging::decode(&bytes).map_err(|err| err.to_string())?;
                let resized = imaging::resize_to_upload_width(&decoded);
                imaging::encode_jpeg(&resized).map_err(|err| err.to_string())
            })
            .await
            {
                Ok(Ok(converted)) => converted,
                Ok(Err(err)) => return JobExecution::Failed { error: err },
                Err(join_err) => {
                    error!(job_id = %job.id, error = %join_err, "sample conversion panicked");
                    return JobExecution::Failed {
                        error: format!("worker panicked: {join_err}"),
                    };
                }
            };
            (
                converted,
                "image/jpeg",
                format!("inline; filename=\"{file_name}.jpeg\""),
            )
        } else {
            (
                bytes,
                "application/pdf",
                format!("inline; filename=\"{file_name}.pdf\""),
            )
        };

        if let Err(err) = state
            .storage
            .put_object(
                &destination,
                converted,
                Some(content_type.into()),
                Some(disposition),
            )
            .await
        {
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        if let Err(err) = state.storage.delete_object(&payload.path).await {
            warn!(job_id = %job.id, error = %err, "failed to delete staged sample");
        }

        info!(job_id = %job.id, destination = %destination, "sample published");
        JobExecution::Success
    }
}

#[derive(Debug, Deserialize)]
struct FileReviewPayload {
    path: String,
    review: ReviewMetadata,
}

/// Copies a reviewed page file into the accepted/ or rejected/ folder so
/// the admin views serve from a stable location.
pub struct FileReviewJob;

impl FileReviewJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for FileReviewJob {
    fn job_type(&self) -> &'static str {
        JOB_FILE_REVIEW
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: FileReviewPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid file review payload: {err}"),
                }
            }
        };
        let review = &payload.review;

        let destination = match review.status.as_str() {
            "accepted" => paths::accepted_doc_path(
                review.company_id,
                review.dashboard_id,
                review.applicant_id,
                &review.updated_name,
            ),
            "rejected" => paths::rejected_doc_path(
                review.company_id,
                review.dashboard_id,
                review.applicant_id,
                &review.updated_name,
            ),
            other => {
                return JobExecution::Failed {
                    error: format!("unknown review status {other:?}"),
                }
            }
        };

        if let Err(err) = state
            .storage
            .copy_object(&payload.path, &destination)
            .await
        {
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        info!(job_id = %job.id, destination = %destination, status = %review.status, "reviewed file filed");
        JobExecution::Success
    }
}
