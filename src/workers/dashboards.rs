use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    jobs::{enqueue_job, JOB_CREATE_FORM, JOB_PUBLISH_DASHBOARD},
    lifecycle::ApplicantStatus,
    models::{Dashboard, DashboardDocConfig, NewApplicant, RosterEntry},
    schema::{applicants, dashboards},
    state::AppState,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct PublishPayload {
    dashboard_id: Uuid,
}

/// Drains a published dashboard's pending roster into applicant records.
/// Runs on the draft -> published edge and again whenever more applicants
/// are added to an already-published dashboard; clearing the roster makes
/// redelivery harmless.
pub struct PublishDashboardJob;

impl PublishDashboardJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for PublishDashboardJob {
    fn job_type(&self) -> &'static str {
        JOB_PUBLISH_DASHBOARD
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: PublishPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid publish payload: {err}"),
                }
            }
        };

        match task::spawn_blocking(move || publish_dashboard(state, payload.dashboard_id)).await {
            Ok(Ok(created)) => {
                info!(job_id = %job.id, applicants = created, "dashboard roster drained");
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "publish task panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

fn publish_dashboard(state: Arc<AppState>, dashboard_id: Uuid) -> Result<usize, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let dashboard: Dashboard = dashboards::table
        .find(dashboard_id)
        .first(&mut conn)
        .map_err(|err| format!("dashboard {dashboard_id} not found: {err:?}"))?;

    if !dashboard.is_published {
        info!(dashboard_id = %dashboard_id, "dashboard is not published; nothing to do");
        return Ok(0);
    }

    let roster: Vec<RosterEntry> = serde_json::from_value(dashboard.new_applicants.clone())
        .map_err(|err| format!("malformed applicant roster: {err}"))?;
    if roster.is_empty() {
        return Ok(0);
    }

    let required_docs = required_doc_count(&dashboard.docs)?;

    let created = roster.len();
    for entry in roster {
        let applicant = NewApplicant {
            id: Uuid::new_v4(),
            company_id: dashboard.company_id,
            dashboard_id: dashboard.id,
            email: entry.email,
            name: entry
                .name
                .map(|name| serde_json::to_value(name).unwrap_or(json!(null))),
            phone_numbers: entry
                .phone_numbers
                .map(|numbers| serde_json::to_value(numbers).unwrap_or(json!(null))),
            status: ApplicantStatus::NotSubmitted.as_str().to_string(),
            total_docs: required_docs,
            admin_accepted_docs: 0,
            accepted_docs: 0,
            unchecked_optional_docs: 0,
        };
        diesel::insert_into(applicants::table)
            .values(&applicant)
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;

        enqueue_job(
            &mut conn,
            JOB_CREATE_FORM,
            json!({ "applicant_id": applicant.id }),
            None,
        )
        .map_err(|err| err.to_string())?;
    }

    // New applicants count as incomplete until every required document is
    // accepted; the complete/incomplete split always sums to the total.
    diesel::update(dashboards::table.find(dashboard.id))
        .set((
            dashboards::new_applicants.eq(json!([])),
            dashboards::applicants_count.eq(dashboards::applicants_count + created as i32),
            dashboards::incomplete_applicants_count
                .eq(dashboards::incomplete_applicants_count + created as i32),
            dashboards::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    Ok(created)
}

/// New applicants start with a document total equal to the dashboard's
/// required docs; optional docs never count toward completion.
fn required_doc_count(docs: &serde_json::Value) -> Result<i32, String> {
    let configs: HashMap<String, DashboardDocConfig> = serde_json::from_value(docs.clone())
        .map_err(|err| format!("malformed dashboard docs: {err}"))?;
    Ok(configs.values().filter(|config| config.is_required).count() as i32)
}

#[cfg(test)]
mod tests {
    use super::required_doc_count;
    use serde_json::json;

    #[test]
    fn only_required_docs_count_toward_the_total() {
        let docs = json!({
            "passport": { "format": "pdf", "isRequired": true, "docNumber": 1 },
            "visa": { "format": "jpeg", "isRequired": true, "docNumber": 2 },
            "nbi-clearance": { "format": "jpeg", "isRequired": false, "docNumber": 3 },
        });
        assert_eq!(required_doc_count(&docs).unwrap(), 2);
    }

    #[test]
    fn malformed_docs_are_an_error_not_a_default() {
        assert!(required_doc_count(&json!({ "passport": 3 })).is_err());
        assert_eq!(required_doc_count(&json!({})).unwrap(), 0);
    }
}
