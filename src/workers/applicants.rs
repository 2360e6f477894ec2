use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    events::ApplicantSnapshot,
    jobs::{JOB_APPLICANT_DELETED, JOB_APPLICANT_UPDATED},
    lifecycle::{
        plan_applicant_status, ApplicantCounters, ApplicantStatus, ApplicantStatusChange,
    },
    models::{Applicant, Company, Dashboard},
    schema::{applicants, companies, dashboards, forms},
    state::AppState,
};

use super::forms::request_message;
use super::messaging::create_message;
use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct ApplicantUpdatedPayload {
    applicant_id: Uuid,
    previous: ApplicantSnapshot,
}

/// Reacts to applicant counter movement: derives the monotonic applicant
/// status, keeps the dashboard complete/incomplete split current, and
/// re-sends the form link when the resend flag is armed.
pub struct ApplicantUpdatedJob;

impl ApplicantUpdatedJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ApplicantUpdatedJob {
    fn job_type(&self) -> &'static str {
        JOB_APPLICANT_UPDATED
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: ApplicantUpdatedPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid applicant payload: {err}"),
                }
            }
        };

        match task::spawn_blocking(move || refresh_applicant(state, payload)).await {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "applicant refresh panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

fn refresh_applicant(state: Arc<AppState>, payload: ApplicantUpdatedPayload) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let applicant: Applicant = applicants::table
        .find(payload.applicant_id)
        .first(&mut conn)
        .map_err(|err| format!("applicant {} not found: {err:?}", payload.applicant_id))?;

    let prev_status = ApplicantStatus::parse(&payload.previous.status)
        .ok_or_else(|| format!("unknown previous applicant status {:?}", payload.previous.status))?;
    let current_status = ApplicantStatus::parse(&applicant.status)
        .ok_or_else(|| format!("unknown applicant status {:?}", applicant.status))?;

    let prev = ApplicantCounters {
        status: prev_status,
        total_docs: payload.previous.total_docs,
        admin_accepted_docs: payload.previous.admin_accepted_docs,
        accepted_docs: payload.previous.accepted_docs,
    };
    let current = ApplicantCounters {
        status: current_status,
        total_docs: applicant.total_docs,
        admin_accepted_docs: applicant.admin_accepted_docs,
        accepted_docs: applicant.accepted_docs,
    };

    let now = Utc::now().naive_utc();
    match plan_applicant_status(&prev, &current, state.config.allow_status_regression) {
        Some(ApplicantStatusChange::MarkIncomplete) => {
            diesel::update(applicants::table.find(applicant.id))
                .set((
                    applicants::status.eq(ApplicantStatus::Incomplete.as_str()),
                    applicants::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            info!(applicant_id = %applicant.id, "applicant marked incomplete");
        }
        Some(ApplicantStatusChange::MarkComplete) => {
            diesel::update(applicants::table.find(applicant.id))
                .set((
                    applicants::status.eq(ApplicantStatus::Complete.as_str()),
                    applicants::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            diesel::update(dashboards::table.find(applicant.dashboard_id))
                .set((
                    dashboards::complete_applicants_count
                        .eq(dashboards::complete_applicants_count + 1),
                    dashboards::incomplete_applicants_count
                        .eq(dashboards::incomplete_applicants_count - 1),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            info!(applicant_id = %applicant.id, "applicant marked complete");
        }
        Some(ApplicantStatusChange::RegressIncomplete) => {
            diesel::update(applicants::table.find(applicant.id))
                .set((
                    applicants::status.eq(ApplicantStatus::Incomplete.as_str()),
                    applicants::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            diesel::update(dashboards::table.find(applicant.dashboard_id))
                .set((
                    dashboards::complete_applicants_count
                        .eq(dashboards::complete_applicants_count - 1),
                    dashboards::incomplete_applicants_count
                        .eq(dashboards::incomplete_applicants_count + 1),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            warn!(applicant_id = %applicant.id, "applicant regressed to incomplete");
        }
        None => {}
    }

    // Edge-triggered resend: only a false -> true flip sends another link.
    // The flag is cleared by delivery-status propagation, not here.
    if applicant.resend_link && !payload.previous.resend_link {
        resend_form_link(&state, &mut conn, &applicant)?;
    }

    Ok(())
}

fn resend_form_link(
    state: &Arc<AppState>,
    conn: &mut PgConnection,
    applicant: &Applicant,
) -> Result<(), String> {
    let company: Company = companies::table
        .find(applicant.company_id)
        .first(conn)
        .map_err(|err| format!("incorrect company id {}: {err:?}", applicant.company_id))?;
    let dashboard: Dashboard = dashboards::table
        .find(applicant.dashboard_id)
        .first(conn)
        .map_err(|err| format!("incorrect dashboard id {}: {err:?}", applicant.dashboard_id))?;

    let form_id: Uuid = forms::table
        .filter(forms::applicant_id.eq(applicant.id))
        .select(forms::id)
        .first(conn)
        .map_err(|err| format!("no form for applicant {}: {err:?}", applicant.id))?;

    let outbound = request_message(state, &company, &dashboard, applicant, form_id);
    let message_id = create_message(conn, outbound)?;
    info!(applicant_id = %applicant.id, message_id = %message_id, "form link resent");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ApplicantDeletedPayload {
    applicant_id: Uuid,
}

/// Soft deletion: the applicant row stays, the form is flagged so the
/// applicant-facing view stops serving it.
pub struct ApplicantDeletedJob;

impl ApplicantDeletedJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ApplicantDeletedJob {
    fn job_type(&self) -> &'static str {
        JOB_APPLICANT_DELETED
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: ApplicantDeletedPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid applicant payload: {err}"),
                }
            }
        };

        let result = task::spawn_blocking(move || -> Result<(), String> {
            let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
            diesel::update(forms::table.filter(forms::applicant_id.eq(payload.applicant_id)))
                .set((
                    forms::is_deleted.eq(true),
                    forms::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => JobExecution::Failed {
                error: format!("worker panicked: {join_err}"),
            },
        }
    }
}
