use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    jobs::JOB_RECONCILE_COUNTERS,
    lifecycle::{ApplicantStatus, DocumentStatus},
    models::{Applicant, Dashboard},
    schema::{applicants, dashboards, documents, messages},
    state::AppState,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct ReconcilePayload {
    dashboard_id: Uuid,
}

/// The denormalized counters are approximate by design (relative updates,
/// no cross-entity transactions). This job is the repair path: it recounts
/// every applicant's documents, corrects drifted rows, and then rebuilds
/// the dashboard aggregates from the corrected applicants.
pub struct ReconcileCountersJob;

impl ReconcileCountersJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ReconcileCountersJob {
    fn job_type(&self) -> &'static str {
        JOB_RECONCILE_COUNTERS
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: ReconcilePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid reconcile payload: {err}"),
                }
            }
        };

        match task::spawn_blocking(move || reconcile_dashboard(state, payload.dashboard_id)).await {
            Ok(Ok(corrected)) => {
                info!(job_id = %job.id, corrected, "reconciliation finished");
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "reconciliation panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecomputedCounters {
    pub total_docs: i32,
    pub admin_accepted_docs: i32,
    pub accepted_docs: i32,
    pub unchecked_optional_docs: i32,
    pub status: ApplicantStatus,
}

/// Ground truth for one applicant, recounted from its document rows.
pub fn recompute_applicant(docs: &[(bool, DocumentStatus)]) -> RecomputedCounters {
    let mut total_docs = 0;
    let mut admin_accepted_docs = 0;
    let mut accepted_docs = 0;
    let mut unchecked_optional_docs = 0;

    for (is_required, status) in docs {
        if *is_required {
            if *status != DocumentStatus::NotApplicable {
                total_docs += 1;
            }
            match status {
                DocumentStatus::AdminChecked => admin_accepted_docs += 1,
                DocumentStatus::Accepted => {
                    admin_accepted_docs += 1;
                    accepted_docs += 1;
                }
                _ => {}
            }
        } else if *status == DocumentStatus::AdminChecked {
            unchecked_optional_docs += 1;
        }
    }

    let status = if total_docs > 0 && accepted_docs == total_docs {
        ApplicantStatus::Complete
    } else if admin_accepted_docs > 0 {
        ApplicantStatus::Incomplete
    } else {
        ApplicantStatus::NotSubmitted
    };

    RecomputedCounters {
        total_docs,
        admin_accepted_docs,
        accepted_docs,
        unchecked_optional_docs,
        status,
    }
}

pub fn reconcile_dashboard(state: Arc<AppState>, dashboard_id: Uuid) -> Result<usize, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let dashboard: Dashboard = dashboards::table
        .find(dashboard_id)
        .first(&mut conn)
        .map_err(|err| format!("dashboard {dashboard_id} not found: {err:?}"))?;

    let roster: Vec<Applicant> = applicants::table
        .filter(applicants::dashboard_id.eq(dashboard_id))
        .filter(applicants::is_deleted.eq(false))
        .load(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let mut corrected = 0;
    let mut complete = 0;
    let mut actions = 0;
    let now = Utc::now().naive_utc();

    for applicant in &roster {
        let rows: Vec<(bool, String)> = documents::table
            .filter(documents::applicant_id.eq(applicant.id))
            .select((documents::is_required, documents::status))
            .load(&mut conn)
            .map_err(|err| format!("{err:?}"))?;

        let mut docs = Vec::with_capacity(rows.len());
        for (is_required, status) in &rows {
            match DocumentStatus::parse(status) {
                Some(parsed) => docs.push((*is_required, parsed)),
                None => {
                    warn!(applicant_id = %applicant.id, status = %status, "skipping unknown document status");
                }
            }
        }

        actions += docs
            .iter()
            .filter(|(_, status)| *status == DocumentStatus::AdminChecked)
            .count() as i32;

        let expected = recompute_applicant(&docs);
        if expected.status == ApplicantStatus::Complete {
            complete += 1;
        }

        let drifted = applicant.total_docs != expected.total_docs
            || applicant.admin_accepted_docs != expected.admin_accepted_docs
            || applicant.accepted_docs != expected.accepted_docs
            || applicant.unchecked_optional_docs != expected.unchecked_optional_docs
            || ApplicantStatus::parse(&applicant.status) != Some(expected.status);
        if drifted {
            warn!(
                applicant_id = %applicant.id,
                have_total = applicant.total_docs,
                want_total = expected.total_docs,
                have_accepted = applicant.accepted_docs,
                want_accepted = expected.accepted_docs,
                "correcting drifted applicant counters"
            );
            diesel::update(applicants::table.find(applicant.id))
                .set((
                    applicants::total_docs.eq(expected.total_docs),
                    applicants::admin_accepted_docs.eq(expected.admin_accepted_docs),
                    applicants::accepted_docs.eq(expected.accepted_docs),
                    applicants::unchecked_optional_docs.eq(expected.unchecked_optional_docs),
                    applicants::status.eq(expected.status.as_str()),
                    applicants::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            corrected += 1;
        }
    }

    let applicants_count = roster.len() as i32;
    let incomplete = applicants_count - complete;
    let sent: i64 = messages::table
        .filter(messages::dashboard_id.eq(dashboard_id))
        .count()
        .get_result(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let dashboard_drifted = dashboard.applicants_count != applicants_count
        || dashboard.complete_applicants_count != complete
        || dashboard.incomplete_applicants_count != incomplete
        || dashboard.actions_count != actions
        || dashboard.messages_sent_count != sent as i32;
    if dashboard_drifted {
        warn!(dashboard_id = %dashboard_id, "correcting drifted dashboard counters");
        diesel::update(dashboards::table.find(dashboard_id))
            .set((
                dashboards::applicants_count.eq(applicants_count),
                dashboards::complete_applicants_count.eq(complete),
                dashboards::incomplete_applicants_count.eq(incomplete),
                dashboards::actions_count.eq(actions),
                dashboards::messages_sent_count.eq(sent as i32),
                dashboards::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
        corrected += 1;
    }

    Ok(corrected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;

    #[test]
    fn recount_covers_required_and_optional_docs() {
        let docs = [
            (true, Accepted),
            (true, AdminChecked),
            (true, Submitted),
            (false, AdminChecked),
            (false, NotSubmitted),
        ];
        let counters = recompute_applicant(&docs);
        assert_eq!(counters.total_docs, 3);
        assert_eq!(counters.admin_accepted_docs, 2);
        assert_eq!(counters.accepted_docs, 1);
        assert_eq!(counters.unchecked_optional_docs, 1);
        assert_eq!(counters.status, ApplicantStatus::Incomplete);
    }

    #[test]
    fn waived_docs_leave_the_total() {
        let docs = [(true, Accepted), (true, NotApplicable)];
        let counters = recompute_applicant(&docs);
        assert_eq!(counters.total_docs, 1);
        assert_eq!(counters.status, ApplicantStatus::Complete);
    }

    #[test]
    fn untouched_applicants_are_not_submitted() {
        let docs = [(true, NotSubmitted), (true, Submitted)];
        let counters = recompute_applicant(&docs);
        assert_eq!(counters.status, ApplicantStatus::NotSubmitted);
        assert!(counters.accepted_docs <= counters.admin_accepted_docs);
        assert!(counters.admin_accepted_docs <= counters.total_docs);
    }
}
