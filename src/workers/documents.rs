use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    events::ApplicantSnapshot,
    jobs::{enqueue_job, JOB_APPLICANT_UPDATED, JOB_DOCUMENT_TRANSITION, JOB_STITCH_DOCUMENT},
    lifecycle::{plan_transition, DocumentStatus, StitchStatus, TransitionContext},
    mailer::{format_deadline, EmailData, EmailRecipient, EmailTemplate},
    models::{Applicant, Company, Dashboard, Document, PersonName, PhoneNumbers},
    schema::{applicants, companies, dashboards, documents, forms},
    sms::SmsData,
    state::AppState,
};

use super::messaging::{create_message, OutboundMessage, CHANNEL_EMAIL, CHANNEL_SMS};
use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct TransitionPayload {
    document_id: Uuid,
    previous_status: String,
    new_status: String,
    expected_version: i64,
}

pub struct DocumentTransitionJob;

impl DocumentTransitionJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for DocumentTransitionJob {
    fn job_type(&self) -> &'static str {
        JOB_DOCUMENT_TRANSITION
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: TransitionPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid transition payload: {err}"),
                }
            }
        };

        match task::spawn_blocking(move || run_transition(state, payload)).await {
            Ok(Ok(outcome)) => {
                info!(job_id = %job.id, outcome = %outcome, "transition processed");
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "transition task panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

fn run_transition(state: Arc<AppState>, payload: TransitionPayload) -> Result<&'static str, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let document: Document = documents::table
        .find(payload.document_id)
        .first(&mut conn)
        .map_err(|err| format!("document {} not found: {err:?}", payload.document_id))?;

    let old = DocumentStatus::parse(&payload.previous_status)
        .ok_or_else(|| format!("unknown previous status {:?}", payload.previous_status))?;
    let new = DocumentStatus::parse(&payload.new_status)
        .ok_or_else(|| format!("unknown new status {:?}", payload.new_status))?;

    let company: Company = companies::table
        .find(document.company_id)
        .first(&mut conn)
        .map_err(|err| format!("company {} not found: {err:?}", document.company_id))?;

    let ctx = TransitionContext {
        admin_check: company.admin_check,
        is_required: document.is_required,
    };

    let Some(plan) = plan_transition(old, new, ctx) else {
        return Ok("no-op");
    };

    // Single-writer gate: the version token must still be the one the
    // change notification saw. A miss means another transition already
    // processed this document past that point.
    let now = Utc::now().naive_utc();
    let claimed = diesel::update(
        documents::table
            .find(document.id)
            .filter(documents::version.eq(payload.expected_version)),
    )
    .set((
        documents::version.eq(payload.expected_version + 1),
        documents::updated_at.eq(now),
    ))
    .execute(&mut conn)
    .map_err(|err| format!("{err:?}"))?;

    if claimed == 0 {
        warn!(
            document_id = %document.id,
            expected_version = payload.expected_version,
            "transition superseded by a newer write"
        );
        return Ok("superseded");
    }

    if new == DocumentStatus::NotApplicable {
        diesel::update(documents::table.find(document.id))
            .set(documents::restore_status.eq(Some(old.as_str())))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    } else if old == DocumentStatus::NotApplicable {
        diesel::update(documents::table.find(document.id))
            .set(documents::restore_status.eq(None::<String>))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    }

    if plan.stitch {
        diesel::update(documents::table.find(document.id))
            .set(documents::stitch_status.eq(StitchStatus::Pending.as_str()))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    }

    if plan.form_admin_check_docs != 0 {
        diesel::update(forms::table.find(document.form_id))
            .set((
                forms::admin_check_docs.eq(forms::admin_check_docs + plan.form_admin_check_docs),
                forms::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    }

    let applicant: Applicant = applicants::table
        .find(document.applicant_id)
        .first(&mut conn)
        .map_err(|err| format!("applicant {} not found: {err:?}", document.applicant_id))?;

    let previous = ApplicantSnapshot {
        status: applicant.status.clone(),
        total_docs: applicant.total_docs,
        admin_accepted_docs: applicant.admin_accepted_docs,
        accepted_docs: applicant.accepted_docs,
        resend_link: applicant.resend_link,
    };

    let touches_applicant = plan.admin_accepted_docs != 0
        || plan.accepted_docs != 0
        || plan.unchecked_optional_docs != 0
        || plan.total_docs != 0;
    if touches_applicant {
        diesel::update(applicants::table.find(document.applicant_id))
            .set((
                applicants::admin_accepted_docs
                    .eq(applicants::admin_accepted_docs + plan.admin_accepted_docs),
                applicants::accepted_docs.eq(applicants::accepted_docs + plan.accepted_docs),
                applicants::unchecked_optional_docs
                    .eq(applicants::unchecked_optional_docs + plan.unchecked_optional_docs),
                applicants::total_docs.eq(applicants::total_docs + plan.total_docs),
                applicants::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    }

    if plan.dashboard_actions != 0 {
        diesel::update(dashboards::table.find(document.dashboard_id))
            .set(dashboards::actions_count.eq(dashboards::actions_count + plan.dashboard_actions))
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    }

    // Counter writes landed; let the applicant-level rules react to them.
    enqueue_job(
        &mut conn,
        JOB_APPLICANT_UPDATED,
        json!({ "applicant_id": document.applicant_id, "previous": previous }),
        None,
    )
    .map_err(|err| err.to_string())?;

    if plan.stitch {
        enqueue_job(
            &mut conn,
            JOB_STITCH_DOCUMENT,
            json!({ "document_id": document.id }),
            None,
        )
        .map_err(|err| err.to_string())?;
    }

    if plan.notify_rejection {
        let dashboard: Dashboard = dashboards::table
            .find(document.dashboard_id)
            .first(&mut conn)
            .map_err(|err| format!("dashboard {} not found: {err:?}", document.dashboard_id))?;
        let outbound =
            rejection_message(&state, &company, &dashboard, &applicant, &document);
        let message_id = create_message(&mut conn, outbound)?;
        info!(message_id = %message_id, document_id = %document.id, "rejection notification queued");
    }

    Ok("applied")
}

fn rejection_message(
    state: &Arc<AppState>,
    company: &Company,
    dashboard: &Dashboard,
    applicant: &Applicant,
    document: &Document,
) -> OutboundMessage {
    let form_link = state.config.form_link(document.form_id);
    let document_name = document.alias.clone().unwrap_or_else(|| document.name.clone());
    let applicant_name = applicant
        .name
        .clone()
        .and_then(|value| serde_json::from_value::<PersonName>(value).ok());
    let first_name = applicant_name
        .as_ref()
        .map(|name| name.first.clone())
        .unwrap_or_else(|| "there".to_string());

    let mut message_types = Vec::new();
    let mut email = None;
    let mut sms = None;

    if company.message_types.iter().any(|t| t == CHANNEL_EMAIL) {
        message_types.push(CHANNEL_EMAIL.to_string());
        email = Some(EmailData {
            subject: format!("Action required: your {document_name} needs to be resubmitted"),
            recipients: vec![EmailRecipient::to(applicant.email.clone())],
            body: format!(
                "Your {document_name} was not accepted. Please open your form and upload it again: {form_link}"
            ),
            from_name: Some(company.name.clone()),
            template: Some(EmailTemplate::DocumentRejected {
                form_link: form_link.clone(),
                company_name: company.name.clone(),
                company_deadline: format_deadline(dashboard.deadline),
                document_name: document_name.clone(),
                applicant_name: applicant_name.as_ref().map(PersonName::full),
            }),
            message_response_data: None,
        });
    }

    let primary_phone = applicant
        .phone_numbers
        .clone()
        .and_then(|value| serde_json::from_value::<PhoneNumbers>(value).ok())
        .map(|numbers| numbers.primary);
    if let Some(phone_number) = primary_phone {
        if company.message_types.iter().any(|t| t == CHANNEL_SMS) {
            message_types.push(CHANNEL_SMS.to_string());
            sms = Some(SmsData {
                phone_number,
                message: format!(
                    "Hi {first_name}, this is {company}. Your {document_name} was not accepted. Please resubmit it here: {form_link}",
                    company = company.name,
                ),
                sender_name: state.config.sms_sender_name.clone(),
                status: None,
            });
        }
    }

    OutboundMessage {
        company_id: Some(company.id),
        dashboard_id: Some(dashboard.id),
        applicant_id: Some(applicant.id),
        message_types,
        email,
        sms,
    }
}
