use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tokio::task;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    jobs::JOB_CREATE_FORM,
    lifecycle::{ApplicantStatus, DocumentStatus, StitchStatus},
    mailer::{format_deadline, EmailData, EmailRecipient, EmailTemplate},
    models::{
        Applicant, Company, Dashboard, DashboardDocConfig, NewDocument, NewForm, PersonName,
        PhoneNumbers,
    },
    schema::{applicants, companies, dashboards, documents, forms},
    sms::{document_request_text, SmsData},
    state::AppState,
};

use super::messaging::{create_message, OutboundMessage, CHANNEL_EMAIL, CHANNEL_SMS};
use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct CreateFormPayload {
    applicant_id: Uuid,
}

/// Builds the applicant-facing read model when an applicant record appears:
/// the form itself, one document row per configured dashboard doc, and the
/// opening request notification.
pub struct CreateFormJob;

impl CreateFormJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for CreateFormJob {
    fn job_type(&self) -> &'static str {
        JOB_CREATE_FORM
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: CreateFormPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid create-form payload: {err}"),
                }
            }
        };

        match task::spawn_blocking(move || create_form(state, payload.applicant_id)).await {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "create-form task panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

fn create_form(state: Arc<AppState>, applicant_id: Uuid) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let applicant: Applicant = applicants::table
        .find(applicant_id)
        .first(&mut conn)
        .map_err(|err| format!("applicant {applicant_id} not found: {err:?}"))?;

    let company: Company = companies::table
        .find(applicant.company_id)
        .first(&mut conn)
        .map_err(|err| format!("incorrect company id {}: {err:?}", applicant.company_id))?;

    let dashboard: Dashboard = dashboards::table
        .find(applicant.dashboard_id)
        .first(&mut conn)
        .map_err(|err| format!("incorrect dashboard id {}: {err:?}", applicant.dashboard_id))?;

    // Redelivered creation events must not produce a second form.
    let existing: i64 = forms::table
        .filter(forms::applicant_id.eq(applicant_id))
        .count()
        .get_result(&mut conn)
        .map_err(|err| format!("{err:?}"))?;
    if existing > 0 {
        info!(applicant_id = %applicant_id, "form already exists; skipping");
        return Ok(());
    }

    let doc_configs: HashMap<String, DashboardDocConfig> =
        serde_json::from_value(dashboard.docs.clone())
            .map_err(|err| format!("malformed dashboard docs: {err}"))?;
    let mut doc_configs: Vec<(String, DashboardDocConfig)> = doc_configs.into_iter().collect();
    doc_configs.sort_by_key(|(_, config)| config.doc_number);

    let form = NewForm {
        id: Uuid::new_v4(),
        company_id: company.id,
        dashboard_id: dashboard.id,
        applicant_id,
        applicant_email: applicant.email.clone(),
        applicant_status: ApplicantStatus::NotSubmitted.as_str().to_string(),
        applicant_name: applicant.name.clone(),
        company_name: company.name.clone(),
        company_logo: company.logo.clone(),
        dashboard_context: json!({
            "formHeader": dashboard.form_header,
            "formCaption": dashboard.form_caption,
            "deadline": dashboard.deadline,
            "job": dashboard.job_title,
            "country": dashboard.country,
            "openingMessage": dashboard.opening_message,
        }),
        admin_check_docs: 0,
    };

    diesel::insert_into(forms::table)
        .values(&form)
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let mut required_count = 0;
    for (name, config) in &doc_configs {
        if config.is_required {
            required_count += 1;
        }
        let document = NewDocument {
            id: Uuid::new_v4(),
            company_id: company.id,
            dashboard_id: dashboard.id,
            applicant_id,
            form_id: form.id,
            name: name.clone(),
            alias: config.alias.clone(),
            requested_format: config.format.clone(),
            is_required: config.is_required,
            sample: config.sample.clone(),
            instructions: config.instructions.clone(),
            status: DocumentStatus::NotSubmitted.as_str().to_string(),
            doc_number: config.doc_number,
            total_pages: 0,
            submission_count: 0,
            stitch_status: StitchStatus::Idle.as_str().to_string(),
        };
        diesel::insert_into(documents::table)
            .values(&document)
            .execute(&mut conn)
            .map_err(|err| format!("{err:?}"))?;
    }

    diesel::update(applicants::table.find(applicant_id))
        .set(applicants::total_docs.eq(required_count))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let outbound = request_message(&state, &company, &dashboard, &applicant, form.id);
    let message_id = create_message(&mut conn, outbound)?;
    info!(
        form_id = %form.id,
        message_id = %message_id,
        docs = doc_configs.len(),
        "form created"
    );

    Ok(())
}

const REQUEST_EMAIL_SUBJECT: &str =
    "Action required: New documents needed for your application";

/// The opening document-request notification, also reused when an
/// applicant's form link is resent.
pub fn request_message(
    state: &Arc<AppState>,
    company: &Company,
    dashboard: &Dashboard,
    applicant: &Applicant,
    form_id: Uuid,
) -> OutboundMessage {
    let form_link = state.config.form_link(form_id);
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
            subject: REQUEST_EMAIL_SUBJECT.to_string(),
            recipients: vec![EmailRecipient::to(applicant.email.clone())],
            body: dashboard.opening_message.clone(),
            from_name: Some(company.name.clone()),
            template: Some(EmailTemplate::DocumentsRequest {
                form_link: form_link.clone(),
                company_name: company.name.clone(),
                company_deadline: format_deadline(dashboard.deadline),
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
                message: document_request_text(&first_name, &company.name, &form_link),
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
