use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    jobs::{enqueue_job, JOB_DISPATCH_MESSAGE, JOB_MESSAGE_STATUS},
    mailer::{EmailData, MessageResponseData},
    models::{LatestMessage, Message, NewMessage},
    schema::{applicants, dashboards, messages},
    sms::{SmsData, SmsStatus},
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub const CHANNEL_EMAIL: &str = "email";
pub const CHANNEL_SMS: &str = "sms";

pub const DELIVERY_DELIVERED: &str = "Delivered";
pub const DELIVERY_NOT_DELIVERED: &str = "Not Delivered";

/// Provider statuses that mean the message was handed off successfully.
const DELIVERED_STATUSES: [&str; 3] = ["sent", "queued", "scheduled"];

pub struct OutboundMessage {
    pub company_id: Option<Uuid>,
    pub dashboard_id: Option<Uuid>,
    pub applicant_id: Option<Uuid>,
    pub message_types: Vec<String>,
    pub email: Option<EmailData>,
    pub sms: Option<SmsData>,
}

/// Persists a message record and queues its dispatch. Every
/// notification-producing handler funnels through here.
pub fn create_message(
    conn: &mut PgConnection,
    outbound: OutboundMessage,
) -> Result<Uuid, String> {
    let email_data = outbound
        .email
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| format!("serialize email payload: {err}"))?;
    let sms_data = outbound
        .sms
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| format!("serialize sms payload: {err}"))?;

    let record = NewMessage {
        id: Uuid::new_v4(),
        company_id: outbound.company_id,
        dashboard_id: outbound.dashboard_id,
        applicant_id: outbound.applicant_id,
        message_types: outbound.message_types,
        email_data,
        sms_data,
    };

    diesel::insert_into(messages::table)
        .values(&record)
        .execute(conn)
        .map_err(|err| format!("{err:?}"))?;

    enqueue_job(
        conn,
        JOB_DISPATCH_MESSAGE,
        json!({ "message_id": record.id }),
        None,
    )
    .map_err(|err| err.to_string())?;

    Ok(record.id)
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    message_id: Uuid,
}

pub struct DispatchMessageJob;

impl DispatchMessageJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for DispatchMessageJob {
    fn job_type(&self) -> &'static str {
        JOB_DISPATCH_MESSAGE
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: MessagePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid message payload: {err}"),
                }
            }
        };

        let state_clone = state.clone();
        let message =
            match task::spawn_blocking(move || load_message(state_clone, payload.message_id)).await
            {
                Ok(Ok(message)) => message,
                Ok(Err(err)) => return JobExecution::Failed { error: err },
                Err(join_err) => {
                    error!(job_id = %job.id, error = %join_err, "message load panicked");
                    return JobExecution::Failed {
                        error: format!("worker panicked: {join_err}"),
                    };
                }
            };

        let mut dispatched = false;

        if message.message_types.iter().any(|t| t == CHANNEL_EMAIL) {
            if let Some(raw) = message.email_data.clone() {
                dispatched |= dispatch_email(&state, &message, raw).await;
            }
        }

        if message.message_types.iter().any(|t| t == CHANNEL_SMS) {
            if let Some(raw) = message.sms_data.clone() {
                dispatched |= dispatch_sms(&state, &message, raw).await;
            }
        }

        if dispatched {
            if let Some(dashboard_id) = message.dashboard_id {
                let state_clone = state.clone();
                match task::spawn_blocking(move || bump_sent_counter(state_clone, dashboard_id))
                    .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(message_id = %message.id, error = %err, "failed to bump sent counter");
                    }
                    Err(join_err) => {
                        warn!(message_id = %message.id, error = %join_err, "sent counter task panicked");
                    }
                }
            }
        }

        JobExecution::Success
    }
}

// Provider failures are logged and leave the message without response
// data; a human or the maintenance job decides what to do next.
async fn dispatch_email(state: &Arc<AppState>, message: &Message, raw: Value) -> bool {
    let Some(mailer) = state.mailer.as_ref() else {
        warn!(message_id = %message.id, "email provider not configured; skipping");
        return false;
    };
    let email: EmailData = match serde_json::from_value(raw) {
        Ok(email) => email,
        Err(err) => {
            warn!(message_id = %message.id, error = %err, "malformed email payload");
            return false;
        }
    };

    match mailer.send(&email).await {
        Ok(response) => {
            let state = state.clone();
            let message_id = message.id;
            let persisted = task::spawn_blocking(move || {
                record_email_response(state, message_id, &response)
            })
            .await;
            match persisted {
                Ok(Ok(())) => true,
                Ok(Err(err)) => {
                    warn!(message_id = %message.id, error = %err, "failed to record email response");
                    true
                }
                Err(join_err) => {
                    warn!(message_id = %message.id, error = %join_err, "email response task panicked");
                    true
                }
            }
        }
        Err(err) => {
            warn!(message_id = %message.id, error = %err, "email dispatch failed");
            false
        }
    }
}

async fn dispatch_sms(state: &Arc<AppState>, message: &Message, raw: Value) -> bool {
    let Some(sender) = state.sms.as_ref() else {
        warn!(message_id = %message.id, "sms provider not configured; skipping");
        return false;
    };
    let sms: SmsData = match serde_json::from_value(raw) {
        Ok(sms) => sms,
        Err(err) => {
            warn!(message_id = %message.id, error = %err, "malformed sms payload");
            return false;
        }
    };

    let status = match sender.send(&sms).await {
        Ok(()) => SmsStatus::Sent,
        Err(err) => {
            warn!(message_id = %message.id, error = %err, "sms dispatch failed");
            SmsStatus::Failed
        }
    };

    let state = state.clone();
    let message_id = message.id;
    let sent = status == SmsStatus::Sent;
    let persisted =
        task::spawn_blocking(move || record_sms_status(state, message_id, status)).await;
    if let Ok(Err(err)) = persisted {
        warn!(message_id = %message_id, error = %err, "failed to record sms status");
    }
    sent
}

fn load_message(state: Arc<AppState>, message_id: Uuid) -> Result<Message, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
    messages::table
        .find(message_id)
        .first(&mut conn)
        .map_err(|err| format!("message {message_id} not found: {err:?}"))
}

fn record_email_response(
    state: Arc<AppState>,
    message_id: Uuid,
    response: &MessageResponseData,
) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let raw: Option<Value> = messages::table
        .find(message_id)
        .select(messages::email_data)
        .first(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let mut raw = raw.ok_or("email payload disappeared")?;
    if let Value::Object(map) = &mut raw {
        map.insert(
            "messageResponseData".to_string(),
            serde_json::to_value(response).map_err(|err| err.to_string())?,
        );
    }

    diesel::update(messages::table.find(message_id))
        .set((
            messages::email_data.eq(raw),
            messages::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;
    Ok(())
}

fn record_sms_status(
    state: Arc<AppState>,
    message_id: Uuid,
    status: SmsStatus,
) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let raw: Option<Value> = messages::table
        .find(message_id)
        .select(messages::sms_data)
        .first(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    let mut raw = raw.ok_or("sms payload disappeared")?;
    if let Value::Object(map) = &mut raw {
        map.insert(
            "status".to_string(),
            serde_json::to_value(status).map_err(|err| err.to_string())?,
        );
    }

    diesel::update(messages::table.find(message_id))
        .set((
            messages::sms_data.eq(raw),
            messages::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;
    Ok(())
}

fn bump_sent_counter(state: Arc<AppState>, dashboard_id: Uuid) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
    diesel::update(dashboards::table.find(dashboard_id))
        .set(dashboards::messages_sent_count.eq(dashboards::messages_sent_count + 1))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;
    Ok(())
}

pub struct MessageStatusJob;

impl MessageStatusJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for MessageStatusJob {
    fn job_type(&self) -> &'static str {
        JOB_MESSAGE_STATUS
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: MessagePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid message payload: {err}"),
                }
            }
        };

        match task::spawn_blocking(move || propagate_status(state, payload.message_id)).await {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "status propagation panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

/// Folds the provider's detailed status into the two values the applicant
/// dashboard shows, and re-arms the resend flag.
pub fn simplified_delivery_status(provider_status: &str) -> &'static str {
    if DELIVERED_STATUSES.contains(&provider_status) {
        DELIVERY_DELIVERED
    } else {
        DELIVERY_NOT_DELIVERED
    }
}

fn propagate_status(state: Arc<AppState>, message_id: Uuid) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let message: Message = messages::table
        .find(message_id)
        .first(&mut conn)
        .map_err(|err| format!("message {message_id} not found: {err:?}"))?;

    let Some(applicant_id) = message.applicant_id else {
        return Ok(());
    };

    let provider_status = message
        .email_data
        .as_ref()
        .and_then(|data| data.get("messageResponseData"))
        .and_then(|response| response.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let latest = LatestMessage {
        id: message.id,
        status: simplified_delivery_status(&provider_status).to_string(),
        sent_at: message.created_at,
    };

    diesel::update(applicants::table.find(applicant_id))
        .set((
            applicants::latest_message
                .eq(serde_json::to_value(&latest).map_err(|err| err.to_string())?),
            applicants::resend_link.eq(false),
            applicants::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| format!("{err:?}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_statuses_fold_to_two_values() {
        assert_eq!(simplified_delivery_status("sent"), DELIVERY_DELIVERED);
        assert_eq!(simplified_delivery_status("queued"), DELIVERY_DELIVERED);
        assert_eq!(simplified_delivery_status("scheduled"), DELIVERY_DELIVERED);
        assert_eq!(simplified_delivery_status("rejected"), DELIVERY_NOT_DELIVERED);
        assert_eq!(simplified_delivery_status("invalid"), DELIVERY_NOT_DELIVERED);
        assert_eq!(simplified_delivery_status(""), DELIVERY_NOT_DELIVERED);
    }
}
