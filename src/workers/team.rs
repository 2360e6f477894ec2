use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    jobs::{JOB_DENORMALIZE_USER, JOB_INVITE_CREATED},
    mailer::{EmailData, EmailRecipient, EmailTemplate},
    models::{Company, Invite, User},
    schema::{companies, invites, users},
    state::AppState,
};

use super::messaging::{create_message, OutboundMessage, CHANNEL_EMAIL};
use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct UserCreatedPayload {
    user_id: Uuid,
}

/// Keeps the company's denormalized member list in sync when a user record
/// appears. Adding an id that is already present is a no-op.
pub struct DenormalizeUserJob;

impl DenormalizeUserJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for DenormalizeUserJob {
    fn job_type(&self) -> &'static str {
        JOB_DENORMALIZE_USER
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: UserCreatedPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid user payload: {err}"),
                }
            }
        };

        let result = task::spawn_blocking(move || -> Result<bool, String> {
            let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

            let user: User = users::table
                .find(payload.user_id)
                .first(&mut conn)
                .map_err(|err| format!("user {} not found: {err:?}", payload.user_id))?;

            let company: Company = companies::table
                .find(user.company_id)
                .first(&mut conn)
                .map_err(|err| format!("no company exists for user {}: {err:?}", user.id))?;

            if company.users.contains(&user.id) {
                return Ok(false);
            }

            let mut members = company.users.clone();
            members.push(user.id);
            diesel::update(companies::table.find(company.id))
                .set((
                    companies::users.eq(members),
                    companies::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(&mut conn)
                .map_err(|err| format!("{err:?}"))?;
            Ok(true)
        })
        .await;

        match result {
            Ok(Ok(added)) => {
                info!(job_id = %job.id, added, "user denormalization finished");
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "user denormalization panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct InviteCreatedPayload {
    invite_id: Uuid,
}

/// Sends the team-invite email when an invite record is created.
pub struct InviteCreatedJob;

impl InviteCreatedJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for InviteCreatedJob {
    fn job_type(&self) -> &'static str {
        JOB_INVITE_CREATED
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: InviteCreatedPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid invite payload: {err}"),
                }
            }
        };

        let result = task::spawn_blocking(move || -> Result<Uuid, String> {
            let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

            let invite: Invite = invites::table
                .find(payload.invite_id)
                .first(&mut conn)
                .map_err(|err| format!("invite {} not found: {err:?}", payload.invite_id))?;

            let inviter: User = users::table
                .find(invite.invited_by)
                .first(&mut conn)
                .map_err(|err| format!("user does not exist: {err:?}"))?;

            let inviter_name = format!("{} {}", inviter.first_name, inviter.last_name);
            let invite_link = state.config.invite_link(invite.id);

            let outbound = OutboundMessage {
                company_id: Some(invite.company_id),
                dashboard_id: None,
                applicant_id: None,
                message_types: vec![CHANNEL_EMAIL.to_string()],
                email: Some(EmailData {
                    subject: format!(
                        "{inviter_name} has invited you to join {}",
                        invite.company_name
                    ),
                    recipients: vec![EmailRecipient::to(invite.email.clone())],
                    body: format!(
                        "{inviter_name} has invited you to join {}. Accept the invite here: {invite_link}",
                        invite.company_name
                    ),
                    from_name: Some(invite.company_name.clone()),
                    template: Some(EmailTemplate::TeamInvite {
                        team_member_name: inviter_name,
                        company_name: invite.company_name.clone(),
                        invite_link,
                    }),
                    message_response_data: None,
                }),
                sms: None,
            };

            create_message(&mut conn, outbound)
        })
        .await;

        match result {
            Ok(Ok(message_id)) => {
                info!(job_id = %job.id, message_id = %message_id, "invite message queued");
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Failed { error: err },
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "invite task panicked");
                JobExecution::Failed {
                    error: format!("worker panicked: {join_err}"),
                }
            }
        }
    }
}
