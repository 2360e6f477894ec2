//! Transactional email provider client.
//!
//! Messages either carry a plain subject/body or name a provider-side
//! template plus merge variables. The provider returns a per-recipient
//! delivery record which is written back onto the message.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Deadline rendering used in merge vars, e.g. "August 31, 2026".
pub fn format_deadline(deadline: NaiveDateTime) -> String {
    deadline.format("%B %d, %Y").to_string()
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
    #[default]
    To,
    Cc,
    Bcc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailRecipient {
    pub email: String,
    #[serde(rename = "type", default)]
    pub kind: RecipientKind,
}

impl EmailRecipient {
    pub fn to(email: impl Into<String>) -> Self {
        EmailRecipient {
            email: email.into(),
            kind: RecipientKind::To,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "name", content = "data")]
pub enum EmailTemplate {
    #[serde(rename = "Applicant Documents Request")]
    #[serde(rename_all = "camelCase")]
    DocumentsRequest {
        form_link: String,
        company_name: String,
        company_deadline: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        applicant_name: Option<String>,
    },
    #[serde(rename = "Applicant Reject Email")]
    #[serde(rename_all = "camelCase")]
    DocumentRejected {
        form_link: String,
        company_name: String,
        company_deadline: String,
        document_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        applicant_name: Option<String>,
    },
    #[serde(rename = "Team Invite Message")]
    #[serde(rename_all = "camelCase")]
    TeamInvite {
        team_member_name: String,
        company_name: String,
        invite_link: String,
    },
}

impl EmailTemplate {
    pub fn template_name(&self) -> &'static str {
        match self {
            EmailTemplate::DocumentsRequest { .. } => "Applicant Documents Request",
            EmailTemplate::DocumentRejected { .. } => "Applicant Reject Email",
            EmailTemplate::TeamInvite { .. } => "Team Invite Message",
        }
    }

    pub fn merge_vars(&self) -> Vec<(&'static str, String)> {
        match self {
            EmailTemplate::DocumentsRequest {
                form_link,
                company_name,
                company_deadline,
                applicant_name,
            } => vec![
                ("FORM_LINK", form_link.clone()),
                ("COMPANY_NAME", company_name.clone()),
                ("COMPANY_DEADLINE", company_deadline.clone()),
                ("APPLICANT_NAME", applicant_name.clone().unwrap_or_default()),
            ],
            EmailTemplate::DocumentRejected {
                form_link,
                company_name,
                company_deadline,
                document_name,
                applicant_name,
            } => vec![
                ("FORM_LINK", form_link.clone()),
                ("COMPANY_NAME", company_name.clone()),
                ("APPLICANT_NAME", applicant_name.clone().unwrap_or_default()),
                ("DOCUMENT_NAME", document_name.clone()),
                ("COMPANY_DEADLINE", company_deadline.clone()),
            ],
            EmailTemplate::TeamInvite {
                team_member_name,
                company_name,
                invite_link,
            } => vec![
                ("TEAM_MEMBER_NAME", team_member_name.clone()),
                ("COMPANY_NAME", company_name.clone()),
                ("INVITE_LINK", invite_link.clone()),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponseData {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

/// Email payload persisted on a message record (jsonb).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailData {
    pub subject: String,
    pub recipients: Vec<EmailRecipient>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<EmailTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_response_data: Option<MessageResponseData>,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: &EmailData) -> Result<MessageResponseData>;
}

pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from_email: String,
}

impl HttpMailer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        from_email: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            from_email: from_email.into(),
        }
    }

    fn base_message(&self, email: &EmailData) -> Value {
        json!({
            "from_email": self.from_email,
            "from_name": email.from_name,
            "subject": email.subject,
            "text": email.body,
            "html": email.body,
            "to": email.recipients,
            "track_opens": true,
            "track_clicks": true,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProviderSendResponse {
    #[serde(rename = "_id")]
    id: String,
    status: String,
    reject_reason: Option<String>,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &EmailData) -> Result<MessageResponseData> {
        let mut message = self.base_message(email);

        let (url, body) = match &email.template {
            Some(template) => {
                let vars: Vec<Value> = template
                    .merge_vars()
                    .into_iter()
                    .map(|(name, content)| json!({ "name": name, "content": content }))
                    .collect();
                if let Value::Object(map) = &mut message {
                    map.insert("global_merge_vars".into(), Value::Array(vars));
                }
                (
                    format!("{}/messages/send-template.json", self.endpoint),
                    json!({
                        "key": self.api_key,
                        "template_name": template.template_name(),
                        "template_content": [],
                        "message": message,
                    }),
                )
            }
            None => (
                format!("{}/messages/send.json", self.endpoint),
                json!({ "key": self.api_key, "message": message }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("email provider request failed")?
            .error_for_status()
            .context("email provider returned an error status")?;

        let results: Vec<ProviderSendResponse> = response
            .json()
            .await
            .context("failed to parse email provider response")?;
        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("email provider returned no recipients"))?;

        Ok(MessageResponseData {
            id: first.id,
            status: first.status,
            reject_reason: first.reject_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_template_exposes_provider_merge_vars() {
        let template = EmailTemplate::DocumentsRequest {
            form_link: "https://example.com/applicant/forms/f1".into(),
            company_name: "Acme".into(),
            company_deadline: "August 31, 2026".into(),
            applicant_name: Some("Maria".into()),
        };
        let vars = template.merge_vars();
        assert_eq!(vars[0], ("FORM_LINK", "https://example.com/applicant/forms/f1".into()));
        assert_eq!(vars[1].0, "COMPANY_NAME");
        assert_eq!(vars[2].0, "COMPANY_DEADLINE");
        assert_eq!(vars[3], ("APPLICANT_NAME", "Maria".into()));
    }

    #[test]
    fn rejection_template_names_the_document() {
        let template = EmailTemplate::DocumentRejected {
            form_link: "link".into(),
            company_name: "Acme".into(),
            company_deadline: "soon".into(),
            document_name: "Passport".into(),
            applicant_name: None,
        };
        let vars = template.merge_vars();
        assert!(vars.contains(&("DOCUMENT_NAME", "Passport".into())));
        assert!(vars.contains(&("APPLICANT_NAME", String::new())));
    }

    #[test]
    fn deadlines_render_as_long_dates() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(format_deadline(date), "August 31, 2026");
    }

    #[test]
    fn email_payload_round_trips_through_jsonb() {
        let data = EmailData {
            subject: "Action required".into(),
            recipients: vec![EmailRecipient::to("maria@example.com")],
            body: "Please submit your documents".into(),
            from_name: Some("Acme".into()),
            template: Some(EmailTemplate::TeamInvite {
                team_member_name: "Jo Cruz".into(),
                company_name: "Acme".into(),
                invite_link: "https://example.com/invites/i1".into(),
            }),
            message_response_data: None,
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["template"]["name"], "Team Invite Message");
        assert_eq!(value["recipients"][0]["type"], "to");
        let back: EmailData = serde_json::from_value(value).unwrap();
        assert_eq!(back, data);
    }
}
