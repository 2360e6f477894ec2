//! SMS provider client. The provider only takes digits in the destination
//! number, so formatted numbers are stripped before dispatch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmsStatus {
    Pending,
    Sent,
    Failed,
    Refunded,
}

/// SMS payload persisted on a message record (jsonb).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SmsData {
    pub phone_number: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SmsStatus>,
}

pub fn digits_only(phone_number: &str) -> String {
    phone_number.chars().filter(char::is_ascii_digit).collect()
}

pub fn document_request_text(applicant_name: &str, company_name: &str, form_link: &str) -> String {
    format!(
        "Hi {applicant_name}, this is {company_name}. Please click on this link to submit your documentary requirements: {form_link}"
    )
}

#[async_trait]
pub trait SmsSender: Send + Sync + 'static {
    async fn send(&self, sms: &SmsData) -> Result<()>;
}

pub struct HttpSmsSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSmsSender {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsSender {
    async fn send(&self, sms: &SmsData) -> Result<()> {
        let payload = json!({
            "apikey": self.api_key,
            "message": sms.message,
            "number": digits_only(&sms.phone_number),
            "sendername": sms.sender_name,
        });

        self.client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .context("sms provider request failed")?
            .error_for_status()
            .context("sms provider returned an error status")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_numbers_are_digits_only() {
        assert_eq!(digits_only("+63 (917) 555-0199"), "639175550199");
        assert_eq!(digits_only("0917-555-0199"), "09175550199");
        assert_eq!(digits_only("no digits"), "");
    }

    #[test]
    fn request_text_addresses_the_applicant() {
        let text = document_request_text("Maria", "Acme", "https://example.com/f/1");
        assert!(text.starts_with("Hi Maria, this is Acme."));
        assert!(text.ends_with("https://example.com/f/1"));
    }

    #[test]
    fn sms_payload_round_trips_through_jsonb() {
        let data = SmsData {
            phone_number: "+639175550199".into(),
            message: "hello".into(),
            sender_name: Some("Acme".into()),
            status: Some(SmsStatus::Pending),
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["phoneNumber"], "+639175550199");
        assert_eq!(value["status"], "Pending");
        let back: SmsData = serde_json::from_value(value).unwrap();
        assert_eq!(back, data);
    }
}
