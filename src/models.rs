use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub logo: Option<String>,
    pub message_types: Vec<String>,
    pub admin_check: bool,
    pub users: Vec<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = dashboards)]
#[diesel(belongs_to(Company))]
pub struct Dashboard {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub job_title: String,
    pub country: String,
    pub deadline: NaiveDateTime,
    pub form_header: String,
    pub form_caption: String,
    pub opening_message: String,
    pub docs: serde_json::Value,
    pub new_applicants: serde_json::Value,
    pub is_published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub applicants_count: i32,
    pub incomplete_applicants_count: i32,
    pub complete_applicants_count: i32,
    pub actions_count: i32,
    pub messages_sent_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = applicants)]
#[diesel(belongs_to(Dashboard))]
pub struct Applicant {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub email: String,
    pub name: Option<serde_json::Value>,
    pub phone_numbers: Option<serde_json::Value>,
    pub status: String,
    pub total_docs: i32,
    pub admin_accepted_docs: i32,
    pub accepted_docs: i32,
    pub unchecked_optional_docs: i32,
    pub latest_message: Option<serde_json::Value>,
    pub resend_link: bool,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = applicants)]
pub struct NewApplicant {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub email: String,
    pub name: Option<serde_json::Value>,
    pub phone_numbers: Option<serde_json::Value>,
    pub status: String,
    pub total_docs: i32,
    pub admin_accepted_docs: i32,
    pub accepted_docs: i32,
    pub unchecked_optional_docs: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = forms)]
#[diesel(belongs_to(Applicant))]
pub struct Form {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub applicant_email: String,
    pub applicant_status: String,
    pub applicant_name: Option<serde_json::Value>,
    pub company_name: String,
    pub company_logo: Option<String>,
    pub dashboard_context: serde_json::Value,
    pub admin_check_docs: i32,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = forms)]
pub struct NewForm {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub applicant_email: String,
    pub applicant_status: String,
    pub applicant_name: Option<serde_json::Value>,
    pub company_name: String,
    pub company_logo: Option<String>,
    pub dashboard_context: serde_json::Value,
    pub admin_check_docs: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Applicant))]
#[diesel(belongs_to(Form))]
pub struct Document {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub form_id: Uuid,
    pub name: String,
    pub alias: Option<String>,
    pub updated_name: Option<String>,
    pub requested_format: String,
    pub is_required: bool,
    pub sample: Option<serde_json::Value>,
    pub instructions: Option<String>,
    pub status: String,
    pub restore_status: Option<String>,
    pub doc_number: i32,
    pub total_pages: i32,
    pub submission_count: i32,
    pub stitch_status: String,
    pub final_checksum: Option<String>,
    pub rejection: Option<serde_json::Value>,
    pub device_submitted: Option<String>,
    pub delayed_until: Option<NaiveDateTime>,
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub form_id: Uuid,
    pub name: String,
    pub alias: Option<String>,
    pub requested_format: String,
    pub is_required: bool,
    pub sample: Option<serde_json::Value>,
    pub instructions: Option<String>,
    pub status: String,
    pub doc_number: i32,
    pub total_pages: i32,
    pub submission_count: i32,
    pub stitch_status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = pages)]
#[diesel(belongs_to(Document, foreign_key = doc_id))]
pub struct Page {
    pub id: Uuid,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub form_id: Uuid,
    pub doc_id: Uuid,
    pub name: String,
    pub page_number: i32,
    pub submitted_format: String,
    pub submitted_size: i64,
    pub submission_count: i32,
    pub image_properties: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub dashboard_id: Option<Uuid>,
    pub applicant_id: Option<Uuid>,
    pub message_types: Vec<String>,
    pub email_data: Option<serde_json::Value>,
    pub sms_data: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub dashboard_id: Option<Uuid>,
    pub applicant_id: Option<Uuid>,
    pub message_types: Vec<String>,
    pub email_data: Option<serde_json::Value>,
    pub sms_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = invites)]
pub struct Invite {
    pub id: Uuid,
    pub company_id: Uuid,
    pub company_name: String,
    pub email: String,
    pub invited_by: Uuid,
    pub resend: bool,
    pub is_complete: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

// Jsonb payload shapes. These are the typed forms of the nested values the
// tables above store as Jsonb; read sites parse with serde_json::from_value
// so a malformed blob is an explicit error, not a silent default.

/// One requested document type in a dashboard's `docs` map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardDocConfig {
    pub format: String,
    pub is_required: bool,
    #[serde(default)]
    pub sample: Option<serde_json::Value>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub doc_number: i32,
}

/// Pending-invite roster entry in a dashboard's `new_applicants` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub email: String,
    #[serde(default)]
    pub name: Option<PersonName>,
    #[serde(default)]
    pub phone_numbers: Option<PhoneNumbers>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonName {
    pub first: String,
    #[serde(default)]
    pub middle: Option<String>,
    pub last: String,
}

impl PersonName {
    pub fn full(&self) -> String {
        format!("{} {}", self.first, self.last)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneNumbers {
    pub primary: String,
    #[serde(default)]
    pub secondary: Option<String>,
}

/// Simplified delivery state denormalized onto the applicant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LatestMessage {
    pub id: Uuid,
    pub status: String,
    pub sent_at: NaiveDateTime,
}
