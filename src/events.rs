//! Change notifications from the primary store.
//!
//! The record-writing side (API layer, admin UI) posts one event per
//! observed change; each event maps to at most a couple of queued jobs.
//! Events carry the *previous* values a handler needs, because by the time
//! a job runs the row may have moved on.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::jobs;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicantSnapshot {
    pub status: String,
    pub total_docs: i32,
    pub admin_accepted_docs: i32,
    pub accepted_docs: i32,
    #[serde(default)]
    pub resend_link: bool,
}

/// A deleted page no longer has a row to read, so the event carries what
/// cleanup needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageSnapshot {
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub doc_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadMetadata {
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
    pub doc_id: Uuid,
    pub form_id: Uuid,
    /// Requested output format for the fixed artifact: "jpeg" or "pdf".
    pub format: String,
    pub submission_count: i32,
    #[serde(default)]
    pub angle: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewMetadata {
    /// "accepted" or "rejected".
    pub status: String,
    pub updated_name: String,
    pub company_id: Uuid,
    pub dashboard_id: Uuid,
    pub applicant_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    #[serde(rename = "dashboard.updated")]
    DashboardUpdated {
        dashboard_id: Uuid,
        was_published: bool,
    },
    #[serde(rename = "applicant.created")]
    ApplicantCreated { applicant_id: Uuid },
    #[serde(rename = "applicant.updated")]
    ApplicantUpdated {
        applicant_id: Uuid,
        previous: ApplicantSnapshot,
    },
    #[serde(rename = "applicant.deleted")]
    ApplicantDeleted { applicant_id: Uuid },
    #[serde(rename = "document.updated")]
    DocumentUpdated {
        document_id: Uuid,
        previous_status: String,
        new_status: String,
        expected_version: i64,
        #[serde(default)]
        restitch: bool,
    },
    #[serde(rename = "page.updated")]
    PageUpdated {
        page_id: Uuid,
        #[serde(default)]
        image_properties_changed: bool,
    },
    #[serde(rename = "page.deleted")]
    PageDeleted { page: PageSnapshot },
    #[serde(rename = "message.created")]
    MessageCreated { message_id: Uuid },
    #[serde(rename = "message.updated")]
    MessageUpdated { message_id: Uuid },
    #[serde(rename = "upload.finalized")]
    UploadFinalized {
        path: String,
        content_type: String,
        metadata: Option<UploadMetadata>,
    },
    #[serde(rename = "file.reviewed")]
    FileReviewed {
        path: String,
        content_type: String,
        review: ReviewMetadata,
    },
    #[serde(rename = "user.created")]
    UserCreated { user_id: Uuid },
    #[serde(rename = "invite.created")]
    InviteCreated { invite_id: Uuid },
}

/// Maps an event to the jobs it should enqueue. An empty vec means the
/// change needs no reaction (that is the normal case for most writes).
pub fn jobs_for_event(event: &ChangeEvent) -> Vec<(&'static str, Value)> {
    match event {
        ChangeEvent::DashboardUpdated {
            dashboard_id,
            was_published,
        } => vec![(
            jobs::JOB_PUBLISH_DASHBOARD,
            json!({ "dashboard_id": dashboard_id, "was_published": was_published }),
        )],
        ChangeEvent::ApplicantCreated { applicant_id } => vec![(
            jobs::JOB_CREATE_FORM,
            json!({ "applicant_id": applicant_id }),
        )],
        ChangeEvent::ApplicantUpdated {
            applicant_id,
            previous,
        } => vec![(
            jobs::JOB_APPLICANT_UPDATED,
            json!({ "applicant_id": applicant_id, "previous": previous }),
        )],
        ChangeEvent::ApplicantDeleted { applicant_id } => vec![(
            jobs::JOB_APPLICANT_DELETED,
            json!({ "applicant_id": applicant_id }),
        )],
        ChangeEvent::DocumentUpdated {
            document_id,
            previous_status,
            new_status,
            expected_version,
            restitch,
        } => {
            let mut queued = Vec::new();
            if previous_status != new_status {
                queued.push((
                    jobs::JOB_DOCUMENT_TRANSITION,
                    json!({
                        "document_id": document_id,
                        "previous_status": previous_status,
                        "new_status": new_status,
                        "expected_version": expected_version,
                    }),
                ));
            }
            if *restitch {
                queued.push((
                    jobs::JOB_STITCH_DOCUMENT,
                    json!({ "document_id": document_id }),
                ));
            }
            queued
        }
        ChangeEvent::PageUpdated {
            page_id,
            image_properties_changed,
        } => {
            if *image_properties_changed {
                vec![(jobs::JOB_FIX_PAGE_IMAGE, json!({ "page_id": page_id }))]
            } else {
                Vec::new()
            }
        }
        ChangeEvent::PageDeleted { page } => {
            vec![(jobs::JOB_PAGE_DELETED, json!({ "page": page }))]
        }
        ChangeEvent::MessageCreated { message_id } => vec![(
            jobs::JOB_DISPATCH_MESSAGE,
            json!({ "message_id": message_id }),
        )],
        ChangeEvent::MessageUpdated { message_id } => vec![(
            jobs::JOB_MESSAGE_STATUS,
            json!({ "message_id": message_id }),
        )],
        ChangeEvent::UploadFinalized {
            path,
            content_type,
            metadata,
        } => {
            if path.starts_with("temporary-docs/") {
                vec![(
                    jobs::JOB_PROCESS_UPLOAD,
                    json!({ "path": path, "content_type": content_type, "metadata": metadata }),
                )]
            } else if path.contains("/new-samples/") {
                vec![(
                    jobs::JOB_PROCESS_SAMPLE,
                    json!({ "path": path, "content_type": content_type }),
                )]
            } else {
                Vec::new()
            }
        }
        ChangeEvent::FileReviewed {
            path,
            content_type,
            review,
        } => vec![(
            jobs::JOB_FILE_REVIEW,
            json!({ "path": path, "content_type": content_type, "review": review }),
        )],
        ChangeEvent::UserCreated { user_id } => vec![(
            jobs::JOB_DENORMALIZE_USER,
            json!({ "user_id": user_id }),
        )],
        ChangeEvent::InviteCreated { invite_id } => vec![(
            jobs::JOB_INVITE_CREATED,
            json!({ "invite_id": invite_id }),
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_status_change_enqueues_a_transition() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "type": "document.updated",
            "document_id": "6d9c1a04-21c8-4df1-b2dc-0f91f3e8c01a",
            "previous_status": "submitted",
            "new_status": "admin-checked",
            "expected_version": 4,
        }))
        .unwrap();

        let queued = jobs_for_event(&event);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].0, jobs::JOB_DOCUMENT_TRANSITION);
        assert_eq!(queued[0].1["expected_version"], 4);
    }

    #[test]
    fn unchanged_status_enqueues_nothing() {
        let event = ChangeEvent::DocumentUpdated {
            document_id: Uuid::new_v4(),
            previous_status: "submitted".into(),
            new_status: "submitted".into(),
            expected_version: 1,
            restitch: false,
        };
        assert!(jobs_for_event(&event).is_empty());
    }

    #[test]
    fn restitch_flag_enqueues_a_stitch_even_without_a_transition() {
        let event = ChangeEvent::DocumentUpdated {
            document_id: Uuid::new_v4(),
            previous_status: "accepted".into(),
            new_status: "accepted".into(),
            expected_version: 9,
            restitch: true,
        };
        let queued = jobs_for_event(&event);
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].0, jobs::JOB_STITCH_DOCUMENT);
    }

    #[test]
    fn uploads_route_by_folder() {
        let temp = ChangeEvent::UploadFinalized {
            path: "temporary-docs/upload-1".into(),
            content_type: "image/jpeg".into(),
            metadata: None,
        };
        assert_eq!(jobs_for_event(&temp)[0].0, jobs::JOB_PROCESS_UPLOAD);

        let sample = ChangeEvent::UploadFinalized {
            path: "companies/c/dashboards/d/new-samples/visa.pdf".into(),
            content_type: "application/pdf".into(),
            metadata: None,
        };
        assert_eq!(jobs_for_event(&sample)[0].0, jobs::JOB_PROCESS_SAMPLE);

        let unrelated = ChangeEvent::UploadFinalized {
            path: "logos/acme.png".into(),
            content_type: "image/png".into(),
            metadata: None,
        };
        assert!(jobs_for_event(&unrelated).is_empty());
    }

    #[test]
    fn page_updates_without_property_changes_are_ignored() {
        let event = ChangeEvent::PageUpdated {
            page_id: Uuid::new_v4(),
            image_properties_changed: false,
        };
        assert!(jobs_for_event(&event).is_empty());
    }
}
