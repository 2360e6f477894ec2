//! Document/applicant status lifecycle.
//!
//! All counter bookkeeping for a status change is computed here as a pure
//! plan; the document worker applies it with relative SQL updates. Keeping
//! the arithmetic out of the handler means a transition either produces a
//! plan or it is a no-op — there is no third outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    NotSubmitted,
    Delayed,
    Submitted,
    AdminChecked,
    Accepted,
    Rejected,
    NotApplicable,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::NotSubmitted => "not-submitted",
            DocumentStatus::Delayed => "delayed",
            DocumentStatus::Submitted => "submitted",
            DocumentStatus::AdminChecked => "admin-checked",
            DocumentStatus::Accepted => "accepted",
            DocumentStatus::Rejected => "rejected",
            DocumentStatus::NotApplicable => "not-applicable",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not-submitted" => Some(DocumentStatus::NotSubmitted),
            "delayed" => Some(DocumentStatus::Delayed),
            "submitted" => Some(DocumentStatus::Submitted),
            "admin-checked" => Some(DocumentStatus::AdminChecked),
            "accepted" => Some(DocumentStatus::Accepted),
            "rejected" => Some(DocumentStatus::Rejected),
            "not-applicable" => Some(DocumentStatus::NotApplicable),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicantStatus {
    NotSubmitted,
    Incomplete,
    Complete,
}

impl ApplicantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicantStatus::NotSubmitted => "not-submitted",
            ApplicantStatus::Incomplete => "incomplete",
            ApplicantStatus::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not-submitted" => Some(ApplicantStatus::NotSubmitted),
            "incomplete" => Some(ApplicantStatus::Incomplete),
            "complete" => Some(ApplicantStatus::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchStatus {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl StitchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StitchStatus::Idle => "idle",
            StitchStatus::Pending => "pending",
            StitchStatus::Succeeded => "succeeded",
            StitchStatus::Failed => "failed",
        }
    }
}

/// Company/document context a transition depends on.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    /// Whether the company routes submissions through a human review step.
    pub admin_check: bool,
    pub is_required: bool,
}

/// Relative counter adjustments plus follow-up actions for one observed
/// status change. Deltas are applied with `col = col + n`, never as
/// absolute writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    pub form_admin_check_docs: i32,
    pub admin_accepted_docs: i32,
    pub accepted_docs: i32,
    pub unchecked_optional_docs: i32,
    pub total_docs: i32,
    pub dashboard_actions: i32,
    pub stitch: bool,
    pub notify_rejection: bool,
}

/// Computes the effects of `old -> new`. Returns `None` when the pair is
/// not an edge of the lifecycle (including `old == new`, which is how a
/// redelivered change notification is absorbed).
pub fn plan_transition(
    old: DocumentStatus,
    new: DocumentStatus,
    ctx: TransitionContext,
) -> Option<TransitionPlan> {
    use DocumentStatus::*;

    if old == new {
        return None;
    }

    // The waive toggle is allowed from (and back to) any status and only
    // moves the applicant's document total.
    if new == NotApplicable {
        return Some(TransitionPlan {
            total_docs: -1,
            ..Default::default()
        });
    }
    if old == NotApplicable {
        return Some(TransitionPlan {
            total_docs: 1,
            ..Default::default()
        });
    }

    let mut plan = TransitionPlan::default();
    match (old, new) {
        (NotSubmitted, Submitted) | (Rejected, Submitted) => {
            if ctx.admin_check {
                plan.form_admin_check_docs = 1;
            }
        }
        (Submitted, AdminChecked) => {
            if ctx.admin_check {
                plan.form_admin_check_docs = -1;
            }
            if ctx.is_required {
                plan.admin_accepted_docs = 1;
            } else {
                plan.unchecked_optional_docs = 1;
            }
            plan.dashboard_actions = 1;
        }
        (AdminChecked, Accepted) => {
            if ctx.is_required {
                plan.accepted_docs = 1;
            } else {
                plan.unchecked_optional_docs = -1;
            }
            plan.dashboard_actions = -1;
            plan.stitch = true;
        }
        (Submitted, Rejected) => {
            if ctx.admin_check {
                plan.form_admin_check_docs = -1;
            }
        }
        (AdminChecked, Rejected) => {
            if ctx.is_required {
                plan.admin_accepted_docs = -1;
            } else {
                plan.unchecked_optional_docs = -1;
            }
            plan.dashboard_actions = -1;
            plan.notify_rejection = true;
        }
        _ => return None,
    }

    Some(plan)
}

/// Applicant counter snapshot, taken before and after a plan is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantCounters {
    pub status: ApplicantStatus,
    pub total_docs: i32,
    pub admin_accepted_docs: i32,
    pub accepted_docs: i32,
}

impl ApplicantCounters {
    /// `accepted <= admin_accepted <= total` must hold after every
    /// transition in any valid sequence.
    pub fn invariant_holds(&self) -> bool {
        self.accepted_docs <= self.admin_accepted_docs
            && self.admin_accepted_docs <= self.total_docs
    }

    pub fn apply(&self, plan: &TransitionPlan) -> ApplicantCounters {
        ApplicantCounters {
            status: self.status,
            total_docs: self.total_docs + plan.total_docs,
            admin_accepted_docs: self.admin_accepted_docs + plan.admin_accepted_docs,
            accepted_docs: self.accepted_docs + plan.accepted_docs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicantStatusChange {
    /// not-submitted -> incomplete; bumps the dashboard incomplete count.
    MarkIncomplete,
    /// incomplete -> complete; moves the applicant between dashboard counts.
    MarkComplete,
    /// complete -> incomplete. Only produced when regression is enabled.
    RegressIncomplete,
}

/// The derived applicant status moves forward on counter edges only.
/// Regression from complete is off unless the deployment opts in.
pub fn plan_applicant_status(
    prev: &ApplicantCounters,
    current: &ApplicantCounters,
    allow_regression: bool,
) -> Option<ApplicantStatusChange> {
    if current.status == ApplicantStatus::NotSubmitted
        && current.admin_accepted_docs > 0
        && prev.admin_accepted_docs == 0
    {
        return Some(ApplicantStatusChange::MarkIncomplete);
    }

    if current.status == ApplicantStatus::Incomplete
        && current.total_docs == current.accepted_docs
        && prev.accepted_docs < prev.total_docs
    {
        return Some(ApplicantStatusChange::MarkComplete);
    }

    if allow_regression
        && current.status == ApplicantStatus::Complete
        && current.accepted_docs < current.total_docs
        && prev.accepted_docs >= prev.total_docs
    {
        return Some(ApplicantStatusChange::RegressIncomplete);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;

    const REVIEWED: TransitionContext = TransitionContext {
        admin_check: true,
        is_required: true,
    };
    const UNREVIEWED: TransitionContext = TransitionContext {
        admin_check: false,
        is_required: true,
    };
    const OPTIONAL: TransitionContext = TransitionContext {
        admin_check: true,
        is_required: false,
    };

    #[test]
    fn same_status_is_a_no_op() {
        for status in [NotSubmitted, Submitted, AdminChecked, Accepted, Rejected] {
            assert_eq!(plan_transition(status, status, REVIEWED), None);
        }
    }

    #[test]
    fn unlisted_edges_are_no_ops() {
        assert_eq!(plan_transition(NotSubmitted, Accepted, REVIEWED), None);
        assert_eq!(plan_transition(Accepted, Submitted, REVIEWED), None);
        assert_eq!(plan_transition(Rejected, AdminChecked, REVIEWED), None);
        assert_eq!(plan_transition(Accepted, AdminChecked, REVIEWED), None);
        assert_eq!(plan_transition(Delayed, Submitted, REVIEWED), None);
    }

    #[test]
    fn submission_queues_admin_review() {
        let plan = plan_transition(NotSubmitted, Submitted, REVIEWED).unwrap();
        assert_eq!(plan.form_admin_check_docs, 1);
        assert_eq!(plan.dashboard_actions, 0);

        let plan = plan_transition(NotSubmitted, Submitted, UNREVIEWED).unwrap();
        assert_eq!(plan, TransitionPlan::default());
    }

    #[test]
    fn resubmission_reenters_the_submitted_edge() {
        let plan = plan_transition(Rejected, Submitted, REVIEWED).unwrap();
        assert_eq!(plan.form_admin_check_docs, 1);
    }

    #[test]
    fn admin_check_promotes_required_doc() {
        let plan = plan_transition(Submitted, AdminChecked, REVIEWED).unwrap();
        assert_eq!(plan.form_admin_check_docs, -1);
        assert_eq!(plan.admin_accepted_docs, 1);
        assert_eq!(plan.unchecked_optional_docs, 0);
        assert_eq!(plan.dashboard_actions, 1);
    }

    #[test]
    fn admin_check_tracks_optional_doc_separately() {
        let plan = plan_transition(Submitted, AdminChecked, OPTIONAL).unwrap();
        assert_eq!(plan.admin_accepted_docs, 0);
        assert_eq!(plan.unchecked_optional_docs, 1);
    }

    #[test]
    fn acceptance_settles_counters_and_schedules_stitch() {
        let plan = plan_transition(AdminChecked, Accepted, REVIEWED).unwrap();
        assert_eq!(plan.accepted_docs, 1);
        assert_eq!(plan.dashboard_actions, -1);
        assert!(plan.stitch);
        assert!(!plan.notify_rejection);

        let plan = plan_transition(AdminChecked, Accepted, OPTIONAL).unwrap();
        assert_eq!(plan.accepted_docs, 0);
        assert_eq!(plan.unchecked_optional_docs, -1);
    }

    #[test]
    fn rejection_before_review_only_releases_the_review_slot() {
        let plan = plan_transition(Submitted, Rejected, REVIEWED).unwrap();
        assert_eq!(plan.form_admin_check_docs, -1);
        assert_eq!(plan.admin_accepted_docs, 0);
        assert_eq!(plan.dashboard_actions, 0);
        assert!(!plan.notify_rejection);
    }

    #[test]
    fn rejection_after_review_rolls_back_and_notifies() {
        let plan = plan_transition(AdminChecked, Rejected, REVIEWED).unwrap();
        assert_eq!(plan.admin_accepted_docs, -1);
        assert_eq!(plan.dashboard_actions, -1);
        assert!(plan.notify_rejection);

        let plan = plan_transition(AdminChecked, Rejected, OPTIONAL).unwrap();
        assert_eq!(plan.unchecked_optional_docs, -1);
        assert_eq!(plan.admin_accepted_docs, 0);
    }

    #[test]
    fn waive_toggle_moves_the_total_both_ways() {
        for from in [NotSubmitted, Submitted, AdminChecked, Accepted, Rejected, Delayed] {
            let plan = plan_transition(from, NotApplicable, REVIEWED).unwrap();
            assert_eq!(plan.total_docs, -1);
            let plan = plan_transition(NotApplicable, from, REVIEWED).unwrap();
            assert_eq!(plan.total_docs, 1);
        }
    }

    #[test]
    fn counters_stay_ordered_through_a_full_lifecycle() {
        let mut counters = ApplicantCounters {
            status: ApplicantStatus::NotSubmitted,
            total_docs: 2,
            admin_accepted_docs: 0,
            accepted_docs: 0,
        };
        let edges = [
            (NotSubmitted, Submitted),
            (Submitted, AdminChecked),
            (AdminChecked, Rejected),
            (Rejected, Submitted),
            (Submitted, AdminChecked),
            (AdminChecked, Accepted),
        ];
        for (old, new) in edges {
            if let Some(plan) = plan_transition(old, new, REVIEWED) {
                counters = counters.apply(&plan);
                assert!(counters.invariant_holds(), "violated after {old} -> {new}");
            }
        }
        assert_eq!(counters.admin_accepted_docs, 1);
        assert_eq!(counters.accepted_docs, 1);
    }

    #[test]
    fn applicant_becomes_incomplete_on_first_admin_accept() {
        let prev = ApplicantCounters {
            status: ApplicantStatus::NotSubmitted,
            total_docs: 2,
            admin_accepted_docs: 0,
            accepted_docs: 0,
        };
        let current = ApplicantCounters {
            admin_accepted_docs: 1,
            ..prev
        };
        assert_eq!(
            plan_applicant_status(&prev, &current, false),
            Some(ApplicantStatusChange::MarkIncomplete)
        );
        // Redelivery of the same snapshot pair with no 0 -> >0 edge is inert.
        assert_eq!(plan_applicant_status(&current, &current, false), None);
    }

    #[test]
    fn applicant_completes_when_every_doc_is_accepted() {
        let prev = ApplicantCounters {
            status: ApplicantStatus::Incomplete,
            total_docs: 2,
            admin_accepted_docs: 2,
            accepted_docs: 1,
        };
        let current = ApplicantCounters {
            accepted_docs: 2,
            ..prev
        };
        assert_eq!(
            plan_applicant_status(&prev, &current, false),
            Some(ApplicantStatusChange::MarkComplete)
        );
    }

    #[test]
    fn regression_is_opt_in() {
        let prev = ApplicantCounters {
            status: ApplicantStatus::Complete,
            total_docs: 2,
            admin_accepted_docs: 2,
            accepted_docs: 2,
        };
        let current = ApplicantCounters {
            accepted_docs: 1,
            admin_accepted_docs: 1,
            ..prev
        };
        assert_eq!(plan_applicant_status(&prev, &current, false), None);
        assert_eq!(
            plan_applicant_status(&prev, &current, true),
            Some(ApplicantStatusChange::RegressIncomplete)
        );
    }

    #[test]
    fn status_round_trips_through_storage() {
        for status in [
            NotSubmitted,
            Delayed,
            Submitted,
            AdminChecked,
            Accepted,
            Rejected,
            NotApplicable,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("checked"), None);
    }
}
