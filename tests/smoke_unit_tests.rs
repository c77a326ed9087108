//! Smoke screen unit tests for the approval workflow components
//!
//! These span the public API of the crate and test behaviour in isolation
//! from storage. They are intended as a smoke screen and mostly cover the
//! happy path.

use chrono::{Datelike, Timelike, Utc};
use document_approval::{
    Action, DocumentState,
    config::Config,
    definition::{StepDraft, WorkflowDefinition},
    document::{ApprovalReceipt, NewDocument, NewOrganization},
    instance::format_history,
    machine::{ProposedAction, StaticRoles, TrustedClaims},
    types::TimeStamp,
    utils::new_uuid_to_bech32,
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_uuid_to_bech32 generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("doc_").unwrap();

        assert!(encoded.starts_with("doc_1"));
        assert!(encoded.len() > 10);
    }

    /// Test that the function handles empty strings appropriately
    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    /// Test that multiple calls generate unique identifiers
    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("user_").unwrap();
        let id2 = new_uuid_to_bech32("user_").unwrap();

        assert_ne!(id1, id2);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    /// Test that TimeStamp::new() creates a timestamp close to current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();

        assert!(diff < 1);
    }

    /// Test that TimeStamp can be created with specific date/time values
    #[test]
    fn timestamp_new_with_creates_specific_time() {
        let dt = TimeStamp::new_with(2024, 6, 15, 10, 30, 0)
            .unwrap()
            .to_datetime_utc();

        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 6);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    /// Test the names states and actions render with
    #[test]
    fn display_names() {
        assert_eq!(DocumentState::InReview.to_string(), "in_review");
        assert_eq!(DocumentState::Rejected.to_string(), "rejected");
        assert_eq!(Action::Approve.to_string(), "approve");
    }
}

// DOCUMENT MODULE TESTS
#[cfg(test)]
mod document_tests {
    use super::*;

    /// Test that a freshly created document has nothing approved yet
    #[test]
    fn new_document_is_in_review_without_receipt() {
        let document = NewDocument::new()
            .set_organization("org_1")
            .set_title("Lease agreement")
            .set_document_type("contract")
            .set_created_by("user_1")
            .add_step(StepDraft::new(2, "legal"))
            .add_step(StepDraft::new(1, "facilities"))
            .validate_and_finalise()
            .unwrap()
            .into_document("doc_1".into(), TimeStamp::new());

        assert_eq!(document.state, DocumentState::InReview);
        assert_eq!(document.workflow.first_step().unwrap().role, "facilities");
        assert!(ApprovalReceipt::for_document(&document).is_err());
    }

    /// Test that organizations need a name and a tax id
    #[test]
    fn organization_requires_name_and_tax_id() {
        let ok = NewOrganization::new("Acme", "900123")
            .into_organization("org_1".into(), TimeStamp::new())
            .unwrap();
        assert!(ok.active);

        assert!(
            NewOrganization::new("", "900123")
                .into_organization("org_2".into(), TimeStamp::new())
                .is_err()
        );
        assert!(
            NewOrganization::new("Acme", " ")
                .into_organization("org_3".into(), TimeStamp::new())
                .is_err()
        );
    }
}

// MACHINE MODULE TESTS
#[cfg(test)]
mod machine_tests {
    use super::*;
    use document_approval::{evaluate, machine::RoleResolver};

    /// Test that static role tables only answer for granted roles
    #[test]
    fn static_roles_membership() {
        let roles = StaticRoles::new()
            .grant("user_a", "legal")
            .grant("user_a", "finance");

        assert!(roles.is_member("user_a", "legal"));
        assert!(roles.is_member("user_a", "finance"));
        assert!(!roles.is_member("user_a", "board"));
        assert!(!roles.is_member("user_b", "legal"));
    }

    /// Test a single-step approval end to end through evaluate
    #[test]
    fn single_step_approval() {
        let definition = WorkflowDefinition::freeze(vec![StepDraft::new(1, "legal")]).unwrap();
        let eval = evaluate(
            "doc_1",
            &definition,
            &[],
            DocumentState::InReview,
            &ProposedAction::approve("user_a", "legal").with_reason("looks good"),
            &TrustedClaims,
            TimeStamp::new(),
        )
        .unwrap();

        assert_eq!(eval.new_state, DocumentState::Approved);
        assert!(format_history(&[eval.record]).contains("approve by user_a as legal"));
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;

    /// Test loading configuration from a file on disk
    #[test]
    fn loads_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("approvals.toml");
        std::fs::write(&path, "logging_level = \"warn\"\n")?;

        let config = Config::load(&path)?;
        assert_eq!(config.logging_level(), "warn");
        assert!(!config.flush_on_commit());

        Ok(())
    }

    /// Test that a missing file is reported rather than defaulted
    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(std::path::Path::new("/nonexistent/approvals.toml")).is_err());
    }
}
