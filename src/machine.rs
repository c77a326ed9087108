//! The workflow state machine
//!
//! Pure decision logic: given a document's state, its frozen definition and
//! the records already written against it, work out which step is pending and
//! what a proposed action does to the document. Nothing here touches storage
//! or reads the clock; the coordinator in [`crate::service`] owns both.
use super::definition::{Step, WorkflowDefinition};
use super::error::WorkflowError;
use super::instance::InstanceRecord;
use super::types::{Action, DocumentState, TimeStamp};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Confirms whether an actor holds a role. Supplied by the identity layer.
pub trait RoleResolver: Send + Sync {
    fn is_member(&self, actor_id: &str, role: &str) -> bool;
}

impl<F> RoleResolver for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_member(&self, actor_id: &str, role: &str) -> bool {
        self(actor_id, role)
    }
}

/// Accepts every membership query. For callers whose identity layer has
/// already verified the role carried in the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrustedClaims;

impl RoleResolver for TrustedClaims {
    fn is_member(&self, _actor_id: &str, _role: &str) -> bool {
        true
    }
}

/// A fixed actor → roles table.
#[derive(Debug, Default, Clone)]
pub struct StaticRoles {
    members: HashMap<String, HashSet<String>>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn grant(mut self, actor_id: &str, role: &str) -> Self {
        self.members
            .entry(actor_id.to_string())
            .or_default()
            .insert(role.to_string());
        self
    }
}

impl RoleResolver for StaticRoles {
    fn is_member(&self, actor_id: &str, role: &str) -> bool {
        self.members
            .get(actor_id)
            .is_some_and(|roles| roles.contains(role))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedAction {
    pub actor_id: String,
    pub actor_role: String,
    pub action: Action,
    pub reason: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ProposedAction {
    pub fn new(actor_id: &str, actor_role: &str, action: Action) -> Self {
        Self {
            actor_id: actor_id.to_string(),
            actor_role: actor_role.to_string(),
            action,
            reason: None,
            metadata: BTreeMap::new(),
        }
    }
    pub fn approve(actor_id: &str, actor_role: &str) -> Self {
        Self::new(actor_id, actor_role, Action::Approve)
    }
    pub fn reject(actor_id: &str, actor_role: &str) -> Self {
        Self::new(actor_id, actor_role, Action::Reject)
    }
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// The outcome of a successful evaluation, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub new_state: DocumentState,
    pub record: InstanceRecord,
    pub approved_at: Option<TimeStamp<Utc>>,
    /// The step pending after this action, `None` once terminal.
    pub next_step: Option<u32>,
}

/// The lowest-order step with no record in `history`.
pub fn pending_step<'a>(
    definition: &'a WorkflowDefinition,
    history: &[InstanceRecord],
) -> Option<&'a Step> {
    let resolved: HashSet<u32> = history.iter().map(|record| record.order).collect();
    definition
        .steps()
        .iter()
        .find(|step| !resolved.contains(&step.order))
}

fn check_actor(
    step: &Step,
    proposal: &ProposedAction,
    roles: &dyn RoleResolver,
) -> Result<(), WorkflowError> {
    let mismatch = |reason: String| WorkflowError::RoleMismatch {
        actor_id: proposal.actor_id.clone(),
        order: step.order,
        reason,
    };

    if proposal.actor_role != step.role {
        return Err(mismatch(format!(
            "step requires role '{}', actor presented '{}'",
            step.role, proposal.actor_role
        )));
    }
    if !roles.is_member(&proposal.actor_id, &step.role) {
        return Err(mismatch(format!("actor does not hold role '{}'", step.role)));
    }
    if let Some(assigned) = &step.assigned_user_id {
        if *assigned != proposal.actor_id {
            return Err(mismatch(format!("step is assigned to '{assigned}'")));
        }
    }
    Ok(())
}

/// Decide the effect of `proposal` on a document.
///
/// `now` stamps the new record; the function is otherwise deterministic.
pub fn evaluate(
    document_id: &str,
    definition: &WorkflowDefinition,
    history: &[InstanceRecord],
    state: DocumentState,
    proposal: &ProposedAction,
    roles: &dyn RoleResolver,
    now: TimeStamp<Utc>,
) -> Result<Evaluation, WorkflowError> {
    if state.is_terminal() {
        return Err(WorkflowError::AlreadyTerminal(state));
    }
    if state != DocumentState::InReview {
        return Err(WorkflowError::NotInReview(state));
    }

    let step = pending_step(definition, history).ok_or_else(|| WorkflowError::NoPendingStep {
        document_id: document_id.to_string(),
    })?;

    check_actor(step, proposal, roles)?;

    let record = InstanceRecord {
        document_id: document_id.to_string(),
        order: step.order,
        validator_role: step.role.clone(),
        validator_id: proposal.actor_id.clone(),
        action: proposal.action,
        reason: proposal.reason.clone(),
        metadata: proposal.metadata.clone(),
        timestamp: now.clone(),
    };

    let evaluation = match proposal.action {
        Action::Reject => Evaluation {
            new_state: DocumentState::Rejected,
            record,
            approved_at: None,
            next_step: None,
        },
        Action::Approve if definition.is_last(step.order) => Evaluation {
            new_state: DocumentState::Approved,
            record,
            approved_at: Some(now),
            next_step: None,
        },
        Action::Approve => Evaluation {
            new_state: DocumentState::InReview,
            record,
            approved_at: None,
            next_step: definition.next_after(step.order).map(|next| next.order),
        },
    };

    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::StepDraft;

    fn three_steps() -> WorkflowDefinition {
        WorkflowDefinition::freeze(vec![
            StepDraft::new(1, "clerk"),
            StepDraft::new(2, "manager"),
            StepDraft::new(3, "director").assigned_to("user_boss"),
        ])
        .unwrap()
    }

    fn now() -> TimeStamp<Utc> {
        TimeStamp::new_with(2025, 1, 2, 3, 4, 5).unwrap()
    }

    fn run(
        history: &[InstanceRecord],
        state: DocumentState,
        proposal: &ProposedAction,
    ) -> Result<Evaluation, WorkflowError> {
        evaluate(
            "doc_x",
            &three_steps(),
            history,
            state,
            proposal,
            &TrustedClaims,
            now(),
        )
    }

    #[test]
    fn approving_first_step_advances() {
        let eval = run(
            &[],
            DocumentState::InReview,
            &ProposedAction::approve("user_a", "clerk"),
        )
        .unwrap();

        assert_eq!(eval.new_state, DocumentState::InReview);
        assert_eq!(eval.record.order, 1);
        assert_eq!(eval.next_step, Some(2));
        assert!(eval.approved_at.is_none());
    }

    #[test]
    fn approving_last_step_approves_document() {
        let first = run(
            &[],
            DocumentState::InReview,
            &ProposedAction::approve("user_a", "clerk"),
        )
        .unwrap()
        .record;
        let second = run(
            &[first.clone()],
            DocumentState::InReview,
            &ProposedAction::approve("user_b", "manager"),
        )
        .unwrap()
        .record;

        let eval = run(
            &[first, second],
            DocumentState::InReview,
            &ProposedAction::approve("user_boss", "director"),
        )
        .unwrap();

        assert_eq!(eval.new_state, DocumentState::Approved);
        assert_eq!(eval.approved_at, Some(now()));
        assert_eq!(eval.next_step, None);
    }

    #[test]
    fn reject_is_terminal_from_any_step() {
        let eval = run(
            &[],
            DocumentState::InReview,
            &ProposedAction::reject("user_a", "clerk").with_reason("illegible"),
        )
        .unwrap();

        assert_eq!(eval.new_state, DocumentState::Rejected);
        assert_eq!(eval.record.reason.as_deref(), Some("illegible"));
    }

    #[test]
    fn terminal_and_draft_states_refuse_actions() {
        let approve = ProposedAction::approve("user_a", "clerk");
        assert!(matches!(
            run(&[], DocumentState::Rejected, &approve),
            Err(WorkflowError::AlreadyTerminal(DocumentState::Rejected))
        ));
        assert!(matches!(
            run(&[], DocumentState::Approved, &approve),
            Err(WorkflowError::AlreadyTerminal(DocumentState::Approved))
        ));
        assert!(matches!(
            run(&[], DocumentState::Draft, &approve),
            Err(WorkflowError::NotInReview(DocumentState::Draft))
        ));
    }

    #[test]
    fn wrong_role_or_user_is_a_mismatch() {
        assert!(matches!(
            run(
                &[],
                DocumentState::InReview,
                &ProposedAction::approve("user_a", "manager")
            ),
            Err(WorkflowError::RoleMismatch { order: 1, .. })
        ));

        let roles = StaticRoles::new().grant("user_a", "manager");
        let result = evaluate(
            "doc_x",
            &three_steps(),
            &[],
            DocumentState::InReview,
            &ProposedAction::approve("user_a", "clerk"),
            &roles,
            now(),
        );
        assert!(matches!(result, Err(WorkflowError::RoleMismatch { .. })));
    }

    #[test]
    fn assigned_step_only_accepts_that_user() {
        let history: Vec<InstanceRecord> = [(1, "clerk"), (2, "manager")]
            .into_iter()
            .map(|(order, role)| InstanceRecord {
                document_id: "doc_x".into(),
                order,
                validator_role: role.into(),
                validator_id: "user_a".into(),
                action: Action::Approve,
                reason: None,
                metadata: BTreeMap::new(),
                timestamp: now(),
            })
            .collect();

        assert!(matches!(
            run(
                &history,
                DocumentState::InReview,
                &ProposedAction::approve("user_other", "director")
            ),
            Err(WorkflowError::RoleMismatch { order: 3, .. })
        ));
    }

    #[test]
    fn fully_resolved_history_in_review_is_inconsistent() {
        let definition = WorkflowDefinition::freeze(vec![StepDraft::new(1, "clerk")]).unwrap();
        let done = InstanceRecord {
            document_id: "doc_x".into(),
            order: 1,
            validator_role: "clerk".into(),
            validator_id: "user_a".into(),
            action: Action::Approve,
            reason: None,
            metadata: BTreeMap::new(),
            timestamp: now(),
        };

        let result = evaluate(
            "doc_x",
            &definition,
            &[done],
            DocumentState::InReview,
            &ProposedAction::approve("user_a", "clerk"),
            &TrustedClaims,
            now(),
        );
        assert!(matches!(result, Err(WorkflowError::NoPendingStep { .. })));
    }

    #[test]
    fn closures_act_as_resolvers() {
        let only_alice = |actor: &str, _role: &str| actor == "user_alice";
        assert!(only_alice.is_member("user_alice", "clerk"));
        assert!(!only_alice.is_member("user_bob", "clerk"));
    }
}
