//! Workflow definitions: the ordered approval steps frozen into a document at creation
use super::error::WorkflowError;
use std::collections::BTreeSet;

/// A proposed step, as received from the caller before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDraft {
    pub order: u32,
    pub role: String,
    pub user_id: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Step {
    #[n(0)]
    pub order: u32,
    #[n(1)]
    pub role: String,
    #[n(2)]
    pub assigned_user_id: Option<String>,
}

/// Immutable once built: steps are sorted by strictly increasing `order`
/// and there is always at least one.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    #[n(0)]
    steps: Vec<Step>,
}

impl StepDraft {
    pub fn new(order: u32, role: &str) -> Self {
        Self {
            order,
            role: role.to_string(),
            user_id: None,
        }
    }
    pub fn assigned_to(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }
}

impl WorkflowDefinition {
    /// Validate the proposed steps and freeze them into a definition.
    pub fn freeze(drafts: Vec<StepDraft>) -> Result<Self, WorkflowError> {
        if drafts.is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "a workflow needs at least one step".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut steps = Vec::with_capacity(drafts.len());

        for draft in drafts {
            if draft.order == 0 {
                return Err(WorkflowError::InvalidDefinition(
                    "step orders are 1-based".into(),
                ));
            }
            if !seen.insert(draft.order) {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step order {} appears more than once",
                    draft.order
                )));
            }
            let role = draft.role.trim();
            if role.is_empty() {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "step {} has no role",
                    draft.order
                )));
            }
            // an empty user id means "any holder of the role"
            let assigned_user_id = draft
                .user_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty());

            steps.push(Step {
                order: draft.order,
                role: role.to_string(),
                assigned_user_id,
            });
        }

        steps.sort_by_key(|step| step.order);

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn first_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn step(&self, order: u32) -> Option<&Step> {
        self.steps
            .binary_search_by_key(&order, |step| step.order)
            .ok()
            .map(|idx| &self.steps[idx])
    }

    /// The step that follows `order`, if any.
    pub fn next_after(&self, order: u32) -> Option<&Step> {
        self.steps.iter().find(|step| step.order > order)
    }

    pub fn is_last(&self, order: u32) -> bool {
        self.last_step().is_some_and(|step| step.order == order)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl TryFrom<Vec<StepDraft>> for WorkflowDefinition {
    type Error = WorkflowError;

    fn try_from(drafts: Vec<StepDraft>) -> Result<Self, Self::Error> {
        Self::freeze(drafts)
    }
}
