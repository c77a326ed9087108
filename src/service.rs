//! Service layer API for document workflow operations
//!
//! [`WorkflowService::apply_action`] is the only way a document's workflow
//! state changes: it reads the document and its history, asks the state
//! machine for the effect of the action, then commits record and state
//! together, guarded by the document version read at the start.
use super::clock::{Clock, SystemClock};
use super::config::Config;
use super::document::{ApprovalReceipt, Document, NewDocument, NewOrganization, Organization};
use super::error::WorkflowError;
use super::instance::InstanceRecord;
use super::machine::{self, ProposedAction, RoleResolver};
use super::store::{DocumentFilter, DocumentStore, SledStore, Transition};
use super::types::DocumentState;
use super::utils::{self, DOCUMENT_HRP, ORGANIZATION_HRP};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a committed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub document_id: String,
    pub state: DocumentState,
    pub record_id: String,
    pub version: u64,
    pub next_step: Option<u32>,
}

/// A document with its full history, as returned by [`WorkflowService::get_document`].
#[derive(Debug, Clone)]
pub struct DocumentView {
    pub document: Document,
    pub history: Vec<InstanceRecord>,
}

impl DocumentView {
    pub fn pending_step(&self) -> Option<u32> {
        if self.document.state.is_terminal() {
            return None;
        }
        machine::pending_step(&self.document.workflow, &self.history).map(|step| step.order)
    }
}

pub struct WorkflowService<S: DocumentStore = SledStore> {
    store: Arc<S>,
    roles: Arc<dyn RoleResolver>,
    clock: Arc<dyn Clock>,
}

impl WorkflowService<SledStore> {
    /// Open the sled database named in `config`.
    pub fn open(config: &Config, roles: Arc<dyn RoleResolver>) -> Result<Self, WorkflowError> {
        let store = SledStore::open(config.db_path())?.flush_on_commit(config.flush_on_commit());
        info!(path = %config.db_path().display(), "opened document store");
        Ok(Self::new(Arc::new(store), roles, Arc::new(SystemClock)))
    }
}

impl<S: DocumentStore> WorkflowService<S> {
    pub fn new(store: Arc<S>, roles: Arc<dyn RoleResolver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            roles,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register an organization that can own documents
    pub fn create_organization(
        &self,
        organization: NewOrganization,
    ) -> Result<Organization, WorkflowError> {
        let id = utils::new_id(ORGANIZATION_HRP)?;
        let organization = organization.into_organization(id, self.clock.now())?;

        self.store.insert_organization(&organization)?;
        info!(organization_id = %organization.id, name = %organization.name, "organization created");

        Ok(organization)
    }

    pub fn get_organization(&self, id: &str) -> Result<Organization, WorkflowError> {
        self.store.load_organization(id)
    }

    pub fn list_organizations(&self) -> Result<Vec<Organization>, WorkflowError> {
        self.store.list_organizations()
    }

    /// Validate a new document, freeze its workflow and put it into review
    pub fn create_document(&self, new_document: NewDocument) -> Result<Document, WorkflowError> {
        let draft = new_document.validate_and_finalise()?;

        // the owning organization must exist
        self.store.load_organization(&draft.organization_id)?;

        let id = utils::new_id(DOCUMENT_HRP)?;
        let document = draft.into_document(id, self.clock.now());

        self.store.insert_document(&document)?;
        info!(
            document_id = %document.id,
            organization_id = %document.organization_id,
            steps = document.workflow.len(),
            "document created and sent to review"
        );

        Ok(document)
    }

    /// Record an approval or rejection against the document's pending step
    pub fn apply_action(
        &self,
        document_id: &str,
        proposal: ProposedAction,
    ) -> Result<ActionOutcome, WorkflowError> {
        let document = self.store.load_document(document_id)?;
        let history = self.store.load_instance_history(document_id)?;
        debug!(
            document_id,
            version = document.version,
            resolved = history.len(),
            "loaded document for action"
        );

        // every commit appends one record and bumps the version by one, so a
        // mismatch means a commit landed between the two reads
        let resolved = history.len() as u64;
        if resolved != document.version {
            // a delete between the reads also empties the history
            self.store.load_document(document_id)?;
            let conflict = WorkflowError::Conflict {
                document_id: document_id.to_string(),
                expected: document.version,
                found: resolved,
            };
            warn!(document_id, "{conflict}");
            return Err(conflict);
        }

        let evaluation = machine::evaluate(
            document_id,
            &document.workflow,
            &history,
            document.state,
            &proposal,
            self.roles.as_ref(),
            self.clock.now(),
        )
        .inspect_err(|e| match e {
            WorkflowError::NoPendingStep { .. } => error!(
                document_id,
                state = %document.state,
                resolved = history.len(),
                steps = document.workflow.len(),
                "document history is inconsistent with its workflow: {e}"
            ),
            WorkflowError::RoleMismatch { .. } => warn!(document_id, "{e}"),
            _ => debug!(document_id, "action refused: {e}"),
        })?;

        let record_id = evaluation.record.id()?;
        let transition = Transition {
            document_id: document_id.to_string(),
            expected_version: document.version,
            new_state: evaluation.new_state,
            approved_at: evaluation.approved_at.clone(),
            record: evaluation.record,
        };

        let version = self
            .store
            .commit_transition(&transition)
            .inspect_err(|e| {
                if e.is_retryable() {
                    warn!(document_id, "{e}");
                }
            })?;

        info!(
            document_id,
            order = transition.record.order,
            action = %transition.record.action,
            actor = %transition.record.validator_id,
            state = %evaluation.new_state,
            version,
            "workflow action committed"
        );

        Ok(ActionOutcome {
            document_id: document_id.to_string(),
            state: evaluation.new_state,
            record_id,
            version,
            next_step: evaluation.next_step,
        })
    }

    pub fn get_document(&self, document_id: &str) -> Result<DocumentView, WorkflowError> {
        let document = self.store.load_document(document_id)?;
        let history = self.store.load_instance_history(document_id)?;

        Ok(DocumentView { document, history })
    }

    pub fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, WorkflowError> {
        self.store.list_documents(filter)
    }

    pub fn document_history(&self, document_id: &str) -> Result<Vec<InstanceRecord>, WorkflowError> {
        // distinguish an unknown document from one with no actions yet
        self.store.load_document(document_id)?;
        self.store.load_instance_history(document_id)
    }

    /// Release information for an approved document
    pub fn approved_document(&self, document_id: &str) -> Result<ApprovalReceipt, WorkflowError> {
        let document = self.store.load_document(document_id)?;
        ApprovalReceipt::for_document(&document)
    }

    /// Delete a document and, with it, its whole history
    pub fn delete_document(&self, document_id: &str) -> Result<(), WorkflowError> {
        self.store.delete_document(document_id)?;
        info!(document_id, "document deleted with its history");
        Ok(())
    }
}
