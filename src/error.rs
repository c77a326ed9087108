use crate::types::DocumentState;

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Unknown validation action '{0}', expected 'approve' or 'reject'")]
    InvalidAction(String),
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Document is already {0} and accepts no further actions")]
    AlreadyTerminal(DocumentState),
    #[error("Document is {0}, actions are only accepted while in review")]
    NotInReview(DocumentState),
    #[error("Document '{document_id}' is in review but every step is already resolved")]
    NoPendingStep { document_id: String },
    #[error("Actor '{actor_id}' cannot resolve step {order}: {reason}")]
    RoleMismatch {
        actor_id: String,
        order: u32,
        reason: String,
    },
    #[error("Document '{document_id}' changed concurrently (expected version {expected}, found {found})")]
    Conflict {
        document_id: String,
        expected: u64,
        found: u64,
    },
    #[error("Document is {0}, only approved documents can be released")]
    NotApproved(DocumentState),
    #[error("An organization with tax id '{0}' already exists")]
    DuplicateOrganization(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to decode stored record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
}

impl WorkflowError {
    /// Only concurrent modification may be retried, after re-reading the document.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Conflict { .. })
    }

    /// Broken invariants or infrastructure failures; never the caller's fault.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            WorkflowError::NoPendingStep { .. }
                | WorkflowError::Storage(_)
                | WorkflowError::Decode(_)
                | WorkflowError::Encode(_)
        )
    }

    pub fn is_caller_error(&self) -> bool {
        !self.is_retryable() && !self.is_internal()
    }
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, WorkflowError> {
    minicbor::to_vec(value).map_err(|e| WorkflowError::Encode(e.to_string()))
}
