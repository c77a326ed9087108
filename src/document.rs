//! Documents, their owning organizations and the builders used to create them
use super::definition::{StepDraft, WorkflowDefinition};
use super::error::WorkflowError;
use super::types::{DocumentState, TimeStamp};
use chrono::Utc;

pub const MAX_TITLE_LEN: usize = 300;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Document {
    #[n(0)]
    pub id: String, // uuid7, bech32 "doc_"
    #[n(1)]
    pub organization_id: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: Option<String>,
    #[n(4)]
    pub document_type: String,
    #[n(5)]
    pub workflow: WorkflowDefinition,
    #[n(6)]
    pub state: DocumentState,
    #[n(7)]
    pub created_by: String,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub modified_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub version: u64, // bumped on every committed transition
}

// used for constructing documents before they are frozen
#[derive(Debug, Default, Clone)]
pub struct NewDocument {
    organization_id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    document_type: Option<String>,
    steps: Vec<StepDraft>,
    created_by: Option<String>,
}

/// The validated pieces of a [`NewDocument`], ready to be stamped with an id.
#[derive(Debug, Clone)]
pub struct DocumentDraft {
    pub organization_id: String,
    pub title: String,
    pub description: Option<String>,
    pub document_type: String,
    pub workflow: WorkflowDefinition,
    pub created_by: String,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_organization(mut self, organization_id: &str) -> Self {
        self.organization_id = Some(organization_id.to_string());
        self
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_document_type(mut self, document_type: &str) -> Self {
        self.document_type = Some(document_type.to_string());
        self
    }
    pub fn set_created_by(mut self, user_id: &str) -> Self {
        self.created_by = Some(user_id.to_string());
        self
    }
    pub fn add_step(mut self, step: StepDraft) -> Self {
        self.steps.push(step);
        self
    }
    pub fn set_steps(mut self, steps: Vec<StepDraft>) -> Self {
        self.steps = steps;
        self
    }

    // Checks fields and freezes the workflow definition
    pub fn validate_and_finalise(self) -> Result<DocumentDraft, WorkflowError> {
        let organization_id = required(self.organization_id, "organization")?;
        let title = required(self.title, "title")?;
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(WorkflowError::InvalidDocument(format!(
                "title is longer than {MAX_TITLE_LEN} characters"
            )));
        }
        let document_type = required(self.document_type, "document type")?;
        let created_by = required(self.created_by, "creator")?;
        let workflow = WorkflowDefinition::freeze(self.steps)?;

        Ok(DocumentDraft {
            organization_id,
            title,
            description: self.description.filter(|d| !d.trim().is_empty()),
            document_type,
            workflow,
            created_by,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, WorkflowError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(WorkflowError::InvalidDocument(format!("{field} is required"))),
    }
}

impl DocumentDraft {
    /// Documents enter review as soon as they are created, with no history.
    pub fn into_document(self, id: String, created_at: TimeStamp<Utc>) -> Document {
        Document {
            id,
            organization_id: self.organization_id,
            title: self.title,
            description: self.description,
            document_type: self.document_type,
            workflow: self.workflow,
            state: DocumentState::InReview,
            created_by: self.created_by,
            created_at,
            modified_at: None,
            approved_at: None,
            version: 0,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub tax_id: String, // unique across organizations
    #[n(3)]
    pub phone: Option<String>,
    #[n(4)]
    pub address: Option<String>,
    #[n(5)]
    pub email: Option<String>,
    #[n(6)]
    pub active: bool,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub tax_id: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
}

impl NewOrganization {
    pub fn new(name: &str, tax_id: &str) -> Self {
        Self {
            name: name.to_string(),
            tax_id: tax_id.to_string(),
            ..Self::default()
        }
    }

    pub fn into_organization(
        self,
        id: String,
        created_at: TimeStamp<Utc>,
    ) -> Result<Organization, WorkflowError> {
        let name = required(Some(self.name), "organization name")?;
        let tax_id = required(Some(self.tax_id), "organization tax id")?;

        Ok(Organization {
            id,
            name,
            tax_id,
            phone: self.phone,
            address: self.address,
            email: self.email,
            active: true,
            created_at,
        })
    }
}

/// What a caller may hand out once a document has passed every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalReceipt {
    pub document_id: String,
    pub title: String,
    pub state: DocumentState,
    pub approved_at: Option<TimeStamp<Utc>>,
}

impl ApprovalReceipt {
    pub fn for_document(document: &Document) -> Result<Self, WorkflowError> {
        if document.state != DocumentState::Approved {
            return Err(WorkflowError::NotApproved(document.state));
        }
        Ok(Self {
            document_id: document.id.clone(),
            title: document.title.clone(),
            state: document.state,
            approved_at: document.approved_at.clone(),
        })
    }
}
