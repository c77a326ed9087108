//! Durable storage for documents, organizations and instance history
use super::document::{Document, Organization};
use super::error::{WorkflowError, encode};
use super::instance::InstanceRecord;
use super::types::{DocumentState, TimeStamp};
use chrono::Utc;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use std::sync::Arc;

const DOCUMENTS: &str = "documents";
const INSTANCES: &str = "instances";
const ORGANIZATIONS: &str = "organizations";
const ORGANIZATION_TAX_IDS: &str = "organization_tax_ids";

/// Everything needed to commit one evaluated action.
#[derive(Debug, Clone)]
pub struct Transition {
    pub document_id: String,
    pub expected_version: u64,
    pub new_state: DocumentState,
    pub approved_at: Option<TimeStamp<Utc>>,
    pub record: InstanceRecord,
}

#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub organization_id: Option<String>,
    pub state: Option<DocumentState>,
}

impl DocumentFilter {
    pub fn matches(&self, document: &Document) -> bool {
        self.organization_id
            .as_ref()
            .is_none_or(|org| *org == document.organization_id)
            && self.state.is_none_or(|state| state == document.state)
    }
}

pub trait DocumentStore: Send + Sync {
    fn insert_document(&self, document: &Document) -> Result<(), WorkflowError>;
    fn load_document(&self, id: &str) -> Result<Document, WorkflowError>;
    /// Records for `document_id`, in increasing step order.
    fn load_instance_history(&self, document_id: &str)
    -> Result<Vec<InstanceRecord>, WorkflowError>;
    /// Atomically append the record and update the document, provided the
    /// document is still at `expected_version`. Returns the new version.
    fn commit_transition(&self, transition: &Transition) -> Result<u64, WorkflowError>;
    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, WorkflowError>;
    /// Remove a document together with its whole history.
    fn delete_document(&self, id: &str) -> Result<(), WorkflowError>;

    fn insert_organization(&self, organization: &Organization) -> Result<(), WorkflowError>;
    fn load_organization(&self, id: &str) -> Result<Organization, WorkflowError>;
    fn list_organizations(&self) -> Result<Vec<Organization>, WorkflowError>;
}

pub struct SledStore {
    instance: Arc<Db>,
    documents: Tree,
    instances: Tree,
    organizations: Tree,
    tax_ids: Tree,
    flush_on_commit: bool,
}

fn document_not_found(id: &str) -> WorkflowError {
    WorkflowError::NotFound {
        entity: "document",
        id: id.to_string(),
    }
}

// '/' never appears in a bech32 id, so one document's prefix cannot match another's
fn history_prefix(document_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(document_id.len() + 1);
    key.extend_from_slice(document_id.as_bytes());
    key.push(b'/');
    key
}

fn history_key(document_id: &str, order: u32) -> Vec<u8> {
    let mut key = history_prefix(document_id);
    key.extend_from_slice(&order.to_be_bytes());
    key
}

fn flatten(err: TransactionError<WorkflowError>) -> WorkflowError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => WorkflowError::Storage(e),
    }
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Result<Self, WorkflowError> {
        Ok(Self {
            documents: instance.open_tree(DOCUMENTS)?,
            instances: instance.open_tree(INSTANCES)?,
            organizations: instance.open_tree(ORGANIZATIONS)?,
            tax_ids: instance.open_tree(ORGANIZATION_TAX_IDS)?,
            instance,
            flush_on_commit: false,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    pub fn flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    fn flush(&self) -> Result<(), WorkflowError> {
        if self.flush_on_commit {
            self.instance.flush()?;
        }
        Ok(())
    }
}

impl DocumentStore for SledStore {
    fn insert_document(&self, document: &Document) -> Result<(), WorkflowError> {
        let cbor = encode(document)?;
        // ids are fresh uuid7s, a collision means something upstream reused one
        self.documents
            .compare_and_swap(document.id.as_bytes(), None as Option<&[u8]>, Some(cbor))?
            .map_err(|_| {
                WorkflowError::InvalidDocument(format!("document '{}' already exists", document.id))
            })?;
        self.flush()
    }

    fn load_document(&self, id: &str) -> Result<Document, WorkflowError> {
        let bytes = self
            .documents
            .get(id.as_bytes())?
            .ok_or_else(|| document_not_found(id))?;
        Ok(minicbor::decode(&bytes)?)
    }

    fn load_instance_history(
        &self,
        document_id: &str,
    ) -> Result<Vec<InstanceRecord>, WorkflowError> {
        self.instances
            .scan_prefix(history_prefix(document_id))
            .values()
            .map(|value| -> Result<InstanceRecord, WorkflowError> {
                let bytes = value?;
                Ok(minicbor::decode(&bytes)?)
            })
            .collect()
    }

    fn commit_transition(&self, transition: &Transition) -> Result<u64, WorkflowError> {
        let doc_key = transition.document_id.as_bytes();
        let record_key = history_key(&transition.document_id, transition.record.order);
        let record_cbor = encode(&transition.record)?;

        let version = (&self.documents, &self.instances)
            .transaction(|(documents, instances)| -> ConflictableTransactionResult<u64, WorkflowError> {
                let abort = ConflictableTransactionError::Abort;

                let bytes = documents
                    .get(doc_key)?
                    .ok_or_else(|| abort(document_not_found(&transition.document_id)))?;
                let mut document: Document =
                    minicbor::decode(&bytes).map_err(|e| abort(e.into()))?;

                if document.version != transition.expected_version {
                    return Err(abort(WorkflowError::Conflict {
                        document_id: transition.document_id.clone(),
                        expected: transition.expected_version,
                        found: document.version,
                    }));
                }
                // each step resolves exactly once
                if instances.get(record_key.as_slice())?.is_some() {
                    return Err(abort(WorkflowError::Conflict {
                        document_id: transition.document_id.clone(),
                        expected: transition.expected_version,
                        found: document.version,
                    }));
                }

                document.state = transition.new_state;
                document.modified_at = Some(transition.record.timestamp.clone());
                if transition.approved_at.is_some() {
                    document.approved_at = transition.approved_at.clone();
                }
                document.version += 1;

                let doc_cbor = encode(&document).map_err(abort)?;
                instances.insert(record_key.as_slice(), record_cbor.as_slice())?;
                documents.insert(doc_key, doc_cbor)?;

                Ok(document.version)
            })
            .map_err(flatten)?;

        self.flush()?;
        Ok(version)
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>, WorkflowError> {
        let mut documents = Vec::new();
        for value in self.documents.iter().values() {
            let document: Document = minicbor::decode(&value?)?;
            if filter.matches(&document) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn delete_document(&self, id: &str) -> Result<(), WorkflowError> {
        loop {
            // the version is read before the scan: if it still holds inside the
            // transaction, no record was committed after the scan
            let expected = self.load_document(id)?.version;
            let history_keys = self
                .instances
                .scan_prefix(history_prefix(id))
                .keys()
                .collect::<Result<Vec<_>, _>>()?;

            let deleted = (&self.documents, &self.instances)
                .transaction(|(documents, instances)| -> ConflictableTransactionResult<(), WorkflowError> {
                    let abort = ConflictableTransactionError::Abort;

                    let bytes = documents
                        .get(id.as_bytes())?
                        .ok_or_else(|| abort(document_not_found(id)))?;
                    let document: Document =
                        minicbor::decode(&bytes).map_err(|e| abort(e.into()))?;

                    if document.version != expected {
                        return Err(abort(WorkflowError::Conflict {
                            document_id: id.to_string(),
                            expected,
                            found: document.version,
                        }));
                    }

                    documents.remove(id.as_bytes())?;
                    for key in &history_keys {
                        instances.remove(key.clone())?;
                    }
                    Ok(())
                })
                .map_err(flatten);

            match deleted {
                // a transition landed after the scan, rescan its history
                Err(WorkflowError::Conflict { .. }) => continue,
                other => other?,
            }

            return self.flush();
        }
    }

    fn insert_organization(&self, organization: &Organization) -> Result<(), WorkflowError> {
        let cbor = encode(organization)?;

        (&self.organizations, &self.tax_ids)
            .transaction(|(organizations, tax_ids)| -> ConflictableTransactionResult<(), WorkflowError> {
                if tax_ids.get(organization.tax_id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        WorkflowError::DuplicateOrganization(organization.tax_id.clone()),
                    ));
                }
                tax_ids.insert(organization.tax_id.as_bytes(), organization.id.as_bytes())?;
                organizations.insert(organization.id.as_bytes(), cbor.as_slice())?;
                Ok(())
            })
            .map_err(flatten)?;

        self.flush()
    }

    fn load_organization(&self, id: &str) -> Result<Organization, WorkflowError> {
        let bytes = self
            .organizations
            .get(id.as_bytes())?
            .ok_or_else(|| WorkflowError::NotFound {
                entity: "organization",
                id: id.to_string(),
            })?;
        Ok(minicbor::decode(&bytes)?)
    }

    fn list_organizations(&self) -> Result<Vec<Organization>, WorkflowError> {
        self.organizations
            .iter()
            .values()
            .map(|value| -> Result<Organization, WorkflowError> {
                Ok(minicbor::decode(&value?)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_keys_sort_by_order() {
        let a = history_key("doc_abc", 2);
        let b = history_key("doc_abc", 10);
        let c = history_key("doc_abc", 256);

        assert!(a < b && b < c);
        assert!(a.starts_with(&history_prefix("doc_abc")));
        assert!(!a.starts_with(&history_prefix("doc_ab")));
    }

    #[test]
    fn filter_matches_on_every_set_field() {
        let filter = DocumentFilter {
            organization_id: Some("org_1".into()),
            state: Some(DocumentState::Approved),
        };
        let mut document = crate::document::NewDocument::new()
            .set_organization("org_1")
            .set_title("Policy")
            .set_document_type("policy")
            .set_created_by("user_1")
            .add_step(crate::definition::StepDraft::new(1, "legal"))
            .validate_and_finalise()
            .unwrap()
            .into_document("doc_1".into(), TimeStamp::new());

        assert!(!filter.matches(&document));
        document.state = DocumentState::Approved;
        assert!(filter.matches(&document));
        assert!(DocumentFilter::default().matches(&document));
    }
}
