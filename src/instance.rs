//! Instance records: the append-only audit trail of resolved steps
use super::error::{WorkflowError, encode};
use super::types::{Action, TimeStamp};
use chrono::Utc;
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct InstanceRecord {
    #[n(0)]
    pub document_id: String,
    #[n(1)]
    pub order: u32, // the step this record resolves
    #[n(2)]
    pub validator_role: String,
    #[n(3)]
    pub validator_id: String,
    #[n(4)]
    pub action: Action,
    #[n(5)]
    pub reason: Option<String>,
    #[n(6)]
    pub metadata: BTreeMap<String, String>,
    #[n(7)]
    pub timestamp: TimeStamp<Utc>,
}

impl InstanceRecord {
    /// Serialise the record and derive its content address.
    pub fn build(&self) -> Result<(String, Vec<u8>), WorkflowError> {
        let cbor = encode(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }

    pub fn id(&self) -> Result<String, WorkflowError> {
        self.build().map(|(hash, _)| hash)
    }
}

/// Render a document's history as one line per resolved step.
pub fn format_history(history: &[InstanceRecord]) -> String {
    history
        .iter()
        .map(|record| {
            let reason = record
                .reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            format!(
                "#{} {} by {} as {} at {}{}",
                record.order,
                record.action,
                record.validator_id,
                record.validator_role,
                record.timestamp,
                reason
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
