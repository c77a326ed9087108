//! Utility functions for identifiers

use bech32::Bech32m;
use uuid7::uuid7;

pub const DOCUMENT_HRP: &str = "doc_";
pub const ORGANIZATION_HRP: &str = "org_";
pub const USER_HRP: &str = "user_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

// the prefixes above are constants, so encoding can only fail on a bech32 bug
pub(crate) fn new_id(hrp: &str) -> Result<String, crate::error::WorkflowError> {
    new_uuid_to_bech32(hrp).map_err(|e| crate::error::WorkflowError::Encode(e.to_string()))
}
