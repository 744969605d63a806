use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("undecodable notification: {0}")]
    Json(#[from] serde_json::Error),
    #[error("notification carries code id 0")]
    ZeroCodeId,
}

/// "This code id claims to be a CW20 token", with the interface schemas it published.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationNotification {
    pub code_id: u64,
    pub execute_schema: Value,
    pub query_schema: Value,
}

impl VerificationNotification {
    pub fn from_slice(payload: &[u8]) -> Result<VerificationNotification, NotificationError> {
        let n: VerificationNotification = serde_json::from_slice(payload)?;
        if n.code_id == 0 {
            return Err(NotificationError::ZeroCodeId);
        }
        Ok(n)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, NotificationError> {
        Ok(serde_json::to_vec(self)?)
    }
}
