// ABOUTME: Data principal type definitions
// ABOUTME: The end user granting consent; PII stays here and never enters the history ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPrincipal {
    pub id: String,
    pub external_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataPrincipal {
    /// True when at least one contact channel is on file.
    pub fn has_contact(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalUpsertInput {
    pub external_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub language: Option<String>,
}
