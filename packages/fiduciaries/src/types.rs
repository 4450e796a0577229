// ABOUTME: Data fiduciary type definitions
// ABOUTME: The organization requesting consent; authorization and webhook lookups only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFiduciary {
    pub id: String,
    pub name: String,
    pub webhook_url: Option<String>,
    pub contact_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiduciaryCreateInput {
    pub name: String,
    pub webhook_url: Option<String>,
    pub contact_email: Option<String>,
}
