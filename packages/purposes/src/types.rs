// ABOUTME: Purpose and purpose-version type definitions
// ABOUTME: A purpose is stable identity; its terms live in immutable version snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity for "why data is processed". The human-readable terms
/// (title, description, legal basis, data fields) live on the current
/// [`PurposeVersion`], never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purpose {
    pub id: String,
    pub fiduciary_id: String,
    pub category_id: Option<String>,
    pub is_mandatory: bool,
    pub is_active: bool,
    pub requires_renewal: bool,
    pub renewal_period_days: Option<i64>,
    pub retention_period_days: i64,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a purpose's terms at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeVersion {
    pub id: String,
    pub purpose_id: String,
    pub version_number: i64,
    pub title: String,
    pub description: String,
    pub legal_basis: Option<String>,
    pub data_fields: Vec<String>,
    pub processing_activities: Vec<String>,
    pub language_code: String,
    pub is_current: bool,
    pub published_at: DateTime<Utc>,
    pub deprecated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeWithVersion {
    pub purpose: Purpose,
    pub version: PurposeVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeCategory {
    pub id: String,
    pub fiduciary_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeCreateInput {
    pub fiduciary_id: String,
    pub category_id: Option<String>,
    pub title: String,
    pub description: String,
    pub legal_basis: Option<String>,
    pub data_fields: Option<Vec<String>>,
    pub processing_activities: Option<Vec<String>>,
    pub language_code: Option<String>,
    pub is_mandatory: bool,
    pub requires_renewal: bool,
    pub renewal_period_days: Option<i64>,
    pub retention_period_days: i64,
    pub display_order: Option<i64>,
}

/// Patch for an existing purpose. Tracked fields produce a new version when
/// they differ from the current one; display_order mutates in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurposeUpdateInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub legal_basis: Option<String>,
    pub category_id: Option<String>,
    pub data_fields: Option<Vec<String>>,
    pub processing_activities: Option<Vec<String>>,
    pub is_mandatory: Option<bool>,
    pub requires_renewal: Option<bool>,
    pub renewal_period_days: Option<i64>,
    pub retention_period_days: Option<i64>,
    pub display_order: Option<i64>,
}
