// ABOUTME: Consent notice assembly
// ABOUTME: Groups each requested purpose's current version by category for presentation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sammati_purposes::PurposeWithVersion;

use super::types::{ConsentRequest, RequestStatus};

/// What a principal sees when opening a notice URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeView {
    pub request_id: String,
    pub fiduciary_id: String,
    pub status: RequestStatus,
    pub language: String,
    pub expires_at: DateTime<Utc>,
    pub categories: Vec<NoticeCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeCategory {
    pub name: String,
    pub purposes: Vec<NoticePurpose>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticePurpose {
    pub purpose_id: String,
    pub purpose_version_id: String,
    pub version_number: i64,
    pub title: String,
    pub description: String,
    pub legal_basis: Option<String>,
    pub data_fields: Vec<String>,
    pub processing_activities: Vec<String>,
    pub is_mandatory: bool,
    pub requires_renewal: bool,
    pub retention_period_days: i64,
}

const UNCATEGORIZED: &str = "General";

/// Build the notice from the request and its purposes' current versions.
/// `category_names` maps category IDs to display names; unknown or missing
/// categories fall into "General". Input order is preserved inside each
/// category, category order follows first appearance.
pub fn assemble_notice(
    request: &ConsentRequest,
    purposes: &[PurposeWithVersion],
    category_names: &std::collections::HashMap<String, String>,
) -> NoticeView {
    let mut categories: Vec<NoticeCategory> = Vec::new();

    for item in purposes {
        let name = item
            .purpose
            .category_id
            .as_ref()
            .and_then(|id| category_names.get(id))
            .cloned()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        let entry = NoticePurpose {
            purpose_id: item.purpose.id.clone(),
            purpose_version_id: item.version.id.clone(),
            version_number: item.version.version_number,
            title: item.version.title.clone(),
            description: item.version.description.clone(),
            legal_basis: item.version.legal_basis.clone(),
            data_fields: item.version.data_fields.clone(),
            processing_activities: item.version.processing_activities.clone(),
            is_mandatory: item.purpose.is_mandatory,
            requires_renewal: item.purpose.requires_renewal,
            retention_period_days: item.purpose.retention_period_days,
        };

        match categories.iter_mut().find(|c| c.name == name) {
            Some(category) => category.purposes.push(entry),
            None => categories.push(NoticeCategory {
                name,
                purposes: vec![entry],
            }),
        }
    }

    NoticeView {
        request_id: request.id.clone(),
        fiduciary_id: request.fiduciary_id.clone(),
        status: request.status,
        language: request.language.clone(),
        expires_at: request.expires_at,
        categories,
    }
}
