use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{to_utc, UserSummary};
use crate::models::document::Document;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentView {
    pub id: String,
    pub issue: String,
    #[schema(inline)]
    pub uploader: UserSummary,
    pub filename: String,
    pub extension: Option<String>,
    pub bucket: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentView {
    pub fn new(document: Document, uploader: UserSummary) -> Self {
        Self {
            id: document.id.to_hex(),
            issue: document.issue.to_hex(),
            uploader,
            filename: document.filename,
            extension: document.extension,
            bucket: document.bucket,
            created_at: to_utc(document.created_at),
            updated_at: to_utc(document.updated_at),
        }
    }
}
