use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Record;

pub const TITLE_MAX_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
}

impl IssueStatus {
    pub const ALL: [&'static str; 3] = ["pending", "in_progress", "complete"];
}

/// Issue document. Soft-deleted issues keep their record with `deleted_at` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub status: IssueStatus,
    pub author: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl Issue {
    pub fn new(author: ObjectId, title: String, content: Option<String>, status: IssueStatus) -> Self {
        let now = DateTime::now();
        Self {
            id: ObjectId::new(),
            title,
            content,
            status,
            author,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Record for Issue {
    const COLLECTION: &'static str = "issues";
    const ENTITY: &'static str = "Issue";

    fn id(&self) -> ObjectId {
        self.id
    }
}
