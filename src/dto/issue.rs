use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{to_utc, UserSummary};
use crate::models::issue::{Issue, IssueStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewIssue {
    pub title: String,
    pub content: Option<String>,
    #[schema(inline)]
    pub status: Option<IssueStatus>,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    #[schema(inline)]
    pub status: Option<IssueStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueView {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    #[schema(inline)]
    pub status: IssueStatus,
    #[schema(inline)]
    pub author: UserSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl IssueView {
    pub fn new(issue: Issue, author: UserSummary) -> Self {
        Self {
            id: issue.id.to_hex(),
            title: issue.title,
            content: issue.content,
            status: issue.status,
            author,
            created_at: to_utc(issue.created_at),
            updated_at: to_utc(issue.updated_at),
            deleted_at: issue.deleted_at.map(to_utc),
        }
    }
}
