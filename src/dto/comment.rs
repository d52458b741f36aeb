use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{to_utc, UserSummary};
use crate::models::comment::Comment;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentView {
    pub id: String,
    pub issue: String,
    pub content: String,
    #[schema(inline)]
    pub author: UserSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: Comment, author: UserSummary) -> Self {
        Self {
            id: comment.id.to_hex(),
            issue: comment.issue.to_hex(),
            content: comment.content,
            author,
            created_at: to_utc(comment.created_at),
            updated_at: to_utc(comment.updated_at),
        }
    }
}
