use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::Record;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub issue: ObjectId,
    pub content: String,
    pub author: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl Comment {
    pub fn new(issue: ObjectId, author: ObjectId, content: String) -> Self {
        let now = DateTime::now();
        Self {
            id: ObjectId::new(),
            issue,
            content,
            author,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Record for Comment {
    const COLLECTION: &'static str = "comments";
    const ENTITY: &'static str = "Comment";

    fn id(&self) -> ObjectId {
        self.id
    }
}
