use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::Record;

/// User document. `username` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        let now = DateTime::now();
        Self {
            id: ObjectId::new(),
            username,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const ENTITY: &'static str = "User";

    fn id(&self) -> ObjectId {
        self.id
    }
}
