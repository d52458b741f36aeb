pub mod auth;
pub mod comment;
pub mod document;
pub mod issue;

use chrono::{DateTime, Utc};
use mongodb::bson;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::user::User;

/// Populated reference to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

impl UserSummary {
    /// Placeholder for a reference whose user record no longer exists.
    pub fn missing(id: &bson::oid::ObjectId) -> Self {
        Self {
            id: id.to_hex(),
            username: String::new(),
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_hex(),
            username: user.username.clone(),
        }
    }
}

pub(crate) fn to_utc(value: bson::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}
