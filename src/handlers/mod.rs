pub mod auth;
pub mod documents;
pub mod issues;

use crate::error::AppResult;
use crate::server::{Field, ObjectSchema, Registrar};
use crate::AppState;

/// Every API route lives under this prefix.
pub const API_PREFIX: &str = "/api/v1";

pub(crate) fn route(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

/// `:id` as a Mongo ObjectId.
pub(crate) fn id_param(description: &str) -> ObjectSchema {
    ObjectSchema::new().field("id", Field::object_id().describe(description))
}

pub fn register(registrar: &mut Registrar<AppState>) -> AppResult<()> {
    auth::register(registrar)?;
    issues::register(registrar)?;
    documents::register(registrar)?;
    Ok(())
}
