pub mod comment;
pub mod document;
pub mod issue;
pub mod user;

use mongodb::bson::oid::ObjectId;
use serde::{de::DeserializeOwned, Serialize};

/// A persisted entity stored in its own collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    const COLLECTION: &'static str;

    /// Name used in not-found errors.
    const ENTITY: &'static str;

    fn id(&self) -> ObjectId;
}
