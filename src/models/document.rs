use std::path::{Path, PathBuf};

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::Record;

/// Metadata of a stored file. The file itself lives at
/// `<documents dir>/<bucket>/<id>[.<extension>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub issue: ObjectId,
    pub uploader: ObjectId,
    /// Original file name, used for downloads.
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub bucket: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,
}

impl Document {
    /// Name and extension are taken from `source`; the id is fresh.
    pub fn for_source(issue: ObjectId, uploader: ObjectId, source: &Path, bucket: String) -> Self {
        let filename = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = source
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|ext| !ext.is_empty());
        let now = DateTime::now();

        Self {
            id: ObjectId::new(),
            issue,
            uploader,
            filename,
            extension,
            bucket,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// File name inside the bucket directory.
    pub fn stored_name(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", self.id.to_hex(), ext),
            None => self.id.to_hex(),
        }
    }

    pub fn stored_path(&self, root: &Path) -> PathBuf {
        root.join(&self.bucket).join(self.stored_name())
    }
}

impl Record for Document {
    const COLLECTION: &'static str = "documents";
    const ENTITY: &'static str = "Document";

    fn id(&self) -> ObjectId {
        self.id
    }
}
