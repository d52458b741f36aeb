//! Upload receiver.
//!
//! An upload is streamed into its own staging directory and handed back as an
//! [`Upload`]. The caller moves the files it needs elsewhere and then calls
//! [`Upload::release`], which deletes the staging directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_FILE_SIZE;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::utils::files::FileUtility;

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub size: u64,
    pub path: PathBuf,
    /// Original file name as sent by the client (final path component only).
    pub name: String,
    pub content_type: Option<String>,
    /// Form field the file arrived in.
    pub field: Option<String>,
}

/// Staged upload. Always holds at least one file.
///
/// Must be released exactly once after its files have been consumed.
pub struct Upload {
    pub id: u64,
    pub directory: PathBuf,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub files: Vec<UploadFile>,
    files_util: Option<Arc<dyn FileUtility>>,
}

impl Upload {
    /// Deletes the staging directory in the background. Failures are logged.
    pub fn release(mut self) -> JoinHandle<()> {
        let files = self.files_util.take();
        let directory = self.directory.clone();
        let id = self.id;

        tokio::spawn(async move {
            if let Some(files) = files {
                remove_staging(files.as_ref(), id, &directory).await;
            }
        })
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        if self.files_util.is_some() {
            warn!(
                upload_id = self.id,
                "Upload dropped without release, {} is left on disk",
                self.directory.display()
            );
        }
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("files", &self.files)
            .finish()
    }
}

async fn remove_staging(files: &dyn FileUtility, id: u64, directory: &Path) {
    match files.remove(directory).await {
        Ok(()) => debug!(upload_id = id, "Upload {} released", id),
        Err(e) => error!(
            upload_id = id,
            "Failed to release upload directory {}: {}",
            directory.display(),
            e
        ),
    }
}

pub struct UploadManager {
    directory: PathBuf,
    files: Arc<dyn FileUtility>,
    max_file_size: u64,
    last_id: Mutex<u64>,
}

impl UploadManager {
    pub fn new(directory: impl Into<PathBuf>, files: Arc<dyn FileUtility>) -> Self {
        Self {
            directory: directory.into(),
            files,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            last_id: Mutex::new(0),
        }
    }

    /// Caps every multipart part at `bytes`. Larger parts fail with 413.
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Current time in millis, bumped past the last issued id.
    fn next_id(&self, now: DateTime<Utc>) -> u64 {
        let mut last = self.last_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut id = now.timestamp_millis().max(0) as u64;
        if id <= *last {
            id = *last + 1;
        }
        *last = id;
        id
    }

    pub fn staging_directory(&self, id: u64) -> PathBuf {
        self.directory.join(format!("upload_{}", id))
    }

    /// Streams a multipart body into a fresh staging directory.
    ///
    /// Zero files is a 400 error. Either way a failed upload leaves no
    /// staging directory behind.
    pub async fn accept_upload<S, O, E>(
        &self,
        content_type: Option<&str>,
        body: S,
        origin: &str,
    ) -> AppResult<Upload>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let started_at = Utc::now();
        let id = self.next_id(started_at);
        let directory = self.staging_directory(id);
        info!(upload_id = id, "Upload {} from {} started at {}", id, origin, started_at);

        self.files.empty_dir(&directory).await?;

        let received = match content_type.map(multer::parse_boundary) {
            Some(Ok(boundary)) => {
                let limits = multer::SizeLimit::new().per_field(self.max_file_size);
                let multipart =
                    multer::Multipart::with_constraints(body, boundary, multer::Constraints::new().size_limit(limits));
                self.receive(multipart, &directory).await
            }
            Some(Err(e)) => Err(upload_error(e)),
            None => Err(AppError::bad_upload("Expected a multipart/form-data request")),
        };

        let files = match received {
            Ok(files) if !files.is_empty() => files,
            Ok(_) => {
                remove_staging(self.files.as_ref(), id, &directory).await;
                return Err(AppError::bad_upload("No files were uploaded"));
            }
            Err(err) => {
                remove_staging(self.files.as_ref(), id, &directory).await;
                return Err(err);
            }
        };

        let completed_at = Utc::now();
        info!(
            upload_id = id,
            "Upload {} completed after {} ms. {} files staged",
            id,
            (completed_at - started_at).num_milliseconds(),
            files.len()
        );

        Ok(Upload {
            id,
            directory,
            started_at,
            completed_at,
            files,
            files_util: Some(self.files.clone()),
        })
    }

    async fn receive(&self, mut multipart: multer::Multipart<'static>, directory: &Path) -> AppResult<Vec<UploadFile>> {
        let mut files = Vec::new();

        while let Some(mut field) = multipart.next_field().await.map_err(upload_error)? {
            // plain form values and empty file inputs carry no file name
            let Some(original) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
                continue;
            };

            let name = sanitize_file_name(&original).unwrap_or_else(|| format!("file_{}", files.len() + 1));
            let mut path = directory.join(&name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                path = directory.join(format!("{}_{}", files.len() + 1, name));
            }

            let field_name = field.name().map(str::to_string);
            let content_type = field.content_type().map(|mime| mime.to_string());

            let mut file = tokio::fs::File::create(&path).await?;
            let mut size = 0u64;
            while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
                size += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;

            debug!("Staged {} ({} bytes) at {}", name, size, path.display());
            files.push(UploadFile {
                size,
                path,
                name,
                content_type,
                field: field_name,
            });
        }

        Ok(files)
    }
}

/// Final path component of a client supplied name, if anything usable is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn upload_error(err: multer::Error) -> AppError {
    let status = match &err {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        _ => StatusCode::BAD_REQUEST,
    };
    ErrorKind::Upload {
        message: format!("Failed to receive upload: {}", err),
        status,
    }
    .into()
}
