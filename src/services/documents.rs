//! Document store.
//!
//! Files live under `<directory>/<YYYY_MM>/<document id>[.<ext>]`. Adding a
//! document is a two step saga: the file is moved into its bucket first and
//! the record is persisted second. If persisting fails the move is undone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::Stream;
use mongodb::bson::oid::ObjectId;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, error, info, warn};

use super::issues::IssueManager;
use super::repository::{Filter, Repository};
use super::uploads::UploadManager;
use super::users::UserManager;
use crate::config::DocumentsConfig;
use crate::dto::document::DocumentView;
use crate::dto::UserSummary;
use crate::error::{AppError, AppResult};
use crate::models::{document::Document, user::User};
use crate::utils::files::FileUtility;
use crate::utils::pagination::{Page, PageRequest};

/// Bucket name for documents created at `now`.
pub fn bucket_for(now: DateTime<Utc>) -> String {
    now.format("%Y_%m").to_string()
}

/// A completed file move and the means to undo it.
struct FileMove<'a> {
    files: &'a dyn FileUtility,
    from: PathBuf,
    to: PathBuf,
}

impl<'a> FileMove<'a> {
    async fn apply(files: &'a dyn FileUtility, from: &Path, to: &Path) -> AppResult<FileMove<'a>> {
        files.move_path(from, to).await?;
        Ok(Self {
            files,
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
    }

    async fn compensate(&self) -> std::io::Result<()> {
        self.files.move_path(&self.to, &self.from).await
    }
}

/// A stored file ready to be streamed to a client under its original name.
#[derive(Debug, Clone)]
pub struct DocumentDownload {
    pub path: PathBuf,
    pub filename: String,
}

impl DocumentDownload {
    /// Streams the file as an attachment. Conditional and range headers of
    /// the original request are honoured.
    pub async fn send(self, headers: &HeaderMap, uri: &Uri) -> AppResult<Response> {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .body(Body::empty())
            .map_err(|e| AppError::internal(e.to_string()))?;
        *request.headers_mut() = headers.clone();

        let response = match ServeFile::new(&self.path).oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let mut response = response.map(Body::new).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, content_disposition(&self.filename));
        Ok(response)
    }
}

fn content_disposition(filename: &str) -> HeaderValue {
    let escaped: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", escaped)).unwrap_or_else(|_| {
        let ascii: String = escaped
            .chars()
            .map(|c| if c.is_ascii() { c } else { '_' })
            .collect();
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", ascii))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
    })
}

pub struct DocumentStore {
    directory: PathBuf,
    page_size: u64,
    documents: Arc<dyn Repository<Document>>,
    issues: Arc<IssueManager>,
    uploads: Arc<UploadManager>,
    users: Arc<UserManager>,
    files: Arc<dyn FileUtility>,
}

impl DocumentStore {
    /// Fails with a configuration error when no storage directory is set.
    pub fn new(
        options: &DocumentsConfig,
        documents: Arc<dyn Repository<Document>>,
        issues: Arc<IssueManager>,
        uploads: Arc<UploadManager>,
        users: Arc<UserManager>,
        files: Arc<dyn FileUtility>,
    ) -> AppResult<Self> {
        let directory = options
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .ok_or_else(|| {
                AppError::configuration(
                    "Mandatory option \"documents.directory\" not provided. You must specify where documents \
                     are stored. Do not use temporary paths, they are wiped on restart",
                )
            })?;

        Ok(Self {
            directory: PathBuf::from(directory),
            page_size: options.page_size,
            documents,
            issues,
            uploads,
            users,
            files,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.directory.join(bucket)
    }

    pub fn document_path(&self, document: &Document) -> PathBuf {
        document.stored_path(&self.directory)
    }

    /// Moves `source` into storage and records it. `source` is consumed.
    ///
    /// If the record cannot be persisted the file is moved back to `source`
    /// and the persistence error is returned. A failed move back is logged
    /// and never replaces the original error.
    pub async fn add_document_from_path(&self, user: &User, issue_id: &ObjectId, source: &Path) -> AppResult<Document> {
        debug!("add_document_from_path issue={} source={}", issue_id, source.display());

        self.issues.validate_issue_id(issue_id).await?;

        let document = Document::for_source(*issue_id, user.id, source, bucket_for(Utc::now()));
        let destination = self.document_path(&document);

        self.files.ensure_dir(&self.bucket_path(&document.bucket)).await?;
        let moved = FileMove::apply(self.files.as_ref(), source, &destination).await?;

        if let Err(err) = self.documents.insert(&document).await {
            return Err(self.roll_back(&moved, &document, err).await);
        }

        info!(
            document_id = %document.id,
            issue_id = %issue_id,
            "Stored {} as {}",
            document.filename,
            destination.display()
        );
        Ok(document)
    }

    async fn roll_back(&self, moved: &FileMove<'_>, document: &Document, err: AppError) -> AppError {
        match moved.compensate().await {
            Ok(()) => {
                warn!(
                    document_id = %document.id,
                    "Persisting document failed, {} moved back to {}",
                    moved.to.display(),
                    moved.from.display()
                );
            }
            Err(rollback_err) => {
                err.log_error();
                error!(
                    document_id = %document.id,
                    "File {} has remained stuck after failed creation of document {}: {}",
                    moved.to.display(),
                    document.id,
                    rollback_err
                );
            }
        }
        err
    }

    /// Receives a multipart upload and stores its first file.
    ///
    /// The upload is released whether or not storing succeeds.
    pub async fn upload_document<S, O, E>(
        &self,
        user: &User,
        issue_id: &ObjectId,
        content_type: Option<&str>,
        body: S,
        origin: &str,
    ) -> AppResult<DocumentView>
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        debug!("upload_document issue={} by {}", issue_id, user.username);

        self.issues.validate_issue_id(issue_id).await?;

        let upload = self.uploads.accept_upload(content_type, body, origin).await?;
        let source = upload.files[0].path.clone();
        let stored = self.add_document_from_path(user, issue_id, &source).await;
        upload.release();

        let document = stored?;
        Ok(DocumentView::new(document, UserSummary::from(user)))
    }

    /// Non-deleted documents of an issue, uploader populated.
    pub async fn list_documents_for_issue(
        &self,
        issue_id: &ObjectId,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> AppResult<Page<DocumentView>> {
        debug!("list_documents_for_issue {} page={:?} page_size={:?}", issue_id, page, page_size);

        self.issues.validate_issue_id(issue_id).await?;

        let request = PageRequest::new(page, page_size, self.page_size);
        let filter = Filter::new().eq("issue", *issue_id);
        let page = self.documents.paginate(&filter, request).await?;
        let uploaders = self.users.summaries(page.docs.iter().map(|d| d.uploader).collect::<Vec<_>>()).await?;

        Ok(page.map(|document| {
            let uploader = uploaders
                .get(&document.uploader)
                .cloned()
                .unwrap_or_else(|| UserSummary::missing(&document.uploader));
            DocumentView::new(document, uploader)
        }))
    }

    pub async fn get_document_by_id(&self, id: &ObjectId) -> AppResult<Document> {
        self.documents
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Document", id.to_hex()))
    }

    pub async fn prepare_document_download(&self, id: &ObjectId) -> AppResult<DocumentDownload> {
        debug!("prepare_document_download {}", id);

        let document = self.get_document_by_id(id).await?;
        Ok(DocumentDownload {
            path: self.document_path(&document),
            filename: document.filename,
        })
    }
}
