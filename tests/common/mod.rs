#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use futures::stream::{self, Stream};
use tempfile::TempDir;

use issue_tracker::{
    config::{AppConfig, DatabaseBackend},
    models::user::User,
    services::repository::Repositories,
    utils::files::{FileUtility, LocalFileUtility},
    AppState,
};

pub const TEST_USERNAME: &str = "reviewer";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const BOUNDARY: &str = "issue-tracker-test-boundary";

pub struct TestApp {
    pub state: AppState,
    pub user: User,
    pub token: String,
    /// Holds the uploads and documents directories.
    pub root: TempDir,
}

impl TestApp {
    pub fn uploads_dir(&self) -> &Path {
        self.state.uploads.directory()
    }

    pub fn documents_dir(&self) -> &Path {
        self.state.documents.directory()
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

pub fn test_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = DatabaseBackend::Memory;
    config.auth.secret = Some("integration-test-secret".to_string());
    config.auth.bcrypt_cost = 4;
    config.uploads.directory = root.join("uploads").to_string_lossy().into_owned();
    config.documents.directory = Some(root.join("documents").to_string_lossy().into_owned());
    config
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}, Repositories::memory(), Arc::new(LocalFileUtility)).await
}

pub async fn setup_test_app_with(
    configure: impl FnOnce(&mut AppConfig),
    repositories: Repositories,
    files: Arc<dyn FileUtility>,
) -> TestApp {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(root.path());
    configure(&mut config);

    let state = AppState::with_file_utility(config, repositories, files).expect("Failed to build app state");
    let user = state
        .users
        .create_user(TEST_USERNAME, TEST_PASSWORD)
        .await
        .expect("Failed to create test user");
    let token = state.auth.generate_token(&user).expect("Failed to generate token");

    TestApp {
        state,
        user,
        token,
        root,
    }
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Multipart body with one part per `(field, file name, content)`. A `None`
/// file name produces a plain form value.
pub fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        field, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field).as_bytes());
            }
        }
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn body_stream(body: Vec<u8>) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    stream::iter(vec![Ok(Bytes::from(body))])
}
