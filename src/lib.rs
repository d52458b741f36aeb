pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::Router;
use utoipa_swagger_ui::SwaggerUi;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use server::{ErrorTranslator, Registrar};
use services::auth::AuthManager;
use services::documents::DocumentStore;
use services::issues::IssueManager;
use services::repository::Repositories;
use services::uploads::UploadManager;
use services::users::UserManager;
use utils::files::{FileUtility, LocalFileUtility};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserManager>,
    pub auth: Arc<AuthManager>,
    pub issues: Arc<IssueManager>,
    pub uploads: Arc<UploadManager>,
    pub documents: Arc<DocumentStore>,
}

impl AppState {
    pub fn new(config: AppConfig, repositories: Repositories) -> AppResult<Self> {
        Self::with_file_utility(config, repositories, Arc::new(LocalFileUtility))
    }

    /// Wires every manager. Fails when a mandatory option is missing.
    pub fn with_file_utility(
        config: AppConfig,
        repositories: Repositories,
        files: Arc<dyn FileUtility>,
    ) -> AppResult<Self> {
        let users = Arc::new(UserManager::new(repositories.users, config.auth.bcrypt_cost));
        let auth = Arc::new(AuthManager::new(&config.auth, users.clone())?);
        let issues = Arc::new(IssueManager::new(
            repositories.issues,
            repositories.comments,
            users.clone(),
            config.issues.clone(),
        ));
        let uploads = Arc::new(
            UploadManager::new(&config.uploads.directory, files.clone()).with_max_file_size(config.uploads.max_file_size),
        );
        let documents = Arc::new(DocumentStore::new(
            &config.documents,
            repositories.documents,
            issues.clone(),
            uploads.clone(),
            users.clone(),
            files,
        )?);

        Ok(Self {
            config: Arc::new(config),
            users,
            auth,
            issues,
            uploads,
            documents,
        })
    }
}

/// Registers every endpoint and, when enabled, the API docs UI.
pub fn build_router(state: AppState) -> AppResult<Router> {
    let options = &state.config.server;
    let translator = ErrorTranslator::new(options.internal_errors, options.stack_traces);
    let mut registrar = Registrar::new(state.auth.clone(), translator, options.enable_validation);

    handlers::register(&mut registrar)?;

    if options.api_docs.enabled {
        let endpoint = options.api_docs.endpoint.trim_end_matches('/').to_string();
        let openapi = server::docs::build_openapi(&options.api_docs, handlers::API_PREFIX, registrar.endpoints());
        registrar.merge(SwaggerUi::new(endpoint.clone()).url(format!("{}/openapi.json", endpoint), openapi).into());
        tracing::info!("API docs available at {}", endpoint);
    }

    Ok(registrar.into_router(state))
}
