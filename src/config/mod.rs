use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Application configuration structure
///
/// Layered, later sources win:
/// - built-in defaults
/// - `settings.yaml`, `settings.<env>.yaml`
/// - `settings.local.yaml`, `settings.<env>.local.yaml`
/// - `ISSUES_*` environment variables (`__` separates nested keys)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub logger: LoggerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub uploads: UploadsConfig,
    pub documents: DocumentsConfig,
    pub issues: IssuesConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    /// Reads `APP_ENV`; anything unrecognised means development.
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV").unwrap_or_default().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Expose messages of 5xx errors to clients.
    pub internal_errors: bool,
    /// Include error traces in error responses.
    pub stack_traces: bool,
    pub enable_validation: bool,
    pub api_docs: ApiDocsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDocsConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub title: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secret: Option<String>,
    pub token_issuer: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    /// Users created at startup when missing.
    pub default_users: Vec<DefaultUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    pub directory: String,
    /// Largest accepted multipart part, in bytes.
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub directory: Option<String>,
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuesConfig {
    pub default_page_size: u64,
    /// Only the author may update or delete an issue.
    pub restrict_to_author: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                internal_errors: true,
                stack_traces: true,
                enable_validation: true,
                api_docs: ApiDocsConfig {
                    enabled: true,
                    endpoint: "/docs".to_string(),
                    title: "Issue tracker API".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    description: "Issues, comments and documents".to_string(),
                },
            },
            logger: LoggerConfig {
                level: "info".to_string(),
            },
            database: DatabaseConfig {
                backend: DatabaseBackend::Mongo,
                url: "mongodb://localhost:27017".to_string(),
                name: "issue_tracker".to_string(),
            },
            auth: AuthConfig {
                secret: None,
                token_issuer: "issue-tracker".to_string(),
                token_ttl_hours: 24,
                bcrypt_cost: bcrypt::DEFAULT_COST,
                default_users: Vec::new(),
            },
            uploads: UploadsConfig {
                directory: std::env::temp_dir()
                    .join("issue-tracker-uploads")
                    .to_string_lossy()
                    .into_owned(),
                max_file_size: DEFAULT_MAX_FILE_SIZE,
            },
            documents: DocumentsConfig {
                directory: None,
                page_size: 20,
            },
            issues: IssuesConfig {
                default_page_size: 20,
                restrict_to_author: false,
            },
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let environment = Environment::from_env();
        info!("Loading application configuration ({})...", environment.as_str());

        let config: AppConfig = Self::figment(environment).extract()?;

        info!("Configuration loaded successfully");
        info!("Database backend: {:?} ({})", config.database.backend, config.database.name);
        info!("Uploads directory: {}", config.uploads.directory);
        info!(
            "Documents directory: {}",
            config.documents.directory.as_deref().unwrap_or("<not set>")
        );

        Ok(config)
    }

    /// Provider chain, exposed so tests can inspect or extend it.
    pub fn figment(environment: Environment) -> Figment {
        let defaults = AppConfig {
            environment,
            ..Self::default()
        };
        let env = environment.as_str();

        Figment::new()
            .merge(Serialized::defaults(defaults))
            .merge(Yaml::file("settings.yaml"))
            .merge(Yaml::file(format!("settings.{env}.yaml")))
            .merge(Yaml::file("settings.local.yaml"))
            .merge(Yaml::file(format!("settings.{env}.local.yaml")))
            .merge(Env::prefixed("ISSUES_").split("__"))
    }
}
