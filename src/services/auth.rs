use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::users::UserManager;
use crate::config::AuthConfig;
use crate::dto::auth::{Claims, LoginResponse};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::extract_token_from_headers;
use crate::models::user::User;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

pub struct AuthManager {
    jwt_secret: String,
    issuer: String,
    token_ttl: Duration,
    users: Arc<UserManager>,
}

impl AuthManager {
    /// Fails with a configuration error when no signing secret is set.
    pub fn new(config: &AuthConfig, users: Arc<UserManager>) -> AppResult<Self> {
        let jwt_secret = config
            .secret
            .clone()
            .filter(|secret| !secret.trim().is_empty())
            .ok_or_else(|| {
                AppError::configuration(
                    "Mandatory option \"auth.secret\" not provided. Set it in settings or ISSUES_AUTH__SECRET",
                )
            })?;

        Ok(Self {
            jwt_secret,
            issuer: config.token_issuer.clone(),
            token_ttl: Duration::hours(config.token_ttl_hours.max(1)),
            users,
        })
    }

    pub fn generate_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + self.token_ttl;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user.username.clone(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?;

        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!("Token validation failed: {}", e);
            AppError::unauthorized("Invalid or expired token")
        })?;

        Ok(token_data.claims)
    }

    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let user = self
            .users
            .verify_password(username, password)
            .await?
            .ok_or_else(|| AppError::unauthorized(INVALID_CREDENTIALS))?;

        tracing::info!("User {} logged in", user.username);

        Ok(LoginResponse {
            message: "Authenticated".to_string(),
            token: self.generate_token(&user)?,
        })
    }

    /// Resolves the user behind the request's bearer token.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AppResult<User> {
        let token = extract_token_from_headers(headers)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;
        let claims = self.validate_token(&token)?;

        self.users
            .get_user_by_username(&claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
