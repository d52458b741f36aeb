use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use crate::error::AppResult;
use crate::models::user::User;
use crate::server::registrar::Authenticator;
use crate::services::auth::AuthManager;

const BEARER_PREFIX: &str = "Bearer ";
const TOKEN_COOKIE: &str = "auth_token=";

#[async_trait]
impl Authenticator for AuthManager {
    async fn authenticate(&self, headers: &HeaderMap) -> AppResult<User> {
        let user = AuthManager::authenticate(self, headers).await?;
        tracing::debug!("Authenticated request for user: {}", user.username);
        Ok(user)
    }
}

/// Bearer token from the Authorization header, or the `auth_token` cookie.
pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(header_str) = auth_header.to_str() {
            if let Some(token) = header_str.strip_prefix(BEARER_PREFIX) {
                let token = token.trim();
                if !token.is_empty() {
                    tracing::trace!("Found Bearer token in Authorization header");
                    return Some(token.to_string());
                }
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix(TOKEN_COOKIE) {
                    tracing::trace!("Found auth_token in cookies");
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}
