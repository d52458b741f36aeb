use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use super::route;
use crate::dto::auth::{LoginRequest, LoginResponse};
use crate::error::{AppError, AppResult};
use crate::server::{ApiRequest, EndpointConfig, Field, Handler, ObjectSchema, Registrar};
use crate::AppState;

pub fn register(registrar: &mut Registrar<AppState>) -> AppResult<()> {
    registrar.post(
        &route("/login"),
        EndpointConfig::new()
            .describe("Exchange credentials for a bearer token")
            .tag("auth")
            .public()
            .body(
                ObjectSchema::new()
                    .field("username", Field::string().required())
                    .field("password", Field::string().required()),
            )
            .response::<LoginResponse>(),
        Handler::raw(login),
    )
}

/// Returns the token in the body and as an `auth_token` cookie.
pub async fn login(req: ApiRequest<AppState>) -> AppResult<Response> {
    let credentials: LoginRequest = req.body_as()?;
    info!("Login attempt for account: {}", credentials.username);

    let response = req.state.auth.login(&credentials.username, &credentials.password).await?;

    let max_age = req.state.config.auth.token_ttl_hours * 3600;
    let cookie = format!(
        "auth_token={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        response.token, max_age
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| AppError::internal(e.to_string()))?,
    );

    Ok((headers, Json(response)).into_response())
}
