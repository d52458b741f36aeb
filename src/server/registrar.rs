//! Endpoint registrar.
//!
//! Every route is declared once, with an [`EndpointConfig`], and the
//! registrar derives authentication, validation, response handling and API
//! documentation from that declaration.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::{Json, Router};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use super::endpoint::{ApiRequest, EndpointConfig, Handler};
use super::errors::ErrorTranslator;
use super::validation::{Field, FailureKind, ObjectSchema, RawInput, RequestValidator, Section, ValidationError};
use crate::error::{AppError, AppResult};
use crate::models::user::User;

/// Largest JSON body the registrar will buffer for validation.
pub const JSON_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Resolves the user behind a request. Consulted for `auth` endpoints.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> AppResult<User>;
}

/// Registry entry kept for documentation.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
    pub config: EndpointConfig,
    /// False for duplicates that the router never sees.
    pub routed: bool,
    pub raw: bool,
}

/// `page` and `page_size`, injected into paginated endpoints.
pub fn pagination_query() -> ObjectSchema {
    ObjectSchema::new()
        .field("page", Field::integer().positive().describe("Page number, starting at 1"))
        .field("page_size", Field::integer().positive().describe("Number of documents per page"))
}

/// Names of `:name` and `*name` placeholders in a route path.
pub fn path_placeholders(path: &str) -> HashSet<&str> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':').or_else(|| segment.strip_prefix('*')))
        .collect()
}

fn is_placeholder(segment: &str) -> bool {
    segment.starts_with(':') || segment.starts_with('*')
}

/// Route path with every placeholder name erased, so `/x/:a` and `/x/:b`
/// compare equal.
pub fn route_template(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// First placeholder of `path` that sits where `existing` has a placeholder
/// with another name, both paths agreeing on every segment before it.
fn conflicting_placeholder<'a>(existing: &'a str, path: &'a str) -> Option<(&'a str, &'a str)> {
    for (theirs, ours) in existing.split('/').zip(path.split('/')) {
        match (is_placeholder(theirs), is_placeholder(ours)) {
            (true, true) if theirs != ours => return Some((theirs, ours)),
            (true, true) => {}
            (false, false) if theirs == ours => {}
            _ => return None,
        }
    }
    None
}

fn check_path(method: &Method, path: &str) -> AppResult<()> {
    if !path.starts_with('/') {
        return Err(AppError::configuration(format!("{} {}: paths must start with '/'", method, path)));
    }
    let segments: Vec<&str> = path.split('/').collect();
    if let Some(position) = segments.iter().position(|segment| segment.starts_with('*')) {
        if position + 1 != segments.len() {
            return Err(AppError::configuration(format!(
                "{} {}: a wildcard must be the last segment",
                method, path
            )));
        }
    }
    if segments.iter().any(|segment| *segment == ":" || *segment == "*") {
        return Err(AppError::configuration(format!("{} {}: placeholders need a name", method, path)));
    }
    Ok(())
}

fn not_found(translator: ErrorTranslator, method: Method, uri: Uri) -> Response {
    translator.respond(AppError::route_not_found(method, uri.path()))
}

struct Shared {
    authenticator: Arc<dyn Authenticator>,
    translator: ErrorTranslator,
}

struct Route<S> {
    config: EndpointConfig,
    validator: Option<RequestValidator>,
    handler: Handler<S>,
    has_params: bool,
}

impl<S> Route<S>
where
    S: Clone + Send + Sync + 'static,
{
    async fn call(&self, shared: &Shared, state: S, request: Request) -> Response {
        match self.handle(shared, state, request).await {
            Ok(response) => response,
            Err(err) => shared.translator.respond(err),
        }
    }

    async fn handle(&self, shared: &Shared, state: S, request: Request) -> AppResult<Response> {
        let (mut parts, body) = request.into_parts();

        let user = if self.config.auth {
            Some(shared.authenticator.authenticate(&parts.headers).await?)
        } else {
            None
        };

        let params = if self.has_params {
            Path::<HashMap<String, String>>::from_request_parts(&mut parts, &state)
                .await
                .map(|Path(params)| params)
                .map_err(|rejection| {
                    ValidationError::single(Section::Params, "", FailureKind::Type, rejection.body_text())
                })?
        } else {
            HashMap::new()
        };

        let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .map_err(|rejection| ValidationError::single(Section::Query, "", FailureKind::Type, rejection.body_text()))?;

        // bodies are only buffered when a schema describes them
        let (json, body) = if self.config.body.is_empty() {
            (None, Some(body))
        } else {
            (read_json(body).await?, None)
        };

        let raw = RawInput { params, query, body: json };
        let data = match &self.validator {
            Some(validator) => validator.validate(&raw)?,
            None => RequestValidator::passthrough(&raw),
        };

        let request = ApiRequest::new(state, data, user, parts.method, parts.uri, parts.headers, body);
        match &self.handler {
            Handler::Value(handler) => {
                let value = handler(request).await?;
                Ok(Json(value).into_response())
            }
            Handler::Raw(handler) => handler(request).await,
        }
    }
}

async fn read_json(body: Body) -> AppResult<Option<Value>> {
    let bytes = axum::body::to_bytes(body, JSON_BODY_LIMIT).await.map_err(|e| {
        ValidationError::single(Section::Body, "", FailureKind::Type, format!("Could not read request body: {}", e))
    })?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        ValidationError::single(Section::Body, "", FailureKind::Type, format!("Invalid JSON body: {}", e)).into()
    })
}

/// Every method registered under one route template.
struct Mounted<S> {
    /// Path as first registered. Placeholder names come from here.
    path: String,
    methods: MethodRouter<S>,
}

pub struct Registrar<S> {
    router: Router<S>,
    routes: BTreeMap<String, Mounted<S>>,
    endpoints: Vec<Endpoint>,
    shared: Arc<Shared>,
    enable_validation: bool,
}

impl<S> Registrar<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(authenticator: Arc<dyn Authenticator>, translator: ErrorTranslator, enable_validation: bool) -> Self {
        Self {
            router: Router::new(),
            routes: BTreeMap::new(),
            endpoints: Vec::new(),
            shared: Arc::new(Shared {
                authenticator,
                translator,
            }),
            enable_validation,
        }
    }

    /// Declares a route.
    ///
    /// Declared path params must all appear as placeholders in `path`. A
    /// second registration of the same method and path is kept in the
    /// registry but never routed; the first one wins. Paths only differing in
    /// placeholder names count as the same path. A placeholder whose name
    /// clashes with another route's at the same position is an error.
    pub fn register(&mut self, method: Method, path: &str, config: EndpointConfig, handler: Handler<S>) -> AppResult<()> {
        let mut config = config;
        check_path(&method, path)?;

        let placeholders = path_placeholders(path);
        if let Some(missing) = config.params.names().find(|name| !placeholders.contains(name)) {
            return Err(AppError::configuration(format!(
                "{} {} declares path param \"{}\" which is not in the path",
                method, path, missing
            )));
        }

        if config.paginated {
            config.query = pagination_query().merge(config.query);
        }

        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| AppError::configuration(format!("Method {} cannot be routed", method)))?;

        let raw = handler.is_raw();
        let template = route_template(path);
        if self
            .endpoints
            .iter()
            .any(|e| e.routed && e.method == method && route_template(&e.path) == template)
        {
            warn!("{} {} is already registered, the new handler will never be reached", method, path);
            self.endpoints.push(Endpoint {
                method,
                path: path.to_string(),
                config,
                routed: false,
                raw,
            });
            return Ok(());
        }

        for mounted in self.routes.values() {
            if let Some((theirs, ours)) = conflicting_placeholder(&mounted.path, path) {
                return Err(AppError::configuration(format!(
                    "{} {}: placeholder {} conflicts with {} in {}",
                    method, path, ours, theirs, mounted.path
                )));
            }
        }

        let validator = if self.enable_validation && config.has_schema() {
            Some(RequestValidator::compile(&config.params, &config.query, &config.body)?)
        } else {
            None
        };

        let route = Arc::new(Route {
            config: config.clone(),
            validator,
            handler,
            has_params: !placeholders.is_empty(),
        });
        let shared = self.shared.clone();

        let mounted = self.routes.entry(template).or_insert_with(|| Mounted {
            path: path.to_string(),
            methods: MethodRouter::new(),
        });
        let methods = std::mem::replace(&mut mounted.methods, MethodRouter::new());
        mounted.methods = methods.on(filter, move |State(state): State<S>, request: Request| {
            let route = route.clone();
            let shared = shared.clone();
            async move { route.call(&shared, state, request).await }
        });

        debug!("Registered {} {}", method, path);
        self.endpoints.push(Endpoint {
            method,
            path: path.to_string(),
            config,
            routed: true,
            raw,
        });
        Ok(())
    }

    pub fn get(&mut self, path: &str, config: EndpointConfig, handler: Handler<S>) -> AppResult<()> {
        self.register(Method::GET, path, config, handler)
    }

    pub fn post(&mut self, path: &str, config: EndpointConfig, handler: Handler<S>) -> AppResult<()> {
        self.register(Method::POST, path, config, handler)
    }

    pub fn put(&mut self, path: &str, config: EndpointConfig, handler: Handler<S>) -> AppResult<()> {
        self.register(Method::PUT, path, config, handler)
    }

    pub fn delete(&mut self, path: &str, config: EndpointConfig, handler: Handler<S>) -> AppResult<()> {
        self.register(Method::DELETE, path, config, handler)
    }

    /// Mounts a plain router (docs UI, static files). Not recorded.
    pub fn merge(&mut self, router: Router<S>) {
        let current = std::mem::take(&mut self.router);
        self.router = current.merge(router);
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Final router: 404 fallback, CORS and request tracing.
    ///
    /// A known path requested with an unregistered method is a 404 as well.
    pub fn into_router(self, state: S) -> Router {
        let translator = self.shared.translator;
        let mut router = self.router;
        for mounted in self.routes.into_values() {
            let methods = mounted
                .methods
                .fallback(move |method: Method, uri: Uri| async move { not_found(translator, method, uri) });
            router = router.route(&mounted.path, methods);
        }

        router
            .fallback(move |method: Method, uri: Uri| async move { not_found(translator, method, uri) })
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::server::errors::INTERNAL_ERROR_MESSAGE;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    struct NoUsers;

    #[async_trait]
    impl Authenticator for NoUsers {
        async fn authenticate(&self, _headers: &HeaderMap) -> AppResult<User> {
            Err(AppError::unauthorized("Authentication required"))
        }
    }

    fn registrar(translator: ErrorTranslator, enable_validation: bool) -> Registrar<()> {
        Registrar::new(Arc::new(NoUsers), translator, enable_validation)
    }

    fn echo_param(name: &'static str) -> Handler<()> {
        Handler::value(move |req: ApiRequest<()>| async move {
            Ok::<_, AppError>(json!({ "handler": name, "value": req.param(name)? }))
        })
    }

    async fn send(registrar: Registrar<()>, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = registrar.into_router(()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn placeholders_are_collected() {
        let names = path_placeholders("/api/v1/issues/:id/comments/:comment_id");
        assert!(names.contains("id"));
        assert!(names.contains("comment_id"));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn templates_ignore_placeholder_names() {
        assert_eq!(route_template("/x/:a/y"), route_template("/x/:b/y"));
        assert_eq!(route_template("/files/*rest"), "/files/*");
        assert_ne!(route_template("/x/:a"), route_template("/x/a"));
    }

    #[tokio::test]
    async fn renamed_placeholder_is_a_duplicate_and_first_wins() {
        let mut registrar = registrar(ErrorTranslator::default(), true);
        let first = EndpointConfig::new().public().describe("first");
        let second = EndpointConfig::new().public().describe("second");
        registrar.get("/x/:a", first, echo_param("a")).unwrap();
        registrar.get("/x/:b", second, echo_param("b")).unwrap();

        let routed: Vec<bool> = registrar.endpoints().iter().map(|e| e.routed).collect();
        assert_eq!(routed, vec![true, false]);

        let docs = crate::server::docs::build_openapi(&AppConfig::default().server.api_docs, "", registrar.endpoints());
        let docs = serde_json::to_value(&docs).unwrap();
        assert_eq!(docs["paths"]["/x/{a}"]["get"]["summary"], "first");
        assert!(docs["paths"].get("/x/{b}").is_none());

        let (status, body) = send(registrar, Method::GET, "/x/42", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "handler": "a", "value": "42" }));
    }

    #[test]
    fn clashing_placeholder_names_are_a_configuration_error() {
        let mut registrar = registrar(ErrorTranslator::default(), true);
        registrar.get("/x/:a", EndpointConfig::new(), echo_param("a")).unwrap();

        let nested = registrar.get("/x/:b/y", EndpointConfig::new(), echo_param("b")).unwrap_err();
        assert_eq!(nested.name(), "ConfigurationError");

        let other_method = registrar.put("/x/:b", EndpointConfig::new(), echo_param("b")).unwrap_err();
        assert_eq!(other_method.name(), "ConfigurationError");

        registrar.get("/x/:a/y", EndpointConfig::new(), echo_param("a")).unwrap();
        registrar.put("/x/:a", EndpointConfig::new(), echo_param("a")).unwrap();
    }

    #[test]
    fn malformed_paths_are_a_configuration_error() {
        let mut registrar = registrar(ErrorTranslator::default(), true);
        for path in ["x", "/files/*rest/more", "/x/:"] {
            let err = registrar.get(path, EndpointConfig::new(), echo_param("a")).unwrap_err();
            assert_eq!(err.name(), "ConfigurationError", "{}", path);
        }
    }

    #[test]
    fn declared_param_must_appear_in_path() {
        let mut registrar = registrar(ErrorTranslator::default(), true);
        let config = EndpointConfig::new().params(ObjectSchema::new().field("id", Field::string()));

        let err = registrar.get("/x", config, echo_param("id")).unwrap_err();
        assert_eq!(err.name(), "ConfigurationError");
        assert!(err.to_string().contains("\"id\""));
        assert!(registrar.endpoints().is_empty());
    }

    #[tokio::test]
    async fn unregistered_method_on_known_path_is_404() {
        let mut registrar = registrar(ErrorTranslator::default(), true);
        registrar.get("/x/:a", EndpointConfig::new().public(), echo_param("a")).unwrap();

        let (status, body) = send(registrar, Method::PATCH, "/x/1", Value::Null).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Endpoint not found (PATCH /x/1)");
    }

    #[tokio::test]
    async fn disabled_validation_passes_input_through() {
        let mut registrar = registrar(ErrorTranslator::default(), false);
        let config = EndpointConfig::new()
            .public()
            .body(ObjectSchema::new().field("title", Field::string().required()));
        registrar
            .post(
                "/x",
                config,
                Handler::value(|req: ApiRequest<()>| async move { Ok::<_, AppError>(Value::Object(req.data.body)) }),
            )
            .unwrap();

        let (status, body) = send(registrar, Method::POST, "/x", json!({ "other": 1 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "other": 1 }));
    }

    #[tokio::test]
    async fn raw_handler_errors_are_translated() {
        let mut registrar = registrar(ErrorTranslator::new(false, false), true);
        registrar
            .get(
                "/boom",
                EndpointConfig::new().public(),
                Handler::raw(|_req: ApiRequest<()>| async { Err::<Response, _>(AppError::internal("password=hunter2")) }),
            )
            .unwrap();
        registrar
            .get(
                "/gone",
                EndpointConfig::new().public(),
                Handler::raw(|_req: ApiRequest<()>| async { Err::<Response, _>(AppError::not_found("Issue", "abc")) }),
            )
            .unwrap();
        let router = registrar.into_router(());

        let response = router.clone().oneshot(axum::http::Request::get("/boom").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], INTERNAL_ERROR_MESSAGE);
        assert_eq!(body["error"]["name"], "InternalError");
        assert!(body["error"].get("stack").is_none());

        let response = router.oneshot(axum::http::Request::get("/gone").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "Issue \"abc\" was not found");
        assert!(body["error"].get("stack").is_none());
    }

    #[tokio::test]
    async fn auth_endpoints_reject_before_the_handler_runs() {
        let mut registrar = registrar(ErrorTranslator::default(), true);
        registrar.get("/private", EndpointConfig::new(), echo_param("a")).unwrap();

        let (status, body) = send(registrar, Method::GET, "/private", Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"]["stack"].is_string());
    }
}
