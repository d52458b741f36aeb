use std::future::Future;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Uri};
use axum::response::Response;
use futures::future::BoxFuture;
use mongodb::bson::oid::ObjectId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use utoipa::openapi::{RefOr, Schema};
use utoipa::ToSchema;

use super::validation::{FailureKind, ObjectSchema, Section, ValidatedData, ValidationError};
use crate::error::{AppError, AppResult};
use crate::models::user::User;

/// Documented shape of a successful response body.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    pub name: String,
    pub schema: RefOr<Schema>,
}

impl ResponseShape {
    pub fn of<T: ToSchema<'static>>() -> Self {
        let (name, schema) = T::schema();
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// Route metadata. Drives validation and the generated API docs.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub description: Option<String>,
    pub params: ObjectSchema,
    pub query: ObjectSchema,
    pub body: ObjectSchema,
    pub response: Option<ResponseShape>,
    pub auth: bool,
    pub paginated: bool,
    pub tag: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            description: None,
            params: ObjectSchema::new(),
            query: ObjectSchema::new(),
            body: ObjectSchema::new(),
            response: None,
            auth: true,
            paginated: false,
            tag: None,
        }
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn params(mut self, params: ObjectSchema) -> Self {
        self.params = params;
        self
    }

    pub fn query(mut self, query: ObjectSchema) -> Self {
        self.query = query;
        self
    }

    pub fn body(mut self, body: ObjectSchema) -> Self {
        self.body = body;
        self
    }

    pub fn response<T: ToSchema<'static>>(mut self) -> Self {
        self.response = Some(ResponseShape::of::<T>());
        self
    }

    /// No authentication required.
    pub fn public(mut self) -> Self {
        self.auth = false;
        self
    }

    pub fn paginated(mut self) -> Self {
        self.paginated = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn has_schema(&self) -> bool {
        !(self.params.is_empty() && self.query.is_empty() && self.body.is_empty())
    }
}

/// Everything a handler gets to see about the request.
pub struct ApiRequest<S> {
    pub state: S,
    pub data: ValidatedData,
    pub user: Option<User>,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    body: Mutex<Option<Body>>,
}

impl<S> ApiRequest<S> {
    pub fn new(state: S, data: ValidatedData, user: Option<User>, method: Method, uri: Uri, headers: HeaderMap, body: Option<Body>) -> Self {
        Self {
            state,
            data,
            user,
            method,
            uri,
            headers,
            body: Mutex::new(body),
        }
    }

    /// The authenticated user. Only missing on public endpoints.
    pub fn user(&self) -> AppResult<&User> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }

    pub fn param(&self, name: &str) -> AppResult<&str> {
        self.data
            .params
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ValidationError::single(Section::Params, name, FailureKind::Required, format!("\"{}\" is required", name))
                    .into()
            })
    }

    pub fn object_id(&self, name: &str) -> AppResult<ObjectId> {
        let raw = self.param(name)?;
        ObjectId::parse_str(raw).map_err(|_| {
            ValidationError::single(
                Section::Params,
                name,
                FailureKind::Pattern,
                format!("\"{}\" with value \"{}\" fails to match the Mongo ObjectId pattern", name, raw),
            )
            .into()
        })
    }

    pub fn query_u64(&self, name: &str) -> Option<u64> {
        match self.data.query.get(name)? {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_u64(),
        }
    }

    /// Deserializes the validated body.
    pub fn body_as<T: DeserializeOwned>(&self) -> AppResult<T> {
        serde_json::from_value(Value::Object(self.data.body.clone())).map_err(|e| {
            ValidationError::single(Section::Body, "", FailureKind::Type, format!("Invalid body: {}", e)).into()
        })
    }

    /// The unread request body. Only present when no body schema was declared.
    pub fn take_body(&self) -> Option<Body> {
        self.body.lock().ok().and_then(|mut body| body.take())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

pub type ValueHandlerFn<S> = dyn Fn(ApiRequest<S>) -> BoxFuture<'static, AppResult<Value>> + Send + Sync;
pub type RawHandlerFn<S> = dyn Fn(ApiRequest<S>) -> BoxFuture<'static, AppResult<Response>> + Send + Sync;

/// How a handler's result reaches the client.
pub enum Handler<S> {
    /// Result is serialized as a JSON 200 response, errors are translated.
    Value(Arc<ValueHandlerFn<S>>),
    /// Handler builds the response itself, errors are still translated.
    Raw(Arc<RawHandlerFn<S>>),
}

impl<S> Clone for Handler<S> {
    fn clone(&self) -> Self {
        match self {
            Handler::Value(f) => Handler::Value(f.clone()),
            Handler::Raw(f) => Handler::Raw(f.clone()),
        }
    }
}

impl<S: Send + 'static> Handler<S> {
    pub fn value<F, Fut, T>(f: F) -> Self
    where
        F: Fn(ApiRequest<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Serialize + Send,
    {
        Handler::Value(Arc::new(move |request| -> BoxFuture<'static, AppResult<Value>> {
            let fut = f(request);
            Box::pin(async move {
                let value = fut.await?;
                Ok::<_, AppError>(serde_json::to_value(value)?)
            })
        }))
    }

    pub fn raw<F, Fut>(f: F) -> Self
    where
        F: Fn(ApiRequest<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Response>> + Send + 'static,
    {
        Handler::Raw(Arc::new(move |request| -> BoxFuture<'static, AppResult<Response>> {
            Box::pin(f(request))
        }))
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Handler::Raw(_))
    }
}
