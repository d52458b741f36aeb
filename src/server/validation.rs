//! Declarative request validation.
//!
//! An endpoint describes its path params, query string and body as
//! [`ObjectSchema`]s. [`RequestValidator::compile`] turns the three of them
//! into a single validator that coerces raw request values into typed JSON
//! and reports every failing field at once. The same schemas produce the
//! OpenAPI fragments used by the docs generator.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use utoipa::openapi::path::{Parameter, ParameterBuilder, ParameterIn};
use utoipa::openapi::{ObjectBuilder, RefOr, Required, Schema, SchemaType};

use crate::error::AppError;

pub const OBJECT_ID_PATTERN: &str = "^[0-9a-fA-F]{24}$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    ObjectId,
}

impl FieldType {
    fn label(self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::Integer => "an integer",
            FieldType::Number => "a number",
            FieldType::Boolean => "a boolean",
            FieldType::ObjectId => "a string",
        }
    }
}

/// Constraints for a single named field.
#[derive(Debug, Clone)]
pub struct Field {
    ty: FieldType,
    required: bool,
    max_length: Option<usize>,
    allowed: Option<Vec<String>>,
    pattern: Option<(String, String)>,
    positive: bool,
    description: Option<String>,
}

impl Field {
    fn of(ty: FieldType) -> Self {
        Self {
            ty,
            required: false,
            max_length: None,
            allowed: None,
            pattern: None,
            positive: false,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    /// 24 hex characters, the textual form of a Mongo ObjectId. Required.
    pub fn object_id() -> Self {
        let mut field = Self::of(FieldType::ObjectId);
        field.required = true;
        field.pattern = Some((OBJECT_ID_PATTERN.to_string(), "Mongo ObjectId".to_string()));
        field
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Regex the (string) value must match. `name` is used in error messages.
    pub fn pattern(mut self, regex: impl Into<String>, name: impl Into<String>) -> Self {
        self.pattern = Some((regex.into(), name.into()));
        self
    }

    /// Numeric value must be strictly greater than zero.
    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// OpenAPI schema for this field.
    pub fn doc_schema(&self) -> Schema {
        let schema_type = match self.ty {
            FieldType::String | FieldType::ObjectId => SchemaType::String,
            FieldType::Integer => SchemaType::Integer,
            FieldType::Number => SchemaType::Number,
            FieldType::Boolean => SchemaType::Boolean,
        };

        let mut builder = ObjectBuilder::new()
            .schema_type(schema_type)
            .description(self.description.clone())
            .max_length(self.max_length)
            .pattern(self.pattern.as_ref().map(|(regex, _)| regex.clone()))
            .enum_values(self.allowed.clone());

        if self.positive {
            builder = match self.ty {
                FieldType::Integer => builder.minimum(Some(1.0)),
                _ => builder.exclusive_minimum(Some(0.0)),
            };
        }

        Schema::Object(builder.build())
    }
}

/// Ordered set of named fields.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    fields: Vec<(String, Field)>,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, replacing any earlier field of the same name.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        let name = name.into();
        self.fields.retain(|(existing, _)| *existing != name);
        self.fields.push((name, field));
        self
    }

    /// Fields of `other` are added on top of this schema.
    pub fn merge(mut self, other: ObjectSchema) -> Self {
        for (name, field) in other.fields {
            self = self.field(name, field);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn doc_schema(&self) -> Schema {
        let mut builder = ObjectBuilder::new().schema_type(SchemaType::Object);
        for (name, field) in &self.fields {
            builder = builder.property(name.clone(), RefOr::T(field.doc_schema()));
            if field.required {
                builder = builder.required(name.clone());
            }
        }
        Schema::Object(builder.build())
    }

    pub fn doc_parameters(&self, location: ParameterIn) -> Vec<Parameter> {
        self.fields
            .iter()
            .map(|(name, field)| {
                let required = if field.required || matches!(location, ParameterIn::Path) {
                    Required::True
                } else {
                    Required::False
                };
                ParameterBuilder::new()
                    .name(name.clone())
                    .parameter_in(location.clone())
                    .required(required)
                    .description(field.description.clone())
                    .schema(Some(RefOr::T(field.doc_schema())))
                    .build()
            })
            .collect()
    }

    fn compile(&self) -> Result<CompiledSchema, AppError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, field) in &self.fields {
            let regex = match &field.pattern {
                Some((pattern, _)) => Some(Regex::new(pattern).map_err(|e| {
                    AppError::configuration(format!(
                        "Invalid pattern for field \"{}\": {}",
                        name, e
                    ))
                })?),
                None => None,
            };
            fields.push(CompiledField {
                name: name.clone(),
                field: field.clone(),
                regex,
            });
        }
        Ok(CompiledSchema { fields })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Params,
    Query,
    Body,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Params => "params",
            Section::Query => "query",
            Section::Body => "body",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Required,
    Type,
    MaxLength,
    Enum,
    Pattern,
    Min,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub section: Section,
    pub field: String,
    pub kind: FailureKind,
    pub message: String,
}

/// All field failures of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub details: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(section: Section, field: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            details: vec![FieldError {
                section,
                field: field.into(),
                kind,
                message: message.into(),
            }],
        }
    }

    pub fn has(&self, field: &str, kind: FailureKind) -> bool {
        self.details.iter().any(|d| d.field == field && d.kind == kind)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.details.iter().map(|d| d.message.as_str()).collect();
        f.write_str(&messages.join(". "))
    }
}

impl std::error::Error for ValidationError {}

/// Raw, untyped request input as it arrives from the router.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    pub params: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Normalised request values handed to the handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedData {
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct CompiledField {
    name: String,
    field: Field,
    regex: Option<Regex>,
}

#[derive(Debug, Clone)]
struct CompiledSchema {
    fields: Vec<CompiledField>,
}

impl CompiledSchema {
    fn validate(&self, section: Section, input: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Map<String, Value> {
        let mut output = Map::new();
        for compiled in &self.fields {
            match check_field(section, compiled, input.get(&compiled.name)) {
                Ok(Some(value)) => {
                    output.insert(compiled.name.clone(), value);
                }
                Ok(None) => {}
                Err(err) => errors.push(err),
            }
        }
        output
    }
}

/// Combined validator for params, query and body of one endpoint.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    params: CompiledSchema,
    query: CompiledSchema,
    body: CompiledSchema,
    has_body: bool,
}

impl RequestValidator {
    pub fn compile(params: &ObjectSchema, query: &ObjectSchema, body: &ObjectSchema) -> Result<Self, AppError> {
        Ok(Self {
            params: params.compile()?,
            query: query.compile()?,
            body: body.compile()?,
            has_body: !body.is_empty(),
        })
    }

    /// Validates everything, collecting all failures before giving up.
    pub fn validate(&self, raw: &RawInput) -> Result<ValidatedData, ValidationError> {
        let mut errors = Vec::new();

        let params = strings_to_map(raw.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        let query = strings_to_map(
            raw.query
                .iter()
                .map(|(k, v)| (normalize_query_key(k), v.clone())),
        );

        let body = match &raw.body {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) if self.has_body => {
                errors.push(FieldError {
                    section: Section::Body,
                    field: String::new(),
                    kind: FailureKind::Type,
                    message: "\"body\" must be an object".to_string(),
                });
                Map::new()
            }
            Some(_) => Map::new(),
        };

        let data = ValidatedData {
            params: self.params.validate(Section::Params, &params, &mut errors),
            query: self.query.validate(Section::Query, &query, &mut errors),
            body: self.body.validate(Section::Body, &body, &mut errors),
        };

        if errors.is_empty() {
            Ok(data)
        } else {
            Err(ValidationError { details: errors })
        }
    }

    /// Input passed through unchecked, for servers running with validation off.
    pub fn passthrough(raw: &RawInput) -> ValidatedData {
        let body = match &raw.body {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        ValidatedData {
            params: strings_to_map(raw.params.iter().map(|(k, v)| (k.clone(), v.clone()))),
            query: strings_to_map(raw.query.iter().map(|(k, v)| (normalize_query_key(k), v.clone()))),
            body,
        }
    }
}

fn strings_to_map(pairs: impl Iterator<Item = (String, String)>) -> Map<String, Value> {
    pairs.map(|(k, v)| (k, Value::String(v))).collect()
}

/// `Page-Size` and `page_size` both become `page_size`.
pub fn normalize_query_key(key: &str) -> String {
    let mut normalized = String::with_capacity(key.len());
    let mut pending_separator = false;
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if pending_separator {
        normalized.push('_');
    }
    normalized
}

fn check_field(section: Section, compiled: &CompiledField, value: Option<&Value>) -> Result<Option<Value>, FieldError> {
    let name = &compiled.name;
    let field = &compiled.field;
    let fail = |kind: FailureKind, message: String| FieldError {
        section,
        field: name.clone(),
        kind,
        message,
    };

    let value = match value {
        None | Some(Value::Null) => {
            return if field.required {
                Err(fail(FailureKind::Required, format!("\"{}\" is required", name)))
            } else {
                Ok(None)
            };
        }
        Some(Value::String(s)) if s.is_empty() && field.required => {
            return Err(fail(FailureKind::Required, format!("\"{}\" is not allowed to be empty", name)));
        }
        Some(value) => value,
    };

    let coerced = coerce(field.ty, value)
        .ok_or_else(|| fail(FailureKind::Type, format!("\"{}\" must be {}", name, field.ty.label())))?;

    if let Value::String(s) = &coerced {
        if let Some(max) = field.max_length {
            if s.chars().count() > max {
                return Err(fail(
                    FailureKind::MaxLength,
                    format!("\"{}\" length must be less than or equal to {} characters long", name, max),
                ));
            }
        }

        if let Some(allowed) = &field.allowed {
            if !allowed.iter().any(|a| a == s) {
                return Err(fail(
                    FailureKind::Enum,
                    format!("\"{}\" must be one of [{}]", name, allowed.join(", ")),
                ));
            }
        }

        if let (Some(regex), Some((_, pattern_name))) = (&compiled.regex, &field.pattern) {
            if !regex.is_match(s) {
                return Err(fail(
                    FailureKind::Pattern,
                    format!("\"{}\" with value \"{}\" fails to match the {} pattern", name, s, pattern_name),
                ));
            }
        }
    }

    if field.positive {
        let positive = coerced.as_f64().map(|n| n > 0.0).unwrap_or(false);
        if !positive {
            return Err(fail(FailureKind::Min, format!("\"{}\" must be greater than 0", name)));
        }
    }

    Ok(Some(coerced))
}

fn coerce(ty: FieldType, value: &Value) -> Option<Value> {
    match (ty, value) {
        (FieldType::String | FieldType::ObjectId, Value::String(_)) => Some(value.clone()),
        (FieldType::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Some(value.clone())
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| Value::Number(Number::from(f as i64)))
            }
        }
        (FieldType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(|i| Value::Number(i.into())),
        (FieldType::Number, Value::Number(_)) => Some(value.clone()),
        (FieldType::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}
