//! OpenAPI document generated from the endpoint registry.

use std::collections::BTreeMap;

use axum::http::Method;
use utoipa::openapi::path::{OperationBuilder, ParameterBuilder, ParameterIn, PathItem, PathItemType, PathsBuilder};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::{
    ArrayBuilder, ComponentsBuilder, ContentBuilder, InfoBuilder, KnownFormat, ObjectBuilder, OpenApi, OpenApiBuilder,
    Ref, RefOr, Required, Schema, SchemaFormat, SchemaType, Server,
};

use super::registrar::Endpoint;
use crate::config::ApiDocsConfig;

const JSON: &str = "application/json";
const BINARY: &str = "application/octet-stream";

/// `/issues/:id` becomes `/issues/{id}`.
pub fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':').or_else(|| segment.strip_prefix('*')) {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn path_item_type(method: &Method) -> Option<PathItemType> {
    match *method {
        Method::GET => Some(PathItemType::Get),
        Method::POST => Some(PathItemType::Post),
        Method::PUT => Some(PathItemType::Put),
        Method::DELETE => Some(PathItemType::Delete),
        Method::PATCH => Some(PathItemType::Patch),
        Method::HEAD => Some(PathItemType::Head),
        Method::OPTIONS => Some(PathItemType::Options),
        Method::TRACE => Some(PathItemType::Trace),
        _ => None,
    }
}

fn operation_id(method: &Method, path: &str) -> String {
    let mut id = method.as_str().to_ascii_lowercase();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        id.push('_');
        id.push_str(segment.trim_start_matches([':', '*']));
    }
    id
}

fn integer() -> RefOr<Schema> {
    RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::Integer).build()))
}

/// `{total, page, pages, limit, docs: [item]}`
pub fn pagination_envelope(item: RefOr<Schema>) -> Schema {
    let docs = ArrayBuilder::new().items(item).build();
    let mut builder = ObjectBuilder::new().schema_type(SchemaType::Object);
    for field in ["total", "page", "pages", "limit"] {
        builder = builder.property(field, integer()).required(field);
    }
    Schema::Object(
        builder
            .property("docs", RefOr::T(Schema::Array(docs)))
            .required("docs")
            .build(),
    )
}

fn error_envelope() -> Schema {
    let error = ObjectBuilder::new()
        .schema_type(SchemaType::Object)
        .property("message", RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::String).build())))
        .required("message")
        .property("name", RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::String).build())))
        .property("code", integer())
        .property("stack", RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::String).build())))
        .build();
    Schema::Object(
        ObjectBuilder::new()
            .schema_type(SchemaType::Object)
            .property("error", RefOr::T(Schema::Object(error)))
            .required("error")
            .build(),
    )
}

/// Builds the document. Paths under `base_path` are listed relative to it
/// and `base_path` becomes the server entry.
pub fn build_openapi(options: &ApiDocsConfig, base_path: &str, endpoints: &[Endpoint]) -> OpenApi {
    let mut components = ComponentsBuilder::new().schema("Error", error_envelope());
    let mut items: BTreeMap<String, PathItem> = BTreeMap::new();

    for endpoint in endpoints.iter().filter(|e| e.routed) {
        let Some(item_type) = path_item_type(&endpoint.method) else {
            continue;
        };
        let config = &endpoint.config;
        let relative = endpoint.path.strip_prefix(base_path).filter(|p| p.starts_with('/')).unwrap_or(&endpoint.path);

        let mut operation = OperationBuilder::new()
            .operation_id(Some(operation_id(&endpoint.method, relative)))
            .summary(config.description.clone())
            .tag(config.tag.clone().unwrap_or_else(|| "api".to_string()));

        if config.auth {
            operation = operation.parameter(
                ParameterBuilder::new()
                    .name("Authorization")
                    .parameter_in(ParameterIn::Header)
                    .required(Required::True)
                    .description(Some("Bearer token obtained from /login"))
                    .schema(Some(RefOr::T(Schema::Object(
                        ObjectBuilder::new().schema_type(SchemaType::String).build(),
                    ))))
                    .build(),
            );
        }
        for parameter in config
            .params
            .doc_parameters(ParameterIn::Path)
            .into_iter()
            .chain(config.query.doc_parameters(ParameterIn::Query))
        {
            operation = operation.parameter(parameter);
        }

        if !config.body.is_empty() {
            operation = operation.request_body(Some(
                RequestBodyBuilder::new()
                    .content(JSON, ContentBuilder::new().schema(config.body.doc_schema()).build())
                    .required(Some(Required::True))
                    .build(),
            ));
        }

        let mut success = ResponseBuilder::new().description("Success");
        if let Some(shape) = &config.response {
            components = components.schema(shape.name.clone(), shape.schema.clone());
            let reference = RefOr::Ref(Ref::from_schema_name(shape.name.clone()));
            let schema = if config.paginated {
                RefOr::T(pagination_envelope(reference))
            } else {
                reference
            };
            success = success.content(JSON, ContentBuilder::new().schema(schema).build());
        } else if endpoint.raw {
            let file = ObjectBuilder::new()
                .schema_type(SchemaType::String)
                .format(Some(SchemaFormat::KnownFormat(KnownFormat::Binary)))
                .build();
            success = success.content(BINARY, ContentBuilder::new().schema(Schema::Object(file)).build());
        }
        operation = operation.response("200", success.build());

        let error_content = || {
            ContentBuilder::new()
                .schema(RefOr::Ref(Ref::from_schema_name("Error")))
                .build()
        };
        if config.has_schema() {
            operation = operation.response(
                "400",
                ResponseBuilder::new()
                    .description("Validation failed")
                    .content(JSON, error_content())
                    .build(),
            );
        }
        if config.auth {
            operation = operation.response(
                "401",
                ResponseBuilder::new()
                    .description("Authentication required")
                    .content(JSON, error_content())
                    .build(),
            );
        }

        let operation = operation.build();
        let key = openapi_path(relative);
        match items.get_mut(&key) {
            Some(item) => {
                item.operations.insert(item_type, operation);
            }
            None => {
                items.insert(key, PathItem::new(item_type, operation));
            }
        }
    }

    let mut paths = PathsBuilder::new();
    for (path, item) in items {
        paths = paths.path(path, item);
    }

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(options.title.clone())
                .version(options.version.clone())
                .description(Some(options.description.clone()))
                .build(),
        )
        .servers(Some(vec![Server::new(base_path)]))
        .paths(paths.build())
        .components(Some(components.build()))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_use_braces() {
        assert_eq!(openapi_path("/issues/:id/comments"), "/issues/{id}/comments");
        assert_eq!(openapi_path("/login"), "/login");
    }

    #[test]
    fn operation_ids_are_readable() {
        assert_eq!(operation_id(&Method::GET, "/issues/:id/documents"), "get_issues_id_documents");
    }
}
