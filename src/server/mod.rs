//! Request pipeline: declarative endpoints, validation, error translation
//! and generated API docs.

pub mod docs;
pub mod endpoint;
pub mod errors;
pub mod registrar;
pub mod validation;

pub use endpoint::{ApiRequest, EndpointConfig, Handler, ResponseShape};
pub use errors::ErrorTranslator;
pub use registrar::{Authenticator, Endpoint, Registrar};
pub use validation::{Field, ObjectSchema};
