//! The error kinds propagated by handlers, middleware, and the registry, and
//! their default mapping onto HTTP responses.

use derive_more::{Display, Error as DeriveError};
use http::StatusCode;

use crate::response::ResponseBuilder;

/// A single field-level validation failure, reported as part of a
/// [`ErrorKind::Bind`] error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The conceptual error kinds from the error handling design: routing,
/// registry, and binding failures all funnel into one of these.
#[derive(Debug, Display, DeriveError, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, missing required field, type-conversion, or
    /// validation failure while binding a request into a typed struct.
    #[display("bad request")]
    Bind,
    /// A service, handler, middleware, or route was not found.
    #[display("not found")]
    NotFound,
    /// The scoped permission grant denies this operation.
    #[display("not allowed")]
    NotAllowed,
    /// A duplicate registration under a name that disallows replacement.
    #[display("already exists")]
    AlreadyExists,
    /// A referenced factory is not registered.
    #[display("factory not found")]
    FactoryNotFound,
    /// The path matched but not for the requested method.
    #[display("method not allowed")]
    MethodNotAllowed,
    /// An explicit conflict signalled by a handler or middleware.
    #[display("conflict")]
    Conflict,
    /// Default fallback; message is sanitized before reaching the client.
    #[display("internal server error")]
    Internal,
    /// The request's cancellation token fired. Never mapped to a status;
    /// the client is already gone.
    #[display("cancelled")]
    Cancelled,
}

/// An error produced by a handler, middleware, or the registry.
///
/// `Error` carries a [`ErrorKind`], a message safe to log (and, for all
/// kinds but [`ErrorKind::Internal`], safe to return to the client), and an
/// optional per-field map populated by validation failures.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    field_errors: Vec<FieldError>,
    allow: Vec<String>,
}

impl Error {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            field_errors: Vec::new(),
            allow: Vec::new(),
        }
    }

    pub fn bind(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Bind, message)
    }

    /// A [`ErrorKind::Bind`] error carrying a per-field validation map.
    pub fn validation(field_errors: Vec<FieldError>) -> Self {
        let mut err = Error::new(ErrorKind::Bind, "validation failed");
        err.field_errors = field_errors;
        err
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotAllowed, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::AlreadyExists, message)
    }

    pub fn factory_not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::FactoryNotFound, message)
    }

    pub fn method_not_allowed(allow: Vec<String>) -> Self {
        let mut err = Error::new(ErrorKind::MethodNotAllowed, "method not allowed");
        err.allow = allow;
        err
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, message)
    }

    pub fn cancelled() -> Self {
        Error::new(ErrorKind::Cancelled, "request cancelled")
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn allow(&self) -> &[String] {
        &self.allow
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

/// Errors which can be turned into an HTTP response. Implemented for
/// [`Error`]; host-defined error types used from a raw handler may implement
/// it too.
pub trait ResponseError: std::fmt::Debug + std::fmt::Display {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> ResponseBuilder {
        let mut builder = ResponseBuilder::new();
        builder.status(self.status_code());
        builder.json(serde_json::json!({ "message": self.to_string() }));
        builder
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Bind => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NotAllowed => StatusCode::FORBIDDEN,
            ErrorKind::AlreadyExists => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::FactoryNotFound => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> ResponseBuilder {
        let mut builder = ResponseBuilder::new();
        builder.status(self.status_code());

        if !self.field_errors.is_empty() {
            let fields: serde_json::Map<String, serde_json::Value> = self
                .field_errors
                .iter()
                .map(|fe| (fe.field.clone(), serde_json::Value::String(fe.message.clone())))
                .collect();
            builder.json(serde_json::json!({ "error": self.message, "fields": fields }));
        } else if self.kind == ErrorKind::MethodNotAllowed {
            builder.header(http::header::ALLOW, self.allow.join(", "));
            builder.json(serde_json::json!({ "message": self.message }));
        } else if self.kind == ErrorKind::Internal {
            // Internal details are never surfaced to the client.
            builder.json(serde_json::json!({ "message": "internal server error" }));
        } else {
            builder.json(serde_json::json!({ "message": self.message }));
        }

        builder
    }
}

/// `(status≥400 ∨ err≠nil) ⇒ stop`. Consulted by the middleware composition
/// wrapper and by before/after-style middleware that wants to skip its own
/// post-handler logic after a preceding stage has already terminated the
/// chain.
pub fn should_stop_middleware_chain(err: Option<&Error>, response: &ResponseBuilder) -> bool {
    err.is_some() || response.status_code().as_u16() >= 400
}
