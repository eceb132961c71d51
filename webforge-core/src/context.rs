//! The request/response context threaded through the middleware chain and
//! handed to handlers.

use std::any::Any;
use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use webforge_router::PathParams;

use crate::error::{Error, FieldError};
use crate::response::ResponseBuilder;

/// Declarative validation a `bind_all` target runs after binding. The
/// default is a no-op — a type opts in by overriding `validate` and
/// reporting one [`FieldError`] per violated field; `bind_all` turns a
/// non-empty result into an [`Error::validation`].
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        Ok(())
    }
}

/// Request-scoped, unsynchronized key/value bag. Middleware uses this to
/// pass state down the chain; values are type-erased and retrieved by the
/// same concrete type they were inserted as.
#[derive(Default)]
pub struct Values(HashMap<String, Box<dyn Any>>);

impl Values {
    pub fn insert<T: 'static>(&mut self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), Box::new(value));
    }

    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.0.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.0.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.0.remove(key).and_then(|v| v.downcast::<T>().ok()).map(|b| *b)
    }
}

/// One request's worth of state: the parsed request line, the matched
/// route's path parameters, the raw query string, headers, body, a
/// user-value bag, the response being built, and a cancellation token tied
/// to the client connection.
///
/// Passed through the middleware/handler chain by value. Each stage in the
/// chain takes ownership, mutates it, and hands it back — this sidesteps the
/// lifetime entanglement that a `&mut Context` threaded across boxed,
/// possibly-`!Send` futures would otherwise create.
pub struct Context {
    method: Method,
    path: String,
    path_params: PathParams,
    query: String,
    headers: HeaderMap,
    body: Bytes,
    values: Values,
    response: ResponseBuilder,
    cancellation: CancellationToken,
}

impl Context {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        path_params: PathParams,
        query: impl Into<String>,
        headers: HeaderMap,
        body: Bytes,
        cancellation: CancellationToken,
    ) -> Self {
        Context {
            method,
            path: path.into(),
            path_params,
            query: query.into(),
            headers,
            body,
            values: Values::default(),
            response: ResponseBuilder::new(),
            cancellation,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn query_str(&self) -> &str {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Values {
        &mut self.values
    }

    pub fn response(&self) -> &ResponseBuilder {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseBuilder {
        &mut self.response
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Consumes the context, handing the dispatcher the finalized response
    /// builder and the cancellation token it is responsible for closing.
    pub fn into_response_parts(self) -> (ResponseBuilder, CancellationToken) {
        (self.response, self.cancellation)
    }

    /// Deserializes the matched route's path parameters into `T`.
    pub fn path_params_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        self.path_params
            .load()
            .map_err(|err| Error::bind(format!("path: {err}")))
    }

    /// Deserializes the raw query string into `T`.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_urlencoded::from_str(&self.query).map_err(|err| Error::bind(format!("query: {err}")))
    }

    /// Deserializes the JSON request body into `T`.
    #[cfg(feature = "beautify-errors")]
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let de = &mut serde_json::Deserializer::from_slice(&self.body);
        serde_path_to_error::deserialize(de).map_err(|err| Error::bind(format!("json: {err}")))
    }

    #[cfg(not(feature = "beautify-errors"))]
    pub fn json_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|err| Error::bind(format!("json: {err}")))
    }

    /// Binds `T` from every source the `BindAll` contract names — body
    /// (`json` or `form`, by `Content-Type`), `header`, `query`, and `path`
    /// — merged into one object with later sources overlaying earlier ones:
    /// body, then headers, then query-string pairs, then path parameters
    /// last (highest precedence; a route like `/users/:id?id=ignored` binds
    /// `id` from the path). A type without per-field source tags to guide
    /// it this way is free to just name the fields it wants and let
    /// whichever source actually carries them win by this precedence.
    /// Missing or empty bodies are treated as `{}`. After binding, `T`'s
    /// [`Validate::validate`] runs; a non-empty result becomes an
    /// [`Error::validation`] with a per-field map, satisfying `BindAll`'s
    /// four failure modes (malformed-body, missing-required-field,
    /// type-conversion, validation-failed) with one bind call.
    pub fn bind_all<T: DeserializeOwned + Validate>(&self) -> Result<T, Error> {
        let mut merged = self.body_as_map()?;

        for (name, value) in self.headers.iter() {
            if let Ok(value) = value.to_str() {
                merged.insert(name.as_str().to_owned(), serde_json::Value::String(value.to_owned()));
            }
        }

        if !self.query.is_empty() {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&self.query)
                .map_err(|err| Error::bind(format!("query: {err}")))?;
            for (key, value) in pairs {
                merged.insert(key, serde_json::Value::String(value));
            }
        }

        for (key, value) in self.path_params.iter() {
            merged.insert(key.to_owned(), serde_json::Value::String(value.to_owned()));
        }

        let value = serde_json::Value::Object(merged);

        let bound: T = {
            #[cfg(feature = "beautify-errors")]
            {
                serde_path_to_error::deserialize(value).map_err(|err| Error::bind(err.to_string()))?
            }
            #[cfg(not(feature = "beautify-errors"))]
            {
                serde_json::from_value(value).map_err(|err| Error::bind(err.to_string()))?
            }
        };

        bound.validate().map_err(Error::validation)?;
        Ok(bound)
    }

    /// The request body as a JSON object, the `BindAll` base layer.
    /// `application/x-www-form-urlencoded` bodies are decoded as form pairs
    /// first and folded into the same object shape; anything else is
    /// parsed as JSON. An empty body binds as `{}`.
    fn body_as_map(&self) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
        if self.body.is_empty() {
            return Ok(serde_json::Map::new());
        }

        let is_form = self
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&self.body)
                .map_err(|err| Error::bind(format!("form: {err}")))?;
            let mut map = serde_json::Map::new();
            for (key, value) in pairs {
                map.insert(key, serde_json::Value::String(value));
            }
            Ok(map)
        } else {
            match serde_json::from_slice::<serde_json::Value>(&self.body) {
                Ok(serde_json::Value::Object(map)) => Ok(map),
                Ok(serde_json::Value::Null) => Ok(serde_json::Map::new()),
                Ok(_) => Err(Error::bind("json: body must be an object")),
                Err(err) => Err(Error::bind(format!("json: {err}"))),
            }
        }
    }
}
