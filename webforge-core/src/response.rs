//! The response half of the request/response context: a fluent builder plus
//! the body-variant precedence rule applied at emission time.

use std::io;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// Exactly one body variant may be active at a time; the last call to
/// [`ResponseBuilder::json`], [`ResponseBuilder::bytes`], or
/// [`ResponseBuilder::writer`] wins.
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Bytes {
        content_type: mime::Mime,
        data: bytes::Bytes,
    },
    Writer(Box<dyn FnOnce(&mut dyn io::Write) -> io::Result<()>>),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Json(v) => write!(f, "Body::Json({v})"),
            Body::Bytes { content_type, data } => {
                write!(f, "Body::Bytes({content_type}, {} bytes)", data.len())
            }
            Body::Writer(_) => f.write_str("Body::Writer(..)"),
        }
    }
}

/// Fluent response builder: sets status, content-type, multi-valued
/// headers (preserving insertion order per key), and the body.
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    content_type: Option<mime::Mime>,
    body: Body,
    touched: bool,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        ResponseBuilder {
            status: StatusCode::OK,
            headers: Vec::new(),
            content_type: None,
            body: Body::Empty,
            touched: false,
        }
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self.touched = true;
        self
    }

    /// Appends a header value; does not replace a prior value under the
    /// same name, so multi-valued headers (e.g. repeated `Set-Cookie`)
    /// preserve every insertion in order.
    pub fn header(
        &mut self,
        name: impl Into<HeaderName>,
        value: impl TryInto<HeaderValue>,
    ) -> &mut Self {
        if let Ok(value) = value.try_into() {
            self.headers.push((name.into(), value));
        }
        self.touched = true;
        self
    }

    pub fn content_type(&mut self, mime: mime::Mime) -> &mut Self {
        self.content_type = Some(mime);
        self.touched = true;
        self
    }

    pub fn json(&mut self, value: impl Into<serde_json::Value>) -> &mut Self {
        self.body = Body::Json(value.into());
        self.touched = true;
        self
    }

    pub fn bytes(&mut self, content_type: mime::Mime, data: impl Into<bytes::Bytes>) -> &mut Self {
        self.body = Body::Bytes {
            content_type,
            data: data.into(),
        };
        self.touched = true;
        self
    }

    pub fn writer(
        &mut self,
        f: impl FnOnce(&mut dyn io::Write) -> io::Result<()> + 'static,
    ) -> &mut Self {
        self.body = Body::Writer(Box::new(f));
        self.touched = true;
        self
    }

    /// A convenience for the common default-success-JSON case.
    pub fn ok_json(value: impl Into<serde_json::Value>) -> Self {
        let mut builder = ResponseBuilder::new();
        builder.json(value);
        builder
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Whether any setter has been called since construction. Used to
    /// decide whether a `None`-response handler outcome should replace an
    /// untouched builder with the default 200-empty response.
    pub fn is_populated(&self) -> bool {
        self.touched
    }

    /// Finalizes the builder into an emittable [`Response`], applying the
    /// default content-type (`application/json`) when none was set
    /// explicitly and the body is JSON.
    pub fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        let content_type = self.content_type.unwrap_or_else(|| match &self.body {
            Body::Json(_) => mime::APPLICATION_JSON,
            Body::Bytes { content_type, .. } => content_type.clone(),
            Body::Empty | Body::Writer(_) => mime::APPLICATION_OCTET_STREAM,
        });

        Response {
            status: self.status,
            headers,
            content_type,
            body: self.body,
        }
    }
}

/// The finalized form of a [`ResponseBuilder`], ready for the runtime
/// dispatcher to emit. Emission precedence: writer-closure > data-value >
/// empty.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: mime::Mime,
    pub body: Body,
}

impl Response {
    /// Serializes the body to bytes per the emission precedence rule.
    /// Writer closures are invoked against an in-memory buffer; a real
    /// transport would instead hand the closure the live connection writer.
    pub fn write_body(self) -> io::Result<(StatusCode, HeaderMap, mime::Mime, Vec<u8>)> {
        let bytes = match self.body {
            Body::Writer(write) => {
                let mut buf = Vec::new();
                write(&mut buf)?;
                buf
            }
            Body::Json(value) => serde_json::to_vec(&value)?,
            Body::Bytes { data, .. } => data.to_vec(),
            Body::Empty => Vec::new(),
        };

        Ok((self.status, self.headers, self.content_type, bytes))
    }
}
