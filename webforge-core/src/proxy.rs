//! The reverse proxy adapter: rewrites a mounted prefix's scheme, host, and
//! `Host` header onto a target URL and forwards the request through a
//! host-supplied transport.
//!
//! The concrete transport (the actual TCP/TLS connection to the upstream)
//! is out of scope for this crate; callers supply a [`ProxyTransport`]
//! implementation and this module's job ends at URL rewriting and the
//! skip-on-error rule.

use bytes::Bytes;
use http::{HeaderMap, Method};
use url::Url;

use crate::error::Error;

/// A rewritten request ready to be forwarded upstream.
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The host-supplied transport that actually performs the forward. The
/// core's responsibility ends at producing a [`ProxyRequest`]; writing it
/// to a real connection (and streaming the response back to the original
/// writer) is a host concern.
#[async_trait::async_trait(?Send)]
pub trait ProxyTransport {
    async fn forward(&self, rewritten: ProxyRequest) -> Result<(), Error>;
}

/// `Mount(prefix, target-url, override-mw?, mw-list)`: everything under
/// `prefix` is forwarded to `target`, with the request's scheme, host, and
/// `Host` header rewritten onto `target`'s.
pub struct ProxyMount {
    prefix: String,
    target: Url,
}

impl ProxyMount {
    pub fn new(prefix: impl Into<String>, target: Url) -> Self {
        ProxyMount {
            prefix: prefix.into(),
            target,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rewrites `request_path`'s remainder (after stripping the mount
    /// prefix) onto the target URL, preserving the original query string.
    pub fn rewrite(
        &self,
        method: Method,
        request_path: &str,
        query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ProxyRequest, Error> {
        let remainder = request_path.strip_prefix(&self.prefix).unwrap_or(request_path);

        let mut url = self.target.clone();
        {
            let mut target_path = url.path().trim_end_matches('/').to_owned();
            target_path.push('/');
            target_path.push_str(remainder.trim_start_matches('/'));
            url.set_path(&target_path);
        }
        if !query.is_empty() {
            url.set_query(Some(query));
        }

        let mut headers = headers.clone();
        let host_value = self
            .target
            .host_str()
            .ok_or_else(|| Error::internal("reverse proxy target has no host"))?;
        let host_header = match self.target.port() {
            Some(port) => format!("{host_value}:{port}"),
            None => host_value.to_owned(),
        };
        headers.insert(
            http::header::HOST,
            http::HeaderValue::from_str(&host_header)
                .map_err(|err| Error::internal(format!("invalid host header: {err}")))?,
        );

        Ok(ProxyRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Forwards through `transport` unless the response builder already
    /// carries a terminal (≥ 400) status set by preceding middleware, per
    /// the skip-on-error rule.
    pub async fn forward_unless_terminal(
        &self,
        transport: &dyn ProxyTransport,
        response: &crate::response::ResponseBuilder,
        method: Method,
        request_path: &str,
        query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<bool, Error> {
        if response.status_code().as_u16() >= 400 {
            return Ok(false);
        }
        let rewritten = self.rewrite(method, request_path, query, headers, body)?;
        transport.forward(rewritten).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_preserves_remainder_and_query() {
        let mount = ProxyMount::new("/api", Url::parse("https://upstream.internal/base").unwrap());
        let rewritten = mount
            .rewrite(
                Method::GET,
                "/api/users/42",
                "page=2",
                &HeaderMap::new(),
                Bytes::new(),
            )
            .unwrap();

        assert_eq!(rewritten.url.as_str(), "https://upstream.internal/base/users/42?page=2");
        assert_eq!(
            rewritten.headers.get(http::header::HOST).unwrap(),
            "upstream.internal"
        );
    }

    #[test]
    fn rewrite_includes_nondefault_port_in_host_header() {
        let mount = ProxyMount::new("/api", Url::parse("http://upstream.internal:8080/").unwrap());
        let rewritten = mount
            .rewrite(Method::GET, "/api/ping", "", &HeaderMap::new(), Bytes::new())
            .unwrap();
        assert_eq!(
            rewritten.headers.get(http::header::HOST).unwrap(),
            "upstream.internal:8080"
        );
    }

    struct RecordingTransport {
        called: std::cell::RefCell<bool>,
    }

    #[async_trait::async_trait(?Send)]
    impl ProxyTransport for RecordingTransport {
        async fn forward(&self, _rewritten: ProxyRequest) -> Result<(), Error> {
            *self.called.borrow_mut() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn forward_is_skipped_when_response_already_terminal() {
        let mount = ProxyMount::new("/api", Url::parse("https://upstream.internal/").unwrap());
        let transport = RecordingTransport {
            called: std::cell::RefCell::new(false),
        };
        let mut response = crate::response::ResponseBuilder::new();
        response.status(http::StatusCode::FORBIDDEN);

        let forwarded = mount
            .forward_unless_terminal(
                &transport,
                &response,
                Method::GET,
                "/api/secret",
                "",
                &HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .unwrap();

        assert!(!forwarded);
        assert!(!*transport.called.borrow());
    }

    #[tokio::test]
    async fn forward_proceeds_when_response_not_terminal() {
        let mount = ProxyMount::new("/api", Url::parse("https://upstream.internal/").unwrap());
        let transport = RecordingTransport {
            called: std::cell::RefCell::new(false),
        };
        let response = crate::response::ResponseBuilder::new();

        let forwarded = mount
            .forward_unless_terminal(
                &transport,
                &response,
                Method::GET,
                "/api/users",
                "",
                &HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .unwrap();

        assert!(forwarded);
        assert!(*transport.called.borrow());
    }
}
