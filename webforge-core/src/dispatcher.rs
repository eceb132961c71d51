//! The runtime dispatcher (C10): the single per-request entry point that
//! ties the pattern matcher, context construction, the compiled
//! middleware/handler chain, and response emission together.
//!
//! A host's transport layer (the actual socket accept loop) is out of
//! scope for this crate; it calls [`Dispatcher::dispatch`] once per request
//! and writes the returned [`Response`] back to the client.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tracing::Instrument;
use webforge_router::{Matched, PathParams, Router};

use crate::context::Context;
use crate::error::{Error, ErrorKind, ResponseError};
use crate::handler::CanonicalHandler;
use crate::registry::InFlightTracker;
use crate::response::{Body, Response, ResponseBuilder};

/// Wraps the [`Router`] produced by [`crate::resolver::resolve`] and drives
/// one request through the six-step flow: pattern match, context
/// construction, chain invocation, response emission, error mapping, and
/// cancellation cleanup.
pub struct Dispatcher {
    router: Router<CanonicalHandler>,
    in_flight: InFlightTracker,
}

impl Dispatcher {
    pub fn new(router: Router<CanonicalHandler>) -> Self {
        Dispatcher {
            router,
            in_flight: InFlightTracker::new(),
        }
    }

    /// Registers every dispatched request against `tracker` so
    /// [`crate::registry::RegistrationContext::shutdown_all_services`] can
    /// wait for (or force-cancel) them. Typically `registry.in_flight()` of
    /// the same [`crate::registry::RegistrationContext`] the router was
    /// resolved against.
    pub fn with_in_flight_tracking(mut self, tracker: InFlightTracker) -> Self {
        self.in_flight = tracker;
        self
    }

    /// Runs one request to completion. Never panics on a well-formed
    /// compiled handler: a handler error that didn't already set a
    /// terminal status is mapped onto its [`ResponseError::error_response`],
    /// and `HEAD` requests that fell back to a `GET` route have their body
    /// discarded while keeping status and headers.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: impl Into<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let _in_flight = self.in_flight.acquire();

        let span = tracing::debug_span!(
            "dispatch",
            %method,
            %path,
            route = tracing::field::Empty,
            status = tracing::field::Empty,
        );
        let matched = self.router.recognize(&method, path);
        if let Matched::Found { pattern, .. } | Matched::HeadFallsBackToGet { pattern, .. } = &matched
        {
            span.record("route", *pattern);
        }

        let response = async {
            match matched {
                Matched::Found { value, params, .. } => {
                    self.run(value, method, path, params, query, headers, body, false)
                        .await
                }
                Matched::HeadFallsBackToGet { value, params, .. } => {
                    self.run(value, Method::GET, path, params, query, headers, body, true)
                        .await
                }
                Matched::AutoOptions { allow } => Self::options_response(allow),
                Matched::MethodNotAllowed { allow } => {
                    Error::method_not_allowed(allow).error_response().into_response()
                }
                Matched::NotFound => Error::not_found(format!("no route for {path}"))
                    .error_response()
                    .into_response(),
            }
        }
        .instrument(span.clone())
        .await;

        span.record("status", response.status.as_u16());
        response
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        handler: &CanonicalHandler,
        method: Method,
        path: &str,
        params: PathParams,
        query: impl Into<String>,
        headers: HeaderMap,
        body: Bytes,
        discard_body: bool,
    ) -> Response {
        let cancellation = self.in_flight.shutdown_signal();
        let ctx = Context::new(
            method,
            path,
            params,
            query,
            headers,
            body,
            cancellation.clone(),
        );

        let (ctx, result) = handler(ctx).await;
        let (mut builder, cancellation) = ctx.into_response_parts();

        if let Err(err) = result {
            if *err.kind() != ErrorKind::Cancelled && builder.status_code().as_u16() < 400 {
                builder = err.error_response();
            }
        }

        // Whether or not the handler observed it, the request is over; the
        // client's interest in this cancellation token ends here.
        cancellation.cancel();

        let mut response = builder.into_response();
        if discard_body {
            response.body = Body::Empty;
        }
        response
    }

    fn options_response(allow: Vec<String>) -> Response {
        let mut builder = ResponseBuilder::new();
        builder.status(StatusCode::NO_CONTENT);
        builder.header(http::header::ALLOW, allow.join(", "));
        builder.into_response()
    }
}
