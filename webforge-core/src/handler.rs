//! Handler adaptation: turns any of the accepted handler shapes into a
//! canonical `Fn(Context) -> Future<Output = Context>` the dispatcher can
//! invoke uniformly.
//!
//! Rust has no runtime reflection, so the "reflective fallback" the design
//! describes for dynamically-typed hosts collapses into a closed set of
//! named constructor functions, one per accepted shape, each returning a
//! boxed [`CanonicalHandler`]. Registering a handler outside this set is a
//! compile error at the call site, not a registration-time panic.

use std::future::Future;

use futures_util::future::LocalBoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::{Context, Validate};
use crate::error::Error;
use crate::response::ResponseBuilder;

/// The canonical, post-adaptation handler: takes the context by value and
/// hands it back with the response builder (and possibly an error)
/// populated.
pub type CanonicalHandler =
    Box<dyn Fn(Context) -> LocalBoxFuture<'static, (Context, Result<(), Error>)>>;

/// What an adapted handler returned, before the return-value-vs-context
/// precedence rule (spec §4.5) is applied.
pub enum Outcome<D> {
    /// The handler errored; any response value returned alongside is
    /// discarded.
    Error(Error),
    /// The handler returned a response explicitly; it overrides whatever
    /// was set on the context along the way.
    Response(ResponseBuilder),
    /// The handler returned a plain data value; wrapped as default-200 JSON
    /// unless a response was also returned (handled by the `Response` arm).
    Data(D),
    /// The handler returned nothing. Materializes the default-200-empty
    /// response only if the context's builder is still untouched.
    NoResponse,
}

/// Applies the return-value-vs-context-mutation precedence rule: error >
/// explicit response return > plain data > untouched context.
pub fn apply_outcome<D: Serialize>(ctx: &mut Context, outcome: Outcome<D>) -> Result<(), Error> {
    match outcome {
        Outcome::Error(err) => Err(err),
        Outcome::Response(builder) => {
            *ctx.response_mut() = builder;
            Ok(())
        }
        Outcome::Data(data) => {
            let value = serde_json::to_value(data).map_err(|err| {
                Error::internal(format!("failed to serialize handler result: {err}"))
            })?;
            ctx.response_mut().json(value);
            Ok(())
        }
        Outcome::NoResponse => {
            if !ctx.response().is_populated() {
                ctx.response_mut().status(http::StatusCode::OK);
            }
            Ok(())
        }
    }
}

fn box_future<F>(fut: F) -> LocalBoxFuture<'static, (Context, Result<(), Error>)>
where
    F: Future<Output = (Context, Result<(), Error>)> + 'static,
{
    Box::pin(fut)
}

/// Shape A: `async fn(ctx) -> Result<(), Error>` (or the bare error form).
/// Also covers shape G, whose output set is identical to A-D.
pub fn plain<F, Fut>(f: F) -> CanonicalHandler
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = (Context, Result<(), Error>)> + 'static,
{
    Box::new(move |ctx| box_future(f(ctx)))
}

/// Shape B/C: `async fn(ctx) -> (impl Serialize, Option<Error>)` or
/// `async fn(ctx) -> impl Serialize`, modeled here as returning a
/// `Result<D, Error>` of a serializable value.
pub fn value<F, Fut, D>(f: F) -> CanonicalHandler
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = (Context, Result<D, Error>)> + 'static,
    D: Serialize + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            let (mut ctx, result) = f(ctx).await;
            let outcome = match result {
                Ok(data) => Outcome::Data(data),
                Err(err) => Outcome::Error(err),
            };
            let result = apply_outcome(&mut ctx, outcome);
            (ctx, result)
        })
    })
}

/// Shape D: `async fn(ctx) -> Result<ResponseBuilder, Error>`.
pub fn response<F, Fut>(f: F) -> CanonicalHandler
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = (Context, Result<ResponseBuilder, Error>)> + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            let (mut ctx, result) = f(ctx).await;
            let outcome: Outcome<()> = match result {
                Ok(builder) => Outcome::Response(builder),
                Err(err) => Outcome::Error(err),
            };
            let result = apply_outcome(&mut ctx, outcome);
            (ctx, result)
        })
    })
}

/// Shapes 5/6 in the return-value scenarios: a handler that may return
/// either a response or an error, with no separate data path.
pub fn response_result<F, Fut>(f: F) -> CanonicalHandler
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = (Context, Option<ResponseBuilder>, Option<Error>)> + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            let (mut ctx, response, error) = f(ctx).await;
            let outcome: Outcome<()> = match (error, response) {
                (Some(err), _) => Outcome::Error(err),
                (None, Some(builder)) => Outcome::Response(builder),
                (None, None) => Outcome::NoResponse,
            };
            let result = apply_outcome(&mut ctx, outcome);
            (ctx, result)
        })
    })
}

/// Shape E: struct-by-reference, error-only output. The struct is bound via
/// [`Context::bind_all`] before the handler body runs.
pub fn bound_plain<F, Fut, T>(f: F) -> CanonicalHandler
where
    F: Fn(Context, T) -> Fut + 'static,
    Fut: Future<Output = (Context, Result<(), Error>)> + 'static,
    T: DeserializeOwned + Validate + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            match ctx.bind_all::<T>() {
                Ok(bound) => f(ctx, bound).await,
                Err(err) => (ctx, Err(err)),
            }
        })
    })
}

/// Shape F (data output): struct-by-reference, data/error output.
pub fn bound_data<F, Fut, T, D>(f: F) -> CanonicalHandler
where
    F: Fn(Context, T) -> Fut + 'static,
    Fut: Future<Output = (Context, Result<D, Error>)> + 'static,
    T: DeserializeOwned + Validate + 'static,
    D: Serialize + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            let bound = match ctx.bind_all::<T>() {
                Ok(bound) => bound,
                Err(err) => return (ctx, Err(err)),
            };
            let (mut ctx, result) = f(ctx, bound).await;
            let outcome = match result {
                Ok(data) => Outcome::Data(data),
                Err(err) => Outcome::Error(err),
            };
            let result = apply_outcome(&mut ctx, outcome);
            (ctx, result)
        })
    })
}

/// Shape F/H (response output): struct-by-reference (or ctx+struct),
/// response/error output.
pub fn bound_response<F, Fut, T>(f: F) -> CanonicalHandler
where
    F: Fn(Context, T) -> Fut + 'static,
    Fut: Future<Output = (Context, Result<ResponseBuilder, Error>)> + 'static,
    T: DeserializeOwned + Validate + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            let bound = match ctx.bind_all::<T>() {
                Ok(bound) => bound,
                Err(err) => return (ctx, Err(err)),
            };
            let (mut ctx, result) = f(ctx, bound).await;
            let outcome: Outcome<()> = match result {
                Ok(builder) => Outcome::Response(builder),
                Err(err) => Outcome::Error(err),
            };
            let result = apply_outcome(&mut ctx, outcome);
            (ctx, result)
        })
    })
}

/// Shape F/H: struct-by-reference, `(response, error)` output where either
/// half may be absent.
pub fn bound_response_result<F, Fut, T>(f: F) -> CanonicalHandler
where
    F: Fn(Context, T) -> Fut + 'static,
    Fut: Future<Output = (Context, Option<ResponseBuilder>, Option<Error>)> + 'static,
    T: DeserializeOwned + Validate + 'static,
{
    Box::new(move |ctx| {
        box_future(async move {
            let bound = match ctx.bind_all::<T>() {
                Ok(bound) => bound,
                Err(err) => return (ctx, Err(err)),
            };
            let (mut ctx, response, error) = f(ctx, bound).await;
            let outcome: Outcome<()> = match (error, response) {
                (Some(err), _) => Outcome::Error(err),
                (None, Some(builder)) => Outcome::Response(builder),
                (None, None) => Outcome::NoResponse,
            };
            let result = apply_outcome(&mut ctx, outcome);
            (ctx, result)
        })
    })
}

/// Shape I: low-level `(writer, request)` access with no return value. The
/// handler is responsible for populating the response builder itself
/// (typically via [`ResponseBuilder::writer`]) and must not rely on the
/// return-value precedence rule, since there is no return value.
pub fn raw<F, Fut>(f: F) -> CanonicalHandler
where
    F: Fn(Context) -> Fut + 'static,
    Fut: Future<Output = Context> + 'static,
{
    Box::new(move |ctx| box_future(async move { (f(ctx).await, Ok(())) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;
    use webforge_router::PathParams;

    fn fresh_ctx() -> Context {
        Context::new(
            Method::GET,
            "/",
            PathParams::default(),
            "",
            HeaderMap::new(),
            Bytes::new(),
            CancellationToken::new(),
        )
    }

    #[derive(Serialize)]
    struct Greeting {
        message: String,
    }

    #[tokio::test]
    async fn value_shape_wraps_data_as_default_200_json() {
        let h = value(|ctx: Context| async move {
            (
                ctx,
                Ok(Greeting {
                    message: "hi".into(),
                }),
            )
        });
        let (ctx, result) = h(fresh_ctx()).await;
        result.unwrap();
        assert_eq!(ctx.response().status_code(), StatusCode::OK);
        assert!(matches!(
            ctx.response().body(),
            crate::response::Body::Json(_)
        ));
    }

    #[tokio::test]
    async fn response_shape_overrides_context_mutation() {
        let h = response(|mut ctx: Context| async move {
            ctx.response_mut().status(StatusCode::ACCEPTED);
            let mut overriding = ResponseBuilder::new();
            overriding.status(StatusCode::CREATED);
            (ctx, Ok(overriding))
        });
        let (ctx, result) = h(fresh_ctx()).await;
        result.unwrap();
        assert_eq!(ctx.response().status_code(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn error_takes_precedence_over_any_response() {
        let h = response_result(|ctx: Context| async move {
            let mut builder = ResponseBuilder::new();
            builder.status(StatusCode::OK);
            (ctx, Some(builder), Some(Error::internal("boom")))
        });
        let (_ctx, result) = h(fresh_ctx()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn no_response_fills_default_only_if_untouched() {
        let h = response_result(|ctx: Context| async move { (ctx, None, None) });
        let (ctx, result) = h(fresh_ctx()).await;
        result.unwrap();
        assert_eq!(ctx.response().status_code(), StatusCode::OK);
        assert!(!ctx.response().is_populated());
    }

    #[derive(Deserialize)]
    struct Lookup {
        id: u32,
    }

    impl Validate for Lookup {}

    #[tokio::test]
    async fn bound_data_binds_from_path_params() {
        let ctx = Context::new(
            Method::GET,
            "/users/7",
            PathParams::new(vec![("id".to_owned(), "7".to_owned())]),
            "",
            HeaderMap::new(),
            Bytes::new(),
            CancellationToken::new(),
        );
        let h = bound_data(|ctx: Context, lookup: Lookup| async move {
            (
                ctx,
                Ok::<_, Error>(Greeting {
                    message: format!("user {}", lookup.id),
                }),
            )
        });
        let (ctx, result) = h(ctx).await;
        result.unwrap();
        match ctx.response().body() {
            crate::response::Body::Json(v) => assert_eq!(v["message"], "user 7"),
            _ => panic!("expected json body"),
        }
    }
}
