//! End-to-end scenarios driven through a resolved route tree: pattern
//! matching, middleware composition, and the return-value-vs-context
//! precedence rule, all exercised via [`webforge_core::test::TestRequest`]
//! against a real [`Dispatcher`].

use std::cell::RefCell;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use http::{Method, StatusCode};
use serde_json::json;

use webforge_core::dispatcher::Dispatcher;
use webforge_core::error::Error;
use webforge_core::handler;
use webforge_core::middleware::{Middleware, Next};
use webforge_core::registry::{PermissionGrant, RegistrationContext};
use webforge_core::resolver;
use webforge_core::response::ResponseBuilder;
use webforge_core::test::{read_body_json, TestRequest};
use webforge_core::tree::{HandlerRef, Tree};
use webforge_core::Context;

fn dispatcher_for(tree: Tree) -> Dispatcher {
    let registry = RegistrationContext::new(PermissionGrant::root());
    let router = resolver::resolve(tree, &registry).unwrap();
    Dispatcher::new(router)
}

#[tokio::test]
async fn get_user_by_id_binds_the_path_parameter() {
    let mut tree = Tree::new();
    tree.get(
        "/users/:id",
        HandlerRef::Inline(handler::value(|ctx: Context| async move {
            let id = ctx.path_params().get("id").unwrap_or("").to_owned();
            (ctx, Ok::<_, Error>(json!({ "id": id })))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::get("/users/42").send(&dispatcher).await;
    assert_eq!(response.status, StatusCode::OK);
    let body: serde_json::Value = read_body_json(response);
    assert_eq!(body["id"], "42");
}

#[tokio::test]
async fn unregistered_method_is_405_with_allow_header() {
    let mut tree = Tree::new();
    tree.get(
        "/users/:id",
        HandlerRef::Inline(handler::value(|ctx: Context| async move {
            (ctx, Ok::<_, Error>(json!({})))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::post("/users/42").send(&dispatcher).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers.get(http::header::ALLOW).unwrap(),
        "GET, HEAD, OPTIONS"
    );
}

#[tokio::test]
async fn head_of_get_keeps_status_but_drops_body() {
    let mut tree = Tree::new();
    tree.get(
        "/report",
        HandlerRef::Inline(handler::response(|ctx: Context| async move {
            let mut builder = ResponseBuilder::new();
            builder.status(StatusCode::CREATED);
            builder.json(json!({ "big": "payload" }));
            (ctx, Ok::<_, Error>(builder))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::get("/report")
        .method(Method::HEAD)
        .send(&dispatcher)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let (_, _, _, bytes) = response.write_body().unwrap();
    assert!(bytes.is_empty());
}

struct RecordingMiddleware {
    name: &'static str,
    log: Rc<RefCell<Vec<&'static str>>>,
    stop: bool,
}

impl Middleware for RecordingMiddleware {
    fn call(&self, ctx: Context, next: Next<'_>) -> LocalBoxFuture<'static, (Context, Result<(), Error>)> {
        self.log.borrow_mut().push(self.name);
        if self.stop {
            let mut ctx = ctx;
            ctx.response_mut().status(StatusCode::FORBIDDEN);
            return Box::pin(async move { (ctx, Err(Error::not_allowed("blocked"))) });
        }
        next.call(ctx)
    }
}

#[tokio::test]
async fn a_four_middleware_chain_short_circuits_at_the_blocking_stage() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut tree = Tree::new();
    tree.use_mw(
        Rc::new(RecordingMiddleware {
            name: "outer",
            log: Rc::clone(&log),
            stop: false,
        }),
        10,
    );
    tree.use_mw(
        Rc::new(RecordingMiddleware {
            name: "auth",
            log: Rc::clone(&log),
            stop: true,
        }),
        20,
    );
    tree.use_mw(
        Rc::new(RecordingMiddleware {
            name: "logging",
            log: Rc::clone(&log),
            stop: false,
        }),
        30,
    );
    tree.use_mw(
        Rc::new(RecordingMiddleware {
            name: "inner",
            log: Rc::clone(&log),
            stop: false,
        }),
        40,
    );
    tree.get(
        "/secret",
        HandlerRef::Inline(handler::value(|ctx: Context| async move {
            (ctx, Ok::<_, Error>(json!({ "leaked": true })))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::get("/secret").send(&dispatcher).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(*log.borrow(), vec!["outer", "auth"]);
}

#[tokio::test]
async fn explicit_response_return_overrides_context_mutation() {
    let mut tree = Tree::new();
    tree.get(
        "/override",
        HandlerRef::Inline(handler::response(|mut ctx: Context| async move {
            ctx.response_mut().status(StatusCode::ACCEPTED);
            let mut overriding = ResponseBuilder::new();
            overriding.status(StatusCode::CREATED);
            overriding.json(json!({ "final": true }));
            (ctx, Ok::<_, Error>(overriding))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::get("/override").send(&dispatcher).await;
    assert_eq!(response.status, StatusCode::CREATED);
    let body: serde_json::Value = read_body_json(response);
    assert_eq!(body["final"], true);
}

#[tokio::test]
async fn an_error_return_discards_a_non_terminal_200_already_written_to_the_context() {
    let mut tree = Tree::new();
    tree.get(
        "/flaky",
        HandlerRef::Inline(handler::plain(|mut ctx: Context| async move {
            ctx.response_mut().status(StatusCode::OK);
            ctx.response_mut().json(json!({ "partial": "result" }));
            (ctx, Err(Error::internal("write succeeded but commit failed")))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::get("/flaky").send(&dispatcher).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = read_body_json(response);
    assert!(body.get("partial").is_none());
}

#[tokio::test]
async fn plain_returned_data_populates_default_200_json() {
    let mut tree = Tree::new();
    tree.get(
        "/items",
        HandlerRef::Inline(handler::value(|ctx: Context| async move {
            (ctx, Ok::<_, Error>(vec!["a", "b", "c"]))
        })),
    );
    let dispatcher = dispatcher_for(tree);

    let response = TestRequest::get("/items").send(&dispatcher).await;
    assert_eq!(response.status, StatusCode::OK);
    let body: Vec<String> = read_body_json(response);
    assert_eq!(body, vec!["a", "b", "c"]);
}
