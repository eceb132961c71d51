//! Builds one request's worth of input for [`Dispatcher::dispatch`] without
//! a socket: method, path, query, headers, and a JSON body, all bound
//! directly into the `(method, path, query, headers, body)` tuple the
//! dispatcher expects.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dispatcher::Dispatcher;
use crate::response::Response;

/// A builder-style test request. `TestRequest::get("/users/:id").send(&dispatcher)`
/// runs the request end-to-end through pattern matching, the compiled
/// middleware/handler chain, and response emission.
pub struct TestRequest {
    method: Method,
    path: String,
    query: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for TestRequest {
    fn default() -> Self {
        TestRequest {
            method: Method::GET,
            path: "/".to_owned(),
            query: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl TestRequest {
    pub fn with_uri(uri: &str) -> Self {
        let mut req = Self::default();
        req.set_uri(uri);
        req
    }

    pub fn get(uri: &str) -> Self {
        Self::with_uri(uri).method(Method::GET)
    }

    pub fn post(uri: &str) -> Self {
        Self::with_uri(uri).method(Method::POST)
    }

    pub fn put(uri: &str) -> Self {
        Self::with_uri(uri).method(Method::PUT)
    }

    pub fn patch(uri: &str) -> Self {
        Self::with_uri(uri).method(Method::PATCH)
    }

    pub fn delete(uri: &str) -> Self {
        Self::with_uri(uri).method(Method::DELETE)
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    fn set_uri(&mut self, uri: &str) {
        match uri.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_owned();
                self.query = query.to_owned();
            }
            None => self.path = uri.to_owned(),
        }
    }

    pub fn insert_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serializes `value` as the JSON request body and sets a matching
    /// `Content-Type` header.
    pub fn set_json(mut self, value: impl Serialize) -> Self {
        self.body = Bytes::from(
            serde_json::to_vec(&value).expect("test request body must serialize to JSON"),
        );
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Runs the request through `dispatcher` end-to-end.
    pub async fn send(self, dispatcher: &Dispatcher) -> Response {
        dispatcher
            .dispatch(self.method, &self.path, self.query, self.headers, self.body)
            .await
    }
}

/// Parses a finalized [`Response`]'s body as JSON. Test-only: panics if the
/// body isn't valid JSON for `T`.
pub fn read_body_json<T: DeserializeOwned>(response: Response) -> T {
    let (_, _, _, bytes) = response.write_body().expect("response body is writable");
    serde_json::from_slice(&bytes).expect("response body is valid json for the expected type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler;
    use crate::registry::{PermissionGrant, RegistrationContext};
    use crate::resolver;
    use crate::tree::{HandlerRef, Tree};
    use crate::{Context, Error};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Echo {
        id: String,
    }

    #[tokio::test]
    async fn drives_a_resolved_tree_end_to_end() {
        let mut tree = Tree::new();
        tree.get(
            "/users/:id",
            HandlerRef::Inline(handler::value(|ctx: Context| async move {
                let id = ctx.path_params().get("id").unwrap_or("").to_owned();
                (ctx, Ok::<_, Error>(json!({ "id": id })))
            })),
        );
        let registry = RegistrationContext::new(PermissionGrant::root());
        let router = resolver::resolve(tree, &registry).unwrap();
        let dispatcher = Dispatcher::new(router);

        let response = TestRequest::get("/users/7").send(&dispatcher).await;
        let echo: Echo = read_body_json(response);
        assert_eq!(
            echo,
            Echo {
                id: "7".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn posts_a_json_body_through_bind_all() {
        #[derive(Deserialize)]
        struct CreateUser {
            name: String,
        }

        let mut tree = Tree::new();
        tree.post(
            "/users",
            HandlerRef::Inline(handler::bound_data(
                |ctx: Context, body: CreateUser| async move {
                    (ctx, Ok::<_, Error>(json!({ "created": body.name })))
                },
            )),
        );
        let registry = RegistrationContext::new(PermissionGrant::root());
        let router = resolver::resolve(tree, &registry).unwrap();
        let dispatcher = Dispatcher::new(router);

        let response = TestRequest::post("/users")
            .set_json(json!({ "name": "ada" }))
            .send(&dispatcher)
            .await;
        let body: serde_json::Value = read_body_json(response);
        assert_eq!(body["created"], "ada");
    }
}
