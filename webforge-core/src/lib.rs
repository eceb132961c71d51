//! webforge-core: routing, handler adaptation, middleware composition, and
//! the service registry underlying a webforge application.
//!
//! A webforge host builds a [`tree::Tree`] of routes, groups, and mounts
//! during startup, registers services, handlers, and middleware factories
//! against a [`registry::RegistrationContext`], then calls
//! [`resolver::resolve`] once to compile both into a
//! [`webforge_router::Router`] ready for a [`dispatcher::Dispatcher`]. From
//! then on, every request is a single [`dispatcher::Dispatcher::dispatch`]
//! call.
//!
//! ```no_run
//! use webforge_core::prelude::*;
//!
//! async fn health(ctx: Context) -> (Context, Result<serde_json::Value, Error>) {
//!     (ctx, Ok(serde_json::json!({ "ok": true })))
//! }
//!
//! # async fn build() -> Result<Dispatcher, Error> {
//! let registry = RegistrationContext::new(PermissionGrant::root());
//! let mut tree = Tree::new();
//! tree.get("/health", HandlerRef::Inline(handler::value(health)));
//! let router = resolver::resolve(tree, &registry)?;
//! Ok(Dispatcher::new(router).with_in_flight_tracking(registry.in_flight()))
//! # }
//! ```

#![deny(rust_2018_idioms, nonstandard_style)]
#![warn(future_incompatible)]

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod response;
#[cfg(any(test, feature = "test-util"))]
pub mod test;
pub mod tree;

pub use context::{Context, Validate};
pub use dispatcher::Dispatcher;
pub use error::{Error, ErrorKind, ResponseError};
pub use registry::{InFlightTracker, PermissionGrant, RegistrationContext};
pub use response::{Response, ResponseBuilder};
pub use tree::{HandlerRef, Tree};

/// Everything a host typically needs for a single `use
/// webforge_core::prelude::*;`.
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::context::{Context, Validate};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{Error, ErrorKind, ResponseError};
    pub use crate::handler;
    pub use crate::middleware::Middleware;
    pub use crate::registry::{PermissionGrant, RegistrationContext, Service};
    pub use crate::resolver;
    pub use crate::response::ResponseBuilder;
    pub use crate::tree::{HandlerRef, Tree};
}
