//! Path pattern compilation and method+path matching.
//!
//! This crate implements the pattern matcher: it compiles `:name`/`*name`
//! path patterns, matches `(method, path)` pairs against a registered route
//! table, and precomputes the `Allow` header for `405`/`OPTIONS` responses.
//! It knows nothing about handlers, middleware, or bodies — callers supply
//! an opaque value `T` per route and get it back on a match.

#![deny(rust_2018_idioms, nonstandard_style)]

mod path;
mod pattern;
mod router;

pub use self::{
    path::PathParams,
    pattern::{normalize, Pattern, PatternError},
    router::{Matched, RouteMethod, Router, RouterBuilder, RouterError},
};
