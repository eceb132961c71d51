//! Multi-source static file resolution.
//!
//! A [`Mount`] serves an ordered list of read-only filesystem roots under a
//! URL prefix: the first root with an entry at the resolved path wins, a
//! directory hit retries as `index.html`, and single-page-application mode
//! falls back to the root `index.html` for unmatched HTML-ish paths. This
//! crate only resolves a request path to an open, seekable [`ResolvedFile`];
//! it knows nothing about HTTP responses, range requests, or conditional
//! GETs — those are the caller's responsibility.

#![deny(rust_2018_idioms, nonstandard_style)]

mod error;
mod named;
mod path_buf;
mod resolver;

pub use self::{
    error::{FilesError, IoErrorKind, UriSegmentError},
    named::ResolvedFile,
    resolver::{Mount, Resolved},
};
