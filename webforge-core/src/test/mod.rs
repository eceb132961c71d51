//! Test-only harness: a [`TestRequest`] builder plus the glue to drive a
//! resolved route tree directly through a [`crate::dispatcher::Dispatcher`],
//! without a socket.

mod test_request;

pub use test_request::{read_body_json, TestRequest};
