//! HTTP surface of the plugin host
//!
//! Routes only trigger lifecycle gateway operations; all engineering
//! lives in [`crate::plugin`].

pub mod http;

pub use http::{HttpServer, external_router, internal_router, serve};
