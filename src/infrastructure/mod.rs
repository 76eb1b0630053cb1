//! Infrastructure: configuration, logging, and the HTTP surface.

pub mod config;
pub mod http;
pub mod logging;
