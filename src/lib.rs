//! chatrelay - streams LLM chat replies from hosted providers to a browser
//!
//! This library provides the request adapter, the two relay strategies
//! (buffered completion and incremental chat streaming), chat sessions,
//! configuration, and the HTTP server that ties them together.

pub mod adapter;
pub mod config;
pub mod error;
pub mod proxy;
pub mod relay;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
