//! Core of the LinkedIn Marketing API client.
//!
//! # Overview
//! Everything except argument parsing lives here. A command flows through
//! the same pieces every time:
//!
//! - `catalog` finds the `Operation` for a resource and operation name.
//! - `params` encodes parameters into the Rest.li 2.0 query grammar.
//! - `dispatch` plans the `HttpRequest`, picks direct or tunneled transport,
//!   and sends it with retry over a `Transport`.
//! - `format` renders the response as raw, pretty or compact JSON.
//!
//! Asset uploads go through `upload`, which drives the dispatcher through
//! register, chunked upload, finalize and status polling.
//!
//! # Design
//! - Requests and responses are plain data (`http`), so the network sits
//!   behind one trait and tests script it without sockets.
//! - The core never reads the environment; `ClientConfig` is passed in.
//! - Blocking I/O on scoped threads. One `CancelToken` per invocation
//!   reaches every sleep.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod http;
pub mod params;
pub mod transport;
pub mod upload;

pub use cancel::CancelToken;
pub use catalog::{Catalog, Operation, ParamSpec, Resource};
pub use config::{ClientConfig, RetryPolicy, TunnelMode};
pub use dispatch::{ApiResponse, Dispatcher, OperationCall};
pub use error::{Error, Result};
pub use format::OutputMode;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use params::{ParamKind, ParamValue, Urn};
pub use transport::{Transport, UreqTransport};
pub use upload::{MediaKind, UploadOptions, UploadOutcome, UploadRequest, Uploader};
