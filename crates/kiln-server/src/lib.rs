//! # kiln-server
//!
//! HTTP front-end for the kiln multi-language execution sandbox.
//!
//! ## Quick Start
//!
//! Run the server with default configuration:
//!
//! ```bash
//! cargo run -p kiln-server
//! ```
//!
//! Configure via environment variables (or a `.env` file):
//!
//! ```bash
//! export KILN_HTTP_PORT=8080
//! export KILN_SCRATCH_ROOT=/tmp/kiln
//! export KILN_TIMEOUT_SECS=10
//! export KILN_MAX_CONCURRENT=8
//! cargo run -p kiln-server
//! ```
//!
//! ## Endpoints
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /execute` | Compile and run `{code, language}` |
//! | `GET /languages` | Supported languages and starter templates |
//! | `GET /health` | Health check with execution counters |
//! | `GET /` | Liveness message |

mod config;
pub mod http;
mod log;
mod types;

pub use config::{ConfigError, ServerConfig, MAX_BODY_BYTES};
pub use http::AppState;
pub use log::{dispatch, ExecutionLog, ExecutionRecord, TracingLog};
pub use types::*;
