//! # nki-generator
//!
//! HTTP service that packages uploaded WAV samples together with the NKI
//! template for a chosen root note and returns the result as a zip.
//!
//! ## Quick Start
//!
//! ```ignore
//! use nki_generator::{PackagingServer, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> nki_generator::Result<()> {
//!     let server = PackagingServer::bind(ServiceConfig::default()).await?;
//!     println!("listening on {}", server.local_addr());
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod packager;
pub mod server;
pub mod types;

pub use config::{ServiceConfig, TemplateMap};
pub use error::Error;
pub use packager::Packager;
pub use server::{PackagingServer, router};
pub use types::*;

/// Result type for nki-generator operations.
pub type Result<T> = std::result::Result<T, Error>;
