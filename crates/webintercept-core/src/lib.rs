//! # webintercept core
//!
//! Shared foundation for the webintercept security testing workbench: the
//! data model for captured traffic and engine state, the error taxonomy, the
//! persistence seam, the event bus the engines publish progress on, the local
//! certificate authority used for TLS interception, and the HTTP/1.1 wire
//! codec the proxy speaks.
//!
//! The engine crates (`webintercept-proxy`, `-intruder`, `-spider`,
//! `-scanner`, `-sequencer`) build on this crate; the operator surface
//! (`webintercept-api`) only ever sees engine handles, the repository trait,
//! and the event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod repository;
pub mod tls;
pub mod wire;

pub use config::{ApiConfig, AppConfig, HttpLimits, ProxyConfig};
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use repository::{MemoryRepository, Repository};
