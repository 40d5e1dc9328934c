//! # avr-stream
//!
//! The receiver's telnet interface pushes one CR-terminated line per state change (`PWON`,
//! `MV455`, `Z2MUON`). This crate reads that stream and turns it into typed event records:
//!
//! - [`LineParser`] splits the byte stream into lines, bounded in length
//! - [`EventDispatcher`] classifies lines by tag prefix and routes them to listeners per zone
//! - [`ConnectionSupervisor`] owns the single TCP connection, detects stale links and reconnects
//!   with capped exponential backoff
//!
//! The crate knows nothing about attribute values; listeners decide what a record means.

mod error;
mod types;

pub mod config;
pub mod connector;
pub mod dispatcher;
pub mod line_parser;
pub mod supervisor;

pub use config::StreamConfig;
pub use connector::{BoxedStream, Connector, TcpConnector};
pub use dispatcher::{classify, EventDispatcher, EventListener};
pub use error::*;
pub use line_parser::LineParser;
pub use supervisor::ConnectionSupervisor;
pub use types::*;
