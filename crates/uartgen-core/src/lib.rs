//! # uartgen Core Library
//!
//! Protocol layer for UART-GEN signal generators.
//!
//! This library provides:
//! - Validated command construction (`FREQ`, `DUTY`, `ON`, `OFF`, `?`, `VER?`)
//! - Tolerant parsing of status, acknowledgement and identity replies
//! - Port probing and discovery with a bounded time budget
//! - Control sessions with a dedicated reader thread
//! - A simulated generator for tests and demo mode
//!
//! ## Example
//!
//! ```rust,ignore
//! use uartgen_core::protocol::{
//!     build_frequency_command, list_ports, candidate_names, DeviceProfile, Discovery,
//!     ProbeConfig, Prober, SerialOpener, Session, SessionConfig,
//! };
//!
//! // Find generators
//! let prober = Prober::serial(ProbeConfig::default(), &DeviceProfile::default());
//! let report = Discovery::new(prober).discover(&candidate_names(&list_ports()));
//!
//! // Drive the first one
//! let port = &report.found[0];
//! let mut session = Session::open(&SerialOpener, port, &SessionConfig::default())?;
//! session.send(&build_frequency_command(5000)?)?;
//! for reply in session.collect_replies(std::time::Duration::from_millis(500))? {
//!     println!("{:?}", reply);
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        Command, DeviceProfile, Discovery, ProbeConfig, Prober, ProtocolError, Reply, Session,
        SessionConfig, Settings, StatusReply,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
