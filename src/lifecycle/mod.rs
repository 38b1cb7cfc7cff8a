//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Pool → Observation registry → Client → Registrar
//!
//! Background (startup.rs):
//!     Pool sweeper, metrics endpoint, both subscribed to Shutdown
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     Ctrl-C / SIGTERM → Shutdown::trigger → background tasks exit
//! ```
//!
//! # Design Decisions
//! - Explicit composition: components are built once and passed by reference, no global lookup
//! - Fail fast: any startup error is fatal

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{Components, HttpClient, StartupError};
