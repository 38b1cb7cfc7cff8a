//! Client call subsystem.
//!
//! # Data Flow
//! ```text
//! caller → orchestrator.rs (ObservedClient::call)
//!     → pool (acquire a lease for the request's destination)
//!     → transport.rs (send over the leased connection's I/O handle)
//!     → pool (release on success, discard on transport failure)
//! ```
//!
//! # Design Decisions
//! - Transport is a trait so the pool and orchestration are independent of HTTP
//! - No retries; failures are returned to the caller

pub mod error;
pub mod orchestrator;
pub mod request;
pub mod transport;

pub use error::{ClientError, TransportError};
pub use orchestrator::ObservedClient;
pub use request::{ClientRequest, ClientResponse};
pub use transport::{HttpConnection, HyperTransport, Transport};
