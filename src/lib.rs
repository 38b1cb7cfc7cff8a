//! Pooled, observed HTTP client.
//!
//! A connection pool with bounded per-destination capacity and a FIFO
//! waiter queue, an observation context carried through each asynchronous
//! call, request tag extraction, and pool gauges exported on scrape.

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod observation;
pub mod pool;

pub use client::{ClientError, ClientRequest, ClientResponse, ObservedClient};
pub use config::ClientConfig;
pub use lifecycle::{Components, Shutdown};
pub use pool::{ConnectionPool, Destination, PoolError};
