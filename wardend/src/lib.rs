//! Warden Daemon Library
//!
//! Runtime for the managed-position lifecycle engine.
//!
//! # Architecture
//!
//! ```text
//! HTTP Gateway ──► Planner ──► Broker + Store
//!       │                          ▲
//!       └──► Supervisor ───────────┘
//!             (timer-driven reconciliation over the working set)
//!
//! Recovery runs once at start and seeds the Supervisor from the Store.
//! ```
//!
//! # Components
//!
//! - **Planner**: validates requests, sizes positions, persists the record,
//!   submits the entry order
//! - **Supervisor**: polls broker order state on a timer and drives every
//!   status transition
//! - **Recovery**: rehydrates non-terminal records on startup
//! - **Gateway**: HTTP intake (open, get, list, close)

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod planner;
pub mod recovery;
pub mod supervisor;

pub use config::{ApiConfig, Config, Environment, StoreConfig, SupervisorConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use planner::Planner;
pub use supervisor::Supervisor;
