//! Relay registry
//!
//! The registry is the single source of truth for active relays. Each record
//! owns the transcoder process that feeds it.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<RelayRegistry>
//!                  ┌────────────────────────────────┐
//!                  │ relays: DashMap<StreamKey,     │
//!                  │   Arc<Mutex<RelayRecord {      │
//!                  │     state, last_error,         │
//!                  │     process: ProcessHandle,    │
//!                  │   }>>                          │
//!                  │ >                              │
//!                  └───────────────┬────────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [Controller]              [Probe]                [Event task]
//!   start / stop / list       observe_publisher      ProcessEvent::Exited
//!                             fail                   └──► remove()
//! ```
//!
//! # Lifecycle
//!
//! `Starting → Running → Stopping → Stopped`, with `Failed` reachable from
//! `Starting` (spawn error), `Running` (abnormal exit or no publisher). A
//! record leaves the map only once its process has been reaped.

pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{FailureNote, RelayInfo, RelayRecord, RelayState};
pub use error::{InvalidStreamKey, RegistryError};
pub use key::StreamKey;
pub use store::RelayRegistry;
