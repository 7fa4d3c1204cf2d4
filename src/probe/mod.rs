//! Reconciliation against the streaming server
//!
//! A spawned transcoder can be alive while failing to publish (bad source
//! credentials are accepted at spawn time and rejected at connect time). The
//! probe periodically compares the registry with the streaming server's
//! live-publisher listing:
//!
//! - running relays missing from the listing for longer than the grace window
//!   are failed and stopped
//! - live publishers the registry does not own are reported as orphaned, never
//!   adopted
//!
//! A failed query is not fatal; the status becomes `Unavailable` and readers
//! fall back to registry-only data until the next successful cycle.

pub mod config;
pub mod error;
pub mod reconcile;
pub mod source;

pub use config::ProbeConfig;
pub use error::ProbeError;
pub use reconcile::{DriftReport, ProbeStatus, ReconciliationProbe};
pub use source::{HttpPublisherSource, MemoryPublisherSource, PublisherListing, PublisherSource};
