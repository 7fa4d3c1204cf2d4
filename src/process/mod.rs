//! Transcoder process supervision
//!
//! A [`ProcessHandle`] owns exactly one external transcoder process:
//!
//! ```text
//!   spawn() ──► Child ──┬── stdout pump ──┐
//!                       ├── stderr pump ──┼──► ProcessEvent channel ──► owner
//!                       └── supervisor ───┘
//!                              ▲
//!   signal_stop() ── Control ──┘  (SIGINT, then kill after the grace period)
//! ```
//!
//! Output is drained continuously so the child never blocks on a full pipe.

pub mod command;
pub mod error;
pub mod event;
pub mod handle;

pub use command::{TranscoderCommand, TranscoderConfig};
pub use error::SpawnError;
pub use event::{OutputStream, ProcessEvent, ProcessExit};
pub use handle::ProcessHandle;
