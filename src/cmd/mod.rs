//! Command-line arguments of the binaries under `src/app/`.

pub mod coordinator;
pub mod ctl;
pub mod sequential;
pub mod worker;

/// Default address the coordinator listens on and clients connect to.
pub const DEFAULT_PORT: u16 = 50051;
