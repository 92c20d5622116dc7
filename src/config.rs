//! Tunable constants for the ingester.

use std::time::Duration;

/// How long connection establishment may take before the run is aborted.
///
/// An unreachable database should fail fast instead of blocking the whole
/// batch run on TCP timeouts.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of source rows per chunk.
///
/// One chunk is the unit of memory use and of progress reporting; a million
/// rows of trip data is a few hundred MB of strings at peak.
pub const DEFAULT_CHUNK_ROWS: usize = 1_000_000;

/// Rows sampled from the first chunk when inferring column types.
pub const SCHEMA_SAMPLE_ROWS: usize = 1_000;

/// Upper bound on bind parameters in a single INSERT statement.
///
/// Postgres caps a statement at 65535 parameters and SQLite at 32766; rows
/// are sub-batched so `columns * rows` stays under this.
pub const MAX_BIND_PARAMS: usize = 30_000;
