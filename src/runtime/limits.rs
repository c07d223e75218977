//! Compile-time limits for the sensor.

/// TCP port the sensor listens on (all interfaces).
pub const PORT: u16 = 8888;

/// Capacity of the input buffer, and the cap on bytes fed to the hash.
pub const BUFFER_CAPACITY: usize = 1024;

/// Most bytes requested from a connection in its single read.
///
/// One slot short of the capacity, matching the historical sensor output.
pub const READ_LIMIT: usize = BUFFER_CAPACITY - 1;

/// Connections serviced before the process exits.
pub const MAX_CONNECTIONS: usize = 1000;

/// Pending-connection backlog passed to `listen`.
pub const LISTEN_BACKLOG: i32 = 3;
