//! Blocking, single-threaded sensor runtime.
//!
//! - `listener`: socket construction (`SO_REUSEADDR`, small backlog)
//! - `server`: bounded accept loop
//! - `connection`: one read, vectorize, emit, close
//! - `buffer`: the reusable bounded input buffer

mod buffer;
mod connection;
pub mod limits;
mod listener;
mod server;

pub(crate) use server::{Server, ServerError, SessionStats};

use limits::{BUFFER_CAPACITY, LISTEN_BACKLOG, MAX_CONNECTIONS, PORT};
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr};
use tracing::info;

/// Listen on all interfaces at the fixed port and write records to stdout.
pub fn run() -> Result<SessionStats, ServerError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, PORT));
    let server = Server::bind(addr, io::stdout().lock())?;

    // bypasses the log filter
    let _ = announce(&mut io::stderr());
    info!(
        port = PORT,
        buffer_capacity = BUFFER_CAPACITY,
        max_connections = MAX_CONNECTIONS,
        backlog = LISTEN_BACKLOG,
        "ZK-Sentinel sensor active"
    );
    let (stats, _) = server.run()?;
    Ok(stats)
}

/// Write the startup banner naming the active port.
fn announce<W: Write>(err: &mut W) -> io::Result<()> {
    writeln!(err, "[*] ZK-Sentinel sensor active on port {PORT}...")?;
    err.flush()
}
