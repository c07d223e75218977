//! Sequential accept loop.
//!
//! One connection is handled at a time on the calling thread: the next
//! `accept` is only issued after the previous connection has emitted its
//! record (if any) and been closed. There is no read timeout, so a peer that
//! connects and never sends holds up the loop until it disconnects.

use crate::runtime::buffer::InputBuffer;
use crate::runtime::connection::{handle_connection, ConnOutcome};
use crate::runtime::limits::{LISTEN_BACKLOG, MAX_CONNECTIONS};
use crate::runtime::listener::create_listener;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Source of accepted connections.
pub trait Accept {
    type Stream: Read;

    /// Block until the next connection arrives.
    fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self)
    }
}

/// Counters for one server lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Connections accepted (and handled).
    pub accepted: usize,
    /// Records written to the output.
    pub emitted: usize,
    /// Connections closed without a record.
    pub skipped: usize,
    /// `accept` calls that failed. Not counted toward the limit.
    pub accept_failures: usize,
}

/// Sensor server writing records to `W`.
pub struct Server<W: Write> {
    listener: TcpListener,
    out: W,
    buffer: InputBuffer,
    max_connections: usize,
}

impl<W: Write> Server<W> {
    /// Bind the listening socket. Failure here is a startup error.
    pub fn bind(addr: SocketAddr, out: W) -> Result<Self, ServerError> {
        let listener = create_listener(addr, LISTEN_BACKLOG)
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Server {
            listener,
            out,
            buffer: InputBuffer::new(),
            max_connections: MAX_CONNECTIONS,
        })
    }

    /// Override the connection limit.
    #[cfg(test)]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Address the listener is bound to.
    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the connection limit is reached, then close the listener.
    ///
    /// Returns the session counters and the output sink.
    pub fn run(self) -> Result<(SessionStats, W), ServerError> {
        let Server {
            mut listener,
            mut out,
            mut buffer,
            max_connections,
        } = self;

        let stats = serve(&mut listener, &mut out, &mut buffer, max_connections)?;

        drop(listener);
        info!(
            accepted = stats.accepted,
            emitted = stats.emitted,
            skipped = stats.skipped,
            accept_failures = stats.accept_failures,
            "Connection limit reached, listener closed"
        );

        Ok((stats, out))
    }
}

/// Accept and handle connections until `max_connections` have been accepted.
///
/// Failed accepts are logged and retried; they do not count toward the limit.
fn serve<L, W>(
    listener: &mut L,
    out: &mut W,
    buffer: &mut InputBuffer,
    max_connections: usize,
) -> Result<SessionStats, ServerError>
where
    L: Accept,
    W: Write,
{
    let mut stats = SessionStats::default();

    while stats.accepted < max_connections {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                stats.accept_failures += 1;
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        stats.accepted += 1;
        debug!(peer = %peer, connection = stats.accepted, "New connection");

        match handle_connection(stream, buffer, out)? {
            ConnOutcome::Emitted(_) => stats.emitted += 1,
            ConnOutcome::Skipped(_) => stats.skipped += 1,
        }
    }

    Ok(stats)
}

/// Server errors. All of them are fatal to the process.
#[derive(Debug)]
pub enum ServerError {
    /// Creating, binding or listening on the socket failed.
    Bind { addr: SocketAddr, source: io::Error },
    /// Writing or flushing a record failed.
    Emit(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "Bind failed on {addr}: {source}"),
            ServerError::Emit(e) => write!(f, "Failed to emit record: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Emit(e) => Some(e),
        }
    }
}
