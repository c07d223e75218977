//! Per-connection handling.
//!
//! Each connection walks a fixed state machine:
//!
//! ```text
//! Accepted -> Reading -> Vectorizing -> Emitting -> Closed
//!                    \-> Skipped -----------------> Closed
//! ```
//!
//! Exactly one read is issued. Empty and failed reads are routine and end in
//! `Skipped`; the connection is always closed when the handler returns.

use crate::invariant;
use crate::runtime::buffer::InputBuffer;
use crate::runtime::limits::READ_LIMIT;
use crate::runtime::server::ServerError;
use crate::vectorizer::{self, FeatureVector};
use std::io::{self, Read, Write};
use tracing::{debug, trace};

/// Current state of the connection being handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Accepted,
    Reading,
    Vectorizing,
    Emitting,
    Skipped,
    Closed,
}

impl ConnState {
    fn can_advance_to(self, next: ConnState) -> bool {
        use ConnState::*;
        matches!(
            (self, next),
            (Accepted, Reading)
                | (Reading, Vectorizing)
                | (Reading, Skipped)
                | (Vectorizing, Emitting)
                | (Emitting, Closed)
                | (Skipped, Closed)
        )
    }

    /// Move to `next`, terminating the process on an illegal transition.
    pub fn advance(&mut self, next: ConnState) {
        invariant::ensure(self.can_advance_to(next), "illegal connection state transition");
        *self = next;
    }
}

/// Why a connection produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Peer closed before sending anything.
    ClosedByPeer,
    /// The single read failed.
    ReadError(io::ErrorKind),
}

/// Result of handling one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnOutcome {
    /// A record was written and flushed.
    Emitted(FeatureVector),
    /// No record was written.
    Skipped(SkipReason),
}

/// Handle one accepted connection, writing at most one record to `out`.
///
/// `stream` is consumed and dropped (closed) before returning, whatever the
/// outcome. Only a failure to write the record is an error.
pub fn handle_connection<S, W>(
    mut stream: S,
    buffer: &mut InputBuffer,
    out: &mut W,
) -> Result<ConnOutcome, ServerError>
where
    S: Read,
    W: Write,
{
    let mut state = ConnState::Accepted;
    buffer.reset();
    invariant::ensure(buffer.is_empty(), "input buffer not reset before read");

    state.advance(ConnState::Reading);
    let read = buffer.read_once(&mut stream, READ_LIMIT);

    let outcome = match read {
        Ok(0) => {
            state.advance(ConnState::Skipped);
            debug!("Connection closed by peer before sending data");
            ConnOutcome::Skipped(SkipReason::ClosedByPeer)
        }
        Err(e) => {
            state.advance(ConnState::Skipped);
            debug!(error = %e, "Read failed");
            ConnOutcome::Skipped(SkipReason::ReadError(e.kind()))
        }
        Ok(_) => {
            state.advance(ConnState::Vectorizing);
            let vector = vectorizer::vectorize(buffer.filled(), buffer.len());

            state.advance(ConnState::Emitting);
            emit(out, &vector)?;
            trace!(hash = vector.hash(), length = vector.length(), "Emitted record");
            ConnOutcome::Emitted(vector)
        }
    };

    drop(stream);
    state.advance(ConnState::Closed);
    Ok(outcome)
}

/// Write one newline-terminated record and flush it through to the consumer.
pub fn emit<W: Write>(out: &mut W, vector: &FeatureVector) -> Result<(), ServerError> {
    writeln!(out, "{vector}").map_err(ServerError::Emit)?;
    out.flush().map_err(ServerError::Emit)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader whose only read fails.
    struct FailingReader(io::ErrorKind);

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(self.0, "injected"))
        }
    }

    /// Writer that records how many times it was flushed.
    #[derive(Default)]
    struct FlushCounter {
        data: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut state = ConnState::Accepted;
        state.advance(ConnState::Reading);
        state.advance(ConnState::Vectorizing);
        state.advance(ConnState::Emitting);
        state.advance(ConnState::Closed);
        assert_eq!(state, ConnState::Closed);

        let mut state = ConnState::Reading;
        state.advance(ConnState::Skipped);
        state.advance(ConnState::Closed);
        assert_eq!(state, ConnState::Closed);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!ConnState::Accepted.can_advance_to(ConnState::Emitting));
        assert!(!ConnState::Skipped.can_advance_to(ConnState::Emitting));
        assert!(!ConnState::Closed.can_advance_to(ConnState::Reading));
        assert!(!ConnState::Emitting.can_advance_to(ConnState::Reading));
    }

    #[test]
    fn test_illegal_advance_exits() {
        if invariant::testing::in_child() {
            let mut state = ConnState::Closed;
            state.advance(ConnState::Reading);
            return;
        }
        invariant::testing::assert_violates(
            "runtime::connection::tests::test_illegal_advance_exits",
            "illegal connection state transition",
        );
    }

    #[test]
    fn test_emits_record_and_flushes() {
        let mut buffer = InputBuffer::new();
        let mut out = FlushCounter::default();

        let outcome = handle_connection(&b"admin"[..], &mut buffer, &mut out).unwrap();

        assert_eq!(outcome, ConnOutcome::Emitted(vectorizer::vectorize(b"admin", 5)));
        assert_eq!(out.data, b"{\"v\": [210706300046, 5]}\n");
        assert_eq!(out.flushes, 1);
    }

    #[test]
    fn test_empty_read_is_skipped() {
        let mut buffer = InputBuffer::new();
        let mut out = FlushCounter::default();

        let outcome = handle_connection(&b""[..], &mut buffer, &mut out).unwrap();

        assert_eq!(outcome, ConnOutcome::Skipped(SkipReason::ClosedByPeer));
        assert!(out.data.is_empty());
        assert_eq!(out.flushes, 0);
    }

    #[test]
    fn test_read_error_is_skipped() {
        let mut buffer = InputBuffer::new();
        let mut out = Vec::new();

        let reader = FailingReader(io::ErrorKind::ConnectionReset);
        let outcome = handle_connection(reader, &mut buffer, &mut out).unwrap();

        assert_eq!(
            outcome,
            ConnOutcome::Skipped(SkipReason::ReadError(io::ErrorKind::ConnectionReset))
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_read_is_bounded() {
        let payload = vec![b'x'; 3000];
        let mut buffer = InputBuffer::new();
        let mut out = Vec::new();

        let outcome = handle_connection(&payload[..], &mut buffer, &mut out).unwrap();

        let expected = vectorizer::vectorize(&payload[..READ_LIMIT], READ_LIMIT);
        assert_eq!(outcome, ConnOutcome::Emitted(expected));
        assert_eq!(expected.length(), 1023);
    }

    #[test]
    fn test_buffer_reused_between_connections() {
        let mut buffer = InputBuffer::new();
        let mut out = Vec::new();

        handle_connection(&b"first payload"[..], &mut buffer, &mut out).unwrap();
        handle_connection(&b"ab"[..], &mut buffer, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        // second record depends only on its own bytes
        assert_eq!(lines[1], vectorizer::vectorize(b"ab", 2).to_string());
    }

    #[test]
    fn test_emit_failure_is_error() {
        let mut buffer = InputBuffer::new();
        let result = handle_connection(&b"admin"[..], &mut buffer, &mut BrokenPipe);
        assert!(matches!(result, Err(ServerError::Emit(_))));
    }
}
