// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

use std::sync::Arc;

use thiserror::Error;

/// Everything that can go wrong on a TACACS+ connection or session.
///
/// This is `Clone` because a single connection failure is handed to
/// every session that was still waiting on that connection.
#[derive(Debug, Clone, Error)]
pub enum RTError {
    /// Declared field lengths don't add up to the body length. After the
    /// MD5 pad is removed a wrong shared secret looks exactly like this.
    #[error("Corrupt packet or bad key")]
    CorruptPacket,

    #[error("Received unknown {field} code: {code:#04x}")]
    UnknownEnumerant { field: &'static str, code: u8 },

    #[error("Timed out waiting for the TACACS+ server to reply")]
    Timeout,

    #[error("TACACS+ connection error: {0}")]
    Connection(Arc<std::io::Error>),

    #[error("TACACS+ protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Session's sequence numbers exhausted; try new session.")]
    SequenceExhausted,

    #[error("TACACS+ connection shut down")]
    Shutdown,

    #[error("Unable to contact any TACACS+ server(s).")]
    NoServerAvailable,

    #[error("Invalid TACACS+ request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected TACACS+ packet: {0}")]
    UnexpectedPacket(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for RTError {
    fn from(e: std::io::Error) -> Self {
        RTError::Connection(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, RTError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_packet_message_is_ambiguous_on_purpose() {
        assert_eq!(RTError::CorruptPacket.to_string(), "Corrupt packet or bad key");
    }

    #[test]
    fn io_errors_become_shareable_connection_errors() {
        let err: RTError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        let copy = err.clone();
        match (err, copy) {
            (RTError::Connection(a), RTError::Connection(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("expected connection errors, got {other:?}"),
        }
    }

    #[test]
    fn unknown_enumerant_names_the_field() {
        let e = RTError::UnknownEnumerant { field: "RTAuthenReplyStatus", code: 0x42 };
        assert_eq!(e.to_string(), "Received unknown RTAuthenReplyStatus code: 0x42");
    }
}
