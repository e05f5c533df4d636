// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! The closed set of TACACS+ bodies, and decode-by-type.

use std::fmt;

use crate::accounting::{RTAcctReplyPacket, RTAcctRequestPacket};
use crate::authen::{RTAuthenContinuePacket, RTAuthenReplyPacket, RTAuthenStartPacket};
use crate::author::{RTAuthorReplyPacket, RTAuthorRequestPacket};
use crate::header::RTTACType;
use crate::{RTError, Result};

/// Longest field behind a one-byte length slot.
pub(crate) const FF: usize = 0xff;
/// Longest field behind a two-byte length slot.
pub(crate) const FFFF: usize = 0xffff;

/// Silently cuts a field down to what its length slot can carry.
pub(crate) fn clamp(field: &[u8], max: usize) -> &[u8] {
    field.get(..max).unwrap_or(field)
}

/// Length of an already-clamped one-byte-slot field.
pub(crate) fn len_u8(field: &[u8]) -> u8 {
    u8::try_from(field.len()).unwrap_or(u8::MAX)
}

/// Length of an already-clamped two-byte-slot field.
pub(crate) fn len_u16(field: &[u8]) -> u16 {
    u16::try_from(field.len()).unwrap_or(u16::MAX)
}

pub(crate) fn read_be_u16(body: &[u8], offset: usize) -> Result<u16> {
    match body.get(offset..offset.saturating_add(2)) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(RTError::CorruptPacket),
    }
}

pub(crate) fn read_u8(body: &[u8], offset: usize) -> Result<u8> {
    body.get(offset).copied().ok_or(RTError::CorruptPacket)
}

/// Copies `len` bytes out of `body` at `offset` and returns the next offset.
pub(crate) fn read_field(body: &[u8], offset: usize, len: usize) -> Result<(Vec<u8>, usize)> {
    let next = offset.checked_add(len).ok_or(RTError::CorruptPacket)?;
    let slice = body.get(offset..next).ok_or(RTError::CorruptPacket)?;
    Ok((slice.to_vec(), next))
}

/// Text view of a byte field; an empty field reads as absent.
pub(crate) fn opt_text(field: &[u8]) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(field).into_owned())
    }
}

/// Which end of the conversation a body came from, which decides the
/// variant for a given packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RTPacketDirection {
    FromServer,
    /// `new_session` is true when the session id isn't in the table yet,
    /// so an AUTHEN body is a START rather than a CONTINUE.
    FromClient { new_session: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RTDecodedPacket {
    AuthenStart(RTAuthenStartPacket),
    AuthenContinue(RTAuthenContinuePacket),
    AuthenReply(RTAuthenReplyPacket),
    AuthorRequest(RTAuthorRequestPacket),
    AuthorReply(RTAuthorReplyPacket),
    AcctRequest(RTAcctRequestPacket),
    AcctReply(RTAcctReplyPacket),
}

impl RTDecodedPacket {
    /// Decodes a deobfuscated body according to its header type.
    pub fn from_raw_packet(
        kind: RTTACType,
        direction: RTPacketDirection,
        pck_buf: &[u8],
    ) -> Result<Self> {
        use RTPacketDirection::{FromClient, FromServer};
        Ok(match (kind, direction) {
            (RTTACType::TAC_PLUS_AUTHEN, FromServer) => {
                Self::AuthenReply(RTAuthenReplyPacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_AUTHEN, FromClient { new_session: true }) => {
                Self::AuthenStart(RTAuthenStartPacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_AUTHEN, FromClient { new_session: false }) => {
                Self::AuthenContinue(RTAuthenContinuePacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_AUTHOR, FromServer) => {
                Self::AuthorReply(RTAuthorReplyPacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_AUTHOR, FromClient { .. }) => {
                Self::AuthorRequest(RTAuthorRequestPacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_ACCT, FromServer) => {
                Self::AcctReply(RTAcctReplyPacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_ACCT, FromClient { .. }) => {
                Self::AcctRequest(RTAcctRequestPacket::from_raw_packet(pck_buf)?)
            }
            (RTTACType::TAC_PLUS_START_TLS, _) => {
                return Err(RTError::UnexpectedPacket(
                    "START_TLS negotiation is not supported".to_owned(),
                ));
            }
        })
    }

    pub fn packet_type(&self) -> RTTACType {
        match self {
            Self::AuthenStart(_) | Self::AuthenContinue(_) | Self::AuthenReply(_) => {
                RTTACType::TAC_PLUS_AUTHEN
            }
            Self::AuthorRequest(_) | Self::AuthorReply(_) => RTTACType::TAC_PLUS_AUTHOR,
            Self::AcctRequest(_) | Self::AcctReply(_) => RTTACType::TAC_PLUS_ACCT,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::AuthenStart(p) => p.serialize(),
            Self::AuthenContinue(p) => p.serialize(),
            Self::AuthenReply(p) => p.serialize(),
            Self::AuthorRequest(p) => p.serialize(),
            Self::AuthorReply(p) => p.serialize(),
            Self::AcctRequest(p) => p.serialize(),
            Self::AcctReply(p) => p.serialize(),
        }
    }

    /// Replies that close the exchange. Requests never do.
    pub fn is_end_of_session(&self) -> bool {
        match self {
            Self::AuthenReply(p) => p.is_end_of_session(),
            Self::AuthorReply(_) | Self::AcctReply(_) => true,
            Self::AuthenStart(_)
            | Self::AuthenContinue(_)
            | Self::AuthorRequest(_)
            | Self::AcctRequest(_) => false,
        }
    }

    /// Whether a terminal reply reports success.
    pub fn is_ok(&self) -> bool {
        match self {
            Self::AuthenReply(p) => p.is_ok(),
            Self::AuthorReply(p) => p.is_ok(),
            Self::AcctReply(p) => p.is_ok(),
            _ => false,
        }
    }
}

impl fmt::Display for RTDecodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenStart(p) => fmt::Display::fmt(p, f),
            Self::AuthenContinue(p) => fmt::Display::fmt(p, f),
            Self::AuthenReply(p) => fmt::Display::fmt(p, f),
            Self::AuthorRequest(p) => fmt::Display::fmt(p, f),
            Self::AuthorReply(p) => fmt::Display::fmt(p, f),
            Self::AcctRequest(p) => fmt::Display::fmt(p, f),
            Self::AcctReply(p) => fmt::Display::fmt(p, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authen::RTAuthenReplyStatus;
    use crate::RTArgument;

    #[test]
    fn clamp_cuts_only_long_fields() {
        let long = vec![b'x'; 300];
        assert_eq!(clamp(&long, FF).len(), 255);
        assert_eq!(clamp(b"abc", FF), b"abc");
        assert_eq!(len_u8(clamp(&long, FF)), 255);
    }

    #[test]
    fn read_helpers_reject_short_bodies() {
        assert!(matches!(read_be_u16(&[0x01], 0), Err(RTError::CorruptPacket)));
        assert_eq!(read_be_u16(&[0x01, 0x02], 0).unwrap(), 0x0102);
        assert!(matches!(read_field(b"abc", 2, 5), Err(RTError::CorruptPacket)));
        assert!(matches!(read_field(b"abc", usize::MAX, 2), Err(RTError::CorruptPacket)));
    }

    #[test]
    fn authen_body_decodes_by_direction() {
        let start = RTAuthenStartPacket::ascii_login(
            1,
            crate::RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            "tty0",
            "10.0.0.1",
        );
        let body = start.serialize();
        let decoded = RTDecodedPacket::from_raw_packet(
            RTTACType::TAC_PLUS_AUTHEN,
            RTPacketDirection::FromClient { new_session: true },
            &body,
        )
        .unwrap();
        assert_eq!(decoded, RTDecodedPacket::AuthenStart(start));

        let cont = RTAuthenContinuePacket::new(b"alice".to_vec(), 0);
        let decoded = RTDecodedPacket::from_raw_packet(
            RTTACType::TAC_PLUS_AUTHEN,
            RTPacketDirection::FromClient { new_session: false },
            &cont.serialize(),
        )
        .unwrap();
        assert_eq!(decoded, RTDecodedPacket::AuthenContinue(cont));
    }

    #[test]
    fn end_of_session_follows_variant() {
        let getuser = RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::new(
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETUSER,
            0,
            "Username:",
            "",
        ));
        assert!(!getuser.is_end_of_session());

        let author = RTDecodedPacket::AuthorReply(RTAuthorReplyPacket::new(
            crate::RTAuthorReplyStatus::TAC_PLUS_AUTHOR_STATUS_FAIL,
            vec![RTArgument::mandatory("service", "shell")],
            "",
            "",
        ));
        assert!(author.is_end_of_session());
        assert!(!author.is_ok());
        assert_eq!(author.packet_type(), RTTACType::TAC_PLUS_AUTHOR);
    }

    #[test]
    fn start_tls_is_refused() {
        assert!(matches!(
            RTDecodedPacket::from_raw_packet(
                RTTACType::TAC_PLUS_START_TLS,
                RTPacketDirection::FromServer,
                &[]
            ),
            Err(RTError::UnexpectedPacket(_))
        ));
    }
}
