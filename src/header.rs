// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! The fixed 12-byte TACACS+ frame header.

use std::fmt;

use crate::{RTError, Result};

pub const TACP_HEADER_MAX_LENGTH: usize = 12; // 12 bytes.

/// Bodies bigger than this are refused before anything is allocated.
pub const TACP_BODY_MAX_LENGTH: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTTACVersion {
    // Always prefix with TAC_PLUS_MAJOR_VER := 0xc
    TAC_PLUS_MINOR_VER_DEFAULT = 0xc0,
    TAC_PLUS_MINOR_VER_ONE = 0xc1,
}

impl_from_byte!(
    RTTACVersion,
    TAC_PLUS_MINOR_VER_DEFAULT,
    TAC_PLUS_MINOR_VER_ONE
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTTACType {
    TAC_PLUS_START_TLS = 0x00, // draft-ietf-opsawg-tacacs-04, never answered here
    TAC_PLUS_AUTHEN = 0x01,    //(Authentication)
    TAC_PLUS_AUTHOR = 0x02,    //(Authorization)
    TAC_PLUS_ACCT = 0x03,      //(Accounting)
}

impl_from_byte!(
    RTTACType,
    TAC_PLUS_START_TLS,
    TAC_PLUS_AUTHEN,
    TAC_PLUS_AUTHOR,
    TAC_PLUS_ACCT
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTTACFlag {
    TAC_PLUS_NULL_FLAG = 0x00,           // This is actually a mask flag, define 0.
    TAC_PLUS_UNENCRYPTED_FLAG = 0x01,    // body travels in the clear
    TAC_PLUS_SINGLE_CONNECT_FLAG = 0x04, // https://www.rfc-editor.org/rfc/rfc8907.html#name-single-connection-mode
}

impl_global_consts!(
    RTTACFlag,
    TAC_PLUS_NULL_FLAG,
    TAC_PLUS_UNENCRYPTED_FLAG,
    TAC_PLUS_SINGLE_CONNECT_FLAG
);

/// This represents the TACACS+ Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTHeader {
    pub tacp_hdr_version: RTTACVersion,
    pub tacp_hdr_type: RTTACType,
    pub tacp_hdr_seqno: u8, // 1-255, client odd, server even, session ends if a wrap occurs
    pub tacp_hdr_flags: u8,
    pub tacp_hdr_sesid: u32, // must be CSPRNG
    pub tacp_hdr_length: u32,
}

impl RTHeader {
    /// Header for the first packet of a session; sequence number 1.
    pub fn new(version: RTTACVersion, kind: RTTACType, flags: u8, sesid: u32) -> Self {
        Self {
            tacp_hdr_version: version,
            tacp_hdr_type: kind,
            tacp_hdr_seqno: 1,
            tacp_hdr_flags: flags,
            tacp_hdr_sesid: sesid,
            tacp_hdr_length: 0,
        }
    }

    /// This prepares to stream a header
    pub fn serialize(&self) -> [u8; TACP_HEADER_MAX_LENGTH] {
        let mut result = [0u8; TACP_HEADER_MAX_LENGTH];
        result[0] = self.tacp_hdr_version.code();
        result[1] = self.tacp_hdr_type.code();
        result[2] = self.tacp_hdr_seqno;
        result[3] = self.tacp_hdr_flags;
        result[4..8].copy_from_slice(&self.tacp_hdr_sesid.to_be_bytes());
        result[8..12].copy_from_slice(&self.tacp_hdr_length.to_be_bytes());
        result
    }

    /// The body length carried in a raw header, before anything else is
    /// checked, so the body can be drained off the stream first.
    pub fn raw_body_length(hdr_buf: &[u8; TACP_HEADER_MAX_LENGTH]) -> u32 {
        u32::from_be_bytes([hdr_buf[8], hdr_buf[9], hdr_buf[10], hdr_buf[11]])
    }

    /// Decodes a header pulled off the wire.
    ///
    /// Fails with [`RTError::UnknownEnumerant`] when the version or type
    /// byte has no entry in its code table.
    pub fn parse_init_header(hdr_buf: &[u8; TACP_HEADER_MAX_LENGTH]) -> Result<Self> {
        Ok(Self {
            tacp_hdr_version: RTTACVersion::from_byte(hdr_buf[0])?,
            tacp_hdr_type: RTTACType::from_byte(hdr_buf[1])?,
            tacp_hdr_seqno: hdr_buf[2],
            tacp_hdr_flags: hdr_buf[3],
            tacp_hdr_sesid: u32::from_be_bytes([hdr_buf[4], hdr_buf[5], hdr_buf[6], hdr_buf[7]]),
            tacp_hdr_length: Self::raw_body_length(hdr_buf),
        })
    }

    /// The header that answers this one: same session, type and flags,
    /// sequence number plus one.
    pub fn next(&self, version: RTTACVersion) -> Result<Self> {
        let seq_no = self
            .tacp_hdr_seqno
            .checked_add(1)
            .ok_or(RTError::SequenceExhausted)?;
        Ok(Self {
            tacp_hdr_version: version,
            tacp_hdr_type: self.tacp_hdr_type,
            tacp_hdr_seqno: seq_no,
            tacp_hdr_flags: self.tacp_hdr_flags,
            tacp_hdr_sesid: self.tacp_hdr_sesid,
            tacp_hdr_length: 0,
        })
    }

    pub fn has_flag(&self, flag: RTTACFlag) -> bool {
        self.tacp_hdr_flags & (flag as u8) != 0
    }

    /// Implements infallible cast, commonly needed
    pub fn get_expected_packet_length(&self) -> usize {
        self.tacp_hdr_length.try_into().unwrap_or_default()
    }
}

impl fmt::Display for RTHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[session:{:08x}, seqNum:{}, type:{:?}, flags:{:#04x}]",
            self.tacp_hdr_sesid, self.tacp_hdr_seqno, self.tacp_hdr_type, self.tacp_hdr_flags
        )
    }
}
