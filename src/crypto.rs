// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! The RFC 8907 pseudo-pad: an MD5 hash chain XORed over the body.
//!
//! This is obfuscation, not encryption. There's no integrity check, so a
//! wrong key only shows up later as a body whose lengths don't add up.

use std::fmt;

use zeroize::Zeroizing;

use crate::header::{RTHeader, RTTACFlag};

/// A TACACS+ shared secret. Wiped on drop, never printed.
#[derive(Clone)]
pub struct RTKey(Zeroizing<Vec<u8>>);

impl RTKey {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for RTKey {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for RTKey {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl fmt::Debug for RTKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RTKey(MASKED)")
    }
}

impl RTHeader {
    /// Builds the pseudo-pad for this header's body length.
    ///
    /// The first block is MD5 over {session_id, key, version, seq_no}; each
    /// following block appends the previous digest to that same input.
    pub fn compute_md5_pad(&self, key: &RTKey) -> Vec<u8> {
        let payload_length = self.get_expected_packet_length();
        let mut md5pad: Vec<u8> = Vec::with_capacity(payload_length.saturating_add(16));
        let mut md5last: Option<[u8; 16]> = None;

        while md5pad.len() < payload_length {
            let mut md5ctx = md5::Context::new();
            md5ctx.consume(self.tacp_hdr_sesid.to_be_bytes());
            md5ctx.consume(key.expose());
            md5ctx.consume([self.tacp_hdr_version.code()]);
            md5ctx.consume([self.tacp_hdr_seqno]);
            if let Some(prev) = md5last {
                md5ctx.consume(prev);
            }
            let block = md5ctx.compute().0;
            md5pad.extend_from_slice(&block);
            md5last = Some(block);
        }

        md5pad.truncate(payload_length);
        md5pad
    }

    /// Obfuscates or deobfuscates `body`; the same call does both.
    ///
    /// With the UNENCRYPTED flag set the body comes back untouched.
    pub fn toggle_cipher(&self, key: &RTKey, body: &[u8]) -> Vec<u8> {
        if self.has_flag(RTTACFlag::TAC_PLUS_UNENCRYPTED_FLAG) || body.is_empty() {
            return body.to_vec();
        }
        let pad = self.compute_md5_pad(key);
        md5_xor(body, &pad)
    }
}

/// Uses a TACACS+ MD5 pad to obfuscate or deobfuscate a message
///
/// ⚡ This won't work if you call it without a proper pad.
///
pub fn md5_xor(msg: &[u8], pad: &[u8]) -> Vec<u8> {
    msg.iter().zip(pad.iter().cycle()).map(|(m, p)| m ^ p).collect()
}
