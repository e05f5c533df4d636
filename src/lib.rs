// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! TACACS+ client (and a "not implemented" server stub) that multiplexes
//! sessions over one obfuscated stream connection.
//!
//! The layering, leaf to root:
//!  - [`header`] and [`crypto`]: the 12-byte frame header and the MD5 pad
//!  - [`packet`]: the seven body codecs, plus [`RTArgument`] for AUTHOR/ACCT
//!  - [`session`]: sequence ladder, single-connect agreement, role strategies
//!  - [`connection`]: socket ownership, write exclusion, the read/dispatch loop
//!  - [`client`]: `authenticate_*`, `authorize`, `account`

/// This macro generates a fn, from_byte for
///  - a given u8-enum type, and
///  - list of applicable variants.
///
/// Unknown bytes map to [`RTError::UnknownEnumerant`], never a default.
macro_rules! impl_from_byte {
    ($enum_name:ident $(,$variant:ident)+) => {
        impl $enum_name {
            pub fn from_byte(value: u8) -> ::core::result::Result<Self, $crate::RTError> {
                match value {
                    $(
                        x if x == $enum_name::$variant as u8 => Ok($enum_name::$variant),
                    )+
                    _ => Err($crate::RTError::UnknownEnumerant {
                        field: stringify!($enum_name),
                        code: value,
                    }),
                }
            }

            pub const fn code(self) -> u8 {
                self as u8
            }
        }
    };
}

/// This macro generates a set of u8 consts, one per
/// variant of a given u8-enum type.
macro_rules! impl_global_consts {
    ($enum_name:ident $(,$variant:ident)+) => {
        $(
            pub const $variant: u8 = ($enum_name::$variant as u8);
        )+
    };
}

mod error;

pub mod accounting;
pub mod argument;
pub mod authen;
pub mod author;
pub mod client;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod header;
pub mod packet;
pub mod prompt;
pub mod session;

pub use accounting::{RTAcctFlag, RTAcctReplyPacket, RTAcctReplyStatus, RTAcctRequestPacket};
pub use argument::RTArgument;
pub use authen::{
    RTAuthenContinuePacket, RTAuthenPacketAction, RTAuthenPacketMethod, RTAuthenPacketService,
    RTAuthenPacketType, RTAuthenReplyPacket, RTAuthenReplyStatus, RTAuthenStartPacket,
    RTPrivLevel,
};
pub use author::{RTAuthorReplyPacket, RTAuthorReplyStatus, RTAuthorRequestPacket};
pub use client::{RTClient, RTClientSession};
pub use config::{RTClientConfig, RTServerEndpoint};
pub use connection::{RTConnection, RTEndpointRole};
pub use crypto::RTKey;
pub use error::{RTError, Result};
pub use header::{RTHeader, RTTACType, RTTACVersion};
pub use packet::RTDecodedPacket;
pub use prompt::{RTPapInterface, RTUserInterface};
pub use session::{RTSession, RTSessionState};

/// Well-known TACACS+ port.
pub const PORT_TACACS: u16 = 49;
