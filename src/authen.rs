// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! AUTHEN START, CONTINUE and REPLY bodies, and the code tables that
//! AUTHOR and ACCT borrow from them.

use std::fmt;

use crate::packet::{
    FF, FFFF, clamp, len_u8, len_u16, opt_text, read_be_u16, read_field, read_u8,
};
use crate::{RTError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenPacketAction {
    TAC_PLUS_AUTHEN_LOGIN = 0x01,
    TAC_PLUS_AUTHEN_CHPASS = 0x02,
    TAC_PLUS_AUTHEN_SENDAUTH = 0x04,
}
impl_from_byte!(
    RTAuthenPacketAction,
    TAC_PLUS_AUTHEN_LOGIN,
    TAC_PLUS_AUTHEN_CHPASS,
    TAC_PLUS_AUTHEN_SENDAUTH
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenPacketType {
    TAC_PLUS_AUTHEN_TYPE_NOT_SET = 0x00, // AUTHOR/ACCT only
    TAC_PLUS_AUTHEN_TYPE_ASCII = 0x01,
    TAC_PLUS_AUTHEN_TYPE_PAP = 0x02,
    TAC_PLUS_AUTHEN_TYPE_CHAP = 0x03,
    TAC_PLUS_AUTHEN_TYPE_ARAP = 0x04, // deprecated
    TAC_PLUS_AUTHEN_TYPE_MSCHAP = 0x05,
    TAC_PLUS_AUTHEN_TYPE_MSCHAPV2 = 0x06,
}
impl_from_byte!(
    RTAuthenPacketType,
    TAC_PLUS_AUTHEN_TYPE_NOT_SET,
    TAC_PLUS_AUTHEN_TYPE_ASCII,
    TAC_PLUS_AUTHEN_TYPE_PAP,
    TAC_PLUS_AUTHEN_TYPE_CHAP,
    TAC_PLUS_AUTHEN_TYPE_ARAP,
    TAC_PLUS_AUTHEN_TYPE_MSCHAP,
    TAC_PLUS_AUTHEN_TYPE_MSCHAPV2
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenPacketService {
    TAC_PLUS_AUTHEN_SVC_NONE = 0x00,
    TAC_PLUS_AUTHEN_SVC_LOGIN = 0x01,
    TAC_PLUS_AUTHEN_SVC_ENABLE = 0x02,
    TAC_PLUS_AUTHEN_SVC_PPP = 0x03,
    TAC_PLUS_AUTHEN_SVC_ARAP = 0x04,
    TAC_PLUS_AUTHEN_SVC_PT = 0x05,
    TAC_PLUS_AUTHEN_SVC_RCMD = 0x06,
    TAC_PLUS_AUTHEN_SVC_X25 = 0x07,
    TAC_PLUS_AUTHEN_SVC_NASI = 0x08,
    TAC_PLUS_AUTHEN_SVC_FWPROXY = 0x09,
}
impl_from_byte!(
    RTAuthenPacketService,
    TAC_PLUS_AUTHEN_SVC_NONE,
    TAC_PLUS_AUTHEN_SVC_LOGIN,
    TAC_PLUS_AUTHEN_SVC_ENABLE,
    TAC_PLUS_AUTHEN_SVC_PPP,
    TAC_PLUS_AUTHEN_SVC_ARAP,
    TAC_PLUS_AUTHEN_SVC_PT,
    TAC_PLUS_AUTHEN_SVC_RCMD,
    TAC_PLUS_AUTHEN_SVC_X25,
    TAC_PLUS_AUTHEN_SVC_NASI,
    TAC_PLUS_AUTHEN_SVC_FWPROXY
);

/// How the user was authenticated; carried by AUTHOR and ACCT requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenPacketMethod {
    TAC_PLUS_AUTHEN_METH_NOT_SET = 0x00,
    TAC_PLUS_AUTHEN_METH_NONE = 0x01,
    TAC_PLUS_AUTHEN_METH_KRB5 = 0x02,
    TAC_PLUS_AUTHEN_METH_LINE = 0x03,
    TAC_PLUS_AUTHEN_METH_ENABLE = 0x04,
    TAC_PLUS_AUTHEN_METH_LOCAL = 0x05,
    TAC_PLUS_AUTHEN_METH_TACACSPLUS = 0x06,
    TAC_PLUS_AUTHEN_METH_GUEST = 0x08,
    TAC_PLUS_AUTHEN_METH_RADIUS = 0x10,
    TAC_PLUS_AUTHEN_METH_KRB4 = 0x11,
    TAC_PLUS_AUTHEN_METH_RCMD = 0x20,
}
impl_from_byte!(
    RTAuthenPacketMethod,
    TAC_PLUS_AUTHEN_METH_NOT_SET,
    TAC_PLUS_AUTHEN_METH_NONE,
    TAC_PLUS_AUTHEN_METH_KRB5,
    TAC_PLUS_AUTHEN_METH_LINE,
    TAC_PLUS_AUTHEN_METH_ENABLE,
    TAC_PLUS_AUTHEN_METH_LOCAL,
    TAC_PLUS_AUTHEN_METH_TACACSPLUS,
    TAC_PLUS_AUTHEN_METH_GUEST,
    TAC_PLUS_AUTHEN_METH_RADIUS,
    TAC_PLUS_AUTHEN_METH_KRB4,
    TAC_PLUS_AUTHEN_METH_RCMD
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenReplyStatus {
    TAC_PLUS_AUTHEN_STATUS_PASS = 0x01,
    TAC_PLUS_AUTHEN_STATUS_FAIL = 0x02,
    TAC_PLUS_AUTHEN_STATUS_GETDATA = 0x03,
    TAC_PLUS_AUTHEN_STATUS_GETUSER = 0x04,
    TAC_PLUS_AUTHEN_STATUS_GETPASS = 0x05,
    TAC_PLUS_AUTHEN_STATUS_RESTART = 0x06,
    TAC_PLUS_AUTHEN_STATUS_ERROR = 0x07,
    TAC_PLUS_AUTHEN_STATUS_FOLLOW = 0x21,
}
impl_from_byte!(
    RTAuthenReplyStatus,
    TAC_PLUS_AUTHEN_STATUS_PASS,
    TAC_PLUS_AUTHEN_STATUS_FAIL,
    TAC_PLUS_AUTHEN_STATUS_GETDATA,
    TAC_PLUS_AUTHEN_STATUS_GETUSER,
    TAC_PLUS_AUTHEN_STATUS_GETPASS,
    TAC_PLUS_AUTHEN_STATUS_RESTART,
    TAC_PLUS_AUTHEN_STATUS_ERROR,
    TAC_PLUS_AUTHEN_STATUS_FOLLOW
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenReplyFlag {
    TAC_PLUS_REPLY_FLAG_NOECHO = 0x01,
}
impl_global_consts!(RTAuthenReplyFlag, TAC_PLUS_REPLY_FLAG_NOECHO);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthenContinueFlag {
    TAC_PLUS_CONTINUE_FLAG_ABORT = 0x01,
}
impl_global_consts!(RTAuthenContinueFlag, TAC_PLUS_CONTINUE_FLAG_ABORT);

/// Privilege levels are 0-15; these are the named ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RTPrivLevel(pub u8);

impl RTPrivLevel {
    pub const TAC_PLUS_PRIV_LVL_MIN: Self = Self(0x00);
    pub const TAC_PLUS_PRIV_LVL_USER: Self = Self(0x01);
    pub const TAC_PLUS_PRIV_LVL_ROOT: Self = Self(0x0f);
    pub const TAC_PLUS_PRIV_LVL_MAX: Self = Self(0x0f);
}

impl Default for RTPrivLevel {
    fn default() -> Self {
        Self::TAC_PLUS_PRIV_LVL_USER
    }
}

// ---------------------------------------------------------------------------
// START
// ---------------------------------------------------------------------------

pub struct RTAuthenStartPacketIndexes {
    action: usize,
    priv_level: usize,
    authen_type: usize,
    authen_svc: usize,
    user_len: usize,
    port_len: usize,
    rem_addr_len: usize,
    data_len: usize,
}

const RT_AUTHENTICATION_START_PACKET_INDEXES: RTAuthenStartPacketIndexes =
    RTAuthenStartPacketIndexes {
        action: 0,
        priv_level: 1,
        authen_type: 2,
        authen_svc: 3,
        user_len: 4,
        port_len: 5,
        rem_addr_len: 6,
        data_len: 7,
    };

const RT_AUTH_TEXT_START: usize = RT_AUTHENTICATION_START_PACKET_INDEXES.data_len + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAuthenStartPacket {
    pub action: RTAuthenPacketAction,
    pub priv_lvl: u8,
    pub authen_type: RTAuthenPacketType,
    pub authen_service: RTAuthenPacketService,
    pub user: Vec<u8>,
    pub port: Vec<u8>,
    pub rem_addr: Vec<u8>,
    pub data: Vec<u8>,
}

impl fmt::Display for RTAuthenStartPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTAuthenStartPacket[action:{:?} priv_lvl:{} type:{:?} service:{:?} user:{:?} port:{:?} rem_addr:{:?} data:MASKED({} bytes)]",
            self.action,
            self.priv_lvl,
            self.authen_type,
            self.authen_service,
            String::from_utf8_lossy(&self.user),
            String::from_utf8_lossy(&self.port),
            String::from_utf8_lossy(&self.rem_addr),
            self.data.len()
        )
    }
}

impl RTAuthenStartPacket {
    /// A LOGIN start with no fields filled in.
    pub fn login(
        authen_type: RTAuthenPacketType,
        priv_lvl: u8,
        service: RTAuthenPacketService,
        port: &str,
        rem_addr: &str,
    ) -> Self {
        Self {
            action: RTAuthenPacketAction::TAC_PLUS_AUTHEN_LOGIN,
            priv_lvl,
            authen_type,
            authen_service: service,
            user: vec![],
            port: port.as_bytes().to_vec(),
            rem_addr: rem_addr.as_bytes().to_vec(),
            data: vec![],
        }
    }

    /// Interactive login: the server prompts for everything.
    pub fn ascii_login(
        priv_lvl: u8,
        service: RTAuthenPacketService,
        port: &str,
        rem_addr: &str,
    ) -> Self {
        Self::login(
            RTAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_ASCII,
            priv_lvl,
            service,
            port,
            rem_addr,
        )
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.as_bytes().to_vec();
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn user(&self) -> Option<String> {
        opt_text(&self.user)
    }

    /// This processes the decrypted Start packet
    /// and implements the following checks:
    ///
    /// - That the headers are presumably present
    /// - That the headers suggest valid fields
    /// - That the four lengths add up to the body length
    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_AUTHENTICATION_START_PACKET_INDEXES;
        if pck_buf.len() < RT_AUTH_TEXT_START {
            return Err(RTError::CorruptPacket);
        }

        let user_len = usize::from(read_u8(pck_buf, idx.user_len)?);
        let port_len = usize::from(read_u8(pck_buf, idx.port_len)?);
        let rem_addr_len = usize::from(read_u8(pck_buf, idx.rem_addr_len)?);
        let data_len = usize::from(read_u8(pck_buf, idx.data_len)?);

        let purported_size = RT_AUTH_TEXT_START + user_len + port_len + rem_addr_len + data_len;
        if purported_size != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (user, next) = read_field(pck_buf, RT_AUTH_TEXT_START, user_len)?;
        let (port, next) = read_field(pck_buf, next, port_len)?;
        let (rem_addr, next) = read_field(pck_buf, next, rem_addr_len)?;
        let (data, _) = read_field(pck_buf, next, data_len)?;

        Ok(Self {
            action: RTAuthenPacketAction::from_byte(read_u8(pck_buf, idx.action)?)?,
            priv_lvl: read_u8(pck_buf, idx.priv_level)?,
            authen_type: RTAuthenPacketType::from_byte(read_u8(pck_buf, idx.authen_type)?)?,
            authen_service: RTAuthenPacketService::from_byte(read_u8(pck_buf, idx.authen_svc)?)?,
            user,
            port,
            rem_addr,
            data,
        })
    }

    /// This prepares to stream a request
    pub fn serialize(&self) -> Vec<u8> {
        let user = clamp(&self.user, FF);
        let port = clamp(&self.port, FF);
        let rem_addr = clamp(&self.rem_addr, FF);
        let data = clamp(&self.data, FF);

        let mut result = Vec::with_capacity(
            RT_AUTH_TEXT_START + user.len() + port.len() + rem_addr.len() + data.len(),
        );
        result.push(self.action.code());
        result.push(self.priv_lvl);
        result.push(self.authen_type.code());
        result.push(self.authen_service.code());
        result.push(len_u8(user));
        result.push(len_u8(port));
        result.push(len_u8(rem_addr));
        result.push(len_u8(data));
        result.extend_from_slice(user);
        result.extend_from_slice(port);
        result.extend_from_slice(rem_addr);
        result.extend_from_slice(data);
        result
    }
}

// ---------------------------------------------------------------------------
// CONTINUE
// ---------------------------------------------------------------------------

pub struct RTAuthenContPacketIndexes {
    user_msg_len: usize,
    data_len: usize,
    flags: usize,
}

const RT_AUTHENTICATION_CONT_PACKET_INDEXES: RTAuthenContPacketIndexes =
    RTAuthenContPacketIndexes {
        user_msg_len: 0,
        data_len: 2,
        flags: 4,
    };

const RT_CONT_TEXT_START: usize = RT_AUTHENTICATION_CONT_PACKET_INDEXES.flags + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAuthenContinuePacket {
    pub user_msg: Vec<u8>,
    pub data: Vec<u8>,
    pub flags: u8,
}

impl fmt::Display for RTAuthenContinuePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // user_msg is whatever the user typed, passwords included.
        write!(
            f,
            "RTAuthenContinuePacket[flags:{:#04x} user_msg:MASKED({} bytes) data:{} bytes]",
            self.flags,
            self.user_msg.len(),
            self.data.len()
        )
    }
}

impl RTAuthenContinuePacket {
    pub fn new(user_msg: Vec<u8>, flags: u8) -> Self {
        Self {
            user_msg,
            data: vec![],
            flags,
        }
    }

    /// Tells the server the client is giving up on this session.
    pub fn abort(reason: &str) -> Self {
        Self {
            user_msg: vec![],
            data: reason.as_bytes().to_vec(),
            flags: TAC_PLUS_CONTINUE_FLAG_ABORT,
        }
    }

    pub fn is_abort(&self) -> bool {
        self.flags & TAC_PLUS_CONTINUE_FLAG_ABORT != 0
    }

    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_AUTHENTICATION_CONT_PACKET_INDEXES;
        if pck_buf.len() < RT_CONT_TEXT_START {
            return Err(RTError::CorruptPacket);
        }
        let user_msg_len = usize::from(read_be_u16(pck_buf, idx.user_msg_len)?);
        let data_len = usize::from(read_be_u16(pck_buf, idx.data_len)?);

        if RT_CONT_TEXT_START + user_msg_len + data_len != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (user_msg, next) = read_field(pck_buf, RT_CONT_TEXT_START, user_msg_len)?;
        let (data, _) = read_field(pck_buf, next, data_len)?;
        Ok(Self {
            user_msg,
            data,
            flags: read_u8(pck_buf, idx.flags)?,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let user_msg = clamp(&self.user_msg, FFFF);
        let data = clamp(&self.data, FFFF);

        let mut result = Vec::with_capacity(RT_CONT_TEXT_START + user_msg.len() + data.len());
        result.extend(len_u16(user_msg).to_be_bytes());
        result.extend(len_u16(data).to_be_bytes());
        result.push(self.flags);
        result.extend_from_slice(user_msg);
        result.extend_from_slice(data);
        result
    }
}

// ---------------------------------------------------------------------------
// REPLY
// ---------------------------------------------------------------------------

pub struct RTAuthenReplyPacketIndexes {
    status: usize,
    flags: usize,
    server_msg_len: usize,
    data_len: usize,
}

const RT_AUTHENTICATION_REPLY_PACKET_INDEXES: RTAuthenReplyPacketIndexes =
    RTAuthenReplyPacketIndexes {
        status: 0,
        flags: 1,
        server_msg_len: 2,
        data_len: 4,
    };

const RT_REPLY_TEXT_START: usize = RT_AUTHENTICATION_REPLY_PACKET_INDEXES.data_len + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAuthenReplyPacket {
    pub status: RTAuthenReplyStatus,
    pub flags: u8,
    pub server_msg: Vec<u8>,
    pub data: Vec<u8>,
}

impl fmt::Display for RTAuthenReplyPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTAuthenReplyPacket[status:{:?} flags:{:#04x} server_msg:{:?} data:{:?}]",
            self.status,
            self.flags,
            String::from_utf8_lossy(&self.server_msg),
            String::from_utf8_lossy(&self.data)
        )
    }
}

impl RTAuthenReplyPacket {
    pub fn new(status: RTAuthenReplyStatus, flags: u8, server_msg: &str, data: &str) -> Self {
        Self {
            status,
            flags,
            server_msg: server_msg.as_bytes().to_vec(),
            data: data.as_bytes().to_vec(),
        }
    }

    pub fn get_fail_packet(server_msg: &str, data: &str) -> Self {
        Self::new(RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_FAIL, 0, server_msg, data)
    }

    pub fn is_ok(&self) -> bool {
        self.status == RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_PASS
    }

    /// GETUSER, GETPASS and GETDATA keep the session going; anything else
    /// (RESTART and FOLLOW included) closes it.
    pub fn is_end_of_session(&self) -> bool {
        !matches!(
            self.status,
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETDATA
                | RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETUSER
                | RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETPASS
        )
    }

    pub fn has_flag(&self, flag: RTAuthenReplyFlag) -> bool {
        self.flags & (flag as u8) != 0
    }

    /// Message meant for the user; usually absent on success.
    pub fn server_msg(&self) -> Option<String> {
        opt_text(&self.server_msg)
    }

    /// Message meant for the admin console or log.
    pub fn data(&self) -> Option<String> {
        opt_text(&self.data)
    }

    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_AUTHENTICATION_REPLY_PACKET_INDEXES;
        if pck_buf.len() < RT_REPLY_TEXT_START {
            return Err(RTError::CorruptPacket);
        }
        let server_msg_len = usize::from(read_be_u16(pck_buf, idx.server_msg_len)?);
        let data_len = usize::from(read_be_u16(pck_buf, idx.data_len)?);

        if RT_REPLY_TEXT_START + server_msg_len + data_len != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (server_msg, next) = read_field(pck_buf, RT_REPLY_TEXT_START, server_msg_len)?;
        let (data, _) = read_field(pck_buf, next, data_len)?;
        Ok(Self {
            status: RTAuthenReplyStatus::from_byte(read_u8(pck_buf, idx.status)?)?,
            flags: read_u8(pck_buf, idx.flags)?,
            server_msg,
            data,
        })
    }

    /// This prepares to stream a response
    pub fn serialize(&self) -> Vec<u8> {
        let server_msg = clamp(&self.server_msg, FFFF);
        let data = clamp(&self.data, FFFF);

        let mut result = Vec::with_capacity(RT_REPLY_TEXT_START + server_msg.len() + data.len());
        result.push(self.status.code());
        result.push(self.flags);
        result.extend(len_u16(server_msg).to_be_bytes());
        result.extend(len_u16(data).to_be_bytes());
        result.extend_from_slice(server_msg);
        result.extend_from_slice(data);
        result
    }
}

/// Canned server replies for driving a client under test.
#[cfg(test)]
impl RTAuthenReplyPacket {
    pub(crate) fn get_getpass_packet() -> Self {
        Self::new(
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETPASS,
            TAC_PLUS_REPLY_FLAG_NOECHO,
            "Password:",
            "",
        )
    }

    pub(crate) fn get_success_packet() -> Self {
        Self::new(RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_PASS, 0, "", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_layout_matches_wire_order() {
        let start = RTAuthenStartPacket::login(
            RTAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_PAP,
            1,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            "tty1",
            "1.2.3.4",
        )
        .with_user("bob")
        .with_data(b"pw".to_vec());
        let body = start.serialize();
        assert_eq!(&body[..8], &[0x01, 0x01, 0x02, 0x01, 3, 4, 7, 2]);
        assert_eq!(&body[8..], b"bobtty11.2.3.4pw");
        assert_eq!(RTAuthenStartPacket::from_raw_packet(&body).unwrap(), start);
    }

    #[test]
    fn start_with_bad_lengths_is_corrupt() {
        let mut body = RTAuthenStartPacket::ascii_login(
            1,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            "tty1",
            "",
        )
        .serialize();
        body[4] = 9; // user_len now lies
        assert!(matches!(
            RTAuthenStartPacket::from_raw_packet(&body),
            Err(RTError::CorruptPacket)
        ));
        assert!(matches!(
            RTAuthenStartPacket::from_raw_packet(&body[..5]),
            Err(RTError::CorruptPacket)
        ));
    }

    #[test]
    fn start_fields_truncate_at_255() {
        let start = RTAuthenStartPacket::ascii_login(
            1,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_NONE,
            &"p".repeat(300),
            "",
        )
        .with_user(&"u".repeat(255))
        .with_data(vec![7; 1]);
        let decoded = RTAuthenStartPacket::from_raw_packet(&start.serialize()).unwrap();
        assert_eq!(decoded.user.len(), 255);
        assert_eq!(decoded.port.len(), 255);
        assert_eq!(decoded.data, vec![7]);
    }

    #[test]
    fn start_unknown_action_is_enumerant_error() {
        let mut body = RTAuthenStartPacket::ascii_login(
            1,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_NONE,
            "",
            "",
        )
        .serialize();
        body[0] = 0x03;
        assert!(matches!(
            RTAuthenStartPacket::from_raw_packet(&body),
            Err(RTError::UnknownEnumerant { field: "RTAuthenPacketAction", code: 0x03 })
        ));
    }

    #[test]
    fn continue_round_trips_and_truncates() {
        let cont = RTAuthenContinuePacket::new(vec![b'a'; 65_536], 0);
        let body = cont.serialize();
        assert_eq!(&body[..2], &[0xff, 0xff]);
        let decoded = RTAuthenContinuePacket::from_raw_packet(&body).unwrap();
        assert_eq!(decoded.user_msg.len(), 65_535);
        assert!(!decoded.is_abort());

        let abort = RTAuthenContinuePacket::abort("bye");
        let decoded = RTAuthenContinuePacket::from_raw_packet(&abort.serialize()).unwrap();
        assert!(decoded.is_abort());
        assert_eq!(decoded.data, b"bye");
    }

    #[test]
    fn reply_helpers() {
        let reply = RTAuthenReplyPacket::get_getpass_packet();
        assert!(reply.has_flag(RTAuthenReplyFlag::TAC_PLUS_REPLY_FLAG_NOECHO));
        assert!(!reply.is_end_of_session());
        assert_eq!(reply.server_msg().as_deref(), Some("Password:"));
        assert_eq!(reply.data(), None);

        let body = RTAuthenReplyPacket::get_success_packet().serialize();
        assert_eq!(body, vec![0x01, 0x00, 0, 0, 0, 0]);
        let pass = RTAuthenReplyPacket::from_raw_packet(&body).unwrap();
        assert!(pass.is_ok() && pass.is_end_of_session());

        for status in [
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_RESTART,
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_FOLLOW,
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_ERROR,
        ] {
            let r = RTAuthenReplyPacket::new(status, 0, "", "");
            assert!(r.is_end_of_session(), "{status:?} should end the session");
            assert!(!r.is_ok());
        }
    }

    #[test]
    fn reply_unknown_status_and_bad_length() {
        assert!(matches!(
            RTAuthenReplyPacket::from_raw_packet(&[0x09, 0, 0, 0, 0, 0]),
            Err(RTError::UnknownEnumerant { field: "RTAuthenReplyStatus", code: 0x09 })
        ));
        assert!(matches!(
            RTAuthenReplyPacket::from_raw_packet(&[0x01, 0, 0, 2, 0, 0, b'x']),
            Err(RTError::CorruptPacket)
        ));
    }

    #[test]
    fn reply_fields_at_length_boundaries() {
        for len in [0usize, 1, 255, 65_535] {
            let reply = RTAuthenReplyPacket {
                status: RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_FAIL,
                flags: 0,
                server_msg: vec![b'm'; len],
                data: vec![b'd'; len],
            };
            assert_eq!(
                RTAuthenReplyPacket::from_raw_packet(&reply.serialize()).unwrap(),
                reply,
                "length {len}"
            );
        }
    }

    #[test]
    fn start_display_masks_data() {
        let start = RTAuthenStartPacket::ascii_login(
            1,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            "",
            "",
        )
        .with_data(b"hunter2".to_vec());
        let shown = start.to_string();
        assert!(!shown.contains("hunter2"), "password leaked: {shown}");
        assert!(shown.contains("MASKED"));
    }
}
