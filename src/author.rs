// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

use std::fmt;

use crate::argument::{RTArgument, args_from_wire, args_to_wire};
use crate::authen::{RTAuthenPacketMethod, RTAuthenPacketService, RTAuthenPacketType};
use crate::packet::{
    FF, FFFF, clamp, len_u8, len_u16, opt_text, read_be_u16, read_field, read_u8,
};
use crate::{RTError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAuthorReplyStatus {
    TAC_PLUS_AUTHOR_STATUS_PASS_ADD = 0x01,
    TAC_PLUS_AUTHOR_STATUS_PASS_REPL = 0x02,
    TAC_PLUS_AUTHOR_STATUS_FAIL = 0x10,
    TAC_PLUS_AUTHOR_STATUS_ERROR = 0x11,
    TAC_PLUS_AUTHOR_STATUS_FOLLOW = 0x21,
}
impl_from_byte!(
    RTAuthorReplyStatus,
    TAC_PLUS_AUTHOR_STATUS_PASS_ADD,
    TAC_PLUS_AUTHOR_STATUS_PASS_REPL,
    TAC_PLUS_AUTHOR_STATUS_FAIL,
    TAC_PLUS_AUTHOR_STATUS_ERROR,
    TAC_PLUS_AUTHOR_STATUS_FOLLOW
);

pub struct RTAuthorRequestPacketIndexes {
    authen_method: usize,
    priv_lvl: usize,
    authen_type: usize,
    authen_service: usize,
    user_len: usize,
    port_len: usize,
    rem_addr_len: usize,
    arg_cnt: usize,
}

const RT_AUTHORIZATION_REQUEST_PACKET_INDEXES: RTAuthorRequestPacketIndexes =
    RTAuthorRequestPacketIndexes {
        authen_method: 0,
        priv_lvl: 1,
        authen_type: 2,
        authen_service: 3,
        user_len: 4,
        port_len: 5,
        rem_addr_len: 6,
        arg_cnt: 7,
    };

const RT_AUTHOR_ARG_LENS_START: usize = RT_AUTHORIZATION_REQUEST_PACKET_INDEXES.arg_cnt + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAuthorRequestPacket {
    pub authen_method: RTAuthenPacketMethod,
    pub priv_lvl: u8,
    pub authen_type: RTAuthenPacketType,
    pub authen_service: RTAuthenPacketService,
    pub user: Vec<u8>,
    pub port: Vec<u8>,
    pub rem_addr: Vec<u8>,
    pub args: Vec<RTArgument>,
}

impl fmt::Display for RTAuthorRequestPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTAuthorRequestPacket[method:{:?} priv_lvl:{} type:{:?} service:{:?} user:{:?} port:{:?} rem_addr:{:?} args:[",
            self.authen_method,
            self.priv_lvl,
            self.authen_type,
            self.authen_service,
            String::from_utf8_lossy(&self.user),
            String::from_utf8_lossy(&self.port),
            String::from_utf8_lossy(&self.rem_addr),
        )?;
        write_args(f, &self.args)?;
        write!(f, "]]")
    }
}

pub(crate) fn write_args(f: &mut fmt::Formatter<'_>, args: &[RTArgument]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

impl RTAuthorRequestPacket {
    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_AUTHORIZATION_REQUEST_PACKET_INDEXES;
        if pck_buf.len() < RT_AUTHOR_ARG_LENS_START {
            return Err(RTError::CorruptPacket);
        }
        let user_len = usize::from(read_u8(pck_buf, idx.user_len)?);
        let port_len = usize::from(read_u8(pck_buf, idx.port_len)?);
        let rem_addr_len = usize::from(read_u8(pck_buf, idx.rem_addr_len)?);
        let arg_cnt = usize::from(read_u8(pck_buf, idx.arg_cnt)?);

        let (arg_lens, text_start) = read_field(pck_buf, RT_AUTHOR_ARG_LENS_START, arg_cnt)?;
        let args_len: usize = arg_lens.iter().map(|l| usize::from(*l)).sum();
        if text_start + user_len + port_len + rem_addr_len + args_len != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (user, next) = read_field(pck_buf, text_start, user_len)?;
        let (port, next) = read_field(pck_buf, next, port_len)?;
        let (rem_addr, next) = read_field(pck_buf, next, rem_addr_len)?;
        let (args, _) = args_from_wire(pck_buf, &arg_lens, next)?;

        Ok(Self {
            authen_method: RTAuthenPacketMethod::from_byte(read_u8(pck_buf, idx.authen_method)?)?,
            priv_lvl: read_u8(pck_buf, idx.priv_lvl)?,
            authen_type: RTAuthenPacketType::from_byte(read_u8(pck_buf, idx.authen_type)?)?,
            authen_service: RTAuthenPacketService::from_byte(read_u8(
                pck_buf,
                idx.authen_service,
            )?)?,
            user,
            port,
            rem_addr,
            args,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let user = clamp(&self.user, FF);
        let port = clamp(&self.port, FF);
        let rem_addr = clamp(&self.rem_addr, FF);
        let args = args_to_wire(&self.args);

        let mut result = Vec::new();
        result.push(self.authen_method.code());
        result.push(self.priv_lvl);
        result.push(self.authen_type.code());
        result.push(self.authen_service.code());
        result.push(len_u8(user));
        result.push(len_u8(port));
        result.push(len_u8(rem_addr));
        result.push(u8::try_from(args.len()).unwrap_or(u8::MAX));
        result.extend(args.iter().map(|a| len_u8(a)));
        result.extend_from_slice(user);
        result.extend_from_slice(port);
        result.extend_from_slice(rem_addr);
        for a in &args {
            result.extend_from_slice(a);
        }
        result
    }
}

pub struct RTAuthorReplyPacketIndexes {
    status: usize,
    arg_cnt: usize,
    server_msg_len: usize,
    data_len: usize,
}

const RT_AUTHORIZATION_REPLY_PACKET_INDEXES: RTAuthorReplyPacketIndexes =
    RTAuthorReplyPacketIndexes {
        status: 0,
        arg_cnt: 1,
        server_msg_len: 2,
        data_len: 4,
    };

const RT_AUTHOR_REPLY_ARG_LENS_START: usize = RT_AUTHORIZATION_REPLY_PACKET_INDEXES.data_len + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAuthorReplyPacket {
    pub status: RTAuthorReplyStatus,
    pub args: Vec<RTArgument>,
    pub server_msg: Vec<u8>,
    pub data: Vec<u8>,
}

impl fmt::Display for RTAuthorReplyPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTAuthorReplyPacket[status:{:?} server_msg:{:?} data:{:?} args:[",
            self.status,
            String::from_utf8_lossy(&self.server_msg),
            String::from_utf8_lossy(&self.data),
        )?;
        write_args(f, &self.args)?;
        write!(f, "]]")
    }
}

impl RTAuthorReplyPacket {
    pub fn new(
        status: RTAuthorReplyStatus,
        args: Vec<RTArgument>,
        server_msg: &str,
        data: &str,
    ) -> Self {
        Self {
            status,
            args,
            server_msg: server_msg.as_bytes().to_vec(),
            data: data.as_bytes().to_vec(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(
            self.status,
            RTAuthorReplyStatus::TAC_PLUS_AUTHOR_STATUS_PASS_ADD
                | RTAuthorReplyStatus::TAC_PLUS_AUTHOR_STATUS_PASS_REPL
        )
    }

    pub fn server_msg(&self) -> Option<String> {
        opt_text(&self.server_msg)
    }

    pub fn data(&self) -> Option<String> {
        opt_text(&self.data)
    }

    /// Value of the first argument named `attribute`.
    pub fn value(&self, attribute: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|a| a.attribute == attribute)
            .and_then(|a| a.value.as_deref())
    }

    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_AUTHORIZATION_REPLY_PACKET_INDEXES;
        if pck_buf.len() < RT_AUTHOR_REPLY_ARG_LENS_START {
            return Err(RTError::CorruptPacket);
        }
        let arg_cnt = usize::from(read_u8(pck_buf, idx.arg_cnt)?);
        let server_msg_len = usize::from(read_be_u16(pck_buf, idx.server_msg_len)?);
        let data_len = usize::from(read_be_u16(pck_buf, idx.data_len)?);

        let (arg_lens, text_start) =
            read_field(pck_buf, RT_AUTHOR_REPLY_ARG_LENS_START, arg_cnt)?;
        let args_len: usize = arg_lens.iter().map(|l| usize::from(*l)).sum();
        if text_start + server_msg_len + data_len + args_len != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (server_msg, next) = read_field(pck_buf, text_start, server_msg_len)?;
        let (data, next) = read_field(pck_buf, next, data_len)?;
        let (args, _) = args_from_wire(pck_buf, &arg_lens, next)?;

        Ok(Self {
            status: RTAuthorReplyStatus::from_byte(read_u8(pck_buf, idx.status)?)?,
            args,
            server_msg,
            data,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let server_msg = clamp(&self.server_msg, FFFF);
        let data = clamp(&self.data, FFFF);
        let args = args_to_wire(&self.args);

        let mut result = Vec::new();
        result.push(self.status.code());
        result.push(u8::try_from(args.len()).unwrap_or(u8::MAX));
        result.extend(len_u16(server_msg).to_be_bytes());
        result.extend(len_u16(data).to_be_bytes());
        result.extend(args.iter().map(|a| len_u8(a)));
        result.extend_from_slice(server_msg);
        result.extend_from_slice(data);
        for a in &args {
            result.extend_from_slice(a);
        }
        result
    }
}
