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
use crate::author::write_args;
use crate::packet::{
    FF, FFFF, clamp, len_u8, len_u16, opt_text, read_be_u16, read_field, read_u8,
};
use crate::{RTError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAcctFlag {
    TAC_PLUS_ACCT_FLAG_START = 0x02,
    TAC_PLUS_ACCT_FLAG_STOP = 0x04,
    TAC_PLUS_ACCT_FLAG_WATCHDOG = 0x08,
}
impl_global_consts!(
    RTAcctFlag,
    TAC_PLUS_ACCT_FLAG_START,
    TAC_PLUS_ACCT_FLAG_STOP,
    TAC_PLUS_ACCT_FLAG_WATCHDOG
);

/// START, STOP, WATCHDOG, or WATCHDOG|START (a watchdog carrying an
/// update). Every other combination is rejected before anything is sent.
pub fn validate_acct_flags(flags: u8) -> Result<()> {
    match flags {
        TAC_PLUS_ACCT_FLAG_START | TAC_PLUS_ACCT_FLAG_STOP | TAC_PLUS_ACCT_FLAG_WATCHDOG => Ok(()),
        f if f == TAC_PLUS_ACCT_FLAG_WATCHDOG | TAC_PLUS_ACCT_FLAG_START => Ok(()),
        _ => Err(RTError::InvalidRequest(format!(
            "Invalid Accounting flags: {flags:#04x}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RTAcctReplyStatus {
    TAC_PLUS_ACCT_STATUS_SUCCESS = 0x01,
    TAC_PLUS_ACCT_STATUS_ERROR = 0x02,
    TAC_PLUS_ACCT_STATUS_FOLLOW = 0x21,
}
impl_from_byte!(
    RTAcctReplyStatus,
    TAC_PLUS_ACCT_STATUS_SUCCESS,
    TAC_PLUS_ACCT_STATUS_ERROR,
    TAC_PLUS_ACCT_STATUS_FOLLOW
);

pub struct RTAcctRequestPacketIndexes {
    flags: usize,
    authen_method: usize,
    priv_lvl: usize,
    authen_type: usize,
    authen_service: usize,
    user_len: usize,
    port_len: usize,
    rem_addr_len: usize,
    arg_cnt: usize,
}

const RT_ACCOUNTING_REQUEST_PACKET_INDEXES: RTAcctRequestPacketIndexes =
    RTAcctRequestPacketIndexes {
        flags: 0,
        authen_method: 1,
        priv_lvl: 2,
        authen_type: 3,
        authen_service: 4,
        user_len: 5,
        port_len: 6,
        rem_addr_len: 7,
        arg_cnt: 8,
    };

const RT_ACCT_ARG_LENS_START: usize = RT_ACCOUNTING_REQUEST_PACKET_INDEXES.arg_cnt + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAcctRequestPacket {
    pub flags: u8,
    pub authen_method: RTAuthenPacketMethod,
    pub priv_lvl: u8,
    pub authen_type: RTAuthenPacketType,
    pub authen_service: RTAuthenPacketService,
    pub user: Vec<u8>,
    pub port: Vec<u8>,
    pub rem_addr: Vec<u8>,
    pub args: Vec<RTArgument>,
}

impl fmt::Display for RTAcctRequestPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTAcctRequestPacket[flags:{:#04x} method:{:?} priv_lvl:{} type:{:?} service:{:?} user:{:?} port:{:?} rem_addr:{:?} args:[",
            self.flags,
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

impl RTAcctRequestPacket {
    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_ACCOUNTING_REQUEST_PACKET_INDEXES;
        if pck_buf.len() < RT_ACCT_ARG_LENS_START {
            return Err(RTError::CorruptPacket);
        }
        let user_len = usize::from(read_u8(pck_buf, idx.user_len)?);
        let port_len = usize::from(read_u8(pck_buf, idx.port_len)?);
        let rem_addr_len = usize::from(read_u8(pck_buf, idx.rem_addr_len)?);
        let arg_cnt = usize::from(read_u8(pck_buf, idx.arg_cnt)?);

        let (arg_lens, text_start) = read_field(pck_buf, RT_ACCT_ARG_LENS_START, arg_cnt)?;
        let args_len: usize = arg_lens.iter().map(|l| usize::from(*l)).sum();
        if text_start + user_len + port_len + rem_addr_len + args_len != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (user, next) = read_field(pck_buf, text_start, user_len)?;
        let (port, next) = read_field(pck_buf, next, port_len)?;
        let (rem_addr, next) = read_field(pck_buf, next, rem_addr_len)?;
        let (args, _) = args_from_wire(pck_buf, &arg_lens, next)?;

        Ok(Self {
            flags: read_u8(pck_buf, idx.flags)?,
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
        result.push(self.flags);
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

pub struct RTAcctReplyPacketIndexes {
    server_msg_len: usize,
    data_len: usize,
    status: usize,
}

const RT_ACCOUNTING_REPLY_PACKET_INDEXES: RTAcctReplyPacketIndexes = RTAcctReplyPacketIndexes {
    server_msg_len: 0,
    data_len: 2,
    status: 4,
};

const RT_ACCT_REPLY_TEXT_START: usize = RT_ACCOUNTING_REPLY_PACKET_INDEXES.status + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTAcctReplyPacket {
    pub status: RTAcctReplyStatus,
    pub server_msg: Vec<u8>,
    pub data: Vec<u8>,
}

impl fmt::Display for RTAcctReplyPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTAcctReplyPacket[status:{:?} server_msg:{:?} data:{:?}]",
            self.status,
            String::from_utf8_lossy(&self.server_msg),
            String::from_utf8_lossy(&self.data)
        )
    }
}

impl RTAcctReplyPacket {
    pub fn new(status: RTAcctReplyStatus, server_msg: &str, data: &str) -> Self {
        Self {
            status,
            server_msg: server_msg.as_bytes().to_vec(),
            data: data.as_bytes().to_vec(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == RTAcctReplyStatus::TAC_PLUS_ACCT_STATUS_SUCCESS
    }

    pub fn server_msg(&self) -> Option<String> {
        opt_text(&self.server_msg)
    }

    pub fn data(&self) -> Option<String> {
        opt_text(&self.data)
    }

    pub fn from_raw_packet(pck_buf: &[u8]) -> Result<Self> {
        let idx = &RT_ACCOUNTING_REPLY_PACKET_INDEXES;
        if pck_buf.len() < RT_ACCT_REPLY_TEXT_START {
            return Err(RTError::CorruptPacket);
        }
        let server_msg_len = usize::from(read_be_u16(pck_buf, idx.server_msg_len)?);
        let data_len = usize::from(read_be_u16(pck_buf, idx.data_len)?);
        if RT_ACCT_REPLY_TEXT_START + server_msg_len + data_len != pck_buf.len() {
            return Err(RTError::CorruptPacket);
        }

        let (server_msg, next) = read_field(pck_buf, RT_ACCT_REPLY_TEXT_START, server_msg_len)?;
        let (data, _) = read_field(pck_buf, next, data_len)?;
        Ok(Self {
            status: RTAcctReplyStatus::from_byte(read_u8(pck_buf, idx.status)?)?,
            server_msg,
            data,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let server_msg = clamp(&self.server_msg, FFFF);
        let data = clamp(&self.data, FFFF);

        let mut result =
            Vec::with_capacity(RT_ACCT_REPLY_TEXT_START + server_msg.len() + data.len());
        result.extend(len_u16(server_msg).to_be_bytes());
        result.extend(len_u16(data).to_be_bytes());
        result.push(self.status.code());
        result.extend_from_slice(server_msg);
        result.extend_from_slice(data);
        result
    }
}
