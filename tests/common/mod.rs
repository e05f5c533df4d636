// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ratchet::header::TACP_HEADER_MAX_LENGTH;
use ratchet::packet::RTPacketDirection;
use ratchet::authen::TAC_PLUS_REPLY_FLAG_NOECHO;
use ratchet::{
    RTAuthenReplyPacket, RTAuthenReplyStatus, RTClient, RTClientConfig, RTDecodedPacket, RTHeader,
    RTKey,
};

pub const KEY: &str = "testing123";

pub async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

pub fn client(addr: &str, single_connect: bool) -> RTClient {
    let cfg = RTClientConfig::from_lists(addr, KEY)
        .unwrap()
        .with_single_connect(single_connect)
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(2));
    RTClient::new(cfg)
}

pub fn getuser_reply() -> RTDecodedPacket {
    RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::new(
        RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETUSER,
        0,
        "Username:",
        "",
    ))
}

pub fn getpass_reply() -> RTDecodedPacket {
    RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::new(
        RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETPASS,
        TAC_PLUS_REPLY_FLAG_NOECHO,
        "Password:",
        "",
    ))
}

pub fn pass_reply() -> RTDecodedPacket {
    RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::new(
        RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_PASS,
        0,
        "",
        "",
    ))
}

/// A hand-driven TACACS+ server for one socket.
pub struct ScriptedPeer {
    stream: TcpStream,
    key: RTKey,
}

impl ScriptedPeer {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        Self {
            stream,
            key: RTKey::from(KEY),
        }
    }

    /// Reads one request; sequence 1 decodes as a START.
    pub async fn read(&mut self) -> (RTHeader, RTDecodedPacket) {
        let mut hdr = [0u8; TACP_HEADER_MAX_LENGTH];
        self.stream.read_exact(&mut hdr).await.unwrap();
        let header = RTHeader::parse_init_header(&hdr).unwrap();
        let mut body = vec![0u8; header.get_expected_packet_length()];
        self.stream.read_exact(&mut body).await.unwrap();
        let body = header.toggle_cipher(&self.key, &body);
        let direction = RTPacketDirection::FromClient {
            new_session: header.tacp_hdr_seqno == 1,
        };
        let packet = RTDecodedPacket::from_raw_packet(header.tacp_hdr_type, direction, &body).unwrap();
        (header, packet)
    }

    /// Answers `to` with the next sequence number and the given flags.
    pub async fn reply(&mut self, to: &RTHeader, flags: u8, packet: RTDecodedPacket) {
        let mut header = to.next(to.tacp_hdr_version).unwrap();
        header.tacp_hdr_flags = flags;
        let body = packet.serialize();
        header.tacp_hdr_length = u32::try_from(body.len()).unwrap();
        let mut frame = header.serialize().to_vec();
        frame.extend(header.toggle_cipher(&self.key, &body));
        self.stream.write_all(&frame).await.unwrap();
    }

    /// True once the client has closed its end.
    pub async fn closed_by_client(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut buf)).await,
            Ok(Ok(0) | Err(_))
        )
    }
}
