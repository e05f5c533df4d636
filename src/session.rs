// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! One AUTHEN, AUTHOR or ACCT exchange: the sequence ladder, the
//! single-connect agreement, and terminal-state bookkeeping.
//!
//! What a packet *means* differs between client and server, so that part
//! is delegated to an [`RTSessionRole`].

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::accounting::{RTAcctReplyPacket, RTAcctReplyStatus};
use crate::authen::RTAuthenReplyPacket;
use crate::author::{RTAuthorReplyPacket, RTAuthorReplyStatus};
use crate::header::{RTHeader, RTTACFlag, RTTACType, RTTACVersion};
use crate::packet::RTDecodedPacket;
use crate::{RTError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RTSessionState {
    /// Request sent, reply pending.
    Open,
    /// Multi-round ASCII login in progress.
    Continuing,
    /// A terminal reply arrived. Says nothing about PASS vs FAIL.
    EndedOk,
    /// Connection failure or protocol violation.
    EndedError,
}

impl RTSessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::EndedOk | Self::EndedError)
    }
}

/// What the read loop hands to the caller waiting on a client session.
#[derive(Debug)]
pub enum RTSessionEvent {
    /// GETUSER, GETPASS or GETDATA; the caller owes a CONTINUE sent with
    /// `version`.
    Prompt {
        version: RTTACVersion,
        reply: RTAuthenReplyPacket,
    },
    Ended(RTDecodedPacket),
    Failed(RTError),
}

/// What a role decided to do with a packet.
pub enum RTRoleOutcome {
    /// More packets are expected.
    Continue,
    /// The exchange is over.
    End,
    /// Send this to the peer; the exchange is over once it's out.
    Reply(RTDecodedPacket),
}

/// Client-continuation versus server-reply behaviour.
pub trait RTSessionRole: Send {
    fn on_packet(&mut self, header: &RTHeader, packet: RTDecodedPacket) -> RTRoleOutcome;

    /// The session ended abnormally; tell whoever cares.
    fn on_failure(&mut self, err: RTError);

    /// Whether this end is willing to keep the connection after the
    /// session. Combined with the peer's flag on the first packet.
    fn wants_single_connect(&self) -> bool {
        true
    }
}

/// Forwards replies to the task blocked in the client façade.
pub struct RTClientRole {
    events: mpsc::UnboundedSender<RTSessionEvent>,
    single_connect: bool,
}

impl RTClientRole {
    pub fn new(events: mpsc::UnboundedSender<RTSessionEvent>, single_connect: bool) -> Self {
        Self {
            events,
            single_connect,
        }
    }

    fn notify(&self, event: RTSessionEvent) {
        // The caller may have timed out and gone; nothing left to tell.
        if self.events.send(event).is_err() {
            debug!("session waiter already gone");
        }
    }
}

impl RTSessionRole for RTClientRole {
    fn on_packet(&mut self, header: &RTHeader, packet: RTDecodedPacket) -> RTRoleOutcome {
        match packet {
            RTDecodedPacket::AuthenReply(reply) if !reply.is_end_of_session() => {
                self.notify(RTSessionEvent::Prompt {
                    version: header.tacp_hdr_version,
                    reply,
                });
                RTRoleOutcome::Continue
            }
            other => {
                self.notify(RTSessionEvent::Ended(other));
                RTRoleOutcome::End
            }
        }
    }

    fn on_failure(&mut self, err: RTError) {
        self.notify(RTSessionEvent::Failed(err));
    }

    fn wants_single_connect(&self) -> bool {
        self.single_connect
    }
}

/// Answers every request with "not implemented".
#[derive(Debug, Default)]
pub struct RTServerStub;

pub const AUTHEN_NOT_IMPLEMENTED: &str = "The AUTHENTICATION operation is not implemented.";
pub const AUTHOR_NOT_IMPLEMENTED: &str = "The AUTHORIZATION operation is not implemented.";
pub const ACCT_NOT_IMPLEMENTED: &str = "The ACCOUNTING operation is not implemented.";

impl RTSessionRole for RTServerStub {
    fn on_packet(&mut self, header: &RTHeader, packet: RTDecodedPacket) -> RTRoleOutcome {
        debug!(header = %header, request = %packet, "answering with not-implemented stub");
        RTRoleOutcome::Reply(match header.tacp_hdr_type {
            RTTACType::TAC_PLUS_AUTHOR => RTDecodedPacket::AuthorReply(RTAuthorReplyPacket::new(
                RTAuthorReplyStatus::TAC_PLUS_AUTHOR_STATUS_FAIL,
                vec![],
                AUTHOR_NOT_IMPLEMENTED,
                AUTHOR_NOT_IMPLEMENTED,
            )),
            RTTACType::TAC_PLUS_ACCT => RTDecodedPacket::AcctReply(RTAcctReplyPacket::new(
                RTAcctReplyStatus::TAC_PLUS_ACCT_STATUS_ERROR,
                ACCT_NOT_IMPLEMENTED,
                ACCT_NOT_IMPLEMENTED,
            )),
            RTTACType::TAC_PLUS_AUTHEN | RTTACType::TAC_PLUS_START_TLS => {
                RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::get_fail_packet(
                    AUTHEN_NOT_IMPLEMENTED,
                    AUTHEN_NOT_IMPLEMENTED,
                ))
            }
        })
    }

    fn on_failure(&mut self, err: RTError) {
        warn!(error = %err, "server session dropped");
    }
}

/// The result of feeding one packet to a session.
pub enum RTSessionStep {
    /// Still live, nothing to send.
    Continue,
    /// Terminal now; remove it from the table.
    Ended,
    /// Terminal once this reply is written.
    Respond(RTHeader, RTDecodedPacket),
    /// The session was already over; the packet was dropped.
    Ignored,
}

pub struct RTSession {
    id: u32,
    kind: RTTACType,
    flags: u8,
    last_header: Option<RTHeader>,
    first_flags: Option<u8>,
    state: RTSessionState,
    role: Box<dyn RTSessionRole>,
}

impl std::fmt::Debug for RTSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTSession")
            .field("id", &format_args!("{:08x}", self.id))
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("last_header", &self.last_header)
            .finish_non_exhaustive()
    }
}

impl RTSession {
    /// `flags` go on this end's first packet.
    pub fn new(id: u32, kind: RTTACType, flags: u8, role: Box<dyn RTSessionRole>) -> Self {
        Self {
            id,
            kind,
            flags,
            last_header: None,
            first_flags: None,
            state: RTSessionState::Open,
            role,
        }
    }

    /// A session started by the peer, answered by the stub.
    pub fn new_server(id: u32, kind: RTTACType) -> Self {
        Self::new(id, kind, 0, Box::new(RTServerStub))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> RTTACType {
        self.kind
    }

    pub fn state(&self) -> RTSessionState {
        self.state
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }

    /// The connection may outlive this session only if the first packet
    /// received carried SINGLE_CONNECT and this end asked for it too.
    pub fn is_single_connect(&self) -> bool {
        self.first_flags
            .is_some_and(|f| f & (RTTACFlag::TAC_PLUS_SINGLE_CONNECT_FLAG as u8) != 0)
            && self.role.wants_single_connect()
    }

    /// Header for the next packet this end sends. Sequence 1 for the
    /// first, otherwise one past the last packet seen in either direction.
    pub fn prepare_send(&mut self, version: RTTACVersion) -> Result<RTHeader> {
        if self.is_ended() {
            return Err(RTError::InvalidRequest(format!(
                "session {:08x} already ended",
                self.id
            )));
        }
        let header = match &self.last_header {
            None => RTHeader::new(version, self.kind, self.flags, self.id),
            Some(last) => last.next(version)?,
        };
        self.last_header = Some(header.clone());
        Ok(header)
    }

    /// Feeds a packet received for this session.
    pub fn dispatch(&mut self, header: &RTHeader, packet: RTDecodedPacket) -> RTSessionStep {
        if self.is_ended() {
            debug!(header = %header, "packet for an ended session ignored");
            return RTSessionStep::Ignored;
        }

        let expected = match &self.last_header {
            None => Some(1),
            Some(last) => last.tacp_hdr_seqno.checked_add(1),
        };
        if expected != Some(header.tacp_hdr_seqno) {
            self.fail(RTError::ProtocolViolation(format!(
                "sequence number {} out of order, expected {:?}",
                header.tacp_hdr_seqno, expected
            )));
            return RTSessionStep::Ended;
        }
        if header.tacp_hdr_type != self.kind {
            self.fail(RTError::ProtocolViolation(format!(
                "{:?} packet in a {:?} session",
                header.tacp_hdr_type, self.kind
            )));
            return RTSessionStep::Ended;
        }

        if self.first_flags.is_none() {
            self.first_flags = Some(header.tacp_hdr_flags);
        }
        self.last_header = Some(header.clone());

        match self.role.on_packet(header, packet) {
            RTRoleOutcome::Continue => {
                self.state = RTSessionState::Continuing;
                RTSessionStep::Continue
            }
            RTRoleOutcome::End => {
                self.state = RTSessionState::EndedOk;
                RTSessionStep::Ended
            }
            RTRoleOutcome::Reply(reply) => match header.next(header.tacp_hdr_version) {
                Ok(reply_header) => {
                    self.last_header = Some(reply_header.clone());
                    self.state = RTSessionState::EndedOk;
                    RTSessionStep::Respond(reply_header, reply)
                }
                Err(e) => {
                    self.fail(e);
                    RTSessionStep::Ended
                }
            },
        }
    }

    /// Ends the session with `err`, once.
    pub fn fail(&mut self, err: RTError) {
        if self.is_ended() {
            return;
        }
        warn!(session = self.id, error = %err, "session failed");
        self.state = RTSessionState::EndedError;
        self.role.on_failure(err);
    }
}
