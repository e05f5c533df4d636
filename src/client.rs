// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! Blocking-style AAA calls on top of a shared [`RTConnection`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::accounting::{RTAcctReplyPacket, RTAcctRequestPacket, validate_acct_flags};
use crate::argument::RTArgument;
use crate::authen::{
    RTAuthenContinuePacket, RTAuthenPacketMethod, RTAuthenPacketService, RTAuthenPacketType,
    RTAuthenReplyFlag, RTAuthenReplyPacket, RTAuthenStartPacket, RTPrivLevel,
};
use crate::author::{RTAuthorReplyPacket, RTAuthorRequestPacket};
use crate::config::RTClientConfig;
use crate::connection::{RTConnection, RTEndpointRole};
use crate::header::{
    RTTACType, RTTACVersion, TAC_PLUS_NULL_FLAG, TAC_PLUS_SINGLE_CONNECT_FLAG,
    TAC_PLUS_UNENCRYPTED_FLAG,
};
use crate::packet::RTDecodedPacket;
use crate::prompt::RTUserInterface;
use crate::session::{RTClientRole, RTSession, RTSessionEvent};
use crate::{RTError, Result};

const CHAP_CHALLENGE_LENGTH: usize = 16;

/// PPP identifier for CHAP; only needs to differ between nearby attempts.
static PPP_ID: AtomicU8 = AtomicU8::new(0);

const NO_UI: &str = "No interactive user interface available.";

/// Entry point: holds the server list and at most one live connection,
/// shared by every session while the servers agree to single-connect.
pub struct RTClient {
    config: RTClientConfig,
    conn: tokio::sync::Mutex<Option<Arc<RTConnection>>>,
}

impl RTClient {
    pub fn new(config: RTClientConfig) -> Self {
        Self {
            config,
            conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RTClientConfig {
        &self.config
    }

    /// Reuses the current connection if it's still good for more sessions,
    /// else tries each server in order.
    async fn connection(&self) -> Result<Arc<RTConnection>> {
        let mut current = self.conn.lock().await;
        if let Some(conn) = current.as_ref().filter(|c| c.is_reusable()) {
            return Ok(Arc::clone(conn));
        }

        for server in &self.config.servers {
            let addr = server.address();
            match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(error = %e, "could not set TCP_NODELAY");
                    }
                    info!(server = %addr, "connected");
                    let conn = RTConnection::start(
                        stream,
                        server.key.clone(),
                        RTEndpointRole::Client,
                        &addr,
                    );
                    *current = Some(Arc::clone(&conn));
                    return Ok(conn);
                }
                Ok(Err(e)) => warn!(server = %addr, error = %e, "connect failed"),
                Err(_) => warn!(server = %addr, "connect timed out"),
            }
        }
        Err(RTError::NoServerAvailable)
    }

    /// A session for PAP, CHAP, authorization or accounting.
    pub async fn new_session(
        &self,
        service: RTAuthenPacketService,
        port: &str,
        rem_addr: &str,
        priv_lvl: RTPrivLevel,
    ) -> Result<RTClientSession> {
        self.open_session(service, port, rem_addr, priv_lvl, None).await
    }

    /// Same as [`Self::new_session`], with a prompt provider for ASCII logins.
    pub async fn new_session_interactive(
        &self,
        service: RTAuthenPacketService,
        port: &str,
        rem_addr: &str,
        priv_lvl: RTPrivLevel,
        ui: Arc<dyn RTUserInterface>,
    ) -> Result<RTClientSession> {
        self.open_session(service, port, rem_addr, priv_lvl, Some(ui)).await
    }

    async fn open_session(
        &self,
        service: RTAuthenPacketService,
        port: &str,
        rem_addr: &str,
        priv_lvl: RTPrivLevel,
        ui: Option<Arc<dyn RTUserInterface>>,
    ) -> Result<RTClientSession> {
        let conn = self.connection().await?;
        let mut flags = TAC_PLUS_NULL_FLAG;
        if self.config.single_connect {
            flags |= TAC_PLUS_SINGLE_CONNECT_FLAG;
        }
        if self.config.unencrypted {
            flags |= TAC_PLUS_UNENCRYPTED_FLAG;
        }
        Ok(RTClientSession {
            conn,
            ui,
            service,
            port: port.to_owned(),
            rem_addr: rem_addr.to_owned(),
            priv_lvl,
            flags,
            single_connect: self.config.single_connect,
            reply_timeout: self.config.reply_timeout,
        })
    }

    /// True if a connection is open and will take another session.
    pub async fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_reusable())
    }

    /// Closes the current connection, failing anything in flight with
    /// [`RTError::Shutdown`]. Calling it again is harmless.
    pub async fn shutdown(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.shutdown();
            conn.closed().await;
        }
    }
}

impl Drop for RTClient {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.get_mut().take() {
            conn.shutdown();
        }
    }
}

/// One AAA exchange. Each operation consumes the session.
pub struct RTClientSession {
    conn: Arc<RTConnection>,
    ui: Option<Arc<dyn RTUserInterface>>,
    service: RTAuthenPacketService,
    port: String,
    rem_addr: String,
    priv_lvl: RTPrivLevel,
    flags: u8,
    single_connect: bool,
    reply_timeout: std::time::Duration,
}

impl std::fmt::Debug for RTClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTClientSession")
            .field("peer", &self.conn.peer())
            .field("service", &self.service)
            .field("port", &self.port)
            .field("rem_addr", &self.rem_addr)
            .field("priv_lvl", &self.priv_lvl)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl RTClientSession {
    /// Interactive login: the server asks, the prompt provider answers.
    /// Waits as long as the user takes, but fails as soon as the
    /// connection does.
    pub async fn authenticate_ascii(self) -> Result<RTAuthenReplyPacket> {
        if self.ui.is_none() {
            return Err(RTError::InvalidRequest(NO_UI.to_owned()));
        }
        let start = RTAuthenStartPacket::ascii_login(
            self.priv_lvl.0,
            self.service,
            &self.port,
            &self.rem_addr,
        );
        let reply = self
            .run(
                RTTACType::TAC_PLUS_AUTHEN,
                RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT,
                RTDecodedPacket::AuthenStart(start),
                false,
            )
            .await?;
        expect_authen(reply)
    }

    pub async fn authenticate_pap(self, username: &str, password: &str) -> Result<RTAuthenReplyPacket> {
        let start = RTAuthenStartPacket::login(
            RTAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_PAP,
            self.priv_lvl.0,
            self.service,
            &self.port,
            &self.rem_addr,
        )
        .with_user(username)
        .with_data(password.as_bytes().to_vec());
        let reply = self
            .run(
                RTTACType::TAC_PLUS_AUTHEN,
                RTTACVersion::TAC_PLUS_MINOR_VER_ONE,
                RTDecodedPacket::AuthenStart(start),
                true,
            )
            .await?;
        expect_authen(reply)
    }

    /// The password never leaves this host; only the challenge and the
    /// MD5 response do.
    pub async fn authenticate_chap(self, username: &str, password: &str) -> Result<RTAuthenReplyPacket> {
        let id = PPP_ID.fetch_add(1, Ordering::Relaxed);
        let challenge: [u8; CHAP_CHALLENGE_LENGTH] = rand::random();
        let start = RTAuthenStartPacket::login(
            RTAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_CHAP,
            self.priv_lvl.0,
            self.service,
            &self.port,
            &self.rem_addr,
        )
        .with_user(username)
        .with_data(chap_data(id, password.as_bytes(), &challenge));
        let reply = self
            .run(
                RTTACType::TAC_PLUS_AUTHEN,
                RTTACVersion::TAC_PLUS_MINOR_VER_ONE,
                RTDecodedPacket::AuthenStart(start),
                true,
            )
            .await?;
        expect_authen(reply)
    }

    pub async fn authorize(
        self,
        username: &str,
        method: RTAuthenPacketMethod,
        authen_type: RTAuthenPacketType,
        service: RTAuthenPacketService,
        args: Vec<RTArgument>,
    ) -> Result<RTAuthorReplyPacket> {
        let request = RTAuthorRequestPacket {
            authen_method: method,
            priv_lvl: self.priv_lvl.0,
            authen_type,
            authen_service: service,
            user: username.as_bytes().to_vec(),
            port: self.port.as_bytes().to_vec(),
            rem_addr: self.rem_addr.as_bytes().to_vec(),
            args,
        };
        match self
            .run(
                RTTACType::TAC_PLUS_AUTHOR,
                RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT,
                RTDecodedPacket::AuthorRequest(request),
                true,
            )
            .await?
        {
            RTDecodedPacket::AuthorReply(reply) => Ok(reply),
            other => Err(unexpected(&other)),
        }
    }

    /// Authorize as a user who logged in with PAP against TACACS+.
    pub async fn authorize_default(self, username: &str, args: Vec<RTArgument>) -> Result<RTAuthorReplyPacket> {
        self.authorize(
            username,
            RTAuthenPacketMethod::TAC_PLUS_AUTHEN_METH_TACACSPLUS,
            RTAuthenPacketType::TAC_PLUS_AUTHEN_TYPE_PAP,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            args,
        )
        .await
    }

    /// `flags` must be START, STOP, WATCHDOG or WATCHDOG|START; anything
    /// else fails before a byte is sent.
    pub async fn account(
        self,
        flags: u8,
        username: &str,
        method: RTAuthenPacketMethod,
        authen_type: RTAuthenPacketType,
        service: RTAuthenPacketService,
        args: Vec<RTArgument>,
    ) -> Result<RTAcctReplyPacket> {
        validate_acct_flags(flags)?;
        let request = RTAcctRequestPacket {
            flags,
            authen_method: method,
            priv_lvl: RTPrivLevel::TAC_PLUS_PRIV_LVL_USER.0,
            authen_type,
            authen_service: service,
            user: username.as_bytes().to_vec(),
            port: self.port.as_bytes().to_vec(),
            rem_addr: self.rem_addr.as_bytes().to_vec(),
            args,
        };
        match self
            .run(
                RTTACType::TAC_PLUS_ACCT,
                RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT,
                RTDecodedPacket::AcctRequest(request),
                true,
            )
            .await?
        {
            RTDecodedPacket::AcctReply(reply) => Ok(reply),
            other => Err(unexpected(&other)),
        }
    }

    /// Registers a fresh session id, sends `packet`, and waits for the
    /// terminal reply. A failed or timed-out session is dropped from the
    /// connection; other sessions carry on.
    async fn run(
        self,
        kind: RTTACType,
        version: RTTACVersion,
        packet: RTDecodedPacket,
        bounded: bool,
    ) -> Result<RTDecodedPacket> {
        let (id, mut events) = self.register(kind)?;
        let result = self.exchange(id, version, packet, bounded, &mut events).await;
        if let Err(e) = &result {
            debug!(session = id, error = %e, "session abandoned");
            self.conn.forget_session(id);
        }
        result
    }

    fn register(&self, kind: RTTACType) -> Result<(u32, mpsc::UnboundedReceiver<RTSessionEvent>)> {
        let mut attempts = 0u8;
        loop {
            let (tx, rx) = mpsc::unbounded_channel();
            let id: u32 = rand::random();
            let session = RTSession::new(
                id,
                kind,
                self.flags,
                Box::new(RTClientRole::new(tx, self.single_connect)),
            );
            match self.conn.register_session(session) {
                Ok(()) => return Ok((id, rx)),
                // id collision; draw again
                Err(RTError::InvalidRequest(_)) if attempts < 3 => attempts = attempts.saturating_add(1),
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange(
        &self,
        id: u32,
        version: RTTACVersion,
        packet: RTDecodedPacket,
        bounded: bool,
        events: &mut mpsc::UnboundedReceiver<RTSessionEvent>,
    ) -> Result<RTDecodedPacket> {
        self.conn.send_packet(id, version, &packet).await?;
        loop {
            let event = if bounded {
                timeout(self.reply_timeout, events.recv())
                    .await
                    .map_err(|_| RTError::Timeout)?
            } else {
                events.recv().await
            };
            match event.ok_or(RTError::Shutdown)? {
                RTSessionEvent::Ended(reply) => return Ok(reply),
                RTSessionEvent::Failed(e) => return Err(e),
                RTSessionEvent::Prompt { version, reply } => {
                    let answer = match self.answer(&reply).await {
                        Ok(answer) => answer,
                        Err(e) => {
                            // The server is owed a CONTINUE; tell it we quit.
                            let abort = RTAuthenContinuePacket::abort(&e.to_string());
                            if let Err(send) =
                                self.conn.send_packet(id, version, &RTDecodedPacket::AuthenContinue(abort)).await
                            {
                                debug!(session = id, error = %send, "abort not delivered");
                            }
                            return Err(e);
                        }
                    };
                    self.conn
                        .send_packet(id, version, &RTDecodedPacket::AuthenContinue(answer))
                        .await?;
                }
            }
        }
    }

    /// Asks the prompt provider off the async workers; it may block on a
    /// human.
    async fn answer(&self, reply: &RTAuthenReplyPacket) -> Result<RTAuthenContinuePacket> {
        let Some(ui) = self.ui.clone() else {
            return Err(RTError::InvalidRequest(NO_UI.to_owned()));
        };
        let prompt = reply.server_msg().unwrap_or_default();
        let no_echo = reply.has_flag(RTAuthenReplyFlag::TAC_PLUS_REPLY_FLAG_NOECHO);
        let get_what = reply.status;

        let input = tokio::task::spawn_blocking(move || ui.get_user_input(&prompt, no_echo, get_what))
            .await
            .map_err(|e| RTError::InvalidRequest(format!("prompt provider failed: {e}")))?;
        let input = Zeroizing::new(input.unwrap_or_default());
        Ok(RTAuthenContinuePacket::new(input.as_bytes().to_vec(), 0))
    }
}

/// `id || challenge || MD5(id || password || challenge)`
fn chap_data(id: u8, password: &[u8], challenge: &[u8]) -> Vec<u8> {
    let mut ctx = md5::Context::new();
    ctx.consume([id]);
    ctx.consume(password);
    ctx.consume(challenge);
    let response = ctx.compute().0;

    let mut data = Vec::with_capacity(1 + challenge.len() + response.len());
    data.push(id);
    data.extend_from_slice(challenge);
    data.extend_from_slice(&response);
    data
}

fn expect_authen(reply: RTDecodedPacket) -> Result<RTAuthenReplyPacket> {
    match reply {
        RTDecodedPacket::AuthenReply(reply) => Ok(reply),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(packet: &RTDecodedPacket) -> RTError {
    RTError::UnexpectedPacket(format!("{:?} reply", packet.packet_type()))
}
