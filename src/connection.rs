// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

//! Owns one TACACS+ stream: serialised writes, the read/dispatch loop, the
//! session table, and shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::crypto::RTKey;
use crate::header::{RTHeader, TACP_BODY_MAX_LENGTH, TACP_HEADER_MAX_LENGTH};
use crate::packet::{RTDecodedPacket, RTPacketDirection};
use crate::session::{RTSession, RTSessionState, RTSessionStep};
use crate::{RTError, RTTACVersion, Result};

/// Which side of the conversation this end plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RTEndpointRole {
    /// Receives replies; sessions are registered by the caller.
    Client,
    /// Receives requests; unknown session ids open a stub session.
    Server,
}

type RTWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct RTConnection {
    key: RTKey,
    role: RTEndpointRole,
    peer: String,
    sessions: Mutex<HashMap<u32, RTSession>>,
    writer: tokio::sync::Mutex<Option<RTWriter>>,
    shutdown_tx: watch::Sender<bool>,
    closed_tx: watch::Sender<bool>,
    shut_down: AtomicBool,
    draining: AtomicBool,
}

impl std::fmt::Debug for RTConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTConnection")
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("shut_down", &self.shut_down)
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

impl RTConnection {
    /// Takes ownership of `stream` and spawns its read loop.
    pub fn start<S>(stream: S, key: RTKey, role: RTEndpointRole, peer: &str) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);
        let conn = Arc::new(Self {
            key,
            role,
            peer: peer.to_owned(),
            sessions: Mutex::new(HashMap::new()),
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            shutdown_tx,
            closed_tx,
            shut_down: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        });

        let span = info_span!("tacacs", peer = %peer, role = ?role);
        tokio::spawn(Arc::clone(&conn).read_loop(reader, shutdown_rx).instrument(span));
        conn
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u32, RTSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire) || *self.shutdown_tx.borrow()
    }

    fn accepting(&self) -> bool {
        !self.is_shutdown() && !self.draining.load(Ordering::Acquire)
    }

    /// Open and not waiting to close after a peer refused single-connect.
    pub fn is_reusable(&self) -> bool {
        // Waits out any dispatch that is still deciding whether to drain.
        let _table = self.table();
        self.accepting()
    }

    pub fn session_count(&self) -> usize {
        self.table().len()
    }

    /// Asks the read loop to stop. Every pending session ends with
    /// [`RTError::Shutdown`]. Safe to call any number of times.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Resolves once the read loop has closed the socket.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // Err only if the sender is gone, and it lives as long as self.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Adds a locally started session to the table.
    pub fn register_session(&self, session: RTSession) -> Result<()> {
        let mut table = self.table();
        if !self.accepting() {
            return Err(RTError::Shutdown);
        }
        if table.contains_key(&session.id()) {
            return Err(RTError::InvalidRequest(format!(
                "session id {:08x} already in use",
                session.id()
            )));
        }
        table.insert(session.id(), session);
        Ok(())
    }

    /// Drops a session the caller gave up on.
    pub fn forget_session(&self, id: u32) {
        if self.table().remove(&id).is_some() {
            debug!(session = id, "session abandoned by caller");
        }
        self.close_if_drained();
    }

    /// Sends the next packet of session `id`.
    pub async fn send_packet(
        &self,
        id: u32,
        version: RTTACVersion,
        packet: &RTDecodedPacket,
    ) -> Result<()> {
        let header = {
            let mut table = self.table();
            let session = table.get_mut(&id).ok_or(RTError::Shutdown)?;
            session.prepare_send(version)?
        };
        self.write_packet(header, packet).await
    }

    async fn write_packet(&self, mut header: RTHeader, packet: &RTDecodedPacket) -> Result<()> {
        let body = packet.serialize();
        header.tacp_hdr_length = u32::try_from(body.len())
            .map_err(|_| RTError::InvalidRequest("packet body too large".to_owned()))?;
        let payload = header.toggle_cipher(&self.key, &body);

        let mut frame = Vec::with_capacity(TACP_HEADER_MAX_LENGTH + payload.len());
        frame.extend_from_slice(&header.serialize());
        frame.extend_from_slice(&payload);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(RTError::Shutdown)?;
        let sent = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        drop(guard);

        match sent {
            Ok(()) => {
                debug!(header = %header, packet = %packet, "sent");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "write failed; shutting connection down");
                self.shutdown();
                Err(e.into())
            }
        }
    }

    /// Reads one frame and removes the pseudo-pad.
    async fn read_packet<R>(&self, reader: &mut R) -> Result<(RTHeader, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        let mut hdr_buf = [0u8; TACP_HEADER_MAX_LENGTH];
        reader.read_exact(&mut hdr_buf).await?;

        let body_len = RTHeader::raw_body_length(&hdr_buf);
        if body_len > TACP_BODY_MAX_LENGTH {
            warn!(body_len, "refusing oversized body");
            return Err(RTError::CorruptPacket);
        }
        let mut body = vec![0u8; usize::try_from(body_len).map_err(|_| RTError::CorruptPacket)?];
        reader.read_exact(&mut body).await?;

        let header = RTHeader::parse_init_header(&hdr_buf)?;
        let body = header.toggle_cipher(&self.key, &body);
        Ok((header, body))
    }

    async fn read_loop<R>(self: Arc<Self>, mut reader: R, mut shutdown_rx: watch::Receiver<bool>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        info!("connection open");
        let err = loop {
            if self.close_if_drained() {
                break RTError::ProtocolViolation(
                    "peer does not support single-connect mode".to_owned(),
                );
            }
            let next = tokio::select! {
                r = self.read_packet(&mut reader) => r,
                _ = shutdown_rx.wait_for(|stop| *stop) => break RTError::Shutdown,
            };
            let handled = match next {
                Ok((header, body)) => self.handle_packet(header, body).await,
                Err(e) => Err(e),
            };
            if let Err(e) = handled {
                break e;
            }
        };
        self.close(err).await;
    }

    /// True once a non-single-connect session has ended and nothing is
    /// left in flight.
    fn close_if_drained(&self) -> bool {
        let drained = self.draining.load(Ordering::Acquire) && self.table().is_empty();
        if drained {
            self.shutdown();
        }
        drained
    }

    async fn handle_packet(&self, header: RTHeader, body: Vec<u8>) -> Result<()> {
        let id = header.tacp_hdr_sesid;
        let reply = {
            let mut table = self.table();
            let known = table.contains_key(&id);
            let direction = match self.role {
                RTEndpointRole::Client => RTPacketDirection::FromServer,
                RTEndpointRole::Server => RTPacketDirection::FromClient { new_session: !known },
            };
            let packet = RTDecodedPacket::from_raw_packet(header.tacp_hdr_type, direction, &body)?;
            debug!(header = %header, packet = %packet, "received");

            if !known {
                match self.role {
                    RTEndpointRole::Client => {
                        warn!(session = id, "reply for unknown session dropped");
                        return Ok(());
                    }
                    RTEndpointRole::Server => {
                        table.insert(id, RTSession::new_server(id, header.tacp_hdr_type));
                    }
                }
            }
            let Some(session) = table.get_mut(&id) else {
                return Ok(());
            };

            match session.dispatch(&header, packet) {
                RTSessionStep::Continue | RTSessionStep::Ignored => None,
                RTSessionStep::Ended => {
                    self.end_session(&mut table, id);
                    None
                }
                RTSessionStep::Respond(reply_header, reply) => {
                    self.end_session(&mut table, id);
                    Some((reply_header, reply))
                }
            }
        };

        if let Some((reply_header, reply)) = reply {
            self.write_packet(reply_header, &reply).await?;
        }
        Ok(())
    }

    fn end_session(&self, table: &mut HashMap<u32, RTSession>, id: u32) {
        if let Some(session) = table.remove(&id) {
            debug!(session = id, state = ?session.state(), "session ended");
            // A session killed by a protocol error never agreed on anything.
            if session.state() != RTSessionState::EndedOk {
                return;
            }
            if !session.is_single_connect() && !self.draining.swap(true, Ordering::AcqRel) {
                info!("single-connect not agreed; closing after in-flight sessions");
            }
        }
    }

    /// Runs once, from the read loop.
    async fn close(&self, err: RTError) {
        let pending: Vec<RTSession> = {
            let mut table = self.table();
            self.shut_down.store(true, Ordering::Release);
            table.drain().map(|(_, s)| s).collect()
        };
        for mut session in pending {
            session.fail(err.clone());
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "socket already gone");
            }
        }
        match &err {
            RTError::Shutdown => info!("connection closed"),
            RTError::ProtocolViolation(_) => info!(reason = %err, "connection closed"),
            _ => warn!(error = %err, "connection closed"),
        }
        self.closed_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authen::{RTAuthenPacketService, RTAuthenReplyPacket, RTAuthenStartPacket};
    use crate::header::{RTTACType, TAC_PLUS_SINGLE_CONNECT_FLAG};
    use crate::session::{RTClientRole, RTSessionEvent};
    use tokio::sync::mpsc;

    async fn write_frame<W: AsyncWrite + Unpin>(
        w: &mut W,
        key: &RTKey,
        mut header: RTHeader,
        packet: &RTDecodedPacket,
    ) {
        let body = packet.serialize();
        header.tacp_hdr_length = u32::try_from(body.len()).unwrap();
        let mut frame = header.serialize().to_vec();
        frame.extend(header.toggle_cipher(key, &body));
        w.write_all(&frame).await.unwrap();
    }

    async fn read_frame<R: AsyncRead + Unpin>(r: &mut R, key: &RTKey) -> (RTHeader, Vec<u8>) {
        let mut hdr = [0u8; TACP_HEADER_MAX_LENGTH];
        r.read_exact(&mut hdr).await.unwrap();
        let header = RTHeader::parse_init_header(&hdr).unwrap();
        let mut body = vec![0u8; header.get_expected_packet_length()];
        r.read_exact(&mut body).await.unwrap();
        let body = header.toggle_cipher(key, &body);
        (header, body)
    }

    fn client_session(
        id: u32,
        flags: u8,
    ) -> (RTSession, mpsc::UnboundedReceiver<RTSessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = RTSession::new(
            id,
            RTTACType::TAC_PLUS_AUTHEN,
            flags,
            Box::new(RTClientRole::new(tx, true)),
        );
        (s, rx)
    }

    fn start_packet() -> RTDecodedPacket {
        RTDecodedPacket::AuthenStart(RTAuthenStartPacket::ascii_login(
            1,
            RTAuthenPacketService::TAC_PLUS_AUTHEN_SVC_LOGIN,
            "tty0",
            "",
        ))
    }

    #[tokio::test]
    async fn reply_reaches_the_right_session() {
        let key = RTKey::from("k");
        let (near, mut far) = tokio::io::duplex(4096);
        let conn = RTConnection::start(near, key.clone(), RTEndpointRole::Client, "duplex");

        let (s1, mut rx1) = client_session(1, TAC_PLUS_SINGLE_CONNECT_FLAG);
        let (s2, mut rx2) = client_session(2, TAC_PLUS_SINGLE_CONNECT_FLAG);
        conn.register_session(s1).unwrap();
        conn.register_session(s2).unwrap();
        let v = RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT;
        conn.send_packet(1, v, &start_packet()).await.unwrap();
        conn.send_packet(2, v, &start_packet()).await.unwrap();

        let (h1, _) = read_frame(&mut far, &key).await;
        let (h2, _) = read_frame(&mut far, &key).await;
        assert_eq!((h1.tacp_hdr_sesid, h1.tacp_hdr_seqno), (1, 1));
        assert_eq!((h2.tacp_hdr_sesid, h2.tacp_hdr_seqno), (2, 1));

        let pass = RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::get_success_packet());
        write_frame(&mut far, &key, h2.next(v).unwrap(), &pass).await;

        match rx2.recv().await {
            Some(RTSessionEvent::Ended(p)) => assert!(p.is_ok()),
            other => panic!("session 2 should end with PASS, got {other:?}"),
        }
        assert!(rx1.try_recv().is_err(), "session 1 untouched");
        assert_eq!(conn.session_count(), 1);
        assert!(conn.is_reusable());
    }

    #[tokio::test]
    async fn shutdown_fails_every_pending_session_once() {
        let key = RTKey::from("k");
        let (near, _far) = tokio::io::duplex(4096);
        let conn = RTConnection::start(near, key, RTEndpointRole::Client, "duplex");
        let (s1, mut rx1) = client_session(10, 0);
        let (s2, mut rx2) = client_session(11, 0);
        conn.register_session(s1).unwrap();
        conn.register_session(s2).unwrap();

        conn.shutdown();
        conn.shutdown();
        conn.closed().await;

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(rx.recv().await, Some(RTSessionEvent::Failed(RTError::Shutdown))));
            assert!(rx.recv().await.is_none(), "exactly one outcome");
        }
        assert!(conn.is_shutdown());
        let (s3, _rx3) = client_session(12, 0);
        assert!(matches!(conn.register_session(s3), Err(RTError::Shutdown)));
    }

    #[tokio::test]
    async fn garbage_from_peer_is_fatal_to_all_sessions() {
        let key = RTKey::from("right");
        let (near, mut far) = tokio::io::duplex(4096);
        let conn = RTConnection::start(near, key.clone(), RTEndpointRole::Client, "duplex");
        let (s, mut rx) = client_session(5, 0);
        conn.register_session(s).unwrap();
        conn.send_packet(5, RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT, &start_packet())
            .await
            .unwrap();
        let (h, _) = read_frame(&mut far, &key).await;

        // Obfuscated with the wrong key: the lengths won't add up.
        let reply = RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::get_fail_packet("nope", "bad"));
        write_frame(
            &mut far,
            &RTKey::from("wrong"),
            h.next(RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT).unwrap(),
            &reply,
        )
        .await;

        assert!(matches!(rx.recv().await, Some(RTSessionEvent::Failed(_))));
        conn.closed().await;
        assert!(conn.is_shutdown());
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let key = RTKey::from("k");
        let (near, mut far) = tokio::io::duplex(4096);
        let conn = RTConnection::start(near, key, RTEndpointRole::Client, "duplex");
        let (s, mut rx) = client_session(9, 0);
        conn.register_session(s).unwrap();

        let mut hdr = RTHeader::new(
            RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT,
            RTTACType::TAC_PLUS_AUTHEN,
            0,
            9,
        );
        hdr.tacp_hdr_seqno = 2;
        hdr.tacp_hdr_length = TACP_BODY_MAX_LENGTH + 1;
        far.write_all(&hdr.serialize()).await.unwrap();

        assert!(matches!(rx.recv().await, Some(RTSessionEvent::Failed(RTError::CorruptPacket))));
    }

    #[tokio::test]
    async fn unknown_session_reply_is_dropped() {
        let key = RTKey::from("k");
        let (near, mut far) = tokio::io::duplex(4096);
        let conn = RTConnection::start(near, key.clone(), RTEndpointRole::Client, "duplex");
        let mut stray = RTHeader::new(
            RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT,
            RTTACType::TAC_PLUS_AUTHEN,
            0,
            0xfeed,
        );
        stray.tacp_hdr_seqno = 2;
        let pass = RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::get_success_packet());
        write_frame(&mut far, &key, stray, &pass).await;

        // Still usable afterwards.
        let (s, mut rx) = client_session(3, TAC_PLUS_SINGLE_CONNECT_FLAG);
        conn.register_session(s).unwrap();
        conn.send_packet(3, RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT, &start_packet())
            .await
            .unwrap();
        let (h, _) = read_frame(&mut far, &key).await;
        write_frame(
            &mut far,
            &key,
            h.next(RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT).unwrap(),
            &pass,
        )
        .await;
        assert!(matches!(rx.recv().await, Some(RTSessionEvent::Ended(_))));
        assert!(!conn.is_shutdown());
    }

    #[tokio::test]
    async fn out_of_order_reply_leaves_connection_usable() {
        let key = RTKey::from("k");
        let v = RTTACVersion::TAC_PLUS_MINOR_VER_DEFAULT;
        let (near, mut far) = tokio::io::duplex(4096);
        let conn = RTConnection::start(near, key.clone(), RTEndpointRole::Client, "duplex");

        let (s, mut rx) = client_session(21, TAC_PLUS_SINGLE_CONNECT_FLAG);
        conn.register_session(s).unwrap();
        conn.send_packet(21, v, &start_packet()).await.unwrap();
        let (h, _) = read_frame(&mut far, &key).await;

        // Skips seq 2.
        let mut skipped = h.next(v).unwrap().next(v).unwrap();
        skipped.tacp_hdr_flags = TAC_PLUS_SINGLE_CONNECT_FLAG;
        let pass = RTDecodedPacket::AuthenReply(RTAuthenReplyPacket::get_success_packet());
        write_frame(&mut far, &key, skipped, &pass).await;
        assert!(matches!(
            rx.recv().await,
            Some(RTSessionEvent::Failed(RTError::ProtocolViolation(_)))
        ));

        // Another session still runs over the same socket.
        let (s2, mut rx2) = client_session(22, TAC_PLUS_SINGLE_CONNECT_FLAG);
        conn.register_session(s2).unwrap();
        conn.send_packet(22, v, &start_packet()).await.unwrap();
        let (h2, _) = read_frame(&mut far, &key).await;
        write_frame(&mut far, &key, h2.next(v).unwrap(), &pass).await;
        assert!(matches!(rx2.recv().await, Some(RTSessionEvent::Ended(_))));
        assert!(conn.is_reusable());
        assert!(!conn.is_shutdown());
    }
}
