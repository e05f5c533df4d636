// RATCHET
//
// A rust implementation of a TACACS+ Protocol "server"
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

use std::env;
use std::process::exit;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ratchet::{RTConnection, RTEndpointRole, RTKey};

struct RTServerSettings {
    hostport: String,
    key: Option<RTKey>,
}

impl RTServerSettings {
    /// Environment first, then the test switch on the command line.
    fn from_env() -> Self {
        let mut settings = Self {
            hostport: String::from("[::]:49"),
            key: None,
        };
        for (key, value) in env::vars() {
            if key == "RATCHET_CUST_HOSTPORT" {
                settings.hostport = value;
            } else if key == "RATCHET_KEY" && !value.is_empty() {
                settings.key = Some(RTKey::from(value));
            }
        }

        if env::args().any(|x| x == "--add-insecure-test-credential-do-not-use") {
            warn!("using the built-in test secret; never do this in production");
            settings.key = Some(RTKey::from("testing123"));
        }
        settings
    }
}

#[tokio::main]
pub async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("starting");
    let settings = RTServerSettings::from_env();
    let Some(key) = settings.key else {
        error!("no shared secret; set RATCHET_KEY");
        exit(1);
    };

    let listener = match TcpListener::bind(settings.hostport.as_str()).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, hostport = %settings.hostport, "could not bind; check permissions");
            exit(1);
        }
    };
    info!(hostport = %settings.hostport, "NOWLISTENING");

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let handler_tx = Arc::clone(&stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_tx.send_replace(true);
    }) {
        warn!(error = %e, "couldn't install Ctrl-C handler, proceeding anyway");
    }

    let live = accept_loop(listener, key, stop_rx).await;
    drop(stop_tx);

    info!(connections = live.len(), "shutting down");
    for conn in &live {
        conn.shutdown();
    }
    for conn in &live {
        conn.closed().await;
    }
}

/// Serves each accepted socket with the stub until `stop_rx` turns true.
/// A dropped sender means nobody can ask us to stop, not that we should.
async fn accept_loop(
    listener: TcpListener,
    key: RTKey,
    mut stop_rx: watch::Receiver<bool>,
) -> Vec<Arc<RTConnection>> {
    let mut live: Vec<Arc<RTConnection>> = Vec::new();
    loop {
        let accepted = tokio::select! {
            a = listener.accept() => a,
            Ok(_) = stop_rx.wait_for(|stop| *stop) => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                live.retain(|c| !c.is_shutdown());
                let peer = peer.to_string();
                info!(peer = %peer, "accepted");
                live.push(RTConnection::start(
                    stream,
                    key.clone(),
                    RTEndpointRole::Server,
                    &peer,
                ));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
    live
}
