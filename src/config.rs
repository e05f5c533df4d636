// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::crypto::RTKey;
use crate::{PORT_TACACS, RTError, Result};

/// One TACACS+ server and the secret shared with it.
#[derive(Clone, Debug)]
pub struct RTServerEndpoint {
    pub host: String,
    pub port: u16,
    pub key: RTKey,
}

impl RTServerEndpoint {
    pub fn new(host: &str, port: u16, key: RTKey) -> Self {
        Self {
            host: host.to_owned(),
            port,
            key,
        }
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for RTServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

#[derive(Clone, Debug)]
pub struct RTClientConfig {
    /// Tried in order until one accepts.
    pub servers: Vec<RTServerEndpoint>,
    pub connect_timeout: Duration,
    pub reply_timeout: Duration,
    /// Ask servers to keep the connection open across sessions.
    pub single_connect: bool,
    /// Send bodies in the clear. Testing only.
    pub unencrypted: bool,
}

impl Default for RTClientConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            connect_timeout: Duration::from_millis(5000),
            reply_timeout: Duration::from_millis(5000),
            single_connect: false,
            unencrypted: false,
        }
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

/// `host`, `host:port`, `[v6]`, `[v6]:port` or a bare v6 address.
fn split_host_port(entry: &str) -> (&str, u16) {
    let (host, port) = if let Some(rest) = entry.strip_prefix('[') {
        match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => (rest, None),
        }
    } else {
        match entry.split_once(':') {
            // more than one colon: an unbracketed v6 address
            Some((_, tail)) if tail.contains(':') => (entry, None),
            Some((host, port)) => (host, Some(port)),
            None => (entry, None),
        }
    };

    let port = match port.map(str::parse::<u16>) {
        Some(Ok(p)) => p,
        Some(Err(_)) | None => {
            debug!(entry, port = PORT_TACACS, "no usable port given; using default");
            PORT_TACACS
        }
    };
    (host, port)
}

impl RTClientConfig {
    pub fn new(servers: Vec<RTServerEndpoint>) -> Self {
        Self {
            servers,
            ..Self::default()
        }
    }

    /// Builds the server list from a host list and a key list, each
    /// separated by commas and/or whitespace. Hosts beyond the last key
    /// reuse it.
    pub fn from_lists(hosts: &str, keys: &str) -> Result<Self> {
        let keys: Vec<&str> = split_list(keys).collect();
        let Some(last_key) = keys.last() else {
            return Err(RTError::Config("no shared secret given".to_owned()));
        };

        let servers: Vec<RTServerEndpoint> = split_list(hosts)
            .enumerate()
            .map(|(i, entry)| {
                let (host, port) = split_host_port(entry);
                let key = keys.get(i).unwrap_or(last_key);
                RTServerEndpoint::new(host, port, RTKey::from(*key))
            })
            .collect();

        if servers.is_empty() {
            return Err(RTError::Config("no TACACS+ server given".to_owned()));
        }
        Ok(Self::new(servers))
    }

    pub fn with_single_connect(mut self, single_connect: bool) -> Self {
        self.single_connect = single_connect;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, reply: Duration) -> Self {
        self.connect_timeout = connect;
        self.reply_timeout = reply;
        self
    }

    pub fn with_unencrypted(mut self, unencrypted: bool) -> Self {
        self.unencrypted = unencrypted;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosts_pair_with_keys_and_reuse_the_last() {
        let cfg = RTClientConfig::from_lists("a.example, b.example:4949 c", "k1,k2").unwrap();
        let got: Vec<(&str, u16, &[u8])> = cfg
            .servers
            .iter()
            .map(|s| (s.host.as_str(), s.port, s.key.expose()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a.example", 49, &b"k1"[..]),
                ("b.example", 4949, &b"k2"[..]),
                ("c", 49, &b"k2"[..]),
            ]
        );
    }

    #[test]
    fn ipv6_forms() {
        assert_eq!(split_host_port("[::1]:1049"), ("::1", 1049));
        assert_eq!(split_host_port("[fe80::1]"), ("fe80::1", 49));
        assert_eq!(split_host_port("fe80::1"), ("fe80::1", 49));
        let ep = RTServerEndpoint::new("::1", 49, RTKey::from("k"));
        assert_eq!(ep.address(), "[::1]:49");
    }

    #[test]
    fn bad_port_falls_back_to_default() {
        assert_eq!(split_host_port("host:notaport"), ("host", 49));
        assert_eq!(split_host_port("host:70000"), ("host", 49));
    }

    #[test]
    fn empty_lists_are_config_errors() {
        assert!(matches!(RTClientConfig::from_lists("", "k"), Err(RTError::Config(_))));
        assert!(matches!(RTClientConfig::from_lists("h", " , "), Err(RTError::Config(_))));
    }

    #[test]
    fn defaults() {
        let cfg = RTClientConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_millis(5000));
        assert_eq!(cfg.reply_timeout, Duration::from_millis(5000));
        assert!(!cfg.single_connect);
        assert!(!cfg.unencrypted);
    }

    #[test]
    fn debug_does_not_leak_keys() {
        let cfg = RTClientConfig::from_lists("h", "hunter2").unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
