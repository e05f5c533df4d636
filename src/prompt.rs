// RATCHET
//
// A rust implementation of a TACACS+ Protocol client
// as defined by RFC8907 and related.
//
// (C) 2024 - T.J. Hampton
//

use std::fmt;

use zeroize::Zeroizing;

use crate::authen::RTAuthenReplyStatus;

/// Supplies answers during ASCII (interactive) authentication.
///
/// Calls may block on a human; the client runs them off the async
/// runtime's worker threads.
pub trait RTUserInterface: Send + Sync {
    /// `prompt` is the server's text, e.g. "Password:"; `no_echo` asks for
    /// the input to be hidden; `get_what` says whether a username, a
    /// password or generic data is wanted. `None` answers with an empty
    /// message.
    fn get_user_input(
        &self,
        prompt: &str,
        no_echo: bool,
        get_what: RTAuthenReplyStatus,
    ) -> Option<String>;

    /// The username collected so far, if any.
    fn username(&self) -> Option<String>;
}

/// Answers GETUSER and GETPASS from fixed credentials, so a PAP-style
/// login can be driven through an ASCII exchange.
pub struct RTPapInterface {
    username: String,
    password: Zeroizing<String>,
}

impl RTPapInterface {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: Zeroizing::new(password.to_owned()),
        }
    }
}

impl fmt::Debug for RTPapInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTPapInterface")
            .field("username", &self.username)
            .field("password", &"MASKED")
            .finish()
    }
}

impl RTUserInterface for RTPapInterface {
    fn get_user_input(
        &self,
        _prompt: &str,
        _no_echo: bool,
        get_what: RTAuthenReplyStatus,
    ) -> Option<String> {
        match get_what {
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETUSER => Some(self.username.clone()),
            RTAuthenReplyStatus::TAC_PLUS_AUTHEN_STATUS_GETPASS => {
                Some(self.password.as_str().to_owned())
            }
            // no canned answer for GETDATA
            _ => None,
        }
    }

    fn username(&self) -> Option<String> {
        Some(self.username.clone())
    }
}
