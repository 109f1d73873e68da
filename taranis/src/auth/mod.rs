// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The authentication app, deciding whether a client may connect.

use std::collections::HashMap;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{AuthToListenerCmd, ListenerToAuthCmd};
use crate::config::Security;
use crate::error::{Error, ErrorKind};
use crate::types::{ListenerId, SessionGid};

pub mod file_auth;
pub mod pwd;

use file_auth::FileAuth;

#[derive(Debug)]
pub struct AuthApp {
    allow_anonymous: bool,
    file_auth: Option<FileAuth>,

    listener_senders: HashMap<ListenerId, Sender<AuthToListenerCmd>>,
    listener_receiver: Receiver<ListenerToAuthCmd>,
}

impl AuthApp {
    /// Create the app from the security config section.
    ///
    /// # Errors
    ///
    /// Returns error if the password file cannot be loaded.
    pub fn new(
        security: &Security,
        listener_senders: Vec<(ListenerId, Sender<AuthToListenerCmd>)>,
        listener_receiver: Receiver<ListenerToAuthCmd>,
    ) -> Result<Self, Error> {
        let file_auth = match security.password_file() {
            Some(password_file) => Some(FileAuth::new(password_file).map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!("Invalid password file: {password_file:?}, err: {err:?}"),
                )
            })?),
            None => None,
        };

        Ok(Self {
            allow_anonymous: security.allow_anonymous(),
            file_auth,
            listener_senders: listener_senders.into_iter().collect(),
            listener_receiver,
        })
    }

    pub async fn run_loop(&mut self) -> ! {
        loop {
            if let Some(cmd) = self.listener_receiver.recv().await {
                if let Err(err) = self.handle_listener_cmd(cmd).await {
                    log::error!("auth: Failed to handle listener cmd: {err:?}");
                }
            }
        }
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToAuthCmd) -> Result<(), Error> {
        match cmd {
            ListenerToAuthCmd::RequestAuth(gid, client_id, username, password) => {
                let accepted = self.may_connect(username.as_deref(), password.as_deref());
                if !accepted {
                    log::warn!("auth: Rejected connect of client {client_id}");
                }
                self.send_response(gid, accepted).await
            }
        }
    }

    /// The connect predicate: anonymous clients pass when allowed, named
    /// users must match the password file.
    fn may_connect(&self, username: Option<&str>, password: Option<&[u8]>) -> bool {
        match (username, &self.file_auth) {
            (None, _) => self.allow_anonymous,
            (Some(_), None) => self.allow_anonymous,
            (Some(username), Some(file_auth)) => {
                file_auth.is_match(username, password.unwrap_or_default())
            }
        }
    }

    async fn send_response(&mut self, gid: SessionGid, accepted: bool) -> Result<(), Error> {
        if let Some(listener_sender) = self.listener_senders.get(&gid.listener_id()) {
            listener_sender
                .send(AuthToListenerCmd::ResponseAuth(gid, accepted))
                .await
                .map_err(Into::into)
        } else {
            Err(Error::from_string(
                ErrorKind::ChannelError,
                format!("auth: No listener sender with id {}", gid.listener_id()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Security;
    use tokio::sync::mpsc;

    fn new_app(security: &Security) -> AuthApp {
        let (_tx, rx) = mpsc::channel(1);
        AuthApp::new(security, Vec::new(), rx).unwrap()
    }

    #[test]
    fn test_anonymous_allowed_by_default() {
        let app = new_app(&Security::default());
        assert!(app.may_connect(None, None));
        assert!(app.may_connect(Some("alice"), Some(b"pw")));
    }
}
