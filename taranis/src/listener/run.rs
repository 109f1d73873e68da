// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles commands and new connections.

use tokio::sync::mpsc;

use super::{Listener, CHANNEL_CAPACITY};
use crate::session::{Session, SessionConfig};
use crate::stream::Stream;
use crate::types::SessionId;

impl Listener {
    /// # Panics
    ///
    /// Raises panic if channel receivers were taken already.
    pub async fn run_loop(&mut self) -> ! {
        // Take ownership of mpsc receivers or else tokio select will raise
        // borrow errors.
        let mut session_receiver = self
            .session_receiver
            .take()
            .expect("Invalid session receiver");
        let mut dispatcher_receiver = self
            .dispatcher_receiver
            .take()
            .expect("Invalid dispatcher receiver");
        let mut auth_receiver = self.auth_receiver.take().expect("Invalid auth receiver");
        let mut acl_receiver = self.acl_receiver.take().expect("Invalid acl receiver");

        loop {
            tokio::select! {
                Ok(stream) = self.accept() => {
                    self.new_connection(stream);
                }

                Some(cmd) = session_receiver.recv() => {
                    if let Err(err) = self.handle_session_cmd(cmd).await {
                        log::error!("listener: handle session cmd failed: {err:?}");
                    }
                }

                Some(cmd) = dispatcher_receiver.recv() => {
                    if let Err(err) = self.handle_dispatcher_cmd(cmd).await {
                        log::error!("listener: handle dispatcher cmd failed: {err:?}");
                    }
                }

                Some(cmd) = auth_receiver.recv() => {
                    if let Err(err) = self.handle_auth_cmd(cmd).await {
                        log::error!("listener: handle auth cmd failed: {err:?}");
                    }
                }

                Some(cmd) = acl_receiver.recv() => {
                    if let Err(err) = self.handle_acl_cmd(cmd).await {
                        log::error!("listener: handle acl cmd failed: {err:?}");
                    }
                }
            }
        }
    }

    pub(super) fn next_session_id(&mut self) -> SessionId {
        self.current_session_id += 1;
        self.current_session_id
    }

    fn new_connection(&mut self, stream: Stream) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let session_id = self.next_session_id();
        self.session_senders.insert(session_id, sender);

        let session_config = SessionConfig::new(
            self.config.keep_alive(),
            self.config.connect_timeout(),
            self.config.allow_empty_client_id(),
            self.config.maximum_inflight_messages(),
            self.general.maximum_queued_messages(),
            self.general.queue_overflow_policy(),
            self.general.retransmit_interval(),
            self.general.message_size_limit(),
            self.general.maximum_qos(),
            self.security.disconnect_on_denied_publish(),
        );
        let session = Session::new(
            session_id,
            session_config,
            stream,
            self.session_sender.clone(),
            receiver,
        );
        log::info!("listener: New connection, session id: {session_id}");
        tokio::spawn(session.run_loop());
    }
}
