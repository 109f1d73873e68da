// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Auth and ACL cmd handlers.

use codec::ReasonCode;

use super::Listener;
use crate::commands::{
    AclToListenerCmd, AuthToListenerCmd, ListenerToDispatcherCmd, ListenerToSessionCmd,
    SessionAttachAck,
};
use crate::error::Error;
use crate::types::SessionGid;

impl Listener {
    pub(super) async fn handle_auth_cmd(&mut self, cmd: AuthToListenerCmd) -> Result<(), Error> {
        match cmd {
            AuthToListenerCmd::ResponseAuth(gid, accepted) => {
                self.on_auth_response(gid, accepted).await
            }
        }
    }

    async fn on_auth_response(&mut self, gid: SessionGid, accepted: bool) -> Result<(), Error> {
        let session_id = gid.session_id();
        let Some(connect) = self.connecting_sessions.remove(&session_id) else {
            log::error!("listener: Auth response for unknown session {session_id}");
            return Ok(());
        };

        if accepted {
            // Hand the authenticated connection to the dispatcher, which
            // resolves take-over and session resumption.
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::SessionAttach(gid, connect))
                .await
                .map_err(Into::into)
        } else {
            log::warn!(
                "listener: CONNECT of {} refused by authentication",
                connect.client_id
            );
            self.session_clients.remove(&session_id);
            self.send_to_session(
                session_id,
                ListenerToSessionCmd::ConnectAck(SessionAttachAck {
                    session_present: false,
                    reason: ReasonCode::BadUserNameOrPassword,
                    resumed: None,
                    queued: Vec::new(),
                }),
            )
            .await
        }
    }

    pub(super) async fn handle_acl_cmd(&mut self, cmd: AclToListenerCmd) -> Result<(), Error> {
        match cmd {
            AclToListenerCmd::PublishResult {
                gid,
                packet_id,
                qos,
                allowed,
            } => {
                self.send_to_session(
                    gid.session_id(),
                    ListenerToSessionCmd::PublishAck {
                        packet_id,
                        qos,
                        accepted: allowed,
                    },
                )
                .await
            }
            AclToListenerCmd::SubscribeResult {
                gid,
                packet_id,
                entries,
            } => {
                // The dispatcher grants QoS for allowed entries and fills
                // reason codes for denied ones, keeping the order.
                self.dispatcher_sender
                    .send(ListenerToDispatcherCmd::Subscribe {
                        gid,
                        packet_id,
                        entries,
                    })
                    .await
                    .map_err(Into::into)
            }
        }
    }
}
