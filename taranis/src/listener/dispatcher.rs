// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Dispatcher cmd handlers.

use codec::QoS;

use super::Listener;
use crate::commands::{DispatcherToListenerCmd, ListenerToSessionCmd};
use crate::error::Error;

impl Listener {
    pub(super) async fn handle_dispatcher_cmd(
        &mut self,
        cmd: DispatcherToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            DispatcherToListenerCmd::SessionAttachAck(session_id, ack) => {
                self.connecting_sessions.remove(&session_id);
                self.send_to_session(session_id, ListenerToSessionCmd::ConnectAck(ack))
                    .await
            }
            DispatcherToListenerCmd::SubscribeAck {
                session_id,
                packet_id,
                reason_codes,
                retained,
            } => {
                self.send_to_session(
                    session_id,
                    ListenerToSessionCmd::SubscribeAck {
                        packet_id,
                        reason_codes,
                        retained,
                    },
                )
                .await
            }
            DispatcherToListenerCmd::UnsubscribeAck {
                session_id,
                packet_id,
                reason_codes,
            } => {
                self.send_to_session(
                    session_id,
                    ListenerToSessionCmd::UnsubscribeAck {
                        packet_id,
                        reason_codes,
                    },
                )
                .await
            }
            DispatcherToListenerCmd::Deliver(session_id, delivery) => {
                // A full session inbox drops QoS 0 messages instead of
                // stalling the router; guaranteed traffic waits for room.
                if delivery.qos == QoS::AtMostOnce {
                    if let Some(session_sender) = self.session_senders.get(&session_id) {
                        if session_sender
                            .try_send(ListenerToSessionCmd::Deliver(delivery))
                            .is_err()
                        {
                            log::warn!(
                                "listener: Dropped QoS 0 message for busy session {session_id}"
                            );
                        }
                        return Ok(());
                    }
                    return Err(Error::session_error(session_id));
                }
                self.send_to_session(session_id, ListenerToSessionCmd::Deliver(delivery))
                    .await
            }
            DispatcherToListenerCmd::Disconnect(session_id, reason) => {
                self.send_to_session(session_id, ListenerToSessionCmd::Disconnect(reason))
                    .await
            }
        }
    }
}
