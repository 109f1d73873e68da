// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Session cmd handlers.

use codec::{PacketId, QoS, TopicName};

use super::Listener;
use crate::commands::{
    ConnectData, ListenerToAclCmd, ListenerToAuthCmd, ListenerToDispatcherCmd,
    ListenerToSessionCmd, SessionToListenerCmd,
};
use crate::error::Error;
use crate::message::{Message, SessionState};
use crate::types::{SessionGid, SessionId};

impl Listener {
    pub(super) async fn handle_session_cmd(
        &mut self,
        cmd: SessionToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            SessionToListenerCmd::Connect(session_id, connect) => {
                self.on_session_connect(session_id, connect).await
            }
            SessionToListenerCmd::CheckPublish {
                session_id,
                topic,
                packet_id,
                qos,
            } => {
                self.on_session_check_publish(session_id, topic, packet_id, qos)
                    .await
            }
            SessionToListenerCmd::Publish(session_id, message) => {
                self.on_session_publish(session_id, message).await
            }
            SessionToListenerCmd::Subscribe {
                session_id,
                packet_id,
                subscriptions,
            } => {
                self.on_session_subscribe(session_id, packet_id, subscriptions)
                    .await
            }
            SessionToListenerCmd::Unsubscribe {
                session_id,
                packet_id,
                filters,
            } => {
                self.on_session_unsubscribe(session_id, packet_id, filters)
                    .await
            }
            SessionToListenerCmd::Disconnect {
                session_id,
                clean,
                state,
            } => self.on_session_disconnect(session_id, clean, state).await,
        }
    }

    async fn on_session_connect(
        &mut self,
        session_id: SessionId,
        connect: ConnectData,
    ) -> Result<(), Error> {
        let gid = SessionGid::new(self.id, session_id);
        self.session_clients
            .insert(session_id, connect.client_id.clone());

        let cmd = ListenerToAuthCmd::RequestAuth(
            gid,
            connect.client_id.clone(),
            connect.username.clone(),
            connect.password.clone(),
        );
        self.connecting_sessions.insert(session_id, connect);
        self.auth_sender.send(cmd).await.map_err(Into::into)
    }

    async fn on_session_check_publish(
        &mut self,
        session_id: SessionId,
        topic: TopicName,
        packet_id: PacketId,
        qos: QoS,
    ) -> Result<(), Error> {
        let Some(client_id) = self.session_clients.get(&session_id).cloned() else {
            return Err(Error::session_error(session_id));
        };
        self.acl_sender
            .send(ListenerToAclCmd::CheckPublish {
                gid: SessionGid::new(self.id, session_id),
                client_id,
                topic,
                packet_id,
                qos,
            })
            .await
            .map_err(Into::into)
    }

    async fn on_session_publish(
        &mut self,
        session_id: SessionId,
        message: Message,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Publish(
                SessionGid::new(self.id, session_id),
                message,
            ))
            .await
            .map_err(Into::into)
    }

    async fn on_session_subscribe(
        &mut self,
        session_id: SessionId,
        packet_id: PacketId,
        subscriptions: Vec<crate::message::Subscription>,
    ) -> Result<(), Error> {
        let Some(client_id) = self.session_clients.get(&session_id).cloned() else {
            return Err(Error::session_error(session_id));
        };
        self.acl_sender
            .send(ListenerToAclCmd::CheckSubscribe {
                gid: SessionGid::new(self.id, session_id),
                client_id,
                packet_id,
                subscriptions,
            })
            .await
            .map_err(Into::into)
    }

    async fn on_session_unsubscribe(
        &mut self,
        session_id: SessionId,
        packet_id: PacketId,
        filters: Vec<String>,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Unsubscribe {
                gid: SessionGid::new(self.id, session_id),
                packet_id,
                filters,
            })
            .await
            .map_err(Into::into)
    }

    async fn on_session_disconnect(
        &mut self,
        session_id: SessionId,
        clean: bool,
        state: Option<SessionState>,
    ) -> Result<(), Error> {
        log::info!("listener: Session {session_id} disconnected");
        if self.session_senders.remove(&session_id).is_none() {
            log::error!("listener: No session sender with id: {session_id}");
        }
        self.connecting_sessions.remove(&session_id);
        let had_client = self.session_clients.remove(&session_id).is_some();
        if !had_client {
            // The stream went away before CONNECT; nothing to detach.
            return Ok(());
        }
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionDetach {
                gid: SessionGid::new(self.id, session_id),
                clean,
                state,
            })
            .await
            .map_err(Into::into)
    }

    pub(super) async fn send_to_session(
        &mut self,
        session_id: SessionId,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        if let Some(session_sender) = self.session_senders.get(&session_id) {
            session_sender.send(cmd).await.map_err(Into::into)
        } else {
            Err(Error::session_error(session_id))
        }
    }
}
