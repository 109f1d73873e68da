// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Session attach/detach, take-over, will delay and session expiry.

use codec::ReasonCode;

use super::{ClientHandle, ClientState, Dispatcher};
use crate::commands::{
    ConnectData, DispatcherToClusterCmd, DispatcherToListenerCmd, SessionAttachAck,
};
use crate::message::{Delivery, SessionState};
use crate::store::{self, StoredSession};
use crate::types::{unix_millis, SessionGid};

impl Dispatcher {
    /// Rebuild the client table and topic index from the session store,
    /// run once at startup. With a durable backend this is what carries
    /// persistent sessions across a broker restart.
    pub(super) async fn restore_sessions(&mut self) {
        let stored = match store::with_retry(self.retry_limit, || self.session_store.iterate())
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                log::error!("dispatcher: Failed to iterate session store: {err}");
                return;
            }
        };
        if stored.is_empty() {
            return;
        }

        let now = unix_millis();
        for record in stored {
            for subscription in &record.subscriptions {
                self.trie.insert(&record.client_id, subscription.clone());
            }
            let expire_at = (record.session_expiry != u32::MAX)
                .then(|| now + u64::from(record.session_expiry) * 1000);
            self.clients.insert(
                record.client_id.clone(),
                ClientState {
                    handle: None,
                    generation: 0,
                    session_expiry: record.session_expiry,
                    will: None,
                    expire_at,
                    will_at: None,
                },
            );
        }
        self.metrics.subscriptions = self.trie.len() as u64;
        log::info!("dispatcher: Restored {} persistent sessions", self.clients.len());
    }

    pub(super) async fn on_session_attach(&mut self, gid: SessionGid, connect: ConnectData) {
        let client_id = connect.client_id.clone();

        // If the client id represents a client already connected to the
        // broker, the existing connection is closed [MQTT-3.1.4-2]. The
        // attach completes once the old session has detached, so that its
        // in-flight state is persisted before the new connection resumes.
        if let Some(existing) = self.clients.get(&client_id) {
            if let Some(ClientHandle::Local(old_gid)) = existing.handle {
                log::info!("dispatcher: Take-over of client {client_id}");
                self.send_to_listener(
                    old_gid,
                    DispatcherToListenerCmd::Disconnect(
                        old_gid.session_id(),
                        ReasonCode::SessionTakenOver,
                    ),
                )
                .await;
                if let Some((stale_gid, _)) = self
                    .pending_attaches
                    .insert(client_id.clone(), (gid, connect))
                {
                    // A third connection raced in; the second one loses.
                    self.send_to_listener(
                        stale_gid,
                        DispatcherToListenerCmd::Disconnect(
                            stale_gid.session_id(),
                            ReasonCode::SessionTakenOver,
                        ),
                    )
                    .await;
                }
                return;
            }
        }
        self.finish_session_attach(gid, connect).await;
    }

    pub(super) async fn finish_session_attach(&mut self, gid: SessionGid, connect: ConnectData) {
        let client_id = connect.client_id.clone();
        let generation = self
            .clients
            .get(&client_id)
            .map_or(1, |existing| existing.generation + 1);

        let mut session_present = false;
        let mut resumed = None;
        let mut queued = Vec::new();

        if connect.clean_start {
            // Queued messages and subscriptions are dropped on clean-start
            // take-over.
            self.drop_session_data(&client_id).await;
        } else {
            match store::with_retry(self.retry_limit, || self.session_store.load(&client_id)).await
            {
                Ok(Some(stored)) => {
                    session_present = true;
                    // Rebuild the index after a broker restart; inserting
                    // an existing subscription is a no-op.
                    for subscription in &stored.subscriptions {
                        self.trie.insert(&client_id, subscription.clone());
                    }
                    resumed = Some(stored.state);
                    queued = self.load_queued(&client_id).await;
                }
                Ok(None) => {}
                Err(err) => {
                    log::error!("dispatcher: Failed to load session {client_id}: {err}");
                    self.send_to_listener(
                        gid,
                        DispatcherToListenerCmd::SessionAttachAck(
                            gid.session_id(),
                            SessionAttachAck {
                                session_present: false,
                                reason: ReasonCode::ServerUnavailable,
                                resumed: None,
                                queued: Vec::new(),
                            },
                        ),
                    )
                    .await;
                    return;
                }
            }
        }

        self.clients.insert(
            client_id.clone(),
            ClientState {
                handle: Some(ClientHandle::Local(gid)),
                generation,
                session_expiry: connect.session_expiry,
                will: connect.will,
                expire_at: None,
                will_at: None,
            },
        );
        self.gids.insert(gid, client_id.clone());
        self.metrics.sessions_connected += 1;
        self.persist_session(&client_id).await;

        self.send_to_listener(
            gid,
            DispatcherToListenerCmd::SessionAttachAck(
                gid.session_id(),
                SessionAttachAck {
                    session_present,
                    reason: ReasonCode::Success,
                    resumed,
                    queued,
                },
            ),
        )
        .await;
    }

    /// Drain the offline queue of a reconnecting client, dropping entries
    /// whose expiry deadline passed while they waited.
    async fn load_queued(&mut self, client_id: &str) -> Vec<Delivery> {
        let queued = store::with_retry(self.retry_limit, || self.queue_store.iterate(client_id))
            .await
            .unwrap_or_else(|err| {
                log::error!("dispatcher: Failed to load queue of {client_id}: {err}");
                Vec::new()
            });
        if let Err(err) =
            store::with_retry(self.retry_limit, || self.queue_store.clear(client_id)).await
        {
            log::error!("dispatcher: Failed to clear queue of {client_id}: {err}");
        }

        let now = unix_millis();
        let (fresh, expired): (Vec<Delivery>, Vec<Delivery>) = queued
            .into_iter()
            .partition(|delivery| !delivery.message.is_expired(now));
        if !expired.is_empty() {
            self.metrics.messages_dropped += expired.len() as u64;
            log::debug!(
                "dispatcher: Dropped {} expired queued messages of {client_id}",
                expired.len()
            );
        }
        fresh
    }

    pub(super) async fn on_session_detach(
        &mut self,
        gid: SessionGid,
        clean: bool,
        state: Option<SessionState>,
    ) {
        // A detach raced by a take-over was unlinked already.
        let Some(client_id) = self.gids.remove(&gid) else {
            log::debug!("dispatcher: Stale detach for {gid:?}");
            return;
        };
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };
        client.handle = None;
        self.metrics.sessions_connected = self.metrics.sessions_connected.saturating_sub(1);

        let now = unix_millis();
        let session_expiry = client.session_expiry;

        // On clean disconnect the will is discarded [MQTT-3.14.4-3]; on an
        // abnormal one it is published after the will delay.
        if clean {
            client.will = None;
        }

        if session_expiry == 0 {
            if let Some(will) = self.clients.get_mut(&client_id).and_then(|c| c.will.take()) {
                let message = will.into_message(&client_id);
                self.route_message(message, true).await;
            }
            self.remove_session(&client_id).await;
        } else {
            // Session persists; arm timers and save the in-flight state.
            let mut immediate_will = None;
            if let Some(client) = self.clients.get_mut(&client_id) {
                if let Some(will) = &client.will {
                    let delay = will.delay.min(session_expiry);
                    if delay == 0 {
                        immediate_will = client.will.take();
                    } else {
                        client.will_at = Some(now + u64::from(delay) * 1000);
                    }
                }
                if session_expiry != u32::MAX {
                    client.expire_at = Some(now + u64::from(session_expiry) * 1000);
                }
            }
            if let Some(will) = immediate_will {
                let message = will.into_message(&client_id);
                self.route_message(message, true).await;
            }

            if let Some(mut state) = state {
                // Messages which never hit the wire go back to the tail of
                // the offline queue in their original order.
                for delivery in state.queued.drain(..) {
                    if let Err(err) = store::with_retry(self.retry_limit, || {
                        self.queue_store.enqueue(&client_id, delivery.clone())
                    })
                    .await
                    {
                        log::error!("dispatcher: Failed to re-queue for {client_id}: {err}");
                    }
                }
                self.store_detached_state(&client_id, session_expiry, state)
                    .await;
            }
        }

        // A CONNECT waiting on this detach can proceed now.
        if let Some((new_gid, connect)) = self.pending_attaches.remove(&client_id) {
            self.finish_session_attach(new_gid, connect).await;
        }
    }

    async fn store_detached_state(
        &self,
        client_id: &str,
        session_expiry: u32,
        state: SessionState,
    ) {
        let subscriptions = self
            .trie
            .entries()
            .into_iter()
            .filter_map(|(owner, subscription)| (owner == client_id).then_some(subscription))
            .collect();
        let record = StoredSession {
            client_id: client_id.to_string(),
            session_expiry,
            subscriptions,
            state,
            updated_at: unix_millis(),
        };
        if let Err(err) =
            store::with_retry(self.retry_limit, || self.session_store.put(record.clone())).await
        {
            log::error!("dispatcher: Failed to store session {client_id}: {err}");
        }
    }

    /// Remove subscriptions, queue and stored record of one client.
    pub(super) async fn drop_session_data(&mut self, client_id: &str) {
        for filter in self.trie.remove_client(client_id) {
            self.notify_cluster(DispatcherToClusterCmd::SubscriptionRemoved {
                client_id: client_id.to_string(),
                filter,
            })
            .await;
        }
        if let Err(err) =
            store::with_retry(self.retry_limit, || self.session_store.delete(client_id)).await
        {
            log::error!("dispatcher: Failed to delete session {client_id}: {err}");
        }
        if let Err(err) =
            store::with_retry(self.retry_limit, || self.queue_store.clear(client_id)).await
        {
            log::error!("dispatcher: Failed to clear queue of {client_id}: {err}");
        }
    }

    /// Session is gone for good: drop data and forget the client.
    pub(super) async fn remove_session(&mut self, client_id: &str) {
        self.drop_session_data(client_id).await;
        self.clients.remove(client_id);
    }

    pub(super) async fn notify_cluster(&self, cmd: DispatcherToClusterCmd) {
        if let Some(cluster_sender) = &self.cluster_sender {
            if let Err(err) = cluster_sender.send(cmd).await {
                log::error!("dispatcher: Failed to notify cluster: {err:?}");
            }
        }
    }

    /// Fire due will and expiry timers. Invoked once per second.
    pub(super) async fn process_timers(&mut self, now: u64) {
        let due_wills: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, client)| client.will_at.is_some_and(|at| at <= now))
            .map(|(client_id, _)| client_id.clone())
            .collect();
        for client_id in due_wills {
            let will = self.clients.get_mut(&client_id).and_then(|client| {
                client.will_at = None;
                client.will.take()
            });
            if let Some(will) = will {
                log::info!("dispatcher: Publishing delayed will of {client_id}");
                let message = will.into_message(&client_id);
                self.route_message(message, true).await;
            }
        }

        let due_sessions: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, client)| {
                client.handle.is_none() && client.expire_at.is_some_and(|at| at <= now)
            })
            .map(|(client_id, _)| client_id.clone())
            .collect();
        for client_id in due_sessions {
            log::info!("dispatcher: Session {client_id} expired");
            self.metrics.sessions_expired += 1;
            self.remove_session(&client_id).await;
        }

        self.purge_expired_queues(now).await;
    }

    /// Drop queued messages whose expiry deadline passed while their
    /// session was away.
    async fn purge_expired_queues(&mut self, now: u64) {
        let offline: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, client)| client.handle.is_none())
            .map(|(client_id, _)| client_id.clone())
            .collect();
        for client_id in offline {
            let Ok(queued) =
                store::with_retry(self.retry_limit, || self.queue_store.iterate(&client_id)).await
            else {
                continue;
            };
            for delivery in queued {
                if delivery.message.is_expired(now) {
                    self.metrics.messages_dropped += 1;
                    if let Err(err) = store::with_retry(self.retry_limit, || {
                        self.queue_store.remove(&client_id, delivery.message.id)
                    })
                    .await
                    {
                        log::error!("dispatcher: Failed to drop expired message: {err}");
                    }
                }
            }
        }
    }
}
