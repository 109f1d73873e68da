// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Initialize broker apps.

use tokio::sync::mpsc;

use super::{ServerContext, CHANNEL_CAPACITY};
use crate::acl::AclApp;
use crate::auth::AuthApp;
use crate::bridge::BridgeApp;
use crate::cluster::ClusterApp;
use crate::connectors::{ConnectorHandle, LogConnector};
use crate::dispatcher::{Dispatcher, DispatcherStores};
use crate::error::Error;
use crate::listener::Listener;
use crate::store::{
    MemoryArchiveStore, MemoryQueueStore, MemoryRetainedStore, MemorySessionStore,
};
use crate::types::ListenerId;

impl ServerContext {
    /// Bind listeners and spawn every app.
    ///
    /// # Errors
    ///
    /// Returns error if a listener cannot bind or an app fails to
    /// initialize.
    pub async fn init_modules(&mut self) -> Result<(), Error> {
        let general = self.config.general().clone();
        let security = self.config.security().clone();
        let storage = self.config.storage().clone();
        let cluster_config = self.config.cluster().clone();

        let (listener_to_dispatcher_sender, listener_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (listener_to_auth_sender, listener_to_auth_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (listener_to_acl_sender, listener_to_acl_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (cluster_to_dispatcher_sender, cluster_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (dispatcher_to_cluster_sender, dispatcher_to_cluster_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (connector_sender, connector_receiver) = mpsc::channel(CHANNEL_CAPACITY);

        // Bind listeners first so config errors surface before anything
        // is spawned.
        let mut dispatcher_to_listener_senders = Vec::new();
        let mut auth_to_listener_senders = Vec::new();
        let mut acl_to_listener_senders = Vec::new();
        let mut listeners = Vec::new();
        self.bound_addresses.clear();
        for (index, listener_config) in self.config.listeners().iter().enumerate() {
            let id = ListenerId::try_from(index).unwrap_or_default() + 1;
            let (dispatcher_sender, dispatcher_receiver) = mpsc::channel(CHANNEL_CAPACITY);
            dispatcher_to_listener_senders.push((id, dispatcher_sender));
            let (auth_sender, auth_receiver) = mpsc::channel(CHANNEL_CAPACITY);
            auth_to_listener_senders.push((id, auth_sender));
            let (acl_sender, acl_receiver) = mpsc::channel(CHANNEL_CAPACITY);
            acl_to_listener_senders.push((id, acl_sender));

            let listener = Listener::bind(
                id,
                listener_config.clone(),
                general.clone(),
                security.clone(),
                listener_to_dispatcher_sender.clone(),
                dispatcher_receiver,
                listener_to_auth_sender.clone(),
                auth_receiver,
                listener_to_acl_sender.clone(),
                acl_receiver,
            )
            .await?;
            self.bound_addresses.push(listener.local_address()?);
            listeners.push(listener);
        }

        let mut auth_app = AuthApp::new(
            &security,
            auth_to_listener_senders,
            listener_to_auth_receiver,
        )?;
        tokio::spawn(async move {
            auth_app.run_loop().await;
        });

        let mut acl_app = AclApp::new(
            &security,
            acl_to_listener_senders,
            listener_to_acl_receiver,
        )?;
        tokio::spawn(async move {
            acl_app.run_loop().await;
        });

        let stores = DispatcherStores {
            sessions: Box::new(MemorySessionStore::new()),
            queues: Box::new(MemoryQueueStore::new()),
            retained: Box::new(MemoryRetainedStore::new()),
            archive: storage
                .archive()
                .then(|| -> Box<dyn crate::store::ArchiveStore> {
                    Box::new(MemoryArchiveStore::new(storage.archive_capacity()))
                }),
            archive_retention: storage.archive_retention(),
        };
        let cluster_sender = cluster_config
            .enabled()
            .then(|| dispatcher_to_cluster_sender.clone());
        let mut dispatcher = Dispatcher::new(
            cluster_config.node_id().to_string(),
            general,
            storage.retry_limit(),
            stores,
            dispatcher_to_listener_senders,
            listener_to_dispatcher_receiver,
            cluster_sender,
            cluster_to_dispatcher_receiver,
            connector_receiver,
        );
        tokio::spawn(async move {
            dispatcher.run_loop().await;
        });

        if cluster_config.enabled() {
            let mut cluster_app = ClusterApp::new(
                cluster_config,
                cluster_to_dispatcher_sender,
                dispatcher_to_cluster_receiver,
            );
            tokio::spawn(async move {
                if let Err(err) = cluster_app.run_loop().await {
                    log::error!("cluster: App failed: {err}");
                }
            });
        }

        let connector_handle = ConnectorHandle::new(connector_sender);
        for bridge_config in self.config.bridges() {
            let bridge = BridgeApp::new(bridge_config.clone(), connector_handle.clone());
            tokio::spawn(bridge.run_loop());
        }
        for connector_config in self.config.connectors() {
            let connector = LogConnector::new(
                &connector_config.name,
                &connector_config.filter,
                connector_handle.clone(),
            );
            tokio::spawn(connector.run_loop());
        }

        for mut listener in listeners {
            tokio::spawn(async move {
                listener.run_loop().await;
            });
        }

        log::info!("taranis: All modules initialized");
        Ok(())
    }
}
