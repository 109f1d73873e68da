// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Connector contracts.
//!
//! A connector is any in-process component which feeds messages into the
//! router or consumes routed messages through a pseudo-session. Pseudo-
//! sessions live in the topic index like real ones but their deliveries go
//! through an mpsc channel instead of a socket, bypassing wire encoding
//! and window accounting.

use tokio::sync::mpsc::{self, Receiver, Sender};

use codec::{QoS, TopicFilter};

use crate::commands::ConnectorToDispatcherCmd;
use crate::error::Error;
use crate::message::{Delivery, Message, Subscription};

/// Inbox size of one pseudo-session; overflow drops deliveries.
pub const CONNECTOR_CHANNEL_CAPACITY: usize = 256;

/// Handle to the router for connectors, bridges and loggers.
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    dispatcher_sender: Sender<ConnectorToDispatcherCmd>,
}

impl ConnectorHandle {
    #[must_use]
    pub const fn new(dispatcher_sender: Sender<ConnectorToDispatcherCmd>) -> Self {
        Self { dispatcher_sender }
    }

    /// Inject a message into the router.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is gone.
    pub async fn publish(&self, message: Message) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ConnectorToDispatcherCmd::Publish(message))
            .await
            .map_err(Into::into)
    }

    /// Register a pseudo-session and return its delivery channel.
    ///
    /// # Errors
    ///
    /// Returns error if the filter is invalid or the dispatcher is gone.
    pub async fn subscribe_internal(
        &self,
        client_id: &str,
        filter: &str,
        qos: QoS,
    ) -> Result<Receiver<Delivery>, Error> {
        let (sender, receiver) = mpsc::channel(CONNECTOR_CHANNEL_CAPACITY);
        self.subscribe_internal_with_sender(client_id, filter, qos, sender)
            .await?;
        Ok(receiver)
    }

    /// Register one more filter on an existing pseudo-session channel.
    ///
    /// # Errors
    ///
    /// Returns error if the filter is invalid or the dispatcher is gone.
    pub async fn subscribe_internal_with_sender(
        &self,
        client_id: &str,
        filter: &str,
        qos: QoS,
        sender: Sender<Delivery>,
    ) -> Result<(), Error> {
        let filter = TopicFilter::parse(filter).map_err(|err| {
            Error::from_string(
                crate::error::ErrorKind::ConfigError,
                format!("connector: Invalid filter: {err}"),
            )
        })?;
        self.subscribe_internal_subscription(client_id, Subscription::new(filter, qos), sender)
            .await
    }

    /// Register a fully specified subscription on an existing channel,
    /// used when flags like no-local matter.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is gone.
    pub async fn subscribe_internal_subscription(
        &self,
        client_id: &str,
        subscription: Subscription,
        sender: Sender<Delivery>,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ConnectorToDispatcherCmd::SubscribeInternal {
                client_id: client_id.to_string(),
                subscription,
                sender,
            })
            .await
            .map_err(Into::into)
    }

    /// Remove one filter of a pseudo-session.
    ///
    /// # Errors
    ///
    /// Returns error if the dispatcher is gone.
    pub async fn unsubscribe_internal(&self, client_id: &str, filter: &str) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ConnectorToDispatcherCmd::UnsubscribeInternal {
                client_id: client_id.to_string(),
                filter: filter.to_string(),
            })
            .await
            .map_err(Into::into)
    }
}

/// A minimal egress connector: logs every message matching a filter.
///
/// Mostly a template showing how device and archive connectors consume
/// the pseudo-session contract.
pub struct LogConnector {
    client_id: String,
    filter: String,
    handle: ConnectorHandle,
}

impl LogConnector {
    #[must_use]
    pub fn new(name: &str, filter: &str, handle: ConnectorHandle) -> Self {
        Self {
            client_id: format!("$connector/{name}"),
            filter: filter.to_string(),
            handle,
        }
    }

    pub async fn run_loop(self) {
        let mut receiver = match self
            .handle
            .subscribe_internal(&self.client_id, &self.filter, QoS::AtMostOnce)
            .await
        {
            Ok(receiver) => receiver,
            Err(err) => {
                log::error!("connector: Failed to subscribe {}: {err}", self.client_id);
                return;
            }
        };
        while let Some(delivery) = receiver.recv().await {
            log::info!(
                "connector: {} <- {} ({} bytes)",
                self.client_id,
                delivery.message.topic,
                delivery.message.payload.len()
            );
        }
    }
}
