// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The session runtime.
//!
//! One `Session` actor owns one network connection. It decodes client
//! packets, drives the QoS handshakes in both directions, applies flow
//! control against the negotiated send window and enforces keep alive,
//! connect and retransmit timers. All session state is mutated from its
//! own task; the listener reaches it through a bounded command channel.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};

use codec::{v5, EncodePacket, Packet, PacketId, ProtocolLevel, ReasonCode};

use crate::commands::{ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::{Error, ErrorKind};
use crate::message::{Delivery, InflightMessage, Message, SessionState};
use crate::stream::Stream;
use crate::types::SessionId;

mod client;
mod client_v5;
mod config;
mod flow;
mod listener;

pub use config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Stream accepted, no CONNECT yet.
    Invalid,

    /// CONNECT forwarded, waiting for the attach verdict.
    Connecting,

    Connected,

    Disconnected,
}

/// A connected (or connecting) client session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    stream: Stream,

    status: Status,
    protocol_level: ProtocolLevel,
    client_id: String,
    /// Set when the broker generated the client id itself.
    assigned_client_id: Option<String>,
    clean_start: bool,

    /// True after a DISCONNECT with reason 0x00; suppresses the will.
    clean_disconnect: bool,

    /// Effective keep alive in seconds, already stretched to 1.5x.
    keep_alive_secs: u64,
    last_activity: Instant,
    created_at: Instant,

    /// Remaining send window; QoS 1/2 transmissions stop at zero.
    send_quota: u16,
    next_packet_id: PacketId,

    /// Server to client handshakes in progress, in send order.
    inflight: VecDeque<InflightMessage>,

    /// Messages awaiting their first transmission attempt.
    queue: VecDeque<Delivery>,

    /// Client to server QoS 2 messages awaiting PUBREL.
    receiving: HashMap<PacketId, Message>,

    /// Publishes awaiting their ACL verdict, by packet id.
    pending_acl: HashMap<PacketId, Message>,

    /// QoS 0 publishes awaiting their ACL verdict, in arrival order.
    pending_acl_qos0: VecDeque<Message>,

    sender: Sender<SessionToListenerCmd>,
    receiver: Receiver<ListenerToSessionCmd>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        stream: Stream,
        sender: Sender<SessionToListenerCmd>,
        receiver: Receiver<ListenerToSessionCmd>,
    ) -> Self {
        let send_quota = config.maximum_inflight_messages();
        let keep_alive_secs = stretch_keep_alive(config.keep_alive());
        Self {
            id,
            config,
            stream,

            status: Status::Invalid,
            protocol_level: ProtocolLevel::V311,
            client_id: String::new(),
            assigned_client_id: None,
            clean_start: true,
            clean_disconnect: false,

            keep_alive_secs,
            last_activity: Instant::now(),
            created_at: Instant::now(),

            send_quota,
            next_packet_id: 1,
            inflight: VecDeque::new(),
            queue: VecDeque::new(),
            receiving: HashMap::new(),
            pending_acl: HashMap::new(),
            pending_acl_qos0: VecDeque::new(),

            sender,
            receiver,
        }
    }

    pub async fn run_loop(mut self) {
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        let mut timer = tokio::time::interval(Duration::from_secs(1));

        while self.status != Status::Disconnected {
            tokio::select! {
                read_result = self.stream.read_buf(&mut buf) => {
                    match read_result {
                        Ok(0) => {
                            log::info!("session: Connection closed by peer, {}", self.id);
                            break;
                        }
                        Ok(_) => {
                            if let Err(err) = self.drain_packets(&mut buf).await {
                                log::error!("session: {}: {err}", self.id);
                                self.on_protocol_error().await;
                                break;
                            }
                        }
                        Err(err) => {
                            log::info!("session: Stream error, {}: {err}", self.id);
                            break;
                        }
                    }
                }
                Some(cmd) = self.receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("session: Failed to handle listener cmd: {err}");
                        break;
                    }
                }
                _ = timer.tick() => {
                    if let Err(err) = self.on_timer_tick().await {
                        log::error!("session: Timer handling failed: {err}");
                        break;
                    }
                }
            }
        }

        // Ship the surviving state to the dispatcher; it decides between
        // persisting and dropping based on the session expiry.
        let state = (!self.client_id.is_empty()).then(|| self.take_state());
        if let Err(err) = self
            .sender
            .send(SessionToListenerCmd::Disconnect {
                session_id: self.id,
                clean: self.clean_disconnect,
                state,
            })
            .await
        {
            log::error!(
                "session: Failed to send disconnect cmd, id: {}, err: {:?}",
                self.id,
                err
            );
        }
    }

    /// Decode and handle every complete packet in `buf`, leaving a
    /// partial trailing packet for the next read.
    async fn drain_packets(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        loop {
            let Some(packet_len) = codec::utils::peek_packet_length(buf)? else {
                return Ok(());
            };
            if buf.len() < packet_len {
                return Ok(());
            }
            let packet: Vec<u8> = buf.drain(..packet_len).collect();
            self.last_activity = Instant::now();
            self.handle_client_packet(&packet).await?;
            if self.status == Status::Disconnected {
                return Ok(());
            }
        }
    }

    async fn on_timer_tick(&mut self) -> Result<(), Error> {
        // If the server does not receive a CONNECT packet within a
        // reasonable amount of time it SHOULD close the connection.
        if matches!(self.status, Status::Invalid | Status::Connecting)
            && self.config.connect_timeout() > 0
            && self.created_at.elapsed().as_secs() > u64::from(self.config.connect_timeout())
        {
            log::info!("session: Connect timeout, {}", self.id);
            self.status = Status::Disconnected;
            return Ok(());
        }

        // If the keep alive is non-zero and no control packet arrives
        // within one and a half times the keep alive period, the
        // connection is closed as if the network had failed
        // [MQTT-3.1.2-24].
        if self.status == Status::Connected
            && self.keep_alive_secs > 0
            && self.last_activity.elapsed().as_secs() > self.keep_alive_secs
        {
            log::warn!("session: Keep alive elapsed, disconnecting {}", self.id);
            if self.protocol_level == ProtocolLevel::V5 {
                let packet = v5::DisconnectPacket::new(ReasonCode::KeepAliveTimeout);
                let _ret = self.send(packet).await;
            }
            self.status = Status::Disconnected;
            return Ok(());
        }

        if self.status == Status::Connected {
            self.retransmit_due().await?;
        }
        Ok(())
    }

    async fn on_protocol_error(&mut self) {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::DisconnectPacket::new(ReasonCode::MalformedPacket);
            let _ret = self.send(packet).await;
        }
        self.status = Status::Disconnected;
    }

    /// Hand the persistent session state over for storage.
    fn take_state(&mut self) -> SessionState {
        SessionState {
            inflight: self.inflight.drain(..).collect(),
            receiving: self.receiving.drain().collect(),
            queued: self.queue.drain(..).collect(),
        }
    }

    async fn send<P: EncodePacket + Packet>(&mut self, packet: P) -> Result<(), Error> {
        if self.status == Status::Disconnected {
            return Err(Error::from_string(
                ErrorKind::SendError,
                format!(
                    "session: Cannot send {:?} on a closed stream",
                    packet.packet_type()
                ),
            ));
        }
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.stream.write(&buf).await.map(drop)?;
        Ok(())
    }

    /// Close the connection from the server side.
    pub(super) async fn send_disconnect(&mut self, reason: ReasonCode) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let packet = v5::DisconnectPacket::new(reason);
            self.send(packet).await?;
        }
        self.status = Status::Disconnected;
        Ok(())
    }

    async fn send_to_listener(&mut self, cmd: SessionToListenerCmd) -> Result<(), Error> {
        self.sender.send(cmd).await.map_err(Into::into)
    }
}

/// One and a half times the client keep alive, in whole seconds.
fn stretch_keep_alive(keep_alive: u16) -> u64 {
    u64::from(keep_alive) * 3 / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stretch_keep_alive() {
        assert_eq!(stretch_keep_alive(60), 90);
        assert_eq!(stretch_keep_alive(0), 0);
        assert_eq!(stretch_keep_alive(1), 1);
    }
}
