// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Control packets of MQTT 5.0.
//!
//! The wire layout extends 3.1.1 with a property block in most variable
//! headers and reason codes in every acknowledgement. PINGREQ and PINGRESP
//! are unchanged and reused from the v3 module.

mod auth;
mod connect;
mod connect_ack;
mod disconnect;
mod publish;
mod publish_ack;
mod publish_complete;
mod publish_received;
mod publish_release;
mod subscribe;
mod subscribe_ack;
mod unsubscribe;
mod unsubscribe_ack;

pub use crate::v3::{PingRequestPacket, PingResponsePacket};
pub use auth::AuthPacket;
pub use connect::{ConnectPacket, Will};
pub use connect_ack::ConnectAckPacket;
pub use disconnect::DisconnectPacket;
pub use publish::PublishPacket;
pub use publish_ack::PublishAckPacket;
pub use publish_complete::PublishCompletePacket;
pub use publish_received::PublishReceivedPacket;
pub use publish_release::PublishReleasePacket;
pub use subscribe::{RetainHandling, SubscribePacket, SubscribeTopic, SubscriptionOptions};
pub use subscribe_ack::SubscribeAckPacket;
pub use unsubscribe::UnsubscribePacket;
pub use unsubscribe_ack::UnsubscribeAckPacket;
