// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Frame codec of the cluster bus: a four byte big-endian length prefix
//! followed by one JSON encoded frame.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use codec::QoS;

use crate::error::{Error, ErrorKind};
use crate::message::Message;
use crate::types::NodeId;

/// Upper bound on a single frame; a larger prefix means a broken or
/// hostile peer.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Everything two broker nodes exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerFrame {
    /// First frame on every link, naming the sending node.
    Hello { node_id: NodeId },

    /// One subscription appeared on the sending node.
    SubscriptionAdded {
        client_id: String,
        filter: String,
        qos: QoS,
    },

    /// One subscription disappeared on the sending node.
    SubscriptionRemoved { client_id: String, filter: String },

    /// The full subscription table of the sending node, replacing any
    /// previously learned interest. Sent after (re)connect so a peer can
    /// rebuild its view after a partition.
    SubscriptionTable {
        entries: Vec<(String, String, QoS)>,
    },

    /// A publication forwarded for remote subscribers, tagged with its
    /// origin for loop suppression and deduplication.
    Publication { origin: NodeId, message: Message },
}

/// Read one frame.
///
/// # Errors
///
/// Returns error on socket failure, oversized prefix or malformed JSON.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<PeerFrame, Error> {
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(Error::from_string(
            ErrorKind::DecodeError,
            format!("cluster: Frame length {len} exceeds limit"),
        ));
    }
    let mut buf = vec![0; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Write one frame.
///
/// # Errors
///
/// Returns error on socket failure.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &PeerFrame,
) -> Result<(), Error> {
    let buf = serde_json::to_vec(frame)?;
    let len = u32::try_from(buf.len()).map_err(|_| {
        Error::new(ErrorKind::EncodeError, "cluster: Frame too large")
    })?;
    writer.write_u32(len).await?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let frame = PeerFrame::SubscriptionAdded {
            client_id: "c1".to_string(),
            filter: "a/+".to_string(),
            qos: QoS::AtLeastOnce,
        };
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, &frame).await.unwrap();
        let read = read_frame(&mut server).await.unwrap();
        match read {
            PeerFrame::SubscriptionAdded {
                client_id, filter, ..
            } => {
                assert_eq!(client_id, "c1");
                assert_eq!(filter, "a/+");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
