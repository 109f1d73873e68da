// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_tungstenite::{tungstenite::protocol::Message as WsMessage, WebSocketStream};

use crate::error::Error;

/// Each Stream represents a duplex socket connection to one client.
#[derive(Debug)]
pub enum Stream {
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
    Ws(Box<WebSocketStream<TcpStream>>),
    Wss(Box<WebSocketStream<TlsStream<TcpStream>>>),
}

impl Stream {
    /// Read bytes from the stream, appending to `buf`.
    ///
    /// Returns the number of bytes read; zero means the peer closed the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns error if the socket fails.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.read_buf(buf).await?),
            Self::Mqtts(tls_stream) => Ok(tls_stream.read_buf(buf).await?),
            Self::Ws(ws_stream) => {
                if let Some(msg) = ws_stream.next().await {
                    let data = msg?.into_data();
                    buf.extend_from_slice(&data);
                    Ok(data.len())
                } else {
                    Ok(0)
                }
            }
            Self::Wss(wss_stream) => {
                if let Some(msg) = wss_stream.next().await {
                    let data = msg?.into_data();
                    buf.extend_from_slice(&data);
                    Ok(data.len())
                } else {
                    Ok(0)
                }
            }
        }
    }

    /// Write the whole buffer to the stream.
    ///
    /// # Errors
    ///
    /// Returns error if the socket fails.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => {
                tcp_stream.write_all(buf).await?;
                Ok(buf.len())
            }
            Self::Mqtts(tls_stream) => {
                tls_stream.write_all(buf).await?;
                Ok(buf.len())
            }
            Self::Ws(ws_stream) => {
                ws_stream.send(WsMessage::binary(buf.to_vec())).await?;
                Ok(buf.len())
            }
            Self::Wss(wss_stream) => {
                wss_stream.send(WsMessage::binary(buf.to_vec())).await?;
                Ok(buf.len())
            }
        }
    }
}
