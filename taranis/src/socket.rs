// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket};

use crate::error::{Error, ErrorKind};

const LISTEN_BACKLOG: u32 = 1024;

/// Create a TCP listener with address reuse, so that a restarted broker
/// can rebind immediately.
///
/// # Errors
///
/// Returns error if the address is invalid or binding fails.
pub async fn new_tcp_listener(address: &str) -> Result<TcpListener, Error> {
    let addr: SocketAddr = address.parse().map_err(|err| {
        Error::from_string(
            ErrorKind::SocketError,
            format!("Invalid socket address: {address}, err: {err:?}"),
        )
    })?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}
