// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Bound endpoint of one listener.
pub enum Protocol {
    Mqtt(TcpListener),
    Mqtts(TcpListener, TlsAcceptor),
    Ws(TcpListener),
    Wss(TcpListener, TlsAcceptor),
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mqtt(..) => write!(f, "Mqtt"),
            Self::Mqtts(..) => write!(f, "Mqtts"),
            Self::Ws(..) => write!(f, "Ws"),
            Self::Wss(..) => write!(f, "Wss"),
        }
    }
}
