// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Initialize and bind a listener.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::{rustls, TlsAcceptor};

use super::{Listener, Protocol, CHANNEL_CAPACITY};
use crate::commands::{
    AclToListenerCmd, AuthToListenerCmd, DispatcherToListenerCmd, ListenerToAclCmd,
    ListenerToAuthCmd, ListenerToDispatcherCmd,
};
use crate::config;
use crate::error::{Error, ErrorKind};
use crate::socket::new_tcp_listener;
use crate::stream::Stream;
use crate::types::ListenerId;

impl Listener {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: ListenerId,
        protocol: Protocol,
        listener_config: config::Listener,
        general: config::General,
        security: config::Security,
        // dispatcher module
        dispatcher_sender: Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToListenerCmd>,
        // auth module
        auth_sender: Sender<ListenerToAuthCmd>,
        auth_receiver: Receiver<AuthToListenerCmd>,
        // acl module
        acl_sender: Sender<ListenerToAclCmd>,
        acl_receiver: Receiver<AclToListenerCmd>,
    ) -> Self {
        let (session_sender, session_receiver) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            id,
            protocol,
            config: listener_config,
            general,
            security,
            current_session_id: 0,

            session_senders: HashMap::new(),
            session_clients: HashMap::new(),
            connecting_sessions: HashMap::new(),

            session_sender,
            session_receiver: Some(session_receiver),

            dispatcher_sender,
            dispatcher_receiver: Some(dispatcher_receiver),

            auth_sender,
            auth_receiver: Some(auth_receiver),

            acl_sender,
            acl_receiver: Some(acl_receiver),
        }
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
        rustls_pemfile::certs(&mut BufReader::new(File::open(path)?))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("Failed to load cert file at {path:?}, got: {err:?}"),
                )
            })
    }

    fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
        rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("Failed to load key file at {path:?}, got: {err:?}"),
                )
            })?
            .ok_or_else(|| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("No private key found in {path:?}"),
                )
            })
    }

    fn get_tls_acceptor(listener_config: &config::Listener) -> Result<TlsAcceptor, Error> {
        let cert_file = listener_config
            .cert_file()
            .ok_or_else(|| Error::new(ErrorKind::CertError, "cert_file is required"))?;
        let key_file = listener_config
            .key_file()
            .ok_or_else(|| Error::new(ErrorKind::CertError, "key_file is required"))?;

        let certs = Self::load_certs(cert_file)?;
        let key = Self::load_key(key_file)?;

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::CertError,
                    format!("Failed to init ServerConfig, got {err:?}"),
                )
            })?;
        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }

    /// Bind to the configured socket address.
    ///
    /// # Errors
    ///
    /// Returns error if binding fails or TLS material cannot be loaded.
    #[allow(clippy::too_many_arguments)]
    pub async fn bind(
        id: ListenerId,
        listener_config: config::Listener,
        general: config::General,
        security: config::Security,
        // dispatcher
        dispatcher_sender: Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToListenerCmd>,
        // auth
        auth_sender: Sender<ListenerToAuthCmd>,
        auth_receiver: Receiver<AuthToListenerCmd>,
        // acl
        acl_sender: Sender<ListenerToAclCmd>,
        acl_receiver: Receiver<AclToListenerCmd>,
    ) -> Result<Self, Error> {
        let address = listener_config.address().to_string();
        let protocol = match listener_config.protocol() {
            config::Protocol::Mqtt => {
                log::info!("bind mqtt://{address}");
                Protocol::Mqtt(new_tcp_listener(&address).await?)
            }
            config::Protocol::Mqtts => {
                log::info!("bind mqtts://{address}");
                let acceptor = Self::get_tls_acceptor(&listener_config)?;
                Protocol::Mqtts(new_tcp_listener(&address).await?, acceptor)
            }
            config::Protocol::Ws => {
                log::info!("bind ws://{address}");
                Protocol::Ws(new_tcp_listener(&address).await?)
            }
            config::Protocol::Wss => {
                log::info!("bind wss://{address}");
                let acceptor = Self::get_tls_acceptor(&listener_config)?;
                Protocol::Wss(new_tcp_listener(&address).await?, acceptor)
            }
        };
        Ok(Self::new(
            id,
            protocol,
            listener_config,
            general,
            security,
            dispatcher_sender,
            dispatcher_receiver,
            auth_sender,
            auth_receiver,
            acl_sender,
            acl_receiver,
        ))
    }

    /// The local address the listener is bound to, useful when the config
    /// asked for an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns error if the socket is gone.
    pub fn local_address(&self) -> Result<std::net::SocketAddr, Error> {
        let listener = match &self.protocol {
            Protocol::Mqtt(listener)
            | Protocol::Mqtts(listener, _)
            | Protocol::Ws(listener)
            | Protocol::Wss(listener, _) => listener,
        };
        Ok(listener.local_addr()?)
    }

    pub(super) async fn accept(&mut self) -> Result<Stream, Error> {
        use tokio_tungstenite::tungstenite::handshake::server as ws_server;
        let listener_path = self.config.path().map(ToString::to_string);
        let check_ws_path = move |request: &ws_server::Request,
                                  response: ws_server::Response|
              -> Result<ws_server::Response, ws_server::ErrorResponse> {
            let path = request.uri().path();
            match &listener_path {
                Some(expected) if expected != path => {
                    let resp = http::Response::builder()
                        .status(http::StatusCode::NOT_FOUND)
                        .body(None)
                        .unwrap_or_default();
                    Err(resp)
                }
                _ => Ok(response),
            }
        };

        match &mut self.protocol {
            Protocol::Mqtt(listener) => {
                let (tcp_stream, _address) = listener.accept().await?;
                Ok(Stream::Mqtt(tcp_stream))
            }
            Protocol::Mqtts(listener, acceptor) => {
                let (tcp_stream, _address) = listener.accept().await?;
                let tls_stream = acceptor.accept(tcp_stream).await?;
                Ok(Stream::Mqtts(Box::new(tls_stream)))
            }
            Protocol::Ws(listener) => {
                let (tcp_stream, _address) = listener.accept().await?;
                let ws_stream =
                    tokio_tungstenite::accept_hdr_async(tcp_stream, check_ws_path).await?;
                Ok(Stream::Ws(Box::new(ws_stream)))
            }
            Protocol::Wss(listener, acceptor) => {
                let (tcp_stream, _address) = listener.accept().await?;
                let tls_stream = acceptor.accept(tcp_stream).await?;
                let ws_stream =
                    tokio_tungstenite::accept_hdr_async(tls_stream, check_ws_path).await?;
                Ok(Stream::Wss(Box::new(ws_stream)))
            }
        }
    }
}
