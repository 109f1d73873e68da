// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

use crate::commands::{
    AclToListenerCmd, AuthToListenerCmd, ClusterToDispatcherCmd, ConnectorToDispatcherCmd,
    DispatcherToClusterCmd, DispatcherToListenerCmd, ListenerToAclCmd, ListenerToAuthCmd,
    ListenerToDispatcherCmd, ListenerToSessionCmd, SessionToListenerCmd,
};
use crate::types::SessionId;

/// Represent the types of errors in broker apps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error occurred while performing I/O.
    IoError,

    /// Malformed packet, reserved bits or impossible protocol state.
    ProtocolError,

    /// Packet encode error.
    EncodeError,

    /// Packet decode error.
    DecodeError,

    /// Send packet error.
    SendError,

    /// Socket stream error.
    SocketError,

    /// Cert files error.
    CertError,

    /// Invalid config entries.
    ConfigError,

    /// Failed to init log module.
    LoggerError,

    /// Invalid password file entry.
    FormatError,

    /// Invalid pid or pid file.
    PidError,

    /// CONNECT refused or an action denied by the ACL.
    AuthError,

    /// Queue full, packet id exhausted or storage unavailable.
    ResourceError,

    /// Storage backend failed after the retry budget was spent.
    StorageError,

    /// Session with id not found.
    SessionNotFound,

    /// mpsc channel error.
    ChannelError,

    /// Invariant violation; the offending session is closed.
    InternalError,
}

#[derive(Clone, Debug)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    pub const fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn session_error(session_id: SessionId) -> Self {
        Self::from_string(
            ErrorKind::SessionNotFound,
            format!("Session with id {session_id} not found"),
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("IoError {err}"))
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_string(ErrorKind::SocketError, format!("Websocket error: {err}"))
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::from_string(ErrorKind::CertError, format!("Rustls error: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::from_string(ErrorKind::EncodeError, format!("{err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::DecodeError, format!("{err:?}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::from_string(ErrorKind::FormatError, format!("Json error: {err}"))
    }
}

impl From<crate::store::StorageError> for Error {
    fn from(err: crate::store::StorageError) -> Self {
        Self::from_string(ErrorKind::StorageError, format!("{err}"))
    }
}

macro_rules! convert_send_error {
    ($cmd_type: ident) => {
        impl From<mpsc::error::SendError<$cmd_type>> for Error {
            fn from(err: mpsc::error::SendError<$cmd_type>) -> Self {
                Self::from_string(
                    ErrorKind::ChannelError,
                    format!("{} channel error: {}", stringify!($cmd_type), err),
                )
            }
        }
    };
}

convert_send_error!(AclToListenerCmd);
convert_send_error!(AuthToListenerCmd);
convert_send_error!(ClusterToDispatcherCmd);
convert_send_error!(ConnectorToDispatcherCmd);
convert_send_error!(DispatcherToClusterCmd);
convert_send_error!(DispatcherToListenerCmd);
convert_send_error!(ListenerToAclCmd);
convert_send_error!(ListenerToAuthCmd);
convert_send_error!(ListenerToDispatcherCmd);
convert_send_error!(ListenerToSessionCmd);
convert_send_error!(SessionToListenerCmd);
