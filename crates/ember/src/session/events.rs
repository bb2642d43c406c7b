use std::net::SocketAddr;

use crate::dispatch::TreeEvent;
use crate::glow::{TreePath, Value};
use crate::matrix::MatrixChange;
use crate::subscribers::PeerId;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Listening {
        addr: SocketAddr,
    },
    ConnectionOpened {
        peer: PeerId,
        addr: SocketAddr,
    },
    ConnectionClosed {
        peer: PeerId,
        addr: SocketAddr,
        reason: DisconnectReason,
    },
    RequestReceived {
        peer: PeerId,
        addr: SocketAddr,
        path: Option<TreePath>,
    },
    ValueChanged {
        path: TreePath,
        identifier: Option<String>,
        value: Value,
        origin: Option<SocketAddr>,
    },
    MatrixChanged {
        path: TreePath,
        target: u32,
        sources: Vec<u32>,
    },
    MatrixConnect {
        path: TreePath,
        target: u32,
        sources: Vec<u32>,
    },
    MatrixDisconnect {
        path: TreePath,
        target: u32,
        sources: Vec<u32>,
    },
    Invoked {
        path: TreePath,
        invocation_id: Option<u32>,
        success: bool,
    },
    Error {
        addr: Option<SocketAddr>,
        message: String,
    },
}

impl ServerEvent {
    pub(crate) fn from_tree(event: TreeEvent, origin: Option<SocketAddr>) -> Self {
        match event {
            TreeEvent::ValueChanged {
                path,
                identifier,
                value,
            } => ServerEvent::ValueChanged {
                path,
                identifier,
                value,
                origin,
            },
            TreeEvent::Matrix {
                path,
                change,
                target,
                sources,
            } => match change {
                MatrixChange::Changed => ServerEvent::MatrixChanged {
                    path,
                    target,
                    sources,
                },
                MatrixChange::Connected => ServerEvent::MatrixConnect {
                    path,
                    target,
                    sources,
                },
                MatrixChange::Disconnected => ServerEvent::MatrixDisconnect {
                    path,
                    target,
                    sources,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    Shutdown,
    Error,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "disconnected",
            DisconnectReason::Shutdown => "closed on shutdown",
            DisconnectReason::Error => "dropped after a stream error",
        }
    }
}
