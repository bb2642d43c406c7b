//! TCP session coordinator around the [`Engine`](crate::Engine).

mod config;
mod events;
mod peers;
mod server;

pub use config::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_PORT, ServerConfig};
pub use events::{DisconnectReason, ServerEvent};
pub use peers::PeerInfo;
pub use server::{InvocationHandler, ServerHandle, TreeServer, connect, frame_codec};
