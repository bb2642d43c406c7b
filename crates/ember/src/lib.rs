pub mod ber;
pub mod dispatch;
pub mod error;
pub mod glow;
pub mod matrix;
pub mod session;
pub mod subscribers;
pub mod tree;

pub use ber::DecodeError;
pub use dispatch::{Addressing, Dispatch, Engine, PendingInvocation, TreeEvent};
pub use error::Error;
pub use glow::{
    Access, Address, Command, CommandKind, ConnectionDisposition, ConnectionOperation, Element,
    ElementKind, Fragment, Invocation, InvocationResult, MatrixBody, MatrixConnection,
    MatrixContents, MatrixType, NodeContents, ParameterContents, Root, TreePath, Value,
};
pub use matrix::{AppliedConnection, MatrixChange, apply_connections};
pub use session::{
    DisconnectReason, InvocationHandler, PeerInfo, ServerConfig, ServerEvent, ServerHandle,
    TreeServer,
};
pub use subscribers::{PeerId, PeerSink, SubscriberRegistry};
pub use tree::{NodeDefinition, NodeId, Tree, TreeNode};
