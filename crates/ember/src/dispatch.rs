use std::collections::BTreeMap;

use crate::error::Error;
use crate::glow::{
    Address, Command, CommandKind, ConnectionOperation, Element, ElementKind, Fragment,
    Invocation, InvocationResult, MatrixBody, MatrixConnection, Root, TreePath, Value,
};
use crate::matrix::{self, MatrixChange};
use crate::subscribers::{PeerId, PeerSink, SubscriberRegistry};
use crate::tree::{NodeId, Tree};

/// How the request addressed its target. Replies use the same form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Hierarchical,
    Qualified,
}

/// Changes to the tree that listeners outside the engine care about.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    ValueChanged {
        path: TreePath,
        identifier: Option<String>,
        value: Value,
    },
    Matrix {
        path: TreePath,
        change: MatrixChange,
        target: u32,
        sources: Vec<u32>,
    },
}

/// Invocation on a function element that the engine hands back to the
/// caller for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInvocation {
    pub path: TreePath,
    pub invocation: Invocation,
}

/// Result of handling one request or operator action.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Path of the element the request resolved to.
    pub path: Option<TreePath>,
    pub reply: Option<Root>,
    pub events: Vec<TreeEvent>,
    pub invocation: Option<PendingInvocation>,
    /// Number of subscribers the change was fanned out to.
    pub notified: usize,
}

enum Target<'a> {
    Command(&'a Command),
    Payload(&'a Element),
}

/// Owns the live tree and its subscriptions and applies requests to them.
#[derive(Debug, Default)]
pub struct Engine {
    tree: Tree,
    subscribers: SubscriberRegistry,
}

impl Engine {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            subscribers: SubscriberRegistry::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    pub fn subscribers_mut(&mut self) -> &mut SubscriberRegistry {
        &mut self.subscribers
    }

    /// Handles one decoded request from `origin`. Changes are fanned out
    /// through `sink` before this returns; the reply is left to the
    /// caller.
    pub fn handle_request(
        &mut self,
        origin: PeerId,
        request: &Root,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        let Some(first) = request.elements().first() else {
            return Ok(Dispatch::default());
        };

        match first {
            Fragment::Command(command) => {
                let root = self.tree.root();
                self.handle_command(origin, root, command, Addressing::Hierarchical)
            }
            Fragment::Element(element) => match &element.address {
                Address::Path(path) => {
                    let id = self
                        .tree
                        .element_by_path(path)
                        .ok_or_else(|| Error::unknown(path))?;
                    let target = match element.children().first() {
                        Some(Fragment::Command(command)) => Target::Command(command),
                        _ => Target::Payload(element),
                    };
                    self.handle_target(origin, id, target, Addressing::Qualified, sink)
                }
                Address::Number(_) => {
                    let (path, target) = walk(element)?;
                    let id = self
                        .tree
                        .element_by_path(&path)
                        .ok_or_else(|| Error::unknown(&path))?;
                    self.handle_target(origin, id, target, Addressing::Hierarchical, sink)
                }
            },
        }
    }

    fn handle_target(
        &mut self,
        origin: PeerId,
        id: NodeId,
        target: Target<'_>,
        addressing: Addressing,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        match target {
            Target::Command(command) => self.handle_command(origin, id, command, addressing),
            Target::Payload(payload) => match &payload.kind {
                ElementKind::Matrix(body) if body.connections.is_some() => {
                    let requested: Vec<MatrixConnection> = body
                        .connections
                        .iter()
                        .flat_map(|c| c.values().cloned())
                        .collect();
                    self.apply_matrix(Some(origin), id, &requested, addressing, sink)
                }
                ElementKind::Parameter(Some(contents)) if contents.value.is_some() => {
                    let value = contents.value.clone().unwrap_or(Value::Null);
                    self.apply_value(Some(origin), id, value, addressing, sink)
                }
                _ => Err(Error::InvalidRequestFormat(
                    "expected a command, a parameter value or matrix connections",
                )),
            },
        }
    }

    fn handle_command(
        &mut self,
        origin: PeerId,
        id: NodeId,
        command: &Command,
        addressing: Addressing,
    ) -> Result<Dispatch, Error> {
        let path = self.tree.path(id);
        let mut dispatch = Dispatch {
            path: Some(path.clone()),
            ..Dispatch::default()
        };

        match command.kind {
            CommandKind::GetDirectory => {
                dispatch.reply = Some(match addressing {
                    Addressing::Hierarchical => self.tree.response(id),
                    Addressing::Qualified => self.tree.qualified_response(id),
                });
                self.auto_subscribe(origin, id);
            }
            CommandKind::Subscribe => self.subscribers.subscribe(path, origin),
            CommandKind::Unsubscribe => self.subscribers.unsubscribe(&path, origin),
            CommandKind::Invoke => {
                let invocation = command
                    .invocation
                    .clone()
                    .ok_or(Error::InvalidRequestFormat("invoke without invocation"))?;
                if matches!(self.tree.kind(id), Some(ElementKind::Function(_))) {
                    dispatch.invocation = Some(PendingInvocation { path, invocation });
                } else {
                    let id = invocation.id.unwrap_or_default();
                    dispatch.reply = Some(Root::InvocationResult(InvocationResult::failure(id)));
                }
            }
            CommandKind::Other(number) => return Err(Error::InvalidCommand(number)),
        }
        Ok(dispatch)
    }

    /// A directory query subscribes the caller to the element, or to its
    /// children, when they carry values that change.
    fn auto_subscribe(&mut self, origin: PeerId, id: NodeId) {
        let watchable = |kind: Option<&ElementKind>| {
            matches!(kind, Some(ElementKind::Parameter(_) | ElementKind::Matrix(_)))
                && !kind.is_some_and(ElementKind::is_stream)
        };

        if watchable(self.tree.kind(id)) {
            self.subscribers.subscribe(self.tree.path(id), origin);
            return;
        }
        let children: Vec<NodeId> = self.tree.children(id).collect();
        for child in children {
            if watchable(self.tree.kind(child)) {
                self.subscribers.subscribe(self.tree.path(child), origin);
            }
        }
    }

    fn apply_value(
        &mut self,
        origin: Option<PeerId>,
        id: NodeId,
        value: Value,
        addressing: Addressing,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        let path = self.tree.path(id);
        let contents = match self.tree.kind_mut(id) {
            Some(ElementKind::Parameter(Some(contents))) => contents,
            Some(ElementKind::Parameter(None)) => return Err(Error::MissingContents(path)),
            _ => return Err(Error::InvalidRequestFormat("value written to a non-parameter")),
        };

        let mut dispatch = Dispatch {
            path: Some(path.clone()),
            ..Dispatch::default()
        };

        if contents.effective_access().can_write() {
            contents.value = Some(value.clone());
            dispatch.events.push(TreeEvent::ValueChanged {
                path: path.clone(),
                identifier: contents.identifier.clone(),
                value,
            });
            let response = self.tree.response(id);
            dispatch.notified = self.subscribers.notify(&path, &response, origin, sink);
        } else {
            log::warn!("Ignoring write to read-only parameter {}", path);
        }

        if origin.is_some() {
            dispatch.reply = Some(match addressing {
                Addressing::Hierarchical => self.tree.response(id),
                Addressing::Qualified => self.tree.qualified_response(id),
            });
        }
        Ok(dispatch)
    }

    fn apply_matrix(
        &mut self,
        origin: Option<PeerId>,
        id: NodeId,
        requested: &[MatrixConnection],
        addressing: Addressing,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        let path = self.tree.path(id);
        let Some(body) = self.tree.kind_mut(id).and_then(ElementKind::matrix_mut) else {
            return Err(Error::InvalidRequestFormat("connections sent to a non-matrix"));
        };
        let applied = matrix::apply_connections(body, &path, requested)?;

        let mut dispatch = Dispatch {
            path: Some(path.clone()),
            ..Dispatch::default()
        };
        let mut connections = BTreeMap::new();
        for result in applied {
            if let Some(change) = result.change {
                dispatch.events.push(TreeEvent::Matrix {
                    path: path.clone(),
                    change,
                    target: result.connection.target,
                    sources: result.requested,
                });
            }
            connections.insert(result.connection.target, result.connection);
        }

        let body = MatrixBody {
            connections: Some(connections),
            ..MatrixBody::default()
        };
        let response = match addressing {
            Addressing::Qualified => Root::single(Element::new(
                Address::Path(path.clone()),
                ElementKind::Matrix(Box::new(body)),
            )),
            Addressing::Hierarchical => {
                let number = path.last().unwrap_or_default();
                self.tree.tree_branch(id, Element::matrix(number, body))
            }
        };

        if !dispatch.events.is_empty() {
            dispatch.notified = self.subscribers.notify(&path, &response, origin, sink);
        }
        if origin.is_some() {
            dispatch.reply = Some(response);
        }
        Ok(dispatch)
    }

    fn matrix_operation(
        &mut self,
        path: &TreePath,
        target: u32,
        sources: Vec<u32>,
        operation: ConnectionOperation,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        let id = self
            .tree
            .element_by_path(path)
            .ok_or_else(|| Error::unknown(path))?;
        let request = MatrixConnection::new(target, sources).with_operation(operation);
        self.apply_matrix(None, id, &[request], Addressing::Hierarchical, sink)
    }

    pub fn matrix_connect(
        &mut self,
        path: &TreePath,
        target: u32,
        sources: Vec<u32>,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        self.matrix_operation(path, target, sources, ConnectionOperation::Connect, sink)
    }

    pub fn matrix_disconnect(
        &mut self,
        path: &TreePath,
        target: u32,
        sources: Vec<u32>,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        self.matrix_operation(path, target, sources, ConnectionOperation::Disconnect, sink)
    }

    pub fn matrix_set(
        &mut self,
        path: &TreePath,
        target: u32,
        sources: Vec<u32>,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        self.matrix_operation(path, target, sources, ConnectionOperation::Absolute, sink)
    }

    /// Writes a parameter value on behalf of the device itself. Access
    /// rights apply as for peers.
    pub fn set_value(
        &mut self,
        path: &TreePath,
        value: Value,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        let id = self
            .tree
            .element_by_path(path)
            .ok_or_else(|| Error::unknown(path))?;
        self.apply_value(None, id, value, Addressing::Hierarchical, sink)
    }

    pub fn replace_element(
        &mut self,
        path: &TreePath,
        element: Element,
        sink: &impl PeerSink,
    ) -> Result<Dispatch, Error> {
        let id = self.tree.replace(path, element)?;
        let response = self.tree.response(id);
        let notified = self.subscribers.notify(path, &response, None, sink);
        Ok(Dispatch {
            path: Some(path.clone()),
            notified,
            ..Dispatch::default()
        })
    }
}

/// Follows the first child of each element down to the command or the
/// deepest element, collecting numbers on the way.
fn walk(element: &Element) -> Result<(TreePath, Target<'_>), Error> {
    let mut path = TreePath::root();
    let mut current = element;
    loop {
        let Some(number) = current.number() else {
            return Err(Error::InvalidRequest("element without number in hierarchical request"));
        };
        path.push(number);
        match current.children().first() {
            Some(Fragment::Command(command)) => return Ok((path, Target::Command(command))),
            Some(Fragment::Element(child)) => current = child,
            None => return Ok((path, Target::Payload(current))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::glow::{
        Access, ConnectionDisposition, MatrixContents, MatrixType, NodeContents, ParameterContents,
    };

    #[derive(Default)]
    struct Outbox {
        sent: RefCell<Vec<(PeerId, Root)>>,
    }

    impl PeerSink for Outbox {
        fn deliver(&self, peer: PeerId, message: &Root) -> bool {
            self.sent.borrow_mut().push((peer, message.clone()));
            true
        }
    }

    fn engine() -> Engine {
        let gain = Element::parameter(
            1,
            Some(ParameterContents {
                identifier: Some("gain".into()),
                value: Some(Value::Integer(0)),
                access: Some(Access::READ_WRITE),
                ..Default::default()
            }),
        );
        let name = Element::parameter(
            2,
            Some(ParameterContents {
                identifier: Some("name".into()),
                value: Some(Value::String("dev".into())),
                ..Default::default()
            }),
        );
        let router = Element::matrix(
            3,
            MatrixBody {
                contents: Some(MatrixContents {
                    kind: Some(MatrixType::NToN),
                    target_count: Some(4),
                    source_count: Some(4),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let add = Element::function(4, None);
        let device = Element::node(0, Some(NodeContents::default())).with_children(vec![
            gain.into(),
            name.into(),
            router.into(),
            add.into(),
        ]);
        Engine::new(Tree::from_elements(vec![device]).unwrap())
    }

    fn hierarchical(path: &[u32], leaf: Fragment) -> Root {
        let mut current = leaf;
        for number in path.iter().rev() {
            current = Element::node(*number, None)
                .with_children(vec![current])
                .into();
        }
        Root::new(vec![current])
    }

    #[test]
    fn test_get_directory_on_root() {
        let mut engine = engine();
        let request = Root::single(Command::get_directory());
        let dispatch = engine.handle_request(PeerId(1), &request, &Outbox::default()).unwrap();
        let reply = dispatch.reply.unwrap();
        assert_eq!(reply.elements().len(), 1);
        assert!(reply.elements()[0].as_element().unwrap().kind.has_contents());
    }

    #[test]
    fn test_get_directory_subscribes_children() {
        let mut engine = engine();
        let request = hierarchical(&[0], Command::get_directory().into());
        engine.handle_request(PeerId(1), &request, &Outbox::default()).unwrap();
        assert!(engine.subscribers().is_subscribed(&"0.1".parse().unwrap(), PeerId(1)));
        assert!(engine.subscribers().is_subscribed(&"0.3".parse().unwrap(), PeerId(1)));
        assert!(!engine.subscribers().is_subscribed(&"0.4".parse().unwrap(), PeerId(1)));
    }

    #[test]
    fn test_hierarchical_value_write() {
        let mut engine = engine();
        let write = Element::parameter(
            1,
            Some(ParameterContents {
                value: Some(Value::Integer(-20)),
                ..Default::default()
            }),
        );
        let request = hierarchical(&[0], write.into());
        let dispatch = engine.handle_request(PeerId(1), &request, &Outbox::default()).unwrap();
        assert_eq!(dispatch.path, Some("0.1".parse().unwrap()));
        assert_eq!(dispatch.events.len(), 1);
        let reply = dispatch.reply.unwrap();
        let top = reply.elements()[0].as_element().unwrap();
        assert_eq!(top.number(), Some(0));
    }

    #[test]
    fn test_read_only_write_ignored() {
        let mut engine = engine();
        let write = Element::new(
            Address::Path("0.2".parse().unwrap()),
            ElementKind::Parameter(Some(ParameterContents {
                value: Some(Value::String("hacked".into())),
                ..Default::default()
            })),
        );
        let outbox = Outbox::default();
        engine.subscribers_mut().subscribe("0.2".parse().unwrap(), PeerId(2));
        let dispatch = engine.handle_request(PeerId(1), &Root::single(write), &outbox).unwrap();
        assert!(dispatch.events.is_empty());
        assert!(outbox.sent.borrow().is_empty());
        let id = engine.tree().element_by_path_str("0.2").unwrap();
        let contents = engine.tree().kind(id).unwrap().parameter_contents().unwrap();
        assert_eq!(contents.value, Some(Value::String("dev".into())));
    }

    #[test]
    fn test_qualified_matrix_reply_is_qualified() {
        let mut engine = engine();
        let mut connections = BTreeMap::new();
        connections.insert(
            1,
            MatrixConnection::new(1, vec![2]).with_operation(ConnectionOperation::Connect),
        );
        let request = Root::single(Element::new(
            Address::Path("0.3".parse().unwrap()),
            ElementKind::Matrix(Box::new(MatrixBody {
                connections: Some(connections),
                ..Default::default()
            })),
        ));
        let dispatch = engine.handle_request(PeerId(1), &request, &Outbox::default()).unwrap();
        let reply = dispatch.reply.unwrap();
        let matrix = reply.elements()[0].as_element().unwrap();
        assert_eq!(matrix.path().unwrap().to_string(), "0.3");
        let body = matrix.kind.matrix().unwrap();
        assert_eq!(body.connections.as_ref().unwrap()[&1].sources, vec![2]);
        assert!(matches!(
            dispatch.events[0],
            TreeEvent::Matrix {
                change: MatrixChange::Connected,
                target: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_operator_matrix_broadcasts_to_all() {
        let mut engine = engine();
        let path: TreePath = "0.3".parse().unwrap();
        engine.subscribers_mut().subscribe(path.clone(), PeerId(1));
        engine.subscribers_mut().subscribe(path.clone(), PeerId(2));
        let outbox = Outbox::default();
        let dispatch = engine.matrix_set(&path, 0, vec![3, 1], &outbox).unwrap();
        assert!(dispatch.reply.is_none());
        assert_eq!(dispatch.notified, 2);
    }

    #[test]
    fn test_empty_connect_is_not_broadcast() {
        let mut engine = engine();
        let path: TreePath = "0.3".parse().unwrap();
        engine.subscribers_mut().subscribe(path.clone(), PeerId(2));
        let outbox = Outbox::default();

        let mut connections = BTreeMap::new();
        connections.insert(
            0,
            MatrixConnection::new(0, Vec::new()).with_operation(ConnectionOperation::Connect),
        );
        let request = Root::single(Element::new(
            Address::Path(path),
            ElementKind::Matrix(Box::new(MatrixBody {
                connections: Some(connections),
                ..Default::default()
            })),
        ));
        let dispatch = engine.handle_request(PeerId(1), &request, &outbox).unwrap();
        assert!(dispatch.events.is_empty());
        assert_eq!(dispatch.notified, 0);
        assert!(outbox.sent.borrow().is_empty());

        let reply = dispatch.reply.unwrap();
        let body = reply.elements()[0].as_element().unwrap().kind.matrix().unwrap();
        assert_eq!(
            body.connections.as_ref().unwrap()[&0].disposition,
            Some(ConnectionDisposition::Tally)
        );
    }

    #[test]
    fn test_unknown_paths() {
        let mut engine = engine();
        let outbox = Outbox::default();
        let request = hierarchical(&[0, 9], Command::get_directory().into());
        assert!(matches!(
            engine.handle_request(PeerId(1), &request, &outbox),
            Err(Error::UnknownElement(_))
        ));
        let qualified = Root::single(
            Element::new(Address::Path("7.7".parse().unwrap()), ElementKind::Node(None))
                .with_children(vec![Command::get_directory().into()]),
        );
        assert!(matches!(
            engine.handle_request(PeerId(1), &qualified, &outbox),
            Err(Error::UnknownElement(_))
        ));
        assert!(matches!(
            engine.matrix_connect(&"5".parse().unwrap(), 0, vec![1], &outbox),
            Err(Error::UnknownElement(_))
        ));
    }

    #[test]
    fn test_invoke() {
        let mut engine = engine();
        let outbox = Outbox::default();
        let invocation = Invocation {
            id: Some(12),
            arguments: vec![Value::Integer(1)],
        };
        let request = hierarchical(&[0, 4], Command::invoke(invocation.clone()).into());
        let dispatch = engine.handle_request(PeerId(1), &request, &outbox).unwrap();
        assert_eq!(
            dispatch.invocation,
            Some(PendingInvocation {
                path: "0.4".parse().unwrap(),
                invocation: invocation.clone(),
            })
        );

        let request = hierarchical(&[0, 1], Command::invoke(invocation).into());
        let dispatch = engine.handle_request(PeerId(1), &request, &outbox).unwrap();
        assert_eq!(
            dispatch.reply,
            Some(Root::InvocationResult(InvocationResult::failure(12)))
        );
    }

    #[test]
    fn test_bad_shapes() {
        let mut engine = engine();
        let outbox = Outbox::default();
        let request = hierarchical(&[0], Command::new(CommandKind::Other(99)).into());
        assert!(matches!(
            engine.handle_request(PeerId(1), &request, &outbox),
            Err(Error::InvalidCommand(99))
        ));

        let request = hierarchical(&[0], Element::node(1, None).into());
        assert!(matches!(
            engine.handle_request(PeerId(1), &request, &outbox),
            Err(Error::InvalidRequestFormat(_))
        ));

        let nested = Element::node(0, None).with_children(vec![
            Element::new(Address::Path("0.1".parse().unwrap()), ElementKind::Node(None)).into(),
        ]);
        assert!(matches!(
            engine.handle_request(PeerId(1), &Root::single(nested), &outbox),
            Err(Error::InvalidRequest(_))
        ));

        let empty = Root::default();
        let dispatch = engine.handle_request(PeerId(1), &empty, &outbox).unwrap();
        assert!(dispatch.reply.is_none());
    }

    #[test]
    fn test_replace_element_notifies() {
        let mut engine = engine();
        let path: TreePath = "0.1".parse().unwrap();
        engine.subscribers_mut().subscribe(path.clone(), PeerId(5));
        let outbox = Outbox::default();
        let dispatch = engine
            .replace_element(&path, Element::parameter(1, None), &outbox)
            .unwrap();
        assert_eq!(dispatch.notified, 1);
        assert!(matches!(
            engine.replace_element(&TreePath::root(), Element::node(0, None), &outbox),
            Err(Error::InvalidNode { .. })
        ));
    }
}
