use std::cell::RefCell;

use ember::{
    Address, Command, CommandKind, Element, ElementKind, Engine, Fragment, MatrixBody,
    MatrixConnection, ParameterContents, PeerId, PeerSink, Root, Tree, TreeEvent, TreePath, Value,
};

const DEVICE: &str = r#"[
    {
        "kind": "node",
        "identifier": "device",
        "children": [
            { "kind": "parameter", "identifier": "gain", "value": 0, "access": "readWrite", "min": -64, "max": 15 },
            { "kind": "parameter", "identifier": "name", "value": "dev" },
            { "kind": "matrix", "identifier": "router", "type": "nToN", "mode": "linear", "targetCount": 4, "sourceCount": 4 },
            { "kind": "function", "identifier": "add" }
        ]
    }
]"#;

#[derive(Default)]
struct Outbox {
    sent: RefCell<Vec<(PeerId, Root)>>,
    closed: Vec<PeerId>,
}

impl Outbox {
    fn take(&self) -> Vec<(PeerId, Root)> {
        self.sent.take()
    }
}

impl PeerSink for Outbox {
    fn deliver(&self, peer: PeerId, message: &Root) -> bool {
        if self.closed.contains(&peer) {
            return false;
        }
        self.sent.borrow_mut().push((peer, message.clone()));
        true
    }
}

fn engine() -> Engine {
    Engine::new(Tree::from_definition(DEVICE).unwrap())
}

fn path(text: &str) -> TreePath {
    text.parse().unwrap()
}

fn qualified(at: &str, kind: ElementKind, children: Vec<Fragment>) -> Root {
    Root::single(Element::new(Address::Path(path(at)), kind).with_children(children))
}

fn get_directory(at: &str) -> Root {
    qualified(at, ElementKind::Node(None), vec![Command::get_directory().into()])
}

fn write_gain(value: i64) -> Root {
    qualified(
        "0.0",
        ElementKind::Parameter(Some(ParameterContents {
            value: Some(Value::Integer(value)),
            ..Default::default()
        })),
        Vec::new(),
    )
}

fn gain(engine: &Engine) -> Option<Value> {
    let id = engine.tree().element_by_path_str("0.0")?;
    engine.tree().kind(id)?.parameter_contents()?.value.clone()
}

#[test]
fn test_write_is_broadcast_to_other_subscribers() {
    let mut engine = engine();
    let outbox = Outbox::default();

    for peer in [PeerId(1), PeerId(2), PeerId(3)] {
        engine.handle_request(peer, &get_directory("0"), &outbox).unwrap();
    }
    assert!(outbox.take().is_empty());

    let dispatch = engine.handle_request(PeerId(1), &write_gain(-12), &outbox).unwrap();
    assert_eq!(gain(&engine), Some(Value::Integer(-12)));
    assert_eq!(dispatch.notified, 2);
    assert!(dispatch.reply.is_some());
    assert_eq!(
        dispatch.events,
        vec![TreeEvent::ValueChanged {
            path: path("0.0"),
            identifier: Some("gain".into()),
            value: Value::Integer(-12),
        }]
    );

    let mut receivers: Vec<PeerId> = outbox.take().into_iter().map(|(peer, _)| peer).collect();
    receivers.sort();
    assert_eq!(receivers, vec![PeerId(2), PeerId(3)]);
}

#[test]
fn test_unsubscribe_stops_updates() {
    let mut engine = engine();
    let outbox = Outbox::default();

    engine.handle_request(PeerId(2), &get_directory("0"), &outbox).unwrap();
    let unsubscribe = qualified(
        "0.0",
        ElementKind::Parameter(None),
        vec![Command::new(CommandKind::Unsubscribe).into()],
    );
    engine.handle_request(PeerId(2), &unsubscribe, &outbox).unwrap();
    assert!(!engine.subscribers().is_subscribed(&path("0.0"), PeerId(2)));

    let dispatch = engine.handle_request(PeerId(1), &write_gain(3), &outbox).unwrap();
    assert_eq!(dispatch.notified, 0);
    assert!(outbox.take().is_empty());
}

#[test]
fn test_stale_peers_are_dropped() {
    let mut engine = engine();
    let outbox = Outbox {
        closed: vec![PeerId(2)],
        ..Outbox::default()
    };

    engine.handle_request(PeerId(2), &get_directory("0"), &outbox).unwrap();
    engine.handle_request(PeerId(3), &get_directory("0"), &outbox).unwrap();

    let dispatch = engine.handle_request(PeerId(1), &write_gain(1), &outbox).unwrap();
    assert_eq!(dispatch.notified, 1);
    assert!(!engine.subscribers().is_subscribed(&path("0.0"), PeerId(2)));
    assert!(engine.subscribers().is_subscribed(&path("0.0"), PeerId(3)));
}

#[test]
fn test_matrix_request_then_operator_disconnect() {
    let mut engine = engine();
    let outbox = Outbox::default();
    engine.handle_request(PeerId(2), &get_directory("0"), &outbox).unwrap();

    let mut connections = std::collections::BTreeMap::new();
    connections.insert(1, MatrixConnection::new(1, vec![3, 0, 2]));
    let request = qualified(
        "0.2",
        ElementKind::Matrix(Box::new(MatrixBody {
            connections: Some(connections),
            ..MatrixBody::default()
        })),
        Vec::new(),
    );
    let dispatch = engine.handle_request(PeerId(1), &request, &outbox).unwrap();
    assert_eq!(dispatch.notified, 1);

    let reply = dispatch.reply.unwrap();
    let matrix = reply.elements()[0].as_element().unwrap();
    assert_eq!(matrix.path(), Some(&path("0.2")));
    let connection = &matrix.kind.matrix().unwrap().connections.as_ref().unwrap()[&1];
    assert_eq!(connection.sources, vec![3, 0, 2]);
    outbox.take();

    let dispatch = engine
        .matrix_disconnect(&path("0.2"), 1, vec![0, 2], &outbox)
        .unwrap();
    assert!(dispatch.reply.is_none());
    let delivered = outbox.take();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, PeerId(2));

    let id = engine.tree().element_by_path_str("0.2").unwrap();
    let body = engine.tree().kind(id).unwrap().matrix().unwrap();
    assert_eq!(body.connections.as_ref().unwrap()[&1].sources, vec![3]);
}
