use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use ember::session::connect;
use ember::{
    Address, Command, Element, ElementKind, Fragment, Invocation, InvocationHandler,
    ParameterContents, Root, ServerConfig, ServerEvent, ServerHandle, Tree, TreePath,
    TreeServer, Value,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Client = Framed<TcpStream, LengthDelimitedCodec>;

const DEVICE: &str = r#"[
    {
        "kind": "node",
        "identifier": "device",
        "children": [
            { "kind": "parameter", "identifier": "gain", "value": 0, "access": "readWrite" },
            { "kind": "parameter", "identifier": "name", "value": "dev" },
            { "kind": "matrix", "identifier": "router", "type": "oneToN", "targetCount": 4, "sourceCount": 4 },
            { "kind": "function", "identifier": "add" }
        ]
    }
]"#;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

struct Adder;

impl InvocationHandler for Adder {
    fn invoke(&self, _path: &TreePath, arguments: &[Value]) -> Result<Vec<Value>, String> {
        let sum = arguments
            .iter()
            .map(|v| v.as_integer().ok_or("integer arguments only"))
            .sum::<Result<i64, _>>()?;
        Ok(vec![Value::Integer(sum)])
    }
}

async fn start() -> (SocketAddr, ServerHandle, mpsc::UnboundedReceiver<ServerEvent>) {
    let config = ServerConfig {
        bind: "127.0.0.1".into(),
        port: next_port(),
        ..ServerConfig::default()
    };
    let mut server = TreeServer::bind(config, Tree::from_definition(DEVICE).unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let events = server.take_events().unwrap();
    tokio::spawn(server.run());
    (addr, handle, events)
}

async fn send(client: &mut Client, request: &Root) {
    client.send(Bytes::from(request.encode())).await.unwrap();
}

async fn receive(client: &mut Client) -> Root {
    let frame = timeout(Duration::from_secs(2), client.next())
        .await
        .expect("no message within 2s")
        .expect("connection closed")
        .unwrap();
    Root::decode(&frame).unwrap()
}

fn qualified(path: &str, kind: ElementKind, children: Vec<Fragment>) -> Root {
    let path: TreePath = path.parse().unwrap();
    Root::single(Element::new(Address::Path(path), kind).with_children(children))
}

fn get_directory(path: &str) -> Root {
    qualified(path, ElementKind::Node(None), vec![Command::get_directory().into()])
}

#[tokio::test]
async fn test_get_directory_over_tcp() {
    let (addr, handle, _events) = start().await;
    let mut client = connect(addr).await.unwrap();

    send(&mut client, &Root::single(Command::get_directory())).await;
    let reply = receive(&mut client).await;
    let device = reply.elements()[0].as_element().unwrap();
    assert_eq!(device.number(), Some(0));

    send(&mut client, &get_directory("0")).await;
    let reply = receive(&mut client).await;
    assert_eq!(reply.elements().len(), 4);
    let gain = reply.elements()[0].as_element().unwrap();
    assert_eq!(gain.path(), Some(&"0.0".parse().unwrap()));

    assert_eq!(handle.peers().len(), 1);
    handle.shutdown();
}

#[tokio::test]
async fn test_value_write_reaches_other_peer() {
    let (addr, handle, _events) = start().await;
    let mut watcher = connect(addr).await.unwrap();
    let mut writer = connect(addr).await.unwrap();

    send(&mut watcher, &get_directory("0")).await;
    receive(&mut watcher).await;

    let write = qualified(
        "0.0",
        ElementKind::Parameter(Some(ParameterContents {
            value: Some(Value::Integer(-8)),
            ..Default::default()
        })),
        Vec::new(),
    );
    send(&mut writer, &write).await;

    let reply = receive(&mut writer).await;
    let echoed = reply.elements()[0].as_element().unwrap();
    assert_eq!(echoed.path(), Some(&"0.0".parse().unwrap()));

    let update = receive(&mut watcher).await;
    let top = update.elements()[0].as_element().unwrap();
    assert_eq!(top.number(), Some(0));
    let gain = top.children()[0].as_element().unwrap();
    assert_eq!(
        gain.kind.parameter_contents().and_then(|c| c.value.clone()),
        Some(Value::Integer(-8))
    );
    handle.shutdown();
}

#[tokio::test]
async fn test_bad_frame_keeps_connection() {
    let (addr, handle, mut events) = start().await;
    let mut client = connect(addr).await.unwrap();

    client.send(Bytes::from_static(&[0x7f, 0x00])).await.unwrap();
    send(&mut client, &get_directory("0.1")).await;
    let reply = receive(&mut client).await;
    let name = reply.elements()[0].as_element().unwrap();
    assert_eq!(name.path(), Some(&"0.1".parse().unwrap()));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        saw_error |= matches!(event, ServerEvent::Error { addr: Some(_), .. });
    }
    assert!(saw_error);
    handle.shutdown();
}

#[tokio::test]
async fn test_unknown_path_returns_snapshot() {
    let (addr, handle, _events) = start().await;
    let mut client = connect(addr).await.unwrap();

    send(&mut client, &get_directory("0.9")).await;
    let reply = receive(&mut client).await;
    let device = reply.elements()[0].as_element().unwrap();
    assert_eq!(device.number(), Some(0));
    assert!(device.children().is_empty());
    handle.shutdown();
}

#[tokio::test]
async fn test_operator_matrix_change_is_broadcast() {
    let (addr, handle, _events) = start().await;
    let mut client = connect(addr).await.unwrap();

    send(&mut client, &get_directory("0")).await;
    receive(&mut client).await;

    let dispatch = handle.matrix_connect("0.2", 1, vec![3]).unwrap();
    assert_eq!(dispatch.notified, 1);
    assert!(handle.matrix_connect("0.2", 1, vec![2]).is_err());

    let update = receive(&mut client).await;
    let top = update.elements()[0].as_element().unwrap();
    let router = top.children()[0].as_element().unwrap();
    let connections = router.kind.matrix().unwrap().connections.as_ref().unwrap();
    assert_eq!(connections[&1].sources, vec![3]);
    handle.shutdown();
}

#[tokio::test]
async fn test_invocation_uses_handler() {
    let (addr, handle, _events) = start().await;
    handle.set_invocation_handler(Adder);
    let mut client = connect(addr).await.unwrap();

    let invocation = Invocation::new(vec![Value::Integer(2), Value::Integer(3)]);
    let id = invocation.id.unwrap();
    let request = qualified(
        "0.3",
        ElementKind::Function(None),
        vec![Command::invoke(invocation).into()],
    );
    send(&mut client, &request).await;

    match receive(&mut client).await {
        Root::InvocationResult(result) => {
            assert_eq!(result.id, id);
            assert!(result.success);
            assert_eq!(result.result, vec![Value::Integer(5)]);
        }
        other => panic!("unexpected reply {:?}", other),
    }
    handle.shutdown();
}
