use std::cell::{Cell, RefCell};
use std::io::{Read, Write};
use std::rc::Rc;
use std::time::Duration;

use coop_io::{Callable, Context, Host, HostError, HostObj, Selector, TcpEndpoint, Value};

fn counter(hits: &Rc<Cell<usize>>) -> Value {
    let hits = hits.clone();
    Value::Callable(Callable::new(move |_recv: &HostObj, _args: &[Value]| {
        hits.set(hits.get() + 1);
        true
    }))
}

fn message_recorder(messages: &Rc<RefCell<Vec<String>>>) -> Value {
    let messages = messages.clone();
    Value::Callable(Callable::new(move |_recv: &HostObj, args: &[Value]| {
        let msg = args
            .first()
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_default();
        messages.borrow_mut().push(msg);
        true
    }))
}

#[test]
fn connect_delivers_onconnect_and_peer_close_delivers_onclose() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let tcp = TcpEndpoint::new(&[]);
    let connects = Rc::new(Cell::new(0));
    let closes = Rc::new(Cell::new(0));
    let errors = Rc::new(RefCell::new(Vec::new()));

    tcp.set_on_connect(&counter(&connects));
    tcp.set_on_close(&counter(&closes));
    tcp.set_on_io_error(&message_recorder(&errors));

    tcp.connect(
        &cx,
        &[
            Value::from("127.0.0.1"),
            Value::Int(i32::from(port)),
            Value::Int(2000),
        ],
    )
    .unwrap();

    let was_pending = !tcp.connected();

    let (peer, _) = listener.accept().unwrap();

    let mut passes = 0;
    while !tcp.connected() && passes < 10 {
        assert!(selector.pump_once(&host));
        passes += 1;
    }

    assert!(tcp.connected());
    assert_eq!(connects.get(), usize::from(was_pending));
    assert!(errors.borrow().is_empty());
    // The established endpoint keeps exactly one read watch armed.
    assert_eq!(selector.len(), 1);

    // Peer goes away without writing: exactly one onClose, no onData.
    drop(peer);
    assert!(selector.pump_once(&host));

    assert_eq!(closes.get(), 1);
    assert!(!tcp.connected());
    assert!(selector.is_empty());
    assert!(!selector.pump_once(&host));
}

#[test]
fn incoming_bytes_deliver_ondata_and_stay_readable() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let tcp = TcpEndpoint::new(&[]);
    let data_hits = Rc::new(Cell::new(0));
    tcp.set_on_data(&counter(&data_hits));

    // A non-callable assignment is ignored and the slot keeps its value.
    tcp.set_on_data(&Value::Int(5));

    tcp.connect(
        &cx,
        &[
            Value::from("127.0.0.1"),
            Value::Int(i32::from(port)),
            Value::Int(2000),
        ],
    )
    .unwrap();

    let (mut peer, _) = listener.accept().unwrap();

    let mut passes = 0;
    while !tcp.connected() && passes < 10 {
        assert!(selector.pump_once(&host));
        passes += 1;
    }
    assert!(tcp.connected());

    peer.write_all(b"hi").unwrap();
    assert!(selector.pump_once(&host));
    assert_eq!(data_hits.get(), 1);

    // Dispatch only peeked; the payload is still on the socket.
    let value = tcp.read(&[Value::Int(2)]).unwrap();
    assert_eq!(value.as_str().unwrap().as_bytes(), b"hi");

    tcp.close(&cx);
    assert!(selector.is_empty());
    // close() twice is a quiet no-op.
    tcp.close(&cx);
    assert!(!tcp.connected());
}

#[test]
fn refused_connection_reports_an_io_error() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    // Grab a loopback port with nothing listening behind it.
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let tcp = TcpEndpoint::new(&[]);
    let errors = Rc::new(RefCell::new(Vec::new()));
    tcp.set_on_io_error(&message_recorder(&errors));

    let result = tcp.connect(
        &cx,
        &[
            Value::from("127.0.0.1"),
            Value::Int(i32::from(port)),
            Value::Int(2000),
        ],
    );

    match result {
        // The refusal surfaced synchronously.
        Err(HostError::Failed(_)) => return,
        Err(err) => panic!("unexpected connect error: {}", err),
        Ok(()) => {}
    }

    let mut passes = 0;
    while errors.borrow().is_empty() && passes < 10 {
        if !selector.pump_once(&host) {
            break;
        }
        passes += 1;
    }

    assert_eq!(errors.borrow().len(), 1);
    assert_ne!(errors.borrow()[0], "timeout");
    assert!(!tcp.connected());
    assert!(selector.is_empty());
}

#[test]
fn blocking_endpoint_reads_and_writes_synchronously() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let tcp = TcpEndpoint::new(&[Value::Bool(true)]);
    tcp.connect(
        &cx,
        &[Value::from("127.0.0.1"), Value::Int(i32::from(port))],
    )
    .unwrap();

    assert!(tcp.connected());
    // Blocking endpoints take no part in the selector.
    assert!(selector.is_empty());

    let (mut peer, _) = listener.accept().unwrap();

    tcp.write(&[Value::from("ping")]).unwrap();
    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    peer.write_all(b"pong").unwrap();
    drop(peer);

    // Reads run to EOF when the count is larger than the payload.
    let value = tcp.read(&[]).unwrap();
    assert_eq!(value.as_str().unwrap().as_bytes(), b"pong");

    tcp.close(&cx);
}

#[test]
fn read_timeout_returns_partial_data() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let tcp = TcpEndpoint::new(&[Value::Bool(true)]);
    tcp.connect(
        &cx,
        &[Value::from("127.0.0.1"), Value::Int(i32::from(port))],
    )
    .unwrap();

    let (_peer, _) = listener.accept().unwrap();

    // The peer stays quiet: a timed read comes back empty instead of hanging.
    let value = tcp
        .read(&[Value::Int(16), Value::Int(50)])
        .unwrap();
    assert!(value.as_str().unwrap().is_empty());

    tcp.close(&cx);
}

#[test]
fn argument_and_state_validation() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let tcp = TcpEndpoint::new(&[]);

    assert!(matches!(
        tcp.connect(&cx, &[Value::from("127.0.0.1")]),
        Err(HostError::NotEnoughArguments)
    ));
    assert!(matches!(
        tcp.connect(&cx, &[Value::Int(1), Value::Int(80)]),
        Err(HostError::ArgumentNotString)
    ));
    assert!(matches!(
        tcp.connect(&cx, &[Value::from("127.0.0.1"), Value::from("80")]),
        Err(HostError::ArgumentNotInt)
    ));
    assert!(matches!(
        tcp.connect(&cx, &[Value::from("300.300.300.300"), Value::Int(80)]),
        Err(HostError::InvalidName(_))
    ));

    assert!(matches!(
        tcp.write(&[]),
        Err(HostError::NotEnoughArguments)
    ));
    assert!(matches!(
        tcp.write(&[Value::Int(3)]),
        Err(HostError::ArgumentNotString)
    ));
    assert!(matches!(
        tcp.write(&[Value::from("x")]),
        Err(HostError::Failed(_))
    ));
    assert!(matches!(tcp.read(&[]), Err(HostError::Failed(_))));
    assert!(matches!(
        tcp.read(&[Value::Int(-1)]),
        Err(HostError::ArgumentNotInt)
    ));
}
