use std::cell::RefCell;
use std::rc::Rc;

use coop_io::{ByteString, Callable, Context, Host, HostError, HostObj, Selector, UdpEndpoint, Value};

fn free_udp_port() -> u16 {
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

type Delivery = (ByteString, String, i32);

fn delivery_recorder(deliveries: &Rc<RefCell<Vec<Delivery>>>) -> Value {
    let deliveries = deliveries.clone();
    Value::Callable(Callable::new(move |_recv: &HostObj, args: &[Value]| {
        let payload = args[0].as_str().cloned().unwrap_or_default();
        let peer = args[1].as_str().map(|s| s.to_string()).unwrap_or_default();
        let port = args[2].as_int().unwrap_or(-1);
        deliveries.borrow_mut().push((payload, peer, port));
        true
    }))
}

#[test]
fn datagram_delivers_ondata_with_the_source_address() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let port = free_udp_port();
    let udp = UdpEndpoint::open(&cx, &[Value::Int(i32::from(port))]).unwrap();
    assert_eq!(udp.local_port(), i32::from(port));

    let deliveries = Rc::new(RefCell::new(Vec::new()));
    udp.set_on_data(&delivery_recorder(&deliveries));

    let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let sender_port = sender.local_addr().unwrap().port();
    sender.send_to(b"ping", ("127.0.0.1", port)).unwrap();

    assert!(selector.pump_once(&host));

    {
        let deliveries = deliveries.borrow();
        assert_eq!(deliveries.len(), 1);
        let (payload, peer, peer_port) = &deliveries[0];
        assert_eq!(payload.as_bytes(), b"ping");
        assert_eq!(peer, "127.0.0.1");
        assert_eq!(*peer_port, i32::from(sender_port));
    }

    udp.close(&cx);
    assert!(selector.is_empty());
}

// Datagrams queued between passes coalesce into one delivery whose payload is
// their in-order concatenation.
#[test]
fn queued_datagrams_coalesce_into_one_delivery() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let port = free_udp_port();
    let udp = UdpEndpoint::open(&cx, &[Value::Int(i32::from(port))]).unwrap();

    let deliveries = Rc::new(RefCell::new(Vec::new()));
    udp.set_on_data(&delivery_recorder(&deliveries));

    let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(b"ab", ("127.0.0.1", port)).unwrap();
    sender.send_to(b"cd", ("127.0.0.1", port)).unwrap();

    assert!(selector.pump_once(&host));

    let deliveries = deliveries.borrow();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0.as_bytes(), b"abcd");
}

#[test]
fn send_transmits_one_datagram() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = receiver.local_addr().unwrap().port();

    let udp = UdpEndpoint::open(&cx, &[]).unwrap();
    assert_eq!(udp.local_port(), -1);

    udp.send(&[
        Value::from("hello"),
        Value::from("127.0.0.1"),
        Value::Int(i32::from(port)),
    ])
    .unwrap();

    let mut buf = [0u8; 16];
    let (n, _) = receiver.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");

    udp.close(&cx);
}

#[test]
fn close_is_idempotent_and_send_after_close_fails() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    let udp = UdpEndpoint::open(&cx, &[]).unwrap();
    assert_eq!(selector.len(), 1);

    udp.close(&cx);
    udp.close(&cx);
    assert!(selector.is_empty());

    assert!(matches!(
        udp.send(&[
            Value::from("x"),
            Value::from("127.0.0.1"),
            Value::Int(9),
        ]),
        Err(HostError::Failed(_))
    ));
}

#[test]
fn argument_validation() {
    let selector = Selector::new();
    let host = Host::default();
    let cx = Context::new(&selector, &host);

    assert!(matches!(
        UdpEndpoint::open(&cx, &[Value::from("5005")]),
        Err(HostError::ArgumentNotInt)
    ));
    assert!(matches!(
        UdpEndpoint::open(&cx, &[Value::Int(-5)]),
        Err(HostError::ArgumentNotInt)
    ));

    let udp = UdpEndpoint::open(&cx, &[]).unwrap();

    assert!(matches!(
        udp.send(&[Value::from("x"), Value::from("127.0.0.1")]),
        Err(HostError::NotEnoughArguments)
    ));
    assert!(matches!(
        udp.send(&[Value::Int(1), Value::from("127.0.0.1"), Value::Int(9)]),
        Err(HostError::ArgumentNotString)
    ));
    assert!(matches!(
        udp.send(&[Value::from("x"), Value::from("127.0.0.1"), Value::from("9")]),
        Err(HostError::ArgumentNotInt)
    ));

    udp.close(&cx);
}
