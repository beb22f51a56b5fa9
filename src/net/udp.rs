use std::cell::RefCell;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use log::{debug, trace};

use crate::host::{ByteString, Callable, Context, HostError, HostObj, Value};
use crate::ready::Ready;
use crate::selector::Outcome;
use crate::sys::socket::Socket;

use super::{peer_arg, port_arg, resolve_ipv4, str_arg};

struct UdpShared {
    sock: Option<Socket>,
    port: i32,
    on_data: Option<Callable>,
    on_io_error: Option<Callable>,
}

/// A datagram socket exposed to script.
///
/// Opening an endpoint binds it (when a local port is given), switches it to
/// non-blocking and registers it with the Selector in one step; from then on
/// every readable wakeup drains the socket and delivers the collected bytes
/// through `onData(payload, host, port)`. Sending needs no watch and happens
/// synchronously.
pub struct UdpEndpoint {
    shared: Rc<RefCell<UdpShared>>,
    obj: HostObj,
}

impl UdpEndpoint {
    /// open([port]) — create, bind and start watching a datagram socket.
    ///
    /// Without a port the socket is not bound and only useful for sending.
    pub fn open(cx: &Context, args: &[Value]) -> Result<UdpEndpoint, HostError> {
        let port = match args.first() {
            None | Some(Value::Void) => -1,
            Some(value) => {
                let port = value.as_int().ok_or(HostError::ArgumentNotInt)?;
                i32::from(u16::try_from(port).map_err(|_| HostError::ArgumentNotInt)?)
            }
        };

        let sock = Socket::dgram()?;
        if port != -1 {
            sock.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port as u16))?;

            if let Ok(addr) = sock.local_addr() {
                trace!("udp socket bound to {}", addr);
            }
        }
        sock.set_nonblocking(true)?;

        let fd = sock.raw();
        let shared = Rc::new(RefCell::new(UdpShared {
            sock: Some(sock),
            port,
            on_data: None,
            on_io_error: None,
        }));
        let obj = HostObj::from_rc(shared.clone());

        cx.selector
            .register(
                fd,
                Ready::readable(),
                obj.clone(),
                Rc::new(select_callback),
                Rc::new(select_error_callback),
                None,
            )
            .map_err(|_| HostError::Failed("asynchronous socket setup".to_string()))?;

        debug!("udp endpoint open on fd={} port={}", fd, port);

        Ok(UdpEndpoint { shared, obj })
    }

    /// The script object handle owning this endpoint's state.
    pub fn object(&self) -> &HostObj {
        &self.obj
    }

    /// The bound local port, or -1 when unbound.
    pub fn local_port(&self) -> i32 {
        self.shared.borrow().port
    }

    /// close() — release the socket. Idempotent.
    pub fn close(&self, cx: &Context) {
        let mut shared = self.shared.borrow_mut();

        if let Some(sock) = shared.sock.take() {
            cx.selector.unregister(sock.raw());
        }
    }

    /// send(data, host, port) — transmit one datagram.
    pub fn send(&self, args: &[Value]) -> Result<(), HostError> {
        if args.len() < 3 {
            return Err(HostError::NotEnoughArguments);
        }
        let data = str_arg(args, 0)?;
        let peer = peer_arg(args, 1)?;
        let port = port_arg(args, 2)?;

        let ip = resolve_ipv4(peer)?;
        let addr = SocketAddrV4::new(ip, port);

        let shared = self.shared.borrow();
        let sock = shared
            .sock
            .as_ref()
            .ok_or_else(|| HostError::Failed("socket closed".to_string()))?;

        sock.send_to(data.as_bytes(), &addr)?;
        Ok(())
    }

    pub fn set_on_data(&self, value: &Value) {
        if let Value::Callable(func) = value {
            self.shared.borrow_mut().on_data = Some(func.clone());
        }
    }

    pub fn set_on_io_error(&self, value: &Value) {
        if let Value::Callable(func) = value {
            self.shared.borrow_mut().on_io_error = Some(func.clone());
        }
    }
}

// Readable wakeup: drain every waiting datagram into one payload, then
// deliver it once. The reported source is the last packet's.
fn select_callback(cx: &Context, obj: &HostObj, _outcome: Outcome) {
    let Some(cell) = obj.private::<RefCell<UdpShared>>() else {
        return;
    };
    let shared = cell.borrow();
    let Some(sock) = shared.sock.as_ref() else {
        return;
    };

    let mut payload = ByteString::new();
    let mut peer: Option<SocketAddrV4> = None;

    loop {
        let mut buf = [0u8; 256];

        match sock.recv_from(&mut buf) {
            Ok((n, addr)) => {
                trace!("drained {} bytes from {}", n, addr);

                payload.push_slice(&buf[..n]);
                peer = Some(addr);
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => {
                cx.report(&HostError::Socket(err));
                return;
            }
        }
    }

    let (host, port) = match peer {
        Some(addr) => (addr.ip().to_string(), i32::from(addr.port())),
        None => (Ipv4Addr::UNSPECIFIED.to_string(), 0),
    };

    let func = shared.on_data.clone();
    drop(shared);

    if let Some(func) = func {
        cx.invoke(
            obj,
            &func,
            &[Value::Str(payload), Value::from(host), Value::Int(port)],
        );
    }
}

// Error-path dispatch: deliver onIOError, then make sure the socket is gone.
fn select_error_callback(cx: &Context, obj: &HostObj) {
    let Some(cell) = obj.private::<RefCell<UdpShared>>() else {
        return;
    };

    let func = cell.borrow().on_io_error.clone();
    if let Some(func) = func {
        cx.invoke(obj, &func, &[]);
    }

    let mut shared = cell.borrow_mut();
    if let Some(sock) = shared.sock.take() {
        cx.selector.unregister(sock.raw());
    }
}
