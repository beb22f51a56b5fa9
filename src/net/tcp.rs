use std::cell::RefCell;
use std::cmp;
use std::io;
use std::net::{Shutdown, SocketAddrV4};
use std::rc::Rc;
use std::time::Duration;

use log::debug;

use crate::host::{ByteString, Callable, Context, HostError, HostObj, Value};
use crate::ready::Ready;
use crate::selector::Outcome;
use crate::sys::socket::Socket;

use super::{peer_arg, port_arg, resolve_ipv4, timeout_arg};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TcpState {
    Unconnected,
    Connecting,
    Connected,
}

struct TcpShared {
    blocking: bool,
    state: TcpState,
    sock: Option<Socket>,
    on_connect: Option<Callable>,
    on_data: Option<Callable>,
    on_close: Option<Callable>,
    on_io_error: Option<Callable>,
}

impl Drop for TcpShared {
    fn drop(&mut self) {
        if let Some(sock) = &self.sock {
            let _ = sock.shutdown(Shutdown::Write);
        }
    }
}

/// A stream socket exposed to script.
///
/// An endpoint is constructed unconnected. `connect` either completes
/// immediately or parks a write watch in the Selector; from then on the
/// endpoint's life is driven by dispatch: `onConnect` when the connection is
/// established, `onData` when bytes are waiting, `onClose` when the peer
/// shuts down, `onIOError` when anything goes wrong. `close` and
/// reconnection are permitted from inside any of those callbacks.
///
/// A blocking endpoint never takes part in dispatch; its `connect` and
/// `read` complete synchronously.
pub struct TcpEndpoint {
    shared: Rc<RefCell<TcpShared>>,
    obj: HostObj,
}

impl TcpEndpoint {
    /// Creates an unconnected endpoint. The optional argument is the
    /// blocking flag, accepted as a boolean or a number; it cannot be
    /// changed afterwards.
    pub fn new(args: &[Value]) -> TcpEndpoint {
        let blocking = match args.first() {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(n)) => *n != 0,
            Some(Value::Double(d)) => *d as i32 != 0,
            _ => false,
        };

        let shared = Rc::new(RefCell::new(TcpShared {
            blocking,
            state: TcpState::Unconnected,
            sock: None,
            on_connect: None,
            on_data: None,
            on_close: None,
            on_io_error: None,
        }));
        let obj = HostObj::from_rc(shared.clone());

        TcpEndpoint { shared, obj }
    }

    /// The script object handle owning this endpoint's state.
    pub fn object(&self) -> &HostObj {
        &self.obj
    }

    /// True while the endpoint is connected.
    pub fn connected(&self) -> bool {
        self.shared.borrow().state == TcpState::Connected
    }

    /// connect(host, port[, timeoutMs]) — initiate a connection.
    ///
    /// `host` is a dotted IPv4 literal or a name to resolve. The timeout
    /// (default 5000 ms, -1 for none) bounds a non-blocking connection
    /// attempt; when it elapses first, `onIOError("timeout")` is delivered.
    pub fn connect(&self, cx: &Context, args: &[Value]) -> Result<(), HostError> {
        if args.len() < 2 {
            return Err(HostError::NotEnoughArguments);
        }
        let peer = peer_arg(args, 0)?;
        let port = port_arg(args, 1)?;
        let timeout = timeout_arg(args, 2, 5000)?;

        let ip = resolve_ipv4(peer)?;
        let addr = SocketAddrV4::new(ip, port);

        let mut shared = self.shared.borrow_mut();

        // A previous connection, established or in progress, is torn down
        // before reconnecting.
        if let Some(old) = shared.sock.take() {
            cx.selector.unregister(old.raw());
            let _ = old.shutdown(Shutdown::Write);
        }
        shared.state = TcpState::Unconnected;

        let sock = Socket::stream()?;
        if !shared.blocking {
            sock.set_nonblocking(true)?;
        }

        match sock.connect(&addr) {
            Ok(()) => {
                debug!("connected to {} immediately", addr);

                let fd = sock.raw();
                shared.sock = Some(sock);
                shared.state = TcpState::Connected;

                if !shared.blocking {
                    register_read(cx, fd, self.obj.clone()).map_err(|_| {
                        shared.sock = None;
                        shared.state = TcpState::Unconnected;
                        HostError::Failed("asynchronous socket setup".to_string())
                    })?;
                }
            }
            Err(ref err)
                if !shared.blocking && err.raw_os_error() == Some(libc::EINPROGRESS) =>
            {
                debug!("connection to {} in progress", addr);

                let fd = sock.raw();
                shared.sock = Some(sock);
                shared.state = TcpState::Connecting;

                cx.selector
                    .register(
                        fd,
                        Ready::writable(),
                        self.obj.clone(),
                        Rc::new(select_callback),
                        Rc::new(select_error_callback),
                        timeout,
                    )
                    .map_err(|_| {
                        shared.sock = None;
                        shared.state = TcpState::Unconnected;
                        HostError::Failed("asynchronous socket setup".to_string())
                    })?;
            }
            Err(err) => {
                return Err(HostError::Failed(err.to_string()));
            }
        }

        Ok(())
    }

    /// close() — tear down the connection. Idempotent.
    pub fn close(&self, cx: &Context) {
        let mut shared = self.shared.borrow_mut();

        if let Some(sock) = shared.sock.take() {
            cx.selector.unregister(sock.raw());
            let _ = sock.shutdown(Shutdown::Write);
        }
        shared.state = TcpState::Unconnected;
    }

    /// read([count[, timeoutMs]]) — synchronously read up to `count` bytes.
    ///
    /// Meaningful for blocking endpoints; a non-blocking endpoint receives
    /// its data through `onData`. Reading stops at `count` bytes or on peer
    /// EOF. A positive timeout bounds how long a quiet socket is waited on;
    /// when it elapses the bytes read so far are returned.
    pub fn read(&self, args: &[Value]) -> Result<Value, HostError> {
        let count = match args.first() {
            None | Some(Value::Void) => 65535usize,
            Some(value) => {
                let n = value.as_int().ok_or(HostError::ArgumentNotInt)?;
                usize::try_from(n).map_err(|_| HostError::ArgumentNotInt)?
            }
        };
        let timeout = timeout_arg(args, 1, 0)?;
        let timed = matches!(timeout, Some(t) if t > Duration::ZERO);

        let shared = self.shared.borrow();

        if shared.state != TcpState::Connected {
            return Err(HostError::Failed("not connected".to_string()));
        }
        let sock = shared
            .sock
            .as_ref()
            .ok_or_else(|| HostError::Failed("not connected".to_string()))?;

        if timed {
            sock.set_read_timeout(timeout)?;
        }

        let mut data = ByteString::new();
        let mut nread = 0;

        let result = loop {
            if nread == count {
                break Ok(());
            }

            let mut buf = [0u8; 256];
            let want = cmp::min(count - nread, buf.len());

            match sock.recv(&mut buf[..want]) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    data.push_slice(&buf[..n]);
                    nread += n;
                }
                Err(ref err) if timed && retriable(err) => break Ok(()),
                Err(err) => break Err(HostError::Socket(err)),
            }
        };

        if timed {
            let _ = sock.set_read_timeout(None);
        }

        result.map(|_| Value::Str(data))
    }

    /// write(data) — send the bytes in one attempt.
    ///
    /// Short writes are not retried; the unsent tail is dropped.
    pub fn write(&self, args: &[Value]) -> Result<(), HostError> {
        if args.is_empty() {
            return Err(HostError::NotEnoughArguments);
        }
        let data = args[0].as_str().ok_or(HostError::ArgumentNotString)?;

        let shared = self.shared.borrow();

        if shared.state != TcpState::Connected {
            return Err(HostError::Failed("not connected".to_string()));
        }
        let sock = shared
            .sock
            .as_ref()
            .ok_or_else(|| HostError::Failed("not connected".to_string()))?;

        sock.send(data.as_bytes())?;
        Ok(())
    }

    pub fn set_on_connect(&self, value: &Value) {
        if let Value::Callable(func) = value {
            self.shared.borrow_mut().on_connect = Some(func.clone());
        }
    }

    pub fn set_on_data(&self, value: &Value) {
        if let Value::Callable(func) = value {
            self.shared.borrow_mut().on_data = Some(func.clone());
        }
    }

    pub fn set_on_close(&self, value: &Value) {
        if let Value::Callable(func) = value {
            self.shared.borrow_mut().on_close = Some(func.clone());
        }
    }

    pub fn set_on_io_error(&self, value: &Value) {
        if let Value::Callable(func) = value {
            self.shared.borrow_mut().on_io_error = Some(func.clone());
        }
    }
}

fn retriable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn register_read(cx: &Context, fd: i32, owner: HostObj) -> io::Result<()> {
    cx.selector.register(
        fd,
        Ready::readable(),
        owner,
        Rc::new(select_callback),
        Rc::new(select_error_callback),
        None,
    )
}

// Success-path dispatch: connect completion, connect timeout, incoming data
// and peer close all arrive here.
fn select_callback(cx: &Context, obj: &HostObj, outcome: Outcome) {
    let Some(cell) = obj.private::<RefCell<TcpShared>>() else {
        return;
    };
    let mut shared = cell.borrow_mut();

    // Blocking endpoints are not dispatch citizens; drop the stray watch.
    if shared.blocking {
        if let Some(sock) = &shared.sock {
            cx.selector.unregister(sock.raw());
        }
        return;
    }

    if shared.state == TcpState::Unconnected {
        return;
    }
    let Some(fd) = shared.sock.as_ref().map(Socket::raw) else {
        return;
    };

    let mut func: Option<Callable> = None;
    let mut func_args: Vec<Value> = Vec::new();

    if shared.state == TcpState::Connecting {
        if outcome == Outcome::TimedOut {
            debug!("fd={} connect timed out", fd);

            cx.selector.unregister(fd);
            shared.sock = None;
            shared.state = TcpState::Unconnected;
            func = shared.on_io_error.clone();
            func_args.push(Value::from("timeout"));
        } else {
            let peer = shared
                .sock
                .as_ref()
                .map(Socket::peer_addr)
                .unwrap_or_else(|| Err(io::Error::from_raw_os_error(libc::ENOTCONN)));

            match peer {
                Ok(_) => {
                    debug!("fd={} connected", fd);

                    shared.state = TcpState::Connected;
                    func = shared.on_connect.clone();
                }
                Err(err) => {
                    // The reason the connect failed sits in SO_ERROR; fall
                    // back to the getpeername failure when it is empty.
                    let err = shared
                        .sock
                        .as_ref()
                        .and_then(|sock| sock.take_error().ok().flatten())
                        .unwrap_or(err);

                    debug!("fd={} failed to connect: {}", fd, err);

                    cx.selector.unregister(fd);
                    shared.sock = None;
                    shared.state = TcpState::Unconnected;
                    func = shared.on_io_error.clone();
                    func_args.push(Value::from(err.to_string()));
                }
            }
        }
    } else {
        // Connected and woken: peek one byte. Zero is an orderly shutdown by
        // the peer, a failure is an error, anything else means data.
        let mut byte = [0u8; 1];
        let peeked = shared
            .sock
            .as_ref()
            .map(|sock| sock.peek(&mut byte))
            .unwrap_or_else(|| Ok(0));

        match peeked {
            Ok(0) => {
                debug!("fd={} closed by peer", fd);

                cx.selector.unregister(fd);
                if let Some(sock) = shared.sock.take() {
                    let _ = sock.shutdown(Shutdown::Write);
                }
                shared.state = TcpState::Unconnected;
                func = shared.on_close.clone();
            }
            Ok(_) => {
                func = shared.on_data.clone();
            }
            Err(err) => {
                debug!("fd={} read failed: {}", fd, err);

                cx.selector.unregister(fd);
                shared.sock = None;
                shared.state = TcpState::Unconnected;
                func = shared.on_io_error.clone();
                func_args.push(Value::from(err.to_string()));
            }
        }
    }

    // While still connected, the read watch is re-armed with no deadline
    // before the callback runs, so the callback may override it or close.
    let rearm = shared.state == TcpState::Connected;
    drop(shared);

    if rearm && register_read(cx, fd, obj.clone()).is_err() {
        cx.report(&HostError::Failed("asynchronous socket setup".to_string()));
        return;
    }

    if let Some(func) = func {
        cx.invoke(obj, &func, &func_args);
    }
}

// Error-path dispatch: deliver onIOError, then make sure the socket is gone.
fn select_error_callback(cx: &Context, obj: &HostObj) {
    let Some(cell) = obj.private::<RefCell<TcpShared>>() else {
        return;
    };

    let func = cell.borrow().on_io_error.clone();
    if let Some(func) = func {
        cx.invoke(obj, &func, &[]);
    }

    let mut shared = cell.borrow_mut();
    if let Some(sock) = shared.sock.take() {
        cx.selector.unregister(sock.raw());
        let _ = sock.shutdown(Shutdown::Write);
    }
    shared.state = TcpState::Unconnected;
}
