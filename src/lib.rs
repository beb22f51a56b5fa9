//! A cooperative I/O runtime for embedded script hosts.
//!
//! The crate gives a script-execution host the pieces a networked script
//! needs: a readiness-multiplexing [`Selector`] driven one pass at a time,
//! [`TcpEndpoint`] and [`UdpEndpoint`] socket wrappers that surface
//! readiness as callbacks into script, and a [`TestSuite`] driver whose
//! `events` loop pumps the Selector until the watch set empties.
//!
//! Scheduling is single-threaded and cooperative. Script constructs an
//! endpoint, each endpoint keys one watch in the Selector by its descriptor,
//! and the host repeatedly calls [`Selector::pump_once`] while it reports
//! work remaining. Each pass performs one blocking readiness wait — bounded
//! by the smallest remaining watch timeout — and one dispatch fan-out;
//! callbacks run to completion and may mutate the watch set for the next
//! pass.
//!
//! # Example
//!
//! ```
//! use coop_io::{Host, Selector, TcpEndpoint};
//!
//! let selector = Selector::new();
//! let host = Host::default();
//!
//! let tcp = TcpEndpoint::new(&[]);
//! assert!(!tcp.connected());
//!
//! // Nothing registered yet, so one pass reports no work.
//! assert!(!selector.pump_once(&host));
//! ```
//!
//! The host side of the contract — the value domain, callback invocation and
//! error reporting — lives in the [`host`] module and is pluggable.

mod sys;

pub mod host;
pub mod net;

mod ready;
mod selector;
mod unit;

pub use host::{
    ByteString, Callable, Context, DirectInvoker, ErrorReporter, Host, HostError, HostObj,
    Invoker, LogReporter, Value,
};
pub use net::{TcpEndpoint, UdpEndpoint};
pub use ready::Ready;
pub use selector::{Backend, ErrorCallback, Outcome, ReadyCallback, Selector, SysBackend};
pub use sys::select::FdSet;
pub use unit::{CaseResult, TestSuite};
