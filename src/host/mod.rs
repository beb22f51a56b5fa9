//! The collaborator interfaces the runtime consumes from its script host.
//!
//! The host itself — parser, interpreter, call stack — lives outside this
//! crate. What the runtime needs from it is small: a value domain, a way to
//! call back into script ([`Invoker`]), a destination for errors raised
//! outside a script frame ([`ErrorReporter`]), and an opaque object handle
//! with instance-private storage ([`HostObj`]). [`Host`] bundles the
//! pluggable pieces; [`Context`] carries them, together with the Selector,
//! through every script-invoked operation and dispatch callback.

mod buffer;
mod error;
mod invoke;
mod object;
mod value;

pub use buffer::ByteString;
pub use error::{ErrorReporter, HostError, LogReporter};
pub use invoke::{Callable, DirectInvoker, Invoker};
pub use object::HostObj;
pub use value::Value;

use crate::selector::Selector;

/// The pluggable host collaborators.
pub struct Host {
    invoker: Box<dyn Invoker>,
    reporter: Box<dyn ErrorReporter>,
}

impl Host {
    pub fn new(invoker: Box<dyn Invoker>, reporter: Box<dyn ErrorReporter>) -> Host {
        Host { invoker, reporter }
    }

    pub fn invoker(&self) -> &dyn Invoker {
        &*self.invoker
    }

    pub fn reporter(&self) -> &dyn ErrorReporter {
        &*self.reporter
    }
}

impl Default for Host {
    fn default() -> Host {
        Host::new(Box::new(DirectInvoker), Box::new(LogReporter))
    }
}

/// The per-call context handed to endpoint operations and dispatch callbacks.
///
/// Everything an operation may need to reach — the watch set and the host
/// collaborators — travels through here, so endpoints and callbacks hold no
/// references of their own.
pub struct Context<'a> {
    pub selector: &'a Selector,
    pub host: &'a Host,
}

impl<'a> Context<'a> {
    pub fn new(selector: &'a Selector, host: &'a Host) -> Context<'a> {
        Context { selector, host }
    }

    /// Calls `func` through the host's invoker with `receiver` bound.
    pub fn invoke(&self, receiver: &HostObj, func: &Callable, args: &[Value]) -> bool {
        self.host.invoker().invoke(receiver, func, args)
    }

    /// Reports an error that has no script frame to fail.
    pub fn report(&self, err: &HostError) {
        self.host.reporter().report(err);
    }
}
