use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::object::HostObj;
use super::value::Value;

/// A script function value.
///
/// Callbacks assigned to endpoint slots and test cases handed to the suite
/// driver are `Callable`s. Calling one returns `false` when the script frame
/// failed, mirroring the host's invocation result.
#[derive(Clone)]
pub struct Callable {
    f: Rc<RefCell<dyn FnMut(&HostObj, &[Value]) -> bool>>,
}

impl Callable {
    pub fn new<F>(f: F) -> Callable
    where
        F: FnMut(&HostObj, &[Value]) -> bool + 'static,
    {
        Callable {
            f: Rc::new(RefCell::new(f)),
        }
    }

    pub fn call(&self, receiver: &HostObj, args: &[Value]) -> bool {
        let mut f = self.f.borrow_mut();
        (&mut *f)(receiver, args)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Callable")
    }
}

/// Re-enters script: pushes a frame and calls `func` with `receiver` bound.
///
/// The runtime never calls script functions directly; every callback delivery
/// goes through the host's invoker so the host can maintain its call stack.
pub trait Invoker {
    fn invoke(&self, receiver: &HostObj, func: &Callable, args: &[Value]) -> bool;
}

/// An invoker that calls the function with no surrounding frame bookkeeping.
pub struct DirectInvoker;

impl Invoker for DirectInvoker {
    fn invoke(&self, receiver: &HostObj, func: &Callable, args: &[Value]) -> bool {
        func.call(receiver, args)
    }
}
