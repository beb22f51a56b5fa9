use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// An opaque handle to a script-visible object.
///
/// The Selector stores one of these as each watch's owner and hands it back
/// on dispatch; it is the only route from a watch to the endpoint that
/// created it. The endpoint's instance-private state is recovered with
/// [`HostObj::private`], so the watch never holds a typed back-pointer.
#[derive(Clone)]
pub struct HostObj {
    inner: Rc<dyn Any>,
}

impl HostObj {
    pub fn new<T: 'static>(private: T) -> HostObj {
        HostObj {
            inner: Rc::new(private),
        }
    }

    pub fn from_rc(inner: Rc<dyn Any>) -> HostObj {
        HostObj { inner }
    }

    /// The instance-private state, or `None` when the object belongs to a
    /// different class.
    pub fn private<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for HostObj {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "HostObj")
    }
}
