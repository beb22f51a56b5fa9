use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{cmp, fmt, io, mem, ptr};

/// The largest descriptor value select(2) can watch.
pub const FD_SETSIZE: usize = libc::FD_SETSIZE;

/// A wrapper around `libc::fd_set`.
///
/// Used both as the request (which descriptors to watch) and, after a call to
/// [`select`], as the result (which descriptors are ready).
#[derive(Clone, Copy)]
pub struct FdSet {
    raw: libc::fd_set,
}

impl FdSet {
    pub fn new() -> FdSet {
        let mut raw = unsafe { mem::zeroed() };
        unsafe { libc::FD_ZERO(&mut raw) };
        FdSet { raw }
    }

    pub fn insert(&mut self, fd: RawFd) {
        unsafe { libc::FD_SET(fd, &mut self.raw) }
    }

    pub fn remove(&mut self, fd: RawFd) {
        unsafe { libc::FD_CLR(fd, &mut self.raw) }
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        unsafe { libc::FD_ISSET(fd, &self.raw) }
    }

    pub fn clear(&mut self) {
        unsafe { libc::FD_ZERO(&mut self.raw) }
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.raw
    }
}

impl Default for FdSet {
    fn default() -> FdSet {
        FdSet::new()
    }
}

impl fmt::Debug for FdSet {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "FdSet")
    }
}

/// One blocking readiness wait. `None` means no deadline.
///
/// The kernel rewrites the three sets in place so that, on return, they hold
/// only the descriptors that are ready (or, for `except`, in error).
pub fn select(
    read: &mut FdSet,
    write: &mut FdSet,
    except: &mut FdSet,
    max_fd: RawFd,
    timeout: Option<Duration>,
) -> io::Result<i32> {
    let mut tv = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };

    let ptv = match timeout {
        Some(to) => {
            tv.tv_sec = cmp::min(to.as_secs(), libc::time_t::MAX as u64) as libc::time_t;
            tv.tv_usec = to.subsec_micros() as libc::suseconds_t;
            &mut tv as *mut libc::timeval
        }
        None => ptr::null_mut(),
    };

    syscall!(select(
        max_fd + 1,
        read.as_mut_ptr(),
        write.as_mut_ptr(),
        except.as_mut_ptr(),
        ptv
    ))
}
