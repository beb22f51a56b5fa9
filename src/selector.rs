use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use std::{cmp, io};

use indexmap::IndexMap;
use log::{debug, trace};

use crate::host::{Context, Host, HostObj};
use crate::ready::Ready;
use crate::sys::select::{self, FdSet, FD_SETSIZE};

/// Why a watch's success callback is being invoked.
///
/// Readiness and timeout share one callback path; the outcome tells the
/// callback which of the two happened so state machines such as a pending
/// connect can tell a completion from a deadline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ready,
    TimedOut,
}

/// Invoked when a watch becomes ready or its timeout elapses.
pub type ReadyCallback = Rc<dyn Fn(&Context, &HostObj, Outcome)>;

/// Invoked when a watch's descriptor reports an error condition.
pub type ErrorCallback = Rc<dyn Fn(&Context, &HostObj)>;

struct Watch {
    interest: Ready,
    owner: HostObj,
    on_ready: ReadyCallback,
    on_error: ErrorCallback,
    remaining: Option<Duration>,
}

/// The readiness wait and the clock it is timed with.
///
/// `Selector` goes through this seam for its one blocking operation, so tests
/// can substitute a deterministic readiness source and clock.
pub trait Backend {
    fn select(
        &self,
        read: &mut FdSet,
        write: &mut FdSet,
        except: &mut FdSet,
        max_fd: RawFd,
        timeout: Option<Duration>,
    ) -> io::Result<i32>;

    fn now(&self) -> Instant;
}

/// The real select(2) syscall and the monotonic clock.
pub struct SysBackend;

impl Backend for SysBackend {
    fn select(
        &self,
        read: &mut FdSet,
        write: &mut FdSet,
        except: &mut FdSet,
        max_fd: RawFd,
        timeout: Option<Duration>,
    ) -> io::Result<i32> {
        select::select(read, write, except, max_fd, timeout)
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Watches a set of descriptors and dispatches their readiness, timeout and
/// error outcomes to script callbacks, one pass at a time.
///
/// A watch binds a descriptor to an interest mask, an owning script object,
/// two callbacks and an optional deadline. The descriptor is the watch's
/// identity: registering a descriptor that already has a watch replaces it.
///
/// [`pump_once`] performs one blocking readiness wait and one dispatch
/// fan-out, and the host keeps calling it while it reports work remaining:
///
/// ```
/// use coop_io::{Host, Selector};
///
/// let selector = Selector::new();
/// let host = Host::default();
///
/// // Nothing is watched, so a pass reports no work.
/// assert!(!selector.pump_once(&host));
/// ```
///
/// All dispatch happens on the calling thread; callbacks run to completion
/// and may freely register and unregister watches, including their own. Such
/// mutations take effect on the next pass, never the current one.
///
/// [`pump_once`]: #method.pump_once
pub struct Selector {
    // Guards registrations from re-entrant callbacks; never held across
    // dispatch.
    watches: Mutex<IndexMap<RawFd, Watch>>,
    backend: Box<dyn Backend>,
}

impl Selector {
    pub fn new() -> Selector {
        Selector::with_backend(Box::new(SysBackend))
    }

    /// A selector driven by the given readiness backend instead of select(2).
    pub fn with_backend(backend: Box<dyn Backend>) -> Selector {
        Selector {
            watches: Mutex::new(IndexMap::new()),
            backend,
        }
    }

    /// Starts watching `fd`, replacing any watch already keyed on it.
    ///
    /// `interest` must name at least one of readable and writable; the error
    /// condition is always watched. `timeout` of `None` means the watch never
    /// times out; otherwise the remaining time counts down by the observed
    /// duration of each pass and the watch is dispatched as timed out when it
    /// reaches zero.
    pub fn register(
        &self,
        fd: RawFd,
        interest: Ready,
        owner: HostObj,
        on_ready: ReadyCallback,
        on_error: ErrorCallback,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        validate_args(fd, interest)?;

        trace!("registering fd={} interest={:?}", fd, interest);

        let mut watches = self.watches.lock().unwrap();
        watches.shift_remove(&fd);
        watches.insert(
            fd,
            Watch {
                interest,
                owner,
                on_ready,
                on_error,
                remaining: timeout,
            },
        );

        Ok(())
    }

    /// Stops watching `fd`. Does nothing when no watch is keyed on it.
    pub fn unregister(&self, fd: RawFd) {
        trace!("unregistering fd={}", fd);

        self.watches.lock().unwrap().shift_remove(&fd);
    }

    /// The number of registered watches.
    pub fn len(&self) -> usize {
        self.watches.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every watch. Safe to call with an empty watch set.
    pub fn shutdown(&self) {
        trace!("shutting down selector");

        self.watches.lock().unwrap().clear();
    }

    /// Performs one readiness pass: a single blocking wait bounded by the
    /// smallest remaining watch timeout, followed by one dispatch fan-out.
    ///
    /// Returns `true` when any watch was registered on entry — i.e. there may
    /// be more work — and `false` when the watch set was empty, so
    /// `while selector.pump_once(&host) {}` runs until quiescence.
    ///
    /// Exactly one outcome class is dispatched per pass, chosen by the
    /// wait's result: ready watches after a positive result, timed-out
    /// watches after a zero result, and every watch's error callback after a
    /// failed wait. An interrupted wait dispatches nothing. Timeouts are
    /// decremented on every pass regardless of which class is dispatched.
    pub fn pump_once(&self, host: &Host) -> bool {
        let mut read = FdSet::new();
        let mut write = FdSet::new();
        let mut except = FdSet::new();
        let mut max_fd: RawFd = 0;
        let mut deadline: Option<Duration> = None;

        {
            let watches = self.watches.lock().unwrap();

            if watches.is_empty() {
                return false;
            }

            for (&fd, watch) in watches.iter() {
                if watch.interest.is_readable() {
                    read.insert(fd);
                }
                if watch.interest.is_writable() {
                    write.insert(fd);
                }
                except.insert(fd);

                max_fd = cmp::max(max_fd, fd);
                deadline = min_timeout(deadline, watch.remaining);
            }
        }

        let start = self.backend.now();
        let result = self
            .backend
            .select(&mut read, &mut write, &mut except, max_fd, deadline);
        let elapsed = self.backend.now() - start;

        // Snapshot the outcome classes so dispatch can run outside the lock
        // and callbacks may mutate the watch set.
        let mut ready: Vec<(RawFd, HostObj, ReadyCallback)> = Vec::new();
        let mut timed_out: Vec<(RawFd, HostObj, ReadyCallback)> = Vec::new();
        let mut errored: Vec<(RawFd, HostObj, ErrorCallback)> = Vec::new();

        {
            let mut watches = self.watches.lock().unwrap();

            for (&fd, watch) in watches.iter_mut() {
                if let Some(remaining) = watch.remaining {
                    watch.remaining = Some(remaining.saturating_sub(elapsed));
                }

                let hit = (watch.interest.is_readable() && read.contains(fd))
                    || (watch.interest.is_writable() && write.contains(fd));
                if hit {
                    ready.push((fd, watch.owner.clone(), watch.on_ready.clone()));
                }

                if watch.remaining == Some(Duration::ZERO) {
                    timed_out.push((fd, watch.owner.clone(), watch.on_ready.clone()));
                }

                // After a failed wait the request sets are untouched, so this
                // fans the error out to every watch.
                if except.contains(fd) {
                    errored.push((fd, watch.owner.clone(), watch.on_error.clone()));
                }
            }
        }

        let cx = Context::new(self, host);

        match result {
            Ok(n) if n > 0 => {
                debug!("dispatching {} ready watches", ready.len());

                for (_, owner, func) in ready {
                    func(&cx, &owner, Outcome::Ready);
                }
            }
            Ok(_) => {
                debug!("dispatching {} timed out watches", timed_out.len());

                for (_, owner, func) in timed_out {
                    func(&cx, &owner, Outcome::TimedOut);
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                debug!("readiness wait failed: {}", err);

                for (_, owner, func) in errored {
                    func(&cx, &owner);
                }
            }
        }

        true
    }
}

impl Default for Selector {
    fn default() -> Selector {
        Selector::new()
    }
}

fn validate_args(fd: RawFd, interest: Ready) -> io::Result<()> {
    if fd < 0 || fd as usize >= FD_SETSIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "descriptor out of range",
        ));
    }

    if !interest.is_readable() && !interest.is_writable() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interest must include readable or writable",
        ));
    }

    Ok(())
}

// `None` is the identity: an unlimited watch never bounds the pass deadline.
fn min_timeout(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(cmp::min(a, b)),
        (None, b) => b,
        (a, None) => a,
    }
}
