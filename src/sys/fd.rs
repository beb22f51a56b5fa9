use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

/// An owned file descriptor, closed on drop.
#[derive(Debug)]
pub struct FileDesc(RawFd);

impl FileDesc {
    pub fn new(fd: RawFd) -> FileDesc {
        FileDesc(fd)
    }

    pub fn raw(&self) -> RawFd {
        self.0
    }

    pub fn into_raw(self) -> RawFd {
        let fd = self.0;
        mem::forget(self);
        fd
    }

    pub fn set_cloexec(&self) -> io::Result<()> {
        syscall!(fcntl(self.0, libc::F_SETFD, libc::FD_CLOEXEC))?;
        Ok(())
    }
}

impl FromRawFd for FileDesc {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        FileDesc(fd)
    }
}

impl AsRawFd for FileDesc {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl IntoRawFd for FileDesc {
    fn into_raw_fd(self) -> RawFd {
        self.into_raw()
    }
}

impl Drop for FileDesc {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::close(self.0);
        }
    }
}
