use std::io;
use std::mem;
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4};
use std::os::unix::io::RawFd;
use std::time::Duration;

use libc::{c_int, c_void, MSG_PEEK, SOCK_CLOEXEC};

use super::fd::FileDesc;

pub fn setsockopt<T>(sock: &Socket, opt: c_int, val: c_int, payload: T) -> io::Result<()> {
    let payload = &payload as *const T as *const c_void;
    syscall!(setsockopt(
        sock.raw(),
        opt,
        val,
        payload,
        mem::size_of::<T>() as libc::socklen_t
    ))?;
    Ok(())
}

pub fn getsockopt<T: Copy>(sock: &Socket, opt: c_int, val: c_int) -> io::Result<T> {
    let mut slot: T = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<T>() as libc::socklen_t;
    syscall!(getsockopt(
        sock.raw(),
        opt,
        val,
        &mut slot as *mut _ as *mut _,
        &mut len
    ))?;
    Ok(slot)
}

fn sockaddr_in(addr: &SocketAddrV4) -> libc::sockaddr_in {
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from(*addr.ip()).to_be(),
    };
    sin
}

fn addr_from_sockaddr(sin: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
        u16::from_be(sin.sin_port),
    )
}

/// An AF_INET socket descriptor.
pub struct Socket(FileDesc);

impl Socket {
    pub fn stream() -> io::Result<Socket> {
        Socket::new_raw(libc::AF_INET, libc::SOCK_STREAM)
    }

    pub fn dgram() -> io::Result<Socket> {
        Socket::new_raw(libc::AF_INET, libc::SOCK_DGRAM)
    }

    fn new_raw(fam: c_int, ty: c_int) -> io::Result<Socket> {
        match syscall!(socket(fam, ty | SOCK_CLOEXEC, 0)) {
            Ok(fd) => return Ok(Socket(FileDesc::new(fd))),
            Err(ref e) if e.raw_os_error() == Some(libc::EINVAL) => {}
            Err(e) => return Err(e),
        }

        let fd = syscall!(socket(fam, ty, 0))?;
        let fd = FileDesc::new(fd);
        fd.set_cloexec()?;
        Ok(Socket(fd))
    }

    pub fn raw(&self) -> RawFd {
        self.0.raw()
    }

    pub fn connect(&self, addr: &SocketAddrV4) -> io::Result<()> {
        let sin = sockaddr_in(addr);
        syscall!(connect(
            self.raw(),
            &sin as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        ))?;
        Ok(())
    }

    pub fn bind(&self, addr: &SocketAddrV4) -> io::Result<()> {
        let sin = sockaddr_in(addr);
        syscall!(bind(
            self.raw(),
            &sin as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        ))?;
        Ok(())
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddrV4> {
        let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        syscall!(getpeername(
            self.raw(),
            &mut sin as *mut _ as *mut libc::sockaddr,
            &mut len
        ))?;
        Ok(addr_from_sockaddr(&sin))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        syscall!(getsockname(
            self.raw(),
            &mut sin as *mut _ as *mut libc::sockaddr,
            &mut len
        ))?;
        Ok(addr_from_sockaddr(&sin))
    }

    fn recv_with_flags(&self, buf: &mut [u8], flags: c_int) -> io::Result<usize> {
        let ret = syscall!(recv(
            self.raw(),
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
            flags
        ))?;
        Ok(ret as usize)
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, 0)
    }

    pub fn peek(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv_with_flags(buf, MSG_PEEK)
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)> {
        let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let n = syscall!(recvfrom(
            self.raw(),
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
            0,
            &mut sin as *mut _ as *mut libc::sockaddr,
            &mut len
        ))?;
        Ok((n as usize, addr_from_sockaddr(&sin)))
    }

    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let ret = syscall!(send(
            self.raw(),
            buf.as_ptr() as *const c_void,
            buf.len(),
            0
        ))?;
        Ok(ret as usize)
    }

    pub fn send_to(&self, buf: &[u8], addr: &SocketAddrV4) -> io::Result<usize> {
        let sin = sockaddr_in(addr);
        let ret = syscall!(sendto(
            self.raw(),
            buf.as_ptr() as *const c_void,
            buf.len(),
            0,
            &sin as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
        ))?;
        Ok(ret as usize)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        let mut nonblocking = nonblocking as libc::c_int;
        syscall!(ioctl(self.raw(), libc::FIONBIO, &mut nonblocking)).map(|_| ())
    }

    pub fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        let timeout = match dur {
            Some(dur) => {
                if dur.as_secs() == 0 && dur.subsec_nanos() == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "cannot set a 0 duration timeout",
                    ));
                }

                let secs = if dur.as_secs() > libc::time_t::MAX as u64 {
                    libc::time_t::MAX
                } else {
                    dur.as_secs() as libc::time_t
                };
                let mut timeout = libc::timeval {
                    tv_sec: secs,
                    tv_usec: (dur.subsec_nanos() / 1000) as libc::suseconds_t,
                };
                if timeout.tv_sec == 0 && timeout.tv_usec == 0 {
                    timeout.tv_usec = 1;
                }
                timeout
            }
            None => libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
        };
        setsockopt(self, libc::SOL_SOCKET, libc::SO_RCVTIMEO, timeout)
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        let how = match how {
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        syscall!(shutdown(self.raw(), how))?;
        Ok(())
    }

    pub fn take_error(&self) -> io::Result<Option<io::Error>> {
        let raw: c_int = getsockopt(self, libc::SOL_SOCKET, libc::SO_ERROR)?;
        if raw == 0 {
            Ok(None)
        } else {
            Ok(Some(io::Error::from_raw_os_error(raw)))
        }
    }
}
