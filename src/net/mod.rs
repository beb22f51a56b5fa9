//! The script-visible socket endpoints.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::host::{ByteString, HostError, Value};

pub mod tcp;
pub mod udp;

pub use tcp::TcpEndpoint;
pub use udp::UdpEndpoint;

// Peers made purely of digits and dots are IPv4 literals; everything else
// goes through name resolution, first A record wins.
pub(crate) fn resolve_ipv4(peer: &str) -> Result<Ipv4Addr, HostError> {
    let dotted = !peer.is_empty() && peer.bytes().all(|b| b.is_ascii_digit() || b == b'.');

    if dotted {
        peer.parse()
            .map_err(|_| HostError::InvalidName(peer.to_string()))
    } else {
        let addrs = (peer, 0u16)
            .to_socket_addrs()
            .map_err(|_| HostError::Failed("lookup error".to_string()))?;

        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| HostError::Failed("lookup error".to_string()))
    }
}

pub(crate) fn str_arg<'a>(args: &'a [Value], idx: usize) -> Result<&'a ByteString, HostError> {
    match args.get(idx) {
        None => Err(HostError::NotEnoughArguments),
        Some(value) => value.as_str().ok_or(HostError::ArgumentNotString),
    }
}

pub(crate) fn peer_arg(args: &[Value], idx: usize) -> Result<&str, HostError> {
    let peer = str_arg(args, idx)?;
    peer.as_str()
        .ok_or_else(|| HostError::InvalidName(peer.to_string()))
}

pub(crate) fn port_arg(args: &[Value], idx: usize) -> Result<u16, HostError> {
    match args.get(idx) {
        None => Err(HostError::NotEnoughArguments),
        Some(value) => {
            let port = value.as_int().ok_or(HostError::ArgumentNotInt)?;
            u16::try_from(port).map_err(|_| HostError::ArgumentNotInt)
        }
    }
}

// An absent or void argument keeps the default; -1 means no deadline.
pub(crate) fn timeout_arg(
    args: &[Value],
    idx: usize,
    default_ms: i32,
) -> Result<Option<Duration>, HostError> {
    let ms = match args.get(idx) {
        None | Some(Value::Void) => default_ms,
        Some(value) => value.as_int().ok_or(HostError::ArgumentNotInt)?,
    };

    match ms {
        -1 => Ok(None),
        ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
        _ => Err(HostError::ArgumentNotInt),
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::{resolve_ipv4, timeout_arg};
    use crate::host::{HostError, Value};

    #[test]
    fn dotted_literals_do_not_resolve() {
        assert_eq!(
            resolve_ipv4("127.0.0.1").unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
        assert!(matches!(
            resolve_ipv4("300.0.0.1"),
            Err(HostError::InvalidName(_))
        ));
        assert!(matches!(
            resolve_ipv4("1.2.3"),
            Err(HostError::InvalidName(_))
        ));
    }

    #[test]
    fn names_go_through_lookup() {
        assert_eq!(
            resolve_ipv4("localhost").unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
    }

    #[test]
    fn timeout_sentinel_and_default() {
        assert_eq!(
            timeout_arg(&[], 0, 5000).unwrap(),
            Some(Duration::from_millis(5000))
        );
        assert_eq!(timeout_arg(&[Value::Int(-1)], 0, 5000).unwrap(), None);
        assert_eq!(
            timeout_arg(&[Value::Int(0)], 0, 5000).unwrap(),
            Some(Duration::ZERO)
        );
        assert!(timeout_arg(&[Value::Int(-2)], 0, 5000).is_err());
        assert!(timeout_arg(&[Value::from("x")], 0, 5000).is_err());
    }
}
