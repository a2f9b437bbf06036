use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// Bind a listening socket on `port` on every local interface, then close it.
///
/// Uses a dual-stack IPv6 socket when the host supports it and plain IPv4
/// otherwise. `SO_REUSEADDR` is set so leftover `TIME_WAIT` connections do
/// not make a released port look taken.
pub fn bind_once(port: u16) -> io::Result<()> {
    let socket = match Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP)) {
        Ok(socket) => {
            socket.set_only_v6(false)?;
            bind_and_listen(socket, SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))
        }
        Err(e) if is_family_unsupported(&e) => {
            let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
            bind_and_listen(socket, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        }
        Err(e) => Err(e),
    }?;
    drop(socket);
    Ok(())
}

fn bind_and_listen(socket: Socket, addr: SocketAddr) -> io::Result<Socket> {
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1)?;
    Ok(socket)
}

fn is_family_unsupported(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EAFNOSUPPORT) | Some(libc::EPROTONOSUPPORT))
}

/// Whether a bind error means another socket already owns the port.
pub fn is_addr_in_use(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::AddrInUse || err.raw_os_error() == Some(libc::EADDRINUSE)
}
