use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Addresses dialed when no host is given: IPv4 loopback first, then IPv6.
pub fn loopback_addrs(port: u16) -> [SocketAddr; 2] {
    [
        SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
    ]
}

/// Connect to the first address that accepts and drop the stream straight away.
pub async fn connect_addrs(addrs: &[SocketAddr], connect_timeout: Duration) -> io::Result<()> {
    if addrs.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "no addresses to connect to"));
    }
    finish(timeout(connect_timeout, TcpStream::connect(addrs)).await)
}

/// Like [`connect_addrs`], resolving `host` on the way.
pub async fn connect_host(host: &str, port: u16, connect_timeout: Duration) -> io::Result<()> {
    finish(timeout(connect_timeout, TcpStream::connect((host, port))).await)
}

fn finish(outcome: Result<io::Result<TcpStream>, tokio::time::error::Elapsed>) -> io::Result<()> {
    let conn = outcome.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    drop(conn);
    Ok(())
}
