// Input validation helpers shared by the prober and the wait loop.

use std::io;
use std::net::SocketAddr;
use tokio::time::{timeout_at, Instant};

use crate::error::WaitError;

pub fn validate_port(port: i64) -> Result<u16, WaitError> {
    if port <= 0 {
        Err(WaitError::PortTooLow)
    } else if port > u16::MAX as i64 {
        Err(WaitError::PortTooHigh)
    } else {
        Ok(port as u16)
    }
}

/// Resolve `host` through the system resolver, giving up at `deadline`.
pub async fn resolve_host(host: &str, deadline: Instant) -> Result<Vec<SocketAddr>, WaitError> {
    let resolve_err = |source: io::Error| WaitError::Resolve {
        host: host.to_string(),
        source,
    };

    let addrs = timeout_at(deadline, tokio::net::lookup_host((host, 0)))
        .await
        .map_err(|_| resolve_err(io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")))?
        .map_err(resolve_err)?
        .collect::<Vec<_>>();

    if addrs.is_empty() {
        return Err(resolve_err(io::Error::new(io::ErrorKind::NotFound, "no addresses found")));
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn port_bounds() {
        assert!(matches!(validate_port(0), Err(WaitError::PortTooLow)));
        assert!(matches!(validate_port(-1), Err(WaitError::PortTooLow)));
        assert!(matches!(validate_port(65536), Err(WaitError::PortTooHigh)));
        assert_eq!(validate_port(1).unwrap(), 1);
        assert_eq!(validate_port(65535).unwrap(), 65535);
    }

    #[tokio::test]
    async fn resolves_ip_literal() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let addrs = resolve_host("127.0.0.1", deadline).await.unwrap();
        assert_eq!(addrs[0].ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(!resolve_host("localhost", deadline).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolution_stops_at_the_deadline() {
        let err = resolve_host("localhost", Instant::now()).await.unwrap_err();
        match err {
            WaitError::Resolve { host, source } => {
                assert_eq!(host, "localhost");
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unresolvable_host_is_named() {
        let deadline = Instant::now() + Duration::from_secs(10);
        let err = resolve_host("someveryrandomhost.invalid", deadline).await.unwrap_err();
        assert!(
            err.to_string().starts_with("cannot resolve host \"someveryrandomhost.invalid\""),
            "unexpected error: {err}"
        );
    }
}
