use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::WaitError;
use crate::util::validate_port;

pub mod listen;
pub mod tcp_connect;

/// The port state a caller waits for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    InUse,
    Free,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::InUse => "inuse",
            DesiredState::Free => "free",
        }
    }

    /// Whether a probe answer satisfies this state.
    pub fn is_reached(&self, in_use: bool) -> bool {
        match self {
            DesiredState::InUse => in_use,
            DesiredState::Free => !in_use,
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = WaitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inuse" => Ok(DesiredState::InUse),
            "free" => Ok(DesiredState::Free),
            other => Err(WaitError::UnknownState(other.to_string())),
        }
    }
}

/// A host and port to probe. No host means the local machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: Option<String>,
    port: u16,
    addrs: Vec<SocketAddr>,
}

impl Target {
    /// Build a target, rejecting ports outside `1..=65535`. An empty host is the local machine.
    pub fn new(host: &str, port: i64) -> Result<Self, WaitError> {
        let port = validate_port(port)?;
        let host = (!host.is_empty()).then(|| host.to_string());
        Ok(Self { host, port, addrs: Vec::new() })
    }

    pub fn local(port: u16) -> Result<Self, WaitError> {
        Self::new("", port as i64)
    }

    /// Pin the target to already resolved addresses so polls dial them
    /// directly instead of looking the host up again. Ports are replaced by
    /// the target's port.
    pub fn with_addrs(mut self, addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        let port = self.port;
        self.addrs = addrs
            .into_iter()
            .map(|mut addr| {
                addr.set_port(port);
                addr
            })
            .collect();
        self
    }

    /// Resolved addresses, empty until [`Target::with_addrs`] is called.
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_local(&self) -> bool {
        self.host.is_none()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.as_deref().unwrap_or(""), self.port)
    }
}

/// Platform dial and listen primitives used by [`PortProber`].
pub trait NetStack: Send + Sync {
    /// Open a TCP connection to the target and close it again.
    fn connect(&self, target: &Target, timeout: Duration) -> impl Future<Output = io::Result<()>> + Send;

    /// Bind a listener on `port` on all local interfaces and close it again.
    fn listen(&self, port: u16) -> io::Result<()>;
}

/// The operating system's network stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNet;

impl NetStack for SystemNet {
    fn connect(&self, target: &Target, timeout: Duration) -> impl Future<Output = io::Result<()>> + Send {
        let host = target.host().map(str::to_string);
        let port = target.port();
        let addrs = if !target.addrs().is_empty() {
            target.addrs().to_vec()
        } else if target.is_local() {
            tcp_connect::loopback_addrs(port).to_vec()
        } else {
            Vec::new()
        };
        async move {
            match host {
                Some(host) if addrs.is_empty() => tcp_connect::connect_host(&host, port, timeout).await,
                _ => tcp_connect::connect_addrs(&addrs, timeout).await,
            }
        }
    }

    fn listen(&self, port: u16) -> io::Result<()> {
        listen::bind_once(port)
    }
}

/// Answers whether a TCP port is currently occupied.
#[derive(Debug, Clone)]
pub struct PortProber<N = SystemNet> {
    net: N,
    connect_timeout: Duration,
}

impl PortProber<SystemNet> {
    pub fn system(connect_timeout: Duration) -> Self {
        Self::new(SystemNet, connect_timeout)
    }
}

impl<N: NetStack> PortProber<N> {
    pub fn new(net: N, connect_timeout: Duration) -> Self {
        Self { net, connect_timeout }
    }

    pub fn net(&self) -> &N {
        &self.net
    }

    /// Returns true if something accepts connections on the target, or, for the
    /// local machine, if the port cannot be bound because it is already taken.
    ///
    /// Never fails: any error counts as "not in use" and the next poll retries.
    pub async fn probe(&self, target: &Target) -> bool {
        match self.net.connect(target, self.connect_timeout).await {
            Ok(()) => {
                debug!("probe {}: connect succeeded, port in use", target);
                return true;
            }
            Err(e) => trace!("probe {}: connect failed: {}", target, e),
        }

        // Nothing more can be learnt about a remote host.
        if !target.is_local() {
            return false;
        }

        match self.net.listen(target.port()) {
            Ok(()) => {
                debug!("probe {}: bind succeeded, port free", target);
                false
            }
            Err(e) if listen::is_addr_in_use(&e) => {
                debug!("probe {}: bind failed with address in use", target);
                true
            }
            Err(e) => {
                // Inconclusive, e.g. a privileged port without the rights to bind it.
                debug!("probe {}: bind failed, assuming free: {}", target, e);
                false
            }
        }
    }
}
