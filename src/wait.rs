use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info};

use crate::config::WaitConfig;
use crate::error::WaitError;
use crate::prober::{DesiredState, NetStack, PortProber, SystemNet, Target};
use crate::util::{resolve_host, validate_port};

/// Smallest delay ever used between two probes.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One wait operation: reach `state` on `target` within `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequest {
    pub target: Target,
    pub state: DesiredState,
    pub timeout: Duration,
}

/// Polls a [`PortProber`] until a port reaches the desired state or the deadline passes.
pub struct Waiter<N = SystemNet> {
    prober: PortProber<N>,
    poll_interval: Duration,
}

impl Waiter<SystemNet> {
    pub fn from_config(config: &WaitConfig) -> Self {
        Self::new(PortProber::system(config.connect_timeout()), config.poll_interval())
    }
}

impl<N: NetStack> Waiter<N> {
    pub fn new(prober: PortProber<N>, poll_interval: Duration) -> Self {
        Self {
            prober,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn prober(&self) -> &PortProber<N> {
        &self.prober
    }

    /// Validate raw caller input, then wait.
    ///
    /// Checks run in a fixed order and the first failure wins: port range,
    /// host resolution, desired state. Validation and polling share one
    /// deadline, `timeout` from now.
    pub async fn wait(&self, host: &str, port: i64, state: &str, timeout: Duration) -> Result<(), WaitError> {
        let deadline = deadline_after(timeout);
        let target = Target::new(host, port)?;
        let target = self.check_host(target, deadline).await?;
        let state: DesiredState = state.parse()?;
        self.poll_until(&target, state, deadline).await
    }

    pub async fn wait_for(&self, request: &WaitRequest) -> Result<(), WaitError> {
        let deadline = deadline_after(request.timeout);
        validate_port(request.target.port() as i64)?;
        let target = self.check_host(request.target.clone(), deadline).await?;
        self.poll_until(&target, request.state, deadline).await
    }

    /// Resolution happens once here; polls dial the returned addresses.
    async fn check_host(&self, target: Target, deadline: Instant) -> Result<Target, WaitError> {
        let Some(host) = target.host() else {
            return Ok(target);
        };
        let addrs = resolve_host(host, deadline).await?;
        debug!("resolved {} to {:?}", host, addrs);
        Ok(target.with_addrs(addrs))
    }

    /// Probe immediately, then every poll interval, until `state` holds.
    pub async fn poll_until(&self, target: &Target, state: DesiredState, deadline: Instant) -> Result<(), WaitError> {
        let started = Instant::now();
        let mut polls: u32 = 0;
        loop {
            polls += 1;
            let in_use = timeout_at(deadline, self.prober.probe(target))
                .await
                .map_err(|_| self.timed_out(target, state, polls))?;
            debug!("poll {} of {}: in use = {}", polls, target, in_use);

            if state.is_reached(in_use) {
                info!(
                    "port {} reached state {} after {} poll(s) in {:?}",
                    target,
                    state,
                    polls,
                    started.elapsed()
                );
                return Ok(());
            }

            if timeout_at(deadline, sleep(self.poll_interval)).await.is_err() {
                return Err(self.timed_out(target, state, polls));
            }
        }
    }

    fn timed_out(&self, target: &Target, state: DesiredState, polls: u32) -> WaitError {
        info!("gave up on {} reaching state {} after {} poll(s)", target, state, polls);
        WaitError::Timeout(state)
    }
}

/// Wait for `port` on `host` to reach `state` using the system network stack.
///
/// An empty `host` means the local machine. `state` is `"inuse"` or `"free"`.
pub async fn wait(host: &str, port: i64, state: &str, timeout: Duration, config: &WaitConfig) -> Result<(), WaitError> {
    Waiter::from_config(config).wait(host, port, state, timeout).await
}

/// `timeout` from now; saturates instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Port becomes occupied on the `busy_from`th connect attempt.
    struct FlippingNet {
        busy_from: usize,
        connects: AtomicUsize,
        connect_delay: Duration,
        dialed: Mutex<Vec<Vec<SocketAddr>>>,
    }

    impl FlippingNet {
        fn busy_from(busy_from: usize) -> Self {
            Self {
                busy_from,
                connects: AtomicUsize::new(0),
                connect_delay: Duration::ZERO,
                dialed: Mutex::new(Vec::new()),
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl NetStack for FlippingNet {
        fn connect(&self, target: &Target, _timeout: Duration) -> impl Future<Output = io::Result<()>> + Send {
            self.dialed.lock().unwrap().push(target.addrs().to_vec());
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            let busy = attempt >= self.busy_from;
            let delay = self.connect_delay;
            async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                if busy {
                    Ok(())
                } else {
                    Err(io::ErrorKind::ConnectionRefused.into())
                }
            }
        }

        fn listen(&self, _port: u16) -> io::Result<()> {
            Ok(())
        }
    }

    fn waiter(net: FlippingNet, poll_interval_ms: u64) -> Waiter<FlippingNet> {
        Waiter::new(
            PortProber::new(net, Duration::from_secs(60)),
            Duration::from_millis(poll_interval_ms),
        )
    }

    fn request(state: DesiredState, timeout_ms: u64) -> WaitRequest {
        WaitRequest {
            target: Target::local(5000).unwrap(),
            state,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn returns_without_sleeping_when_state_already_holds() {
        let w = waiter(FlippingNet::busy_from(usize::MAX), 500);
        let start = Instant::now();
        w.wait_for(&request(DesiredState::Free, 5_000)).await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(w.prober_net().connects(), 1);
    }

    #[tokio::test]
    async fn polls_until_port_becomes_busy() {
        let w = waiter(FlippingNet::busy_from(3), 20);
        w.wait_for(&request(DesiredState::InUse, 5_000)).await.unwrap();
        assert_eq!(w.prober_net().connects(), 3);
    }

    #[tokio::test]
    async fn times_out_when_state_never_reached() {
        let w = waiter(FlippingNet::busy_from(usize::MAX), 50);
        let start = Instant::now();
        let err = w.wait_for(&request(DesiredState::InUse, 300)).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, WaitError::Timeout(DesiredState::InUse)));
        assert!(elapsed >= Duration::from_millis(250), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_000), "returned too late: {elapsed:?}");
        assert!(w.prober_net().connects() > 1);
    }

    #[tokio::test]
    async fn slow_probe_does_not_outlive_deadline() {
        let mut net = FlippingNet::busy_from(usize::MAX);
        net.connect_delay = Duration::from_secs(30);
        let w = waiter(net, 500);

        let start = Instant::now();
        let err = w.wait_for(&request(DesiredState::Free, 200)).await.unwrap_err();

        assert!(matches!(err, WaitError::Timeout(DesiredState::Free)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn long_interval_is_cut_at_deadline() {
        let w = waiter(FlippingNet::busy_from(usize::MAX), 10_000);
        let start = Instant::now();
        let err = w.wait_for(&request(DesiredState::InUse, 200)).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(w.prober_net().connects(), 1);
    }

    #[tokio::test]
    async fn port_range_is_checked_before_host_and_state() {
        let w = waiter(FlippingNet::busy_from(1), 20);
        let timeout = Duration::from_secs(5);

        let err = w.wait("", 0, "bogus", timeout).await.unwrap_err();
        assert!(matches!(err, WaitError::PortTooLow));

        let err = w
            .wait("someveryrandomhost.invalid", 65536, "bogus", timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::PortTooHigh));
        assert_eq!(w.prober_net().connects(), 0);
    }

    #[tokio::test]
    async fn host_is_checked_before_state() {
        let w = waiter(FlippingNet::busy_from(1), 20);
        let err = w
            .wait("someveryrandomhost.invalid", 1000, "bogus", Duration::from_secs(10))
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Resolve { ref host, .. } if host == "someveryrandomhost.invalid"));
        assert_eq!(w.prober_net().connects(), 0);
    }

    #[tokio::test]
    async fn unknown_state_never_polls() {
        let w = waiter(FlippingNet::busy_from(1), 20);
        for state in ["", "foobar", "busy"] {
            let err = w.wait("", 1000, state, Duration::from_secs(5)).await.unwrap_err();
            assert!(matches!(err, WaitError::UnknownState(ref s) if s == state));
        }
        assert_eq!(w.prober_net().connects(), 0);
    }

    #[tokio::test]
    async fn polls_dial_the_addresses_resolved_up_front() {
        let w = waiter(FlippingNet::busy_from(3), 20);
        let request = WaitRequest {
            target: Target::new("localhost", 5000).unwrap(),
            state: DesiredState::InUse,
            timeout: Duration::from_secs(5),
        };
        w.wait_for(&request).await.unwrap();

        let dialed = w.prober_net().dialed.lock().unwrap();
        assert_eq!(dialed.len(), 3);
        for addrs in dialed.iter() {
            assert!(!addrs.is_empty());
            assert!(addrs.iter().all(|addr| addr.port() == 5000 && addr.ip().is_loopback()));
        }
    }

    #[tokio::test]
    async fn local_target_is_not_resolved() {
        let w = waiter(FlippingNet::busy_from(1), 20);
        w.wait_for(&request(DesiredState::InUse, 1_000)).await.unwrap();
        assert_eq!(*w.prober_net().dialed.lock().unwrap(), vec![Vec::<SocketAddr>::new()]);
    }

    #[test]
    fn huge_timeout_does_not_overflow() {
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > Instant::now());
    }

    impl<N: NetStack> Waiter<N> {
        fn prober_net(&self) -> &N {
            self.prober().net()
        }
    }
}
