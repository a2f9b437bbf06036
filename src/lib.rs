//! Wait for a TCP port to become in use or free.
//!
//! A port is in use when a connection to it succeeds or, on the local
//! machine, when binding it fails with "address already in use".

pub mod config;
pub mod error;
pub mod prober;
pub mod util;
pub mod wait;

pub use config::WaitConfig;
pub use error::WaitError;
pub use prober::{DesiredState, NetStack, PortProber, SystemNet, Target};
pub use wait::{wait, WaitRequest, Waiter};
