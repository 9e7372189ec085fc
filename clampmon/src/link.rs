//! Bringing up, and checking, the wifi link that reports are sent over.
use std::process::Command;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

/// Access to the wireless hardware
pub trait Link {
    /// Ask to associate with the network described by `credentials`
    fn associate(&mut self, credentials: &WifiCredentials) -> Result<()>;

    /// Name of the network currently associated with, if any
    fn associated_ssid(&self) -> Option<String>;
}

/// Anything that can say whether reports can be sent right now
pub trait Connectivity {
    fn is_connected(&self) -> bool;
}

/// A "sleep", interruptible by receiving a message to exit. Returns true if it was interrupted
pub(crate) fn interrupted(term_receiver: &Receiver<()>, duration: Duration) -> bool {
    !matches!(
        term_receiver.recv_timeout(duration),
        Err(RecvTimeoutError::Timeout)
    )
}

/// How [WifiSession::connect] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Associated with the configured network
    Up,
    /// Told to stop before the link came up
    Stopped,
}

/// How [WifiSession::connect] waits for the link to come up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Poll at a fixed interval, forever
    Forever { poll: Duration },
    /// Double the delay after each poll, up to `max`, and fail once `timeout` has passed
    Bounded {
        initial: Duration,
        max: Duration,
        timeout: Duration,
    },
}

impl RetryPolicy {
    fn first_delay(&self) -> Duration {
        match self {
            RetryPolicy::Forever { poll } => *poll,
            RetryPolicy::Bounded { initial, .. } => *initial,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match self {
            RetryPolicy::Forever { poll } => *poll,
            RetryPolicy::Bounded { max, .. } => std::cmp::min(current * 2, *max),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        match self {
            RetryPolicy::Forever { .. } => None,
            RetryPolicy::Bounded { timeout, .. } => Some(*timeout),
        }
    }
}

/// A wifi link to one known network
pub struct WifiSession<L: Link> {
    link: L,
    credentials: WifiCredentials,
    policy: RetryPolicy,
}

impl<L: Link> WifiSession<L> {
    pub fn new(link: L, credentials: WifiCredentials, policy: RetryPolicy) -> Self {
        WifiSession {
            link,
            credentials,
            policy,
        }
    }

    pub fn ssid(&self) -> &str {
        &self.credentials.ssid
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Block until associated with the configured network, or until a message arrives on
    /// `term_receiver`.
    ///
    /// With [RetryPolicy::Forever] this never errors.
    pub fn connect(&mut self, term_receiver: &Receiver<()>) -> Result<LinkState> {
        let start = Instant::now();
        let mut delay = self.policy.first_delay();
        let mut attempts: u32 = 0;

        info!("Connecting to wifi network '{}'", self.ssid());

        loop {
            if self.is_connected() {
                info!(
                    "Connected to '{}' after {attempts} attempt(s), {:?}",
                    self.ssid(),
                    start.elapsed()
                );
                return Ok(LinkState::Up);
            }

            let mut wait = delay;
            if let Some(timeout) = self.policy.timeout() {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(Error::LinkTimeout {
                        ssid: self.credentials.ssid.clone(),
                        elapsed,
                    });
                }
                wait = std::cmp::min(wait, timeout - elapsed);
            }

            attempts += 1;
            debug!("Association attempt {attempts} with '{}'", self.ssid());
            if let Err(e) = self.link.associate(&self.credentials) {
                warn!("{e}");
            }

            if interrupted(term_receiver, wait) {
                info!("Stopped while connecting to '{}'", self.ssid());
                return Ok(LinkState::Stopped);
            }
            delay = self.policy.next_delay(delay);
        }
    }
}

impl<L: Link> Connectivity for WifiSession<L> {
    fn is_connected(&self) -> bool {
        self.link.associated_ssid().as_deref() == Some(self.ssid())
    }
}

/// The wifi interface of the host this is running on, driven by the OS network tools
#[derive(Debug, Default)]
pub struct SystemLink;

impl SystemLink {
    fn run(credentials: &WifiCredentials, command: &mut Command) -> Result<()> {
        let association_error = |reason: String| Error::Association {
            ssid: credentials.ssid.clone(),
            reason,
        };

        let output = command
            .output()
            .map_err(|e| association_error(e.to_string()))?;

        if !output.status.success() {
            return Err(association_error(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl Link for SystemLink {
    fn associate(&mut self, credentials: &WifiCredentials) -> Result<()> {
        Self::run(
            credentials,
            Command::new("nmcli").args([
                "device",
                "wifi",
                "connect",
                credentials.ssid.as_str(),
                "password",
                credentials.password.as_str(),
            ]),
        )
    }

    // This will need improving for the case when there are multiple interfaces
    fn associated_ssid(&self) -> Option<String> {
        let output = Command::new("iw").arg("dev").output().ok()?;
        parse_iw_ssid(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(target_os = "macos")]
impl Link for SystemLink {
    fn associate(&mut self, credentials: &WifiCredentials) -> Result<()> {
        Self::run(
            credentials,
            Command::new("/usr/sbin/networksetup").args([
                "-setairportnetwork",
                "en0",
                credentials.ssid.as_str(),
                credentials.password.as_str(),
            ]),
        )
    }

    fn associated_ssid(&self) -> Option<String> {
        let output = Command::new("/usr/sbin/networksetup")
            .arg("-getairportnetwork")
            .arg("en0")
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        parse_airport_ssid(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
impl Link for SystemLink {
    fn associate(&mut self, credentials: &WifiCredentials) -> Result<()> {
        Err(Error::Association {
            ssid: credentials.ssid.clone(),
            reason: "wifi association is not supported on this platform".into(),
        })
    }

    fn associated_ssid(&self) -> Option<String> {
        None
    }
}

/// Find the associated SSID in the output of `iw dev`
#[cfg(any(target_os = "linux", test))]
fn parse_iw_ssid(data: &str) -> Option<String> {
    data.lines()
        .find_map(|line| line.trim().strip_prefix("ssid "))
        .map(|ssid| ssid.trim().to_owned())
}

/// Find the associated SSID in the output of `networksetup -getairportnetwork`
#[cfg(any(target_os = "macos", test))]
fn parse_airport_ssid(data: &str) -> Option<String> {
    data.lines()
        .find_map(|line| line.trim().strip_prefix("Current Wi-Fi Network:"))
        .map(|ssid| ssid.trim().to_owned())
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    use super::{
        parse_airport_ssid, parse_iw_ssid, Connectivity, Link, LinkState, RetryPolicy,
        WifiCredentials, WifiSession,
    };
    use crate::error::{Error, Result};

    /// A link that comes up on the `up_after`-th poll, if ever
    struct ScriptedLink {
        ssid: String,
        up_after: Option<usize>,
        polls: Cell<usize>,
        associations: usize,
    }

    impl ScriptedLink {
        fn new(ssid: &str, up_after: Option<usize>) -> Self {
            ScriptedLink {
                ssid: ssid.to_owned(),
                up_after,
                polls: Cell::new(0),
                associations: 0,
            }
        }
    }

    impl Link for ScriptedLink {
        fn associate(&mut self, _credentials: &WifiCredentials) -> Result<()> {
            self.associations += 1;
            Ok(())
        }

        fn associated_ssid(&self) -> Option<String> {
            self.polls.set(self.polls.get() + 1);
            match self.up_after {
                Some(n) if self.polls.get() > n => Some(self.ssid.clone()),
                _ => None,
            }
        }
    }

    fn credentials(ssid: &str) -> WifiCredentials {
        WifiCredentials {
            ssid: ssid.to_owned(),
            password: "secret".to_owned(),
        }
    }

    const FAST_POLL: RetryPolicy = RetryPolicy::Forever {
        poll: Duration::from_millis(1),
    };

    #[test]
    fn connect_polls_until_up() {
        let mut session = WifiSession::new(
            ScriptedLink::new("net", Some(3)),
            credentials("net"),
            FAST_POLL,
        );
        let (_tx, rx) = channel();
        assert_eq!(session.connect(&rx).unwrap(), LinkState::Up);
        assert_eq!(session.link().associations, 3);
        assert!(session.is_connected());
    }

    #[test]
    fn already_connected() {
        let mut session = WifiSession::new(
            ScriptedLink::new("net", Some(0)),
            credentials("net"),
            FAST_POLL,
        );
        let (_tx, rx) = channel();
        assert_eq!(session.connect(&rx).unwrap(), LinkState::Up);
        assert_eq!(session.link().associations, 0);
    }

    #[test]
    fn stop_while_link_down() {
        let mut session =
            WifiSession::new(ScriptedLink::new("net", None), credentials("net"), FAST_POLL);
        let (tx, rx) = channel();
        tx.send(()).unwrap();

        assert_eq!(session.connect(&rx).unwrap(), LinkState::Stopped);
        assert_eq!(session.link().associations, 1);
        assert!(!session.is_connected());
    }

    #[test]
    fn other_network_is_not_connected() {
        let session = WifiSession::new(
            ScriptedLink::new("elsewhere", Some(0)),
            credentials("net"),
            FAST_POLL,
        );
        assert!(!session.is_connected());
    }

    #[test]
    fn bounded_connect_times_out() {
        let policy = RetryPolicy::Bounded {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(4),
            timeout: Duration::from_millis(30),
        };
        let mut session =
            WifiSession::new(ScriptedLink::new("net", None), credentials("net"), policy);

        let (_tx, rx) = channel();
        match session.connect(&rx) {
            Err(Error::LinkTimeout { ssid, elapsed }) => {
                assert_eq!(ssid, "net");
                assert!(elapsed >= Duration::from_millis(30));
            }
            other => panic!("Expected a link timeout, got {other:?}"),
        }
        assert!(session.link().associations > 0);
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let policy = RetryPolicy::Bounded {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(300),
            timeout: Duration::from_secs(10),
        };
        let second = policy.next_delay(policy.first_delay());
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(policy.next_delay(second), Duration::from_millis(300));
        assert_eq!(
            FAST_POLL.next_delay(Duration::from_secs(1)),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn parse_iw_dev_output() {
        let output = "phy#0\n\tInterface wlan0\n\t\tifindex 3\n\t\tssid Clamp Net\n\t\ttype managed\n";
        assert_eq!(parse_iw_ssid(output), Some("Clamp Net".to_owned()));
        assert_eq!(parse_iw_ssid("phy#0\n\tInterface wlan0\n"), None);
    }

    #[test]
    fn parse_networksetup_output() {
        assert_eq!(
            parse_airport_ssid("Current Wi-Fi Network: ClampNet\n"),
            Some("ClampNet".to_owned())
        );
        assert_eq!(
            parse_airport_ssid("You are not associated with an AirPort network.\n"),
            None
        );
    }
}
