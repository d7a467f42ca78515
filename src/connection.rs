//! Connection lifecycle of the central role.
use core::cell::RefCell;

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::transport::Address;

/// State of the single link.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for a start trigger.
    Idle,
    /// Scanning for the configured peer.
    Scanning,
    /// Connect request issued.
    Connecting,
    /// Link established.
    Connected(ConnHandle),
}

struct State {
    state: ConnectionState,
    peer: Option<Address>,
}

/// Tracks the link through `Idle → Scanning → Connecting → Connected → Scanning`.
///
/// Transitions only update state, the caller drives the transport.
pub struct ConnectionLifecycle<M: RawMutex> {
    state: Mutex<M, RefCell<State>>,
}

impl<M: RawMutex> Default for ConnectionLifecycle<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> ConnectionLifecycle<M> {
    /// Create a lifecycle in the idle state.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                state: ConnectionState::Idle,
                peer: None,
            })),
        }
    }

    fn with_mut<F: FnOnce(&mut State) -> R, R>(&self, f: F) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.with_mut(|state| state.state)
    }

    /// The connection id, if connected.
    pub fn connection(&self) -> Option<ConnHandle> {
        match self.state() {
            ConnectionState::Connected(conn) => Some(conn),
            _ => None,
        }
    }

    /// Address of the last peer selected for connection.
    pub fn peer(&self) -> Option<Address> {
        self.with_mut(|state| state.peer)
    }

    /// Leave idle and start scanning. Returns `false` in any other state.
    pub fn start(&self) -> bool {
        self.with_mut(|state| {
            if state.state == ConnectionState::Idle {
                state.state = ConnectionState::Scanning;
                true
            } else {
                false
            }
        })
    }

    /// Consider a scan result. Returns `true` if the peer should be connected.
    ///
    /// Only an advertised name exactly equal to `expected` matches.
    pub fn on_scan_report(&self, peer: Address, name: Option<&[u8]>, expected: &[u8]) -> bool {
        self.with_mut(|state| {
            if state.state != ConnectionState::Scanning {
                return false;
            }
            if name != Some(expected) {
                return false;
            }
            state.state = ConnectionState::Connecting;
            state.peer.replace(peer);
            true
        })
    }

    /// The connect request succeeded.
    pub fn on_connected(&self, conn: ConnHandle) -> bool {
        self.with_mut(|state| {
            if state.state == ConnectionState::Connecting {
                state.state = ConnectionState::Connected(conn);
                true
            } else {
                false
            }
        })
    }

    /// The connect request failed. Returns `true` if scanning should restart.
    pub fn on_connect_failed(&self) -> bool {
        self.with_mut(|state| {
            if state.state == ConnectionState::Connecting {
                state.state = ConnectionState::Scanning;
                true
            } else {
                false
            }
        })
    }

    /// The link `conn` went down. Returns `true` if scanning should restart.
    ///
    /// A disconnect for any other id is ignored.
    pub fn on_disconnected(&self, conn: ConnHandle) -> bool {
        self.with_mut(|state| match state.state {
            ConnectionState::Connected(c) if c == conn => {
                state.state = ConnectionState::Scanning;
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    const NAME: &[u8] = b"BLE CTS Client";

    fn peer() -> Address {
        Address::random([1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn full_cycle() {
        let lc: ConnectionLifecycle<NoopRawMutex> = ConnectionLifecycle::new();
        assert_eq!(lc.state(), ConnectionState::Idle);
        assert!(!lc.on_scan_report(peer(), Some(NAME), NAME));

        assert!(lc.start());
        assert!(!lc.start());
        assert_eq!(lc.state(), ConnectionState::Scanning);

        assert!(lc.on_scan_report(peer(), Some(NAME), NAME));
        assert_eq!(lc.state(), ConnectionState::Connecting);
        assert_eq!(lc.peer(), Some(peer()));

        let conn = ConnHandle::new(3);
        assert!(lc.on_connected(conn));
        assert_eq!(lc.connection(), Some(conn));

        assert!(!lc.on_disconnected(ConnHandle::new(4)));
        assert_eq!(lc.connection(), Some(conn));

        assert!(lc.on_disconnected(conn));
        assert_eq!(lc.state(), ConnectionState::Scanning);
        assert_eq!(lc.connection(), None);
    }

    #[test]
    fn name_must_match_exactly() {
        let lc: ConnectionLifecycle<NoopRawMutex> = ConnectionLifecycle::new();
        lc.start();
        assert!(!lc.on_scan_report(peer(), None, NAME));
        assert!(!lc.on_scan_report(peer(), Some(&b"BLE CTS Client 2"[..]), NAME));
        assert!(!lc.on_scan_report(peer(), Some(&b"BLE CTS"[..]), NAME));
        assert!(!lc.on_scan_report(peer(), Some(&b"ble cts client"[..]), NAME));
        assert_eq!(lc.state(), ConnectionState::Scanning);
    }

    #[test]
    fn connect_failure_returns_to_scanning() {
        let lc: ConnectionLifecycle<NoopRawMutex> = ConnectionLifecycle::new();
        assert!(!lc.on_connect_failed());
        lc.start();
        lc.on_scan_report(peer(), Some(NAME), NAME);
        assert!(lc.on_connect_failed());
        assert_eq!(lc.state(), ConnectionState::Scanning);
        assert!(!lc.on_connected(ConnHandle::new(1)));
    }
}
