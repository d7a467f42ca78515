//! Collaborators the server engine talks to.
use bt_hci::param::{AddrKind, BdAddr, ConnHandle};

use crate::cts::DateTime;
use crate::Error;

/// Address of a peer device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Address {
    /// Address type.
    pub kind: AddrKind,
    /// Device address.
    pub addr: BdAddr,
}

impl Address {
    /// Create a random address.
    pub fn random(val: [u8; 6]) -> Self {
        Self {
            kind: AddrKind::RANDOM,
            addr: BdAddr::new(val),
        }
    }
}

/// The link towards the radio.
///
/// Implementations map these onto the host stack in use. Every method may fail with
/// [`Error::Transport`].
pub trait Transport {
    /// Send an ATT response PDU on a connection.
    async fn send_response(&self, conn: ConnHandle, pdu: &[u8]) -> Result<(), Error>;

    /// Send a handle value notification on a connection.
    async fn send_notification(&self, conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), Error>;

    /// Start scanning for advertising peers.
    async fn start_scan(&self) -> Result<(), Error>;

    /// Stop scanning.
    async fn stop_scan(&self) -> Result<(), Error>;

    /// Request a connection to a peer. The outcome is reported as a later event.
    async fn connect(&self, peer: Address) -> Result<(), Error>;
}

/// A wall clock.
pub trait Clock {
    /// The current date and time.
    fn now(&self) -> Result<DateTime, Error>;
}
