//! Client characteristic configuration and the periodic notification producer.
use core::cell::Cell;

use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use crate::att::AttErrorCode;
use crate::attribute::AttributeStore;
use crate::cts;
use crate::transport::{Clock, Transport};
use crate::Error;

/// Client characteristic configuration descriptor value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CCCD(pub(crate) u16);

impl CCCD {
    /// Size of the descriptor on the wire.
    pub const SIZE: usize = 2;

    /// Parse a descriptor value, which must be exactly two bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        match data {
            [lo, hi] => Some(Self(u16::from_le_bytes([*lo, *hi]))),
            _ => None,
        }
    }

    /// Whether notifications are enabled.
    pub fn should_notify(&self) -> bool {
        (self.0 & 0x01) != 0
    }

    /// Whether indications are enabled.
    pub fn should_indicate(&self) -> bool {
        (self.0 & 0x02) != 0
    }
}

/// A command for the notification producer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// (Re)start periodic notifications.
    Start,
    /// Stop periodic notifications.
    Stop,
}

/// Tracks whether the client wants time notifications and drives the producer.
pub struct SubscriptionManager<M: RawMutex> {
    cccd_handle: u16,
    value_handle: u16,
    interval: Duration,
    running: Mutex<M, Cell<bool>>,
    command: Signal<M, Command>,
}

impl<M: RawMutex> SubscriptionManager<M> {
    /// Create a manager for the configuration descriptor at `cccd_handle` that
    /// guards notifications of `value_handle`.
    pub fn new(cccd_handle: u16, value_handle: u16, interval: Duration) -> Self {
        Self {
            cccd_handle,
            value_handle,
            interval,
            running: Mutex::new(Cell::new(false)),
            command: Signal::new(),
        }
    }

    /// Handle of the configuration descriptor.
    pub fn cccd_handle(&self) -> u16 {
        self.cccd_handle
    }

    /// Handle of the notified value.
    pub fn value_handle(&self) -> u16 {
        self.value_handle
    }

    /// Interval between two notifications.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check a configuration write before it reaches the store.
    pub fn validate(&self, data: &[u8]) -> Result<CCCD, AttErrorCode> {
        CCCD::from_bytes(data).ok_or(AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH)
    }

    /// Apply a new configuration, starting or stopping the producer.
    pub fn configure(&self, cccd: CCCD) {
        if cccd.should_notify() {
            debug!("[cccd] notifications enabled");
            self.running.lock(|r| r.set(true));
            self.command.signal(Command::Start);
        } else if self.running.lock(|r| r.replace(false)) {
            debug!("[cccd] notifications disabled");
            self.command.signal(Command::Stop);
        }
    }

    /// Whether the producer has been started and not stopped since.
    pub fn is_running(&self) -> bool {
        self.running.lock(|r| r.get())
    }

    /// Wait for the next start or stop command.
    pub async fn next_command(&self) -> Command {
        self.command.wait().await
    }

    /// Whether the stored configuration has notifications enabled.
    pub fn enabled<const MAX: usize>(&self, store: &AttributeStore<'_, M, MAX>) -> bool {
        store
            .with_value(self.cccd_handle, |v| CCCD::from_bytes(v).map(|c| c.should_notify()))
            .ok()
            .flatten()
            .unwrap_or(false)
    }

    /// Send one notification with a fresh time value.
    pub(crate) async fn notify<T: Transport, C: Clock, const MAX: usize>(
        &self,
        store: &AttributeStore<'_, M, MAX>,
        clock: &C,
        transport: &T,
        conn: ConnHandle,
    ) -> Result<(), Error> {
        let value = cts::refresh(store, self.value_handle, clock)?;
        transport.send_notification(conn, self.value_handle, &value).await
    }

    /// One producer period: notify if connected and subscribed.
    ///
    /// Returns whether a notification was sent. Failures are logged and dropped.
    pub async fn tick<T: Transport, C: Clock, const MAX: usize>(
        &self,
        store: &AttributeStore<'_, M, MAX>,
        clock: &C,
        transport: &T,
        conn: Option<ConnHandle>,
    ) -> bool {
        let Some(conn) = conn else {
            trace!("[cccd] not connected");
            return false;
        };
        if !self.enabled(store) {
            return false;
        }
        match self.notify(store, clock, transport, conn).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[cccd] error sending notification: {:?}", e);
                false
            }
        }
    }
}
