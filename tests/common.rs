#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use cts_server::attribute::{CHARACTERISTIC_UUID16, PRIMARY_SERVICE_UUID16};
use cts_server::prelude::*;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

pub const TIME_HANDLE: u16 = 3;
pub const CCCD_HANDLE: u16 = 4;
pub const TABLE_SIZE: usize = 8;

pub type Store<'d> = AttributeStore<'d, NoopRawMutex, TABLE_SIZE>;
pub type Server<'d> = GattServer<'d, NoopRawMutex, FixedClock, MockTransport, TABLE_SIZE>;

/// Something the server pushed into the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Response(Vec<u8>),
    Notification { handle: u16, value: Vec<u8> },
    StartScan,
    StopScan,
    Connect(Address),
}

#[derive(Default)]
pub struct MockTransport {
    sent: RefCell<Vec<Sent>>,
    pub fail_response: Cell<bool>,
    pub fail_notify: Cell<bool>,
    pub fail_connect: Cell<bool>,
}

impl MockTransport {
    /// Everything sent so far, oldest first. Clears the log.
    pub fn take(&self) -> Vec<Sent> {
        self.sent.take()
    }

    pub fn responses(&self) -> Vec<Vec<u8>> {
        self.take()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Response(pdu) => Some(pdu),
                _ => None,
            })
            .collect()
    }

    pub fn notification_count(&self) -> usize {
        self.sent
            .borrow()
            .iter()
            .filter(|s| matches!(s, Sent::Notification { .. }))
            .count()
    }
}

impl Transport for MockTransport {
    async fn send_response(&self, _conn: ConnHandle, pdu: &[u8]) -> Result<(), Error> {
        if self.fail_response.get() {
            return Err(Error::Transport);
        }
        self.sent.borrow_mut().push(Sent::Response(pdu.to_vec()));
        Ok(())
    }

    async fn send_notification(&self, _conn: ConnHandle, handle: u16, value: &[u8]) -> Result<(), Error> {
        if self.fail_notify.get() {
            return Err(Error::Transport);
        }
        self.sent.borrow_mut().push(Sent::Notification {
            handle,
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), Error> {
        self.sent.borrow_mut().push(Sent::StartScan);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), Error> {
        self.sent.borrow_mut().push(Sent::StopScan);
        Ok(())
    }

    async fn connect(&self, peer: Address) -> Result<(), Error> {
        if self.fail_connect.get() {
            return Err(Error::Transport);
        }
        self.sent.borrow_mut().push(Sent::Connect(peer));
        Ok(())
    }
}

/// A clock that always reads the same time, or fails when unset.
pub struct FixedClock {
    pub now: Cell<Option<DateTime>>,
}

impl FixedClock {
    pub fn new(now: DateTime) -> Self {
        Self { now: Cell::new(Some(now)) }
    }

    pub fn broken() -> Self {
        Self { now: Cell::new(None) }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Result<DateTime, Error> {
        self.now.get().ok_or(Error::Clock)
    }
}

/// 2024-01-01 12:00:00, a Monday.
pub fn new_year() -> DateTime {
    DateTime::new(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Encoded value of [`new_year`].
pub const NEW_YEAR_VALUE: [u8; 10] = [0xe8, 0x07, 1, 1, 12, 0, 0, 1, 0, 0];

/// Backing storage of the Current Time Service table.
pub struct Storage {
    pub service: [u8; 2],
    pub declaration: [u8; 5],
    pub time: [u8; 10],
    pub cccd: [u8; 2],
}

impl Storage {
    pub fn new() -> Self {
        Self {
            service: [0x05, 0x18],
            declaration: [0x12, TIME_HANDLE as u8, 0x00, 0x2b, 0x2a],
            time: [0; 10],
            cccd: [0; 2],
        }
    }

    /// The service table: service, characteristic declaration, current time value and its
    /// configuration descriptor.
    pub fn store(&mut self) -> Store<'_> {
        AttributeStore::new([
            Attribute::new(1, PRIMARY_SERVICE_UUID16, [CharacteristicProp::Read], &mut self.service),
            Attribute::new(2, CHARACTERISTIC_UUID16, [CharacteristicProp::Read], &mut self.declaration),
            Attribute::new(
                TIME_HANDLE,
                CURRENT_TIME_UUID16,
                [CharacteristicProp::Read, CharacteristicProp::Notify],
                &mut self.time,
            ),
            Attribute::new(
                CCCD_HANDLE,
                CHARACTERISTIC_CCCD_UUID16,
                [CharacteristicProp::Read, CharacteristicProp::Write],
                &mut self.cccd,
            ),
        ])
        .unwrap()
    }
}

pub fn config() -> ServerConfig<'static> {
    ServerConfig::new(TIME_HANDLE, CCCD_HANDLE)
}

pub fn server<'a>(storage: &'a mut Storage, config: ServerConfig<'static>) -> Server<'a> {
    let _ = env_logger::try_init();
    GattServer::new(config, storage.store(), FixedClock::new(new_year()), MockTransport::default()).unwrap()
}

pub fn conn() -> ConnHandle {
    ConnHandle::new(1)
}

pub fn client_address() -> Address {
    Address::random([0xff, 0x9f, 0x1a, 0x05, 0xe4, 0xff])
}

/// Advertising data carrying a complete local name.
pub fn adv_data(name: &[u8]) -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06, (name.len() + 1) as u8, 0x09];
    data.extend_from_slice(name);
    data
}
