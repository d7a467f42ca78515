//! An async Current Time Service GATT server engine.
//!
//! The server scans for a named client, connects to it, answers its attribute requests
//! from a fixed attribute table and notifies it of the current time while it is
//! subscribed. The radio and the hardware clock are reached through the
//! [`Transport`](transport::Transport) and [`Clock`](transport::Clock) traits.
#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]
#![warn(missing_docs)]

mod fmt;

#[allow(missing_docs)]
pub mod att;
#[allow(missing_docs)]
pub mod codec;
#[allow(missing_docs)]
pub mod cursor;
pub mod uuid;

pub mod ad_structure;
pub mod attribute;
pub mod attribute_server;
pub mod cccd;
pub mod config;
pub mod connection;
pub mod cts;
pub mod gatt;
pub mod packet_pool;
pub mod transport;

use att::AttErrorCode;

/// Errors returned by the server.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Encoding or decoding failed.
    Codec(codec::Error),
    /// An attribute operation failed.
    Att(AttErrorCode),
    /// The attribute table or server configuration is invalid.
    InvalidConfiguration,
    /// A configured handle is not in the attribute table.
    NotFound,
    /// The transport failed.
    Transport,
    /// The clock could not be read.
    Clock,
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Self::Codec(error)
    }
}

impl From<AttErrorCode> for Error {
    fn from(error: AttErrorCode) -> Self {
        Self::Att(error)
    }
}

/// Commonly used types.
pub mod prelude {
    pub use bt_hci::param::{AddrKind, BdAddr, ConnHandle};

    pub use crate::att::{AttErrorCode, AttReq, AttRsp};
    pub use crate::attribute::{Attribute, AttributeStore, CharacteristicProp, Uuid};
    pub use crate::attribute::{CHARACTERISTIC_CCCD_UUID16, CURRENT_TIME_SERVICE_UUID16, CURRENT_TIME_UUID16};
    pub use crate::cts::{CurrentTime, DateTime};
    pub use crate::gatt::{ButtonSignal, GattEvent, GattServer, ServerConfig};
    pub use crate::transport::{Address, Clock, Transport};
    pub use crate::Error;
}
