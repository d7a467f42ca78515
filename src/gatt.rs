//! Current Time Service GATT server.
use bt_hci::param::ConnHandle;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

use crate::ad_structure::complete_local_name;
use crate::attribute::AttributeStore;
use crate::attribute_server::{AttributeServer, Status};
use crate::cccd::{Command, SubscriptionManager};
use crate::config::NOTIFY_INTERVAL_MS;
use crate::connection::{ConnectionLifecycle, ConnectionState};
use crate::transport::{Address, Clock, Transport};
use crate::Error;

/// Name advertised by the client this server connects to by default.
pub const DEFAULT_PEER_NAME: &[u8] = b"BLE CTS Client";

/// Signal raised from the button interrupt.
pub type ButtonSignal<M> = Signal<M, ()>;

/// An event delivered to the server.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GattEvent<'a> {
    /// Start looking for the client.
    Start,
    /// A peer was discovered while scanning.
    ScanReport {
        /// Peer address.
        address: Address,
        /// Raw advertising data.
        data: &'a [u8],
    },
    /// The connect request succeeded.
    Connected {
        /// Connection id.
        conn: ConnHandle,
        /// Peer address.
        address: Address,
    },
    /// The connect request failed.
    ConnectFailed,
    /// A link went down.
    Disconnected {
        /// Connection id.
        conn: ConnHandle,
        /// HCI reason code.
        reason: u8,
    },
    /// An ATT PDU was received.
    Request {
        /// Connection id.
        conn: ConnHandle,
        /// The PDU, opcode included.
        pdu: &'a [u8],
    },
}

/// Runtime configuration of a [`GattServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig<'d> {
    /// Complete local name the client advertises.
    pub peer_name: &'d [u8],
    /// Handle of the current time characteristic value.
    pub current_time_handle: u16,
    /// Handle of its client characteristic configuration descriptor.
    pub client_config_handle: u16,
    /// Interval between two notifications.
    pub notify_interval: Duration,
    /// Send one notification right after notifications get enabled.
    pub notify_on_subscribe: bool,
}

impl<'d> ServerConfig<'d> {
    /// Configuration for the given handles, defaults elsewhere.
    pub fn new(current_time_handle: u16, client_config_handle: u16) -> Self {
        Self {
            peer_name: DEFAULT_PEER_NAME,
            current_time_handle,
            client_config_handle,
            notify_interval: Duration::from_millis(NOTIFY_INTERVAL_MS as u64),
            notify_on_subscribe: true,
        }
    }
}

/// The Current Time Service server.
///
/// Connects as central to the configured client, answers its attribute requests and
/// notifies it of the current time while it is subscribed.
pub struct GattServer<'d, M: RawMutex, C: Clock, T: Transport, const MAX: usize> {
    server: AttributeServer<'d, M, C, MAX>,
    connection: ConnectionLifecycle<M>,
    transport: T,
    peer_name: &'d [u8],
}

impl<'d, M: RawMutex, C: Clock, T: Transport, const MAX: usize> GattServer<'d, M, C, T, MAX> {
    /// Create a server. Fails if the configuration does not fit the attribute table, the
    /// notification interval is zero or the clock cannot be read.
    pub fn new(config: ServerConfig<'d>, store: AttributeStore<'d, M, MAX>, clock: C, transport: T) -> Result<Self, Error> {
        if config.peer_name.is_empty() || config.current_time_handle == config.client_config_handle {
            return Err(Error::InvalidConfiguration);
        }
        if config.notify_interval.as_ticks() == 0 {
            warn!("[server] notification interval must not be zero");
            return Err(Error::InvalidConfiguration);
        }
        let subscription = SubscriptionManager::new(
            config.client_config_handle,
            config.current_time_handle,
            config.notify_interval,
        );
        let server = AttributeServer::new(store, subscription, clock, config.notify_on_subscribe)?;
        Ok(Self {
            server,
            connection: ConnectionLifecycle::new(),
            transport,
            peer_name: config.peer_name,
        })
    }

    /// The attribute server.
    pub fn server(&self) -> &AttributeServer<'d, M, C, MAX> {
        &self.server
    }

    /// The connection lifecycle.
    pub fn connection(&self) -> &ConnectionLifecycle<M> {
        &self.connection
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Process one event.
    ///
    /// Scan and connect failures are logged and answered by scanning again. Only a
    /// failure to send an ATT response is returned.
    pub async fn process(&self, event: GattEvent<'_>) -> Result<(), Error> {
        match event {
            GattEvent::Start => self.start().await,
            GattEvent::ScanReport { address, data } => {
                let name = complete_local_name(data);
                if self.connection.on_scan_report(address, name, self.peer_name) {
                    info!("[conn] found client {:?}", address);
                    if let Err(e) = self.transport.stop_scan().await {
                        warn!("[conn] error stopping scan: {:?}", e);
                    }
                    if let Err(e) = self.transport.connect(address).await {
                        warn!("[conn] error connecting: {:?}", e);
                        if self.connection.on_connect_failed() {
                            self.scan().await;
                        }
                    }
                } else {
                    trace!("[conn] ignoring {:?}", address);
                }
            }
            GattEvent::Connected { conn, address } => {
                if self.connection.on_connected(conn) {
                    info!("[conn] connected to {:?} as {:?}", address, conn);
                } else {
                    warn!("[conn] unexpected connection {:?} in {:?}", conn, self.connection.state());
                }
            }
            GattEvent::ConnectFailed => {
                if self.connection.on_connect_failed() {
                    warn!("[conn] connection failed, scanning again");
                    self.scan().await;
                }
            }
            GattEvent::Disconnected { conn, reason } => {
                if self.connection.on_disconnected(conn) {
                    info!("[conn] {:?} disconnected, reason {:x}", conn, reason);
                    self.scan().await;
                } else {
                    debug!("[conn] ignoring disconnect of {:?}", conn);
                }
            }
            GattEvent::Request { conn, pdu } => {
                let status: Status = self.server.process(&self.transport, conn, pdu).await?;
                if let Some(code) = status {
                    debug!("[server] request completed with {}", code);
                }
            }
        }
        Ok(())
    }

    async fn start(&self) {
        if self.connection.start() {
            info!("[conn] start scanning");
            self.scan().await;
        } else {
            debug!("[conn] already started");
        }
    }

    async fn scan(&self) {
        if let Err(e) = self.transport.start_scan().await {
            warn!("[conn] error starting scan: {:?}", e);
        }
    }

    /// Send one notification now if connected and subscribed.
    pub async fn tick(&self) -> bool {
        self.server
            .subscription()
            .tick(
                self.server.store(),
                self.server.clock(),
                &self.transport,
                self.connection.connection(),
            )
            .await
    }

    /// Run the periodic notification producer. Never returns.
    pub async fn run_notifier(&self) {
        let subscription = self.server.subscription();
        loop {
            if subscription.next_command().await == Command::Stop {
                continue;
            }
            debug!("[cccd] notifier started");
            let mut ticker = Ticker::every(subscription.interval());
            loop {
                let event = select(ticker.next(), subscription.next_command()).await;
                match event {
                    Either::First(_) => {
                        self.tick().await;
                    }
                    Either::Second(Command::Start) => ticker = Ticker::every(subscription.interval()),
                    Either::Second(Command::Stop) => break,
                }
            }
            debug!("[cccd] notifier stopped");
        }
    }

    /// Start scanning whenever the button signal fires. Never returns.
    pub async fn run_button(&self, button: &ButtonSignal<M>) {
        loop {
            button.wait().await;
            debug!("[conn] button pressed");
            if self.connection.state() == ConnectionState::Idle {
                self.start().await;
            }
        }
    }

    /// Run the notifier and button tasks. Never returns.
    pub async fn run(&self, button: &ButtonSignal<M>) {
        select(self.run_notifier(), self.run_button(button)).await;
    }
}
