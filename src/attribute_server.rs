//! Attribute request dispatch.
use bt_hci::param::ConnHandle;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::att::{self, AttErrorCode, AttReq};
use crate::attribute::{AttributeStore, Uuid};
use crate::cccd::{SubscriptionManager, CCCD};
use crate::codec::{self, FixedSize};
use crate::config::{ATT_MTU, RESPONSE_POOL_SIZE};
use crate::cts::{self, CurrentTime};
use crate::cursor::{ReadCursor, WriteCursor};
use crate::packet_pool::PacketPool;
use crate::transport::{Clock, Transport};
use crate::Error;

/// Pool of buffers used for read-by-type responses.
pub type ResponsePool<M> = PacketPool<M, ATT_MTU, RESPONSE_POOL_SIZE>;

/// Outcome of one request: `None` on success, otherwise the status reported to the client.
pub type Status = Option<AttErrorCode>;

/// Dispatches attribute requests against an [`AttributeStore`].
///
/// The current time characteristic is refreshed from the clock whenever it is read,
/// and writes to its configuration descriptor drive the [`SubscriptionManager`].
pub struct AttributeServer<'d, M: RawMutex, C: Clock, const MAX: usize> {
    store: AttributeStore<'d, M, MAX>,
    subscription: SubscriptionManager<M>,
    pool: ResponsePool<M>,
    clock: C,
    notify_on_subscribe: bool,
}

impl<'d, M: RawMutex, C: Clock, const MAX: usize> AttributeServer<'d, M, C, MAX> {
    /// Create a server over `store`.
    ///
    /// Fails if the time or configuration handle of `subscription` is missing from the
    /// store or too small, or if the clock cannot be read.
    pub fn new(
        store: AttributeStore<'d, M, MAX>,
        subscription: SubscriptionManager<M>,
        clock: C,
        notify_on_subscribe: bool,
    ) -> Result<Self, Error> {
        let time = store.find(subscription.value_handle()).ok_or(Error::NotFound)?;
        if !time.props.readable() || (time.max_len as usize) < CurrentTime::SIZE {
            warn!("[server] time characteristic {} unusable", time.handle);
            return Err(Error::InvalidConfiguration);
        }
        let cccd = store.find(subscription.cccd_handle()).ok_or(Error::NotFound)?;
        if !cccd.props.writable() || (cccd.max_len as usize) < CCCD::SIZE {
            warn!("[server] configuration descriptor {} unusable", cccd.handle);
            return Err(Error::InvalidConfiguration);
        }
        cts::refresh(&store, time.handle, &clock)?;

        Ok(Self {
            store,
            subscription,
            pool: PacketPool::new(),
            clock,
            notify_on_subscribe,
        })
    }

    /// The attribute store.
    pub fn store(&self) -> &AttributeStore<'d, M, MAX> {
        &self.store
    }

    /// The subscription manager.
    pub fn subscription(&self) -> &SubscriptionManager<M> {
        &self.subscription
    }

    /// The clock used to refresh the time characteristic.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The response buffer pool.
    pub fn pool(&self) -> &ResponsePool<M> {
        &self.pool
    }

    /// Process one ATT PDU received on `conn`.
    ///
    /// Every request gets exactly one response or error response, except write commands
    /// which never get either. Only transport failures are returned as errors.
    pub async fn process<T: Transport>(&self, transport: &T, conn: ConnHandle, pdu: &[u8]) -> Result<Status, Error> {
        let mut r = ReadCursor::new(pdu);
        let Ok(opcode) = r.read::<u8>() else {
            return self.respond_error(transport, conn, 0, 0, AttErrorCode::INVALID_PDU).await;
        };
        if !is_request(opcode) {
            warn!("[server] unsupported opcode {:x}", opcode);
            if is_command(opcode) {
                return Ok(Some(AttErrorCode::ERROR));
            }
            return self.respond_error(transport, conn, opcode, 0, AttErrorCode::ERROR).await;
        }
        let req = match AttReq::decode_with_opcode(opcode, r) {
            Ok(req) => req,
            Err(e) => {
                debug!("[server] malformed request {:x}: {:?}", opcode, e);
                if opcode == att::ATT_WRITE_CMD {
                    return Ok(Some(AttErrorCode::INVALID_PDU));
                }
                return self.respond_error(transport, conn, opcode, 0, AttErrorCode::INVALID_PDU).await;
            }
        };
        trace!("[server] request {:?}", req);

        match req {
            AttReq::Read { handle } => {
                self.handle_read(transport, conn, opcode, att::ATT_READ_RSP, handle, 0)
                    .await
            }
            AttReq::ReadBlob { handle, offset } => {
                self.handle_read(transport, conn, opcode, att::ATT_READ_BLOB_RSP, handle, offset)
                    .await
            }
            AttReq::ReadByType {
                start,
                end,
                attribute_type,
            } => {
                self.handle_read_by_type(transport, conn, start, end, &attribute_type)
                    .await
            }
            AttReq::Write { handle, data } => self.handle_write(transport, conn, handle, data, true).await,
            AttReq::WriteCmd { handle, data } => self.handle_write(transport, conn, handle, data, false).await,
        }
    }

    async fn respond_error<T: Transport>(
        &self,
        transport: &T,
        conn: ConnHandle,
        request: u8,
        handle: u16,
        code: AttErrorCode,
    ) -> Result<Status, Error> {
        debug!("[server] request {:x} on handle {} failed: {}", request, handle, code);
        let mut buf = [0; 5];
        let len = att::error_response(WriteCursor::new(&mut buf), request, handle, code)?;
        transport.send_response(conn, &buf[..len]).await?;
        Ok(Some(code))
    }

    fn refresh_if_time(&self, handle: u16) -> Result<(), AttErrorCode> {
        if handle != self.subscription.value_handle() {
            return Ok(());
        }
        cts::refresh(&self.store, handle, &self.clock).map(|_| ()).map_err(|e| {
            warn!("[server] unable to refresh current time: {:?}", e);
            AttErrorCode::UNLIKELY_ERROR
        })
    }

    fn read_value(&self, handle: u16, offset: u16, dest: &mut [u8]) -> Result<usize, AttErrorCode> {
        let info = self.store.find(handle).ok_or(AttErrorCode::INVALID_HANDLE)?;
        if !info.props.readable() {
            return Err(AttErrorCode::READ_NOT_PERMITTED);
        }
        self.refresh_if_time(handle)?;
        self.store.read(handle, offset, dest)
    }

    async fn handle_read<T: Transport>(
        &self,
        transport: &T,
        conn: ConnHandle,
        request: u8,
        response: u8,
        handle: u16,
        offset: u16,
    ) -> Result<Status, Error> {
        let mut buf = [0; ATT_MTU];
        let mut w = WriteCursor::new(&mut buf);
        w.write(response)?;
        match self.read_value(handle, offset, w.write_buf()) {
            Ok(len) => {
                w.commit(len)?;
                transport.send_response(conn, w.finish()).await?;
                Ok(None)
            }
            Err(code) => self.respond_error(transport, conn, request, handle, code).await,
        }
    }

    async fn handle_read_by_type<T: Transport>(
        &self,
        transport: &T,
        conn: ConnHandle,
        start: u16,
        end: u16,
        attribute_type: &Uuid,
    ) -> Result<Status, Error> {
        const REQ: u8 = att::ATT_READ_BY_TYPE_REQ;
        if start == 0 || start > end {
            return self
                .respond_error(transport, conn, REQ, start, AttErrorCode::INVALID_HANDLE)
                .await;
        }
        let Some(mut packet) = self.pool.alloc() else {
            warn!("[server] no response buffer available");
            return self
                .respond_error(transport, conn, REQ, start, AttErrorCode::INSUFFICIENT_RESOURCES)
                .await;
        };

        let mut item_len: Option<usize> = None;
        let mut err = (start, AttErrorCode::INVALID_HANDLE);
        let len = {
            let mut w = WriteCursor::new(packet.as_mut());
            let (mut header, mut body) = w.split(2)?;
            let mut next = start;
            while let Some(handle) = self.store.next_by_type(attribute_type, next, end) {
                let first = item_len.is_none();
                let readable = self.store.find(handle).is_some_and(|info| info.props.readable());
                let refreshed = if readable {
                    self.refresh_if_time(handle)
                } else {
                    Err(AttErrorCode::READ_NOT_PERMITTED)
                };
                if let Err(code) = refreshed {
                    if first {
                        err = (handle, code);
                    }
                    break;
                }

                let appended = self
                    .store
                    .with_value(handle, |value| {
                        let pair = 2 + value.len();
                        // Pairs share one length, and a partial pair is never sent.
                        if pair > u8::MAX as usize || item_len.is_some_and(|l| l != pair) || body.available() < pair {
                            return Ok(false);
                        }
                        body.write(handle)?;
                        body.append(value)?;
                        item_len = Some(pair);
                        Ok::<bool, codec::Error>(true)
                    })
                    .unwrap_or(Ok(false))?;
                if !appended {
                    break;
                }

                match handle.checked_add(1) {
                    Some(h) => next = h,
                    None => break,
                }
            }

            match item_len {
                Some(l) => {
                    header.write(att::ATT_READ_BY_TYPE_RSP)?;
                    header.write(l as u8)?;
                    header.len() + body.len()
                }
                None => 0,
            }
        };

        if len == 0 {
            drop(packet);
            let (handle, code) = err;
            return self.respond_error(transport, conn, REQ, handle, code).await;
        }
        transport.send_response(conn, &packet.as_ref()[..len]).await?;
        Ok(None)
    }

    fn write_value(&self, handle: u16, data: &[u8]) -> Result<Option<CCCD>, AttErrorCode> {
        let info = self.store.find(handle).ok_or(AttErrorCode::INVALID_HANDLE)?;
        if !info.props.writable() {
            return Err(AttErrorCode::WRITE_NOT_PERMITTED);
        }
        let cccd = if handle == self.subscription.cccd_handle() {
            Some(self.subscription.validate(data)?)
        } else {
            None
        };
        self.store.write(handle, data)?;
        Ok(cccd)
    }

    async fn handle_write<T: Transport>(
        &self,
        transport: &T,
        conn: ConnHandle,
        handle: u16,
        data: &[u8],
        confirmed: bool,
    ) -> Result<Status, Error> {
        let cccd = match self.write_value(handle, data) {
            Ok(cccd) => cccd,
            Err(code) if confirmed => {
                return self
                    .respond_error(transport, conn, att::ATT_WRITE_REQ, handle, code)
                    .await;
            }
            Err(code) => {
                debug!("[server] write command on handle {} failed: {}", handle, code);
                return Ok(Some(code));
            }
        };

        if let Some(cccd) = cccd {
            self.subscription.configure(cccd);
        }
        if !confirmed {
            return Ok(None);
        }
        transport.send_response(conn, &[att::ATT_WRITE_RSP]).await?;

        if let Some(cccd) = cccd {
            if cccd.should_notify() && self.notify_on_subscribe {
                if let Err(e) = self
                    .subscription
                    .notify(&self.store, &self.clock, transport, conn)
                    .await
                {
                    warn!("[server] error sending notification: {:?}", e);
                }
            }
        }
        Ok(None)
    }
}

// Commands carry bit 6 of the opcode and are never answered.
fn is_command(opcode: u8) -> bool {
    opcode & 0x40 != 0
}

fn is_request(opcode: u8) -> bool {
    matches!(
        opcode,
        att::ATT_READ_REQ | att::ATT_READ_BLOB_REQ | att::ATT_READ_BY_TYPE_REQ | att::ATT_WRITE_REQ | att::ATT_WRITE_CMD
    )
}
