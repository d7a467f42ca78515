//! Attribute protocol PDUs.
use core::fmt::Display;
use core::mem;

use crate::codec;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::uuid::Uuid;

pub(crate) const ATT_ERROR_RSP: u8 = 0x01;
pub(crate) const ATT_READ_BY_TYPE_REQ: u8 = 0x08;
pub(crate) const ATT_READ_BY_TYPE_RSP: u8 = 0x09;
pub(crate) const ATT_READ_REQ: u8 = 0x0a;
pub(crate) const ATT_READ_RSP: u8 = 0x0b;
pub(crate) const ATT_READ_BLOB_REQ: u8 = 0x0c;
pub(crate) const ATT_READ_BLOB_RSP: u8 = 0x0d;
pub(crate) const ATT_WRITE_REQ: u8 = 0x12;
pub(crate) const ATT_WRITE_RSP: u8 = 0x13;
pub(crate) const ATT_HANDLE_VALUE_NTF: u8 = 0x1b;
pub(crate) const ATT_WRITE_CMD: u8 = 0x52;

/// Attribute Error Code
///
/// This type describes the status carried by an `ATT_ERROR_RSP` PDU. Success is
/// represented by the absence of an error code.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AttErrorCode {
    value: u8,
}

impl AttErrorCode {
    /// Attempted to use a handle that isn't valid on this server
    pub const INVALID_HANDLE: Self = Self { value: 0x01 };
    /// The attribute cannot be read
    pub const READ_NOT_PERMITTED: Self = Self { value: 0x02 };
    /// The attribute cannot be written
    pub const WRITE_NOT_PERMITTED: Self = Self { value: 0x03 };
    /// The attribute PDU was invalid
    pub const INVALID_PDU: Self = Self { value: 0x04 };
    /// Offset specified was past the end of the attribute
    pub const INVALID_OFFSET: Self = Self { value: 0x07 };
    /// The attribute value length is invalid for the operation
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: Self = Self { value: 0x0d };
    /// The attribute request that was requested had encountered an error that was unlikely, and therefore could not be completed as requested
    pub const UNLIKELY_ERROR: Self = Self { value: 0x0e };
    /// Insufficient Resources to complete the request
    pub const INSUFFICIENT_RESOURCES: Self = Self { value: 0x11 };
    /// Generic error, used for requests this server does not handle
    pub const ERROR: Self = Self { value: 0x85 };

    /// Create an error code from its raw value.
    pub const fn new(value: u8) -> Self {
        Self { value }
    }

    /// The raw value sent on the wire.
    pub const fn value(&self) -> u8 {
        self.value
    }
}

impl Display for AttErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::INVALID_HANDLE => {
                f.write_str("invalid handle: Attempted to use a handle that isn't valid on this server")
            }
            Self::READ_NOT_PERMITTED => f.write_str("read not permitted: the attribute cannot be read"),
            Self::WRITE_NOT_PERMITTED => f.write_str("write not permitted: the attribute cannot be written"),
            Self::INVALID_PDU => f.write_str("invalid pdu: the attribute PDU was invalid"),
            Self::INVALID_OFFSET => f.write_str("Offset specified was past the end of the attribute"),
            Self::INVALID_ATTRIBUTE_VALUE_LENGTH => f.write_str("invalid attribute value length: the attribute value length is invalid for the operation"),
            Self::UNLIKELY_ERROR => f.write_str("unlikely error: the attribute request encountered an error that was unlikely, and therefore could not be completed"),
            Self::INSUFFICIENT_RESOURCES => f.write_str("insufficient resources: insufficient resources to complete the request"),
            Self::ERROR => f.write_str("error: the request is not handled by this server"),
            other => write!(f, "unknown error code {}", other.value),
        }
    }
}

impl codec::Encode for AttErrorCode {
    fn encode(&self, dest: &mut [u8]) -> Result<(), codec::Error> {
        dest[0] = self.value;
        Ok(())
    }
}

impl codec::Decode<'_> for AttErrorCode {
    fn decode(src: &[u8]) -> Result<Self, codec::Error> {
        Ok(Self { value: u8::decode(src)? })
    }
}

impl codec::Type for AttErrorCode {
    fn size(&self) -> usize {
        mem::size_of::<u8>()
    }
}

impl From<codec::Error> for AttErrorCode {
    fn from(_: codec::Error) -> Self {
        AttErrorCode::INVALID_PDU
    }
}

use codec::Decode as _;

/// An attribute request received from a client.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq)]
pub enum AttReq<'d> {
    /// Read the whole value of an attribute.
    Read { handle: u16 },
    /// Read the value of an attribute from an offset.
    ReadBlob { handle: u16, offset: u16 },
    /// Read every attribute of a type within a handle range.
    ReadByType {
        start: u16,
        end: u16,
        attribute_type: Uuid,
    },
    /// Write an attribute and expect an acknowledgement.
    Write { handle: u16, data: &'d [u8] },
    /// Write an attribute without acknowledgement.
    WriteCmd { handle: u16, data: &'d [u8] },
}

impl<'d> AttReq<'d> {
    /// Decode the request parameters following `opcode`.
    ///
    /// Opcodes this server does not handle decode to `InvalidValue`, truncated
    /// parameters to `InsufficientSpace`.
    pub fn decode_with_opcode(opcode: u8, mut r: ReadCursor<'d>) -> Result<AttReq<'d>, codec::Error> {
        match opcode {
            ATT_READ_REQ => Ok(Self::Read { handle: r.read()? }),
            ATT_READ_BLOB_REQ => {
                let handle = r.read()?;
                let offset = r.read()?;
                Ok(Self::ReadBlob { handle, offset })
            }
            ATT_READ_BY_TYPE_REQ => {
                let start = r.read()?;
                let end = r.read()?;
                let attribute_type = Uuid::decode(r.remaining())?;
                Ok(Self::ReadByType {
                    start,
                    end,
                    attribute_type,
                })
            }
            ATT_WRITE_REQ => {
                let handle = r.read()?;
                Ok(Self::Write {
                    handle,
                    data: r.remaining(),
                })
            }
            ATT_WRITE_CMD => {
                let handle = r.read()?;
                Ok(Self::WriteCmd {
                    handle,
                    data: r.remaining(),
                })
            }
            code => {
                warn!("[att] unknown opcode {:x}", code);
                Err(codec::Error::InvalidValue)
            }
        }
    }

    pub fn decode(data: &'d [u8]) -> Result<AttReq<'d>, codec::Error> {
        let mut r = ReadCursor::new(data);
        let opcode: u8 = r.read()?;
        AttReq::decode_with_opcode(opcode, r)
    }
}

/// An attribute response or notification sent by this server.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum AttRsp<'d> {
    Error {
        request: u8,
        handle: u16,
        code: AttErrorCode,
    },
    Read {
        data: &'d [u8],
    },
    ReadBlob {
        data: &'d [u8],
    },
    ReadByType {
        it: ReadByTypeIter<'d>,
    },
    Write,
    Notify {
        handle: u16,
        data: &'d [u8],
    },
}

/// Iterator over the `(handle, value)` pairs of a read-by-type response.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Debug)]
pub struct ReadByTypeIter<'d> {
    item_len: usize,
    cursor: ReadCursor<'d>,
}

impl<'d> ReadByTypeIter<'d> {
    pub fn next(&mut self) -> Option<Result<(u16, &'d [u8]), codec::Error>> {
        if self.item_len >= 2 && self.cursor.available() >= self.item_len {
            let res = (|| {
                let handle: u16 = self.cursor.read()?;
                let item = self.cursor.slice(self.item_len - 2)?;
                Ok((handle, item))
            })();
            Some(res)
        } else {
            None
        }
    }
}

impl<'d> AttRsp<'d> {
    pub fn decode(data: &'d [u8]) -> Result<AttRsp<'d>, codec::Error> {
        let mut r = ReadCursor::new(data);
        let opcode: u8 = r.read()?;
        AttRsp::decode_with_opcode(opcode, r)
    }

    pub fn decode_with_opcode(opcode: u8, mut r: ReadCursor<'d>) -> Result<AttRsp<'d>, codec::Error> {
        match opcode {
            ATT_ERROR_RSP => {
                let request = r.read()?;
                let handle = r.read()?;
                let code = r.read()?;
                Ok(Self::Error { request, handle, code })
            }
            ATT_READ_RSP => Ok(Self::Read { data: r.remaining() }),
            ATT_READ_BLOB_RSP => Ok(Self::ReadBlob { data: r.remaining() }),
            ATT_READ_BY_TYPE_RSP => {
                let item_len: u8 = r.read()?;
                Ok(Self::ReadByType {
                    it: ReadByTypeIter {
                        item_len: item_len as usize,
                        cursor: r,
                    },
                })
            }
            ATT_WRITE_RSP => Ok(Self::Write),
            ATT_HANDLE_VALUE_NTF => {
                let handle = r.read()?;
                Ok(Self::Notify {
                    handle,
                    data: r.remaining(),
                })
            }
            _ => Err(codec::Error::InvalidValue),
        }
    }
}

/// Write an `ATT_ERROR_RSP` for `request` into `w`, discarding anything written before.
pub(crate) fn error_response(
    mut w: WriteCursor<'_>,
    request: u8,
    handle: u16,
    code: AttErrorCode,
) -> Result<usize, codec::Error> {
    w.reset();
    w.write(ATT_ERROR_RSP)?;
    w.write(request)?;
    w.write(handle)?;
    w.write(code)?;
    Ok(w.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_read_by_type_with_short_uuid() {
        let pdu = [ATT_READ_BY_TYPE_REQ, 0x01, 0x00, 0xff, 0xff, 0x2b, 0x2a];
        let req = AttReq::decode(&pdu).unwrap();
        assert_eq!(
            req,
            AttReq::ReadByType {
                start: 0x0001,
                end: 0xffff,
                attribute_type: Uuid::new_short(0x2a2b),
            }
        );
    }

    #[test]
    fn decode_write_keeps_payload() {
        let pdu = [ATT_WRITE_REQ, 0x0b, 0x00, 0x01, 0x00];
        assert_eq!(
            AttReq::decode(&pdu).unwrap(),
            AttReq::Write {
                handle: 0x000b,
                data: &[0x01, 0x00],
            }
        );
    }

    #[test]
    fn truncated_request_is_rejected() {
        assert_eq!(AttReq::decode(&[ATT_READ_REQ, 0x01]), Err(codec::Error::InsufficientSpace));
        assert_eq!(
            AttReq::decode(&[ATT_READ_BY_TYPE_REQ, 0x01, 0x00, 0xff, 0xff, 0x2b]),
            Err(codec::Error::InvalidValue)
        );
    }

    #[test]
    fn unsupported_opcode_is_rejected() {
        // Exchange MTU request
        assert_eq!(AttReq::decode(&[0x02, 0x17, 0x00]), Err(codec::Error::InvalidValue));
    }

    #[test]
    fn error_response_layout() {
        let mut buf = [0u8; 8];
        let len = error_response(
            WriteCursor::new(&mut buf),
            ATT_READ_REQ,
            0x0102,
            AttErrorCode::INVALID_OFFSET,
        )
        .unwrap();
        assert_eq!(&buf[..len], &[ATT_ERROR_RSP, ATT_READ_REQ, 0x02, 0x01, 0x07]);
    }
}
