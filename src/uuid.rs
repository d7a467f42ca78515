//! Attribute type UUIDs.

use crate::codec::{Decode, Encode, Error, Type};

/// A 16-bit or 128-bit UUID, stored little endian as it appears on the wire.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Uuid {
    /// Bluetooth SIG assigned number.
    Uuid16([u8; 2]),
    /// Vendor UUID.
    Uuid128([u8; 16]),
}

impl From<u16> for Uuid {
    fn from(data: u16) -> Self {
        Self::new_short(data)
    }
}

impl Uuid {
    /// Create a 16-bit UUID.
    pub const fn new_short(val: u16) -> Self {
        Self::Uuid16(val.to_le_bytes())
    }

    /// Create a 128-bit UUID from little endian bytes.
    pub const fn new_long(val: [u8; 16]) -> Self {
        Self::Uuid128(val)
    }

    /// The assigned number, for 16-bit UUIDs.
    pub fn as_short(&self) -> Option<u16> {
        match self {
            Uuid::Uuid16(data) => Some(u16::from_le_bytes(*data)),
            Uuid::Uuid128(_) => None,
        }
    }

    /// Wire bytes.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Uuid::Uuid16(uuid) => uuid,
            Uuid::Uuid128(uuid) => uuid,
        }
    }
}

impl Type for Uuid {
    fn size(&self) -> usize {
        self.as_raw().len()
    }
}

/// Decodes a UUID that occupies the whole of `src`, which must be 2 or 16 bytes long.
impl Decode<'_> for Uuid {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        match src {
            [lo, hi] => Ok(Uuid::Uuid16([*lo, *hi])),
            _ => <[u8; 16]>::try_from(src)
                .map(Uuid::Uuid128)
                .map_err(|_| Error::InvalidValue),
        }
    }
}

impl Encode for Uuid {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let raw = self.as_raw();
        dest.get_mut(..raw.len())
            .ok_or(Error::InsufficientSpace)?
            .copy_from_slice(raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_by_length() {
        assert_eq!(Uuid::decode(&[0x2b, 0x2a]), Ok(Uuid::new_short(0x2a2b)));
        assert_eq!(Uuid::decode(&[0u8; 16]), Ok(Uuid::new_long([0; 16])));
        assert_eq!(Uuid::decode(&[0x2b, 0x2a, 0x00]), Err(Error::InvalidValue));
        assert_eq!(Uuid::decode(&[]), Err(Error::InvalidValue));
    }

    #[test]
    fn short_value() {
        assert_eq!(Uuid::from(0x2902u16).as_short(), Some(0x2902));
        assert_eq!(Uuid::new_long([1; 16]).as_short(), None);
    }
}
