//! Little endian wire codec shared by the ATT PDUs and the Current Time payload.

/// Types with one encoded length.
pub trait FixedSize: Sized {
    const SIZE: usize;
}

/// Types that know their encoded length.
pub trait Type: Sized {
    fn size(&self) -> usize;
}

pub trait Encode: Type {
    /// Encode into `dest`, which is exactly [`Type::size`] bytes long.
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error>;
}

pub trait Decode<'d>: Type {
    /// Decode from the front of `src`.
    fn decode(src: &'d [u8]) -> Result<Self, Error>;
}

impl<T: FixedSize> Type for T {
    fn size(&self) -> usize {
        Self::SIZE
    }
}

/// Errors produced while encoding or decoding wire types.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The source or destination buffer is too short.
    InsufficientSpace,
    /// The bytes do not describe a valid value.
    InvalidValue,
}

impl FixedSize for u8 {
    const SIZE: usize = 1;
}

impl FixedSize for u16 {
    const SIZE: usize = 2;
}

impl Decode<'_> for u8 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        src.first().copied().ok_or(Error::InsufficientSpace)
    }
}

impl Decode<'_> for u16 {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        match src {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(Error::InsufficientSpace),
        }
    }
}

impl Encode for u8 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let b = dest.first_mut().ok_or(Error::InsufficientSpace)?;
        *b = *self;
        Ok(())
    }
}

impl Encode for u16 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let d = dest.get_mut(..2).ok_or(Error::InsufficientSpace)?;
        d.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}
