//! Cursors for building and parsing PDUs in caller-owned buffers.

use crate::codec::{Decode, Encode, Error};

/// Tracks the write position in a borrowed buffer.
pub struct WriteCursor<'d> {
    pos: usize,
    data: &'d mut [u8],
}

impl<'d> WriteCursor<'d> {
    /// Creates a new write cursor at the beginning of the data.
    pub fn new(data: &'d mut [u8]) -> Self {
        Self { pos: 0, data }
    }

    /// Discard everything written so far.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Split off `nbytes` at the current position so a header can be written after its body.
    pub fn split(&mut self, nbytes: usize) -> Result<(WriteCursor<'_>, WriteCursor<'_>), Error> {
        if self.available() < nbytes {
            Err(Error::InsufficientSpace)
        } else {
            let (first, second) = self.data[self.pos..].split_at_mut(nbytes);
            Ok((
                WriteCursor { data: first, pos: 0 },
                WriteCursor { pos: 0, data: second },
            ))
        }
    }

    /// Append raw bytes.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.available() < data.len() {
            Err(Error::InsufficientSpace)
        } else {
            self.data[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            Ok(())
        }
    }

    /// Encode `data` at the current position.
    pub fn write<E: Encode>(&mut self, data: E) -> Result<(), Error> {
        let size = data.size();
        if self.available() < size {
            Err(Error::InsufficientSpace)
        } else {
            data.encode(&mut self.data[self.pos..self.pos + size])?;
            self.pos += size;
            Ok(())
        }
    }

    /// The unwritten tail of the buffer. Bytes placed there count once passed to [`Self::commit`].
    pub fn write_buf(&mut self) -> &mut [u8] {
        &mut self.data[self.pos..]
    }

    /// Advance past `len` bytes filled in through [`Self::write_buf`].
    pub fn commit(&mut self, len: usize) -> Result<(), Error> {
        if self.available() < len {
            Err(Error::InsufficientSpace)
        } else {
            self.pos += len;
            Ok(())
        }
    }

    /// Bytes left.
    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Bytes written.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// The written prefix of the buffer.
    pub fn finish(self) -> &'d mut [u8] {
        &mut self.data[..self.pos]
    }
}

/// Tracks the read position in a received PDU.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub struct ReadCursor<'d> {
    pos: usize,
    data: &'d [u8],
}

impl<'d> ReadCursor<'d> {
    pub fn new(data: &'d [u8]) -> Self {
        Self { pos: 0, data }
    }

    pub fn read<T: Decode<'d>>(&mut self) -> Result<T, Error> {
        let val = T::decode(&self.data[self.pos..])?;
        self.pos += val.size();
        Ok(val)
    }

    pub fn slice(&mut self, nbytes: usize) -> Result<&'d [u8], Error> {
        let src = self
            .data
            .get(self.pos..self.pos + nbytes)
            .ok_or(Error::InsufficientSpace)?;
        self.pos += nbytes;
        Ok(src)
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Everything not yet read.
    pub fn remaining(self) -> &'d [u8] {
        &self.data[self.pos..]
    }
}
