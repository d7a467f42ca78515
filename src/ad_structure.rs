//! Advertising data structures.
use crate::codec;
use crate::cursor::ReadCursor;

const AD_FLAGS: u8 = 0x01;
const AD_SHORTENED_LOCAL_NAME: u8 = 0x08;
const AD_COMPLETE_LOCAL_NAME: u8 = 0x09;

/// One structure of advertising or scan response data.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities.
    Flags(u8),

    /// The full (unabbreviated) device name.
    CompleteLocalName(&'a [u8]),

    /// The shortened device name.
    ShortenedLocalName(&'a [u8]),

    /// An unknown or unimplemented AD structure stored as raw bytes.
    Unknown {
        /// Type byte.
        ty: u8,
        /// Raw data transmitted after the type.
        data: &'a [u8],
    },
}

impl<'d> AdStructure<'d> {
    /// Iterate over the structures in `data`.
    ///
    /// A zero length field ends the data. The iterator stops after the first error.
    pub fn decode(data: &[u8]) -> AdStructureIter<'_> {
        AdStructureIter {
            cursor: ReadCursor::new(data),
            done: false,
        }
    }
}

/// Iterator over encoded advertising data.
pub struct AdStructureIter<'d> {
    cursor: ReadCursor<'d>,
    done: bool,
}

impl<'d> AdStructureIter<'d> {
    fn read(&mut self) -> Result<Option<AdStructure<'d>>, codec::Error> {
        let len: u8 = self.cursor.read()?;
        if len == 0 {
            return Ok(None);
        }
        let code: u8 = self.cursor.read()?;
        let data = self.cursor.slice(len as usize - 1)?;
        match code {
            AD_FLAGS => match data {
                [flags] => Ok(Some(AdStructure::Flags(*flags))),
                _ => Err(codec::Error::InvalidValue),
            },
            AD_SHORTENED_LOCAL_NAME => Ok(Some(AdStructure::ShortenedLocalName(data))),
            AD_COMPLETE_LOCAL_NAME => Ok(Some(AdStructure::CompleteLocalName(data))),
            ty => Ok(Some(AdStructure::Unknown { ty, data })),
        }
    }
}

impl<'d> Iterator for AdStructureIter<'d> {
    type Item = Result<AdStructure<'d>, codec::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor.available() == 0 {
            return None;
        }
        match self.read() {
            Ok(Some(ad)) => Some(Ok(ad)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// The complete local name carried in advertising data, if any.
///
/// Malformed data yields `None`.
pub fn complete_local_name(data: &[u8]) -> Option<&[u8]> {
    for ad in AdStructure::decode(data) {
        match ad {
            Ok(AdStructure::CompleteLocalName(name)) => return Some(name),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
    None
}
