//! Attribute storage.
use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::att::AttErrorCode;
use crate::config::ATT_VALUE_MAX_LEN;
pub use crate::uuid::Uuid;
use crate::Error;

/// UUID for primary service
pub const PRIMARY_SERVICE_UUID16: Uuid = Uuid::new_short(0x2800);

/// UUID for characteristic declaration
pub const CHARACTERISTIC_UUID16: Uuid = Uuid::new_short(0x2803);

/// UUID for characteristic notification/indication
pub const CHARACTERISTIC_CCCD_UUID16: Uuid = Uuid::new_short(0x2902);

/// UUID for the current time service
pub const CURRENT_TIME_SERVICE_UUID16: Uuid = Uuid::new_short(0x1805);

/// UUID for the current time characteristic
pub const CURRENT_TIME_UUID16: Uuid = Uuid::new_short(0x2a2b);

/// Characteristic properties
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum CharacteristicProp {
    /// Broadcast
    Broadcast = 0x01,
    /// Read
    Read = 0x02,
    /// Write without response
    WriteWithoutResponse = 0x04,
    /// Write
    Write = 0x08,
    /// Notify
    Notify = 0x10,
    /// Indicate
    Indicate = 0x20,
    /// Authenticated writes
    AuthenticatedWrite = 0x40,
    /// Extended properties
    Extended = 0x80,
}

/// A set of characteristic properties.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProps(u8);

impl<'a> From<&'a [CharacteristicProp]> for CharacteristicProps {
    fn from(props: &'a [CharacteristicProp]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= *prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl<const N: usize> From<[CharacteristicProp; N]> for CharacteristicProps {
    fn from(props: [CharacteristicProp; N]) -> Self {
        Self::from(&props[..])
    }
}

impl CharacteristicProps {
    /// Check if any of the properties are set.
    pub fn any(&self, props: &[CharacteristicProp]) -> bool {
        props.iter().any(|p| self.0 & (*p as u8) != 0)
    }

    /// Whether a client may read the value.
    pub fn readable(&self) -> bool {
        self.any(&[CharacteristicProp::Read])
    }

    /// Whether a client may write the value, with or without response.
    pub fn writable(&self) -> bool {
        self.any(&[
            CharacteristicProp::Write,
            CharacteristicProp::WriteWithoutResponse,
            CharacteristicProp::AuthenticatedWrite,
        ])
    }
}

/// An attribute record.
///
/// The value lives in caller provided storage; the storage length is the maximum
/// value length, and the current length starts out as the full storage.
pub struct Attribute<'d> {
    pub(crate) uuid: Uuid,
    pub(crate) handle: u16,
    pub(crate) props: CharacteristicProps,
    pub(crate) value: &'d mut [u8],
    pub(crate) len: usize,
}

impl<'d> Attribute<'d> {
    /// Create a new attribute whose current value is the whole of `storage`.
    pub fn new<U: Into<Uuid>, P: Into<CharacteristicProps>>(
        handle: u16,
        uuid: U,
        props: P,
        storage: &'d mut [u8],
    ) -> Self {
        let len = storage.len();
        Self {
            uuid: uuid.into(),
            handle,
            props: props.into(),
            value: storage,
            len,
        }
    }

    /// Set the current value length, the rest of the storage is spare capacity.
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    fn info(&self) -> AttributeInfo {
        AttributeInfo {
            handle: self.handle,
            uuid: self.uuid.clone(),
            props: self.props,
            len: self.len as u16,
            max_len: self.value.len() as u16,
        }
    }

    fn value(&self) -> &[u8] {
        &self.value[..self.len]
    }
}

impl<'d> fmt::Debug for Attribute<'d> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("uuid", &self.uuid)
            .field("handle", &self.handle)
            .field("readable", &self.props.readable())
            .field("writable", &self.props.writable())
            .field("len", &self.len)
            .field("max_len", &self.value.len())
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<'d> defmt::Format for Attribute<'d> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", defmt::Debug2Format(self))
    }
}

/// A snapshot of the metadata of an attribute.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    /// Attribute handle.
    pub handle: u16,
    /// Attribute type.
    pub uuid: Uuid,
    /// Characteristic properties.
    pub props: CharacteristicProps,
    /// Current value length.
    pub len: u16,
    /// Maximum value length.
    pub max_len: u16,
}

/// The attribute database.
///
/// The set of handles is fixed when the store is created, only values change
/// afterwards. Every access locks the store for the duration of a copy.
pub struct AttributeStore<'d, M: RawMutex, const MAX: usize> {
    inner: Mutex<M, RefCell<Vec<Attribute<'d>, MAX>>>,
}

impl<'d, M: RawMutex, const MAX: usize> AttributeStore<'d, M, MAX> {
    /// Create a store from attributes ordered by ascending handle.
    ///
    /// Fails if a handle is zero, duplicated or out of order, if a current length exceeds
    /// the storage, if a storage exceeds the maximum attribute length, or if there are more
    /// than `MAX` attributes.
    pub fn new<I: IntoIterator<Item = Attribute<'d>>>(attributes: I) -> Result<Self, Error> {
        let mut table: Vec<Attribute<'d>, MAX> = Vec::new();
        let mut last = 0u16;
        for att in attributes {
            if att.handle <= last {
                warn!("[store] handle {} is zero or not ascending", att.handle);
                return Err(Error::InvalidConfiguration);
            }
            if att.value.len() > ATT_VALUE_MAX_LEN || att.len > att.value.len() {
                warn!(
                    "[store] handle {}: length {} with capacity {}",
                    att.handle,
                    att.len,
                    att.value.len()
                );
                return Err(Error::InvalidConfiguration);
            }
            last = att.handle;
            if table.push(att).is_err() {
                warn!("[store] more than {} attributes", MAX);
                return Err(Error::InvalidConfiguration);
            }
        }
        Ok(Self {
            inner: Mutex::new(RefCell::new(table)),
        })
    }

    fn with_attribute<F: FnOnce(&mut Attribute<'d>) -> R, R>(&self, handle: u16, f: F) -> Option<R> {
        self.inner.lock(|inner| {
            let mut table = inner.borrow_mut();
            // Handles are sorted, so a binary search finds the record.
            let idx = table.binary_search_by_key(&handle, |att| att.handle).ok()?;
            Some(f(&mut table[idx]))
        })
    }

    /// Number of attributes in the store.
    pub fn len(&self) -> usize {
        self.inner.lock(|inner| inner.borrow().len())
    }

    /// Whether the store holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up the metadata of an attribute.
    pub fn find(&self, handle: u16) -> Option<AttributeInfo> {
        self.with_attribute(handle, |att| att.info())
    }

    /// Copy the value of an attribute, starting at `offset`, into `dest`.
    ///
    /// Returns the number of bytes copied, which is bounded by `dest.len()`.
    pub fn read(&self, handle: u16, offset: u16, dest: &mut [u8]) -> Result<usize, AttErrorCode> {
        self.with_attribute(handle, |att| {
            let offset = offset as usize;
            if offset >= att.len {
                return Err(AttErrorCode::INVALID_OFFSET);
            }
            let len = dest.len().min(att.len - offset);
            dest[..len].copy_from_slice(&att.value[offset..offset + len]);
            Ok(len)
        })
        .unwrap_or(Err(AttErrorCode::INVALID_HANDLE))
    }

    /// Replace the value of an attribute.
    pub fn write(&self, handle: u16, data: &[u8]) -> Result<(), AttErrorCode> {
        self.with_attribute(handle, |att| {
            if data.len() > att.value.len() {
                return Err(AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH);
            }
            att.value[..data.len()].copy_from_slice(data);
            att.len = data.len();
            Ok(())
        })
        .unwrap_or(Err(AttErrorCode::INVALID_HANDLE))
    }

    /// Run `f` with the whole current value of an attribute.
    pub fn with_value<F: FnOnce(&[u8]) -> R, R>(&self, handle: u16, f: F) -> Result<R, AttErrorCode> {
        self.with_attribute(handle, |att| f(att.value()))
            .ok_or(AttErrorCode::INVALID_HANDLE)
    }

    /// Find the first handle in `start..=end` whose type is `uuid`.
    pub fn next_by_type(&self, uuid: &Uuid, start: u16, end: u16) -> Option<u16> {
        self.inner.lock(|inner| {
            inner
                .borrow()
                .iter()
                .find(|att| att.handle >= start && att.handle <= end && &att.uuid == uuid)
                .map(|att| att.handle)
        })
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use proptest::prelude::*;

    use super::*;

    const VALUE_UUID: Uuid = Uuid::new_short(0x2a19);

    #[test]
    fn read_respects_offset_and_capacity() {
        let mut storage = [1, 2, 3, 4, 5];
        let store: AttributeStore<'_, NoopRawMutex, 4> =
            AttributeStore::new([Attribute::new(3, VALUE_UUID, [CharacteristicProp::Read], &mut storage)]).unwrap();

        let mut out = [0u8; 2];
        assert_eq!(store.read(3, 1, &mut out), Ok(2));
        assert_eq!(out, [2, 3]);

        let mut out = [0u8; 8];
        assert_eq!(store.read(3, 3, &mut out), Ok(2));
        assert_eq!(&out[..2], &[4, 5]);

        assert_eq!(store.read(3, 5, &mut out), Err(AttErrorCode::INVALID_OFFSET));
        assert_eq!(store.read(4, 0, &mut out), Err(AttErrorCode::INVALID_HANDLE));
    }

    #[test]
    fn write_updates_current_length() {
        let mut storage = [0u8; 4];
        let store: AttributeStore<'_, NoopRawMutex, 4> = AttributeStore::new([Attribute::new(
            7,
            VALUE_UUID,
            [CharacteristicProp::Write],
            &mut storage,
        )
        .with_len(0)])
        .unwrap();

        assert_eq!(store.find(7).map(|i| (i.len, i.max_len)), Some((0, 4)));
        assert_eq!(store.write(7, &[9, 8]), Ok(()));
        assert_eq!(store.find(7).map(|i| i.len), Some(2));
        assert_eq!(store.with_value(7, |v| v == [9, 8]), Ok(true));
    }

    #[test]
    fn oversized_write_leaves_value_untouched() {
        let mut storage = [0xaa, 0xbb];
        let store: AttributeStore<'_, NoopRawMutex, 4> =
            AttributeStore::new([Attribute::new(1, VALUE_UUID, [CharacteristicProp::Write], &mut storage)]).unwrap();

        assert_eq!(
            store.write(1, &[1, 2, 3]),
            Err(AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH)
        );
        assert_eq!(store.with_value(1, |v| v == [0xaa, 0xbb]), Ok(true));
        assert_eq!(store.write(2, &[1]), Err(AttErrorCode::INVALID_HANDLE));
    }

    #[test]
    fn next_by_type_walks_range() {
        let (mut a, mut b, mut c) = ([0u8; 1], [0u8; 1], [0u8; 1]);
        let store: AttributeStore<'_, NoopRawMutex, 4> = AttributeStore::new([
            Attribute::new(1, VALUE_UUID, [CharacteristicProp::Read], &mut a),
            Attribute::new(2, CHARACTERISTIC_CCCD_UUID16, [CharacteristicProp::Read], &mut b),
            Attribute::new(5, VALUE_UUID, [CharacteristicProp::Read], &mut c),
        ])
        .unwrap();

        assert_eq!(store.next_by_type(&VALUE_UUID, 1, 0xffff), Some(1));
        assert_eq!(store.next_by_type(&VALUE_UUID, 2, 0xffff), Some(5));
        assert_eq!(store.next_by_type(&VALUE_UUID, 2, 4), None);
        assert_eq!(store.next_by_type(&VALUE_UUID, 6, 0xffff), None);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let (mut a, mut b) = ([0u8; 1], [0u8; 1]);
        let unordered: Result<AttributeStore<'_, NoopRawMutex, 4>, _> = AttributeStore::new([
            Attribute::new(2, VALUE_UUID, [CharacteristicProp::Read], &mut a),
            Attribute::new(2, VALUE_UUID, [CharacteristicProp::Read], &mut b),
        ]);
        assert!(matches!(unordered, Err(Error::InvalidConfiguration)));

        let mut c = [0u8; 1];
        let zero: Result<AttributeStore<'_, NoopRawMutex, 4>, _> =
            AttributeStore::new([Attribute::new(0, VALUE_UUID, [CharacteristicProp::Read], &mut c)]);
        assert!(matches!(zero, Err(Error::InvalidConfiguration)));

        let mut d = [0u8; 1];
        let overlong: Result<AttributeStore<'_, NoopRawMutex, 4>, _> =
            AttributeStore::new([Attribute::new(1, VALUE_UUID, [CharacteristicProp::Read], &mut d).with_len(2)]);
        assert!(matches!(overlong, Err(Error::InvalidConfiguration)));

        let (mut e, mut f) = ([0u8; 1], [0u8; 1]);
        let full: Result<AttributeStore<'_, NoopRawMutex, 1>, _> = AttributeStore::new([
            Attribute::new(1, VALUE_UUID, [CharacteristicProp::Read], &mut e),
            Attribute::new(2, VALUE_UUID, [CharacteristicProp::Read], &mut f),
        ]);
        assert!(matches!(full, Err(Error::InvalidConfiguration)));
    }

    // Handles 2, 4 and 6, each with 8 bytes of storage of which the first `len` are in use.
    fn with_store<R>(len: usize, f: impl FnOnce(&AttributeStore<'_, NoopRawMutex, 4>) -> R) -> R {
        let (mut a, mut b, mut c) = ([0x11u8; 8], [0x22u8; 8], [0x33u8; 8]);
        let props = [CharacteristicProp::Read, CharacteristicProp::Write];
        let store = AttributeStore::new([
            Attribute::new(2, VALUE_UUID, props, &mut a).with_len(len),
            Attribute::new(4, VALUE_UUID, props, &mut b).with_len(len),
            Attribute::new(6, VALUE_UUID, props, &mut c).with_len(len),
        ])
        .unwrap();
        f(&store)
    }

    proptest! {
        #[test]
        fn absent_handles_are_invalid(handle in any::<u16>().prop_filter("present", |h| ![2, 4, 6].contains(h)),
                                      offset in any::<u16>(),
                                      data in proptest::collection::vec(any::<u8>(), 0..8)) {
            with_store(8, |store| {
                let mut out = [0u8; 8];
                prop_assert!(store.find(handle).is_none());
                prop_assert_eq!(store.read(handle, offset, &mut out), Err(AttErrorCode::INVALID_HANDLE));
                prop_assert_eq!(store.write(handle, &data), Err(AttErrorCode::INVALID_HANDLE));
                Ok(())
            })?;
        }

        #[test]
        fn offsets_past_the_value_are_invalid(len in 0usize..=8, offset in any::<u16>()) {
            with_store(len, |store| {
                let mut out = [0u8; 8];
                let result = store.read(4, offset, &mut out);
                if offset as usize >= len {
                    prop_assert_eq!(result, Err(AttErrorCode::INVALID_OFFSET));
                } else {
                    prop_assert_eq!(result, Ok(len - offset as usize));
                    prop_assert!(out[..len - offset as usize].iter().all(|b| *b == 0x22));
                }
                Ok(())
            })?;
        }

        #[test]
        fn oversized_writes_change_nothing(len in 0usize..=8, data in proptest::collection::vec(any::<u8>(), 9..64)) {
            with_store(len, |store| {
                prop_assert_eq!(store.write(4, &data), Err(AttErrorCode::INVALID_ATTRIBUTE_VALUE_LENGTH));
                prop_assert_eq!(store.find(4).map(|i| i.len as usize), Some(len));
                prop_assert_eq!(store.with_value(4, |v| v.iter().all(|b| *b == 0x22)), Ok(true));
                Ok(())
            })?;
        }
    }
}
