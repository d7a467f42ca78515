//! Current Time Service characteristic payload.
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::attribute::AttributeStore;
use crate::codec::{Decode, Encode, Error, FixedSize};
use crate::cursor::{ReadCursor, WriteCursor};
use crate::transport::Clock;

/// A civil date and time, as read from the hardware clock.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    /// Year, 0 when unknown, otherwise 1582 to 9999.
    pub year: u16,
    /// Month of the year, 1 to 12.
    pub month: u8,
    /// Day of the month, 1 to 31.
    pub day: u8,
    /// Hours, 0 to 23.
    pub hours: u8,
    /// Minutes, 0 to 59.
    pub minutes: u8,
    /// Seconds, 0 to 59.
    pub seconds: u8,
}

impl DateTime {
    /// Create a date and time, validating every field.
    pub fn new(year: u16, month: u8, day: u8, hours: u8, minutes: u8, seconds: u8) -> Result<Self, Error> {
        if year != 0 && !(1582..=9999).contains(&year) {
            return Err(Error::InvalidValue);
        }
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(Error::InvalidValue);
        }
        if hours > 23 || minutes > 59 || seconds > 59 {
            return Err(Error::InvalidValue);
        }
        Ok(Self {
            year,
            month,
            day,
            hours,
            minutes,
            seconds,
        })
    }

    /// Day of the week, 1 for Monday through 7 for Sunday.
    pub fn day_of_week(&self) -> u8 {
        day_of_week(self.day, self.month, self.year)
    }
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Day of the week by Zeller's congruence, 1 for Monday through 7 for Sunday.
///
/// January and February count as months 13 and 14 of the previous year.
pub fn day_of_week(day: u8, month: u8, year: u16) -> u8 {
    let (m, y) = if month < 3 {
        (month as i32 + 12, year as i32 - 1)
    } else {
        (month as i32, year as i32)
    };
    let k = y.rem_euclid(100);
    let c = y.div_euclid(100);
    // h = 0 is Saturday
    let h = day as i32 + (13 * (m + 1)) / 5 + k + k / 4 + c.div_euclid(4) + 5 * c;
    ((h + 5).rem_euclid(7) + 1) as u8
}

/// The Current Time characteristic value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentTime {
    /// Date and time fields.
    pub date_time: DateTime,
    /// Day of the week, 0 when unknown, otherwise 1 for Monday through 7 for Sunday.
    pub day_of_week: u8,
    /// Fractions of a second in 1/256 units.
    pub fractions256: u8,
    /// Adjust reason bitfield.
    pub adjust_reason: u8,
}

impl FixedSize for CurrentTime {
    const SIZE: usize = 10;
}

impl Encode for CurrentTime {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        let mut w = WriteCursor::new(dest);
        let dt = &self.date_time;
        w.write(dt.year)?;
        w.write(dt.month)?;
        w.write(dt.day)?;
        w.write(dt.hours)?;
        w.write(dt.minutes)?;
        w.write(dt.seconds)?;
        w.write(self.day_of_week)?;
        w.write(self.fractions256)?;
        w.write(self.adjust_reason)?;
        Ok(())
    }
}

impl Decode<'_> for CurrentTime {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        let mut r = ReadCursor::new(src);
        let year: u16 = r.read()?;
        let month: u8 = r.read()?;
        let day: u8 = r.read()?;
        let hours: u8 = r.read()?;
        let minutes: u8 = r.read()?;
        let seconds: u8 = r.read()?;
        let date_time = DateTime::new(year, month, day, hours, minutes, seconds)?;
        let day_of_week: u8 = r.read()?;
        if day_of_week > 7 {
            return Err(Error::InvalidValue);
        }
        Ok(Self {
            date_time,
            day_of_week,
            fractions256: r.read()?,
            adjust_reason: r.read()?,
        })
    }
}

/// Build the characteristic value for a point in time.
pub fn encode(now: &DateTime) -> CurrentTime {
    CurrentTime {
        date_time: *now,
        day_of_week: now.day_of_week(),
        fractions256: 0,
        adjust_reason: 0,
    }
}

/// Recover the date and time fields from a characteristic value.
///
/// The value must be exactly [`CurrentTime::SIZE`] bytes.
pub fn decode(bytes: &[u8]) -> Result<DateTime, Error> {
    if bytes.len() != CurrentTime::SIZE {
        return Err(Error::InvalidValue);
    }
    Ok(CurrentTime::decode(bytes)?.date_time)
}

/// Read the clock and store the encoded time as the current value of `handle`.
pub(crate) fn refresh<M: RawMutex, C: Clock, const MAX: usize>(
    store: &AttributeStore<'_, M, MAX>,
    handle: u16,
    clock: &C,
) -> Result<[u8; CurrentTime::SIZE], crate::Error> {
    let now = clock.now()?;
    let mut value = [0; CurrentTime::SIZE];
    encode(&now).encode(&mut value)?;
    store.write(handle, &value)?;
    Ok(value)
}
