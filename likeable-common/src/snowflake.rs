//! Snowflake ids for like records and fixture entities.
//!
//! Layout, most significant bit first: 42 bits of milliseconds since the
//! [`Epoch`], 5 bits worker id, 5 bits process id, 12 bits increment.
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_OFFSET: u64 = 22;
pub const TIMESTAMP_LENGTH: u64 = 42;
pub const WORKER_ID_OFFSET: u64 = 17;
pub const WORKER_ID_LENGTH: u64 = 5;
pub const PROCESS_ID_OFFSET: u64 = 12;
pub const PROCESS_ID_LENGTH: u64 = 5;
pub const INCREMENT_OFFSET: u64 = 0;
pub const INCREMENT_LENGTH: u64 = 12;

const fn mask(length: u64) -> u64 {
    (1 << length) - 1
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Snowflake part was out of range: {0}")]
pub struct SnowflakePartOutOfRangeError(u64);

/// Declares a bounded integer newtype for one field of a snowflake.
macro_rules! snowflake_part {
    ($(#[$meta:meta])* $name:ident: $repr:ty, len = $length:ident, offset = $offset:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            #[allow(clippy::cast_possible_truncation)]
            pub const MAX: Self = Self(mask($length) as $repr);

            #[must_use]
            pub fn new(value: $repr) -> Option<Self> {
                (u64::from(value) <= mask($length)).then_some(Self(value))
            }

            #[must_use]
            pub fn new_unchecked(value: $repr) -> Self {
                Self::new(value).expect(concat!(stringify!($name), " out of range."))
            }

            #[must_use]
            pub fn get(self) -> $repr {
                self.0
            }

            fn extract(snowflake: u64) -> Self {
                #[allow(clippy::cast_possible_truncation)]
                Self(((snowflake >> $offset) & mask($length)) as $repr)
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: $repr) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError(value.into()))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = <$repr>::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

snowflake_part!(
    /// Identifies the machine generating snowflakes.
    WorkerId: u8, len = WORKER_ID_LENGTH, offset = WORKER_ID_OFFSET
);
snowflake_part!(
    /// Identifies the process on a worker generating snowflakes.
    ProcessId: u8, len = PROCESS_ID_LENGTH, offset = PROCESS_ID_OFFSET
);
snowflake_part!(SnowflakeIncrement: u16, len = INCREMENT_LENGTH, offset = INCREMENT_OFFSET);

impl SnowflakeIncrement {
    /// The following increment, wrapping around to zero.
    #[must_use]
    pub fn next(self) -> Self {
        Self((self.0 + 1) & Self::MAX.0)
    }
}

/// Milliseconds since `E::EPOCH_TIME`, limited to 42 bits.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SnowflakeTimestamp<E>(u64, PhantomData<E>);

impl<E> SnowflakeTimestamp<E> {
    #[must_use]
    pub fn new(millis: u64) -> Option<Self> {
        (millis <= mask(TIMESTAMP_LENGTH)).then_some(Self(millis, PhantomData))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn now() -> Result<Self, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        Self::try_from(UtcDateTime::now())
    }
}

impl<E: Epoch> TryFrom<UtcDateTime> for SnowflakeTimestamp<E> {
    type Error = SnowflakeTimestampError;

    fn try_from(value: UtcDateTime) -> Result<Self, Self::Error> {
        let millis = (value - E::EPOCH_TIME).whole_milliseconds();
        let millis = u64::try_from(millis).map_err(|_| {
            if millis < 0 {
                Self::Error::TimeBeforeEpoch
            } else {
                Self::Error::TimestampTooLarge
            }
        })?;
        Self::new(millis).ok_or(Self::Error::TimestampTooLarge)
    }
}

impl<E: Epoch> From<SnowflakeTimestamp<E>> for UtcDateTime {
    fn from(value: SnowflakeTimestamp<E>) -> Self {
        // 42 bits always fit into an i64.
        #[allow(clippy::cast_possible_wrap)]
        let millis = value.0 as i64;
        E::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<E>(u64, #[serde(skip)] PhantomData<E>);

impl<E> Snowflake<E> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp: SnowflakeTimestamp<E>,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: SnowflakeIncrement,
    ) -> Self {
        Self::new(
            timestamp.get() << TIMESTAMP_OFFSET
                | u64::from(worker_id.get()) << WORKER_ID_OFFSET
                | u64::from(process_id.get()) << PROCESS_ID_OFFSET
                | u64::from(increment.get()) << INCREMENT_OFFSET,
        )
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp(self) -> SnowflakeTimestamp<E> {
        SnowflakeTimestamp(self.0 >> TIMESTAMP_OFFSET, PhantomData)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        WorkerId::extract(self.0)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        ProcessId::extract(self.0)
    }

    #[must_use]
    pub fn increment(self) -> SnowflakeIncrement {
        SnowflakeIncrement::extract(self.0)
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        E: Epoch,
    {
        self.timestamp().into()
    }
}

impl<E> Display for Snowflake<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<E> From<u64> for Snowflake<E> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<E> From<Snowflake<E>> for u64 {
    fn from(value: Snowflake<E>) -> Self {
        value.get()
    }
}

/// Hands out strictly increasing snowflakes for one worker/process pair.
///
/// When the increment wraps within a single millisecond, the generator moves
/// on to the next millisecond instead of repeating an id.
#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct SnowflakeGenerator<E> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last: Option<(u64, SnowflakeIncrement)>,
    phantom_data: PhantomData<E>,
}

impl<E> SnowflakeGenerator<E> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last: None,
            phantom_data: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<E>, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        let millis = SnowflakeTimestamp::<E>::try_from(time)?.get();

        let (millis, increment) = match self.last {
            Some((last_millis, last_increment)) if millis <= last_millis => {
                let increment = last_increment.next();
                if increment == SnowflakeIncrement::default() {
                    (last_millis + 1, increment)
                } else {
                    (last_millis, increment)
                }
            }
            _ => (millis, SnowflakeIncrement::default()),
        };
        let timestamp =
            SnowflakeTimestamp::new(millis).ok_or(SnowflakeTimestampError::TimestampTooLarge)?;
        self.last = Some((millis, increment));

        Ok(Snowflake::from_parts(
            timestamp,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<E>, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeIncrement, SnowflakeTimestamp,
        SnowflakeTimestampError, WorkerId,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-1-1 00:00);
    }

    #[test]
    fn part_ranges() {
        assert!(SnowflakeTimestamp::<MillennialEpoch>::new(0x03FF_FFFF_FFFF).is_some());
        assert!(SnowflakeTimestamp::<MillennialEpoch>::new(0x0400_0000_0000).is_none());

        for legal_id in [0, 0xD, 0x1F] {
            assert!(WorkerId::new(legal_id).is_some());
            assert!(ProcessId::new(legal_id).is_some());
        }
        for illegal_id in [0x20, 0xF0, u8::MAX] {
            assert!(WorkerId::new(illegal_id).is_none());
            assert!(ProcessId::new(illegal_id).is_none());
        }

        assert!(SnowflakeIncrement::new(0xFFF).is_some());
        assert!(SnowflakeIncrement::new(0x1000).is_none());
    }

    #[test]
    fn timestamp_bounds() {
        let time = utc_datetime!(2025-10-24 10:00);
        let timestamp = SnowflakeTimestamp::<MillennialEpoch>::try_from(time).unwrap();
        assert_eq!(UtcDateTime::from(timestamp), time);

        assert_eq!(
            SnowflakeTimestamp::<MillennialEpoch>::try_from(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimestampError::TimeBeforeEpoch)
        );
        assert_eq!(
            SnowflakeTimestamp::<MillennialEpoch>::try_from(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimestampError::TimestampTooLarge)
        );
    }

    #[test]
    fn increment_wraps() {
        assert_eq!(
            SnowflakeIncrement::new_unchecked(100).next(),
            SnowflakeIncrement::new_unchecked(101)
        );
        assert_eq!(
            SnowflakeIncrement::new_unchecked(0xFFF).next(),
            SnowflakeIncrement::new_unchecked(0)
        );
    }

    #[test]
    fn pack_and_unpack() {
        let timestamp =
            SnowflakeTimestamp::<MillennialEpoch>::try_from(utc_datetime!(2025-10-24 10:30))
                .unwrap();
        let worker_id = WorkerId::new_unchecked(0b10101);
        let process_id = ProcessId::new_unchecked(0b10001);
        let increment = SnowflakeIncrement::new_unchecked(100);

        let snowflake =
            Snowflake::<MillennialEpoch>::from_parts(timestamp, worker_id, process_id, increment);

        assert_eq!(snowflake.get(), 3_416_751_341_570_822_244);
        assert_eq!(snowflake.timestamp(), timestamp);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), increment);
        assert_eq!(snowflake.created_at(), utc_datetime!(2025-10-24 10:30));
    }

    #[test]
    fn generator_is_strictly_increasing() {
        let worker_id = WorkerId::new_unchecked(10);
        let process_id = ProcessId::new_unchecked(0);
        let time = utc_datetime!(2025-10-24 10:55);

        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(worker_id, process_id);

        let first = generator.generate_at(time).unwrap();
        assert_eq!(first.increment(), SnowflakeIncrement::new_unchecked(0));
        assert_eq!(first.worker_id(), worker_id);

        let mut previous = first;
        for _ in 0..5000 {
            let next = generator.generate_at(time).unwrap();
            assert!(next > previous);
            previous = next;
        }
        assert_eq!(
            previous.timestamp().get(),
            first.timestamp().get() + 1,
            "wrapping the increment must move to the next millisecond"
        );

        // A clock going backwards never yields a smaller id.
        let earlier = generator
            .generate_at(time - Duration::seconds(1))
            .unwrap();
        assert!(earlier > previous);
    }
}
