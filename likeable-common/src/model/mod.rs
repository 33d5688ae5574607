pub mod book;
pub mod entity;
pub mod like;
pub mod post;
pub mod subject;
pub mod user;

use crate::{
    model::entity::InvalidTypeTagError,
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    TypeTag(#[from] InvalidTypeTagError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct LikeableEpoch;
impl Epoch for LikeableEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type LikeableSnowflake = Snowflake<LikeableEpoch>;
pub type LikeableSnowflakeGenerator = SnowflakeGenerator<LikeableEpoch>;

/// A snowflake tagged with the kind of object it identifies.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<Marker>(
    LikeableSnowflake,
    #[serde(skip)] PhantomData<Marker>,
);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: LikeableSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> LikeableSnowflake {
        self.0
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<LikeableSnowflake> for Id<Marker> {
    fn from(value: LikeableSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(LikeableSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}
