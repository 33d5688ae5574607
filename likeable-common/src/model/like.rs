use crate::model::{Id, entity::EntityRef};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct LikeMarker;

/// A record that `liker` liked `likeable`.
///
/// Records are only ever created and deleted, never updated.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Like {
    pub id: Id<LikeMarker>,
    pub likeable: EntityRef,
    pub liker: EntityRef,
    pub created_at: UtcDateTime,
}

/// Whether a liker currently likes a likeable entity.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeState {
    Liked,
    Unliked,
}

impl LikeState {
    #[must_use]
    pub fn is_liked(self) -> bool {
        self == Self::Liked
    }
}

impl From<bool> for LikeState {
    fn from(liked: bool) -> Self {
        if liked { Self::Liked } else { Self::Unliked }
    }
}

impl Display for LikeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Liked => "liked",
            Self::Unliked => "unliked",
        })
    }
}
