use likeable_common::model::ModelValidationError;
use likeable_common::model::book::Book;
use likeable_common::model::entity::{EntityRef, TypeTag};
use likeable_common::model::like::Like;
use likeable_common::model::post::Post;
use likeable_common::model::user::User;
use sqlx::FromRow;
use time::{PrimitiveDateTime, UtcDateTime};

pub(crate) const LIKE_COLUMNS: &str =
    "like_snowflake, likeable_type, likeable_id, liker_type, liker_id, created_at";

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct LikeRecord {
    pub like_snowflake: i64,
    pub likeable_type: String,
    pub likeable_id: i64,
    pub liker_type: String,
    pub liker_id: i64,
    pub created_at: PrimitiveDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct BookRecord {
    pub book_snowflake: i64,
    pub title: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub title: String,
}

/// Bind parameters for the columns identifying one side of a like.
pub(crate) fn ref_params(reference: &EntityRef) -> (&str, i64) {
    (reference.type_tag.get(), reference.id.cast_signed())
}

pub(crate) fn to_primitive(time: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(time.date(), time.time())
}

impl TryFrom<LikeRecord> for Like {
    type Error = ModelValidationError;

    fn try_from(value: LikeRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.like_snowflake.cast_unsigned().into(),
            likeable: EntityRef::new(
                TypeTag::new(value.likeable_type)?,
                value.likeable_id.cast_unsigned(),
            ),
            liker: EntityRef::new(TypeTag::new(value.liker_type)?, value.liker_id.cast_unsigned()),
            created_at: value.created_at.as_utc(),
        })
    }
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        Self {
            id: value.user_snowflake.cast_unsigned().into(),
            name: value.name,
        }
    }
}

impl From<BookRecord> for Book {
    fn from(value: BookRecord) -> Self {
        Self {
            id: value.book_snowflake.cast_unsigned().into(),
            title: value.title,
        }
    }
}

impl From<PostRecord> for Post {
    fn from(value: PostRecord) -> Self {
        Self {
            id: value.post_snowflake.cast_unsigned().into(),
            title: value.title,
        }
    }
}
