use crate::{
    capability::Entity,
    model::{book::Book, entity::EntityRef, post::Post, user::User},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Any of the fixture entities, as produced by a resolver.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    Book(Book),
    Post(Post),
    User(User),
}

impl Subject {
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            Subject::Book(book) => book.entity_ref(),
            Subject::Post(post) => post.entity_ref(),
            Subject::User(user) => user.entity_ref(),
        }
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Book(book) => write!(f, "{} {:?}", book.entity_ref(), book.title),
            Subject::Post(post) => write!(f, "{} {:?}", post.entity_ref(), post.title),
            Subject::User(user) => write!(f, "{} {:?}", user.entity_ref(), user.name),
        }
    }
}

impl From<Book> for Subject {
    fn from(value: Book) -> Self {
        Self::Book(value)
    }
}

impl From<Post> for Subject {
    fn from(value: Post) -> Self {
        Self::Post(value)
    }
}

impl From<User> for Subject {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}
