use crate::{
    capability::{Entity, Likeable},
    model::{Id, entity::TypeTag},
};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct BookMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Book {
    pub id: Id<BookMarker>,
    pub title: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreateBook {
    pub title: String,
}

impl Entity for Book {
    const TYPE_TAG: TypeTag = TypeTag::from_static("book");

    fn entity_id(&self) -> u64 {
        self.id.get()
    }
}

impl Likeable for Book {}
