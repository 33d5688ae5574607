use crate::{
    capability::{Entity, Likeable, Liker},
    model::{Id, entity::TypeTag},
};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// Users like things, and can be liked themselves.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreateUser {
    pub name: String,
}

impl Entity for User {
    const TYPE_TAG: TypeTag = TypeTag::from_static("user");

    fn entity_id(&self) -> u64 {
        self.id.get()
    }
}

impl Likeable for User {}
impl Liker for User {}
