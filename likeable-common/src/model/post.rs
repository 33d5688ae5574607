use crate::{
    capability::{Entity, Likeable},
    model::{Id, entity::TypeTag},
};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub title: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CreatePost {
    pub title: String,
}

impl Entity for Post {
    const TYPE_TAG: TypeTag = TypeTag::from_static("post");

    fn entity_id(&self) -> u64 {
        self.id.get()
    }
}

impl Likeable for Post {}
