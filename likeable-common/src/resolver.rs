//! Turns the [`EntityRef`]s stored in like records back into domain objects.

use crate::{
    capability::Entity,
    model::entity::{EntityRef, TypeTag},
    store::LikeStoreError,
};
use std::{
    collections::HashMap,
    error::Error as StdError,
    fmt::{Debug, Formatter},
    pin::Pin,
};
use thiserror::Error;

pub type LookupError = Box<dyn StdError + Send + Sync>;

type LookupFuture<T> = Pin<Box<dyn Future<Output = Result<Option<T>, LookupError>> + Send>>;
type Lookup<T> = Box<dyn Fn(u64) -> LookupFuture<T> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No entity found for {0}")]
    NotFound(EntityRef),
    #[error("No lookup is registered for type tag {0}")]
    UnregisteredType(TypeTag),
    #[error("Looking up {reference} failed: {source}")]
    Lookup {
        reference: EntityRef,
        #[source]
        source: LookupError,
    },
    #[error(transparent)]
    Store(#[from] LikeStoreError),
}

/// Registry of lookup functions, one per type tag, all producing a `T`.
///
/// `T` is usually an enum over the domain types that take part in likes.
pub struct Resolver<T> {
    lookups: HashMap<TypeTag, Lookup<T>>,
}

impl<T: 'static> Resolver<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lookups: HashMap::new(),
        }
    }

    /// Registers `lookup` for `type_tag`, replacing any earlier registration.
    ///
    /// The lookup returns `Ok(None)` when no entity has the id.
    pub fn register<F, Fut, E>(&mut self, type_tag: TypeTag, lookup: F) -> &mut Self
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
        E: Into<LookupError> + 'static,
    {
        let lookup: Lookup<T> = Box::new(move |id| -> LookupFuture<T> {
            let future = lookup(id);
            Box::pin(async move { future.await.map_err(Into::into) })
        });
        self.lookups.insert(type_tag, lookup);
        self
    }

    /// Registers a lookup for the entity type `D` under its own type tag.
    pub fn register_entity<D, F, Fut, E>(&mut self, lookup: F) -> &mut Self
    where
        D: Entity + Into<T> + 'static,
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<D>, E>> + Send + 'static,
        E: Into<LookupError> + 'static,
    {
        self.register(D::TYPE_TAG, move |id| {
            let future = lookup(id);
            async move { future.await.map(|entity| entity.map(Into::into)) }
        })
    }

    #[must_use]
    pub fn is_registered(&self, type_tag: &TypeTag) -> bool {
        self.lookups.contains_key(type_tag)
    }

    pub async fn resolve(&self, reference: &EntityRef) -> Result<T, ResolveError> {
        let lookup = self
            .lookups
            .get(&reference.type_tag)
            .ok_or_else(|| ResolveError::UnregisteredType(reference.type_tag.clone()))?;

        lookup(reference.id)
            .await
            .map_err(|source| ResolveError::Lookup {
                reference: reference.clone(),
                source,
            })?
            .ok_or_else(|| ResolveError::NotFound(reference.clone()))
    }
}

impl<T: 'static> Default for Resolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Resolver<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("type_tags", &self.lookups.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        capability::Entity,
        model::{
            Id,
            entity::{EntityRef, TypeTag},
            post::Post,
            subject::Subject,
            user::User,
        },
        resolver::{ResolveError, Resolver},
    };
    use std::{convert::Infallible, fmt};

    #[derive(Debug)]
    struct Offline;

    impl fmt::Display for Offline {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("database offline")
        }
    }

    impl std::error::Error for Offline {}

    fn resolver() -> Resolver<Subject> {
        let mut resolver = Resolver::new();
        resolver
            .register_entity(|id| async move {
                Ok::<_, Infallible>((id == 7).then(|| User {
                    id: Id::from(id),
                    name: "alice".to_owned(),
                }))
            })
            .register_entity(|_id| async { Err::<Option<Post>, _>(Offline) });
        resolver
    }

    #[tokio::test]
    async fn resolves_registered_types() {
        let resolver = resolver();
        let reference = EntityRef::new(User::TYPE_TAG, 7u64);

        let subject = resolver.resolve(&reference).await.unwrap();
        assert_eq!(subject.entity_ref(), reference);
        assert!(resolver.is_registered(&User::TYPE_TAG));
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let reference = EntityRef::new(User::TYPE_TAG, 8u64);

        assert!(matches!(
            resolver().resolve(&reference).await,
            Err(ResolveError::NotFound(missing)) if missing == reference
        ));
    }

    #[tokio::test]
    async fn unknown_type_tag_is_reported() {
        let reference = EntityRef::new(TypeTag::from_static("comment"), 1u64);

        assert!(matches!(
            resolver().resolve(&reference).await,
            Err(ResolveError::UnregisteredType(tag)) if tag.get() == "comment"
        ));
    }

    #[tokio::test]
    async fn lookup_failures_propagate() {
        let reference = EntityRef::new(Post::TYPE_TAG, 1u64);

        let err = resolver().resolve(&reference).await.unwrap_err();
        assert_eq!(err.to_string(), "Looking up post#1 failed: database offline");
    }
}
