//! Like behavior for domain entities.
//!
//! Both sides of the relation funnel into the same store calls, so
//! `book.like(&store, &user)` and `user.like_entity(&store, &book)` are
//! indistinguishable afterwards.

use crate::{
    model::{
        entity::{EntityRef, TypeTag},
        like::LikeState,
    },
    store::{LikeCursor, LikeStore, LikeStoreError, Result},
};
use tracing::debug;

/// Anything with a stable type tag and id.
pub trait Entity {
    const TYPE_TAG: TypeTag;

    fn entity_id(&self) -> u64;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::TYPE_TAG, self.entity_id())
    }
}

/// Records a like between two references. An existing like is left as is.
pub async fn like_refs<S: LikeStore>(
    store: &S,
    likeable: &EntityRef,
    liker: &EntityRef,
) -> Result<()> {
    match store.create(likeable, liker).await {
        Ok(like) => {
            debug!(%likeable, %liker, like_id = %like.id, "Recorded like");
            Ok(())
        }
        Err(LikeStoreError::DuplicateLike { .. }) => {
            debug!(%likeable, %liker, "Already liked");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn unlike_pair<S: LikeStore>(
    store: &S,
    likeable: &EntityRef,
    liker: &EntityRef,
) -> Result<()> {
    if store.delete(likeable, liker).await? {
        debug!(%likeable, %liker, "Removed like");
    } else {
        debug!(%likeable, %liker, "Nothing to unlike");
    }
    Ok(())
}

async fn toggle_pair<S: LikeStore>(
    store: &S,
    likeable: &EntityRef,
    liker: &EntityRef,
) -> Result<LikeState> {
    let state = store.toggle(likeable, liker).await?;
    debug!(%likeable, %liker, %state, "Toggled like");
    Ok(state)
}

/// An entity that can be liked.
pub trait Likeable: Entity {
    /// Likes `self` on behalf of `liker`. Liking twice is a no-op.
    fn like<S: LikeStore, L: Liker>(
        &self,
        store: &S,
        liker: &L,
    ) -> impl Future<Output = Result<()>> + Send {
        let (likeable, liker) = (self.entity_ref(), liker.entity_ref());
        async move { like_refs(store, &likeable, &liker).await }
    }

    /// Removes the like of `liker`, if there is one.
    fn unlike<S: LikeStore, L: Liker>(
        &self,
        store: &S,
        liker: &L,
    ) -> impl Future<Output = Result<()>> + Send {
        let (likeable, liker) = (self.entity_ref(), liker.entity_ref());
        async move { unlike_pair(store, &likeable, &liker).await }
    }

    /// Likes if not liked, unlikes otherwise, and returns the new state.
    fn toggle_like<S: LikeStore, L: Liker>(
        &self,
        store: &S,
        liker: &L,
    ) -> impl Future<Output = Result<LikeState>> + Send {
        let (likeable, liker) = (self.entity_ref(), liker.entity_ref());
        async move { toggle_pair(store, &likeable, &liker).await }
    }

    fn likes_count<S: LikeStore>(&self, store: &S) -> impl Future<Output = Result<u64>> + Send {
        let likeable = self.entity_ref();
        async move { store.count_for(&likeable).await }
    }

    fn is_liked_by<S: LikeStore, L: Liker>(
        &self,
        store: &S,
        liker: &L,
    ) -> impl Future<Output = Result<bool>> + Send {
        let (likeable, liker) = (self.entity_ref(), liker.entity_ref());
        async move { store.exists(&likeable, &liker).await }
    }

    /// References to everyone who likes `self`, oldest like first.
    fn likers<'s, S: LikeStore>(&self, store: &'s S) -> LikeCursor<'s, S> {
        store.list_likers(&self.entity_ref())
    }
}

/// An entity that can like other entities.
pub trait Liker: Entity {
    fn like_entity<S: LikeStore, T: Likeable>(
        &self,
        store: &S,
        target: &T,
    ) -> impl Future<Output = Result<()>> + Send {
        let (likeable, liker) = (target.entity_ref(), self.entity_ref());
        async move { like_refs(store, &likeable, &liker).await }
    }

    fn unlike_entity<S: LikeStore, T: Likeable>(
        &self,
        store: &S,
        target: &T,
    ) -> impl Future<Output = Result<()>> + Send {
        let (likeable, liker) = (target.entity_ref(), self.entity_ref());
        async move { unlike_pair(store, &likeable, &liker).await }
    }

    fn toggle_like_entity<S: LikeStore, T: Likeable>(
        &self,
        store: &S,
        target: &T,
    ) -> impl Future<Output = Result<LikeState>> + Send {
        let (likeable, liker) = (target.entity_ref(), self.entity_ref());
        async move { toggle_pair(store, &likeable, &liker).await }
    }

    fn has_liked<S: LikeStore, T: Likeable>(
        &self,
        store: &S,
        target: &T,
    ) -> impl Future<Output = Result<bool>> + Send {
        let (likeable, liker) = (target.entity_ref(), self.entity_ref());
        async move { store.exists(&likeable, &liker).await }
    }

    fn liked_count<S: LikeStore>(&self, store: &S) -> impl Future<Output = Result<u64>> + Send {
        let liker = self.entity_ref();
        async move { store.count_by(&liker).await }
    }

    /// References to everything `self` likes, oldest like first.
    fn liked_entities<'s, S: LikeStore>(&self, store: &'s S) -> LikeCursor<'s, S> {
        store.list_liked(&self.entity_ref())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        capability::{Entity, Likeable, Liker, like_refs},
        model::{
            Id, LikeableSnowflake,
            book::Book,
            entity::EntityRef,
            like::{Like, LikeMarker, LikeState},
            post::Post,
            subject::Subject,
            user::User,
        },
        resolver::{ResolveError, Resolver},
        store::{LikeStore, LikeStoreError, Result, memory::MemoryLikeStore},
    };
    use std::{collections::HashMap, convert::Infallible, sync::Arc};

    fn book(id: u64, title: &str) -> Book {
        Book {
            id: Id::from(id),
            title: title.to_owned(),
        }
    }

    fn user(id: u64, name: &str) -> User {
        User {
            id: Id::new(LikeableSnowflake::new(id)),
            name: name.to_owned(),
        }
    }

    /// A store whose backend is always unreachable.
    struct Offline;

    fn offline<T>() -> Result<T> {
        Err(LikeStoreError::unavailable("connection refused"))
    }

    impl LikeStore for Offline {
        async fn create(&self, _: &EntityRef, _: &EntityRef) -> Result<Like> {
            offline()
        }

        async fn delete(&self, _: &EntityRef, _: &EntityRef) -> Result<bool> {
            offline()
        }

        async fn exists(&self, _: &EntityRef, _: &EntityRef) -> Result<bool> {
            offline()
        }

        async fn toggle(&self, _: &EntityRef, _: &EntityRef) -> Result<LikeState> {
            offline()
        }

        async fn count_for(&self, _: &EntityRef) -> Result<u64> {
            offline()
        }

        async fn count_by(&self, _: &EntityRef) -> Result<u64> {
            offline()
        }

        async fn likers_page(
            &self,
            _: &EntityRef,
            _: Option<Id<LikeMarker>>,
            _: u32,
        ) -> Result<Vec<Like>> {
            offline()
        }

        async fn liked_page(
            &self,
            _: &EntityRef,
            _: Option<Id<LikeMarker>>,
            _: u32,
        ) -> Result<Vec<Like>> {
            offline()
        }
    }

    fn is_unavailable<T>(result: &Result<T>) -> bool {
        matches!(result, Err(LikeStoreError::StorageUnavailable(source))
            if source.to_string() == "connection refused")
    }

    #[tokio::test]
    async fn storage_failures_are_not_swallowed() {
        let book = book(1, "Dune");
        let alice = user(7, "alice");

        assert!(is_unavailable(&book.like(&Offline, &alice).await));
        assert!(is_unavailable(&book.unlike(&Offline, &alice).await));
        assert!(is_unavailable(&book.toggle_like(&Offline, &alice).await));
        assert!(is_unavailable(&book.likes_count(&Offline).await));
        assert!(is_unavailable(&book.is_liked_by(&Offline, &alice).await));
        assert!(is_unavailable(&book.likers(&Offline).collect_all().await));

        assert!(is_unavailable(&alice.like_entity(&Offline, &book).await));
        assert!(is_unavailable(&alice.unlike_entity(&Offline, &book).await));
        assert!(is_unavailable(&alice.has_liked(&Offline, &book).await));
        assert!(is_unavailable(&alice.liked_count(&Offline).await));
        assert!(is_unavailable(
            &alice.liked_entities(&Offline).next_page().await
        ));

        let resolved = book
            .likers(&Offline)
            .resolve_all(&Resolver::<Subject>::new())
            .await;
        assert!(matches!(
            resolved,
            Err(ResolveError::Store(LikeStoreError::StorageUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn like_refs_ignores_existing_likes() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune").entity_ref();
        let alice = user(7, "alice").entity_ref();

        like_refs(&store, &book, &alice).await.unwrap();
        like_refs(&store, &book, &alice).await.unwrap();
        assert_eq!(store.count_for(&book).await.unwrap(), 1);

        assert!(is_unavailable(&like_refs(&Offline, &book, &alice).await));
    }

    #[tokio::test]
    async fn like_increments_count_by_one() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune");
        let alice = user(7, "alice");
        let bob = user(8, "bob");

        book.like(&store, &alice).await.unwrap();
        let before = book.likes_count(&store).await.unwrap();
        assert!(!book.is_liked_by(&store, &bob).await.unwrap());

        book.like(&store, &bob).await.unwrap();
        assert!(book.is_liked_by(&store, &bob).await.unwrap());
        assert_eq!(book.likes_count(&store).await.unwrap(), before + 1);
    }

    #[tokio::test]
    async fn like_is_idempotent() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune");
        let alice = user(7, "alice");

        book.like(&store, &alice).await.unwrap();
        let once = book.likes_count(&store).await.unwrap();
        book.like(&store, &alice).await.unwrap();

        assert_eq!(book.likes_count(&store).await.unwrap(), once);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unlike_of_never_liked_pair_is_silent() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune");
        let alice = user(7, "alice");
        book.like(&store, &user(8, "bob")).await.unwrap();

        book.unlike(&store, &alice).await.unwrap();
        assert_eq!(book.likes_count(&store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn toggle_twice_restores_state() {
        let store = MemoryLikeStore::default();
        let post = Post {
            id: Id::from(3u64),
            title: "Hello".to_owned(),
        };
        let alice = user(7, "alice");

        assert_eq!(
            post.toggle_like(&store, &alice).await.unwrap(),
            LikeState::Liked
        );
        assert_eq!(
            post.toggle_like(&store, &alice).await.unwrap(),
            LikeState::Unliked
        );
        assert!(!post.is_liked_by(&store, &alice).await.unwrap());

        post.like(&store, &alice).await.unwrap();
        assert_eq!(
            alice.toggle_like_entity(&store, &post).await.unwrap(),
            LikeState::Unliked
        );
        assert_eq!(
            alice.toggle_like_entity(&store, &post).await.unwrap(),
            LikeState::Liked
        );
        assert!(post.is_liked_by(&store, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn both_sides_see_the_same_record() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune");
        let alice = user(7, "alice");
        let bob = user(8, "bob");

        book.like(&store, &alice).await.unwrap();
        bob.like_entity(&store, &book).await.unwrap();

        assert!(alice.has_liked(&store, &book).await.unwrap());
        assert!(book.is_liked_by(&store, &bob).await.unwrap());

        alice.unlike_entity(&store, &book).await.unwrap();
        assert!(!book.is_liked_by(&store, &alice).await.unwrap());
        assert_eq!(book.likes_count(&store).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn users_can_like_each_other() {
        let store = MemoryLikeStore::default();
        let alice = user(7, "alice");
        let bob = user(8, "bob");

        alice.like_entity(&store, &bob).await.unwrap();

        assert!(bob.is_liked_by(&store, &alice).await.unwrap());
        assert!(!alice.is_liked_by(&store, &bob).await.unwrap());
        assert_eq!(alice.liked_count(&store).await.unwrap(), 1);
        assert_eq!(bob.liked_count(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn book_and_user_scenario() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune");
        let user = user(7, "alice");

        book.like(&store, &user).await.unwrap();
        assert_eq!(book.likes_count(&store).await.unwrap(), 1);
        assert!(book.is_liked_by(&store, &user).await.unwrap());
        assert_eq!(
            user.liked_entities(&store).collect_all().await.unwrap(),
            vec![book.entity_ref()]
        );
        assert_eq!(
            book.likers(&store).collect_all().await.unwrap(),
            vec![user.entity_ref()]
        );

        let mut resolver = Resolver::<Subject>::new();
        let books = Arc::new(HashMap::from([(1u64, book.clone())]));
        resolver.register_entity(move |id| {
            let books = Arc::clone(&books);
            async move { Ok::<_, Infallible>(books.get(&id).cloned()) }
        });
        assert_eq!(
            user.liked_entities(&store)
                .resolve_all(&resolver)
                .await
                .unwrap(),
            vec![Subject::Book(book.clone())]
        );

        book.unlike(&store, &user).await.unwrap();
        assert_eq!(book.likes_count(&store).await.unwrap(), 0);
        assert!(!user.has_liked(&store, &book).await.unwrap());
        assert!(
            user.liked_entities(&store)
                .collect_all()
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn stale_likes_surface_not_found() {
        let store = MemoryLikeStore::default();
        let book = book(1, "Dune");
        let user = user(7, "alice");
        book.like(&store, &user).await.unwrap();

        let mut resolver = Resolver::<Subject>::new();
        resolver.register_entity(|_id| async { Ok::<Option<Book>, Infallible>(None) });

        let result = user.liked_entities(&store).resolve_all(&resolver).await;
        assert!(matches!(
            result,
            Err(ResolveError::NotFound(reference)) if reference == book.entity_ref()
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_likes_leave_one_record() {
        let store = Arc::new(MemoryLikeStore::default());
        let book = Arc::new(book(1, "Dune"));
        let alice = Arc::new(user(7, "alice"));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let (store, book, alice) =
                    (Arc::clone(&store), Arc::clone(&book), Arc::clone(&alice));
                tokio::spawn(async move { book.like(&*store, &*alice).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(book.likes_count(&*store).await.unwrap(), 1);
        assert_eq!(
            store
                .list_likers(&book.entity_ref())
                .collect_all()
                .await
                .unwrap(),
            vec![EntityRef::new(User::TYPE_TAG, 7u64)]
        );
    }
}
