//! Storage of like records.
//!
//! [`LikeStore`] is the single source of truth both capabilities delegate
//! to. Implementations must enforce the uniqueness of a (likeable, liker)
//! pair atomically, never by a separate existence check followed by an
//! insert.

pub mod memory;

use crate::{
    model::{
        Id, ModelValidationError,
        entity::EntityRef,
        like::{Like, LikeMarker, LikeState},
    },
    resolver::{ResolveError, Resolver},
    snowflake::SnowflakeTimestampError,
};
use std::error::Error as StdError;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

pub type Result<T, E = LikeStoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum LikeStoreError {
    #[error("{liker} already likes {likeable}")]
    DuplicateLike {
        likeable: EntityRef,
        liker: EntityRef,
    },
    #[error("Like storage is unavailable: {0}")]
    StorageUnavailable(#[source] Box<dyn StdError + Send + Sync>),
    #[error("Like storage returned invalid data: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate a like id: {0}")]
    IdGeneration(#[from] SnowflakeTimestampError),
}

impl LikeStoreError {
    pub fn unavailable(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::StorageUnavailable(source.into())
    }
}

pub trait LikeStore: Send + Sync {
    /// Records that `liker` likes `likeable`.
    ///
    /// Fails with [`LikeStoreError::DuplicateLike`] if the pair already has a
    /// record.
    fn create(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> impl Future<Output = Result<Like>> + Send;

    /// Removes the record for the pair, returning whether one existed.
    fn delete(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn exists(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Flips the state of the pair, reading and writing in one atomic unit.
    fn toggle(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> impl Future<Output = Result<LikeState>> + Send;

    /// Number of likers of `likeable`.
    fn count_for(&self, likeable: &EntityRef) -> impl Future<Output = Result<u64>> + Send;

    /// Number of entities `liker` likes.
    fn count_by(&self, liker: &EntityRef) -> impl Future<Output = Result<u64>> + Send;

    /// Up to `limit` likes of `likeable` with ids greater than `after`, by
    /// ascending id.
    fn likers_page(
        &self,
        likeable: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Like>>> + Send;

    /// Up to `limit` likes by `liker` with ids greater than `after`, by
    /// ascending id.
    fn liked_page(
        &self,
        liker: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Like>>> + Send;

    fn list_likers(&self, likeable: &EntityRef) -> LikeCursor<'_, Self>
    where
        Self: Sized,
    {
        LikeCursor::new(self, CursorSide::Likers(likeable.clone()))
    }

    fn list_liked(&self, liker: &EntityRef) -> LikeCursor<'_, Self>
    where
        Self: Sized,
    {
        LikeCursor::new(self, CursorSide::Liked(liker.clone()))
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
enum CursorSide {
    Likers(EntityRef),
    Liked(EntityRef),
}

/// Lazily walks the likes on one side of a relation, one page at a time.
///
/// Nothing is fetched until a page is requested. The cursor ends after the
/// first short page; list again to start over.
#[derive(Debug)]
pub struct LikeCursor<'s, S> {
    store: &'s S,
    side: CursorSide,
    after: Option<Id<LikeMarker>>,
    page_size: u32,
    exhausted: bool,
}

impl<'s, S: LikeStore> LikeCursor<'s, S> {
    fn new(store: &'s S, side: CursorSide) -> Self {
        Self {
            store,
            side,
            after: None,
            page_size: DEFAULT_PAGE_SIZE,
            exhausted: false,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The next page of like records, or `None` once the cursor is done.
    pub async fn next_likes(&mut self) -> Result<Option<Vec<Like>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = match &self.side {
            CursorSide::Likers(likeable) => {
                self.store
                    .likers_page(likeable, self.after, self.page_size)
                    .await?
            }
            CursorSide::Liked(liker) => {
                self.store
                    .liked_page(liker, self.after, self.page_size)
                    .await?
            }
        };

        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        match page.last() {
            Some(last) => {
                self.after = Some(last.id);
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    /// The next page of references on the far side of the relation: likers
    /// when walking a likeable, liked entities when walking a liker.
    pub async fn next_page(&mut self) -> Result<Option<Vec<EntityRef>>> {
        let likers = matches!(self.side, CursorSide::Likers(_));
        let page = self.next_likes().await?.map(|likes| {
            likes
                .into_iter()
                .map(|like| if likers { like.liker } else { like.likeable })
                .collect()
        });
        Ok(page)
    }

    pub async fn collect_all(mut self) -> Result<Vec<EntityRef>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }

    /// Like [`next_page`](Self::next_page), but resolves every reference.
    pub async fn next_resolved_page<T: 'static>(
        &mut self,
        resolver: &Resolver<T>,
    ) -> Result<Option<Vec<T>>, ResolveError> {
        let Some(page) = self.next_page().await? else {
            return Ok(None);
        };

        let mut resolved = Vec::with_capacity(page.len());
        for reference in &page {
            resolved.push(resolver.resolve(reference).await?);
        }
        Ok(Some(resolved))
    }

    pub async fn resolve_all<T: 'static>(
        mut self,
        resolver: &Resolver<T>,
    ) -> Result<Vec<T>, ResolveError> {
        let mut all = Vec::new();
        while let Some(page) = self.next_resolved_page(resolver).await? {
            all.extend(page);
        }
        Ok(all)
    }
}
