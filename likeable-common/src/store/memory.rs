use crate::{
    model::{
        Id, LikeableSnowflakeGenerator,
        entity::EntityRef,
        like::{Like, LikeMarker, LikeState},
    },
    snowflake::{ProcessId, WorkerId},
    store::{LikeStore, LikeStoreError, Result},
};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Mutex, MutexGuard, PoisonError},
};

type Pair = (EntityRef, EntityRef);

#[derive(Debug)]
struct MemoryState {
    snowflake_generator: LikeableSnowflakeGenerator,
    likes: BTreeMap<Id<LikeMarker>, Like>,
    by_pair: HashMap<Pair, Id<LikeMarker>>,
    likes_for: HashMap<EntityRef, u64>,
    likes_by: HashMap<EntityRef, u64>,
}

fn increment(counts: &mut HashMap<EntityRef, u64>, reference: &EntityRef) {
    *counts.entry(reference.clone()).or_default() += 1;
}

fn decrement(counts: &mut HashMap<EntityRef, u64>, reference: &EntityRef) {
    if let Some(count) = counts.get_mut(reference) {
        *count -= 1;
        if *count == 0 {
            counts.remove(reference);
        }
    }
}

/// A [`LikeStore`] kept in process memory.
///
/// All state sits behind one mutex, so every operation, `toggle` included,
/// is atomic.
#[derive(Debug)]
pub struct MemoryLikeStore {
    state: Mutex<MemoryState>,
}

impl MemoryLikeStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                snowflake_generator: LikeableSnowflakeGenerator::new(worker_id, process_id),
                likes: BTreeMap::new(),
                by_pair: HashMap::new(),
                likes_for: HashMap::new(),
                likes_by: HashMap::new(),
            }),
        }
    }

    /// Total number of like records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().likes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // No operation leaves the state half-updated, so a poisoned lock is
        // still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryLikeStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

impl MemoryState {
    fn insert(&mut self, likeable: &EntityRef, liker: &EntityRef) -> Result<Like> {
        let pair = (likeable.clone(), liker.clone());
        if self.by_pair.contains_key(&pair) {
            return Err(LikeStoreError::DuplicateLike {
                likeable: pair.0,
                liker: pair.1,
            });
        }

        let snowflake = self.snowflake_generator.generate()?;
        let like = Like {
            id: snowflake.into(),
            likeable: pair.0.clone(),
            liker: pair.1.clone(),
            created_at: snowflake.created_at(),
        };
        increment(&mut self.likes_for, likeable);
        increment(&mut self.likes_by, liker);
        self.by_pair.insert(pair, like.id);
        self.likes.insert(like.id, like.clone());
        Ok(like)
    }

    fn remove(&mut self, likeable: &EntityRef, liker: &EntityRef) -> bool {
        let pair = (likeable.clone(), liker.clone());
        let Some(id) = self.by_pair.remove(&pair) else {
            return false;
        };
        decrement(&mut self.likes_for, likeable);
        decrement(&mut self.likes_by, liker);
        self.likes.remove(&id).is_some()
    }

    fn page(
        &self,
        after: Option<Id<LikeMarker>>,
        limit: u32,
        filter: impl Fn(&Like) -> bool,
    ) -> Vec<Like> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.likes
            .range((lower, Bound::Unbounded))
            .map(|(_, like)| like)
            .filter(|&like| filter(like))
            .take(limit as usize)
            .cloned()
            .collect()
    }
}

impl LikeStore for MemoryLikeStore {
    async fn create(&self, likeable: &EntityRef, liker: &EntityRef) -> Result<Like> {
        self.lock().insert(likeable, liker)
    }

    async fn delete(&self, likeable: &EntityRef, liker: &EntityRef) -> Result<bool> {
        Ok(self.lock().remove(likeable, liker))
    }

    async fn exists(&self, likeable: &EntityRef, liker: &EntityRef) -> Result<bool> {
        let pair = (likeable.clone(), liker.clone());
        Ok(self.lock().by_pair.contains_key(&pair))
    }

    async fn toggle(&self, likeable: &EntityRef, liker: &EntityRef) -> Result<LikeState> {
        let mut state = self.lock();
        if state.remove(likeable, liker) {
            Ok(LikeState::Unliked)
        } else {
            state.insert(likeable, liker)?;
            Ok(LikeState::Liked)
        }
    }

    async fn count_for(&self, likeable: &EntityRef) -> Result<u64> {
        Ok(self.lock().likes_for.get(likeable).copied().unwrap_or(0))
    }

    async fn count_by(&self, liker: &EntityRef) -> Result<u64> {
        Ok(self.lock().likes_by.get(liker).copied().unwrap_or(0))
    }

    async fn likers_page(
        &self,
        likeable: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> Result<Vec<Like>> {
        Ok(self
            .lock()
            .page(after, limit, |like| &like.likeable == likeable))
    }

    async fn liked_page(
        &self,
        liker: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> Result<Vec<Like>> {
        Ok(self.lock().page(after, limit, |like| &like.liker == liker))
    }
}
