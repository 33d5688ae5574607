use crate::config::DbConfig;
use crate::record::{
    BookRecord, LIKE_COLUMNS, LikeRecord, PostRecord, UserRecord, ref_params, to_primitive,
};
use likeable_common::model::book::{Book, BookMarker, CreateBook};
use likeable_common::model::entity::EntityRef;
use likeable_common::model::like::{Like, LikeMarker, LikeState};
use likeable_common::model::post::{CreatePost, Post, PostMarker};
use likeable_common::model::subject::Subject;
use likeable_common::model::user::{CreateUser, User, UserMarker};
use likeable_common::model::{
    Id, LikeableSnowflake, LikeableSnowflakeGenerator, ModelValidationError,
};
use likeable_common::resolver::Resolver;
use likeable_common::snowflake::{ProcessId, SnowflakeTimestampError, WorkerId};
use likeable_common::store::{LikeStore, LikeStoreError};
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, query, query_as, query_scalar};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, instrument};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

const LIKES_PAIR_UNIQUE: &str = "likes_pair_unique";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    IdGeneration(#[from] SnowflakeTimestampError),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<DbError> for LikeStoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Data(err) => LikeStoreError::Data(err),
            DbError::IdGeneration(err) => LikeStoreError::IdGeneration(err),
            err => LikeStoreError::unavailable(err),
        }
    }
}

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<LikeableSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(LikeableSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        debug!(?config, "Connected to database");
        Ok(Self::new(pool, config.worker_id, config.process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn next_snowflake(&self) -> Result<LikeableSnowflake> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;
        Ok(snowflake)
    }

    /// A resolver for the fixture entities stored by this client.
    #[must_use]
    pub fn resolver(self: &Arc<Self>) -> Resolver<Subject> {
        let mut resolver = Resolver::new();

        let db = Arc::clone(self);
        resolver.register_entity(move |id| {
            let db = Arc::clone(&db);
            async move { db.fetch_user(id.into()).await }
        });
        let db = Arc::clone(self);
        resolver.register_entity(move |id| {
            let db = Arc::clone(&db);
            async move { db.fetch_book(id.into()).await }
        });
        let db = Arc::clone(self);
        resolver.register_entity(move |id| {
            let db = Arc::clone(&db);
            async move { db.fetch_post(id.into()).await }
        });

        resolver
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                users.user_snowflake,
                users.name
            FROM
                fixtures.users
            WHERE
                users.user_snowflake = $1
            ",
        )
        .bind(user_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::from))
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<Id<UserMarker>> {
        let user_snowflake = self.next_snowflake()?;

        let returned_snowflake = query_scalar::<_, i64>(
            "
            INSERT INTO fixtures.users (user_snowflake, name)
            VALUES ($1, $2)
            RETURNING users.user_snowflake
            ",
        )
        .bind(user_snowflake.get().cast_signed())
        .bind(&user.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(returned_snowflake.cast_unsigned().into())
    }

    pub async fn fetch_book(&self, book_id: Id<BookMarker>) -> Result<Option<Book>> {
        let record = query_as::<_, BookRecord>(
            "
            SELECT
                books.book_snowflake,
                books.title
            FROM
                fixtures.books
            WHERE
                books.book_snowflake = $1
            ",
        )
        .bind(book_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Book::from))
    }

    pub async fn create_book(&self, book: &CreateBook) -> Result<Id<BookMarker>> {
        let book_snowflake = self.next_snowflake()?;

        let returned_snowflake = query_scalar::<_, i64>(
            "
            INSERT INTO fixtures.books (book_snowflake, title)
            VALUES ($1, $2)
            RETURNING books.book_snowflake
            ",
        )
        .bind(book_snowflake.get().cast_signed())
        .bind(&book.title)
        .fetch_one(&self.pool)
        .await?;

        Ok(returned_snowflake.cast_unsigned().into())
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT
                posts.post_snowflake,
                posts.title
            FROM
                fixtures.posts
            WHERE
                posts.post_snowflake = $1
            ",
        )
        .bind(post_id.get().cast_signed())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::from))
    }

    pub async fn create_post(&self, post: &CreatePost) -> Result<Id<PostMarker>> {
        let post_snowflake = self.next_snowflake()?;

        let returned_snowflake = query_scalar::<_, i64>(
            "
            INSERT INTO fixtures.posts (post_snowflake, title)
            VALUES ($1, $2)
            RETURNING posts.post_snowflake
            ",
        )
        .bind(post_snowflake.get().cast_signed())
        .bind(&post.title)
        .fetch_one(&self.pool)
        .await?;

        Ok(returned_snowflake.cast_unsigned().into())
    }

    /// Inserts a like, returning `None` if the pair is already liked.
    #[instrument(skip_all, fields(%likeable, %liker))]
    pub async fn create_like(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> Result<Option<Like>> {
        let like_snowflake = self.next_snowflake()?;
        let mut conn = self.pool.acquire().await?;
        let record = insert_like(&mut conn, like_snowflake, likeable, liker).await?;

        record.map(Like::try_from).transpose().map_err(DbError::from)
    }

    #[instrument(skip_all, fields(%likeable, %liker))]
    pub async fn delete_like(&self, likeable: &EntityRef, liker: &EntityRef) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        delete_like(&mut conn, likeable, liker).await
    }

    pub async fn like_exists(&self, likeable: &EntityRef, liker: &EntityRef) -> Result<bool> {
        let (likeable_type, likeable_id) = ref_params(likeable);
        let (liker_type, liker_id) = ref_params(liker);

        let exists = query_scalar::<_, bool>(
            "
            SELECT EXISTS (
                SELECT 1
                FROM likes.likes
                WHERE
                    likeable_type = $1 AND likeable_id = $2
                    AND liker_type = $3 AND liker_id = $4
            )
            ",
        )
        .bind(likeable_type)
        .bind(likeable_id)
        .bind(liker_type)
        .bind(liker_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Deletes the like if present, inserts it otherwise, in one transaction.
    ///
    /// Concurrent toggles of the same pair resolve last-write-wins.
    #[instrument(skip_all, fields(%likeable, %liker))]
    pub async fn toggle_like(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> Result<LikeState> {
        let like_snowflake = self.next_snowflake()?;
        let mut tx = self.pool.begin().await?;

        let state = if delete_like(&mut tx, likeable, liker).await? {
            LikeState::Unliked
        } else {
            insert_like(&mut tx, like_snowflake, likeable, liker).await?;
            LikeState::Liked
        };
        tx.commit().await?;

        Ok(state)
    }

    pub async fn count_likes_for(&self, likeable: &EntityRef) -> Result<u64> {
        let (likeable_type, likeable_id) = ref_params(likeable);

        let count = query_scalar::<_, i64>(
            "
            SELECT COUNT(*)
            FROM likes.likes
            WHERE likeable_type = $1 AND likeable_id = $2
            ",
        )
        .bind(likeable_type)
        .bind(likeable_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn count_likes_by(&self, liker: &EntityRef) -> Result<u64> {
        let (liker_type, liker_id) = ref_params(liker);

        let count = query_scalar::<_, i64>(
            "
            SELECT COUNT(*)
            FROM likes.likes
            WHERE liker_type = $1 AND liker_id = $2
            ",
        )
        .bind(liker_type)
        .bind(liker_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn fetch_likes_of(
        &self,
        likeable: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> Result<Vec<Like>> {
        let (likeable_type, likeable_id) = ref_params(likeable);

        let records = query_as::<_, LikeRecord>(&format!(
            "
            SELECT {LIKE_COLUMNS}
            FROM likes.likes
            WHERE
                likeable_type = $1 AND likeable_id = $2
                AND ($3::BIGINT IS NULL OR like_snowflake > $3)
            ORDER BY like_snowflake
            LIMIT $4
            "
        ))
        .bind(likeable_type)
        .bind(likeable_id)
        .bind(after.map(|id| id.get().cast_signed()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|record| Like::try_from(record).map_err(DbError::from))
            .collect()
    }

    pub async fn fetch_likes_by(
        &self,
        liker: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> Result<Vec<Like>> {
        let (liker_type, liker_id) = ref_params(liker);

        let records = query_as::<_, LikeRecord>(&format!(
            "
            SELECT {LIKE_COLUMNS}
            FROM likes.likes
            WHERE
                liker_type = $1 AND liker_id = $2
                AND ($3::BIGINT IS NULL OR like_snowflake > $3)
            ORDER BY like_snowflake
            LIMIT $4
            "
        ))
        .bind(liker_type)
        .bind(liker_id)
        .bind(after.map(|id| id.get().cast_signed()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|record| Like::try_from(record).map_err(DbError::from))
            .collect()
    }
}

async fn insert_like(
    conn: &mut PgConnection,
    like_snowflake: LikeableSnowflake,
    likeable: &EntityRef,
    liker: &EntityRef,
) -> Result<Option<LikeRecord>> {
    let (likeable_type, likeable_id) = ref_params(likeable);
    let (liker_type, liker_id) = ref_params(liker);

    // No row comes back if the pair is already liked.
    let record = query_as::<_, LikeRecord>(&format!(
        "
        INSERT INTO likes.likes ({LIKE_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT ON CONSTRAINT {LIKES_PAIR_UNIQUE} DO NOTHING
        RETURNING {LIKE_COLUMNS}
        "
    ))
    .bind(like_snowflake.get().cast_signed())
    .bind(likeable_type)
    .bind(likeable_id)
    .bind(liker_type)
    .bind(liker_id)
    .bind(to_primitive(like_snowflake.created_at()))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record)
}

async fn delete_like(
    conn: &mut PgConnection,
    likeable: &EntityRef,
    liker: &EntityRef,
) -> Result<bool> {
    let (likeable_type, likeable_id) = ref_params(likeable);
    let (liker_type, liker_id) = ref_params(liker);

    let result = query(
        "
        DELETE FROM likes.likes
        WHERE
            likeable_type = $1 AND likeable_id = $2
            AND liker_type = $3 AND liker_id = $4
        ",
    )
    .bind(likeable_type)
    .bind(likeable_id)
    .bind(liker_type)
    .bind(liker_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

impl LikeStore for DbClient {
    async fn create(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> Result<Like, LikeStoreError> {
        let duplicate = || LikeStoreError::DuplicateLike {
            likeable: likeable.clone(),
            liker: liker.clone(),
        };

        self.create_like(likeable, liker)
            .await?
            .ok_or_else(duplicate)
    }

    async fn delete(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> Result<bool, LikeStoreError> {
        Ok(self.delete_like(likeable, liker).await?)
    }

    async fn exists(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> Result<bool, LikeStoreError> {
        Ok(self.like_exists(likeable, liker).await?)
    }

    async fn toggle(
        &self,
        likeable: &EntityRef,
        liker: &EntityRef,
    ) -> Result<LikeState, LikeStoreError> {
        Ok(self.toggle_like(likeable, liker).await?)
    }

    async fn count_for(&self, likeable: &EntityRef) -> Result<u64, LikeStoreError> {
        Ok(self.count_likes_for(likeable).await?)
    }

    async fn count_by(&self, liker: &EntityRef) -> Result<u64, LikeStoreError> {
        Ok(self.count_likes_by(liker).await?)
    }

    async fn likers_page(
        &self,
        likeable: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> Result<Vec<Like>, LikeStoreError> {
        Ok(self.fetch_likes_of(likeable, after, limit).await?)
    }

    async fn liked_page(
        &self,
        liker: &EntityRef,
        after: Option<Id<LikeMarker>>,
        limit: u32,
    ) -> Result<Vec<Like>, LikeStoreError> {
        Ok(self.fetch_likes_by(liker, after, limit).await?)
    }
}
