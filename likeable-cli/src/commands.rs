use clap::{Args, Subcommand};
use likeable_common::capability::{Entity, like_refs};
use likeable_common::model::book::{Book, CreateBook};
use likeable_common::model::entity::EntityRef;
use likeable_common::model::like::LikeState;
use likeable_common::model::post::{CreatePost, Post};
use likeable_common::model::subject::Subject;
use likeable_common::model::user::{CreateUser, User};
use likeable_common::resolver::ResolveError;
use likeable_common::store::{DEFAULT_PAGE_SIZE, LikeCursor, LikeStore, LikeStoreError};
use likeable_db::client::{DbClient, DbError};
use likeable_db::config::ConfigError;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Store(#[from] LikeStoreError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Error writing JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage books.
    Book {
        #[command(subcommand)]
        action: TitledAction,
    },
    /// Manage posts.
    Post {
        #[command(subcommand)]
        action: TitledAction,
    },
    /// Like an entity. Liking it again does nothing.
    Like {
        /// The liked entity, as `<type>#<id>`.
        likeable: EntityRef,
        /// Who likes it, as `<type>#<id>`.
        liker: EntityRef,
    },
    /// Remove a like, if there is one.
    Unlike {
        likeable: EntityRef,
        liker: EntityRef,
    },
    /// Like if not liked, unlike otherwise.
    Toggle {
        likeable: EntityRef,
        liker: EntityRef,
    },
    /// Count the likes of an entity.
    Count {
        reference: EntityRef,
        /// Count the entities it liked instead.
        #[arg(long)]
        by: bool,
    },
    /// List who liked an entity.
    Likers {
        likeable: EntityRef,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List what an entity liked.
    Liked {
        liker: EntityRef,
        #[command(flatten)]
        list: ListArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum UserAction {
    Create { name: String },
}

#[derive(Debug, Subcommand)]
pub enum TitledAction {
    Create { title: String },
}

#[derive(Clone, Copy, Debug, Args)]
pub struct ListArgs {
    /// Look up each referenced entity and print it in full.
    #[arg(long)]
    resolve: bool,

    /// Likes fetched per query.
    #[arg(
        long,
        default_value_t = DEFAULT_PAGE_SIZE,
        value_parser = clap::value_parser!(u32).range(1..),
    )]
    page_size: u32,
}

/// What a command produced.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Output {
    Migrated,
    Created(EntityRef),
    State(LikeState),
    Removed(bool),
    Count(u64),
    References(Vec<EntityRef>),
    Subjects(Vec<Subject>),
}

impl Command {
    pub async fn run(self, db: &Arc<DbClient>) -> Result<Output, CliError> {
        let output = match self {
            Command::Migrate => {
                db.migrate().await?;
                Output::Migrated
            }
            Command::User {
                action: UserAction::Create { name },
            } => {
                let id = db.create_user(&CreateUser { name }).await?;
                Output::Created(EntityRef::new(User::TYPE_TAG, id))
            }
            Command::Book {
                action: TitledAction::Create { title },
            } => {
                let id = db.create_book(&CreateBook { title }).await?;
                Output::Created(EntityRef::new(Book::TYPE_TAG, id))
            }
            Command::Post {
                action: TitledAction::Create { title },
            } => {
                let id = db.create_post(&CreatePost { title }).await?;
                Output::Created(EntityRef::new(Post::TYPE_TAG, id))
            }
            Command::Like { likeable, liker } => {
                like_refs(&**db, &likeable, &liker).await?;
                Output::State(LikeState::Liked)
            }
            Command::Unlike { likeable, liker } => {
                Output::Removed(db.delete(&likeable, &liker).await?)
            }
            Command::Toggle { likeable, liker } => {
                Output::State(db.toggle(&likeable, &liker).await?)
            }
            Command::Count {
                reference,
                by: false,
            } => Output::Count(db.count_for(&reference).await?),
            Command::Count {
                reference,
                by: true,
            } => Output::Count(db.count_by(&reference).await?),
            Command::Likers { likeable, list } => {
                list.collect(db, db.list_likers(&likeable)).await?
            }
            Command::Liked { liker, list } => list.collect(db, db.list_liked(&liker)).await?,
        };

        Ok(output)
    }
}

impl ListArgs {
    async fn collect(
        self,
        db: &Arc<DbClient>,
        cursor: LikeCursor<'_, DbClient>,
    ) -> Result<Output, CliError> {
        let cursor = cursor.with_page_size(self.page_size);

        let output = if self.resolve {
            Output::Subjects(cursor.resolve_all(&db.resolver()).await?)
        } else {
            Output::References(cursor.collect_all().await?)
        };
        Ok(output)
    }
}

impl Output {
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        let value = match self {
            Output::Migrated => json!({ "migrated": true }),
            Output::Created(reference) => serde_json::to_value(reference)?,
            Output::State(state) => json!({ "state": state }),
            Output::Removed(removed) => json!({ "removed": removed }),
            Output::Count(count) => json!({ "count": count }),
            Output::References(references) => serde_json::to_value(references)?,
            Output::Subjects(subjects) => serde_json::to_value(subjects)?,
        };
        Ok(value)
    }

    fn to_lines(&self) -> Vec<String> {
        match self {
            Output::Migrated => vec!["Migrations applied".to_owned()],
            Output::Created(reference) => vec![reference.to_string()],
            Output::State(state) => vec![state.to_string()],
            Output::Removed(true) => vec!["unliked".to_owned()],
            Output::Removed(false) => vec!["not liked".to_owned()],
            Output::Count(count) => vec![count.to_string()],
            Output::References(references) => {
                references.iter().map(ToString::to_string).collect()
            }
            Output::Subjects(subjects) => subjects.iter().map(ToString::to_string).collect(),
        }
    }

    pub fn print(&self, json: bool) -> Result<(), serde_json::Error> {
        if json {
            println!("{}", serde_json::to_string_pretty(&self.to_json()?)?);
        } else {
            for line in self.to_lines() {
                println!("{line}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::Output;
    use likeable_common::model::Id;
    use likeable_common::model::book::Book;
    use likeable_common::model::entity::{EntityRef, TypeTag};
    use likeable_common::model::like::LikeState;
    use likeable_common::model::subject::Subject;
    use serde_json::json;

    fn book_ref() -> EntityRef {
        EntityRef::new(TypeTag::from_static("book"), 1u64)
    }

    #[test]
    fn text_output() {
        assert_eq!(Output::State(LikeState::Liked).to_lines(), ["liked"]);
        assert_eq!(Output::Removed(false).to_lines(), ["not liked"]);
        assert_eq!(Output::Count(3).to_lines(), ["3"]);
        assert_eq!(
            Output::References(vec![
                book_ref(),
                EntityRef::new(TypeTag::from_static("user"), 7u64)
            ])
            .to_lines(),
            ["book#1", "user#7"]
        );
        assert!(Output::References(Vec::new()).to_lines().is_empty());
    }

    #[test]
    fn json_output() {
        assert_eq!(
            Output::State(LikeState::Unliked).to_json().unwrap(),
            json!({ "state": "unliked" })
        );
        assert_eq!(
            Output::Created(book_ref()).to_json().unwrap(),
            json!({ "type_tag": "book", "id": 1 })
        );

        let subjects = Output::Subjects(vec![Subject::Book(Book {
            id: Id::from(1u64),
            title: "Dune".to_owned(),
        })]);
        assert_eq!(
            subjects.to_json().unwrap(),
            json!([{ "type": "book", "id": 1, "title": "Dune" }])
        );
    }
}
