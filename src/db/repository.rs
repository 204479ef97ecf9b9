// Repository pattern - isolates all database side effects of the feed
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::db::models::{Creator, NewPost, Post, PostChanges, User};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Document store for posts and their authors
#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Total number of posts
    async fn count_posts(&self) -> Result<u64, StoreError>;

    /// Newest-first slice of posts with creators resolved
    async fn list_posts(&self, offset: u64, limit: u64) -> Result<Vec<Post>, StoreError>;

    async fn find_post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    /// Persist a new post; id and timestamps are assigned here
    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError>;

    /// Replace title, content and image. `None` if the post no longer exists
    async fn update_post(&self, id: &str, changes: &PostChanges)
        -> Result<Option<Post>, StoreError>;

    /// Returns whether a row was removed
    async fn remove_post(&self, id: &str) -> Result<bool, StoreError>;

    async fn create_user(&self, name: &str) -> Result<User, StoreError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Append a post to the user's post list (no-op if already present)
    async fn link_post(&self, user_id: &str, post_id: &str) -> Result<(), StoreError>;

    /// Pull a post from the user's post list. Returns whether it was present
    async fn unlink_post(&self, user_id: &str, post_id: &str) -> Result<bool, StoreError>;
}

/// SQLite implementation
pub struct SqliteFeedRepository {
    pool: DbPool,
}

impl SqliteFeedRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELECT_POST: &str = "SELECT p.id, p.title, p.content, p.image_url, u.id, u.name,
            p.created_at, p.updated_at
     FROM posts p
     JOIN users u ON u.id = p.creator_id";

fn timestamp(now: DateTime<Utc>) -> String {
    // Fixed width and UTC so text order matches time order
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        image_url: row.get(3)?,
        creator: Creator {
            id: row.get(4)?,
            name: row.get(5)?,
        },
        created_at: parse_timestamp(row, 6)?,
        updated_at: parse_timestamp(row, 7)?,
    })
}

fn load_post(conn: &Connection, id: &str) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("{SELECT_POST} WHERE p.id = ?1"),
        params![id],
        row_to_post,
    )
    .optional()
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl FeedRepository for SqliteFeedRepository {
    async fn count_posts(&self) -> Result<u64, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    async fn list_posts(&self, offset: u64, limit: u64) -> Result<Vec<Post>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_POST} ORDER BY p.created_at DESC, p.rowid DESC LIMIT ?1 OFFSET ?2"
        ))?;

        let posts = stmt
            .query_map(params![clamp(limit), clamp(offset)], row_to_post)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    async fn find_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;
        Ok(load_post(&conn, id)?)
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let conn = self.pool.get()?;

        let id = uuid::Uuid::now_v7().to_string();
        let now = timestamp(Utc::now());
        conn.execute(
            "INSERT INTO posts (id, title, content, image_url, creator_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                post.title,
                post.content,
                post.image_url,
                post.creator_id,
                now
            ],
        )?;

        load_post(&conn, &id)?.ok_or(StoreError::Sql(rusqlite::Error::QueryReturnedNoRows))
    }

    async fn update_post(
        &self,
        id: &str,
        changes: &PostChanges,
    ) -> Result<Option<Post>, StoreError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE posts SET title = ?2, content = ?3, image_url = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                changes.title,
                changes.content,
                changes.image_url,
                timestamp(Utc::now())
            ],
        )?;
        if rows == 0 {
            return Ok(None);
        }

        Ok(load_post(&conn, id)?)
    }

    async fn remove_post(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let conn = self.pool.get()?;

        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO users (id, name) VALUES (?1, ?2)",
            params![id, name],
        )?;

        Ok(User {
            id,
            name: name.to_string(),
            posts: Vec::new(),
        })
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let conn = self.pool.get()?;

        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM users WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(name) = name else {
            return Ok(None);
        };

        let mut stmt =
            conn.prepare("SELECT post_id FROM user_posts WHERE user_id = ?1 ORDER BY seq ASC")?;
        let posts = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(User {
            id: id.to_string(),
            name,
            posts,
        }))
    }

    async fn link_post(&self, user_id: &str, post_id: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO user_posts (user_id, post_id) VALUES (?1, ?2)",
            params![user_id, post_id],
        )?;
        Ok(())
    }

    async fn unlink_post(&self, user_id: &str, post_id: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM user_posts WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn new_post(creator_id: &str, title: &str) -> NewPost {
        NewPost {
            title: title.to_string(),
            content: "content".to_string(),
            image_url: format!("images/{title}.png"),
            creator_id: creator_id.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_resolves_creator() {
        let repo = SqliteFeedRepository::new(test_pool());
        let user = repo.create_user("ada").await.unwrap();

        let post = repo.insert_post(&new_post(&user.id, "first")).await.unwrap();

        assert!(uuid::Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.creator, user.creator());
        assert_eq!(post.created_at, post.updated_at);
        assert_eq!(repo.count_posts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_paged() {
        let repo = SqliteFeedRepository::new(test_pool());
        let user = repo.create_user("ada").await.unwrap();
        for title in ["p1", "p2", "p3", "p4", "p5"] {
            repo.insert_post(&new_post(&user.id, title)).await.unwrap();
        }

        let page: Vec<String> = repo
            .list_posts(2, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(page, vec!["p3", "p2"]);

        let tail = repo.list_posts(4, 2).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].title, "p1");
    }

    #[tokio::test]
    async fn find_missing_post_is_none() {
        let repo = SqliteFeedRepository::new(test_pool());
        assert!(repo.find_post("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_replaces_fields() {
        let repo = SqliteFeedRepository::new(test_pool());
        let user = repo.create_user("ada").await.unwrap();
        let post = repo.insert_post(&new_post(&user.id, "old")).await.unwrap();

        let updated = repo
            .update_post(
                &post.id,
                &PostChanges {
                    title: "new".into(),
                    content: "fresh".into(),
                    image_url: "images/new.png".into(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, post.id);
        assert_eq!(updated.title, "new");
        assert_eq!(updated.content, "fresh");
        assert_eq!(updated.image_url, "images/new.png");
        assert_eq!(updated.created_at, post.created_at);
        assert!(updated.updated_at >= post.updated_at);
    }

    #[tokio::test]
    async fn update_missing_post_is_none() {
        let repo = SqliteFeedRepository::new(test_pool());
        let changes = PostChanges {
            title: "t".into(),
            content: "c".into(),
            image_url: "images/x.png".into(),
        };
        assert!(repo.update_post("nope", &changes).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_reports_whether_post_existed() {
        let repo = SqliteFeedRepository::new(test_pool());
        let user = repo.create_user("ada").await.unwrap();
        let post = repo.insert_post(&new_post(&user.id, "gone")).await.unwrap();

        assert!(repo.remove_post(&post.id).await.unwrap());
        assert!(!repo.remove_post(&post.id).await.unwrap());
        assert_eq!(repo.count_posts().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn link_and_unlink_keep_order() {
        let repo = SqliteFeedRepository::new(test_pool());
        let user = repo.create_user("ada").await.unwrap();

        repo.link_post(&user.id, "a").await.unwrap();
        repo.link_post(&user.id, "b").await.unwrap();
        repo.link_post(&user.id, "a").await.unwrap();
        repo.link_post(&user.id, "c").await.unwrap();

        let found = repo.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(found.posts, vec!["a", "b", "c"]);

        assert!(repo.unlink_post(&user.id, "b").await.unwrap());
        assert!(!repo.unlink_post(&user.id, "b").await.unwrap());

        let found = repo.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(found.posts, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn find_missing_user_is_none() {
        let repo = SqliteFeedRepository::new(test_pool());
        assert!(repo.find_user("ghost").await.unwrap().is_none());
    }
}
