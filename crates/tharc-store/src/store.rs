//! Store operations.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use tharc_models::{TouhouStatus, Video, VideoPart};

use crate::error::StoreResult;
use crate::schema::SCHEMA;

/// Handle on the archive database.
///
/// The pool holds a single connection, so statements from concurrent workers
/// are serialized and a transaction is never interleaved with another
/// writer's statements.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (and creates if missing) the database file at `path`.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    /// Opens a private in-memory database. Used by the test suites.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        Self::connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("schema bootstrap complete");
        Ok(())
    }

    /// Begins a scoped transaction: commits only when the caller commits,
    /// rolls back when dropped on any other path.
    pub async fn begin(&self) -> StoreResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// All uploader ids scheduled for archiving.
    pub async fn list_uploader_ids(&self) -> StoreResult<Vec<i64>> {
        let mids = sqlx::query_scalar::<_, i64>("SELECT mid FROM users ORDER BY mid")
            .fetch_all(&self.pool)
            .await?;
        Ok(mids)
    }

    /// Registers an uploader; already-known ids are left untouched.
    pub async fn add_uploader(&self, mid: i64) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (mid) VALUES (?) ON CONFLICT(mid) DO NOTHING")
            .bind(mid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reads one archived video with its parts, or `None` if unknown.
    pub async fn get_video(&self, aid: i64) -> StoreResult<Option<Video>> {
        let row = sqlx::query(
            "SELECT aid, bvid, mid, title, description, pic, created, tags, touhou_status, season_id
             FROM videos WHERE aid = ?",
        )
        .bind(aid)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tags_column: String = row.get("tags");
        let tags = if tags_column.is_empty() {
            Vec::new()
        } else {
            tags_column.split(',').map(str::to_string).collect()
        };

        let parts = sqlx::query_as::<_, PartRow>(
            "SELECT cid, page, part, duration, ctime FROM video_parts
             WHERE aid = ? ORDER BY page",
        )
        .bind(aid)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PartRow::into_part)
        .collect();

        Ok(Some(Video {
            aid: row.get("aid"),
            bvid: row.get("bvid"),
            mid: row.get("mid"),
            title: row.get("title"),
            description: row.get("description"),
            pic: row.get("pic"),
            created: row.get("created"),
            season_id: row.get("season_id"),
            tags,
            parts,
            status: TouhouStatus::from_code(row.get("touhou_status"))?,
        }))
    }

    /// All archived videos of one uploader, newest first.
    pub async fn list_videos(&self, mid: i64) -> StoreResult<Vec<Video>> {
        let aids = sqlx::query_scalar::<_, i64>(
            "SELECT aid FROM videos WHERE mid = ? ORDER BY created DESC",
        )
        .bind(mid)
        .fetch_all(&self.pool)
        .await?;

        let mut videos = Vec::with_capacity(aids.len());
        for aid in aids {
            if let Some(video) = self.get_video(aid).await? {
                videos.push(video);
            }
        }
        Ok(videos)
    }
}

#[derive(sqlx::FromRow)]
struct PartRow {
    cid: i64,
    page: i64,
    part: String,
    duration: i64,
    ctime: i64,
}

impl PartRow {
    fn into_part(self) -> VideoPart {
        VideoPart {
            cid: self.cid,
            page: self.page,
            part: self.part,
            duration: self.duration,
            ctime: self.ctime,
        }
    }
}

/// Upserts a video and replaces its parts inside the caller's transaction.
///
/// Does not commit. A re-ingest overwrites every column except a
/// `Confirmed*` classification, which always wins over the incoming value.
/// The part rows are replaced wholesale so the stored set always equals the
/// latest successful fetch.
pub async fn save_video(conn: &mut SqliteConnection, video: &Video) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO videos (aid, bvid, mid, title, description, pic, created, tags, touhou_status, season_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(aid) DO UPDATE SET
             bvid = excluded.bvid,
             mid = excluded.mid,
             title = excluded.title,
             description = excluded.description,
             pic = excluded.pic,
             created = excluded.created,
             tags = excluded.tags,
             touhou_status = CASE
                 WHEN videos.touhou_status IN (3, 4) THEN videos.touhou_status
                 ELSE excluded.touhou_status
             END,
             season_id = excluded.season_id",
    )
    .bind(video.aid)
    .bind(&video.bvid)
    .bind(video.mid)
    .bind(&video.title)
    .bind(&video.description)
    .bind(&video.pic)
    .bind(video.created)
    .bind(video.tags.join(","))
    .bind(video.status.code())
    .bind(video.season_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM video_parts WHERE aid = ?")
        .bind(video.aid)
        .execute(&mut *conn)
        .await?;

    for part in &video.parts {
        sqlx::query(
            "INSERT INTO video_parts (cid, aid, page, part, duration, ctime)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(part.cid)
        .bind(video.aid)
        .bind(part.page)
        .bind(&part.part)
        .bind(part.duration)
        .bind(part.ctime)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
