//! Idempotent schema bootstrap.

/// Statements run once at startup. All of them are `IF NOT EXISTS`, so the
/// bootstrap is safe against an already-provisioned database.
pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        mid  INTEGER PRIMARY KEY,
        name TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS videos (
        aid           INTEGER PRIMARY KEY,
        bvid          TEXT UNIQUE NOT NULL,
        mid           INTEGER NOT NULL,
        title         TEXT NOT NULL,
        description   TEXT,
        pic           TEXT NOT NULL,
        created       INTEGER NOT NULL,
        tags          TEXT NOT NULL DEFAULT '',
        touhou_status INTEGER NOT NULL DEFAULT 0,
        season_id     INTEGER,
        FOREIGN KEY (mid) REFERENCES users (mid)
    )",
    "CREATE TABLE IF NOT EXISTS video_parts (
        cid      INTEGER PRIMARY KEY,
        aid      INTEGER NOT NULL,
        page     INTEGER NOT NULL,
        part     TEXT NOT NULL,
        duration INTEGER NOT NULL,
        ctime    INTEGER NOT NULL,
        FOREIGN KEY (aid) REFERENCES videos (aid) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_videos_mid ON videos (mid)",
    "CREATE INDEX IF NOT EXISTS idx_videos_touhou_status ON videos (touhou_status)",
    "CREATE INDEX IF NOT EXISTS idx_video_parts_aid ON video_parts (aid)",
];
