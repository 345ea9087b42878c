//! Schema creation and legacy-column migration.
//!
//! Migration is idempotent: `migrate` records the highest applied version in
//! `schema_migrations` and only runs steps above that watermark, using plain
//! `CREATE TABLE IF NOT EXISTS` statements generalized to multiple versioned
//! steps.

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

const CURRENT_VERSION: i64 = 3;

pub(crate) fn open_connection(path: &std::path::Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Migration(format!("failed to create store directory: {e}"))
            })?;
        }
    }
    let connection = Connection::open(path)?;
    connection.busy_timeout(std::time::Duration::from_secs(5))?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = OFF;
        "#,
    )?;
    Ok(connection)
}

pub(crate) fn migrate(connection: &mut Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );
        "#,
    )?;

    let current: i64 = connection
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < 1 {
        create_base_tables(connection)?;
        record_version(connection, 1)?;
    }
    if current < 2 {
        migrate_legacy_instances_table(connection)?;
        record_version(connection, 2)?;
    }
    if current < 3 {
        migrate_legacy_channel_and_video_columns(connection)?;
        record_version(connection, 3)?;
    }
    debug_assert_eq!(CURRENT_VERSION, 3);
    Ok(())
}

fn record_version(connection: &Connection, version: i64) -> StoreResult<()> {
    connection.execute(
        "INSERT OR REPLACE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, crawler_core::current_unix_timestamp_ms()],
    )?;
    Ok(())
}

fn create_base_tables(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS hosts (
            host TEXT PRIMARY KEY,
            health_status TEXT NOT NULL DEFAULT 'unknown',
            health_checked_at INTEGER,
            health_error TEXT,
            last_error TEXT,
            last_error_at INTEGER,
            last_error_source TEXT
        );

        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT NOT NULL,
            host TEXT NOT NULL,
            channel_name TEXT NOT NULL DEFAULT '',
            display_name TEXT,
            channel_url TEXT,
            videos_count INTEGER,
            followers_count INTEGER,
            avatar_url TEXT,
            health_status TEXT NOT NULL DEFAULT 'unknown',
            health_checked_at INTEGER,
            health_error TEXT,
            last_error TEXT,
            last_error_at INTEGER,
            last_error_source TEXT,
            PRIMARY KEY (channel_id, host)
        );
        CREATE INDEX IF NOT EXISTS idx_channels_followers_count ON channels(followers_count);
        CREATE INDEX IF NOT EXISTS idx_channels_videos_count ON channels(videos_count);
        CREATE INDEX IF NOT EXISTS idx_channels_host ON channels(host);

        CREATE TABLE IF NOT EXISTS videos (
            video_id TEXT NOT NULL,
            host TEXT NOT NULL,
            channel_id TEXT,
            channel_name TEXT,
            account_name TEXT,
            title TEXT NOT NULL DEFAULT '',
            description TEXT,
            tags_json TEXT,
            category TEXT,
            published_at INTEGER,
            thumbnail_url TEXT,
            preview_url TEXT,
            embed_url TEXT,
            views INTEGER,
            likes INTEGER,
            dislikes INTEGER,
            comments_count INTEGER,
            nsfw INTEGER NOT NULL DEFAULT 0,
            last_checked_at INTEGER,
            last_error TEXT,
            error_count INTEGER NOT NULL DEFAULT 0,
            invalid_reason TEXT,
            invalid_at INTEGER,
            PRIMARY KEY (video_id, host)
        );
        CREATE INDEX IF NOT EXISTS idx_videos_host ON videos(host);
        CREATE INDEX IF NOT EXISTS idx_videos_channel_id ON videos(channel_id);
        CREATE INDEX IF NOT EXISTS idx_videos_published_at ON videos(published_at);
        CREATE INDEX IF NOT EXISTS idx_videos_views ON videos(views);

        CREATE TABLE IF NOT EXISTS edges (
            source_host TEXT NOT NULL,
            target_host TEXT NOT NULL,
            PRIMARY KEY (source_host, target_host)
        );

        CREATE TABLE IF NOT EXISTS queue (
            host TEXT PRIMARY KEY,
            enqueued_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS instance_crawl_progress (
            host TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            error_count INTEGER NOT NULL DEFAULT 0,
            last_start INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER
        );

        CREATE TABLE IF NOT EXISTS channel_crawl_progress (
            host TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            last_start INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_channel_crawl_progress_host
            ON channel_crawl_progress(host);

        CREATE TABLE IF NOT EXISTS video_crawl_progress (
            host TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            channel_name TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            last_start INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            last_error_at INTEGER,
            updated_at INTEGER,
            PRIMARY KEY (host, channel_id)
        );
        CREATE INDEX IF NOT EXISTS idx_video_crawl_progress_host
            ON video_crawl_progress(host);

        CREATE TABLE IF NOT EXISTS crawl_state (
            key TEXT PRIMARY KEY,
            value TEXT
        );
        "#,
    )?;
    Ok(())
}

/// Migrates a legacy `instances` table (status / invalid_reason / invalid_at
/// / last_success_at / consecutive_failures / last_processed_at /
/// error_count) into `hosts` + `instance_crawl_progress`.
fn migrate_legacy_instances_table(connection: &Connection) -> StoreResult<()> {
    if !table_exists(connection, "instances")? {
        return Ok(());
    }
    let columns = table_columns(connection, "instances")?;
    let mut statement = connection.prepare("SELECT * FROM instances")?;
    let column_names: Vec<String> = statement.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let get_text = |name: &str| -> Option<String> {
            column_names
                .iter()
                .position(|c| c == name)
                .and_then(|idx| row.get::<_, Option<String>>(idx).ok().flatten())
        };
        let get_int = |name: &str| -> Option<i64> {
            column_names
                .iter()
                .position(|c| c == name)
                .and_then(|idx| row.get::<_, Option<i64>>(idx).ok().flatten())
        };
        let host = match get_text("host") {
            Some(h) => h,
            None => continue,
        };
        let status_raw = get_text("status").unwrap_or_default();
        let invalid_reason = get_text("invalid_reason");
        let last_error = invalid_reason.clone().or_else(|| get_text("last_error"));
        let last_error_at = get_int("invalid_at").or_else(|| get_int("last_processed_at"));
        let health_status = if invalid_reason.is_some() || status_raw == "error" {
            "error"
        } else if get_int("last_success_at").is_some() {
            "ok"
        } else {
            "unknown"
        };
        connection.execute(
            r#"INSERT INTO hosts (host, health_status, health_checked_at, last_error, last_error_at, last_error_source)
               VALUES (?1, ?2, ?3, ?4, ?5, 'instances')
               ON CONFLICT(host) DO UPDATE SET
                   health_status = excluded.health_status,
                   last_error = COALESCE(hosts.last_error, excluded.last_error),
                   last_error_at = COALESCE(hosts.last_error_at, excluded.last_error_at)"#,
            rusqlite::params![host, health_status, get_int("last_processed_at"), last_error, last_error_at],
        )?;
        let progress_status = match status_raw.as_str() {
            "done" => "done",
            "processing" => "pending", // orphaned processing rows get recovered, not assumed done
            "error" => "error",
            _ => "pending",
        };
        connection.execute(
            r#"INSERT INTO instance_crawl_progress (host, status, error_count, last_start, updated_at)
               VALUES (?1, ?2, ?3, 0, ?4)
               ON CONFLICT(host) DO NOTHING"#,
            rusqlite::params![
                host,
                progress_status,
                get_int("consecutive_failures").unwrap_or(0),
                get_int("last_processed_at")
            ],
        )?;
    }
    drop(rows);
    drop(statement);
    let _ = columns;
    connection.execute_batch("DROP TABLE instances;")?;
    Ok(())
}

/// Migrates legacy `channels.last_checked_at` / `videos_count_error` /
/// `videos_count_error_at` columns and legacy `videos` rows missing
/// `last_error` / `last_error_at` / `error_count`.
fn migrate_legacy_channel_and_video_columns(connection: &Connection) -> StoreResult<()> {
    let channel_columns = table_columns(connection, "channels")?;
    if channel_columns.iter().any(|c| c == "videos_count_error") {
        connection.execute_batch(
            r#"
            UPDATE channels SET
                last_error = COALESCE(last_error, videos_count_error),
                last_error_at = COALESCE(last_error_at, videos_count_error_at),
                last_error_source = CASE
                    WHEN videos_count_error IS NOT NULL THEN 'videos_count'
                    ELSE last_error_source
                END
            WHERE videos_count_error IS NOT NULL;
            "#,
        )?;
    }

    let video_columns = table_columns(connection, "videos")?;
    if !video_columns.iter().any(|c| c == "error_count") {
        connection.execute_batch(
            r#"
            ALTER TABLE videos ADD COLUMN error_count INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE videos ADD COLUMN last_error TEXT;
            ALTER TABLE videos ADD COLUMN last_error_at INTEGER;
            UPDATE videos SET last_error_at = invalid_at WHERE invalid_reason IS NOT NULL;
            "#,
        )?;
    }
    Ok(())
}

fn table_exists(connection: &Connection, name: &str) -> StoreResult<bool> {
    let found: Option<String> = connection
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .ok();
    Ok(found.is_some())
}

fn table_columns(connection: &Connection, table: &str) -> StoreResult<Vec<String>> {
    if !table_exists(connection, table)? {
        return Ok(Vec::new());
    }
    let mut statement = connection.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = statement.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}
