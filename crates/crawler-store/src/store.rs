use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreResult;
use crate::models::{
    Channel, ChannelCrawlWorkItem, Host, HealthStatus, InvalidReason,
    LastErrorSource, TagsFilterMode, Video, VideoCrawlWorkItem, WalkStatus,
};
use crate::schema;

/// Single embedded relational store. All public operations are typed, not
/// raw SQL, and multi-row writes run inside a transaction. Access is
/// serialized behind a `Mutex<Connection>` because rusqlite's `Connection`
/// is `!Sync` and writes must stay single-writer; concurrent upserts rely
/// on unique primary keys to stay idempotent rather than on app-level locks.
pub struct Store {
    connection: Mutex<Connection>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl Store {
    /// Opens (or recreates) the store at `path`.
    pub fn open(path: impl AsRef<Path>, recreate: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if recreate && path.exists() {
            let _ = std::fs::remove_file(&path);
            let _ = std::fs::remove_file(format!("{}-wal", path.display()));
            let _ = std::fs::remove_file(format!("{}-shm", path.display()));
        }
        let mut connection = schema::open_connection(&path)?;
        schema::migrate(&mut connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().expect("store mutex poisoned")
    }

    // ---- Hosts & retry queue ----

    pub fn ensure_host(&self, host: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO hosts (host, health_status) VALUES (?1, 'unknown')",
            params![host],
        )?;
        Ok(())
    }

    /// No-op if the host is already `done` or `processing`.
    pub fn enqueue_host(&self, host: &str, delay_ms: i64) -> StoreResult<()> {
        let conn = self.conn();
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM instance_crawl_progress WHERE host = ?1",
                params![host],
                |row| row.get(0),
            )
            .optional()?;
        if matches!(status.as_deref(), Some("done") | Some("processing")) {
            return Ok(());
        }
        let enqueued_at = crawler_core::current_unix_timestamp_ms() + delay_ms;
        conn.execute(
            "INSERT INTO queue (host, enqueued_at) VALUES (?1, ?2)
             ON CONFLICT(host) DO UPDATE SET enqueued_at = excluded.enqueued_at",
            params![host, enqueued_at],
        )?;
        conn.execute(
            "INSERT INTO instance_crawl_progress (host, status, updated_at) VALUES (?1, 'pending', ?2)
             ON CONFLICT(host) DO UPDATE SET status = CASE WHEN instance_crawl_progress.status != 'processing'
                 THEN 'pending' ELSE instance_crawl_progress.status END",
            params![host, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    /// Atomic dequeue + status-to-`processing` transition.
    pub fn claim_next_host(&self) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = crawler_core::current_unix_timestamp_ms();
        let host: Option<String> = tx
            .query_row(
                "SELECT host FROM queue WHERE enqueued_at <= ?1 ORDER BY enqueued_at ASC LIMIT 1",
                params![now],
                |row| row.get(0),
            )
            .optional()?;
        let Some(host) = host else {
            tx.commit()?;
            return Ok(None);
        };
        tx.execute("DELETE FROM queue WHERE host = ?1", params![host])?;
        tx.execute(
            "INSERT INTO instance_crawl_progress (host, status, last_start, updated_at)
             VALUES (?1, 'processing', 0, ?2)
             ON CONFLICT(host) DO UPDATE SET status = 'processing', updated_at = excluded.updated_at",
            params![host, now],
        )?;
        tx.commit()?;
        Ok(Some(host))
    }

    pub fn next_queue_time(&self) -> StoreResult<Option<i64>> {
        let conn = self.conn();
        let next: Option<i64> = conn
            .query_row("SELECT MIN(enqueued_at) FROM queue", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(next)
    }

    pub fn mark_host_done(&self, host: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO instance_crawl_progress (host, status, last_start, updated_at)
             VALUES (?1, 'done', 0, ?2)
             ON CONFLICT(host) DO UPDATE SET status = 'done', last_start = 0, updated_at = excluded.updated_at",
            params![host, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn mark_host_error(&self, host: &str, message: &str) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO instance_crawl_progress (host, status, error_count, updated_at)
             VALUES (?1, 'error', 1, ?2)
             ON CONFLICT(host) DO UPDATE SET status = 'error',
                 error_count = instance_crawl_progress.error_count + 1,
                 updated_at = excluded.updated_at",
            params![host, crawler_core::current_unix_timestamp_ms()],
        )?;
        conn.execute(
            "UPDATE hosts SET last_error = ?2, last_error_at = ?3, last_error_source = 'instances' WHERE host = ?1",
            params![host, message, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn get_host_error_count(&self, host: &str) -> StoreResult<i64> {
        let count: i64 = self
            .conn()
            .query_row(
                "SELECT error_count FROM instance_crawl_progress WHERE host = ?1",
                params![host],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(count)
    }

    pub fn insert_edge(&self, source_host: &str, target_host: &str) -> StoreResult<()> {
        if source_host.eq_ignore_ascii_case(target_host) {
            return Ok(());
        }
        self.conn().execute(
            "INSERT OR IGNORE INTO edges (source_host, target_host) VALUES (?1, ?2)",
            params![source_host, target_host],
        )?;
        Ok(())
    }

    pub fn list_edges(&self) -> StoreResult<Vec<(String, String)>> {
        let conn = self.conn();
        let mut statement = conn.prepare("SELECT source_host, target_host FROM edges ORDER BY source_host, target_host")?;
        let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Flips orphaned `processing` rows back to `pending` and re-enqueues
    /// them, optionally scoped to `allowed_hosts`.
    pub fn recover_queue(&self, allowed_hosts: Option<&BTreeSet<String>>) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut statement =
                tx.prepare("SELECT host FROM instance_crawl_progress WHERE status = 'processing'")?;
            let orphaned: Vec<String> = statement
                .query_map([], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            for host in orphaned {
                if let Some(allowed) = allowed_hosts {
                    if !allowed.contains(&host) {
                        continue;
                    }
                }
                tx.execute(
                    "UPDATE instance_crawl_progress SET status = 'pending' WHERE host = ?1",
                    params![host],
                )?;
                tx.execute(
                    "INSERT INTO queue (host, enqueued_at) VALUES (?1, ?2)
                     ON CONFLICT(host) DO UPDATE SET enqueued_at = excluded.enqueued_at",
                    params![host, crawler_core::current_unix_timestamp_ms()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_hosts(&self) -> StoreResult<Vec<Host>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT host, health_status, health_checked_at, health_error, last_error, last_error_at FROM hosts ORDER BY host",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(Host {
                host: row.get(0)?,
                health_status: HealthStatus::parse(&row.get::<_, String>(1)?),
                health_checked_at: row.get(2)?,
                health_error: row.get(3)?,
                last_error: row.get(4)?,
                last_error_at: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn mark_host_health(&self, host: &str, status: HealthStatus, error: Option<&str>) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE hosts SET health_status = ?2, health_checked_at = ?3, health_error = ?4 WHERE host = ?1",
            params![host, status.as_str(), crawler_core::current_unix_timestamp_ms(), error],
        )?;
        Ok(())
    }

    // ---- Channels ----

    pub fn upsert_channels(&self, channels: &[Channel]) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut statement = tx.prepare(
                r#"INSERT INTO channels
                    (channel_id, host, channel_name, display_name, channel_url, videos_count, followers_count, avatar_url)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                   ON CONFLICT(channel_id, host) DO UPDATE SET
                    channel_name = excluded.channel_name,
                    display_name = excluded.display_name,
                    channel_url = excluded.channel_url,
                    videos_count = excluded.videos_count,
                    followers_count = excluded.followers_count,
                    avatar_url = excluded.avatar_url"#,
            )?;
            for channel in channels {
                statement.execute(params![
                    channel.channel_id,
                    channel.host,
                    channel.channel_name,
                    channel.display_name,
                    channel.channel_url,
                    channel.videos_count,
                    channel.followers_count,
                    channel.avatar_url,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_channel_instances(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut statement = conn.prepare("SELECT DISTINCT host FROM channels ORDER BY host")?;
        let rows = statement.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn list_existing_channel_ids(&self, host: &str, ids: &[String]) -> StoreResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT channel_id FROM channels WHERE host = ? AND channel_id IN ({placeholders})"
        );
        let mut statement = conn.prepare(&sql)?;
        let mut bind_params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(ids.len() + 1);
        bind_params.push(&host);
        for id in ids {
            bind_params.push(id);
        }
        let rows = statement.query_map(bind_params.as_slice(), |row| row.get::<_, String>(0))?;
        let mut found = HashSet::new();
        for row in rows {
            found.insert(row?);
        }
        Ok(found)
    }

    /// Truncates `channel_crawl_progress` when `resume` is false, then prunes
    /// rows whose host is out of scope.
    pub fn prepare_channel_progress(&self, hosts: &[String], resume: bool) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if !resume {
            tx.execute("DELETE FROM channel_crawl_progress", [])?;
        }
        for host in hosts {
            tx.execute(
                "INSERT INTO channel_crawl_progress (host, status, last_start) VALUES (?1, 'pending', 0)
                 ON CONFLICT(host) DO NOTHING",
                params![host],
            )?;
        }
        let scope: HashSet<&String> = hosts.iter().collect();
        let mut statement = tx.prepare("SELECT host FROM channel_crawl_progress")?;
        let existing: Vec<String> = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(statement);
        for host in existing {
            if !scope.contains(&host) {
                tx.execute(
                    "DELETE FROM channel_crawl_progress WHERE host = ?1",
                    params![host],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_channel_work_items(&self) -> StoreResult<Vec<ChannelCrawlWorkItem>> {
        let conn = self.conn();
        let mut statement = conn.prepare(
            "SELECT host, status, last_start FROM channel_crawl_progress
             WHERE status IN ('pending', 'in_progress') ORDER BY host",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(ChannelCrawlWorkItem {
                host: row.get(0)?,
                status: WalkStatus::parse(&row.get::<_, String>(1)?),
                last_start: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_channel_progress(&self, host: &str, status: WalkStatus, last_start: i64) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO channel_crawl_progress (host, status, last_start, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(host) DO UPDATE SET status = excluded.status, last_start = excluded.last_start,
                 updated_at = excluded.updated_at",
            params![host, status.as_str(), last_start, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn mark_channel_host_error(&self, host: &str, message: &str, source: LastErrorSource) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE hosts SET last_error = ?2, last_error_at = ?3, last_error_source = ?4 WHERE host = ?1",
            params![host, message, crawler_core::current_unix_timestamp_ms(), source.as_str()],
        )?;
        Ok(())
    }

    pub fn clear_host_last_error(&self, host: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE hosts SET last_error = NULL, last_error_at = NULL, last_error_source = NULL WHERE host = ?1",
            params![host],
        )?;
        Ok(())
    }

    // ---- Videos ----

    pub fn upsert_videos(&self, videos: &[Video]) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut statement = tx.prepare(
                r#"INSERT INTO videos
                    (video_id, host, channel_id, channel_name, account_name, title, description, category,
                     published_at, thumbnail_url, preview_url, embed_url, views, likes, dislikes, nsfw)
                   VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)
                   ON CONFLICT(video_id, host) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    channel_name = excluded.channel_name,
                    account_name = excluded.account_name,
                    title = excluded.title,
                    description = excluded.description,
                    category = excluded.category,
                    published_at = excluded.published_at,
                    thumbnail_url = excluded.thumbnail_url,
                    preview_url = excluded.preview_url,
                    embed_url = excluded.embed_url,
                    views = excluded.views,
                    likes = excluded.likes,
                    dislikes = excluded.dislikes,
                    nsfw = excluded.nsfw"#,
            )?;
            for video in videos {
                statement.execute(params![
                    video.video_id,
                    video.host,
                    video.channel_id,
                    video.channel_name,
                    video.account_name,
                    video.title,
                    video.description,
                    video.category,
                    video.published_at,
                    video.thumbnail_url,
                    video.preview_url,
                    video.embed_url,
                    video.views,
                    video.likes,
                    video.dislikes,
                    video.nsfw as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_existing_video_ids(&self, host: &str, ids: &[String]) -> StoreResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT video_id FROM videos WHERE host = ? AND video_id IN ({placeholders})");
        let mut statement = conn.prepare(&sql)?;
        let mut bind_params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(ids.len() + 1);
        bind_params.push(&host);
        for id in ids {
            bind_params.push(id);
        }
        let rows = statement.query_map(bind_params.as_slice(), |row| row.get::<_, String>(0))?;
        let mut found = HashSet::new();
        for row in rows {
            found.insert(row?);
        }
        Ok(found)
    }

    /// Authoritative eligibility gate for the video stage.
    pub fn list_channels_with_videos(&self, min_videos: i64, hosts: &[String]) -> StoreResult<Vec<Channel>> {
        let conn = self.conn();
        if hosts.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = hosts.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT channel_id, host, channel_name, display_name, channel_url, videos_count, followers_count, avatar_url
             FROM channels
             WHERE videos_count >= ? AND TRIM(channel_name) != '' AND host IN ({placeholders})"
        );
        let mut statement = conn.prepare(&sql)?;
        let mut bind_params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(hosts.len() + 1);
        bind_params.push(&min_videos);
        for host in hosts {
            bind_params.push(host);
        }
        let rows = statement.query_map(bind_params.as_slice(), |row| {
            Ok(Channel {
                channel_id: row.get(0)?,
                host: row.get(1)?,
                channel_name: row.get(2)?,
                display_name: row.get(3)?,
                channel_url: row.get(4)?,
                videos_count: row.get(5)?,
                followers_count: row.get(6)?,
                avatar_url: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Truncates `video_crawl_progress` when `resume` is false, then prunes
    /// rows out of scope using a scratch table and chunked deletes to bound
    /// statement-argument counts.
    pub fn prepare_video_progress(&self, channels: &[Channel], resume: bool) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if !resume {
            tx.execute("DELETE FROM video_crawl_progress", [])?;
        }
        for channel in channels {
            tx.execute(
                "INSERT INTO video_crawl_progress (host, channel_id, channel_name, status, last_start)
                 VALUES (?1, ?2, ?3, 'pending', 0)
                 ON CONFLICT(host, channel_id) DO UPDATE SET channel_name = excluded.channel_name",
                params![channel.host, channel.channel_id, channel.channel_name],
            )?;
        }

        tx.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS video_progress_scope (host TEXT, channel_id TEXT);
             DELETE FROM video_progress_scope;",
        )?;
        const CHUNK: usize = 400;
        for chunk in channels.chunks(CHUNK) {
            let placeholders = chunk.iter().map(|_| "(?,?)").collect::<Vec<_>>().join(",");
            let sql = format!("INSERT INTO video_progress_scope (host, channel_id) VALUES {placeholders}");
            let mut bind_params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(chunk.len() * 2);
            for channel in chunk {
                bind_params.push(&channel.host);
                bind_params.push(&channel.channel_id);
            }
            tx.execute(&sql, bind_params.as_slice())?;
        }
        tx.execute(
            "DELETE FROM video_crawl_progress
             WHERE (host, channel_id) NOT IN (SELECT host, channel_id FROM video_progress_scope)",
            [],
        )?;
        tx.execute("DROP TABLE video_progress_scope", [])?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_video_work_items(&self, statuses: &[WalkStatus]) -> StoreResult<Vec<VideoCrawlWorkItem>> {
        let conn = self.conn();
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT host, channel_id, channel_name, status, last_start, last_error
             FROM video_crawl_progress WHERE status IN ({placeholders}) ORDER BY host, channel_id"
        );
        let mut statement = conn.prepare(&sql)?;
        let status_strs: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = statement.query_map(rusqlite::params_from_iter(status_strs.iter()), |row| {
            Ok(VideoCrawlWorkItem {
                host: row.get(0)?,
                channel_id: row.get(1)?,
                channel_name: row.get(2)?,
                status: WalkStatus::parse(&row.get::<_, String>(3)?),
                last_start: row.get(4)?,
                last_error: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_video_progress(
        &self,
        host: &str,
        channel_id: &str,
        status: WalkStatus,
        last_start: i64,
        error: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE video_crawl_progress SET status = ?3, last_start = ?4, last_error = ?5,
                last_error_at = CASE WHEN ?5 IS NOT NULL THEN ?6 ELSE last_error_at END,
                updated_at = ?6
             WHERE host = ?1 AND channel_id = ?2",
            params![
                host,
                channel_id,
                status.as_str(),
                last_start,
                error,
                crawler_core::current_unix_timestamp_ms()
            ],
        )?;
        Ok(())
    }

    pub fn list_videos_for_tags(&self, mode: TagsFilterMode) -> StoreResult<Vec<Video>> {
        let sql = match mode {
            TagsFilterMode::Missing => {
                "SELECT video_id, host FROM videos WHERE invalid_reason IS NULL
                 AND (tags_json IS NULL OR tags_json = '[]')"
            }
            TagsFilterMode::Present => {
                "SELECT video_id, host FROM videos WHERE invalid_reason IS NULL
                 AND tags_json IS NOT NULL AND tags_json != '[]'"
            }
        };
        self.list_video_ids(sql)
    }

    pub fn list_videos_for_comments(&self, resume: bool) -> StoreResult<Vec<Video>> {
        let sql = if resume {
            "SELECT video_id, host FROM videos WHERE invalid_reason IS NULL AND comments_count IS NULL"
        } else {
            "SELECT video_id, host FROM videos WHERE invalid_reason IS NULL"
        };
        self.list_video_ids(sql)
    }

    fn list_video_ids(&self, sql: &str) -> StoreResult<Vec<Video>> {
        let conn = self.conn();
        let mut statement = conn.prepare(sql)?;
        let rows = statement.query_map([], |row| {
            Ok(Video {
                video_id: row.get(0)?,
                host: row.get(1)?,
                ..Default::default()
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Rejected once `invalid_reason` is set.
    pub fn update_video_tags(&self, video_id: &str, host: &str, tags_json: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE videos SET tags_json = ?3, last_checked_at = ?4
             WHERE video_id = ?1 AND host = ?2 AND invalid_reason IS NULL",
            params![video_id, host, tags_json, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn update_video_comments(&self, video_id: &str, host: &str, comments_count: i64) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE videos SET comments_count = ?3, last_checked_at = ?4
             WHERE video_id = ?1 AND host = ?2 AND invalid_reason IS NULL",
            params![video_id, host, comments_count, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn update_video_invalid(&self, video_id: &str, host: &str, reason: InvalidReason) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE videos SET invalid_reason = ?3, invalid_at = ?4, last_checked_at = ?4
             WHERE video_id = ?1 AND host = ?2",
            params![video_id, host, reason.as_str(), crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    pub fn update_video_error(&self, video_id: &str, host: &str, message: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE videos SET last_error = ?3, error_count = error_count + 1, last_checked_at = ?4
             WHERE video_id = ?1 AND host = ?2 AND invalid_reason IS NULL",
            params![video_id, host, message, crawler_core::current_unix_timestamp_ms()],
        )?;
        Ok(())
    }

    // ---- KV state ----

    pub fn set_state(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO crawl_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_state(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM crawl_state WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Atomic read-modify-write for hot counters like `videos_new_total`,
    /// done in a single SQL statement so concurrent workers never race each
    /// other reading then writing the same counter.
    pub fn increment_state(&self, key: &str, delta: i64) -> StoreResult<i64> {
        let conn = self.conn();
        let tx_value: i64 = conn
            .query_row(
                "INSERT INTO crawl_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(crawl_state.value AS INTEGER) + ?2 AS TEXT)
                 RETURNING CAST(value AS INTEGER)",
                params![key, delta],
                |row| row.get(0),
            )?;
        Ok(tx_value)
    }
}
