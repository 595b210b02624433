//! SQLite implementation of INoteRepository
//!
//! Notes are spread over several tables (`notes`, `titles`, `media`,
//! `voices`, `note_tags`, `stickers`). Content edits are applied by
//! [`reconcile_note`] inside one transaction that runs on a detached task, so
//! dropping the caller's future never leaves a half-written note behind.
//!
//! ## Type Mapping
//!
//! | Domain Type               | SQL Type | Strategy                                   |
//! |---------------------------|----------|--------------------------------------------|
//! | NoteId, ContentId, StickerId | TEXT  | UUID string via `.to_string()` / `FromStr` |
//! | DateTime<Utc>             | TEXT     | ISO 8601 via `to_rfc3339()`                |
//! | Mood, MediaKind           | TEXT     | `as_str()` / `FromStr`                     |
//! | f32 (font, sticker)       | REAL     | widened to f64                             |
//! | Tombstone attachment list | TEXT     | serde_json array                           |

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use daybook_core::domain::{
    ContentDelta, ContentItem, DomainError, FontSettings, MediaKind, Mood, Note,
    NoteContentUpdate, NoteId, ReconcileReport, Sticker, Tag, validate_attachment_name,
};
use daybook_core::ports::{INoteRepository, PendingMedia, TagSummary, Tombstone};

use crate::{CacheError, NoteContentCache};

/// SQLite-based implementation of the note repository port
pub struct SqliteNoteRepository {
    pool: SqlitePool,
    cache: NoteContentCache,
}

impl SqliteNoteRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_cache(pool, NoteContentCache::new())
    }

    /// Creates a repository that shares an existing note cache
    pub fn with_cache(pool: SqlitePool, cache: NoteContentCache) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &NoteContentCache {
        &self.cache
    }

    /// Runs a write on its own task and waits for it.
    ///
    /// The task keeps running when the awaiting future is dropped. The cached
    /// copy of `note_id` is invalidated once the write has finished either way.
    async fn detached<T, F>(&self, note_id: NoteId, write: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let task = tokio::spawn(async move {
            let result = write.await;
            cache.invalidate(&note_id);
            result
        });

        task.await.map_err(|e| {
            CacheError::TransactionFailed(format!("Write task for note {note_id} aborted: {e}"))
        })?
    }

    async fn fetch_note(&self, id: &NoteId) -> Result<Option<Note>, CacheError> {
        if let Some(note) = self.cache.get(id) {
            return Ok(Some(note));
        }

        let epoch = self.cache.epoch();
        let mut conn = self.pool.acquire().await?;
        let note = load_note(&mut conn, id).await?;
        if let Some(note) = &note {
            self.cache.insert_if_current(note.clone(), epoch);
        }
        Ok(note)
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_value<T>(raw: &str) -> Result<T, CacheError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
        .map_err(|e: DomainError| CacheError::SerializationError(e.to_string()))
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, CacheError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(CacheError::from)
}

// ============================================================================
// Loading
// ============================================================================

async fn load_note(conn: &mut SqliteConnection, id: &NoteId) -> Result<Option<Note>, CacheError> {
    let key = id.to_string();
    let Some(row) = sqlx::query(
        "SELECT created_at, mood, font_family, font_size, font_color FROM notes WHERE id = ?",
    )
    .bind(&key)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let created_at = parse_datetime(&column::<String>(&row, "created_at")?)?;
    let mood = column::<Option<String>>(&row, "mood")?
        .map(|raw| parse_value::<Mood>(&raw))
        .transpose()?;
    let font = FontSettings {
        family: column(&row, "font_family")?,
        size: column::<f64>(&row, "font_size")? as f32,
        color: column(&row, "font_color")?,
    };

    Ok(Some(Note {
        id: *id,
        created_at,
        mood,
        content: load_content(conn, &key).await?,
        tags: load_tags(conn, &key).await?,
        stickers: load_stickers(conn, &key).await?,
        font,
    }))
}

async fn load_content(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Vec<ContentItem>, CacheError> {
    let mut items: Vec<(i64, ContentItem)> = Vec::new();

    let rows = sqlx::query("SELECT id, position, text FROM titles WHERE note_id = ?")
        .bind(key)
        .fetch_all(&mut *conn)
        .await?;
    for row in rows {
        items.push((
            column(&row, "position")?,
            ContentItem::Title {
                id: parse_value(&column::<String>(&row, "id")?)?,
                text: column(&row, "text")?,
            },
        ));
    }

    let rows = sqlx::query("SELECT name, kind, position FROM media WHERE note_id = ?")
        .bind(key)
        .fetch_all(&mut *conn)
        .await?;
    for row in rows {
        items.push((
            column(&row, "position")?,
            ContentItem::Media {
                name: column(&row, "name")?,
                kind: parse_value::<MediaKind>(&column::<String>(&row, "kind")?)?,
            },
        ));
    }

    let rows = sqlx::query(
        "SELECT id, position, file_name, duration_ms FROM voices WHERE note_id = ?",
    )
    .bind(key)
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        let duration_ms: i64 = column(&row, "duration_ms")?;
        items.push((
            column(&row, "position")?,
            ContentItem::Voice {
                id: parse_value(&column::<String>(&row, "id")?)?,
                file_name: column(&row, "file_name")?,
                duration_ms: u64::try_from(duration_ms).map_err(|_| {
                    CacheError::SerializationError(format!("Negative voice duration: {duration_ms}"))
                })?,
            },
        ));
    }

    items.sort_by_key(|(position, _)| *position);
    Ok(items.into_iter().map(|(_, item)| item).collect())
}

async fn load_tags(conn: &mut SqliteConnection, key: &str) -> Result<Vec<Tag>, CacheError> {
    let titles: Vec<String> = sqlx::query_scalar(
        "SELECT tag_title FROM note_tags WHERE note_id = ? ORDER BY position, tag_title",
    )
    .bind(key)
    .fetch_all(&mut *conn)
    .await?;

    Ok(titles.into_iter().map(|title| Tag { title }).collect())
}

async fn load_stickers(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Vec<Sticker>, CacheError> {
    let rows = sqlx::query(
        "SELECT id, asset, x, y, scale, rotation FROM stickers WHERE note_id = ? ORDER BY rowid",
    )
    .bind(key)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Sticker {
                id: parse_value(&column::<String>(row, "id")?)?,
                asset: column(row, "asset")?,
                x: column::<f64>(row, "x")? as f32,
                y: column::<f64>(row, "y")? as f32,
                scale: column::<f64>(row, "scale")? as f32,
                rotation: column::<f64>(row, "rotation")? as f32,
            })
        })
        .collect()
}

// ============================================================================
// Writing
// ============================================================================

/// Applies the difference between `persisted` and `desired` on `conn`.
///
/// Order: media, voice, titles, note row, tags (with purge), stickers.
async fn apply_delta(
    conn: &mut SqliteConnection,
    key: &str,
    persisted: &NoteContentUpdate,
    desired: &NoteContentUpdate,
) -> Result<ReconcileReport, sqlx::Error> {
    let delta = ContentDelta::compute(persisted, desired);
    let mut report = ReconcileReport::default();

    // --- media ---
    for name in &delta.media_to_delete {
        report.media_deleted += sqlx::query("DELETE FROM media WHERE note_id = ? AND name = ?")
            .bind(key)
            .bind(name)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    for row in &delta.media_to_upsert {
        report.media_upserted += sqlx::query(
            "INSERT INTO media (note_id, name, kind, position) VALUES (?, ?, ?, ?) \
             ON CONFLICT (note_id, name) DO UPDATE SET \
               kind = excluded.kind, position = excluded.position \
             WHERE media.kind IS NOT excluded.kind OR media.position IS NOT excluded.position",
        )
        .bind(key)
        .bind(&row.name)
        .bind(row.kind.as_str())
        .bind(i64::from(row.position))
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }

    // --- voice ---
    for id in &delta.voices_to_delete {
        report.voices_deleted += sqlx::query("DELETE FROM voices WHERE note_id = ? AND id = ?")
            .bind(key)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    for row in &delta.voices_to_upsert {
        report.voices_upserted += sqlx::query(
            "INSERT INTO voices (id, note_id, position, file_name, duration_ms) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
               note_id = excluded.note_id, position = excluded.position, \
               file_name = excluded.file_name, duration_ms = excluded.duration_ms \
             WHERE voices.note_id IS NOT excluded.note_id \
                OR voices.position IS NOT excluded.position \
                OR voices.file_name IS NOT excluded.file_name \
                OR voices.duration_ms IS NOT excluded.duration_ms",
        )
        .bind(row.id.to_string())
        .bind(key)
        .bind(i64::from(row.position))
        .bind(&row.file_name)
        .bind(i64::try_from(row.duration_ms).unwrap_or(i64::MAX))
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }

    // --- titles ---
    for id in &delta.titles_to_delete {
        report.titles_deleted += sqlx::query("DELETE FROM titles WHERE note_id = ? AND id = ?")
            .bind(key)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    for row in &delta.titles_to_upsert {
        report.titles_upserted += sqlx::query(
            "INSERT INTO titles (id, note_id, position, text) VALUES (?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
               note_id = excluded.note_id, position = excluded.position, text = excluded.text \
             WHERE titles.note_id IS NOT excluded.note_id \
                OR titles.position IS NOT excluded.position \
                OR titles.text IS NOT excluded.text",
        )
        .bind(row.id.to_string())
        .bind(key)
        .bind(i64::from(row.position))
        .bind(&row.text)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }

    // --- note row: font and mood ---
    let mood = desired.mood.map(|m| m.as_str());
    let size = f64::from(desired.font.size);
    report.note_updated = sqlx::query(
        "UPDATE notes SET mood = ?, font_family = ?, font_size = ?, font_color = ? \
         WHERE id = ? AND (mood IS NOT ? OR font_family IS NOT ? \
                           OR font_size IS NOT ? OR font_color IS NOT ?)",
    )
    .bind(mood)
    .bind(&desired.font.family)
    .bind(size)
    .bind(&desired.font.color)
    .bind(key)
    .bind(mood)
    .bind(&desired.font.family)
    .bind(size)
    .bind(&desired.font.color)
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    // --- tags ---
    for title in &delta.tags_to_unlink {
        report.tags_unlinked +=
            sqlx::query("DELETE FROM note_tags WHERE note_id = ? AND tag_title = ?")
                .bind(key)
                .bind(title)
                .execute(&mut *conn)
                .await?
                .rows_affected();
    }
    for (position, title) in (0i64..).zip(delta.tags_to_link.iter()) {
        sqlx::query("INSERT INTO tags (title) VALUES (?) ON CONFLICT (title) DO NOTHING")
            .bind(title)
            .execute(&mut *conn)
            .await?;
        report.tags_linked += sqlx::query(
            "INSERT INTO note_tags (note_id, tag_title, position) VALUES (?, ?, ?) \
             ON CONFLICT (note_id, tag_title) DO UPDATE SET position = excluded.position \
             WHERE note_tags.position IS NOT excluded.position",
        )
        .bind(key)
        .bind(title)
        .bind(position)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    report.tags_purged = purge_tags(conn).await?;

    // --- stickers ---
    for id in &delta.stickers.to_delete {
        report.stickers_deleted +=
            sqlx::query("DELETE FROM stickers WHERE note_id = ? AND id = ?")
                .bind(key)
                .bind(id.to_string())
                .execute(&mut *conn)
                .await?
                .rows_affected();
    }
    for sticker in &delta.stickers.to_update {
        report.stickers_updated += sqlx::query(
            "UPDATE stickers SET asset = ?, x = ?, y = ?, scale = ?, rotation = ? \
             WHERE note_id = ? AND id = ?",
        )
        .bind(&sticker.asset)
        .bind(f64::from(sticker.x))
        .bind(f64::from(sticker.y))
        .bind(f64::from(sticker.scale))
        .bind(f64::from(sticker.rotation))
        .bind(key)
        .bind(sticker.id.to_string())
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }
    for sticker in &delta.stickers.to_insert {
        report.stickers_inserted += sqlx::query(
            "INSERT INTO stickers (id, note_id, asset, x, y, scale, rotation) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET \
               note_id = excluded.note_id, asset = excluded.asset, x = excluded.x, \
               y = excluded.y, scale = excluded.scale, rotation = excluded.rotation",
        )
        .bind(sticker.id.to_string())
        .bind(key)
        .bind(&sticker.asset)
        .bind(f64::from(sticker.x))
        .bind(f64::from(sticker.y))
        .bind(f64::from(sticker.scale))
        .bind(f64::from(sticker.rotation))
        .execute(&mut *conn)
        .await?
        .rows_affected();
    }

    Ok(report)
}

async fn purge_tags(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    Ok(sqlx::query(
        "DELETE FROM tags WHERE NOT EXISTS \
         (SELECT 1 FROM note_tags WHERE note_tags.tag_title = tags.title)",
    )
    .execute(&mut *conn)
    .await?
    .rows_affected())
}

/// Reconciles the stored content of `note_id` against `desired` in one
/// transaction. Any failure rolls the whole edit back.
async fn reconcile_note(
    pool: SqlitePool,
    note_id: NoteId,
    desired: NoteContentUpdate,
) -> Result<ReconcileReport, CacheError> {
    let key = note_id.to_string();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| CacheError::TransactionFailed(e.to_string()))?;

    let persisted = match load_note(&mut tx, &note_id).await {
        Ok(Some(note)) => note.to_update(),
        Ok(None) => return Err(CacheError::NotFound(key)),
        Err(e) => return Err(CacheError::TransactionFailed(e.to_string())),
    };

    let report = match apply_delta(&mut tx, &key, &persisted, &desired).await {
        Ok(report) => report,
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(note_id = %note_id, error = %rollback, "Rollback failed");
            }
            tracing::warn!(note_id = %note_id, error = %e, "Note reconciliation rolled back");
            return Err(CacheError::TransactionFailed(e.to_string()));
        }
    };

    tx.commit()
        .await
        .map_err(|e| CacheError::TransactionFailed(e.to_string()))?;

    Ok(report)
}

async fn insert_note(pool: SqlitePool, note: Note) -> Result<ReconcileReport, CacheError> {
    let key = note.id.to_string();
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| CacheError::TransactionFailed(e.to_string()))?;

    let result: Result<ReconcileReport, sqlx::Error> = async {
        sqlx::query(
            "INSERT INTO notes (id, created_at, mood, font_family, font_size, font_color) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&key)
        .bind(note.created_at.to_rfc3339())
        .bind(note.mood.map(|m| m.as_str()))
        .bind(&note.font.family)
        .bind(f64::from(note.font.size))
        .bind(&note.font.color)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tombstones WHERE note_id = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let empty = NoteContentUpdate {
            font: note.font.clone(),
            mood: note.mood,
            ..Default::default()
        };
        apply_delta(&mut tx, &key, &empty, &note.to_update()).await
    }
    .await;

    match result {
        Ok(report) => {
            tx.commit()
                .await
                .map_err(|e| CacheError::TransactionFailed(e.to_string()))?;
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(note_id = %key, error = %rollback, "Rollback failed");
            }
            Err(CacheError::TransactionFailed(e.to_string()))
        }
    }
}

async fn remove_note(pool: SqlitePool, note_id: NoteId) -> Result<bool, CacheError> {
    let key = note_id.to_string();
    let mut tx = pool.begin().await?;

    let Some(note) = load_note(&mut tx, &note_id).await? else {
        return Ok(false);
    };
    let attachments: Vec<&str> = note.attachment_names().collect();
    let attachments = serde_json::to_string(&attachments)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    sqlx::query("DELETE FROM notes WHERE id = ?")
        .bind(&key)
        .execute(&mut *tx)
        .await?;
    let purged = purge_tags(&mut tx).await?;
    sqlx::query(
        "INSERT INTO tombstones (note_id, attachment_names, deleted_at) VALUES (?, ?, ?) \
         ON CONFLICT (note_id) DO UPDATE SET \
           attachment_names = excluded.attachment_names, deleted_at = excluded.deleted_at",
    )
    .bind(&key)
    .bind(&attachments)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(note_id = %note_id, tags_purged = purged, "Deleted note");
    Ok(true)
}

// ============================================================================
// INoteRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl INoteRepository for SqliteNoteRepository {
    async fn create_note(&self, note: &Note) -> anyhow::Result<ReconcileReport> {
        let pool = self.pool.clone();
        let report = self
            .detached(note.id, insert_note(pool, note.clone()))
            .await?;

        tracing::debug!(
            note_id = %note.id,
            changes = report.total_changes(),
            "Created note"
        );
        Ok(report)
    }

    async fn get_note(&self, id: &NoteId) -> anyhow::Result<Option<Note>> {
        Ok(self.fetch_note(id).await?)
    }

    async fn list_notes(&self) -> anyhow::Result<Vec<Note>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM notes ORDER BY created_at DESC, id")
                .fetch_all(&self.pool)
                .await?;

        let mut notes = Vec::with_capacity(ids.len());
        for raw in ids {
            let id: NoteId = parse_value(&raw)?;
            // A concurrent delete between the two queries just drops the note
            if let Some(note) = self.fetch_note(&id).await? {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    async fn update_note_content(
        &self,
        id: &NoteId,
        update: NoteContentUpdate,
    ) -> anyhow::Result<ReconcileReport> {
        let pool = self.pool.clone();
        let report = self.detached(*id, reconcile_note(pool, *id, update)).await?;

        tracing::debug!(
            note_id = %id,
            media_deleted = report.media_deleted,
            media_upserted = report.media_upserted,
            tags_purged = report.tags_purged,
            changes = report.total_changes(),
            "Reconciled note content"
        );
        Ok(report)
    }

    async fn delete_note(&self, id: &NoteId) -> anyhow::Result<bool> {
        let pool = self.pool.clone();
        Ok(self.detached(*id, remove_note(pool, *id)).await?)
    }

    async fn list_tags(&self) -> anyhow::Result<Vec<TagSummary>> {
        let rows = sqlx::query(
            "SELECT t.title AS title, COUNT(nt.note_id) AS note_count \
             FROM tags t LEFT JOIN note_tags nt ON nt.tag_title = t.title \
             GROUP BY t.title ORDER BY t.title",
        )
        .fetch_all(&self.pool)
        .await?;

        let tags = rows
            .iter()
            .map(|row| {
                let count: i64 = column(row, "note_count")?;
                Ok(TagSummary {
                    title: column(row, "title")?,
                    note_count: u32::try_from(count).unwrap_or(u32::MAX),
                })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        Ok(tags)
    }

    async fn purge_unreferenced_tags(&self) -> anyhow::Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let purged = purge_tags(&mut conn).await?;
        if purged > 0 {
            tracing::debug!(purged, "Purged unreferenced tags");
        }
        Ok(purged)
    }

    async fn attachment_names(&self) -> anyhow::Result<HashSet<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM media UNION SELECT file_name FROM voices")
                .fetch_all(&self.pool)
                .await?;
        Ok(names.into_iter().collect())
    }

    async fn take_tombstones(&self) -> anyhow::Result<Vec<Tombstone>> {
        let rows = sqlx::query(
            "SELECT note_id, attachment_names, deleted_at FROM tombstones ORDER BY deleted_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let tombstones = rows
            .iter()
            .map(|row| {
                let names: String = column(row, "attachment_names")?;
                Ok(Tombstone {
                    note_id: parse_value(&column::<String>(row, "note_id")?)?,
                    attachment_names: serde_json::from_str(&names)
                        .map_err(|e| CacheError::SerializationError(e.to_string()))?,
                    deleted_at: parse_datetime(&column::<String>(row, "deleted_at")?)?,
                })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        Ok(tombstones)
    }

    async fn clear_tombstones(&self, ids: &[NoteId]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM tombstones WHERE note_id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn enqueue_pending_media(&self, source: &Path, file_name: &str) -> anyhow::Result<i64> {
        validate_attachment_name(file_name)?;
        let id = sqlx::query(
            "INSERT INTO pending_media (source_path, file_name, attempts, created_at) \
             VALUES (?, ?, 0, ?)",
        )
        .bind(source.to_string_lossy().as_ref())
        .bind(file_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::debug!(id, file_name, "Queued pending media");
        Ok(id)
    }

    async fn pending_media(&self) -> anyhow::Result<Vec<PendingMedia>> {
        let rows = sqlx::query(
            "SELECT id, source_path, file_name, attempts, last_error, created_at \
             FROM pending_media ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let pending = rows
            .iter()
            .map(|row| {
                let attempts: i64 = column(row, "attempts")?;
                Ok(PendingMedia {
                    id: column(row, "id")?,
                    source_path: PathBuf::from(column::<String>(row, "source_path")?),
                    file_name: column(row, "file_name")?,
                    attempts: u32::try_from(attempts).unwrap_or(0),
                    last_error: column(row, "last_error")?,
                    created_at: parse_datetime(&column::<String>(row, "created_at")?)?,
                })
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        Ok(pending)
    }

    async fn complete_pending_media(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM pending_media WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_pending_media(&self, id: i64, error: &str) -> anyhow::Result<u32> {
        let attempts: Option<i64> = sqlx::query_scalar(
            "UPDATE pending_media SET attempts = attempts + 1, last_error = ? \
             WHERE id = ? RETURNING attempts",
        )
        .bind(error)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let attempts =
            attempts.ok_or_else(|| CacheError::NotFound(format!("pending media {id}")))?;
        Ok(u32::try_from(attempts).unwrap_or(u32::MAX))
    }
}
