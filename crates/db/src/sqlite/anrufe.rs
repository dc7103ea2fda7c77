//! SQLite-Implementierung des AnrufRepository

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use plauder_core::types::{AnrufStatus, CallId, UserId};

use crate::error::{DbError, DbResult};
use crate::models::{AnrufRecord, AnrufUpdate, NeuerAnruf};
use crate::repository::AnrufRepository;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{zeit_als_text, zeit_aus_text, zeit_aus_text_opt};

impl AnrufRepository for SqliteDb {
    async fn anruf_erstellen(&self, data: NeuerAnruf) -> DbResult<AnrufRecord> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO anrufe (id, caller_id, receiver_id, status, start_time, duration_secs, created_at)
             VALUES (?, ?, ?, 'pending', ?, 0, ?)",
        )
        .bind(data.id.inner().to_string())
        .bind(data.caller_id.inner().to_string())
        .bind(data.receiver_id.inner().to_string())
        .bind(zeit_als_text(&data.start_time))
        .bind(zeit_als_text(&now))
        .execute(&self.pool)
        .await?;

        Ok(AnrufRecord {
            id: data.id,
            caller_id: data.caller_id,
            receiver_id: data.receiver_id,
            status: AnrufStatus::Pending,
            start_time: data.start_time,
            end_time: None,
            duration_secs: 0,
            caller_rating: None,
            receiver_rating: None,
            created_at: now,
        })
    }

    async fn anruf_aktualisieren(&self, id: CallId, update: AnrufUpdate) -> DbResult<AnrufRecord> {
        // Dynamisches UPDATE – nur gesetzte Felder aendern
        let mut sets: Vec<&str> = Vec::new();
        if update.status.is_some() {
            sets.push("status = ?");
        }
        if update.start_time.is_some() {
            sets.push("start_time = ?");
        }
        if update.end_time.is_some() {
            sets.push("end_time = ?");
        }
        if update.duration_secs.is_some() {
            sets.push("duration_secs = ?");
        }
        if update.caller_rating.is_some() {
            sets.push("caller_rating = ?");
        }
        if update.receiver_rating.is_some() {
            sets.push("receiver_rating = ?");
        }

        if sets.is_empty() {
            return self
                .anruf_laden(id)
                .await?
                .ok_or_else(|| DbError::nicht_gefunden(format!("Anruf {id}")));
        }

        let sql = format!("UPDATE anrufe SET {} WHERE id = ?", sets.join(", "));
        let mut q = sqlx::query(&sql);

        if let Some(v) = update.status {
            q = q.bind(v.als_str());
        }
        if let Some(ref v) = update.start_time {
            q = q.bind(zeit_als_text(v));
        }
        if let Some(ref v) = update.end_time {
            q = q.bind(zeit_als_text(v));
        }
        if let Some(v) = update.duration_secs {
            q = q.bind(v);
        }
        if let Some(v) = update.caller_rating {
            q = q.bind(v);
        }
        if let Some(v) = update.receiver_rating {
            q = q.bind(v);
        }
        q = q.bind(id.inner().to_string());

        let affected = q.execute(&self.pool).await?.rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Anruf {id}")));
        }

        self.anruf_laden(id)
            .await?
            .ok_or_else(|| DbError::intern("Anruf nach Update nicht gefunden"))
    }

    async fn anruf_laden(&self, id: CallId) -> DbResult<Option<AnrufRecord>> {
        let row = sqlx::query(
            "SELECT id, caller_id, receiver_id, status, start_time, end_time,
                    duration_secs, caller_rating, receiver_rating, created_at
             FROM anrufe WHERE id = ?",
        )
        .bind(id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_anruf(&r)).transpose()
    }
}

fn row_zu_anruf(row: &SqliteRow) -> DbResult<AnrufRecord> {
    let uuid_spalte = |spalte: &str| -> DbResult<uuid::Uuid> {
        let s: String = row.try_get(spalte)?;
        uuid::Uuid::parse_str(&s)
            .map_err(|e| DbError::intern(format!("Ungueltige UUID in '{spalte}': {e}")))
    };

    let status_str: String = row.try_get("status")?;
    let status = AnrufStatus::from_str(&status_str).map_err(DbError::intern)?;

    let start_time: String = row.try_get("start_time")?;
    let end_time: Option<String> = row.try_get("end_time")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(AnrufRecord {
        id: CallId(uuid_spalte("id")?),
        caller_id: UserId(uuid_spalte("caller_id")?),
        receiver_id: UserId(uuid_spalte("receiver_id")?),
        status,
        start_time: zeit_aus_text(&start_time)?,
        end_time: zeit_aus_text_opt(end_time.as_deref())?,
        duration_secs: row.try_get("duration_secs")?,
        caller_rating: row.try_get("caller_rating")?,
        receiver_rating: row.try_get("receiver_rating")?,
        created_at: zeit_aus_text(&created_at)?,
    })
}
