//! SQLite-Implementierung des PraesenzRepository
//!
//! Der Status-Upsert ist ein einzelnes Statement und damit per-User atomar.
//! Die Queue-Position wird abgeleitet, nie gespeichert.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use plauder_core::types::{GenderPraeferenz, PraesenzStatus, Stimmung, UserId};

use crate::error::{DbError, DbResult};
use crate::models::{PraesenzRecord, QueueEintrag};
use crate::repository::PraesenzRepository;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{zeit_als_text, zeit_aus_text, zeit_aus_text_opt};

impl PraesenzRepository for SqliteDb {
    async fn status_setzen(
        &self,
        user_id: UserId,
        status: PraesenzStatus,
        extra: Option<QueueEintrag>,
    ) -> DbResult<PraesenzRecord> {
        let now = Utc::now();

        // Invariante: queue_joined_at genau dann gesetzt wenn in_queue
        let (queue_joined_at, stimmung, praeferenz) = match (status, extra) {
            (PraesenzStatus::InQueue, Some(e)) => (
                Some(zeit_als_text(&now)),
                Some(e.stimmung.als_str()),
                Some(e.gender_praeferenz.als_str()),
            ),
            (PraesenzStatus::InQueue, None) => {
                return Err(DbError::ungueltige_daten(
                    "in_queue verlangt Warteschlangen-Praeferenzen",
                ));
            }
            (_, _) => (None, None, None),
        };

        sqlx::query(
            "INSERT INTO praesenz (user_id, status, queue_joined_at, stimmung, gender_praeferenz, last_activity)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 status = excluded.status,
                 queue_joined_at = excluded.queue_joined_at,
                 stimmung = COALESCE(excluded.stimmung, praesenz.stimmung),
                 gender_praeferenz = COALESCE(excluded.gender_praeferenz, praesenz.gender_praeferenz),
                 last_activity = excluded.last_activity",
        )
        .bind(user_id.inner().to_string())
        .bind(status.als_str())
        .bind(&queue_joined_at)
        .bind(stimmung)
        .bind(praeferenz)
        .bind(zeit_als_text(&now))
        .execute(&self.pool)
        .await?;

        self.praesenz_laden(user_id)
            .await?
            .ok_or_else(|| DbError::intern("Praesenz nach Upsert nicht gefunden"))
    }

    async fn praesenz_laden(&self, user_id: UserId) -> DbResult<Option<PraesenzRecord>> {
        let row = sqlx::query(
            "SELECT user_id, status, queue_joined_at, stimmung, gender_praeferenz, last_activity
             FROM praesenz WHERE user_id = ?",
        )
        .bind(user_id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_praesenz(&r)).transpose()
    }

    async fn queue_position(&self, user_id: UserId) -> DbResult<Option<i64>> {
        let eigener = match self.praesenz_laden(user_id).await? {
            Some(r) if r.status == PraesenzStatus::InQueue => r,
            _ => return Ok(None),
        };

        let joined_at = eigener
            .queue_joined_at
            .ok_or_else(|| DbError::intern("in_queue ohne queue_joined_at"))?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS vorher FROM praesenz
             WHERE status = 'in_queue' AND queue_joined_at < ?",
        )
        .bind(zeit_als_text(&joined_at))
        .fetch_one(&self.pool)
        .await?;

        let vorher: i64 = row.try_get("vorher")?;
        Ok(Some(vorher + 1))
    }

    async fn anzahl_mit_status(&self, status: PraesenzStatus) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS anzahl FROM praesenz WHERE status = ?")
            .bind(status.als_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("anzahl")?)
    }

    async fn alle_in_queue(&self) -> DbResult<Vec<PraesenzRecord>> {
        let rows = sqlx::query(
            "SELECT user_id, status, queue_joined_at, stimmung, gender_praeferenz, last_activity
             FROM praesenz WHERE status = 'in_queue'
             ORDER BY queue_joined_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_zu_praesenz).collect()
    }

    async fn alle_offline_setzen(&self) -> DbResult<u64> {
        let affected = sqlx::query(
            "UPDATE praesenz
             SET status = 'offline', queue_joined_at = NULL, last_activity = ?
             WHERE status != 'offline'",
        )
        .bind(zeit_als_text(&Utc::now()))
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }
}

fn row_zu_praesenz(row: &SqliteRow) -> DbResult<PraesenzRecord> {
    let user_id_str: String = row.try_get("user_id")?;
    let user_id = uuid::Uuid::parse_str(&user_id_str)
        .map_err(|e| DbError::intern(format!("Ungueltige User-ID '{user_id_str}': {e}")))?;

    let status_str: String = row.try_get("status")?;
    let status = PraesenzStatus::from_str(&status_str).map_err(DbError::intern)?;

    let queue_joined_at: Option<String> = row.try_get("queue_joined_at")?;
    let stimmung: Option<String> = row.try_get("stimmung")?;
    let stimmung = stimmung
        .map(|s| Stimmung::from_str(&s).map_err(DbError::intern))
        .transpose()?;

    let praeferenz: Option<String> = row.try_get("gender_praeferenz")?;
    let gender_praeferenz = praeferenz
        .map(|p| GenderPraeferenz::from_str(&p).map_err(DbError::intern))
        .transpose()?
        .unwrap_or_default();

    let last_activity: String = row.try_get("last_activity")?;

    Ok(PraesenzRecord {
        user_id: UserId(user_id),
        status,
        queue_joined_at: zeit_aus_text_opt(queue_joined_at.as_deref())?,
        stimmung,
        gender_praeferenz,
        last_activity: zeit_aus_text(&last_activity)?,
    })
}
