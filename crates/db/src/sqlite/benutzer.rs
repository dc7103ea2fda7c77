//! SQLite-Implementierung des BenutzerRepository

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

use plauder_core::types::{Gender, UserId};

use crate::error::{DbError, DbResult};
use crate::models::{BenutzerRecord, NeuerBenutzer};
use crate::repository::BenutzerRepository;
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{zeit_als_text, zeit_aus_text};

impl BenutzerRepository for SqliteDb {
    async fn benutzer_erstellen(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord> {
        let id = UserId::new();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO benutzer (id, username, gender, created_at, is_active)
             VALUES (?, ?, ?, ?, 1)",
        )
        .bind(id.inner().to_string())
        .bind(data.username)
        .bind(data.gender.map(|g| g.als_str()))
        .bind(zeit_als_text(&now))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") || msg.contains("unique") {
                DbError::Eindeutigkeit(format!(
                    "Benutzername '{}' bereits vergeben",
                    data.username
                ))
            } else {
                DbError::Sqlx(e)
            }
        })?;

        Ok(BenutzerRecord {
            id,
            username: data.username.to_string(),
            gender: data.gender,
            created_at: now,
            is_active: true,
        })
    }

    async fn benutzer_laden(&self, id: UserId) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(
            "SELECT id, username, gender, created_at, is_active
             FROM benutzer WHERE id = ?",
        )
        .bind(id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_benutzer(&r)).transpose()
    }

    async fn benutzer_laden_nach_name(&self, username: &str) -> DbResult<Option<BenutzerRecord>> {
        let row = sqlx::query(
            "SELECT id, username, gender, created_at, is_active
             FROM benutzer WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_zu_benutzer(&r)).transpose()
    }
}

fn row_zu_benutzer(row: &SqliteRow) -> DbResult<BenutzerRecord> {
    let id_str: String = row.try_get("id")?;
    let id = uuid::Uuid::parse_str(&id_str)
        .map_err(|e| DbError::intern(format!("Ungueltige Benutzer-ID '{id_str}': {e}")))?;

    let gender: Option<String> = row.try_get("gender")?;
    let gender = gender
        .map(|g| Gender::from_str(&g).map_err(DbError::intern))
        .transpose()?;

    let created_at: String = row.try_get("created_at")?;
    let is_active: i64 = row.try_get("is_active")?;

    Ok(BenutzerRecord {
        id: UserId(id),
        username: row.try_get("username")?,
        gender,
        created_at: zeit_aus_text(&created_at)?,
        is_active: is_active != 0,
    })
}
