use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::dto::NewUser;
use super::password::CredentialHasher;
use crate::db::Page;
use crate::error::{AppError, Result};

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub fullname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String, // never exposed in JSON
    pub is_active: bool,
}

impl User {
    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, fullname, email, hashed_password, is_active
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Like [`User::find_by_id`] but a missing user is an error.
    pub async fn get(db: &SqlitePool, id: i64) -> Result<User> {
        Self::find_by_id(db, id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, fullname, email, hashed_password, is_active
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list(db: &SqlitePool, page: Page) -> Result<Vec<User>> {
        let (limit, offset) = page.bounds();
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, fullname, email, hashed_password, is_active
            FROM users
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    /// Hash the password and insert. A duplicate email surfaces as `Conflict`.
    pub async fn create(
        db: &SqlitePool,
        hasher: &dyn CredentialHasher,
        draft: &NewUser,
    ) -> Result<User> {
        let hashed_password = hasher.hash(&draft.password)?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, fullname, email, hashed_password)
            VALUES (?, ?, ?, ?)
            RETURNING id, username, fullname, email, hashed_password, is_active
            "#,
        )
        .bind(&draft.username)
        .bind(&draft.fullname)
        .bind(&draft.email)
        .bind(hashed_password)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}
