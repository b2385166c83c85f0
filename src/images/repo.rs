use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::config::OwnershipMode;
use crate::db::Page;
use crate::error::Result;

/// Image record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Image {
    pub id: i64,
    pub name: String, // caller-supplied label
    pub path: String, // absolute path of the stored file
    pub owner_id: i64,
}

pub async fn list_images(db: &SqlitePool, page: Page) -> Result<Vec<Image>> {
    let (limit, offset) = page.bounds();
    let rows = sqlx::query_as::<_, Image>(
        r#"
        SELECT id, name, path, owner_id
          FROM images
         ORDER BY id
         LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_images_for_user(db: &SqlitePool, user_id: i64, page: Page) -> Result<Vec<Image>> {
    let (limit, offset) = page.bounds();
    let rows = sqlx::query_as::<_, Image>(
        r#"
        SELECT id, name, path, owner_id
          FROM images
         WHERE owner_id = ?
         ORDER BY id
         LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Image by id alone, whoever owns it.
pub async fn find_image(db: &SqlitePool, image_id: i64) -> Result<Option<Image>> {
    let row = sqlx::query_as::<_, Image>(
        r#"
        SELECT id, name, path, owner_id
          FROM images
         WHERE id = ?
        "#,
    )
    .bind(image_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Image by id, only if `user_id` owns it.
pub async fn find_owned_image(db: &SqlitePool, user_id: i64, image_id: i64) -> Result<Option<Image>> {
    let row = sqlx::query_as::<_, Image>(
        r#"
        SELECT id, name, path, owner_id
          FROM images
         WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(image_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Lookup used by the `/users/{id}/images/{image_id}` routes.
///
/// `Loose` ignores `user_id`, so any user's image is reachable through any user path.
pub async fn get_image_for_user(
    db: &SqlitePool,
    mode: OwnershipMode,
    user_id: i64,
    image_id: i64,
) -> Result<Option<Image>> {
    match mode {
        OwnershipMode::Strict => find_owned_image(db, user_id, image_id).await,
        OwnershipMode::Loose => find_image(db, image_id).await,
    }
}

pub async fn insert_image(db: &SqlitePool, name: &str, path: &str, owner_id: i64) -> Result<Image> {
    let image = sqlx::query_as::<_, Image>(
        r#"
        INSERT INTO images (name, path, owner_id)
        VALUES (?, ?, ?)
        RETURNING id, name, path, owner_id
        "#,
    )
    .bind(name)
    .bind(path)
    .bind(owner_id)
    .fetch_one(db)
    .await?;
    Ok(image)
}

/// Deletes the record and returns what was removed, so callers can deal with the file.
pub async fn delete_image(
    db: &SqlitePool,
    mode: OwnershipMode,
    user_id: i64,
    image_id: i64,
) -> Result<Option<Image>> {
    let query = match mode {
        OwnershipMode::Strict => sqlx::query_as::<_, Image>(
            r#"
            DELETE FROM images
             WHERE id = ? AND owner_id = ?
            RETURNING id, name, path, owner_id
            "#,
        )
        .bind(image_id)
        .bind(user_id),
        OwnershipMode::Loose => sqlx::query_as::<_, Image>(
            r#"
            DELETE FROM images
             WHERE id = ?
            RETURNING id, name, path, owner_id
            "#,
        )
        .bind(image_id),
    };
    Ok(query.fetch_optional(db).await?)
}
