//! User account database operations

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use vigil_common::{Error, Result};

use super::parse_timestamp;
use crate::models::User;

/// Fields of a user being created
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Already hashed (`vigil_common::api::hash_password`)
    pub password_hash: String,
}

/// Insert a user, returning its id
///
/// A duplicate username is `InvalidInput`.
pub async fn create_user(pool: &SqlitePool, user: &NewUser) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
            Error::InvalidInput(format!("Username already exists: {}", user.username)),
        ),
        Err(e) => Err(Error::Database(e)),
    }
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        password_hash: row.try_get("password_hash")?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "$argon2id$v=19$placeholder".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let pool = vigil_common::db::init_memory_database().await.unwrap();
        let id = create_user(&pool, &new_user("alice")).await.unwrap();

        let by_name = find_by_username(&pool, "alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert_eq!(by_name.email, "alice@example.com");

        let by_id = find_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");

        assert!(find_by_username(&pool, "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let pool = vigil_common::db::init_memory_database().await.unwrap();
        create_user(&pool, &new_user("alice")).await.unwrap();

        let err = create_user(&pool, &new_user("alice")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
