use std::sync::Arc;

use sqlx::Error;

use crate::configs::Storage;
use crate::models::User;

pub struct UserRepository {
    storage: Arc<Storage>,
}

impl UserRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub async fn create(&self, email: &str, password: &str, name: &str) -> Result<User, Error> {
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (email, password, name)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(password)
        .bind(name)
        .fetch_one(self.storage.get_pool())
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<User>, Error> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.storage.get_pool())
            .await?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.storage.get_pool())
            .await?;

        Ok(user)
    }

    pub async fn touch_last_login(&self, id: i32) -> Result<(), Error> {
        sqlx::query("UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(id)
            .execute(self.storage.get_pool())
            .await?;

        Ok(())
    }

    /// Everyone except the caller, for the sharing picker.
    pub async fn find_others(&self, user_id: i32) -> Result<Vec<User>, Error> {
        let users: Vec<User> =
            sqlx::query_as("SELECT * FROM users WHERE id != $1 ORDER BY name")
                .bind(user_id)
                .fetch_all(self.storage.get_pool())
                .await?;

        Ok(users)
    }
}
