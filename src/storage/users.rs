use super::schema::Database;
use super::types::{NewUser, Profile, StoreError, User, Viewer};

impl Database {
    // ========================================================================
    // Users
    // ========================================================================

    /// Insert a user. A taken username or email is reported as `Duplicate`.
    pub async fn insert_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (username, email, bio, image) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.bio)
        .bind(&new.image)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(User {
            id,
            username: new.username.clone(),
            email: new.email.clone(),
            bio: new.bio.clone(),
            image: new.image.clone(),
        })
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>("SELECT id, username, email, bio, image FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, email, bio, image FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    // ========================================================================
    // Follows
    // ========================================================================

    /// Make `follower_id` follow `followed_id` (idempotent).
    pub async fn follow_user(&self, follower_id: i64, followed_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO follows (follower_id, followed_id) VALUES (?, ?)")
            .bind(follower_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a follow relationship (idempotent).
    pub async fn unfollow_user(&self, follower_id: i64, followed_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followed_id = ?")
            .bind(follower_id)
            .bind(followed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool, StoreError> {
        let (following,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?)",
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(following)
    }

    /// Profile of `username` as seen by `viewer`. Nobody follows themselves.
    pub async fn get_profile(&self, username: &str, viewer: Viewer) -> Result<Profile, StoreError> {
        let user = self.get_user_by_username(username).await?;
        let following = match viewer {
            Viewer::User(id) if id != user.id => self.is_following(id, user.id).await?,
            _ => false,
        };
        Ok(Profile {
            username: user.username,
            bio: user.bio,
            image: user.image,
            following,
        })
    }
}
