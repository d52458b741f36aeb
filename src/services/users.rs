use std::collections::HashMap;
use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use tracing::{debug, info};

use super::repository::{Filter, Repository};
use crate::config::DefaultUser;
use crate::dto::UserSummary;
use crate::error::{AppError, AppResult};
use crate::models::user::User;

pub struct UserManager {
    users: Arc<dyn Repository<User>>,
    bcrypt_cost: u32,
}

impl UserManager {
    pub fn new(users: Arc<dyn Repository<User>>, bcrypt_cost: u32) -> Self {
        Self { users, bcrypt_cost }
    }

    pub async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.users
            .find_one(&Filter::new().eq("username", username))
            .await
    }

    pub async fn get_user_by_id(&self, id: &ObjectId) -> AppResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id.to_hex()))
    }

    /// Returns the user when the password matches its stored hash.
    pub async fn verify_password(&self, username: &str, password: &str) -> AppResult<Option<User>> {
        let Some(user) = self.get_user_by_username(username).await? else {
            debug!("Login attempt for unknown user {}", username);
            return Ok(None);
        };

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::internal(format!("password check was interrupted: {}", e)))??;

        Ok(valid.then_some(user))
    }

    pub async fn create_user(&self, username: &str, password: &str) -> AppResult<User> {
        if self.get_user_by_username(username).await?.is_some() {
            return Err(AppError::conflict(format!("User \"{}\" already exists", username)));
        }

        let cost = self.bcrypt_cost;
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::internal(format!("password hashing was interrupted: {}", e)))??;

        let user = User::new(username.to_string(), hash);
        self.users.insert(&user).await?;
        info!("Created user {}", user.username);
        Ok(user)
    }

    /// Creates configured users that do not exist yet.
    pub async fn ensure_default_users(&self, defaults: &[DefaultUser]) -> AppResult<usize> {
        let mut created = 0;
        for default in defaults {
            if self.get_user_by_username(&default.username).await?.is_none() {
                self.create_user(&default.username, &default.password).await?;
                created += 1;
            }
        }
        Ok(created)
    }

    pub async fn summary(&self, id: &ObjectId) -> AppResult<UserSummary> {
        Ok(self
            .users
            .find_by_id(id)
            .await?
            .map(|user| UserSummary::from(&user))
            .unwrap_or_else(|| UserSummary::missing(id)))
    }

    /// Populated references for a set of user ids.
    pub async fn summaries<I>(&self, ids: I) -> AppResult<HashMap<ObjectId, UserSummary>>
    where
        I: IntoIterator<Item = ObjectId> + Send,
        I::IntoIter: Send,
    {
        let mut found = HashMap::new();
        for id in ids {
            if !found.contains_key(&id) {
                let summary = self.summary(&id).await?;
                found.insert(id, summary);
            }
        }
        Ok(found)
    }
}
