use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

/// `UserStore` held in a map, with the same uniqueness and monotonicity rules as Postgres.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().remove(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users.lock().unwrap().values().find(|u| pred(u)).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            verification_token: Some(new.verification_token),
            is_verified: false,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.get(id))
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| u.verification_token.as_deref() == Some(token)))
    }

    async fn find_by_valid_reset_token_hash(
        &self,
        hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.find(|u| has_valid_reset_token(u, hash, now)))
    }

    async fn mark_verified(&self, token: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        user.verification_token = None;
        user.is_verified = true;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        user.reset_token_hash = Some(hash.to_string());
        user.reset_token_expires_at = Some(expires_at);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn consume_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users
            .values_mut()
            .find(|u| has_valid_reset_token(u, hash, now))
        else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.reset_token_hash = None;
        user.reset_token_expires_at = None;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }
}

/// Valid only while the expiry is strictly in the future.
fn has_valid_reset_token(user: &User, hash: &str, now: OffsetDateTime) -> bool {
    matches!(
        (&user.reset_token_hash, user.reset_token_expires_at),
        (Some(stored), Some(expires_at)) if stored == hash && expires_at > now
    )
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "A".into(),
            email: email.into(),
            password_hash: "hash".into(),
            verification_token: "tok".into(),
        }
    }

    #[tokio::test]
    async fn create_rejects_case_variant_duplicates() {
        let store = InMemoryUserStore::new();
        store.create(new_user("a@x.com")).await.unwrap();
        let err = store.create(new_user("A@X.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn mark_verified_is_one_shot() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        let verified = store.mark_verified("tok").await.unwrap().unwrap();
        assert_eq!(verified.id, user.id);
        assert!(verified.is_verified && verified.verification_token.is_none());
        assert!(store.mark_verified("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_pair_is_valid_until_expiry_and_redeems_once() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + Duration::minutes(15);
        store.set_reset_token(user.id, "h", expires_at).await.unwrap();

        assert!(store.find_by_valid_reset_token_hash("h", now).await.unwrap().is_some());
        assert!(store.find_by_valid_reset_token_hash("other", now).await.unwrap().is_none());
        assert!(store
            .find_by_valid_reset_token_hash("h", expires_at)
            .await
            .unwrap()
            .is_none());

        let consumed = store.consume_reset_token("h", now, "new").await.unwrap().unwrap();
        assert_eq!(consumed.password_hash, "new");
        assert!(consumed.reset_token_hash.is_none() && consumed.reset_token_expires_at.is_none());
        assert!(store.consume_reset_token("h", now, "again").await.unwrap().is_none());
    }
}
