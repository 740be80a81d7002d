//! Shared application state. Every collaborator is an explicit injected
//! handle; nothing reaches for ambient globals.

use std::sync::Arc;

use async_trait::async_trait;

use palaver_bus::{FilterError, MembershipSource, NotificationBus};
use palaver_core::{Error, GroupId, User, UserId};

use crate::auth::{verify_password, Identity};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn Identity>,
    pub bus: Arc<NotificationBus>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        identity: Arc<dyn Identity>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            store,
            identity,
            bus,
        }
    }

    /// Resolves a bearer token to a live user. A token for a user that no
    /// longer exists is as unauthorized as a forged one.
    pub async fn authed_user(&self, token: &str) -> Result<User, Error> {
        let user_id = self.identity.verify(token)?;
        self.store
            .user(user_id)
            .await?
            .ok_or(Error::Unauthorized)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, Error> {
        let credentials = self
            .store
            .user_by_email(email)
            .await?
            .ok_or(Error::Unauthorized)?;
        if !verify_password(password, &credentials.password_hash) {
            return Err(Error::Unauthorized);
        }
        Ok(credentials.user)
    }

    /// Membership oracle handed to bus filters; rechecks storage per event
    /// so a subscriber that left a group stops receiving immediately.
    pub fn membership(&self) -> Arc<dyn MembershipSource> {
        Arc::new(StoreMembership {
            store: self.store.clone(),
        })
    }
}

struct StoreMembership {
    store: Arc<dyn Store>,
}

#[async_trait]
impl MembershipSource for StoreMembership {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> Result<bool, FilterError> {
        let group = self
            .store
            .group(group_id)
            .await
            .map_err(|err| FilterError::new(err.to_string()))?;
        Ok(group.map_or(false, |g| g.has_member(user_id)))
    }
}
