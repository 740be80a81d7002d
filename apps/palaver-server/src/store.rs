//! Storage collaborator. The `Store` trait is the seam a relational backend
//! would plug into; `MemoryStore` is the in-process backend used for
//! development and tests. Identifier assignment is the store's alone:
//! creates are serialized under one write lock, which is what makes message
//! ids the total order everything else leans on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;

use palaver_core::{EntityKind, Error, Group, GroupId, Message, MessageId, User, UserId};

/// A user record together with its password hash. The hash never leaves the
/// auth layer; the wire type is the embedded [`User`].
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, Error>;
    async fn user(&self, id: UserId) -> Result<Option<User>, Error>;
    async fn users(&self, ids: &[UserId]) -> Result<Vec<User>, Error>;
    async fn user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, Error>;

    /// Creates the group and its membership rows as one logical unit. Any
    /// unknown member id fails the whole create with `NotFound` and leaves
    /// nothing behind.
    async fn create_group(
        &self,
        name: &str,
        creator_id: UserId,
        member_ids: &[UserId],
    ) -> Result<Group, Error>;
    async fn group(&self, id: GroupId) -> Result<Option<Group>, Error>;
    async fn groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>, Error>;
    async fn rename_group(&self, id: GroupId, name: &str) -> Result<Option<Group>, Error>;
    /// Removes one member; the group is dropped entirely when its member
    /// set empties. Returns the remaining member count, `None` when the
    /// group did not exist.
    async fn remove_member(&self, id: GroupId, user_id: UserId) -> Result<Option<usize>, Error>;
    async fn delete_group(&self, id: GroupId) -> Result<bool, Error>;

    async fn create_message(
        &self,
        group_id: GroupId,
        author_id: UserId,
        text: &str,
    ) -> Result<Message, Error>;
    /// Messages of `group_id`, newest first, bounded and limited. `older_than`
    /// and `newer_than` are both exclusive; both may apply at once.
    async fn messages_page(
        &self,
        group_id: GroupId,
        older_than: Option<MessageId>,
        newer_than: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, Error>;
    /// Existence probe: is there a message strictly older than `than`,
    /// still above the page's lower bound if one applies?
    async fn older_message_exists(
        &self,
        group_id: GroupId,
        than: MessageId,
        newer_than: Option<MessageId>,
    ) -> Result<bool, Error>;
    /// Existence probe: is there a message strictly newer than `than`?
    async fn newer_message_exists(&self, group_id: GroupId, than: MessageId)
        -> Result<bool, Error>;
}

#[derive(Debug, Clone)]
struct GroupRecord {
    id: GroupId,
    name: String,
    creator_id: UserId,
    member_ids: BTreeSet<UserId>,
}

#[derive(Default)]
struct Inner {
    users: BTreeMap<UserId, UserCredentials>,
    users_by_email: HashMap<String, UserId>,
    groups: BTreeMap<GroupId, GroupRecord>,
    messages: HashMap<GroupId, BTreeMap<MessageId, Message>>,
    next_user_id: i64,
    next_group_id: i64,
    next_message_id: i64,
}

/// In-memory backend. All writes funnel through one `parking_lot` write
/// lock, which serializes identifier assignment per entity.
#[derive(Default)]
pub struct MemoryStore {
    inner: parking_lot::RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn group_view(&self, record: &GroupRecord) -> Group {
        let latest_message = self
            .messages
            .get(&record.id)
            .and_then(|by_id| by_id.values().next_back().cloned());
        Group {
            id: record.id,
            name: record.name.clone(),
            creator_id: record.creator_id,
            member_ids: record.member_ids.iter().copied().collect(),
            latest_message,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, Error> {
        let mut inner = self.inner.write();
        if inner.users_by_email.contains_key(email) {
            return Err(Error::Conflict(format!("email {email} already registered")));
        }
        inner.next_user_id += 1;
        let user = User {
            id: UserId(inner.next_user_id),
            username: username.to_string(),
            email: email.to_string(),
        };
        inner.users_by_email.insert(email.to_string(), user.id);
        inner.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, Error> {
        Ok(self.inner.read().users.get(&id).map(|c| c.user.clone()))
    }

    async fn users(&self, ids: &[UserId]) -> Result<Vec<User>, Error> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.users.get(id).map(|c| c.user.clone()))
            .collect())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, Error> {
        let inner = self.inner.read();
        Ok(inner
            .users_by_email
            .get(email)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn create_group(
        &self,
        name: &str,
        creator_id: UserId,
        member_ids: &[UserId],
    ) -> Result<Group, Error> {
        let mut inner = self.inner.write();
        // Resolve everything before touching state so a bad member id
        // cannot leave an orphan group visible to queries.
        let mut members: BTreeSet<UserId> = BTreeSet::new();
        members.insert(creator_id);
        members.extend(member_ids.iter().copied());
        for member in &members {
            if !inner.users.contains_key(member) {
                return Err(Error::not_found(EntityKind::User, member.0));
            }
        }
        inner.next_group_id += 1;
        let record = GroupRecord {
            id: GroupId(inner.next_group_id),
            name: name.to_string(),
            creator_id,
            member_ids: members,
        };
        let view = inner.group_view(&record);
        inner.groups.insert(record.id, record);
        Ok(view)
    }

    async fn group(&self, id: GroupId) -> Result<Option<Group>, Error> {
        let inner = self.inner.read();
        Ok(inner.groups.get(&id).map(|record| inner.group_view(record)))
    }

    async fn groups_for_user(&self, user_id: UserId) -> Result<Vec<Group>, Error> {
        let inner = self.inner.read();
        Ok(inner
            .groups
            .values()
            .filter(|record| record.member_ids.contains(&user_id))
            .map(|record| inner.group_view(record))
            .collect())
    }

    async fn rename_group(&self, id: GroupId, name: &str) -> Result<Option<Group>, Error> {
        let mut inner = self.inner.write();
        let Some(record) = inner.groups.get_mut(&id) else {
            return Ok(None);
        };
        record.name = name.to_string();
        let record = record.clone();
        Ok(Some(inner.group_view(&record)))
    }

    async fn remove_member(&self, id: GroupId, user_id: UserId) -> Result<Option<usize>, Error> {
        let mut inner = self.inner.write();
        let Some(record) = inner.groups.get_mut(&id) else {
            return Ok(None);
        };
        record.member_ids.remove(&user_id);
        let remaining = record.member_ids.len();
        if remaining == 0 {
            inner.groups.remove(&id);
            inner.messages.remove(&id);
        }
        Ok(Some(remaining))
    }

    async fn delete_group(&self, id: GroupId) -> Result<bool, Error> {
        let mut inner = self.inner.write();
        let existed = inner.groups.remove(&id).is_some();
        inner.messages.remove(&id);
        Ok(existed)
    }

    async fn create_message(
        &self,
        group_id: GroupId,
        author_id: UserId,
        text: &str,
    ) -> Result<Message, Error> {
        let mut inner = self.inner.write();
        if !inner.groups.contains_key(&group_id) {
            return Err(Error::not_found(EntityKind::Group, group_id.0));
        }
        if !inner.users.contains_key(&author_id) {
            return Err(Error::not_found(EntityKind::User, author_id.0));
        }
        inner.next_message_id += 1;
        let message = Message {
            id: MessageId(inner.next_message_id),
            group_id,
            author_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        inner
            .messages
            .entry(group_id)
            .or_default()
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn messages_page(
        &self,
        group_id: GroupId,
        older_than: Option<MessageId>,
        newer_than: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, Error> {
        let inner = self.inner.read();
        let Some(by_id) = inner.messages.get(&group_id) else {
            return Ok(Vec::new());
        };
        let rows = by_id
            .values()
            .rev()
            .filter(|m| older_than.map_or(true, |bound| m.id < bound))
            .filter(|m| newer_than.map_or(true, |bound| m.id > bound))
            .take(limit)
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn older_message_exists(
        &self,
        group_id: GroupId,
        than: MessageId,
        newer_than: Option<MessageId>,
    ) -> Result<bool, Error> {
        let inner = self.inner.read();
        let Some(by_id) = inner.messages.get(&group_id) else {
            return Ok(false);
        };
        Ok(by_id
            .range(..than)
            .next_back()
            .map_or(false, |(id, _)| newer_than.map_or(true, |bound| *id > bound)))
    }

    async fn newer_message_exists(
        &self,
        group_id: GroupId,
        than: MessageId,
    ) -> Result<bool, Error> {
        let inner = self.inner.read();
        let Some(by_id) = inner.messages.get(&group_id) else {
            return Ok(false);
        };
        // Exclusive bound rather than `than + 1`: the boundary id comes from
        // a client-supplied cursor and may be i64::MAX.
        Ok(by_id
            .range((std::ops::Bound::Excluded(than), std::ops::Bound::Unbounded))
            .next()
            .is_some())
    }
}
