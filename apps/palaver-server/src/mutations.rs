//! Mutation orchestrator: validate against storage, write, then publish the
//! materialized record to the bus. The publish is fire-and-forget relative
//! to the caller's response; subscribers that miss it resynchronize by
//! refetching.

use palaver_core::{EntityKind, Error, Event, Group, GroupId, Message, UserId};
use tracing::{debug, info};

use crate::state::AppState;

impl AppState {
    pub async fn create_message(
        &self,
        group_id: GroupId,
        author_id: UserId,
        text: &str,
    ) -> Result<Message, Error> {
        if self.store.group(group_id).await?.is_none() {
            return Err(Error::not_found(EntityKind::Group, group_id.0));
        }
        if self.store.user(author_id).await?.is_none() {
            return Err(Error::not_found(EntityKind::User, author_id.0));
        }

        let message = self.store.create_message(group_id, author_id, text).await?;
        let receivers = self.bus.publish(Event::MessageAdded {
            message: message.clone(),
        });
        debug!(
            message = %message.id,
            group = %group_id,
            author = %author_id,
            receivers,
            "message created"
        );
        Ok(message)
    }

    /// Creates the group and its membership as one unit; a single unknown
    /// member id fails the whole mutation with nothing written. The server
    /// never deduplicates indistinguishable creates: only the client can
    /// know it already received the same group over the bus.
    pub async fn create_group(
        &self,
        name: &str,
        creator_id: UserId,
        member_ids: &[UserId],
    ) -> Result<Group, Error> {
        if self.store.user(creator_id).await?.is_none() {
            return Err(Error::not_found(EntityKind::User, creator_id.0));
        }
        let resolved = self.store.users(member_ids).await?;
        if resolved.len() != member_ids.len() {
            let missing = member_ids
                .iter()
                .find(|id| !resolved.iter().any(|u| u.id == **id))
                .copied()
                .unwrap_or(creator_id);
            return Err(Error::not_found(EntityKind::User, missing.0));
        }

        let group = self.store.create_group(name, creator_id, member_ids).await?;
        let receivers = self.bus.publish(Event::GroupAdded {
            group: group.clone(),
        });
        info!(group = %group.id, creator = %creator_id, receivers, "group created");
        Ok(group)
    }

    pub async fn update_group(&self, group_id: GroupId, name: &str) -> Result<Group, Error> {
        self.store
            .rename_group(group_id, name)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Group, group_id.0))
    }

    /// Removes the caller from the group; the group itself goes away with
    /// its last member.
    pub async fn leave_group(&self, group_id: GroupId, user_id: UserId) -> Result<(), Error> {
        match self.store.remove_member(group_id, user_id).await? {
            Some(remaining) => {
                debug!(group = %group_id, user = %user_id, remaining, "member left group");
                Ok(())
            }
            None => Err(Error::not_found(EntityKind::Group, group_id.0)),
        }
    }

    pub async fn delete_group(&self, group_id: GroupId) -> Result<(), Error> {
        if self.store.delete_group(group_id).await? {
            info!(group = %group_id, "group deleted");
            Ok(())
        } else {
            Err(Error::not_found(EntityKind::Group, group_id.0))
        }
    }
}
