//! The two filter predicates this system installs on the bus. Both exclude
//! the event's author: the author already holds the authoritative copy via
//! the mutation's direct response, so self-delivery would only create a
//! reconciliation race on the issuing client.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use palaver_core::{Event, GroupId, UserId};

use crate::{FilterError, SubscriptionFilter};

/// Asynchronous membership oracle consulted per event. Membership is
/// mutable (leave/delete), so the filter re-checks it at delivery time
/// instead of trusting the interest set captured at subscribe time.
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> Result<bool, FilterError>;
}

/// Gate for the message-added topic: the event's group must be in the
/// subscriber's interest set, the subscriber must still be a member, and
/// the subscriber must not be the author.
pub struct MessageAddedFilter {
    subscriber: UserId,
    interest: HashSet<GroupId>,
    membership: Arc<dyn MembershipSource>,
}

impl MessageAddedFilter {
    pub fn new(
        subscriber: UserId,
        interest: impl IntoIterator<Item = GroupId>,
        membership: Arc<dyn MembershipSource>,
    ) -> Self {
        Self {
            subscriber,
            interest: interest.into_iter().collect(),
            membership,
        }
    }
}

#[async_trait]
impl SubscriptionFilter for MessageAddedFilter {
    async fn accept(&self, event: &Event) -> Result<bool, FilterError> {
        let Event::MessageAdded { message } = event else {
            return Ok(false);
        };
        if message.author_id == self.subscriber {
            return Ok(false);
        }
        if !self.interest.contains(&message.group_id) {
            return Ok(false);
        }
        self.membership
            .is_member(self.subscriber, message.group_id)
            .await
    }
}

/// Gate for the group-added topic: the subscriber must be in the new
/// group's member set and must not be its creator. The member set rides in
/// the event itself, so no lookup is needed here.
pub struct GroupAddedFilter {
    subscriber: UserId,
}

impl GroupAddedFilter {
    pub fn new(subscriber: UserId) -> Self {
        Self { subscriber }
    }
}

#[async_trait]
impl SubscriptionFilter for GroupAddedFilter {
    async fn accept(&self, event: &Event) -> Result<bool, FilterError> {
        let Event::GroupAdded { group } = event else {
            return Ok(false);
        };
        Ok(group.has_member(self.subscriber) && group.creator_id != self.subscriber)
    }
}
