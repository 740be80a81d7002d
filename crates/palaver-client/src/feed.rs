//! Local feed state with optimistic writes.
//!
//! A send is rendered immediately under a provisional identifier (negative,
//! never issued by the server). The authoritative copy can arrive by either
//! path first: the mutation response, or a pushed `message_added` event that
//! beats the response. Reconciliation keys strictly on the server-assigned
//! identifier, so whichever copy lands second is dropped and the feed holds
//! exactly one record per message.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::Utc;
use palaver_core::{Group, GroupId, Message, MessageId, UserId};

/// Handle for an in-flight optimistic send. Consumed by [`MessageFeed::settle`]
/// or [`MessageFeed::fail`].
#[derive(Debug)]
pub struct PendingMessage {
    sentinel: MessageId,
}

impl PendingMessage {
    /// The provisional identifier the draft renders under.
    pub fn sentinel(&self) -> MessageId {
        self.sentinel
    }
}

/// Messages for one group as the client renders them: confirmed records keyed
/// by server identifier, plus in-flight drafts shown at the head of the list.
#[derive(Debug)]
pub struct MessageFeed {
    entries: BTreeMap<MessageId, Message>,
    provisional: Vec<(MessageId, Message)>,
    next_sentinel: i64,
}

impl Default for MessageFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFeed {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            provisional: Vec::new(),
            next_sentinel: -1,
        }
    }

    /// Record a draft under a fresh provisional identifier so it renders
    /// immediately, before the server has acknowledged anything.
    pub fn optimistic_apply(
        &mut self,
        group_id: GroupId,
        author_id: UserId,
        text: impl Into<String>,
    ) -> PendingMessage {
        let sentinel = MessageId(self.next_sentinel);
        self.next_sentinel -= 1;
        let draft = Message {
            id: sentinel,
            group_id,
            author_id,
            text: text.into(),
            created_at: Utc::now(),
        };
        self.provisional.push((sentinel, draft));
        PendingMessage { sentinel }
    }

    /// Replace a draft with the server's copy. If the pushed event already
    /// delivered the same message the draft is simply dropped; if the draft
    /// was cleared in the meantime (the user navigated away) this is a no-op.
    pub fn settle(&mut self, pending: PendingMessage, authoritative: Message) {
        let Some(pos) = self
            .provisional
            .iter()
            .position(|(sentinel, _)| *sentinel == pending.sentinel)
        else {
            return;
        };
        self.provisional.remove(pos);
        self.entries
            .entry(authoritative.id)
            .or_insert(authoritative);
    }

    /// Roll back a draft whose mutation failed. Returns the draft so the
    /// caller can offer a retry.
    pub fn fail(&mut self, pending: PendingMessage) -> Option<Message> {
        let pos = self
            .provisional
            .iter()
            .position(|(sentinel, _)| *sentinel == pending.sentinel)?;
        Some(self.provisional.remove(pos).1)
    }

    /// Merge a message that arrived from the server (a pushed event or a
    /// fetched page). Returns false if the identifier is already present.
    pub fn merge_remote(&mut self, message: Message) -> bool {
        if message.id.is_provisional() {
            return false;
        }
        match self.entries.entry(message.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(message);
                true
            }
        }
    }

    /// Merge a fetched page, ignoring records already held.
    pub fn merge_page(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        messages
            .into_iter()
            .filter(|message| self.merge_remote(message.clone()))
            .count()
    }

    /// Newest-first render order: in-flight drafts at the head (most recent
    /// send first), then confirmed records by descending identifier.
    pub fn messages(&self) -> Vec<&Message> {
        self.provisional
            .iter()
            .rev()
            .map(|(_, draft)| draft)
            .chain(self.entries.values().rev())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.provisional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all drafts, e.g. when the user leaves the conversation. Handles
    /// for the dropped drafts settle as no-ops afterwards.
    pub fn clear_pending(&mut self) {
        self.provisional.clear();
    }
}

/// Handle for an in-flight optimistic group creation.
#[derive(Debug)]
pub struct PendingGroup {
    sentinel: GroupId,
}

impl PendingGroup {
    pub fn sentinel(&self) -> GroupId {
        self.sentinel
    }
}

/// The group list as the client renders it, deduplicated by identifier so a
/// `group_added` push and a refetch never produce two rows. Creations follow
/// the same provisional scheme as messages.
#[derive(Debug)]
pub struct GroupFeed {
    entries: BTreeMap<GroupId, Group>,
    provisional: Vec<(GroupId, Group)>,
    next_sentinel: i64,
}

impl Default for GroupFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupFeed {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            provisional: Vec::new(),
            next_sentinel: -1,
        }
    }

    /// Render a just-submitted group immediately under a provisional
    /// identifier.
    pub fn optimistic_apply(
        &mut self,
        name: impl Into<String>,
        creator_id: UserId,
        member_ids: Vec<UserId>,
    ) -> PendingGroup {
        let sentinel = GroupId(self.next_sentinel);
        self.next_sentinel -= 1;
        let draft = Group {
            id: sentinel,
            name: name.into(),
            creator_id,
            member_ids,
            latest_message: None,
        };
        self.provisional.push((sentinel, draft));
        PendingGroup { sentinel }
    }

    /// Replace a provisional group with the server's copy; a no-op when the
    /// draft is gone, a plain dedupe when the push arrived first.
    pub fn settle(&mut self, pending: PendingGroup, authoritative: Group) {
        let Some(pos) = self
            .provisional
            .iter()
            .position(|(sentinel, _)| *sentinel == pending.sentinel)
        else {
            return;
        };
        self.provisional.remove(pos);
        self.entries
            .entry(authoritative.id)
            .or_insert(authoritative);
    }

    /// Roll back a provisional group whose creation failed.
    pub fn fail(&mut self, pending: PendingGroup) -> Option<Group> {
        let pos = self
            .provisional
            .iter()
            .position(|(sentinel, _)| *sentinel == pending.sentinel)?;
        Some(self.provisional.remove(pos).1)
    }

    /// Merge a group from the server. Returns false if already present.
    pub fn merge_remote(&mut self, group: Group) -> bool {
        if group.id.is_provisional() {
            return false;
        }
        match self.entries.entry(group.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(group);
                true
            }
        }
    }

    /// Replace the held copy after a rename or membership change.
    pub fn upsert(&mut self, group: Group) {
        self.entries.insert(group.id, group);
    }

    pub fn remove(&mut self, id: GroupId) -> Option<Group> {
        self.entries.remove(&id)
    }

    /// Provisional groups first (most recent creation first), then
    /// confirmed groups by identifier.
    pub fn groups(&self) -> Vec<&Group> {
        self.provisional
            .iter()
            .rev()
            .map(|(_, draft)| draft)
            .chain(self.entries.values())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.provisional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
