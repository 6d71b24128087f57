//! Conversation Store
//!
//! In-memory mirror of the phone's conversations, keyed by contact.
//!
//! Two writes exist:
//! - [`ConversationStore::replace_all`] installs a whole new mapping (snapshot frames)
//! - [`ConversationStore::merge_append`] appends one incremental batch
//!
//! Nothing is ever deleted; conversations only grow until the next snapshot.

use crate::{Conversation, PersonId};
use std::collections::HashMap;
use tracing::debug;

/// Result of merging one conversation batch into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The contact was already known; messages were appended
    Appended,

    /// The contact was not known and has been inserted
    ///
    /// The caller re-announces the whole contact list.
    NewContact,
}

/// Mapping of contact to conversation, at most one entry per contact
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: HashMap<PersonId, Conversation>,
}

impl ConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot
    ///
    /// A contact listed twice keeps a single entry holding both batches in order.
    pub fn from_conversations(conversations: impl IntoIterator<Item = Conversation>) -> Self {
        let mut store = Self::new();
        for conversation in conversations {
            store.merge_append(conversation);
        }
        store
    }

    /// Swap the entire content for a new snapshot
    pub fn replace_all(&mut self, conversations: impl IntoIterator<Item = Conversation>) {
        *self = Self::from_conversations(conversations);
        debug!("Store replaced with {} conversations", self.len());
    }

    /// Look up the conversation with a contact
    pub fn get(&self, person: &PersonId) -> Option<&Conversation> {
        self.conversations.get(person)
    }

    /// Merge one batch of new messages
    ///
    /// Known contact: messages are appended after the stored ones, in batch
    /// order. Unknown contact: the batch becomes the contact's conversation.
    pub fn merge_append(&mut self, conversation: Conversation) -> MergeOutcome {
        if let Some(existing) = self.conversations.get_mut(conversation.person()) {
            let (_, messages) = conversation.into_parts();
            debug!(
                "Appending {} messages to conversation with {}",
                messages.len(),
                existing.person()
            );
            existing.extend(messages);
            MergeOutcome::Appended
        } else {
            debug!("New contact {}", conversation.person());
            self.conversations
                .insert(conversation.person().clone(), conversation);
            MergeOutcome::NewContact
        }
    }

    /// Every known contact, sorted by phone number
    pub fn contacts(&self) -> Vec<PersonId> {
        let mut contacts: Vec<PersonId> = self.conversations.keys().cloned().collect();
        contacts.sort_by(|a, b| a.number.cmp(&b.number));
        contacts
    }

    /// Iterate over all conversations in no particular order
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    fn person(number: &str) -> PersonId {
        PersonId::new(number, format!("Contact {}", number))
    }

    fn batch(number: &str, texts: &[&str]) -> Conversation {
        Conversation::with_messages(
            person(number),
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Message::received(*t, i as i64))
                .collect(),
        )
    }

    fn texts(store: &ConversationStore, number: &str) -> Vec<String> {
        store
            .get(&person(number))
            .map(|c| c.messages().iter().map(|m| m.text().to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_merge_unknown_reports_new_contact() {
        let mut store = ConversationStore::new();
        assert_eq!(store.merge_append(batch("1", &["a"])), MergeOutcome::NewContact);
        assert_eq!(texts(&store, "1"), vec!["a"]);
    }

    #[test]
    fn test_merge_known_never_replaces() {
        let mut store = ConversationStore::new();
        store.merge_append(batch("1", &["a", "b"]));

        assert_eq!(store.merge_append(batch("1", &["c"])), MergeOutcome::Appended);
        assert_eq!(store.merge_append(batch("1", &[])), MergeOutcome::Appended);
        assert_eq!(texts(&store, "1"), vec!["a", "b", "c"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_merges_concatenate_in_arrival_order() {
        let batches: Vec<Vec<&str>> = vec![
            vec!["m1"],
            vec!["m2", "m3"],
            vec![],
            vec!["m4", "m5", "m6"],
            vec!["m2"],
        ];

        let mut store = ConversationStore::new();
        let mut expected = Vec::new();
        for texts_in_batch in &batches {
            store.merge_append(batch("7", texts_in_batch));
            expected.extend(texts_in_batch.iter().map(|t| t.to_string()));
        }

        assert_eq!(texts(&store, "7"), expected);
    }

    #[test]
    fn test_replace_all_discards_previous_content() {
        let mut store = ConversationStore::new();
        store.merge_append(batch("1", &["old"]));
        store.merge_append(batch("2", &["old"]));

        store.replace_all(vec![batch("2", &["new"]), batch("3", &["x", "y"])]);

        assert_eq!(store.len(), 2);
        assert!(store.get(&person("1")).is_none());
        assert_eq!(texts(&store, "2"), vec!["new"]);
        assert_eq!(texts(&store, "3"), vec!["x", "y"]);
    }

    #[test]
    fn test_replace_all_with_empty_snapshot() {
        let mut store = ConversationStore::from_conversations(vec![batch("1", &["a"])]);
        store.replace_all(Vec::new());
        assert!(store.is_empty());
        assert!(store.contacts().is_empty());
    }

    #[test]
    fn test_duplicate_contact_in_snapshot_keeps_one_entry() {
        let store =
            ConversationStore::from_conversations(vec![batch("1", &["a"]), batch("1", &["b"])]);
        assert_eq!(store.len(), 1);
        assert_eq!(texts(&store, "1"), vec!["a", "b"]);
    }

    #[test]
    fn test_contacts_sorted_by_number() {
        let store = ConversationStore::from_conversations(vec![
            batch("300", &[]),
            batch("100", &[]),
            batch("200", &[]),
        ]);
        let numbers: Vec<String> = store.contacts().into_iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec!["100", "200", "300"]);
    }

    #[test]
    fn test_lookup_ignores_nickname() {
        let store = ConversationStore::from_conversations(vec![batch("1", &["a"])]);
        let renamed = PersonId::new("1", "Someone else");
        assert!(store.get(&renamed).is_some());
    }
}
