//! Conversation Data Model
//!
//! Contacts, messages and per-contact message histories mirrored from the phone.
//!
//! ## Wire Layout
//!
//! ```json
//! {
//!     "person": {
//!         "number": "+48123456789",
//!         "nickname": "Alice",
//!         "avatar": "iVBORw0KGgo..."
//!     },
//!     "messages": [
//!         { "text": "Hi!", "timestamp": 1640000000000, "fromMe": false }
//!     ]
//! }
//! ```
//!
//! `avatar` is base64 and omitted when the contact has no picture.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Format used when showing message times to the user
const DISPLAY_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Identity of a phone contact
///
/// The phone number is the key: two `PersonId`s with the same number are the
/// same contact even if nickname or avatar differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonId {
    /// Phone number
    pub number: String,

    /// Display name from the phone's address book
    #[serde(default)]
    pub nickname: String,

    /// Raw avatar image bytes
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_avatar",
        deserialize_with = "deserialize_avatar"
    )]
    pub avatar: Option<Vec<u8>>,
}

impl PersonId {
    /// Create a contact without an avatar
    pub fn new(number: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            nickname: nickname.into(),
            avatar: None,
        }
    }

    /// Builder pattern: Set avatar bytes
    pub fn with_avatar(mut self, avatar: Vec<u8>) -> Self {
        self.avatar = Some(avatar);
        self
    }
}

impl PartialEq for PersonId {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for PersonId {}

impl Hash for PersonId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state);
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nickname.is_empty() {
            write!(f, "{}", self.number)
        } else {
            write!(f, "{} ({})", self.nickname, self.number)
        }
    }
}

fn serialize_avatar<S>(avatar: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match avatar {
        Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_avatar<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let encoded: Option<String> = Option::deserialize(deserializer)?;
    encoded
        .map(|s| STANDARD.decode(s.as_bytes()).map_err(Error::custom))
        .transpose()
}

/// A single text message
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message body
    text: String,

    /// UNIX epoch timestamp in milliseconds
    timestamp: i64,

    /// Whether the desktop owner sent it (vs received from the contact)
    #[serde(rename = "fromMe")]
    from_me: bool,
}

impl Message {
    /// A message composed locally, stamped with the current time
    pub fn sent(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
            from_me: true,
        }
    }

    /// A message received from the contact
    pub fn received(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            timestamp,
            from_me: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// UNIX epoch timestamp in milliseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Whether the desktop owner sent it
    pub fn is_from_me(&self) -> bool {
        self.from_me
    }

    /// Timestamp rendered as `dd/MM/yyyy HH:mm:ss` in local time
    pub fn display_time(&self) -> String {
        match Local.timestamp_millis_opt(self.timestamp).single() {
            Some(time) => time.format(DISPLAY_TIME_FORMAT).to_string(),
            None => String::new(),
        }
    }
}

/// A contact plus the ordered messages exchanged with them
///
/// Messages are append-only; insertion order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    person: PersonId,
    #[serde(default)]
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation
    pub fn new(person: PersonId) -> Self {
        Self {
            person,
            messages: Vec::new(),
        }
    }

    /// Create a conversation from existing messages
    pub fn with_messages(person: PersonId, messages: Vec<Message>) -> Self {
        Self { person, messages }
    }

    /// Contact this conversation is with
    pub fn person(&self) -> &PersonId {
        &self.person
    }

    /// Messages in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append one message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append messages, keeping their order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Split into contact and messages
    pub fn into_parts(self) -> (PersonId, Vec<Message>) {
        (self.person, self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_person_identity_is_number_only() {
        let a = PersonId::new("+48111", "Alice");
        let b = PersonId::new("+48111", "Ala").with_avatar(vec![1, 2, 3]);
        let c = PersonId::new("+48222", "Alice");

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<PersonId> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_person_display() {
        assert_eq!(PersonId::new("+48111", "Alice").to_string(), "Alice (+48111)");
        assert_eq!(PersonId::new("+48111", "").to_string(), "+48111");
    }

    #[test]
    fn test_avatar_encoded_as_base64() {
        let person = PersonId::new("+48111", "Alice").with_avatar(b"png".to_vec());
        let value = serde_json::to_value(&person).unwrap();
        assert_eq!(value["avatar"], json!("cG5n"));

        let parsed: PersonId = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.avatar, Some(b"png".to_vec()));
    }

    #[test]
    fn test_avatar_omitted_when_absent() {
        let value = serde_json::to_value(PersonId::new("+48111", "Alice")).unwrap();
        assert!(value.get("avatar").is_none());

        let parsed: PersonId = serde_json::from_value(json!({"number": "+48111"})).unwrap();
        assert_eq!(parsed.nickname, "");
        assert_eq!(parsed.avatar, None);
    }

    #[test]
    fn test_invalid_avatar_rejected() {
        let result: serde_json::Result<PersonId> =
            serde_json::from_value(json!({"number": "1", "avatar": "***"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_sent_and_received_messages() {
        let sent = Message::sent("hello");
        assert!(sent.is_from_me());
        assert!(sent.timestamp() > 0);
        assert_eq!(sent.text(), "hello");

        let received = Message::received("hi", 1_640_000_000_000);
        assert!(!received.is_from_me());
        assert_eq!(received.timestamp(), 1_640_000_000_000);
    }

    #[test]
    fn test_message_wire_field_names() {
        let value = serde_json::to_value(Message::received("hi", 5)).unwrap();
        assert_eq!(value, json!({"text": "hi", "timestamp": 5, "fromMe": false}));
    }

    #[test]
    fn test_display_time_format() {
        let message = Message::received("hi", 1_640_000_000_000);
        let shown = message.display_time();
        // dd/MM/yyyy HH:mm:ss
        assert_eq!(shown.len(), 19);
        assert_eq!(&shown[2..3], "/");
        assert_eq!(&shown[5..6], "/");
        assert!(shown.contains("/2021 ") || shown.contains("/2022 "));
    }

    #[test]
    fn test_conversation_preserves_order() {
        let mut conversation = Conversation::new(PersonId::new("1", "A"));
        assert!(conversation.is_empty());

        conversation.push(Message::received("one", 1));
        conversation.extend(vec![Message::received("two", 2), Message::sent("three")]);

        let texts: Vec<&str> = conversation.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(conversation.len(), 3);
    }
}
