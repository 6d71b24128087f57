//! Headless UI
//!
//! Renders engine notifications as log lines.

use informer_protocol::{Conversation, ConversationObserver, Message, PersonId};
use tracing::info;

/// Observer writing every notification to the log
#[derive(Debug, Default)]
pub struct LogObserver;

/// One message as shown in a conversation view
pub fn render_message(person: &PersonId, message: &Message) -> String {
    let author = if message.is_from_me() {
        "me".to_string()
    } else {
        person.to_string()
    };
    format!("[{}] {}: {}", message.display_time(), author, message.text())
}

impl ConversationObserver for LogObserver {
    fn load_contact_list(&self, contacts: Vec<PersonId>) {
        info!("{} contacts", contacts.len());
        for person in &contacts {
            info!("  {}", person);
        }
    }

    fn load_conversation(&self, conversation: Conversation) {
        info!("Conversation with {}", conversation.person());
        for message in conversation.messages() {
            info!("  {}", render_message(conversation.person(), message));
        }
    }

    fn notify_new_messages(&self, batch: Conversation) {
        for message in batch.messages() {
            info!("New message {}", render_message(batch.person(), message));
        }
    }

    fn show_connection_waiting(&self) {
        info!("Waiting for the phone to connect...");
    }

    fn clear_connection_waiting(&self) {
        info!("Phone connected");
    }

    fn clear_all_views(&self) {
        info!("Views cleared");
    }
}
