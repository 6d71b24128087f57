//! UI Collaborator Interface
//!
//! The engine never renders anything. Whatever shows conversations to the
//! user implements [`ConversationObserver`] and is attached to the
//! [`Coordinator`](crate::Coordinator).
//!
//! Callbacks are invoked from engine tasks while the store lock is held, so
//! they arrive in store order. Implementations must not call back into the
//! coordinator; those that drive a GUI toolkit should post the update to
//! their own UI thread and return quickly.

use crate::{Conversation, PersonId};

/// Receives everything the UI needs to mirror the engine state
pub trait ConversationObserver: Send + Sync {
    /// Replace the contact list (sorted by phone number)
    fn load_contact_list(&self, contacts: Vec<PersonId>);

    /// Show a full conversation
    fn load_conversation(&self, conversation: Conversation);

    /// New messages arrived from the phone for one contact
    fn notify_new_messages(&self, batch: Conversation);

    /// No phone attached; show a "waiting for connection" indicator
    fn show_connection_waiting(&self);

    /// A phone attached; hide the indicator
    fn clear_connection_waiting(&self);

    /// Forget everything currently shown
    fn clear_all_views(&self);
}
