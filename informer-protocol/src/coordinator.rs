//! Coordinator
//!
//! The orchestration point between the phone connection, the conversation
//! store and the UI. Decoded frames come in from the inbound channel, text to
//! send comes in from the UI; both end up as store updates and observer
//! notifications.
//!
//! Every read-modify-write of the store (and of the selected conversation)
//! happens under a single lock, so frames from the phone and locally sent
//! messages never interleave inside one update. Observer callbacks run while
//! that lock is held, so the UI sees updates in the order the store applied
//! them.
//!
//! Lock order: `session` first, then `observer` or `outbound`.

use crate::connection::{FrameHandler, OutboundChannel};
use crate::{
    Conversation, ConversationObserver, ConversationStore, Frame, MergeOutcome, Message,
    OutboundMessage, PersonId, ProtocolError, Result,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// State guarded by the coordinator lock
#[derive(Default)]
struct Session {
    /// Created by the first snapshot
    store: Option<ConversationStore>,

    /// Conversation currently shown in the UI
    current: Option<PersonId>,
}

/// Shared orchestration point of the sync engine
pub struct Coordinator {
    session: Mutex<Session>,
    observer: RwLock<Option<Arc<dyn ConversationObserver>>>,
    outbound: RwLock<Option<Arc<OutboundChannel>>>,
    shutting_down: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Session::default()),
            observer: RwLock::new(None),
            outbound: RwLock::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register the UI collaborator
    ///
    /// When conversations are already known the contact list is pushed right away.
    pub async fn attach_observer(&self, observer: Arc<dyn ConversationObserver>) {
        let session = self.session.lock().await;
        *self.observer.write().await = Some(observer.clone());
        debug!("Observer attached");

        if let Some(store) = session.store.as_ref() {
            observer.load_contact_list(store.contacts());
        }
    }

    async fn observer(&self) -> Result<Arc<dyn ConversationObserver>> {
        self.observer
            .read()
            .await
            .clone()
            .ok_or(ProtocolError::ObserverNotAttached)
    }

    /// Install a full snapshot from the phone
    ///
    /// The store is replaced even when no observer is attached yet; the
    /// missing observer is reported afterwards.
    pub async fn on_snapshot_received(&self, conversations: Vec<Conversation>) -> Result<()> {
        let mut session = self.session.lock().await;
        let store = session.store.get_or_insert_with(ConversationStore::new);
        store.replace_all(conversations);
        let contacts = store.contacts();

        info!("Synchronized {} conversations from phone", contacts.len());
        self.observer().await?.load_contact_list(contacts);
        Ok(())
    }

    /// Merge an incremental batch from the phone
    ///
    /// Batches arriving before the first snapshot are dropped.
    pub async fn on_conversation_received(&self, batch: Conversation) -> Result<()> {
        let mut session = self.session.lock().await;
        let Session { store, current } = &mut *session;

        let Some(store) = store.as_mut() else {
            debug!(
                "No snapshot yet, dropping {} messages from {}",
                batch.len(),
                batch.person()
            );
            return Ok(());
        };

        info!("{} new messages from {}", batch.len(), batch.person());
        let person = batch.person().clone();
        let outcome = store.merge_append(batch.clone());

        let observer = self.observer().await?;
        if outcome == MergeOutcome::NewContact {
            observer.load_contact_list(store.contacts());
        }
        observer.notify_new_messages(batch);
        if current.as_ref() == Some(&person) {
            if let Some(conversation) = store.get(&person) {
                observer.load_conversation(conversation.clone());
            }
        }
        Ok(())
    }

    /// Send text to the contact of the selected conversation
    ///
    /// The message is queued for the phone and appended to the local
    /// conversation at once, without waiting for an echo.
    ///
    /// # Errors
    ///
    /// `NoActiveConversation` when nothing is selected, `NoActiveConnection`
    /// when no phone is attached. Nothing is queued in either case.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        let mut session = self.session.lock().await;
        let Session { store, current } = &mut *session;

        let Some(person) = current.clone() else {
            warn!("Cannot send message: no conversation selected");
            return Err(ProtocolError::NoActiveConversation);
        };
        let Some(outbound) = self.outbound.read().await.clone() else {
            warn!("Cannot send message to {}: no phone connected", person);
            return Err(ProtocolError::NoActiveConnection);
        };

        debug!("Sending message to {}", person);
        let message = Message::sent(text);
        outbound.enqueue(OutboundMessage::new(person.number.clone(), message.clone()));

        let Some(store) = store.as_mut() else {
            return Ok(());
        };
        let echo = Conversation::with_messages(person.clone(), vec![message]);
        let outcome = store.merge_append(echo);

        if let Some(observer) = self.observer.read().await.clone() {
            if outcome == MergeOutcome::NewContact {
                observer.load_contact_list(store.contacts());
            }
            if let Some(conversation) = store.get(&person) {
                observer.load_conversation(conversation.clone());
            }
        }
        Ok(())
    }

    /// Select a conversation and show it
    ///
    /// Unknown contacts leave the selection unchanged.
    pub async fn load_conversation(&self, person: &PersonId) -> Result<()> {
        let mut session = self.session.lock().await;
        let observer = self.observer().await?;

        let conversation = session
            .store
            .as_ref()
            .and_then(|store| store.get(person))
            .cloned();

        match conversation {
            Some(conversation) => {
                session.current = Some(person.clone());
                observer.load_conversation(conversation);
            }
            None => debug!("No conversation with {}", person),
        }
        Ok(())
    }

    /// Show or clear the "waiting for connection" indicator
    ///
    /// Ignored while the engine is shutting down.
    pub async fn connection_state_changed(&self, is_connected: bool) -> Result<()> {
        if self.is_shutting_down() {
            return Ok(());
        }

        let observer = self.observer().await?;
        if is_connected {
            observer.clear_connection_waiting();
        } else {
            observer.show_connection_waiting();
        }
        Ok(())
    }

    /// Use this channel for outgoing messages
    pub async fn attach_outbound(&self, outbound: Arc<OutboundChannel>) {
        *self.outbound.write().await = Some(outbound);
    }

    /// Forget the outgoing channel
    pub async fn detach_outbound(&self) {
        self.outbound.write().await.take();
    }

    pub async fn has_outbound(&self) -> bool {
        self.outbound.read().await.is_some()
    }

    /// Forget the selection and the outgoing channel, and clear the UI
    ///
    /// Conversations stay in the store until the next snapshot replaces them.
    pub async fn clear_session(&self) {
        let mut session = self.session.lock().await;
        session.current = None;
        self.detach_outbound().await;

        if let Some(observer) = self.observer.read().await.clone() {
            observer.clear_all_views();
        }
    }

    /// Enter or leave the terminal shutdown state
    pub fn set_shutting_down(&self, shutting_down: bool) {
        self.shutting_down.store(shutting_down, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Contact of the conversation currently shown
    pub async fn current_conversation(&self) -> Option<PersonId> {
        self.session.lock().await.current.clone()
    }

    /// All known contacts, sorted by number
    pub async fn contacts(&self) -> Vec<PersonId> {
        let session = self.session.lock().await;
        session
            .store
            .as_ref()
            .map(ConversationStore::contacts)
            .unwrap_or_default()
    }

    /// Copy of the stored conversation with a contact
    pub async fn conversation(&self, person: &PersonId) -> Option<Conversation> {
        let session = self.session.lock().await;
        session
            .store
            .as_ref()
            .and_then(|store| store.get(person))
            .cloned()
    }

    /// Whether a snapshot has been received
    pub async fn is_synchronized(&self) -> bool {
        self.session.lock().await.store.is_some()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameHandler for Coordinator {
    async fn handle_frame(&self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Snapshot(conversations) => self.on_snapshot_received(conversations).await,
            Frame::Conversation(batch) => self.on_conversation_received(batch).await,
            Frame::OutboundMessage(outbound) => {
                debug!(
                    "Ignoring outbound message frame for {} from phone",
                    outbound.recipient
                );
                Ok(())
            }
        }
    }
}
