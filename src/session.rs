//! Chat sessions for the chat-style provider.
//!
//! A session carries the generation settings fixed when it was started. Sessions
//! live in a [`SessionStore`] owned by the server state and handed to handlers
//! explicitly; one session per browser conversation.
//!
//! The store is bounded: sessions idle for longer than the configured TTL are
//! discarded, and when the store is full the least recently used session is
//! evicted to make room for a new one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::adapter::{chat_contents, ChatRequest, ChatTurn, Content, GenerationConfig};
use crate::config::{ChatConfig, RelayMode, SafetySetting};
use crate::error::{Error, Result};

/// Settings every session of this process starts with.
#[derive(Debug, Clone)]
struct SessionTemplate {
    model: String,
    generation: GenerationConfig,
    safety: Vec<SafetySetting>,
    system_instruction: Option<Content>,
}

/// One conversation with the chat-style provider.
#[derive(Debug)]
pub struct ChatSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    template: SessionTemplate,
}

impl ChatSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn model(&self) -> &str {
        &self.template.model
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Build the request for this turn from the full submitted history.
    pub fn begin_turn(&self, turns: &[ChatTurn]) -> ChatRequest {
        self.touch();
        ChatRequest {
            model: self.template.model.clone(),
            contents: chat_contents(turns),
            generation_config: self.template.generation.clone(),
            safety_settings: self.template.safety.clone(),
            system_instruction: self.template.system_instruction.clone(),
        }
    }
}

/// Process-wide registry of live chat sessions.
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<ChatSession>>,
    template: std::result::Result<SessionTemplate, String>,
    idle_ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    /// Build a store from the chat provider settings.
    ///
    /// Outside chat mode, or with no credential, the store still exists but
    /// every [`SessionStore::start`] fails with `SessionInit`, so the UI can
    /// show the problem inline.
    pub fn new(mode: RelayMode, chat: &ChatConfig, persona: &str) -> Self {
        let template = if mode != RelayMode::Chat {
            Err(format!("sessions are not used when relay mode is {}", mode))
        } else if chat.api_key.is_none() {
            Err("chat provider has no API key configured".to_string())
        } else if chat.model.trim().is_empty() {
            Err("chat provider has no model configured".to_string())
        } else {
            Ok(SessionTemplate {
                model: chat.model.clone(),
                generation: GenerationConfig::from(&chat.generation),
                safety: chat.safety.clone(),
                system_instruction: chat
                    .use_persona
                    .then(|| Content::text(None, persona.to_string())),
            })
        };

        Self {
            sessions: DashMap::new(),
            template,
            idle_ttl: chat.session_idle(),
            capacity: chat.max_sessions.max(1),
        }
    }

    /// Prepare a session without registering it.
    ///
    /// Nothing can look it up until [`SessionStore::register`] is called.
    pub fn start(&self) -> Result<Arc<ChatSession>> {
        let template = self.template.clone().map_err(Error::SessionInit)?;
        Ok(Arc::new(ChatSession {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
            template,
        }))
    }

    /// Make a started session visible, evicting to stay within capacity.
    pub fn register(&self, session: Arc<ChatSession>) {
        self.prune_expired();
        while self.sessions.len() >= self.capacity {
            if !self.evict_least_recently_used() {
                break;
            }
        }
        tracing::info!(session = %session.id, model = %session.model(), "Chat session started");
        self.sessions.insert(session.id, session);
    }

    /// Start and register a session in one step.
    pub fn create(&self) -> Result<Arc<ChatSession>> {
        let session = self.start()?;
        self.register(session.clone());
        Ok(session)
    }

    /// Look up a session by the id the browser sent back.
    pub fn get(&self, id: &str) -> Result<Arc<ChatSession>> {
        let uuid = Uuid::parse_str(id).map_err(|_| Error::SessionNotFound(id.to_string()))?;
        let session = self
            .sessions
            .get(&uuid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        if session.last_used().elapsed() >= self.idle_ttl {
            self.sessions.remove(&uuid);
            tracing::info!(session = %uuid, "Chat session expired");
            return Err(Error::SessionNotFound(id.to_string()));
        }

        session.touch();
        Ok(session)
    }

    /// Discard a session when its conversation ends.
    pub fn remove(&self, id: &str) -> Result<()> {
        let uuid = Uuid::parse_str(id).map_err(|_| Error::SessionNotFound(id.to_string()))?;
        match self.sessions.remove(&uuid) {
            Some(_) => {
                tracing::info!(session = %uuid, "Chat session discarded");
                Ok(())
            }
            None => Err(Error::SessionNotFound(id.to_string())),
        }
    }

    /// Drop every session idle past the TTL. Returns how many were dropped.
    pub fn prune_expired(&self) -> usize {
        let before = self.sessions.len();
        let ttl = self.idle_ttl;
        self.sessions
            .retain(|_, session| session.last_used().elapsed() < ttl);
        let pruned = before.saturating_sub(self.sessions.len());
        if pruned > 0 {
            tracing::debug!(pruned, "Expired chat sessions discarded");
        }
        pruned
    }

    fn evict_least_recently_used(&self) -> bool {
        // Collect first; removing while iterating would deadlock the shard.
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().last_used())
            .map(|entry| *entry.key());

        match oldest {
            Some(id) => {
                self.sessions.remove(&id);
                tracing::info!(session = %id, "Chat session evicted, store at capacity");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
