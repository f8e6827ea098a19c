//! Session objects and the in-memory registry that owns them.
//!
//! Sessions are keyed both by transport id and by user id; the two
//! indices are only ever updated together.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::events::ServerEvent;
use crate::error::{PairlinkError, Result};
use crate::profile::{normalize_profile, merge_profile, Preferences, Profile, RawProfile};

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: String,
    pub at: DateTime<Utc>,
}

/// The server's record of a single connected client.
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
    pub transport_id: String,
    pub profile: Profile,
    pub preferences: Preferences,
    pub connected_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub current_room_id: Option<String>,
    pub trust_score: f64,
    pub violations: Vec<Violation>,
    pub banned: bool,
    pub reported: bool,
    pub sender: EventSender,
}

impl Session {
    fn new(transport_id: String, profile: Profile, sender: EventSender) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4().to_string(),
            transport_id,
            profile,
            preferences: Preferences::default(),
            connected_at: now,
            last_active_at: now,
            current_room_id: None,
            trust_score: 1.0,
            violations: Vec::new(),
            banned: false,
            reported: false,
            sender,
        }
    }

    /// Push an event to this client's transport. A dead channel is
    /// logged and surfaces later as a disconnect.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.sender.send(event) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send event to user {}", self.user_id);
                false
            }
        }
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn session_age(&self) -> Duration {
        Utc::now() - self.connected_at
    }

    pub fn in_room(&self) -> bool {
        self.current_room_id.is_some()
    }
}

/// Result of recording a violation.
#[derive(Debug, Clone, Copy)]
pub struct FlagOutcome {
    pub trust_score: f64,
    pub violation_count: usize,
    pub banned: bool,
}

/// In-memory directory of connected clients.
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    user_index: HashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            user_index: HashMap::new(),
        }
    }

    /// Register a new client on a transport. Allocates the user id and
    /// seeds trust at 1.0.
    pub fn create(
        &mut self,
        transport_id: &str,
        raw_profile: &RawProfile,
        sender: EventSender,
    ) -> Result<&Session> {
        if self.sessions.contains_key(transport_id) {
            return Err(PairlinkError::AlreadyRegistered(transport_id.to_string()));
        }
        let profile = normalize_profile(raw_profile);
        let session = Session::new(transport_id.to_string(), profile, sender);
        self.user_index
            .insert(session.user_id.clone(), transport_id.to_string());
        let entry = self
            .sessions
            .entry(transport_id.to_string())
            .or_insert(session);
        debug!("Session created: {} on {}", entry.user_id, transport_id);
        Ok(entry)
    }

    pub fn get_by_transport(&self, transport_id: &str) -> Option<&Session> {
        self.sessions.get(transport_id)
    }

    pub fn get_by_transport_mut(&mut self, transport_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(transport_id)
    }

    pub fn get_by_user(&self, user_id: &str) -> Option<&Session> {
        self.user_index
            .get(user_id)
            .and_then(|transport_id| self.sessions.get(transport_id))
    }

    pub fn get_by_user_mut(&mut self, user_id: &str) -> Option<&mut Session> {
        let transport_id = self.user_index.get(user_id)?.clone();
        self.sessions.get_mut(&transport_id)
    }

    /// Record activity, rearming the idle deadline.
    pub fn touch(&mut self, transport_id: &str) {
        if let Some(session) = self.sessions.get_mut(transport_id) {
            session.last_active_at = Utc::now();
        }
    }

    /// Merge-with-normalize partial profile update.
    pub fn update_profile(&mut self, transport_id: &str, raw: &RawProfile) -> Result<()> {
        let session = self
            .sessions
            .get_mut(transport_id)
            .ok_or_else(|| PairlinkError::SessionNotFound(transport_id.to_string()))?;
        merge_profile(&mut session.profile, raw);
        Ok(())
    }

    pub fn bind_room(&mut self, user_id: &str, room_id: &str) -> Result<()> {
        let session = self
            .get_by_user_mut(user_id)
            .ok_or_else(|| PairlinkError::SessionNotFound(user_id.to_string()))?;
        session.current_room_id = Some(room_id.to_string());
        Ok(())
    }

    pub fn unbind_room(&mut self, user_id: &str) {
        if let Some(session) = self.get_by_user_mut(user_id) {
            session.current_room_id = None;
        }
    }

    /// Record a violation. Trust only ever goes down; a session is
    /// banned at five violations or once trust drops to 0.3.
    pub fn flag(&mut self, user_id: &str, kind: &str) -> Result<FlagOutcome> {
        let session = self
            .get_by_user_mut(user_id)
            .ok_or_else(|| PairlinkError::SessionNotFound(user_id.to_string()))?;
        session.violations.push(Violation {
            kind: kind.to_string(),
            at: Utc::now(),
        });
        session.trust_score = (session.trust_score - 0.1).max(0.0);
        if session.violations.len() >= 5 || session.trust_score <= 0.3 {
            session.banned = true;
        }
        debug!(
            "Flagged user {} ({}): trust={:.1}, violations={}, banned={}",
            user_id,
            kind,
            session.trust_score,
            session.violations.len(),
            session.banned
        );
        Ok(FlagOutcome {
            trust_score: session.trust_score,
            violation_count: session.violations.len(),
            banned: session.banned,
        })
    }

    /// Remove both indices; the session is handed back for cleanup.
    pub fn remove(&mut self, transport_id: &str) -> Option<Session> {
        let session = self.sessions.remove(transport_id)?;
        self.user_index.remove(&session.user_id);
        debug!("Session removed: {}", session.user_id);
        Some(session)
    }

    /// Transports whose sessions have been idle past the deadline.
    pub fn expired(&self, idle_timeout: Duration) -> Vec<String> {
        let now = Utc::now();
        self.sessions
            .values()
            .filter(|s| now - s.last_active_at > idle_timeout)
            .map(|s| s.transport_id.clone())
            .collect()
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
