//! Connection-event dispatcher: translates transport events into core
//! operations and fans responses back to one or both peers of a room.

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::events::{ClientEvent, MatchPair, ServerEvent};
use crate::core::room::{ActivityKind, EndReason};
use crate::core::server::{CoreState, SharedCore};
use crate::core::session::EventSender;
use crate::error::{PairlinkError, Result};
use crate::profile::{normalize_preferences, RawPreferences, RawProfile};

/// Report reasons severe enough to terminate the room outright.
const SEVERE_REPORT_KINDS: &[&str] = &["harassment", "inappropriate", "spam"];

/// Handles incoming client events and routes them appropriately.
pub struct EventDispatcher {
    core: SharedCore,
}

impl EventDispatcher {
    pub fn new(core: SharedCore) -> Self {
        Self { core }
    }

    /// Entry point for one inbound frame. Errors surface to the
    /// offending client only.
    pub async fn handle_event(&self, transport_id: &str, tx: &EventSender, event: ClientEvent) {
        let mut state = self.core.state.lock().await;
        let outcome = match event {
            ClientEvent::Register { profile } => {
                self.on_register(&mut state, transport_id, tx, &profile)
            }
            ClientEvent::UpdateProfile { profile } => {
                self.on_update_profile(&mut state, transport_id, &profile)
            }
            ClientEvent::FindMatch { preferences } => {
                self.on_find_match(&mut state, transport_id, &preferences)
            }
            ClientEvent::CancelSearch => self.on_cancel_search(&mut state, transport_id),
            ClientEvent::ChatMessage { text } => {
                self.on_chat_message(&mut state, transport_id, &text)
            }
            ClientEvent::WebrtcOffer { payload } => {
                self.forward_signal(&mut state, transport_id, SignalKind::Offer, payload)
            }
            ClientEvent::WebrtcAnswer { payload } => {
                self.forward_signal(&mut state, transport_id, SignalKind::Answer, payload)
            }
            ClientEvent::IceCandidate { payload } => {
                self.forward_signal(&mut state, transport_id, SignalKind::Ice, payload)
            }
            ClientEvent::WebrtcConnected => {
                self.on_activity(&mut state, transport_id, ActivityKind::WebrtcConnected, None)
            }
            ClientEvent::WebrtcDisconnected => self.on_activity(
                &mut state,
                transport_id,
                ActivityKind::WebrtcDisconnected,
                None,
            ),
            ClientEvent::QualityIssue { detail } => self.on_activity(
                &mut state,
                transport_id,
                ActivityKind::QualityIssue,
                Some(detail),
            ),
            ClientEvent::TypingStart => self.on_typing(&mut state, transport_id, true),
            ClientEvent::TypingStop => self.on_typing(&mut state, transport_id, false),
            ClientEvent::Report { reason } => self.on_report(&mut state, transport_id, &reason),
            ClientEvent::EndChat => self.on_end_chat(&mut state, transport_id),
        };

        if let Err(err) = outcome {
            debug!("Event from {} rejected: {}", transport_id, err);
            let _ = tx.send(ServerEvent::Error {
                code: err.wire_code().to_string(),
                message: err.wire_message(),
            });
        }
    }

    /// Transport closed: tear the session down and notify the peer.
    pub async fn handle_disconnect(&self, transport_id: &str) {
        let mut state = self.core.state.lock().await;
        if self.core.teardown_session(&mut state, transport_id, false) {
            info!("Client on transport {} disconnected", transport_id);
        }
    }

    /// Consume pairs produced by the background match loop.
    pub async fn run_match_consumer(&self, mut rx: UnboundedReceiver<MatchPair>) {
        while let Some(pair) = rx.recv().await {
            let mut state = self.core.state.lock().await;
            if let Err(e) = state.establish_room(&pair) {
                warn!("Dropped match pair: {}", e);
            }
        }
    }

    fn on_register(
        &self,
        state: &mut CoreState,
        transport_id: &str,
        tx: &EventSender,
        raw: &RawProfile,
    ) -> Result<()> {
        let user_id = state
            .registry
            .create(transport_id, raw, tx.clone())?
            .user_id
            .clone();
        state.counters.total_connections += 1;
        let count = state.online_count();
        state.send_to_user(
            &user_id,
            ServerEvent::Registered {
                user_id: user_id.clone(),
                online_count: count,
            },
        );
        state.broadcast(&ServerEvent::OnlineCount { count });
        info!("Registered user {} ({} online)", user_id, count);
        Ok(())
    }

    fn on_update_profile(
        &self,
        state: &mut CoreState,
        transport_id: &str,
        raw: &RawProfile,
    ) -> Result<()> {
        state.registry.update_profile(transport_id, raw)?;
        state.registry.touch(transport_id);
        let user_id = self.require_session(state, transport_id)?;
        state.send_to_user(&user_id, ServerEvent::ProfileUpdated);
        Ok(())
    }

    fn on_find_match(
        &self,
        state: &mut CoreState,
        transport_id: &str,
        raw: &RawPreferences,
    ) -> Result<()> {
        let preferences = normalize_preferences(raw);
        let user_id = {
            let session = state
                .registry
                .get_by_transport_mut(transport_id)
                .ok_or_else(|| PairlinkError::SessionNotFound(transport_id.to_string()))?;
            if session.banned {
                return Err(PairlinkError::Banned(session.user_id.clone()));
            }
            if session.in_room() {
                return Err(PairlinkError::Precondition(
                    "already in a chat".to_string(),
                ));
            }
            session.preferences = preferences.clone();
            session.user_id.clone()
        };
        state.registry.touch(transport_id);

        {
            let CoreState {
                registry, matching, ..
            } = &mut *state;
            let session = registry
                .get_by_user(&user_id)
                .ok_or_else(|| PairlinkError::SessionNotFound(user_id.clone()))?;
            matching.enqueue(session, preferences.clone())?;
        }

        // Synchronous attempt first; only queue if nobody fits now.
        let immediate = state.matching.try_match_now(&user_id, &state.registry);
        if let Some(peer_id) = immediate {
            let wait_a_ms = state
                .matching
                .get(&user_id)
                .map(|e| e.wait_time().num_milliseconds())
                .unwrap_or(0);
            let wait_b_ms = state
                .matching
                .get(&peer_id)
                .map(|e| e.wait_time().num_milliseconds())
                .unwrap_or(0);
            let chat_type = preferences.chat_type;
            state.matching.cancel(&user_id);
            state.matching.cancel(&peer_id);
            state.establish_room(&MatchPair {
                user_a: user_id,
                user_b: peer_id,
                chat_type,
                wait_a_ms,
                wait_b_ms,
            })?;
        } else {
            let position = state.matching.position(&user_id);
            let online_count = state.online_count();
            state.send_to_user(
                &user_id,
                ServerEvent::Queued {
                    position,
                    online_count,
                },
            );
        }
        Ok(())
    }

    fn on_cancel_search(&self, state: &mut CoreState, transport_id: &str) -> Result<()> {
        let user_id = self.require_session(state, transport_id)?;
        state.registry.touch(transport_id);
        state.matching.cancel(&user_id);
        state.send_to_user(&user_id, ServerEvent::SearchCancelled);
        Ok(())
    }

    fn on_chat_message(&self, state: &mut CoreState, transport_id: &str, text: &str) -> Result<()> {
        let (user_id, room_id) = self.require_room(state, transport_id)?;
        state.registry.touch(transport_id);

        if let Err(err) = validate_message(text, self.core.config.max_message_length) {
            // A validation rejection counts as a spam violation; five
            // of them ban the session.
            if let Ok(outcome) = state.registry.flag(&user_id, "spam") {
                if outcome.banned {
                    info!("User {} banned after repeated invalid messages", user_id);
                }
            }
            return Err(err);
        }

        let filtered = self.core.filter.apply(text);
        let message = match state.rooms.append_message(&room_id, &user_id, &filtered) {
            Ok(message) => message,
            Err(PairlinkError::MessageLimitReached(room)) => {
                state.finish_room(&room_id, EndReason::MessageLimitReached, None)?;
                return Err(PairlinkError::MessageLimitReached(room));
            }
            Err(err) => return Err(err),
        };

        let peer_id = self.peer_of(state, &room_id, &user_id)?;
        state.send_to_user(
            &peer_id,
            ServerEvent::ChatMessage {
                sender_type: "stranger".to_string(),
                text: message.text.clone(),
                sequence: message.sequence,
                timestamp: message.timestamp,
            },
        );
        state.send_to_user(
            &user_id,
            ServerEvent::MessageSent {
                sequence: message.sequence,
            },
        );
        Ok(())
    }

    fn forward_signal(
        &self,
        state: &mut CoreState,
        transport_id: &str,
        kind: SignalKind,
        payload: Value,
    ) -> Result<()> {
        let (user_id, room_id) = self.require_room(state, transport_id)?;
        state.registry.touch(transport_id);
        state
            .rooms
            .record_activity(&room_id, ActivityKind::Signaling, None)?;
        let peer_id = self.peer_of(state, &room_id, &user_id)?;
        let event = match kind {
            SignalKind::Offer => ServerEvent::WebrtcOffer {
                sender_id: user_id,
                payload,
            },
            SignalKind::Answer => ServerEvent::WebrtcAnswer {
                sender_id: user_id,
                payload,
            },
            SignalKind::Ice => ServerEvent::IceCandidate {
                sender_id: user_id,
                payload,
            },
        };
        state.send_to_user(&peer_id, event);
        Ok(())
    }

    fn on_activity(
        &self,
        state: &mut CoreState,
        transport_id: &str,
        kind: ActivityKind,
        detail: Option<String>,
    ) -> Result<()> {
        let (_user_id, room_id) = self.require_room(state, transport_id)?;
        state.registry.touch(transport_id);
        state.rooms.record_activity(&room_id, kind, detail.as_deref())
    }

    fn on_typing(&self, state: &mut CoreState, transport_id: &str, typing: bool) -> Result<()> {
        let (user_id, room_id) = self.require_room(state, transport_id)?;
        state.registry.touch(transport_id);
        let peer_id = self.peer_of(state, &room_id, &user_id)?;
        state.send_to_user(&peer_id, ServerEvent::PeerTyping { typing });
        Ok(())
    }

    fn on_report(&self, state: &mut CoreState, transport_id: &str, reason: &str) -> Result<()> {
        let (user_id, room_id) = self.require_room(state, transport_id)?;
        state.registry.touch(transport_id);
        let peer_id = self.peer_of(state, &room_id, &user_id)?;

        let kind = reason.trim().to_lowercase();
        if let Some(peer) = state.registry.get_by_user_mut(&peer_id) {
            peer.reported = true;
        }
        if let Err(e) = state.registry.flag(&peer_id, &kind) {
            warn!("Could not flag reported user {}: {}", peer_id, e);
        }
        info!("User {} reported {} for {}", user_id, peer_id, kind);

        if SEVERE_REPORT_KINDS.contains(&kind.as_str()) {
            state.finish_room(&room_id, EndReason::Reported(kind), Some(&user_id))?;
        }
        state.send_to_user(&user_id, ServerEvent::ReportSubmitted);
        Ok(())
    }

    fn on_end_chat(&self, state: &mut CoreState, transport_id: &str) -> Result<()> {
        let (user_id, room_id) = self.require_room(state, transport_id)?;
        state.registry.touch(transport_id);
        state.finish_room(&room_id, EndReason::UserAction, Some(&user_id))?;
        Ok(())
    }

    fn require_session(&self, state: &CoreState, transport_id: &str) -> Result<String> {
        state
            .registry
            .get_by_transport(transport_id)
            .map(|s| s.user_id.clone())
            .ok_or_else(|| PairlinkError::SessionNotFound(transport_id.to_string()))
    }

    /// Resolve the sender's session and its active room.
    fn require_room(&self, state: &CoreState, transport_id: &str) -> Result<(String, String)> {
        let session = state
            .registry
            .get_by_transport(transport_id)
            .ok_or_else(|| PairlinkError::SessionNotFound(transport_id.to_string()))?;
        let room_id = session
            .current_room_id
            .clone()
            .ok_or_else(|| PairlinkError::Precondition("not in a chat".to_string()))?;
        Ok((session.user_id.clone(), room_id))
    }

    /// The other participant of `room_id`. A dangling participant is
    /// an invariant breach: the room is closed as internal error.
    fn peer_of(&self, state: &mut CoreState, room_id: &str, user_id: &str) -> Result<String> {
        let peer_id = state
            .rooms
            .get(room_id)
            .ok_or_else(|| PairlinkError::RoomNotFound(room_id.to_string()))?
            .peer_of(user_id)
            .map(|s| s.to_string());
        match peer_id {
            Some(peer_id) if state.registry.get_by_user(&peer_id).is_some() => Ok(peer_id),
            Some(peer_id) => {
                log::error!(
                    "Participant {} of room {} missing from registry",
                    peer_id,
                    room_id
                );
                let _ = state.finish_room(room_id, EndReason::InternalError, None);
                Err(PairlinkError::Internal(format!(
                    "room {} lost participant {}",
                    room_id, peer_id
                )))
            }
            None => Err(PairlinkError::NotParticipant(room_id.to_string())),
        }
    }
}

enum SignalKind {
    Offer,
    Answer,
    Ice,
}

/// Cheap spam heuristics. Signals accumulate; a lone short message is
/// fine, a short message that is also one repeated symbol is not.
pub fn validate_message(text: &str, max_length: usize) -> Result<()> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PairlinkError::Validation("empty message".to_string()));
    }
    if trimmed.chars().count() > max_length {
        return Err(PairlinkError::Validation(format!(
            "message exceeds {} characters",
            max_length
        )));
    }

    let mut suspicion = 0;
    if trimmed.chars().count() <= 3 {
        suspicion += 1;
    }
    let repeat = longest_identical_run(trimmed);
    if repeat >= 10 {
        suspicion += 2;
    } else if repeat >= 5 {
        suspicion += 1;
    }
    if longest_class_run(trimmed, |c| c.is_uppercase()) >= 10 {
        suspicion += 1;
    }
    if longest_class_run(trimmed, |c| c.is_ascii_digit()) >= 10 {
        suspicion += 1;
    }
    if longest_class_run(trimmed, |c| !c.is_alphanumeric() && !c.is_whitespace()) >= 5 {
        suspicion += 1;
    }

    if suspicion >= 2 {
        return Err(PairlinkError::Validation(
            "message looks like spam".to_string(),
        ));
    }
    Ok(())
}

fn longest_identical_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;
    for c in text.chars() {
        current = if previous == Some(c) { current + 1 } else { 1 };
        previous = Some(c);
        longest = longest.max(current);
    }
    longest
}

fn longest_class_run(text: &str, class: impl Fn(char) -> bool) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if class(c) {
            current += 1;
        } else {
            current = 0;
        }
        longest = longest.max(current);
    }
    longest
}
