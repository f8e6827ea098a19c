//! Chat room lifecycle: message ordering, per-room analytics, and
//! termination semantics for active pairings.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::constants::{
    ACTIVE_GAP_SECS, CLOSED_ROOM_HISTORY, MAX_ROOM_MESSAGES, QUALITY_ISSUE_CAP,
    RESPONSE_SAMPLE_WINDOW,
};
use crate::error::{PairlinkError, Result};
use crate::profile::ChatType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sequence: u64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

/// Why a room was terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    UserAction,
    StrangerDisconnected,
    InactiveTimeout,
    Timeout,
    MessageLimitReached,
    Reported(String),
    InternalError,
}

impl EndReason {
    pub fn code(&self) -> String {
        match self {
            Self::UserAction => "user_action".to_string(),
            Self::StrangerDisconnected => "stranger_disconnected".to_string(),
            Self::InactiveTimeout => "inactive_timeout".to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::MessageLimitReached => "message_limit_reached".to_string(),
            Self::Reported(kind) => format!("reported_{}", kind),
            Self::InternalError => "internal_error".to_string(),
        }
    }

    /// Reason string shown to the participant who did not trigger the
    /// termination.
    pub fn peer_code(&self) -> String {
        match self {
            Self::UserAction => "stranger_left".to_string(),
            other => other.code(),
        }
    }
}

/// Activity signals recorded against a room outside of chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Signaling,
    WebrtcConnected,
    WebrtcDisconnected,
    QualityIssue,
}

/// Conversation quality accumulators for one room.
#[derive(Debug, Clone, Default)]
pub struct RoomAnalytics {
    /// Inter-message gaps in seconds, most recent 50
    pub response_samples: VecDeque<f64>,
    pub silent_periods: u32,
    pub active_secs: f64,
    pub webrtc_connected_at: Option<DateTime<Utc>>,
    pub webrtc_total_secs: f64,
    pub quality_issues: Vec<String>,
    last_message_at: Option<DateTime<Utc>>,
}

impl RoomAnalytics {
    fn record_message(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_message_at {
            let gap = (now - last).num_milliseconds() as f64 / 1000.0;
            self.response_samples.push_back(gap);
            if self.response_samples.len() > RESPONSE_SAMPLE_WINDOW {
                self.response_samples.pop_front();
            }
            if gap < ACTIVE_GAP_SECS as f64 {
                self.active_secs += gap;
            } else {
                self.silent_periods += 1;
            }
        }
        self.last_message_at = Some(now);
    }

    fn record_quality_issue(&mut self, detail: &str) {
        if self.quality_issues.len() < QUALITY_ISSUE_CAP {
            self.quality_issues.push(detail.to_string());
        }
    }

    fn webrtc_connected(&mut self, now: DateTime<Utc>) {
        if self.webrtc_connected_at.is_none() {
            self.webrtc_connected_at = Some(now);
        }
    }

    fn webrtc_disconnected(&mut self, now: DateTime<Utc>) {
        if let Some(connected_at) = self.webrtc_connected_at.take() {
            self.webrtc_total_secs += (now - connected_at).num_milliseconds() as f64 / 1000.0;
        }
    }

    fn close(&mut self, now: DateTime<Utc>) {
        self.webrtc_disconnected(now);
    }
}

/// Final report for a terminated room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: String,
    pub duration_seconds: u64,
    pub message_count: usize,
    pub end_reason: String,
    pub ended_by: Option<String>,
    pub engagement_score: f64,
    pub webrtc_seconds: f64,
}

/// A paired one-to-one conversation between two users.
#[derive(Debug)]
pub struct ChatRoom {
    pub room_id: String,
    pub participants: [String; 2],
    pub chat_type: ChatType,
    pub state: RoomState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub messages: Vec<ChatMessage>,
    pub analytics: RoomAnalytics,
    pub end_reason: Option<EndReason>,
    pub ended_by: Option<String>,
}

impl ChatRoom {
    pub fn new(user_a: &str, user_b: &str, chat_type: ChatType) -> Self {
        let now = Utc::now();
        Self {
            room_id: Uuid::new_v4().to_string(),
            participants: [user_a.to_string(), user_b.to_string()],
            chat_type,
            state: RoomState::Active,
            created_at: now,
            last_activity_at: now,
            ended_at: None,
            messages: Vec::new(),
            analytics: RoomAnalytics::default(),
            end_reason: None,
            ended_by: None,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        if self.participants[0] == user_id {
            Some(self.participants[1].as_str())
        } else if self.participants[1] == user_id {
            Some(self.participants[0].as_str())
        } else {
            None
        }
    }

    fn append_message(&mut self, sender_id: &str, text: &str) -> Result<&ChatMessage> {
        if self.state != RoomState::Active {
            return Err(PairlinkError::RoomClosed(self.room_id.clone()));
        }
        if !self.is_participant(sender_id) {
            return Err(PairlinkError::NotParticipant(self.room_id.clone()));
        }
        if self.messages.len() >= MAX_ROOM_MESSAGES {
            return Err(PairlinkError::MessageLimitReached(self.room_id.clone()));
        }
        let now = Utc::now();
        let message = ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            room_id: self.room_id.clone(),
            sender_id: sender_id.to_string(),
            sequence: self.messages.len() as u64 + 1,
            text: text.to_string(),
            timestamp: now,
            kind: MessageKind::User,
        };
        self.analytics.record_message(now);
        self.last_activity_at = now;
        self.messages.push(message);
        Ok(self.messages.last().unwrap())
    }

    /// Engagement score in [0, 100]: message rate plus active-time
    /// ratio, discounted by silent periods.
    pub fn engagement_score(&self, duration_secs: f64) -> f64 {
        if duration_secs <= 0.0 {
            return 0.0;
        }
        let per_minute = self.messages.len() as f64 / (duration_secs / 60.0);
        let rate_part = (per_minute * 10.0).min(50.0);
        let active_part = 30.0 * (self.analytics.active_secs / duration_secs).min(1.0);
        let silence_penalty = (5.0 * self.analytics.silent_periods as f64).min(20.0);
        (rate_part + active_part - silence_penalty).clamp(0.0, 100.0)
    }

    fn summarize(&self, ended_at: DateTime<Utc>, reason: &EndReason) -> RoomSummary {
        let duration_secs =
            ((ended_at - self.created_at).num_milliseconds() as f64 / 1000.0).max(0.0);
        RoomSummary {
            room_id: self.room_id.clone(),
            duration_seconds: duration_secs as u64,
            message_count: self.messages.len(),
            end_reason: reason.code(),
            ended_by: self.ended_by.clone(),
            engagement_score: self.engagement_score(duration_secs),
            webrtc_seconds: self.analytics.webrtc_total_secs,
        }
    }
}

/// Owns all active rooms plus a bounded ring of summaries for rooms
/// already closed, so `end` stays idempotent after cleanup.
pub struct RoomManager {
    rooms: HashMap<String, ChatRoom>,
    user_rooms: HashMap<String, String>,
    closed: HashMap<String, RoomSummary>,
    closed_order: VecDeque<String>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            user_rooms: HashMap::new(),
            closed: HashMap::new(),
            closed_order: VecDeque::new(),
        }
    }

    /// Pair two users into a fresh room. Neither may already be in one.
    pub fn create(&mut self, user_a: &str, user_b: &str, chat_type: ChatType) -> Result<&ChatRoom> {
        if self.user_rooms.contains_key(user_a) {
            return Err(PairlinkError::Precondition(format!(
                "user {} is already in a room",
                user_a
            )));
        }
        if self.user_rooms.contains_key(user_b) {
            return Err(PairlinkError::Precondition(format!(
                "user {} is already in a room",
                user_b
            )));
        }
        let room = ChatRoom::new(user_a, user_b, chat_type);
        let room_id = room.room_id.clone();
        self.user_rooms.insert(user_a.to_string(), room_id.clone());
        self.user_rooms.insert(user_b.to_string(), room_id.clone());
        info!("Room {} created for {} and {}", room_id, user_a, user_b);
        Ok(self.rooms.entry(room_id).or_insert(room))
    }

    pub fn get(&self, room_id: &str) -> Option<&ChatRoom> {
        self.rooms.get(room_id)
    }

    pub fn get_by_user(&self, user_id: &str) -> Option<&ChatRoom> {
        self.user_rooms
            .get(user_id)
            .and_then(|room_id| self.rooms.get(room_id))
    }

    pub fn room_id_of(&self, user_id: &str) -> Option<&str> {
        self.user_rooms.get(user_id).map(|s| s.as_str())
    }

    /// Append a user message; assigns the next sequence number.
    pub fn append_message(
        &mut self,
        room_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<ChatMessage> {
        let room = match self.rooms.get_mut(room_id) {
            Some(room) => room,
            None if self.closed.contains_key(room_id) => {
                return Err(PairlinkError::RoomClosed(room_id.to_string()))
            }
            None => return Err(PairlinkError::RoomNotFound(room_id.to_string())),
        };
        room.append_message(sender_id, text).map(|m| m.clone())
    }

    /// Non-message room activity: rearms the inactivity deadline and
    /// feeds the webrtc / quality accumulators.
    pub fn record_activity(
        &mut self,
        room_id: &str,
        kind: ActivityKind,
        detail: Option<&str>,
    ) -> Result<()> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| PairlinkError::RoomNotFound(room_id.to_string()))?;
        if room.state != RoomState::Active {
            return Err(PairlinkError::RoomClosed(room_id.to_string()));
        }
        let now = Utc::now();
        room.last_activity_at = now;
        match kind {
            ActivityKind::Signaling => {}
            ActivityKind::WebrtcConnected => room.analytics.webrtc_connected(now),
            ActivityKind::WebrtcDisconnected => room.analytics.webrtc_disconnected(now),
            ActivityKind::QualityIssue => {
                room.analytics.record_quality_issue(detail.unwrap_or("unspecified"))
            }
        }
        Ok(())
    }

    /// Terminate a room. Idempotent: a second call returns the summary
    /// recorded by the first and changes nothing.
    pub fn end(
        &mut self,
        room_id: &str,
        reason: EndReason,
        ended_by: Option<&str>,
    ) -> Result<(RoomSummary, Vec<String>)> {
        if let Some(summary) = self.closed.get(room_id) {
            return Ok((summary.clone(), Vec::new()));
        }
        let mut room = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| PairlinkError::RoomNotFound(room_id.to_string()))?;

        let now = Utc::now();
        room.state = RoomState::Ended;
        room.ended_at = Some(now);
        room.ended_by = ended_by.map(|s| s.to_string());
        room.analytics.close(now);
        room.end_reason = Some(reason.clone());

        let participants: Vec<String> = room.participants.to_vec();
        for user_id in &participants {
            self.user_rooms.remove(user_id);
        }

        let summary = room.summarize(now, &reason);
        debug!(
            "Room {} ended ({}): {} messages, engagement {:.0}",
            room_id,
            summary.end_reason,
            summary.message_count,
            summary.engagement_score
        );
        self.remember_closed(summary.clone());
        Ok((summary, participants))
    }

    fn remember_closed(&mut self, summary: RoomSummary) {
        if self.closed_order.len() == CLOSED_ROOM_HISTORY {
            if let Some(evicted) = self.closed_order.pop_front() {
                self.closed.remove(&evicted);
            }
        }
        self.closed_order.push_back(summary.room_id.clone());
        self.closed.insert(summary.room_id.clone(), summary);
    }

    /// Rooms due for termination: inactive past `inactivity`, or older
    /// than the absolute `max_age` cap.
    pub fn due_for_sweep(
        &self,
        inactivity: Duration,
        max_age: Duration,
    ) -> Vec<(String, EndReason)> {
        let now = Utc::now();
        self.rooms
            .values()
            .filter_map(|room| {
                if now - room.created_at > max_age {
                    Some((room.room_id.clone(), EndReason::Timeout))
                } else if now - room.last_activity_at > inactivity {
                    Some((room.room_id.clone(), EndReason::InactiveTimeout))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn closed_summary(&self, room_id: &str) -> Option<&RoomSummary> {
        self.closed.get(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_room() -> (RoomManager, String) {
        let mut manager = RoomManager::new();
        let room_id = manager
            .create("alice", "bob", ChatType::Text)
            .unwrap()
            .room_id
            .clone();
        (manager, room_id)
    }

    #[test]
    fn test_create_rejects_user_already_in_room() {
        let (mut manager, _) = manager_with_room();
        let err = manager.create("alice", "carol", ChatType::Text).unwrap_err();
        assert!(matches!(err, PairlinkError::Precondition(_)));
    }

    #[test]
    fn test_sequences_are_gapless_from_one() {
        let (mut manager, room_id) = manager_with_room();
        for i in 1..=25u64 {
            let message = manager.append_message(&room_id, "alice", "hello").unwrap();
            assert_eq!(message.sequence, i);
        }
        let room = manager.get(&room_id).unwrap();
        for (i, message) in room.messages.iter().enumerate() {
            assert_eq!(message.sequence, i as u64 + 1);
        }
    }

    #[test]
    fn test_append_rejects_non_participant() {
        let (mut manager, room_id) = manager_with_room();
        let err = manager.append_message(&room_id, "mallory", "hi").unwrap_err();
        assert!(matches!(err, PairlinkError::NotParticipant(_)));
    }

    #[test]
    fn test_message_cap() {
        let (mut manager, room_id) = manager_with_room();
        for _ in 0..MAX_ROOM_MESSAGES {
            manager.append_message(&room_id, "alice", "x").unwrap();
        }
        let err = manager.append_message(&room_id, "alice", "one too many").unwrap_err();
        assert!(matches!(err, PairlinkError::MessageLimitReached(_)));
    }

    #[test]
    fn test_end_clears_user_bindings_and_reports_participants() {
        let (mut manager, room_id) = manager_with_room();
        let (summary, participants) = manager
            .end(&room_id, EndReason::UserAction, Some("alice"))
            .unwrap();
        assert_eq!(summary.end_reason, "user_action");
        assert_eq!(summary.ended_by.as_deref(), Some("alice"));
        assert_eq!(participants.len(), 2);
        assert!(manager.get_by_user("alice").is_none());
        assert!(manager.get_by_user("bob").is_none());
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_end_is_idempotent() {
        let (mut manager, room_id) = manager_with_room();
        manager.append_message(&room_id, "alice", "hi").unwrap();
        let (first, _) = manager
            .end(&room_id, EndReason::UserAction, Some("alice"))
            .unwrap();
        // A different reason on the second call must not rewrite history.
        let (second, participants) = manager
            .end(&room_id, EndReason::Timeout, None)
            .unwrap();
        assert_eq!(first.end_reason, second.end_reason);
        assert_eq!(first.message_count, second.message_count);
        assert_eq!(first.duration_seconds, second.duration_seconds);
        assert!(participants.is_empty());
    }

    #[test]
    fn test_ended_room_rejects_messages() {
        let (mut manager, room_id) = manager_with_room();
        manager.end(&room_id, EndReason::Timeout, None).unwrap();
        let err = manager.append_message(&room_id, "alice", "hi").unwrap_err();
        assert!(matches!(err, PairlinkError::RoomClosed(_)));
    }

    #[test]
    fn test_due_for_sweep_inactivity_and_age() {
        let (mut manager, room_id) = manager_with_room();
        assert!(manager
            .due_for_sweep(Duration::minutes(30), Duration::hours(1))
            .is_empty());

        let room = manager.rooms.get_mut(&room_id).unwrap();
        room.last_activity_at = Utc::now() - Duration::minutes(31);
        let due = manager.due_for_sweep(Duration::minutes(30), Duration::hours(1));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, EndReason::InactiveTimeout);

        let room = manager.rooms.get_mut(&room_id).unwrap();
        room.created_at = Utc::now() - Duration::hours(2);
        let due = manager.due_for_sweep(Duration::minutes(30), Duration::hours(1));
        assert_eq!(due[0].1, EndReason::Timeout);
    }

    #[test]
    fn test_quality_issue_list_is_bounded() {
        let (mut manager, room_id) = manager_with_room();
        for i in 0..50 {
            manager
                .record_activity(&room_id, ActivityKind::QualityIssue, Some(&format!("i{}", i)))
                .unwrap();
        }
        let room = manager.get(&room_id).unwrap();
        assert_eq!(room.analytics.quality_issues.len(), QUALITY_ISSUE_CAP);
    }

    #[test]
    fn test_webrtc_duration_accumulates() {
        let (mut manager, room_id) = manager_with_room();
        manager
            .record_activity(&room_id, ActivityKind::WebrtcConnected, None)
            .unwrap();
        {
            let room = manager.rooms.get_mut(&room_id).unwrap();
            room.analytics.webrtc_connected_at =
                Some(Utc::now() - Duration::seconds(90));
        }
        manager
            .record_activity(&room_id, ActivityKind::WebrtcDisconnected, None)
            .unwrap();
        let room = manager.get(&room_id).unwrap();
        assert!(room.analytics.webrtc_total_secs >= 89.0);
        assert!(room.analytics.webrtc_connected_at.is_none());
    }

    #[test]
    fn test_webrtc_still_connected_counts_at_close() {
        let (mut manager, room_id) = manager_with_room();
        manager
            .record_activity(&room_id, ActivityKind::WebrtcConnected, None)
            .unwrap();
        {
            let room = manager.rooms.get_mut(&room_id).unwrap();
            room.analytics.webrtc_connected_at =
                Some(Utc::now() - Duration::seconds(30));
        }
        let (summary, _) = manager.end(&room_id, EndReason::Timeout, None).unwrap();
        assert!(summary.webrtc_seconds >= 29.0);
    }

    #[test]
    fn test_analytics_gap_accounting() {
        let mut analytics = RoomAnalytics::default();
        let t0 = Utc::now();
        analytics.record_message(t0);
        analytics.record_message(t0 + Duration::seconds(5));
        analytics.record_message(t0 + Duration::seconds(10));
        analytics.record_message(t0 + Duration::seconds(100));
        assert_eq!(analytics.response_samples.len(), 3);
        assert_eq!(analytics.silent_periods, 1);
        assert!((analytics.active_secs - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_response_sample_window_is_bounded() {
        let mut analytics = RoomAnalytics::default();
        let t0 = Utc::now();
        for i in 0..200 {
            analytics.record_message(t0 + Duration::seconds(i));
        }
        assert_eq!(analytics.response_samples.len(), RESPONSE_SAMPLE_WINDOW);
    }

    #[test]
    fn test_engagement_score_bounds() {
        let (mut manager, room_id) = manager_with_room();
        for _ in 0..100 {
            manager.append_message(&room_id, "alice", "rapid fire").unwrap();
        }
        let room = manager.get(&room_id).unwrap();
        let score = room.engagement_score(60.0);
        assert!((0.0..=100.0).contains(&score));
        // 100 messages in a minute saturates the rate component.
        assert!(score >= 50.0);

        let empty = ChatRoom::new("a", "b", ChatType::Text);
        assert_eq!(empty.engagement_score(0.0), 0.0);
        let score = empty.engagement_score(600.0);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_closed_history_is_a_ring() {
        let mut manager = RoomManager::new();
        let mut first_room_id = None;
        for i in 0..(CLOSED_ROOM_HISTORY + 5) {
            let a = format!("a{}", i);
            let b = format!("b{}", i);
            let room_id = manager.create(&a, &b, ChatType::Text).unwrap().room_id.clone();
            if first_room_id.is_none() {
                first_room_id = Some(room_id.clone());
            }
            manager.end(&room_id, EndReason::Timeout, None).unwrap();
        }
        assert!(manager.closed_summary(&first_room_id.unwrap()).is_none());
        assert_eq!(manager.closed.len(), CLOSED_ROOM_HISTORY);
    }
}
