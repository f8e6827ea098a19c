//! Integrated core service: owns the registry, the room manager, and
//! the matching queue behind one coarse lock, and runs the periodic
//! maintenance loops.
//!
//! Every state mutation happens under the single `state` mutex, so
//! subsystems always observe each other consistently: a user cannot
//! be enqueued and placed in a room at the same time.

use chrono::Duration as ChronoDuration;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::config::AppConfig;
use crate::constants::{
    MATCH_LOOP_INTERVAL_SECS, QUEUE_MAX_WAIT_SECS, QUEUE_SWEEP_INTERVAL_SECS,
    ROOM_INACTIVITY_TIMEOUT_SECS, ROOM_SWEEP_INTERVAL_SECS, SESSION_IDLE_TIMEOUT_SECS,
    STATS_BROADCAST_INTERVAL_SECS,
};
use crate::core::events::{MatchPair, PeerInfo, ServerEvent};
use crate::core::matching::MatchQueue;
use crate::core::room::{EndReason, RoomManager, RoomSummary};
use crate::core::session::SessionRegistry;
use crate::error::{PairlinkError, Result};
use crate::filter::ContentFilter;

/// Rolling counters surfaced on the admin endpoints.
#[derive(Debug, Default, Clone)]
pub struct CoreCounters {
    pub total_connections: u64,
    pub matches_made: u64,
    pub total_wait_ms: u64,
}

impl CoreCounters {
    pub fn average_wait_ms(&self) -> f64 {
        if self.matches_made == 0 {
            return 0.0;
        }
        // Two wait samples land per match.
        self.total_wait_ms as f64 / (self.matches_made * 2) as f64
    }
}

/// All mutable coordination state, guarded by one lock.
pub struct CoreState {
    pub registry: SessionRegistry,
    pub rooms: RoomManager,
    pub matching: MatchQueue,
    pub counters: CoreCounters,
}

impl CoreState {
    fn new() -> Self {
        Self {
            registry: SessionRegistry::new(),
            rooms: RoomManager::new(),
            matching: MatchQueue::new(),
            counters: CoreCounters::default(),
        }
    }

    pub fn online_count(&self) -> usize {
        self.registry.online_count()
    }

    /// Push an event to every connected session.
    pub fn broadcast(&self, event: &ServerEvent) {
        for session in self.registry.iter() {
            session.send(event.clone());
        }
    }

    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.registry.get_by_user(user_id) {
            Some(session) => session.send(event),
            None => false,
        }
    }

    /// Terminate a room and notify whichever participants are still
    /// connected. The participant who triggered the termination gets
    /// the raw reason code, the other side gets the peer-facing one.
    /// Room bindings are cleared before any notification goes out.
    pub fn finish_room(
        &mut self,
        room_id: &str,
        reason: EndReason,
        ended_by: Option<&str>,
    ) -> Result<RoomSummary> {
        let (summary, participants) = self.rooms.end(room_id, reason.clone(), ended_by)?;
        for user_id in &participants {
            self.registry.unbind_room(user_id);
        }
        for user_id in &participants {
            let code = if Some(user_id.as_str()) == ended_by {
                reason.code()
            } else {
                reason.peer_code()
            };
            self.send_to_user(
                user_id,
                ServerEvent::Ended {
                    reason: code,
                    duration_seconds: summary.duration_seconds,
                    message_count: summary.message_count,
                },
            );
        }
        Ok(summary)
    }

    /// Pair two users into a room and notify both. Cleans up
    /// gracefully if either side vanished between pairing and room
    /// creation: the survivor is put back in the queue.
    pub fn establish_room(&mut self, pair: &MatchPair) -> Result<String> {
        let (peer_a, peer_b) = (pair.user_a.as_str(), pair.user_b.as_str());
        if self.registry.get_by_user(peer_a).is_none() {
            self.requeue_survivor(peer_b);
            return Err(PairlinkError::SessionNotFound(peer_a.to_string()));
        }
        if self.registry.get_by_user(peer_b).is_none() {
            self.requeue_survivor(peer_a);
            return Err(PairlinkError::SessionNotFound(peer_b.to_string()));
        }

        let room_id = self
            .rooms
            .create(peer_a, peer_b, pair.chat_type)?
            .room_id
            .clone();
        self.registry.bind_room(peer_a, &room_id)?;
        self.registry.bind_room(peer_b, &room_id)?;

        self.counters.matches_made += 1;
        self.counters.total_wait_ms +=
            pair.wait_a_ms.max(0) as u64 + pair.wait_b_ms.max(0) as u64;

        let info_for_a = self.peer_info(peer_a, peer_b);
        let info_for_b = self.peer_info(peer_b, peer_a);
        if let Some(peer) = info_for_a {
            self.send_to_user(
                peer_a,
                ServerEvent::MatchFound {
                    room_id: room_id.clone(),
                    chat_type: pair.chat_type,
                    peer,
                },
            );
        }
        if let Some(peer) = info_for_b {
            self.send_to_user(
                peer_b,
                ServerEvent::MatchFound {
                    room_id: room_id.clone(),
                    chat_type: pair.chat_type,
                    peer,
                },
            );
        }
        info!("Matched {} with {} in room {}", peer_a, peer_b, room_id);
        Ok(room_id)
    }

    fn requeue_survivor(&mut self, user_id: &str) {
        let session = match self.registry.get_by_user(user_id) {
            Some(session) if !session.banned => session,
            _ => return,
        };
        let preferences = session.preferences.clone();
        if self.matching.enqueue(session, preferences).is_ok() {
            warn!("Requeued {} after the matched peer vanished", user_id);
        }
    }

    /// What `viewer` gets to see about `subject` on match.
    fn peer_info(&self, viewer: &str, subject: &str) -> Option<PeerInfo> {
        let viewer = self.registry.get_by_user(viewer)?;
        let subject = self.registry.get_by_user(subject)?;
        let viewer_keywords: Vec<String> = viewer
            .profile
            .keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let shared = subject
            .profile
            .keywords
            .iter()
            .filter(|k| viewer_keywords.contains(&k.to_lowercase()))
            .count();
        Some(PeerInfo {
            gender: subject.profile.gender,
            age: subject.profile.age,
            location: subject.profile.location.clone(),
            shared_interests: shared,
        })
    }
}

/// The core service handle shared by the transport handlers, the
/// dispatcher, and the maintenance tasks.
pub struct CoreServer {
    pub state: Mutex<CoreState>,
    pub config: Arc<AppConfig>,
    pub filter: ContentFilter,
    started_at: Instant,
    match_tx: UnboundedSender<MatchPair>,
}

pub type SharedCore = Arc<CoreServer>;

impl CoreServer {
    /// Build the core. The returned receiver carries pairs produced by
    /// the match loop; hand it to the dispatcher's consumer task.
    pub fn new(config: Arc<AppConfig>) -> (SharedCore, UnboundedReceiver<MatchPair>) {
        let (match_tx, match_rx) = mpsc::unbounded_channel();
        let filter = ContentFilter::from_config(&config);
        let core = Arc::new(Self {
            state: Mutex::new(CoreState::new()),
            config,
            filter,
            started_at: Instant::now(),
            match_tx,
        });
        (core, match_rx)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// One pass of the match loop: emit every pair found this tick.
    pub async fn run_match_tick(&self) {
        let mut state = self.state.lock().await;
        let CoreState {
            registry, matching, ..
        } = &mut *state;
        for pair in matching.take_pairs(registry) {
            if self.match_tx.send(pair).is_err() {
                error!("Match consumer is gone; dropping pair");
            }
        }
    }

    /// Terminate rooms past the inactivity or absolute deadline.
    pub async fn run_room_sweep(&self) {
        let mut state = self.state.lock().await;
        let inactivity = ChronoDuration::seconds(ROOM_INACTIVITY_TIMEOUT_SECS);
        let max_age = ChronoDuration::milliseconds(
            self.config.max_chat_duration.as_millis() as i64
        );
        let due = state.rooms.due_for_sweep(inactivity, max_age);
        for (room_id, reason) in due {
            info!("Sweeping room {} ({})", room_id, reason.code());
            if let Err(e) = state.finish_room(&room_id, reason, None) {
                error!("Failed to sweep room {}: {}", room_id, e);
            }
        }
    }

    /// Drop stale queue entries and tear down idle sessions.
    pub async fn run_queue_sweep(&self) {
        let mut state = self.state.lock().await;

        for user_id in state.matching.sweep_stale(ChronoDuration::seconds(QUEUE_MAX_WAIT_SECS)) {
            state.send_to_user(
                &user_id,
                ServerEvent::Error {
                    code: "match_timeout".to_string(),
                    message: "No compatible partner found in time".to_string(),
                },
            );
        }

        let expired = state
            .registry
            .expired(ChronoDuration::seconds(SESSION_IDLE_TIMEOUT_SECS));
        for transport_id in expired {
            info!("Session on transport {} expired", transport_id);
            self.teardown_session(&mut state, &transport_id, true);
        }
    }

    /// Broadcast the periodic stats frame.
    pub async fn run_stats_broadcast(&self) {
        let state = self.state.lock().await;
        let event = ServerEvent::Stats {
            online_users: state.online_count(),
            active_rooms: state.rooms.active_count(),
        };
        state.broadcast(&event);
    }

    /// Shared teardown for disconnects and expiries: ends the room the
    /// user was in, cancels any queue entry, removes the session, and
    /// broadcasts the new online count.
    pub fn teardown_session(
        &self,
        state: &mut CoreState,
        transport_id: &str,
        expired: bool,
    ) -> bool {
        let (user_id, room_id) = match state.registry.get_by_transport(transport_id) {
            Some(session) => (session.user_id.clone(), session.current_room_id.clone()),
            None => return false,
        };

        if expired {
            state.send_to_user(&user_id, ServerEvent::SessionExpired);
        }
        if let Some(room_id) = room_id {
            if let Err(e) =
                state.finish_room(&room_id, EndReason::StrangerDisconnected, Some(&user_id))
            {
                error!("Failed to end room {} on teardown: {}", room_id, e);
            }
        }
        state.matching.cancel(&user_id);
        state.registry.remove(transport_id);
        let count = state.online_count();
        state.broadcast(&ServerEvent::OnlineCount { count });
        true
    }

    /// Spawn the background tickers: match loop, stats broadcast, room
    /// sweep, and queue/session sweep.
    pub fn start_maintenance(self: &Arc<Self>) {
        let core = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(MATCH_LOOP_INTERVAL_SECS));
            loop {
                tick.tick().await;
                core.run_match_tick().await;
            }
        });

        let core = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(STATS_BROADCAST_INTERVAL_SECS));
            loop {
                tick.tick().await;
                core.run_stats_broadcast().await;
            }
        });

        let core = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(ROOM_SWEEP_INTERVAL_SECS));
            loop {
                tick.tick().await;
                core.run_room_sweep().await;
            }
        });

        let core = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(QUEUE_SWEEP_INTERVAL_SECS));
            loop {
                tick.tick().await;
                core.run_queue_sweep().await;
            }
        });
    }
}
