//! Matching engine: priority queue admission, weighted compatibility
//! scoring, and the candidate selection used by the background loop.
//!
//! The acceptance threshold relaxes with wait time so a populated
//! queue always drains eventually.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};

use crate::constants::{MATCH_SCAN_LIMIT, MAX_QUEUE_SIZE, PRIORITY_URGENCY_WEIGHT};
use crate::core::events::MatchPair;
use crate::core::session::{Session, SessionRegistry};
use crate::error::{PairlinkError, Result};
use crate::profile::Preferences;

// Attribute weights; they sum to 1.0.
const WEIGHT_GENDER: f64 = 0.30;
const WEIGHT_AGE: f64 = 0.20;
const WEIGHT_LOCATION: f64 = 0.15;
const WEIGHT_INTERESTS: f64 = 0.25;
const WEIGHT_TRUST: f64 = 0.10;

/// A user's pending request to be matched.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub user_id: String,
    pub preferences: Preferences,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub priority: f64,
}

impl QueueEntry {
    pub fn wait_time(&self) -> Duration {
        Utc::now() - self.queued_at
    }
}

/// The matching queue: at most one entry per user, bounded size.
pub struct MatchQueue {
    entries: HashMap<String, QueueEntry>,
    max_size: usize,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::with_capacity(MAX_QUEUE_SIZE)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
        }
    }

    /// Admit a user to the queue. Re-enqueueing is idempotent: the
    /// original entry (and its `queued_at`) is kept.
    pub fn enqueue(&mut self, session: &Session, preferences: Preferences) -> Result<&QueueEntry> {
        if self.entries.contains_key(&session.user_id) {
            return Ok(&self.entries[&session.user_id]);
        }
        if self.entries.len() >= self.max_size {
            return Err(PairlinkError::QueueFull);
        }
        let entry = QueueEntry {
            user_id: session.user_id.clone(),
            preferences,
            queued_at: Utc::now(),
            attempts: 0,
            last_attempt_at: None,
            priority: compute_priority(session),
        };
        debug!(
            "User {} enqueued with priority {:.2}",
            entry.user_id, entry.priority
        );
        Ok(self.entries.entry(session.user_id.clone()).or_insert(entry))
    }

    pub fn cancel(&mut self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<&QueueEntry> {
        self.entries.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    /// 1-based rank by `(priority desc, queued_at asc)`; -1 if absent.
    pub fn position(&self, user_id: &str) -> i64 {
        let target = match self.entries.get(user_id) {
            Some(entry) => entry,
            None => return -1,
        };
        let mut rank = 1;
        for entry in self.entries.values() {
            if entry.user_id == target.user_id {
                continue;
            }
            let ahead = entry.priority > target.priority
                || (entry.priority == target.priority && entry.queued_at < target.queued_at);
            if ahead {
                rank += 1;
            }
        }
        rank
    }

    /// Drop entries waiting longer than `max_wait`; returns who was
    /// dropped so the dispatcher can notify them.
    pub fn sweep_stale(&mut self, max_wait: Duration) -> Vec<String> {
        let now = Utc::now();
        let stale: Vec<String> = self
            .entries
            .values()
            .filter(|e| now - e.queued_at > max_wait)
            .map(|e| e.user_id.clone())
            .collect();
        for user_id in &stale {
            self.entries.remove(user_id);
            debug!("Queue entry for {} dropped as stale", user_id);
        }
        stale
    }

    /// Best current partner for `user_id`, if any candidate scores at
    /// or above the requester's (wait-relaxed) threshold. Candidates
    /// must want the same chat type and still be eligible in the
    /// registry.
    pub fn try_match_now(&self, user_id: &str, registry: &SessionRegistry) -> Option<String> {
        let entry = self.entries.get(user_id)?;
        let session = registry.get_by_user(user_id)?;
        let threshold = min_compatibility(entry.wait_time());

        let mut best: Option<(String, f64)> = None;
        for candidate in self.entries.values() {
            if candidate.user_id == entry.user_id {
                continue;
            }
            if candidate.preferences.chat_type != entry.preferences.chat_type {
                continue;
            }
            let peer = match registry.get_by_user(&candidate.user_id) {
                Some(peer) if !peer.banned && !peer.in_room() => peer,
                _ => continue,
            };
            let score = compatibility(session, peer);
            if score < threshold {
                continue;
            }
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((candidate.user_id.clone(), score)),
            }
        }
        best.map(|(user_id, score)| {
            debug!(
                "Match candidate for {}: {} (score {:.3}, threshold {:.3})",
                entry.user_id, user_id, score, threshold
            );
            user_id
        })
    }

    /// One pass of the background loop: the most urgent entries (by
    /// wait time boosted by priority) each get a matching attempt, and
    /// successful pairs are removed from the queue.
    pub fn take_pairs(&mut self, registry: &SessionRegistry) -> Vec<MatchPair> {
        let now = Utc::now();
        let mut order: Vec<(String, f64)> = self
            .entries
            .values()
            .map(|e| {
                let wait_ms = (now - e.queued_at).num_milliseconds() as f64;
                (e.user_id.clone(), wait_ms + PRIORITY_URGENCY_WEIGHT * e.priority)
            })
            .collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut consumed: HashSet<String> = HashSet::new();
        let mut pairs = Vec::new();

        for (user_id, _) in order.into_iter().take(MATCH_SCAN_LIMIT) {
            if consumed.contains(&user_id) {
                continue;
            }
            match self.try_match_now(&user_id, registry) {
                Some(peer_id) => {
                    let (Some(entry), Some(peer_entry)) =
                        (self.entries.remove(&user_id), self.entries.remove(&peer_id))
                    else {
                        continue;
                    };
                    consumed.insert(user_id);
                    consumed.insert(peer_id);
                    pairs.push(MatchPair {
                        user_a: entry.user_id,
                        user_b: peer_entry.user_id,
                        chat_type: entry.preferences.chat_type,
                        wait_a_ms: (now - entry.queued_at).num_milliseconds(),
                        wait_b_ms: (now - peer_entry.queued_at).num_milliseconds(),
                    });
                }
                None => {
                    if let Some(entry) = self.entries.get_mut(&user_id) {
                        entry.attempts += 1;
                        entry.last_attempt_at = Some(now);
                    }
                }
            }
        }
        pairs
    }

    #[cfg(test)]
    fn backdate(&mut self, user_id: &str, by: Duration) {
        if let Some(entry) = self.entries.get_mut(user_id) {
            entry.queued_at = entry.queued_at - by;
        }
    }
}

/// Queue ordering key: trust above the midpoint helps, violations
/// hurt, fresh sessions get a small boost.
pub fn compute_priority(session: &Session) -> f64 {
    let freshness = if session.session_age() < Duration::hours(1) {
        0.2
    } else {
        0.0
    };
    let priority = 1.0 + (session.trust_score - 0.5) * 0.5
        - 0.1 * session.violation_count() as f64
        + freshness;
    priority.clamp(0.1, 2.0)
}

/// Acceptance floor for the requester, relaxing 0.02 per waited
/// minute down to 0.1.
pub fn min_compatibility(wait: Duration) -> f64 {
    let minutes = wait.num_seconds() as f64 / 60.0;
    (0.3 - 0.02 * minutes).max(0.1)
}

/// Weighted similarity in [0, 1]; symmetric in its arguments.
pub fn compatibility(a: &Session, b: &Session) -> f64 {
    WEIGHT_GENDER * gender_score(a, b)
        + WEIGHT_AGE * age_score(a, b)
        + WEIGHT_LOCATION * location_score(a, b)
        + WEIGHT_INTERESTS * interest_score(a, b)
        + WEIGHT_TRUST * trust_score(a, b)
}

fn gender_score(a: &Session, b: &Session) -> f64 {
    use crate::profile::GenderPref;
    if a.preferences.gender == GenderPref::Any && b.preferences.gender == GenderPref::Any {
        return 1.0;
    }
    let mut score = 0.0;
    if a.preferences.gender.accepts(b.profile.gender) {
        score += 0.5;
    }
    if b.preferences.gender.accepts(a.profile.gender) {
        score += 0.5;
    }
    score
}

fn age_score(a: &Session, b: &Session) -> f64 {
    use crate::profile::AgeBand;
    if a.profile.age == AgeBand::NotSpecified || b.profile.age == AgeBand::NotSpecified {
        return 0.5;
    }
    if a.profile.age == b.profile.age {
        return 1.0;
    }
    let mut score = 0.0;
    if a.preferences.age.accepts(b.profile.age) {
        score += 0.5;
    }
    if b.preferences.age.accepts(a.profile.age) {
        score += 0.5;
    }
    score
}

fn location_score(a: &Session, b: &Session) -> f64 {
    let (loc_a, loc_b) = match (&a.profile.location, &b.profile.location) {
        (Some(a), Some(b)) => (a.to_lowercase(), b.to_lowercase()),
        _ => return 0.5,
    };
    if loc_a == loc_b {
        return 1.0;
    }
    let country_a = loc_a.split(',').next().unwrap_or("").trim();
    let country_b = loc_b.split(',').next().unwrap_or("").trim();
    if !country_a.is_empty() && country_a == country_b {
        return 0.8;
    }
    if loc_a.contains(&loc_b) || loc_b.contains(&loc_a) {
        return 0.6;
    }
    0.3
}

fn interest_score(a: &Session, b: &Session) -> f64 {
    let set_a: HashSet<String> = a.profile.keywords.iter().map(|k| k.to_lowercase()).collect();
    let set_b: HashSet<String> = b.profile.keywords.iter().map(|k| k.to_lowercase()).collect();
    match (set_a.is_empty(), set_b.is_empty()) {
        (true, true) => return 0.5,
        (true, false) | (false, true) => return 0.4,
        _ => {}
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    let jaccard = intersection as f64 / union as f64;
    let bonus = (0.1 * intersection as f64).min(0.3);
    (jaccard + bonus).min(1.0)
}

fn trust_score(a: &Session, b: &Session) -> f64 {
    let mean = (a.trust_score + b.trust_score) / 2.0;
    let delta = (a.trust_score - b.trust_score).abs();
    mean * (1.0 - 0.5 * delta)
}
