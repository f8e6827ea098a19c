//! Cross-subsystem invariants checked through the public flow.

mod common;

use common::{any_preferences, full_profile, profile, TestHarness};
use pairlink::core::events::ServerEvent;

#[tokio::test]
async fn test_active_room_participants_are_bound_in_registry() {
    let h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.register(&mut b, profile("female", "18-25")).await;
    h.find_match(&a, any_preferences()).await;
    h.find_match(&b, any_preferences()).await;

    let state = h.core.state.lock().await;
    assert_eq!(state.rooms.active_count(), 1);
    let room = state.rooms.get_by_user(&a.user_id).unwrap();
    for user_id in room.participants.iter() {
        let session = state
            .registry
            .get_by_user(user_id)
            .expect("participant must be registered");
        assert_eq!(session.current_room_id.as_deref(), Some(room.room_id.as_str()));
    }
}

#[tokio::test]
async fn test_no_user_is_queued_and_in_room() {
    let h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    let mut c = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.register(&mut b, profile("female", "18-25")).await;
    h.register(&mut c, profile("other", "26-35")).await;
    h.find_match(&a, any_preferences()).await;
    h.find_match(&b, any_preferences()).await;
    h.find_match(&c, any_preferences()).await;

    let state = h.core.state.lock().await;
    for session in state.registry.iter() {
        let queued = state.matching.contains(&session.user_id);
        let in_room = session.current_room_id.is_some();
        assert!(
            !(queued && in_room),
            "user {} is both queued and in a room",
            session.user_id
        );
    }
    // Two got paired, the third is still waiting.
    assert_eq!(state.rooms.active_count(), 1);
    assert_eq!(state.matching.len(), 1);
}

#[tokio::test]
async fn test_match_loop_pairs_via_channel() {
    let mut h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    h.register(&mut a, full_profile("male", "18-25", "Madrid, Spain", &["padel"]))
        .await;
    h.register(&mut b, full_profile("female", "18-25", "Madrid, Spain", &["padel"]))
        .await;

    // Seed the queue directly so the synchronous path is not taken.
    {
        let mut state = h.core.state.lock().await;
        let pairlink::core::server::CoreState {
            registry, matching, ..
        } = &mut *state;
        for user_id in [&a.user_id, &b.user_id] {
            let session = registry.get_by_user(user_id).unwrap();
            let preferences = session.preferences.clone();
            matching.enqueue(session, preferences).unwrap();
        }
    }

    h.core.run_match_tick().await;
    let pair = h.match_rx.try_recv().expect("match loop should emit a pair");
    {
        let mut state = h.core.state.lock().await;
        state.establish_room(&pair).unwrap();
    }

    assert!(matches!(a.next(), ServerEvent::MatchFound { .. }));
    assert!(matches!(b.next(), ServerEvent::MatchFound { .. }));

    let state = h.core.state.lock().await;
    assert!(state.matching.is_empty());
    assert_eq!(state.rooms.active_count(), 1);
    assert_eq!(state.counters.matches_made, 1);
}

#[tokio::test]
async fn test_vanished_peer_requeues_survivor() {
    let mut h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.register(&mut b, profile("female", "18-25")).await;

    {
        let mut state = h.core.state.lock().await;
        let pairlink::core::server::CoreState {
            registry, matching, ..
        } = &mut *state;
        for user_id in [&a.user_id, &b.user_id] {
            let session = registry.get_by_user(user_id).unwrap();
            let preferences = session.preferences.clone();
            matching.enqueue(session, preferences).unwrap();
        }
    }
    h.core.run_match_tick().await;
    let pair = h.match_rx.try_recv().expect("pair expected");

    // b drops between pairing and room creation.
    h.dispatcher.handle_disconnect(&b.transport_id).await;
    {
        let mut state = h.core.state.lock().await;
        assert!(state.establish_room(&pair).is_err());
        assert!(state.matching.contains(&a.user_id), "survivor must be requeued");
        assert_eq!(state.rooms.active_count(), 0);
    }
}

#[tokio::test]
async fn test_stats_broadcast_reaches_everyone() {
    let h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.register(&mut b, profile("female", "18-25")).await;
    a.drain();
    b.drain();

    h.core.run_stats_broadcast().await;
    for client in [&mut a, &mut b] {
        match client.next() {
            ServerEvent::Stats {
                online_users,
                active_rooms,
            } => {
                assert_eq!(online_users, 2);
                assert_eq!(active_rooms, 0);
            }
            other => panic!("expected stats, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_idle_session_is_expired_by_sweep() {
    let h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.register(&mut b, profile("female", "18-25")).await;
    h.find_match(&a, any_preferences()).await;
    h.find_match(&b, any_preferences()).await;
    a.drain();
    b.drain();

    {
        let mut state = h.core.state.lock().await;
        let session = state.registry.get_by_user_mut(&a.user_id).unwrap();
        session.last_active_at = chrono::Utc::now() - chrono::Duration::minutes(31);
    }
    h.core.run_queue_sweep().await;

    let a_events = a.drain();
    assert!(a_events
        .iter()
        .any(|e| matches!(e, ServerEvent::SessionExpired)));
    let b_events = b.drain();
    assert!(b_events.iter().any(|e| matches!(
        e,
        ServerEvent::Ended { reason, .. } if reason == "stranger_disconnected"
    )));

    let state = h.core.state.lock().await;
    assert!(state.registry.get_by_user(&a.user_id).is_none());
    assert_eq!(state.online_count(), 1);
    assert_eq!(state.rooms.active_count(), 0);
}

#[tokio::test]
async fn test_room_sweep_is_a_noop_for_fresh_rooms() {
    let h = TestHarness::new();
    let mut a = h.connect();
    let mut b = h.connect();
    h.register(&mut a, profile("male", "18-25")).await;
    h.register(&mut b, profile("female", "18-25")).await;
    h.find_match(&a, any_preferences()).await;
    h.find_match(&b, any_preferences()).await;
    a.drain();
    b.drain();

    h.core.run_room_sweep().await;
    h.core.run_queue_sweep().await;

    let state = h.core.state.lock().await;
    assert_eq!(state.rooms.active_count(), 1);
    assert_eq!(state.online_count(), 2);
    assert!(a.rx.try_recv().is_err());
    assert!(b.rx.try_recv().is_err());
}
