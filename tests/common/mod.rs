//! Shared harness for integration tests: an in-process core plus
//! channel-backed fake transports.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver};

use pairlink::config::AppConfig;
use pairlink::core::events::{ClientEvent, MatchPair, ServerEvent};
use pairlink::core::session::EventSender;
use pairlink::core::{CoreServer, EventDispatcher, SharedCore};
use pairlink::profile::{RawPreferences, RawProfile};

static NEXT_TRANSPORT: AtomicUsize = AtomicUsize::new(1);

pub struct TestHarness {
    pub core: SharedCore,
    pub dispatcher: EventDispatcher,
    pub match_rx: UnboundedReceiver<MatchPair>,
}

pub struct TestClient {
    pub transport_id: String,
    pub tx: EventSender,
    pub rx: UnboundedReceiver<ServerEvent>,
    pub user_id: String,
}

impl TestClient {
    /// Next pending event; panics if none arrived.
    pub fn next(&mut self) -> ServerEvent {
        self.rx.try_recv().expect("expected a pending event")
    }

    /// Drop everything currently queued on this client.
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::for_testing())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let (core, match_rx) = CoreServer::new(Arc::new(config));
        let dispatcher = EventDispatcher::new(core.clone());
        Self {
            core,
            dispatcher,
            match_rx,
        }
    }

    pub fn connect(&self) -> TestClient {
        let n = NEXT_TRANSPORT.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        TestClient {
            transport_id: format!("transport-{}", n),
            tx,
            rx,
            user_id: String::new(),
        }
    }

    pub async fn send(&self, client: &TestClient, event: ClientEvent) {
        self.dispatcher
            .handle_event(&client.transport_id, &client.tx, event)
            .await;
    }

    /// Register and capture the allocated user id.
    pub async fn register(&self, client: &mut TestClient, profile: RawProfile) {
        self.send(client, ClientEvent::Register { profile }).await;
        let events = client.drain();
        for event in &events {
            if let ServerEvent::Registered { user_id, .. } = event {
                client.user_id = user_id.clone();
            }
        }
        assert!(!client.user_id.is_empty(), "register did not complete");
    }

    pub async fn find_match(&self, client: &TestClient, preferences: RawPreferences) {
        self.send(client, ClientEvent::FindMatch { preferences }).await;
    }
}

pub fn profile(gender: &str, age: &str) -> RawProfile {
    RawProfile {
        gender: Some(gender.to_string()),
        age: Some(age.to_string()),
        location: None,
        keywords: None,
    }
}

pub fn full_profile(gender: &str, age: &str, location: &str, keywords: &[&str]) -> RawProfile {
    RawProfile {
        gender: Some(gender.to_string()),
        age: Some(age.to_string()),
        location: Some(location.to_string()),
        keywords: Some(keywords.iter().map(|k| k.to_string()).collect()),
    }
}

pub fn any_preferences() -> RawPreferences {
    RawPreferences {
        gender: Some("any".to_string()),
        age: Some("any".to_string()),
        chat_type: Some("text".to_string()),
    }
}
