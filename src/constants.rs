// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const WS_PATH: &str = "ws";

// Profile attribute caps
pub const MAX_KEYWORDS: usize = 10;
pub const MAX_KEYWORD_LEN: usize = 50;
pub const MAX_LOCATION_LEN: usize = 100;

// Message limits
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;
pub const MIN_MESSAGE_LENGTH_LIMIT: usize = 1;
pub const MAX_MESSAGE_LENGTH_LIMIT: usize = 10_000;

// Room limits
pub const MAX_ROOM_MESSAGES: usize = 1000;
pub const RESPONSE_SAMPLE_WINDOW: usize = 50;
pub const QUALITY_ISSUE_CAP: usize = 20;
pub const CLOSED_ROOM_HISTORY: usize = 10_000;
pub const ACTIVE_GAP_SECS: i64 = 60;

// Queue limits
pub const MAX_QUEUE_SIZE: usize = 1000;
pub const MATCH_SCAN_LIMIT: usize = 10;
pub const PRIORITY_URGENCY_WEIGHT: f64 = 10_000.0;

// Timeouts (seconds unless noted)
pub const SESSION_IDLE_TIMEOUT_SECS: i64 = 30 * 60;
pub const ROOM_INACTIVITY_TIMEOUT_SECS: i64 = 30 * 60;
pub const DEFAULT_MAX_CHAT_DURATION_MS: u64 = 3_600_000;
pub const QUEUE_MAX_WAIT_SECS: i64 = 5 * 60;

// Maintenance cadence (seconds)
pub const MATCH_LOOP_INTERVAL_SECS: u64 = 2;
pub const STATS_BROADCAST_INTERVAL_SECS: u64 = 30;
pub const ROOM_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
pub const QUEUE_SWEEP_INTERVAL_SECS: u64 = 60;
