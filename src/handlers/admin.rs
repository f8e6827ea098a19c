//! HTTP admin surface: health, stats, client configuration, and a
//! non-production debug view.

use serde_json::json;
use std::convert::Infallible;
use warp::Filter;

use crate::core::SharedCore;

pub fn admin_routes(
    core: SharedCore,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::get())
        .and(with_core(core.clone()))
        .and_then(health_handler);

    let stats = warp::path("stats")
        .and(warp::get())
        .and(with_core(core.clone()))
        .and_then(stats_handler);

    let config = warp::path("config")
        .and(warp::get())
        .and(with_core(core.clone()))
        .and_then(config_handler);

    let debug = warp::path("debug")
        .and(warp::get())
        .and(with_core(core))
        .and_then(debug_handler);

    health.or(stats).or(config).or(debug)
}

fn with_core(
    core: SharedCore,
) -> impl Filter<Extract = (SharedCore,), Error = Infallible> + Clone {
    warp::any().map(move || core.clone())
}

async fn health_handler(core: SharedCore) -> Result<impl warp::Reply, Infallible> {
    let state = core.state.lock().await;
    Ok(warp::reply::json(&json!({
        "status": "ok",
        "uptime_seconds": core.uptime().as_secs(),
        "online_users": state.online_count(),
        "active_rooms": state.rooms.active_count(),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": core.config.environment,
    })))
}

async fn stats_handler(core: SharedCore) -> Result<impl warp::Reply, Infallible> {
    let state = core.state.lock().await;
    Ok(warp::reply::json(&json!({
        "online_users": state.online_count(),
        "active_rooms": state.rooms.active_count(),
        "total_connections": state.counters.total_connections,
        "average_wait_time_ms": state.counters.average_wait_ms(),
        "uptime_seconds": core.uptime().as_secs(),
    })))
}

async fn config_handler(core: SharedCore) -> Result<impl warp::Reply, Infallible> {
    Ok(warp::reply::json(&core.config.client_view()))
}

/// Queue and session introspection; hidden in production.
async fn debug_handler(core: SharedCore) -> Result<Box<dyn warp::Reply>, Infallible> {
    if core.config.is_production() {
        return Ok(Box::new(warp::reply::with_status(
            "not found",
            warp::http::StatusCode::NOT_FOUND,
        )));
    }
    let state = core.state.lock().await;
    let queue: Vec<_> = state
        .matching
        .iter()
        .map(|entry| {
            json!({
                "user_id": entry.user_id,
                "priority": entry.priority,
                "attempts": entry.attempts,
                "wait_seconds": entry.wait_time().num_seconds(),
            })
        })
        .collect();
    let sessions: Vec<_> = state
        .registry
        .iter()
        .map(|session| {
            json!({
                "user_id": session.user_id,
                "in_room": session.in_room(),
                "queued": state.matching.contains(&session.user_id),
                "trust_score": session.trust_score,
                "banned": session.banned,
            })
        })
        .collect();
    Ok(Box::new(warp::reply::json(&json!({
        "queue_size": state.matching.len(),
        "queue": queue,
        "sessions": sessions,
    }))))
}
