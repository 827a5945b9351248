//! Fixed-window per-client rate limiting for the HTTP edge.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::handlers;
use crate::AppState;

/// Windows map is swept once it grows past this, so one-off clients do not
/// accumulate forever.
const SWEEP_THRESHOLD: usize = 1024;

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<IpAddr, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(window_ms: u64, max_requests: u32) -> RateLimiter {
        RateLimiter {
            window: Duration::from_millis(window_ms),
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request; false once the client exhausted the current window.
    pub fn allow(&self, client: IpAddr) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap();

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, (started, _)| now.duration_since(*started) < window);
        }

        let entry = windows.entry(client).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max_requests
    }
}

pub async fn require_slot(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if state.rate_limiter.allow(addr.ip()) {
        next.run(request).await
    } else {
        handlers::error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded, try again later",
            None,
        )
    }
}
