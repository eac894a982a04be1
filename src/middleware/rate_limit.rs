use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::AppError;
use crate::state::AppState;

/// Fixed-window counter keyed by caller-supplied strings. The login route
/// keys on `ip:path`.
pub struct RateLimiter {
    max_hits: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a hit; false once the window's budget is spent.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        // Expired windows are dropped opportunistically to bound the map.
        windows.retain(|_, (started, _)| now.duration_since(*started) < self.window);

        let entry = windows.entry(key.to_string()).or_insert((now, 0));
        if now.duration_since(entry.0) >= self.window {
            *entry = (now, 0);
        }
        entry.1 += 1;
        entry.1 <= self.max_hits
    }
}

pub async fn login_rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = format!("{}:{}", addr.ip(), request.uri().path());
    if !state.login_limiter.check(&key) {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_enforced_per_key() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check("1.2.3.4:/api/v1/auth/login"));
        }
        assert!(!limiter.check("1.2.3.4:/api/v1/auth/login"));
        // A different caller is unaffected.
        assert!(limiter.check("5.6.7.8:/api/v1/auth/login"));
    }

    #[test]
    fn window_expiry_resets_the_budget() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("k"));
    }
}
