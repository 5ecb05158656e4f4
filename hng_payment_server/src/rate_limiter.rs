use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use hng_payment_engine::db_types::GatewayId;
use log::*;

/// A per-gateway fixed-window rate limiter for webhook deliveries.
///
/// One window per gateway: the first delivery opens the window, subsequent deliveries count against it until it
/// expires. A provider in a retry storm gets 429s instead of hammering the pipeline.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<GatewayId, Window>>,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window, windows: Mutex::new(HashMap::new()) }
    }

    /// One delivery per minute-window limit, as configured.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Record a delivery for `gateway`. Returns false when the current window is already full.
    pub fn check(&self, gateway: GatewayId) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        let window = windows.entry(gateway).or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        window.count += 1;
        if window.count > self.limit {
            warn!("📨️ Rate limit hit for {gateway}: {} deliveries in the current window", window.count);
            false
        } else {
            true
        }
    }
}
