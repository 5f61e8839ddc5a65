use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::reddit::FetchError;

/// Token-bucket throttle for outbound Reddit requests.
///
/// The bucket holds up to `per_minute` tokens and refills continuously.
/// A caller that finds the bucket empty reserves the next token and sleeps
/// until it is due, as long as that wait fits inside `max_wait`; otherwise
/// the call fails with `RateLimitExceeded` and nothing is reserved.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    max_wait: Duration,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    // May go negative: each unit below zero is a reservation held by a sleeping caller.
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(per_minute: u32, max_wait: Duration) -> Self {
        let capacity = f64::from(per_minute.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            max_wait,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Waits for permission to send one request.
    pub async fn acquire(&self) -> Result<(), FetchError> {
        let wait = {
            let mut bucket = self.bucket.lock().await;
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return Ok(());
            }

            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec);
            if wait > self.max_wait {
                return Err(FetchError::RateLimitExceeded { retry_after: wait });
            }
            bucket.tokens -= 1.0;
            wait
        };

        debug!("Throttling Reddit request for {}ms", wait.as_millis());
        tokio::time::sleep(wait).await;
        Ok(())
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}
