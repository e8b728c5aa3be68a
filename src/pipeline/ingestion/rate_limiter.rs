use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub requests_per_min: Option<u64>,
    pub concurrency: Option<u32>,
}

/// Token-bucket limiter for calls into a contact store
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: Limits,
    // bucket is modeled by the current tokens and the time of last refill
    rpm_tokens: Mutex<(f64, Instant)>,
    sem: Option<Semaphore>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let capacity = limits.requests_per_min.unwrap_or(0) as f64;
        let sem = limits.concurrency.map(|c| Semaphore::new(c as usize));
        Self {
            inner: Arc::new(Inner {
                limits,
                rpm_tokens: Mutex::new((capacity, Instant::now())),
                sem,
            }),
        }
    }

    pub fn per_minute(requests_per_min: u64) -> Self {
        Self::new(Limits {
            requests_per_min: Some(requests_per_min),
            concurrency: None,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    /// Wait until one more request is allowed
    pub async fn acquire(&self) {
        // A closed semaphore only happens on shutdown; proceed without a permit
        let _permit = match &self.inner.sem {
            Some(sem) => sem.acquire().await.ok(),
            None => None,
        };

        if let Some(rpm) = self.inner.limits.requests_per_min.filter(|rpm| *rpm > 0) {
            self.consume_token(rpm as f64, 60.0).await;
        }
    }

    async fn consume_token(&self, capacity: f64, period_secs: f64) {
        let refill_rate = capacity / period_secs;
        loop {
            let mut guard = self.inner.rpm_tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *tokens = (*tokens + elapsed * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                return;
            }
            let secs = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.001))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::new(Limits::default());
        for _ in 0..1000 {
            limiter.acquire().await;
        }
    }

    #[tokio::test]
    async fn test_empty_bucket_blocks() {
        let limiter = RateLimiter::per_minute(1);
        limiter.acquire().await;

        let second = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(second.is_err());
    }
}
