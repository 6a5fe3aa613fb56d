use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{AuthError, AuthResult};

/// Token-bucket bound on outbound key lookups: bursts up to `capacity`,
/// refilling `refill_rate` tokens per elapsed `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    capacity: u64,
    refill_rate: u64,
    unit: Duration,
}

impl RateLimitPolicy {
    pub fn new(capacity: u64, refill_rate: u64, unit: Duration) -> AuthResult<Self> {
        if capacity == 0 {
            return Err(AuthError::Configuration(
                "rate limit capacity must be positive".into(),
            ));
        }
        if refill_rate == 0 {
            return Err(AuthError::Configuration(
                "rate limit refill rate must be positive".into(),
            ));
        }
        if unit.is_zero() {
            return Err(AuthError::Configuration(
                "rate limit unit must be a non-zero duration".into(),
            ));
        }
        Ok(Self {
            capacity,
            refill_rate,
            unit,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> u64 {
        self.refill_rate
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Non-blocking in-process token bucket. Excess acquisitions fail fast rather
/// than queueing.
#[derive(Debug)]
pub struct TokenBucket {
    policy: RateLimitPolicy,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BucketState {
                tokens: policy.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Take one token if available. Refills whole units of elapsed time; the
    /// remainder carries over via `last_refill` advancing in unit steps.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().expect("token bucket mutex poisoned");
        let elapsed = state.last_refill.elapsed();
        let periods = (elapsed.as_nanos() / self.policy.unit.as_nanos()) as u64;
        if periods > 0 {
            let refill = periods.saturating_mul(self.policy.refill_rate);
            state.tokens = state.tokens.saturating_add(refill).min(self.policy.capacity);
            if state.tokens == self.policy.capacity {
                state.last_refill = Instant::now();
            } else {
                let steps = u32::try_from(periods).unwrap_or(u32::MAX);
                state.last_refill += self.policy.unit * steps;
            }
        }

        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        true
    }
}
