// Copyright 2022 Swarmdb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use common_exception::ErrorCode;
use common_exception::Result;
use rand::Rng;

use crate::transport::ExchangeTransport;

/// Bounded exponential backoff for transient transport failures. Only
/// `ErrorCode::RecoverableTransient` is retried; every other error (bad
/// wire format, receiver closed, query cancelled) is returned to the
/// caller immediately since retrying it cannot help.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Transmits `batch_bytes` via `transport`, retrying on
/// `RecoverableTransient` with jittered exponential backoff up to
/// `policy.max_attempts` total tries.
pub async fn retrying_transmit<T: ExchangeTransport>(
    transport: &T,
    sender_index: u32,
    seq: u64,
    batch_bytes: &[u8],
    policy: RetryPolicy,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.transmit_batch(sender_index, seq, batch_bytes).await {
            Ok(()) => return Ok(()),
            Err(ErrorCode::RecoverableTransient { message, attempts }) if attempt < policy.max_attempts => {
                let backoff = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                let jitter_ms = rand::thread_rng().gen_range(0..=(backoff.as_millis() as u64 / 2).max(1));
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    %message,
                    prior_attempts = attempts,
                    "retrying transient exchange transmit failure"
                );
                tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;

    struct FlakyTransport {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl ExchangeTransport for FlakyTransport {
        async fn transmit_batch(&self, _sender_index: u32, _seq: u64, _batch_bytes: &[u8]) -> Result<()> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(ErrorCode::RecoverableTransient {
                    message: "connection reset".into(),
                    attempts: 1,
                })
            } else {
                Ok(())
            }
        }

        async fn transmit_eos(&self, _sender_index: u32) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let transport = FlakyTransport {
            failures_remaining: AtomicU32::new(2),
        };
        let policy = RetryPolicy::new(4, Duration::from_millis(1));
        let result = retrying_transmit(&transport, 0, 1, &[1, 2, 3], policy).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn gives_up_once_attempts_are_exhausted() {
        let transport = FlakyTransport {
            failures_remaining: AtomicU32::new(10),
        };
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result = retrying_transmit(&transport, 0, 1, &[1, 2, 3], policy).await;
        assert!(result.is_err());
    }
}
