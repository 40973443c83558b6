//! Provider pool: fallback order, health tracking, rate limiting, retry.
//!
//! The pool is the only mutable state shared across extraction tasks. It is
//! passed by reference (behind `Arc`) into the orchestrator; there is no
//! process-wide singleton. Rate counters are guarded by a short-lived mutex
//! that is never held across an await.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GenerateOptions, Provider, ProviderHealth, ProviderStatus};
use crate::error::ProviderError;

/// How long a `Down` provider is skipped before one probe is allowed.
const DOWN_COOLDOWN: Duration = Duration::from_secs(60);

/// Length of the rolling rate-limit window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Longest slice of an offending raw response carried into a log line.
const RAW_LOG_LIMIT: usize = 200;

/// Retry policy for transient provider faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per provider, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds (default: 500)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on the backoff delay in milliseconds (default: 10000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Exponential backoff: base * 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Rolling request counter for one provider.
struct RateWindow {
    started: Instant,
    count: u64,
}

struct ProviderEntry {
    provider: Arc<dyn Provider>,
    requests_per_minute: Option<u64>,
    /// Encoded `ProviderHealth`: 0 healthy, 1 degraded, 2 down
    health: AtomicU8,
    window: Mutex<RateWindow>,
    total_requests: AtomicU64,
    /// Set when the provider goes down, for cooldown probing
    down_since: Mutex<Option<Instant>>,
}

impl ProviderEntry {
    fn new(provider: Arc<dyn Provider>, requests_per_minute: Option<u64>) -> Self {
        Self {
            provider,
            requests_per_minute,
            health: AtomicU8::new(0),
            window: Mutex::new(RateWindow {
                started: Instant::now(),
                count: 0,
            }),
            total_requests: AtomicU64::new(0),
            down_since: Mutex::new(None),
        }
    }

    fn health(&self) -> ProviderHealth {
        match self.health.load(Ordering::Acquire) {
            0 => ProviderHealth::Healthy,
            1 => ProviderHealth::Degraded,
            _ => ProviderHealth::Down,
        }
    }

    fn mark_healthy(&self) {
        self.health.store(0, Ordering::Release);
    }

    /// Healthy -> Degraded -> Down.
    fn degrade(&self) {
        let prev = self
            .health
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |h| Some((h + 1).min(2)))
            .unwrap_or(0);
        if prev >= 1 {
            let mut down = self.down_since.lock().unwrap_or_else(|p| p.into_inner());
            *down = Some(Instant::now());
        }
    }

    /// Whether the entry should be skipped entirely for this request.
    fn skip_for_now(&self) -> bool {
        if self.health() != ProviderHealth::Down {
            return false;
        }
        let down = self.down_since.lock().unwrap_or_else(|p| p.into_inner());
        match *down {
            Some(since) => since.elapsed() < DOWN_COOLDOWN,
            None => false,
        }
    }

    /// Count one request against the rolling window. Returns false when the
    /// configured quota for the current window is exhausted.
    fn try_consume_quota(&self) -> bool {
        let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        if window.started.elapsed() >= RATE_WINDOW {
            window.started = Instant::now();
            window.count = 0;
        }
        if let Some(quota) = self.requests_per_minute {
            if window.count >= quota {
                return false;
            }
        }
        window.count += 1;
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn status(&self) -> ProviderStatus {
        let (requests_in_window, remaining) = {
            let window = self.window.lock().unwrap_or_else(|p| p.into_inner());
            let count = if window.started.elapsed() >= RATE_WINDOW {
                0
            } else {
                window.count
            };
            let remaining = self.requests_per_minute.map(|q| q.saturating_sub(count));
            (count, remaining)
        };
        ProviderStatus {
            provider_name: self.provider.name().to_string(),
            health: self.health(),
            requests_in_window,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            remaining_quota: remaining,
        }
    }
}

/// Ordered pool of providers with fallback and health tracking.
pub struct ProviderPool {
    entries: Vec<ProviderEntry>,
    retry: RetryPolicy,
}

impl ProviderPool {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            entries: Vec::new(),
            retry,
        }
    }

    /// Append a provider at the end of the fallback order.
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>, requests_per_minute: Option<u64>) {
        self.entries
            .push(ProviderEntry::new(provider, requests_per_minute));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of every provider's health and quota.
    pub fn status(&self) -> Vec<ProviderStatus> {
        self.entries.iter().map(|e| e.status()).collect()
    }

    /// Generate a completion, walking the fallback chain.
    ///
    /// Per provider: timeouts are retried with exponential backoff up to the
    /// policy's attempt budget; rate limiting and unavailability degrade the
    /// provider's health and move on; a malformed response moves on without
    /// retrying the same provider. When `options.json` is set, the response
    /// must parse as a JSON value or it counts as malformed.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for entry in &self.entries {
            let name = entry.provider.name();

            if entry.skip_for_now() {
                debug!(provider = name, "skipping provider in cooldown");
                continue;
            }

            let mut attempt = 0u32;
            loop {
                attempt += 1;

                if !entry.try_consume_quota() {
                    entry.degrade();
                    warn!(provider = name, "local quota exhausted, falling back");
                    last_err = Some(ProviderError::RateLimited {
                        provider: name.to_string(),
                    });
                    break;
                }

                match entry.provider.generate(prompt, options).await {
                    Ok(text) => {
                        if options.json {
                            match extract_json(&text) {
                                Some(json) => {
                                    entry.mark_healthy();
                                    return Ok(json);
                                }
                                None => {
                                    // Unparsable structured output: give up on
                                    // this provider for this request.
                                    warn!(
                                        provider = name,
                                        raw = truncate_for_log(&text),
                                        "malformed structured response"
                                    );
                                    last_err = Some(ProviderError::Malformed {
                                        provider: name.to_string(),
                                        raw: text,
                                    });
                                    break;
                                }
                            }
                        }
                        entry.mark_healthy();
                        return Ok(text);
                    }
                    Err(err) => {
                        if err.degrades_health() {
                            entry.degrade();
                        }
                        if err.retry_same_provider() && self.retry.should_retry(attempt) {
                            let delay = self.retry.delay_for_attempt(attempt);
                            warn!(
                                provider = name,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "transient provider fault, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        warn!(provider = name, error = %err, "provider failed, falling back");
                        last_err = Some(err);
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable {
            provider: "none".to_string(),
            reason: if self.entries.is_empty() {
                "no providers configured".to_string()
            } else {
                "all providers cooling down".to_string()
            },
        }))
    }
}

/// Clip a raw response for logging without splitting a UTF-8 character.
fn truncate_for_log(raw: &str) -> &str {
    if raw.len() <= RAW_LOG_LIMIT {
        return raw;
    }
    let mut end = RAW_LOG_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

/// Pull a JSON object out of a model response.
///
/// Models wrap JSON in code fences or prose often enough that a literal
/// parse is too strict: accept the body as-is, or the outermost `{...}`.
fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &trimmed[start..=end];
    serde_json::from_str::<serde_json::Value>(candidate)
        .ok()
        .map(|_| candidate.to_string())
}
