//! Bounded retry around the text-generation call.
//!
//! Rate-limit failures are retried with exponential backoff; any other
//! failure ends the attempt immediately. The loop never raises: callers get
//! either the generated text or a terminal [`InvokeOutcome`] describing why
//! there is none.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use bookdigest_shared::{BookDigestError, Result, RetryConfig};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Anything that turns a prompt into text.
pub trait TextGenerator {
    fn generate(
        &self,
        prompt: &str,
        credential: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Suspends the current task between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

impl<T: TextGenerator + Sync + ?Sized> TextGenerator for &T {
    fn generate(
        &self,
        prompt: &str,
        credential: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).generate(prompt, credential)
    }
}

impl<T: Sleeper + Sync + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(duration)
    }
}

/// Real sleeping via `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// True when an error description indicates rate limiting or quota exhaustion.
pub fn is_rate_limited(description: &str) -> bool {
    description.contains("429")
        || description.contains("RESOURCE_EXHAUSTED")
        || description.to_lowercase().contains("rate limit")
}

/// Backoff parameters for one invoker.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: u32,
    /// Decides from the error text whether another attempt is worthwhile.
    pub retryable: fn(&str) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_secs(config.initial_delay_secs),
            backoff_multiplier: config.backoff_multiplier,
            retryable: is_rate_limited,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    Succeeded { text: String, attempts: u32 },
    /// A non-retryable error on the given attempt.
    PermanentlyFailed { error: String, attempts: u32 },
    /// Every attempt hit a retryable error.
    RetriesExhausted { error: String, attempts: u32 },
}

impl InvokeOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::PermanentlyFailed { attempts, .. }
            | Self::RetriesExhausted { attempts, .. } => *attempts,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Succeeded { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Succeeded { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Human-readable failure reason, `None` on success.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Succeeded { .. } => None,
            Self::PermanentlyFailed { error, .. } => Some(error.clone()),
            Self::RetriesExhausted { error, attempts } => {
                Some(format!("gave up after {attempts} attempts: {error}"))
            }
        }
    }
}

/// Mutable loop state, scoped to one call.
#[derive(Debug, Clone, Copy)]
struct RetryState {
    attempt: u32,
    delay: Duration,
}

/// Wraps a [`TextGenerator`] with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ResilientInvoker<G, S = TokioSleeper> {
    generator: G,
    sleeper: S,
    policy: RetryPolicy,
}

impl<G: TextGenerator> ResilientInvoker<G, TokioSleeper> {
    pub fn new(generator: G, policy: RetryPolicy) -> Self {
        Self::with_sleeper(generator, TokioSleeper, policy)
    }
}

impl<G: TextGenerator, S: Sleeper> ResilientInvoker<G, S> {
    pub fn with_sleeper(generator: G, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            generator,
            sleeper,
            policy,
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Generated text, or `None` after a permanent failure or exhausted retries.
    pub async fn invoke(&self, prompt: &str, credential: &str) -> Option<String> {
        self.invoke_detailed(prompt, credential).await.into_text()
    }

    /// Run the retry loop and report how it ended.
    pub async fn invoke_detailed(&self, prompt: &str, credential: &str) -> InvokeOutcome {
        let mut state = RetryState {
            attempt: 0,
            delay: self.policy.initial_delay,
        };

        loop {
            let attempts = state.attempt + 1;
            let error = match self.generator.generate(prompt, credential).await {
                Ok(text) => {
                    debug!(attempts, "generation succeeded");
                    return InvokeOutcome::Succeeded { text, attempts };
                }
                Err(e) => describe(&e),
            };

            if !(self.policy.retryable)(&error) {
                error!(attempts, %error, "generation failed with a non-retryable error");
                return InvokeOutcome::PermanentlyFailed { error, attempts };
            }

            if state.attempt >= self.policy.max_retries {
                warn!(attempts, %error, "generation retries exhausted");
                return InvokeOutcome::RetriesExhausted { error, attempts };
            }

            warn!(
                attempt = attempts,
                delay_ms = state.delay.as_millis() as u64,
                %error,
                "rate limited, backing off"
            );
            self.sleeper.sleep(state.delay).await;
            state.delay = state.delay.saturating_mul(self.policy.backoff_multiplier);
            state.attempt += 1;
        }
    }
}

/// Error text the retry predicate inspects.
fn describe(error: &BookDigestError) -> String {
    match error {
        BookDigestError::Generation(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generator and recording sleeper shared by core tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays a fixed script of results, then repeats the fallback.
    #[derive(Debug)]
    pub struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<String>>>,
        fallback: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new(script: Vec<Result<String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: "generated summary".into(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Always succeeds with `text`.
        pub fn always(text: &str) -> Self {
            Self {
                fallback: text.into(),
                ..Self::new(vec![])
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(
            &self,
            prompt: &str,
            _credential: &str,
        ) -> impl Future<Output = Result<String>> + Send {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()));
            std::future::ready(next)
        }
    }

    /// Records requested durations instead of sleeping.
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn durations(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.slept.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    pub fn rate_limited() -> Result<String> {
        Err(BookDigestError::Generation(
            "HTTP 429 Too Many Requests: RESOURCE_EXHAUSTED".into(),
        ))
    }

    pub fn permanent() -> Result<String> {
        Err(BookDigestError::Generation(
            "HTTP 400 Bad Request: API key not valid".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn invoker<'a>(
        generator: &'a ScriptedGenerator,
        sleeper: &'a RecordingSleeper,
    ) -> ResilientInvoker<&'a ScriptedGenerator, &'a RecordingSleeper> {
        ResilientInvoker::with_sleeper(generator, sleeper, RetryPolicy::default())
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limited("HTTP 429 Too Many Requests"));
        assert!(is_rate_limited("status RESOURCE_EXHAUSTED"));
        assert!(is_rate_limited("Rate Limit reached for model"));
        assert!(!is_rate_limited("HTTP 500 Internal Server Error"));
        assert!(!is_rate_limited("resource_exhausted"));
    }

    #[test]
    fn policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.backoff_multiplier, 2);
    }

    #[tokio::test]
    async fn immediate_success_never_sleeps() {
        let generator = ScriptedGenerator::new(vec![Ok("summary".into())]);
        let sleeper = RecordingSleeper::default();
        let outcome = invoker(&generator, &sleeper).invoke_detailed("p", "k").await;

        assert_eq!(
            outcome,
            InvokeOutcome::Succeeded {
                text: "summary".into(),
                attempts: 1
            }
        );
        assert!(sleeper.durations().is_empty());
    }

    #[tokio::test]
    async fn two_rate_limits_then_success() {
        let generator = ScriptedGenerator::new(vec![
            rate_limited(),
            rate_limited(),
            Ok("third time".into()),
        ]);
        let sleeper = RecordingSleeper::default();
        let text = invoker(&generator, &sleeper).invoke("p", "k").await;

        assert_eq!(text.as_deref(), Some("third time"));
        assert_eq!(generator.calls(), 3);
        assert_eq!(
            sleeper.durations(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn permanent_error_fails_after_one_attempt() {
        let generator = ScriptedGenerator::new(vec![permanent(), Ok("unused".into())]);
        let sleeper = RecordingSleeper::default();
        let outcome = invoker(&generator, &sleeper).invoke_detailed("p", "k").await;

        assert!(matches!(
            outcome,
            InvokeOutcome::PermanentlyFailed { attempts: 1, .. }
        ));
        assert_eq!(generator.calls(), 1);
        assert!(sleeper.durations().is_empty());
        assert!(outcome.failure_reason().unwrap().contains("API key not valid"));
    }

    #[tokio::test]
    async fn retries_exhausted_after_max_plus_one_calls() {
        let generator = ScriptedGenerator::new((0..10).map(|_| rate_limited()).collect());
        let sleeper = RecordingSleeper::default();
        let outcome = invoker(&generator, &sleeper).invoke_detailed("p", "k").await;

        assert!(matches!(
            outcome,
            InvokeOutcome::RetriesExhausted { attempts: 6, .. }
        ));
        assert_eq!(generator.calls(), 6);
        assert_eq!(
            sleeper.durations(),
            [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
        assert_eq!(outcome.text(), None);
    }

    #[tokio::test]
    async fn custom_policy_and_predicate() {
        let generator = ScriptedGenerator::new(vec![
            Err(BookDigestError::Generation("HTTP 503 overloaded".into())),
            Ok("ok".into()),
        ]);
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(250),
            backoff_multiplier: 3,
            retryable: |e: &str| e.contains("503"),
        };
        let invoker = ResilientInvoker::with_sleeper(&generator, &sleeper, policy);

        assert_eq!(invoker.invoke("p", "k").await.as_deref(), Some("ok"));
        assert_eq!(sleeper.durations(), vec![Duration::from_millis(250)]);
    }

    #[tokio::test]
    async fn zero_retries_gives_up_on_first_rate_limit() {
        let generator = ScriptedGenerator::new(vec![rate_limited()]);
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let outcome = ResilientInvoker::with_sleeper(&generator, &sleeper, policy)
            .invoke_detailed("p", "k")
            .await;
        assert_eq!(outcome.attempts(), 1);
        assert!(matches!(outcome, InvokeOutcome::RetriesExhausted { .. }));
    }
}
