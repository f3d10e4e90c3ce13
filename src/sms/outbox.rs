use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use super::{normalize_phone, SmsError, SmsMessage, SmsTransport};

/// Exponential backoff with a hard attempt limit
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Spread retries by up to ±10%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Pause after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = (self.base_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        let millis = if self.jitter {
            base + base * 0.1 * (rand::random::<f64>() * 2.0 - 1.0)
        } else {
            base
        };
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub workers: usize,
    /// Messages waiting beyond this are refused
    pub capacity: usize,
    /// Prepended to numbers without an international prefix
    pub country_prefix: String,
    pub retry: RetryPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 1024,
            country_prefix: "+34".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle for queueing SMS to the worker pool
#[derive(Clone)]
pub struct SmsOutbox {
    tx: mpsc::Sender<SmsMessage>,
    country_prefix: String,
}

impl SmsOutbox {
    /// Start the supervised worker pool. The supervisor ends once every
    /// outbox handle is dropped and the queue is drained.
    pub fn start(transport: Arc<dyn SmsTransport>, config: OutboxConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let supervisor = tokio::spawn(supervise(transport, rx, config.clone()));

        (
            Self {
                tx,
                country_prefix: config.country_prefix,
            },
            supervisor,
        )
    }

    /// Queue a message without waiting
    pub fn enqueue(&self, mut message: SmsMessage) -> Result<(), SmsError> {
        message.to = normalize_phone(&message.to, &self.country_prefix);
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SmsError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SmsError::Closed,
        })
    }
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<SmsMessage>>>;

/// Keep `config.workers` workers alive, replacing any that panic
async fn supervise(transport: Arc<dyn SmsTransport>, rx: SharedReceiver, config: OutboxConfig) {
    let mut workers = JoinSet::new();
    let mut next_id = 0;
    for _ in 0..config.workers.max(1) {
        workers.spawn(work(next_id, Arc::clone(&transport), Arc::clone(&rx), config.retry.clone()));
        next_id += 1;
    }

    while let Some(result) = workers.join_next().await {
        match result {
            Ok(id) => tracing::debug!(worker = id, "SMS worker finished"),
            Err(e) if e.is_panic() => {
                tracing::error!(error = %e, "SMS worker panicked, restarting");
                workers.spawn(work(
                    next_id,
                    Arc::clone(&transport),
                    Arc::clone(&rx),
                    config.retry.clone(),
                ));
                next_id += 1;
            }
            Err(e) => tracing::warn!(error = %e, "SMS worker cancelled"),
        }
    }

    tracing::info!("SMS outbox stopped");
}

async fn work(
    id: usize,
    transport: Arc<dyn SmsTransport>,
    rx: SharedReceiver,
    policy: RetryPolicy,
) -> usize {
    loop {
        let message = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(message) = message else {
            return id;
        };
        // Outcome is logged inside
        let _ = deliver(transport.as_ref(), &policy, &message).await;
    }
}

/// Send one message, retrying transient failures per `policy`.
/// Returns the number of attempts used.
pub async fn deliver(
    transport: &dyn SmsTransport,
    policy: &RetryPolicy,
    message: &SmsMessage,
) -> Result<u32, SmsError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match transport.send(message).await {
            Ok(()) => {
                if attempt > 1 {
                    tracing::debug!(to = %message.to, attempt, "SMS sent after retry");
                }
                return Ok(attempt);
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(to = %message.to, error = %e, "SMS rejected, dropping");
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(
                    to = %message.to,
                    attempts = attempt,
                    error = %e,
                    "Giving up on SMS"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    to = %message.to,
                    attempt,
                    error = %e,
                    "SMS failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` sends with the given error
    struct FlakyTransport {
        failures: u32,
        error: SmsError,
        calls: AtomicU32,
        delivered: parking_lot::Mutex<Vec<SmsMessage>>,
    }

    impl FlakyTransport {
        fn new(failures: u32, error: SmsError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                delivered: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SmsTransport for FlakyTransport {
        async fn send(&self, message: &SmsMessage) -> Result<(), SmsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(self.error.clone());
            }
            self.delivered.lock().push(message.clone());
            Ok(())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(4), Duration::from_secs(40));
        assert_eq!(policy.delay_for(10), Duration::from_secs(300));

        let jittered = RetryPolicy::default().delay_for(2);
        assert!(jittered >= Duration::from_secs(9) && jittered <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let transport = FlakyTransport::new(2, SmsError::Unavailable("503".into()));
        let msg = SmsMessage::new("+34600123456", "hello");

        let started = tokio::time::Instant::now();
        let attempts = tokio_test::assert_ok!(deliver(&transport, &policy(), &msg).await);
        assert_eq!(attempts, 3);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
        assert_eq!(transport.delivered.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = FlakyTransport::new(u32::MAX, SmsError::Unavailable("timeout".into()));
        let msg = SmsMessage::new("+34600123456", "hello");

        let err = deliver(&transport, &policy(), &msg).await.unwrap_err();
        assert!(matches!(err, SmsError::Unavailable(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let transport = FlakyTransport::new(1, SmsError::Rejected("invalid number".into()));
        let msg = SmsMessage::new("+34600123456", "hello");

        assert!(deliver(&transport, &policy(), &msg).await.is_err());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbox_delivers_and_stops_when_dropped() {
        let transport = Arc::new(FlakyTransport::new(1, SmsError::Unavailable("503".into())));
        let config = OutboxConfig {
            retry: policy(),
            ..OutboxConfig::default()
        };
        let (outbox, supervisor) = SmsOutbox::start(transport.clone(), config);

        outbox
            .enqueue(SmsMessage::new("600 12 34 56", "first"))
            .unwrap();
        outbox
            .enqueue(SmsMessage::new("+447700900123", "second"))
            .unwrap();
        drop(outbox);

        supervisor.await.unwrap();
        let mut to: Vec<_> = transport
            .delivered
            .lock()
            .iter()
            .map(|m| m.to.clone())
            .collect();
        to.sort();
        assert_eq!(to, vec!["+34600123456", "+447700900123"]);
    }

    #[tokio::test]
    async fn test_full_outbox_refuses() {
        let transport = Arc::new(FlakyTransport::new(0, SmsError::Closed));
        let config = OutboxConfig {
            workers: 1,
            capacity: 1,
            ..OutboxConfig::default()
        };
        let (outbox, _supervisor) = SmsOutbox::start(transport, config);

        // Workers have not run yet on this thread; the second message has no room
        outbox.enqueue(SmsMessage::new("+1", "a")).unwrap();
        assert!(matches!(
            outbox.enqueue(SmsMessage::new("+1", "b")),
            Err(SmsError::QueueFull)
        ));
    }
}
