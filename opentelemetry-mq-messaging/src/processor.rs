//! Retry processing with exponential backoff and at-least-once republish.
//!
//! Failed messages are requeued as new envelopes on the same transport rather
//! than retried in-process, so one failing message never blocks the consumer
//! from making progress on the rest of the stream. The retried copy is picked
//! up again by the same consumer group with its `retries` counter incremented.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Deserialize;
use tracing::warn;

use crate::envelope::Envelope;
use crate::error::{BoxError, Error};

/// Hard ceiling on the retry counter. Envelopes at or above this count are
/// abandoned without invoking the handler or the publisher.
pub const MAX_RETRIES: u32 = 10;

/// Publishes an envelope to the messaging system.
///
/// The retry processor uses this to requeue failed messages on the same
/// transport they arrived on.
#[async_trait]
pub trait Publisher<T>: Send + Sync {
    async fn publish(&self, envelope: &Envelope<T>) -> Result<(), Error>;
}

/// Backoff tuning for the retry processor.
///
/// Unset fields fall back to the backoff defaults (60s max interval, 15min
/// max elapsed time). Initial interval, multiplier, and randomization factor
/// are fixed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorConfig {
    pub max_interval: Option<Duration>,
    pub max_elapsed_time: Option<Duration>,
}

/// Wraps a message handler with retry-via-republish semantics.
///
/// The backoff generator is shared across messages on the same consumer loop
/// and reset after every successful handler invocation, so a burst of
/// failures backs the loop off progressively and a single success restores
/// the initial interval.
pub struct Processor<P> {
    backoff: ExponentialBackoff,
    publisher: P,
}

impl<P> Processor<P> {
    pub fn new(publisher: P, config: ProcessorConfig) -> Self {
        let mut backoff = ExponentialBackoff::default();
        if let Some(max_interval) = config.max_interval {
            backoff.max_interval = max_interval;
        }
        if let Some(max_elapsed_time) = config.max_elapsed_time {
            backoff.max_elapsed_time = Some(max_elapsed_time);
        }
        Processor { backoff, publisher }
    }

    /// Run `handler` over the envelope's payload, requeueing on failure.
    ///
    /// - `retries >= MAX_RETRIES`: returns [`Error::MaxRetriesExceeded`]
    ///   immediately; the message is dropped by design.
    /// - Handler success: the backoff generator is reset and the caller
    ///   should acknowledge the message.
    /// - Handler failure: a copy of the envelope with `retries + 1` is
    ///   republished, the current loop sleeps for the computed backoff
    ///   duration, and `Ok` is returned so the caller still acknowledges the
    ///   original. Only a failed republish is surfaced as an error.
    pub async fn process<T, F, Fut>(
        &mut self,
        envelope: Envelope<T>,
        handler: F,
    ) -> Result<(), Error>
    where
        P: Publisher<T>,
        T: Clone + Send + Sync,
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        if envelope.retries >= MAX_RETRIES {
            return Err(Error::MaxRetriesExceeded);
        }

        let delay = match self.backoff.next_backoff() {
            Some(delay) => delay,
            None => {
                // Elapsed-time budget spent: the current attempt proceeds
                // without delay and the next cycle starts a fresh curve.
                self.backoff.reset();
                Duration::ZERO
            }
        };

        match handler(envelope.payload.clone()).await {
            Ok(()) => {
                self.backoff.reset();
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, retries = envelope.retries, "handler failed, requeueing envelope");
                let retry = envelope.into_retry();
                self.publisher.publish(&retry).await?;
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingPublisher {
        published: Arc<Mutex<Vec<Envelope<String>>>>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Publisher<String> for RecordingPublisher {
        async fn publish(&self, envelope: &Envelope<String>) -> Result<(), Error> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::handler("publisher unavailable"));
            }
            self.published.lock().unwrap().push(envelope.clone());
            Ok(())
        }
    }

    fn envelope_with_retries(retries: u32) -> Envelope<String> {
        let mut envelope = Envelope::new("hello".to_string());
        envelope.retries = retries;
        envelope
    }

    #[tokio::test]
    async fn ceiling_rejects_without_invoking_handler_or_publisher() {
        let publisher = RecordingPublisher::default();
        let mut processor = Processor::new(publisher.clone(), ProcessorConfig::default());
        let handled = Arc::new(AtomicBool::new(false));

        let flag = handled.clone();
        let result = processor
            .process(envelope_with_retries(MAX_RETRIES), |_| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::MaxRetriesExceeded)));
        assert!(!handled.load(Ordering::SeqCst));
        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_republishes_with_incremented_retries() {
        let publisher = RecordingPublisher::default();
        let mut processor = Processor::new(publisher.clone(), ProcessorConfig::default());

        let result = processor
            .process(envelope_with_retries(0), |_| async {
                Err::<(), BoxError>("boom".into())
            })
            .await;

        assert!(result.is_ok());
        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].retries, 1);
        assert_eq!(published[0].payload, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn ninth_retry_republishes_at_the_ceiling() {
        let publisher = RecordingPublisher::default();
        let mut processor = Processor::new(publisher.clone(), ProcessorConfig::default());

        processor
            .process(envelope_with_retries(9), |_| async {
                Err::<(), BoxError>("boom".into())
            })
            .await
            .unwrap();

        assert_eq!(publisher.published.lock().unwrap()[0].retries, MAX_RETRIES);

        // The republished copy is now rejected outright.
        let result = processor
            .process(envelope_with_retries(MAX_RETRIES), |_| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(Error::MaxRetriesExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn publish_error_is_surfaced() {
        let publisher = RecordingPublisher::default();
        publisher.fail.store(true, Ordering::SeqCst);
        let mut processor = Processor::new(publisher, ProcessorConfig::default());

        let result = processor
            .process(envelope_with_retries(0), |_| async {
                Err::<(), BoxError>("boom".into())
            })
            .await;

        assert!(matches!(result, Err(Error::Handler(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn spent_elapsed_budget_resets_and_proceeds_without_delay() {
        let publisher = RecordingPublisher::default();
        let mut processor = Processor::new(
            publisher.clone(),
            ProcessorConfig {
                max_interval: None,
                max_elapsed_time: Some(Duration::ZERO),
            },
        );

        // The elapsed-time budget is already spent, so the generator yields
        // nothing. The attempt must still run, with no delay, and start a
        // fresh curve.
        let handled = Arc::new(AtomicBool::new(false));
        let flag = handled.clone();
        processor
            .process(envelope_with_retries(0), |_| async move {
                flag.store(true, Ordering::SeqCst);
                Err::<(), BoxError>("boom".into())
            })
            .await
            .unwrap();

        assert!(handled.load(Ordering::SeqCst));
        assert_eq!(publisher.published.lock().unwrap()[0].retries, 1);
        assert_eq!(
            processor.backoff.current_interval,
            processor.backoff.initial_interval
        );
    }

    #[tokio::test]
    async fn success_resets_the_backoff_generator() {
        let publisher = RecordingPublisher::default();
        let mut processor = Processor::new(publisher.clone(), ProcessorConfig::default());

        // Advance the generator past its initial interval.
        let _ = processor.backoff.next_backoff();
        let _ = processor.backoff.next_backoff();

        processor
            .process(envelope_with_retries(0), |payload| async move {
                assert_eq!(payload, "hello");
                Ok(())
            })
            .await
            .unwrap();

        assert!(publisher.published.lock().unwrap().is_empty());
        assert_eq!(
            processor.backoff.current_interval,
            processor.backoff.initial_interval
        );
    }

    #[test]
    fn backoff_is_monotonic_up_to_the_max_interval() {
        let mut backoff = backoff::ExponentialBackoffBuilder::new()
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        let mut previous = Duration::ZERO;
        for _ in 0..32 {
            let next = backoff.next_backoff().unwrap();
            assert!(next >= previous);
            assert!(next <= backoff.max_interval);
            previous = next;
        }
        assert_eq!(previous, backoff.max_interval);
    }

    #[test]
    fn config_overrides_apply() {
        let publisher = RecordingPublisher::default();
        let processor = Processor::new(
            publisher,
            ProcessorConfig {
                max_interval: Some(Duration::from_secs(5)),
                max_elapsed_time: Some(Duration::from_secs(30)),
            },
        );

        assert_eq!(processor.backoff.max_interval, Duration::from_secs(5));
        assert_eq!(
            processor.backoff.max_elapsed_time,
            Some(Duration::from_secs(30))
        );
    }
}
