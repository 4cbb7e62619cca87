//! Ledger event listener.
//!
//! Consumes a stream of transport frames, decodes each one and hands
//! IM-created events to the handler on a spawned task. A semaphore caps
//! how many handler invocations run at once; when the cap is reached the
//! listener stops reading until a slot frees up.
//!
//! The listener does not reconnect. A transport error ends it, and so
//! does a fatal error reported by a handler.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

use super::{decode_frame, EventHandler, Frame, HandlerError, LedgerEvent, StreamError};

/// Default cap on concurrently running handler invocations.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Why the listener stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("Event stream failed: {0}")]
    Transport(#[from] StreamError),

    #[error("Handler reported a fatal error: {0}")]
    Fatal(String),
}

/// Counters reported when the stream ends cleanly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    pub frames: u64,
    pub dispatched: u64,
    pub ignored: u64,
    pub malformed: u64,
    /// Handler tasks that panicked.
    pub handler_failures: u64,
}

/// Long-lived consumer of the ledger event stream.
pub struct EventListener {
    handler: Arc<dyn EventHandler>,
    permits: Arc<Semaphore>,
}

enum Next {
    Frame(Option<Result<Frame, StreamError>>),
    Completed(Result<Result<(), HandlerError>, JoinError>),
}

impl EventListener {
    pub fn new(handler: Arc<dyn EventHandler>, max_in_flight: usize) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Run until the stream ends, the transport fails, or a handler fails fatally.
    ///
    /// In-flight invocations are awaited before returning on stream end
    /// or transport failure; on a fatal handler error they are aborted.
    pub async fn run<S>(&self, frames: S) -> Result<ListenerStats, ListenerError>
    where
        S: Stream<Item = Result<Frame, StreamError>>,
    {
        let mut frames = std::pin::pin!(frames);
        let mut in_flight: JoinSet<Result<(), HandlerError>> = JoinSet::new();
        let mut stats = ListenerStats::default();

        info!("Ledger event listener started");

        let outcome = loop {
            let next = tokio::select! {
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => Next::Completed(joined),
                frame = frames.next() => Next::Frame(frame),
            };

            match next {
                Next::Completed(joined) => Self::on_completion(joined, &mut stats)?,
                Next::Frame(None) => {
                    info!("Ledger event stream ended");
                    break Ok(());
                }
                Next::Frame(Some(Err(e))) => {
                    error!(error = %e, "Ledger event stream failed");
                    break Err(ListenerError::Transport(e));
                }
                Next::Frame(Some(Ok(frame))) => {
                    stats.frames += 1;
                    self.on_frame(frame, &mut in_flight, &mut stats).await;
                }
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            Self::on_completion(joined, &mut stats)?;
        }

        outcome.map(|()| stats)
    }

    async fn on_frame(
        &self,
        frame: Frame,
        in_flight: &mut JoinSet<Result<(), HandlerError>>,
        stats: &mut ListenerStats,
    ) {
        let event = match decode_frame(&frame) {
            Ok(event) => event,
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, "Dropping malformed ledger frame");
                return;
            }
        };

        let im_id = match &event {
            LedgerEvent::ImCreated { im_id } => im_id.clone(),
            LedgerEvent::Other { class } => {
                stats.ignored += 1;
                trace!(class = %class, "Ignoring ledger event");
                return;
            }
        };

        // closed only if the semaphore is dropped, which cannot happen while we hold it
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };

        debug!(im_id = %im_id, "Dispatching IM created event");
        stats.dispatched += 1;
        let work = self.handler.handle(event);
        in_flight.spawn(async move {
            let _permit = permit;
            work.await
        });
    }

    fn on_completion(
        joined: Result<Result<(), HandlerError>, JoinError>,
        stats: &mut ListenerStats,
    ) -> Result<(), ListenerError> {
        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(HandlerError::Fatal(message))) => {
                error!(error = %message, "Handler failed fatally, stopping listener");
                Err(ListenerError::Fatal(message))
            }
            Err(e) => {
                stats.handler_failures += 1;
                error!(error = %e, "Handler task panicked or was cancelled");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records IM ids and tracks peak concurrency.
    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        fatal_on: Option<String>,
    }

    impl RecordingHandler {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }
    }

    impl EventHandler for Arc<RecordingHandler> {
        fn handle(&self, event: LedgerEvent) -> BoxFuture<'static, Result<(), HandlerError>> {
            let this = self.clone();
            Box::pin(async move {
                let LedgerEvent::ImCreated { im_id } = event else {
                    return Ok(());
                };
                let now = this.running.fetch_add(1, Ordering::SeqCst) + 1;
                this.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(this.delay).await;
                this.running.fetch_sub(1, Ordering::SeqCst);

                this.seen.lock().unwrap().push(im_id.clone());
                if this.fatal_on.as_deref() == Some(im_id.as_str()) {
                    return Err(HandlerError::Fatal(format!("cannot publish for {}", im_id)));
                }
                Ok(())
            })
        }
    }

    fn im_created(id: &str) -> Result<Frame, StreamError> {
        Ok(Frame::Text(format!(
            r#"{{"$class":"org.sysu.wf.IMCreatedEvent","id":"{}"}}"#,
            id
        )))
    }

    fn listener(handler: &Arc<RecordingHandler>, max_in_flight: usize) -> EventListener {
        EventListener::new(Arc::new(handler.clone()), max_in_flight)
    }

    #[tokio::test]
    async fn test_dispatches_im_created_and_skips_the_rest() {
        let handler = Arc::new(RecordingHandler::default());
        let frames = futures::stream::iter(vec![
            im_created("im-1"),
            Ok(Frame::Text("garbage".to_string())),
            Ok(Frame::Text(r#"{"$class":"org.sysu.wf.Other","id":"x"}"#.to_string())),
            im_created("im-2"),
        ]);

        let stats = listener(&handler, 4).run(frames).await.unwrap();

        let mut seen = handler.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["im-1".to_string(), "im-2".to_string()]);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.ignored, 1);
    }

    #[tokio::test]
    async fn test_transport_error_ends_listener_after_draining() {
        let handler = Arc::new(RecordingHandler::with_delay(Duration::from_millis(20)));
        let frames = futures::stream::iter(vec![
            im_created("im-1"),
            Err(StreamError::Transport("connection reset".to_string())),
            im_created("never-read"),
        ]);

        let result = listener(&handler, 4).run(frames).await;

        assert_eq!(
            result,
            Err(ListenerError::Transport(StreamError::Transport(
                "connection reset".to_string()
            )))
        );
        assert_eq!(*handler.seen.lock().unwrap(), vec!["im-1".to_string()]);
    }

    #[tokio::test]
    async fn test_fatal_handler_error_stops_listener() {
        let handler = Arc::new(RecordingHandler {
            fatal_on: Some("im-bad".to_string()),
            ..Default::default()
        });
        let frames = futures::stream::iter(vec![im_created("im-bad")]);

        let result = listener(&handler, 4).run(frames).await;

        assert!(matches!(result, Err(ListenerError::Fatal(msg)) if msg.contains("im-bad")));
    }

    #[tokio::test]
    async fn test_in_flight_cap_is_respected() {
        let handler = Arc::new(RecordingHandler::with_delay(Duration::from_millis(20)));
        let frames = futures::stream::iter((0..12).map(|i| im_created(&format!("im-{}", i))));

        let stats = listener(&handler, 3).run(frames).await.unwrap();

        assert_eq!(stats.dispatched, 12);
        assert_eq!(handler.seen.lock().unwrap().len(), 12);
        assert!(handler.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_invocations_overlap() {
        let handler = Arc::new(RecordingHandler::with_delay(Duration::from_millis(50)));
        let frames = futures::stream::iter((0..4).map(|i| im_created(&format!("im-{}", i))));

        listener(&handler, 8).run(frames).await.unwrap();

        assert!(handler.peak.load(Ordering::SeqCst) > 1);
    }
}
