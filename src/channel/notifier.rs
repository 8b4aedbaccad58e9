//! Coalesces bursts of index invalidations into single channel events.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use super::debounce::{DebounceAction, DebounceEvent, DebounceState, transition};
use super::{ServerChannel, ServerEvent};
use crate::config::FileWatchConfig;

type EmitFn = dyn Fn() + Send + Sync;

/// Debounced emitter of `storyIndexInvalidated`.
///
/// Cheap to clone; clones share one debounce state.
#[derive(Clone)]
pub struct InvalidationNotifier {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<DebounceState>,
    window: Duration,
    trailing: bool,
    emit: Box<EmitFn>,
}

impl InvalidationNotifier {
    /// Notifier emitting `ServerEvent::StoryIndexInvalidated` on `channel`.
    pub fn new(channel: ServerChannel, config: &FileWatchConfig) -> Self {
        Self::with_action(
            Duration::from_millis(config.debounce_ms),
            config.trailing,
            move || {
                channel.emit(ServerEvent::StoryIndexInvalidated);
            },
        )
    }

    /// Notifier wrapping an arbitrary emit action.
    pub fn with_action(
        window: Duration,
        trailing: bool,
        emit: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DebounceState::Idle),
                window,
                trailing,
                emit: Box::new(emit),
            }),
        }
    }

    /// Record an invalidation. Emits now or not at all, unless trailing
    /// emissions are enabled.
    pub fn notify(&self) {
        self.apply(DebounceEvent::Call);
    }

    fn apply(&self, event: DebounceEvent) {
        let action = {
            let mut state = self.inner.state.lock();
            let (next, action) = transition(
                *state,
                event,
                Instant::now(),
                self.inner.window,
                self.inner.trailing,
            );
            *state = next;
            action
        };

        match action {
            Some(DebounceAction::Emit) => (self.inner.emit)(),
            Some(DebounceAction::Schedule(deadline)) => self.schedule(deadline),
            None => crate::debug_event!("notifier", "suppressed"),
        }
    }

    fn schedule(&self, deadline: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("[notifier] no runtime for trailing emission, dropping it");
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            notifier.apply(DebounceEvent::Deadline);
        });
    }
}

impl std::fmt::Debug for InvalidationNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationNotifier")
            .field("state", &*self.inner.state.lock())
            .field("window", &self.inner.window)
            .field("trailing", &self.inner.trailing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn counting(trailing: bool) -> (InvalidationNotifier, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let notifier = InvalidationNotifier::with_action(
            Duration::from_millis(100),
            trailing,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        (notifier, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_emits_once() {
        let (notifier, count) = counting(false);

        for _ in 0..5 {
            notifier.notify();
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(500)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_each_emit() {
        let (notifier, count) = counting(false);

        for _ in 0..4 {
            notifier.notify();
            sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_emission_after_window() {
        let (notifier, count) = counting(true);

        notifier.notify();
        sleep(Duration::from_millis(10)).await;
        notifier.notify();
        notifier.notify();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_on_channel() {
        let channel = ServerChannel::new(8);
        let mut receiver = channel.subscribe();
        let notifier = InvalidationNotifier::new(channel, &FileWatchConfig::default());

        notifier.notify();
        notifier.notify();

        assert_eq!(
            receiver.recv().await.unwrap(),
            ServerEvent::StoryIndexInvalidated
        );
        assert!(receiver.try_recv().is_err());
    }
}
