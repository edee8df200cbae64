use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Custom spawn function.
pub type SpawnFn = Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>;

/// Where continuation work of lazy outcomes runs.
#[derive(Clone)]
pub enum Executor {
    /// Spawned on a tokio runtime
    Tokio(Handle),
    /// Driven to completion on the calling thread
    Inline,
    Custom(SpawnFn),
}

impl Executor {
    /// The ambient tokio runtime when called inside one, [`Executor::Inline`]
    /// otherwise.
    #[must_use]
    pub fn current() -> Self {
        Handle::try_current().map_or(Self::Inline, Self::Tokio)
    }

    /// Whether this is a tokio runtime with a single scheduler thread. Work
    /// spawned there makes no progress while that thread is blocked.
    #[must_use]
    pub fn is_current_thread(&self) -> bool {
        matches!(self, Self::Tokio(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread)
    }

    pub fn custom<F>(spawn: F) -> Self
    where
        F: Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(spawn))
    }

    /// Runs `task` according to this executor. Inline execution blocks the
    /// calling thread until the task finishes.
    pub fn spawn(&self, task: BoxFuture<'static, ()>) {
        match self {
            Self::Tokio(handle) => {
                drop(handle.spawn(task));
            }
            Self::Inline => futures::executor::block_on(task),
            Self::Custom(spawn) => spawn(task),
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokio(_) => f.write_str("Executor::Tokio"),
            Self::Inline => f.write_str("Executor::Inline"),
            Self::Custom(_) => f.write_str("Executor::Custom"),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_current_outside_runtime_is_inline() {
        assert!(matches!(Executor::current(), Executor::Inline));
    }

    #[tokio::test]
    async fn test_current_inside_runtime_is_tokio() {
        let executor = Executor::current();
        assert!(matches!(executor, Executor::Tokio(_)));
        assert!(executor.is_current_thread());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_multi_thread_runtime_is_not_current_thread() {
        assert!(!Executor::current().is_current_thread());
        assert!(!Executor::Inline.is_current_thread());
    }

    #[test]
    fn test_inline_and_custom_run_task() {
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        Executor::Inline.spawn(
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let spawned = Arc::new(AtomicUsize::new(0));
        let s = spawned.clone();
        let executor = Executor::custom(move |task| {
            s.fetch_add(1, Ordering::SeqCst);
            futures::executor::block_on(task);
        });
        let c = counter.clone();
        executor.spawn(
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
