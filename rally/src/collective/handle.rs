use crate::error::{RallyError, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pending result of a collective operation.
///
/// The operation runs in its own task, so it makes progress whether or not
/// the handle is polled. Dropping the handle detaches the task; the other
/// participants are not affected.
pub struct CollectiveHandle<T> {
    inner: HandleInner<T>,
}

enum HandleInner<T> {
    Ready(Option<Result<T>>),
    Pending(JoinHandle<Result<T>>),
}

impl<T: Send + 'static> CollectiveHandle<T> {
    pub(crate) fn spawn(fut: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        Self {
            inner: HandleInner::Pending(tokio::spawn(fut)),
        }
    }
}

impl<T> CollectiveHandle<T> {
    /// A handle that resolves to `err` without having communicated.
    pub(crate) fn failed(err: RallyError) -> Self {
        Self {
            inner: HandleInner::Ready(Some(Err(err))),
        }
    }

    /// Whether the result is available without waiting.
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            HandleInner::Ready(_) => true,
            HandleInner::Pending(task) => task.is_finished(),
        }
    }

    /// Wait for the result.
    pub async fn wait(self) -> Result<T> {
        self.await
    }

    /// Wait at most `timeout` for the result.
    ///
    /// On expiry the operation keeps running in the background; only this
    /// wait gives up.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(RallyError::WaitTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl<T> Unpin for CollectiveHandle<T> {}

impl<T> Future for CollectiveHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            HandleInner::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(RallyError::TaskFailed("handle polled after completion".into()))),
            ),
            HandleInner::Pending(task) => match Pin::new(task).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(e)) => Poll::Ready(Err(RallyError::TaskFailed(e.to_string()))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// A set of handles awaited together, e.g. one per generation.
pub struct CollectiveGroup<T> {
    handles: Vec<CollectiveHandle<T>>,
}

impl<T> CollectiveGroup<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: CollectiveHandle<T>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every handle; results keep the order of `push`.
    pub async fn wait_all(self) -> Result<Vec<T>> {
        futures::future::try_join_all(self.handles).await
    }
}

impl<T> Default for CollectiveGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<CollectiveHandle<T>> for CollectiveGroup<T> {
    fn from_iter<I: IntoIterator<Item = CollectiveHandle<T>>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}
