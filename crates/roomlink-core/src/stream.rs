// ── Registry snapshot streams ──
//
// Subscription handle for consumers that redraw or re-export the fleet
// whenever the registry changes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::DeviceRecord;

/// Every record in the registry at one point in time.
pub type DeviceSnapshot = Arc<Vec<Arc<DeviceRecord>>>;

/// A subscription to the registry's records.
///
/// Snapshots are published after a mutation completes, so a snapshot
/// never shows one side of a leader/follower link without the other.
pub struct DeviceStream {
    current: DeviceSnapshot,
    receiver: watch::Receiver<DeviceSnapshot>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<DeviceSnapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation time or by the last `changed()`.
    pub fn current(&self) -> &DeviceSnapshot {
        &self.current
    }

    pub fn latest(&self) -> DeviceSnapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the registry has been dropped.
    pub async fn changed(&mut self) -> Option<DeviceSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot per registry mutation.
pub struct DeviceWatchStream {
    inner: WatchStream<DeviceSnapshot>,
}

impl Stream for DeviceWatchStream {
    type Item = DeviceSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;
    use crate::model::{DeviceId, Role};

    fn snapshot(ids: &[&str]) -> DeviceSnapshot {
        Arc::new(
            ids.iter()
                .map(|id| {
                    Arc::new(DeviceRecord::new(
                        DeviceId::device(*id),
                        (*id).into(),
                        Role::Solo,
                    ))
                })
                .collect(),
        )
    }

    #[test]
    fn stream_yields_current_then_each_publish() {
        let (tx, rx) = watch::channel(snapshot(&[]));
        let mut stream = task::spawn(DeviceStream::new(rx).into_stream());

        let first = assert_ready!(stream.poll_next()).unwrap();
        assert!(first.is_empty());
        assert_pending!(stream.poll_next());

        tx.send(snapshot(&["u1"])).unwrap();
        assert!(stream.is_woken());
        let next = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(next.len(), 1);

        drop(tx);
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[tokio::test]
    async fn changed_refreshes_current() {
        let (tx, rx) = watch::channel(snapshot(&[]));
        let mut stream = DeviceStream::new(rx);
        assert!(stream.current().is_empty());

        tx.send(snapshot(&["u1", "u2"])).unwrap();
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(stream.current().len(), 2);
        assert_eq!(stream.latest().len(), 2);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }
}
