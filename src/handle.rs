use crate::membership::View;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;

/// Observes the views installed by a [`Membership`](crate::Membership).
#[derive(Debug, Clone)]
pub struct Handle {
    view_rx: watch::Receiver<Option<Arc<View>>>,
}

impl Handle {
    pub(crate) fn new(view_rx: watch::Receiver<Option<Arc<View>>>) -> Self {
        Handle { view_rx }
    }

    /// The installed view, without waiting.
    pub fn view(&self) -> Option<Arc<View>> {
        self.view_rx.borrow().clone()
    }

    /// Wait for a view newer than the last one seen through this handle.
    ///
    /// Views installed in quick succession may be skipped, only the latest is
    /// returned. `None` once the engine is gone.
    pub async fn next_view(&mut self) -> Option<Arc<View>> {
        loop {
            self.view_rx.changed().await.ok()?;

            if let Some(view) = self.view_rx.borrow_and_update().clone() {
                return Some(view);
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<View>> {
        futures::stream::unfold(self, |mut handle| async move {
            let view = handle.next_view().await?;
            Some((view, handle))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::view_of;
    use futures::StreamExt;

    #[test]
    fn unpin() {
        fn assert_unpin<T: Unpin>(_: T) {}

        let (_tx, rx) = watch::channel(None);

        assert_unpin(Handle::new(rx));
    }

    #[tokio::test]
    async fn sees_latest_view() {
        let (tx, rx) = watch::channel(None);
        let mut handle = Handle::new(rx);
        assert!(handle.view().is_none());

        tx.send_replace(Some(Arc::new(view_of(1, &[1]))));
        tx.send_replace(Some(Arc::new(view_of(2, &[1, 2]))));

        let view = handle.next_view().await.unwrap();
        assert_eq!(view.view_id(), 2);
        assert_eq!(handle.view().unwrap().view_id(), 2);
    }

    #[tokio::test]
    async fn stream_ends_with_engine() {
        let (tx, rx) = watch::channel(None);
        let mut views = Box::pin(Handle::new(rx).into_stream());

        tx.send_replace(Some(Arc::new(view_of(3, &[1]))));
        assert_eq!(views.next().await.unwrap().view_id(), 3);

        drop(tx);
        assert!(views.next().await.is_none());
    }
}
