use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving half of a live subscription.
///
/// Closing is synchronous and final: once [`RowStream::close`] returns (or
/// the stream is dropped), `next()` yields `None` and the producer observes
/// the cancellation.
pub struct RowStream<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
}

/// Producing half handed to whatever pumps rows into a [`RowStream`].
pub struct RowSender<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T> Clone for RowSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Create a bounded subscription pipe.
pub fn row_stream<T>(capacity: usize) -> (RowSender<T>, RowStream<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    (
        RowSender { tx, cancel: cancel.clone() },
        RowStream { rx, cancel },
    )
}

impl<T> RowStream<T> {
    pub async fn next(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    pub fn close(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this stream; lets an owner close it after the
    /// stream itself has moved into a listener task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<T> Drop for RowStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T> RowSender<T> {
    /// Deliver one row. Returns `false` once the stream is closed.
    pub async fn send(&self, item: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}
