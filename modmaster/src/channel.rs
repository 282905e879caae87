use crate::error::Shutdown;

/// wrap a Tokio receiver and only provide a recv() that returns a Result<T, Shutdown>
/// that makes it harder to misuse.
pub(crate) struct Receiver<T>(tokio::sync::mpsc::Receiver<T>);

impl<T> From<tokio::sync::mpsc::Receiver<T>> for Receiver<T> {
    fn from(value: tokio::sync::mpsc::Receiver<T>) -> Self {
        Self(value)
    }
}

impl<T> Receiver<T> {
    pub(crate) async fn recv(&mut self) -> Result<T, Shutdown> {
        self.0.recv().await.ok_or(Shutdown)
    }

    /// Close the channel so senders fail fast, then take everything still buffered
    pub(crate) fn close_and_drain(&mut self) -> Vec<T> {
        self.0.close();
        let mut remaining = Vec::new();
        while let Ok(x) = self.0.try_recv() {
            remaining.push(x);
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_reports_shutdown_when_senders_are_dropped() {
        let (tx, rx) = tokio::sync::mpsc::channel::<u8>(4);
        let mut rx: Receiver<u8> = rx.into();
        tx.send(1).await.unwrap();
        drop(tx);
        assert_eq!(rx.recv().await, Ok(1));
        assert_eq!(rx.recv().await, Err(Shutdown));
    }

    #[tokio::test]
    async fn drain_returns_buffered_values_and_rejects_new_ones() {
        let (tx, rx) = tokio::sync::mpsc::channel::<u8>(4);
        let mut rx: Receiver<u8> = rx.into();
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert_eq!(rx.close_and_drain(), vec![1, 2]);
        assert!(tx.try_send(3).is_err());
    }
}
