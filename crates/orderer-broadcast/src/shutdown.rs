//! Shutdown signalling shared by the server and the in-memory transport.

use tokio::sync::watch;

/// Resolves once the flag is true. A dropped sender never resolves.
pub(crate) async fn signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolves_when_flag_flips() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { signalled(&mut rx).await });

        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_never_resolves() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);

        let result = tokio::time::timeout(Duration::from_millis(20), signalled(&mut rx)).await;
        assert!(result.is_err());
    }
}
