// src/shutdown.rs
use tokio::sync::watch;

pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves once the flag flips to `true`. Pends forever if the sender is gone
/// without signalling.
pub async fn signalled(rx: &mut watch::Receiver<bool>) {
    let res = rx.wait_for(|stop| *stop).await.map(|_| ());
    if res.is_err() {
        std::future::pending::<()>().await;
    }
}
