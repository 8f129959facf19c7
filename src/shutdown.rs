use std::future::Future;
use tokio::sync::watch;

/// Fires once; every clone of the paired [`Shutdown`] observes it.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cooperative cancellation signal checked by workers and probe steps.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A signal that never fires.
    #[cfg(test)]
    pub fn never() -> Self {
        channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the trigger fires. Pends forever if the trigger was
    /// dropped without firing.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless shutdown fires first; `None` means it was abandoned
    /// and dropped, releasing whatever sockets it held.
    pub async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_triggered() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.triggered() => None,
            out = fut => Some(out),
        }
    }
}
