use std::sync::Arc;

use tokio::sync::watch::{Receiver, Sender};

/// Broadcasts the end of a run to every worker, timer and background task.
///
/// The signal is level-triggered: listeners created after [ShutdownHandle::shutdown] has been
/// called observe the shutdown immediately.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(tokio::sync::watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        if !self.sender.send_replace(true) {
            log::debug!("Shutdown signal raised");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been raised. If this returns true then work
    /// should be stopped so that the run can finish.
    pub fn should_shutdown(&mut self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the shutdown signal. It is safe to race this with another future so that the
    /// shutdown signal can be used to cancel other work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        // An error means the handle was dropped, which can only happen once the run is over.
        let _ = self.receiver.wait_for(|shutdown| *shutdown).await;
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Iteration cancelled by shutdown signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_listener_sees_shutdown() {
        let handle = ShutdownHandle::new();
        let mut early = handle.new_listener();
        assert!(!early.should_shutdown());

        handle.shutdown();

        let mut late = handle.new_listener();
        assert!(early.should_shutdown());
        assert!(late.should_shutdown());
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn wait_for_shutdown_wakes_up() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let waiter = tokio::spawn(async move {
            listener.wait_for_shutdown().await;
        });

        handle.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("listener should wake up")
            .unwrap();
    }
}
