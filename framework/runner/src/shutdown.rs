use delivery_tunnel_core::prelude::ShutdownHandle;
use tokio::signal;

/// Raise the shutdown signal when the process receives Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => log::warn!("Unable to listen for Ctrl-C, interrupting the run is disabled: {e}"),
        }
    });

    handle
}
