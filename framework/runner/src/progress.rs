use std::cmp::min;
use std::fmt::Write;
use std::time::{Duration, Instant};

use delivery_tunnel_core::prelude::DelegatedShutdownListener;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar while the run is dispatching work, showing how long is left.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    mut shutdown_listener: DelegatedShutdownListener,
) {
    let spawned = std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());

            let total = planned_runtime.as_secs();
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}]",
            )
            .map(|style| {
                style
                    .with_key(
                        "planned_runtime",
                        move |_state: &ProgressState, w: &mut dyn Write| {
                            let _ = write!(
                                w,
                                "{:02}:{:02}:{:02}",
                                total / 3600,
                                (total % 3600) / 60,
                                total % 60
                            );
                        },
                    )
                    .progress_chars("#>-")
            });
            match style {
                Ok(style) => pb.set_style(style),
                Err(e) => log::debug!("Using the default progress style: {e}"),
            }

            loop {
                if shutdown_listener.should_shutdown() || start_time.elapsed() >= planned_runtime
                {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                pb.set_position(min(start_time.elapsed().as_secs(), total));
                std::thread::sleep(Duration::from_millis(500));
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread: {e}");
    }
}
