use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::api;
use crate::domain::{AppError, ProgressEvent, TaskStatus};

/// Wraps a raw progress subscription so that it:
/// - fails with `Timeout` when no event arrives within `watchdog`,
/// - never reports a lower percentage than one already reported,
/// - ends right after the first terminal event or error,
/// - fails if the channel closes before a terminal event.
pub fn watch_progress(
    events: BoxStream<'static, api::Result<ProgressEvent>>,
    watchdog: Option<Duration>,
) -> BoxStream<'static, Result<ProgressEvent, AppError>> {
    stream::unfold(
        WatchState::Open {
            events,
            last_progress: 0,
        },
        move |state| async move {
            let WatchState::Open {
                mut events,
                last_progress,
            } = state
            else {
                return None;
            };

            let next = match watchdog {
                Some(limit) => match tokio::time::timeout(limit, events.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(?limit, "progress stream went silent");
                        return Some((Err(AppError::Timeout(limit)), WatchState::Closed));
                    }
                },
                None => events.next().await,
            };

            match next {
                Some(Ok(mut event)) if event.status.is_terminal() => {
                    if event.status == TaskStatus::Finished {
                        event.progress = event.progress.max(last_progress);
                    }
                    Some((Ok(event), WatchState::Closed))
                }
                Some(Ok(mut event)) => {
                    if event.progress < last_progress {
                        debug!(
                            received = event.progress,
                            last_progress, "clamping regressed progress"
                        );
                        event.progress = last_progress;
                    }
                    let last_progress = event.progress;
                    Some((
                        Ok(event),
                        WatchState::Open {
                            events,
                            last_progress,
                        },
                    ))
                }
                Some(Err(e)) => Some((Err(e.into()), WatchState::Closed)),
                None => Some((
                    Err(AppError::Upstream(
                        "progress stream closed before the task finished".to_string(),
                    )),
                    WatchState::Closed,
                )),
            }
        },
    )
    .boxed()
}

enum WatchState {
    Open {
        events: BoxStream<'static, api::Result<ProgressEvent>>,
        last_progress: u8,
    },
    Closed,
}
