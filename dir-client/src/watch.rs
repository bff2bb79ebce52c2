//! Cursor-continuing change stream over a directory.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::Error;
use crate::node::ChangeEvent;
use crate::store::{Store, WatchOptions};

/// Pause before re-establishing a store watch that ended cleanly without
/// delivering anything.
const IDLE_RESTART_DELAY: Duration = Duration::from_millis(100);

/// Every change beneath a directory, in store order.
///
/// The stream re-establishes the store watch whenever it ends or the
/// store reports that the cursor fell out of its history, so it only
/// finishes after yielding a terminal error. Dropping it stops watching.
pub struct WatchStream {
    events: Pin<Box<dyn Stream<Item = Result<ChangeEvent, Error>> + Send>>,
    cursor: Arc<AtomicU64>,
}

impl WatchStream {
    pub(crate) fn new<S>(store: Arc<S>, directory: String, after_revision: u64) -> Self
    where
        S: Store + 'static,
    {
        let cursor = Arc::new(AtomicU64::new(after_revision));
        let events = Box::pin(run(store, directory, Arc::clone(&cursor)));
        Self { events, cursor }
    }

    /// The revision of the last delivered change, or the starting
    /// revision if nothing has been delivered yet.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl Stream for WatchStream {
    type Item = Result<ChangeEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

fn run<S>(
    store: Arc<S>,
    directory: String,
    cursor: Arc<AtomicU64>,
) -> impl Stream<Item = Result<ChangeEvent, Error>> + Send
where
    S: Store + 'static,
{
    async_stream::stream! {
        // Cursor of the last attempt that hit an expired history.
        let mut expired_at: Option<u64> = None;

        loop {
            let after_revision = cursor.load(Ordering::SeqCst);
            let options = WatchOptions {
                recursive: true,
                after_revision,
            };

            let mut delivered = false;
            let failure = match store.watch(&directory, options).await {
                Ok(mut events) => {
                    let mut failure = None;
                    while let Some(event) = events.next().await {
                        match event {
                            Ok(response) => {
                                delivered = true;
                                expired_at = None;
                                cursor.fetch_max(response.revision, Ordering::SeqCst);
                                yield Ok(ChangeEvent::from(response));
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    failure
                }
                Err(e) => Some(e),
            };

            match failure {
                None => {
                    debug!(directory = %directory, after_revision, "watch ended, re-establishing");
                    if !delivered {
                        tokio::time::sleep(IDLE_RESTART_DELAY).await;
                    }
                }
                Some(Error::HistoryExpired { compacted, current, .. }) => {
                    let cursor_now = cursor.load(Ordering::SeqCst);
                    if expired_at == Some(cursor_now) {
                        // Resume from the oldest retained change; only a store
                        // that does not report it forces a jump to its head.
                        let to = if compacted > cursor_now { compacted } else { current };
                        warn!(
                            directory = %directory,
                            from = cursor_now,
                            to,
                            "watch cursor fell out of store history, skipping ahead"
                        );
                        cursor.fetch_max(to, Ordering::SeqCst);
                        expired_at = None;
                    } else {
                        debug!(directory = %directory, after_revision = cursor_now, "watch history expired, retrying");
                        expired_at = Some(cursor_now);
                    }
                }
                Some(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    }
}
