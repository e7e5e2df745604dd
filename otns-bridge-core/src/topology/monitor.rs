use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use super::TopologyManager;
use crate::command::CommandChannel;

/// Live feed of one source of lines into a manager.
///
/// Dropping a subscription leaves the feed running; call
/// [`Subscription::unsubscribe`] to stop it.
#[derive(Debug)]
pub struct Subscription {
    source: String,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Handle for stopping the feed without consuming the subscription
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    /// Stops feeding lines; nodes already registered stay registered
    pub fn unsubscribe(self) {
        debug!("Unsubscribing from {}", self.source);
        self.handle.abort();
    }

    /// Waits until the source is exhausted
    pub async fn join(self) -> Result<()> {
        match self.handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<C: CommandChannel + 'static> TopologyManager<C> {
    /// Feeds every line read from a device's output into the manager,
    /// stamping each with the local wall clock.
    pub fn subscribe<R>(self: &Arc<Self>, device: &str, reader: R) -> Subscription
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let manager = Arc::clone(self);
        let name = device.to_string();
        let source = name.clone();

        let handle = tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        manager
                            .route(&name, line.trim_end(), Local::now().naive_local())
                            .await
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed reading output of {name}: {e}");
                        break;
                    }
                }
            }
            debug!("Output of {name} closed");
        });

        Subscription { source, handle }
    }

    /// Follows a combined log as it is written, dispatching every line in
    /// the harness format without pacing.
    pub fn follow<R>(self: &Arc<Self>, source: &str, reader: R) -> Subscription
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let manager = Arc::clone(self);
        let name = source.to_string();

        let handle = tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(entry) = manager.interpreter().parse_log_line(&line) {
                            manager
                                .dispatch(&entry.entity, &entry.message, entry.timestamp)
                                .await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed reading {name}: {e}");
                        break;
                    }
                }
            }
        });

        Subscription {
            source: source.to_string(),
            handle,
        }
    }
}
