//! Replays a recorded harness log through a [`TopologyManager`]
//!
//! Lines are paced by the difference between consecutive log timestamps,
//! scaled by the replay speed. The sleep between lines is the only point
//! where a replay waits, which keeps a run deterministic under a paused
//! tokio clock.

use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strum::Display;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::command::CommandChannel;
use crate::topology::TopologyManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
pub enum ReplayState {
    #[default]
    Idle,
    Reading,
    /// Halted by the stop pattern or cancellation
    Stopped,
    /// Input exhausted
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayOutcome {
    /// Offset to pass as `start_line` to resume after this run
    pub last_line: usize,
    pub state: ReplayState,
    /// Lines that parsed and were handed to the manager
    pub dispatched: usize,
}

type LineObserver = Box<dyn FnMut(usize, &str) + Send>;

pub struct Replayer<C> {
    manager: Arc<TopologyManager<C>>,
    speed: f64,
    state: ReplayState,
    last_time: Option<NaiveDateTime>,
    cancel: Arc<AtomicBool>,
    observer: Option<LineObserver>,
}

impl<C: CommandChannel> Replayer<C> {
    /// Creates a replayer; `speed` 2.0 plays twice as fast as recorded.
    pub fn new(manager: Arc<TopologyManager<C>>, speed: f64) -> Result<Self> {
        ensure!(
            speed.is_finite() && speed > 0.0,
            "Replay speed must be a positive number, got {speed}"
        );
        Ok(Self {
            manager,
            speed,
            state: ReplayState::Idle,
            last_time: None,
            cancel: Arc::new(AtomicBool::new(false)),
            observer: None,
        })
    }

    /// Calls `observer` with the index and text of every line read
    pub fn with_observer(mut self, observer: impl FnMut(usize, &str) + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn manager(&self) -> &Arc<TopologyManager<C>> {
        &self.manager
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Flag that stops the replay before the next line once set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Tells the visualizer how fast the replay runs
    pub async fn announce_speed(&self) {
        self.manager.replay_speed(self.speed).await;
    }

    /// Replays lines from `reader`, skipping the first `start_line` of them.
    ///
    /// Stops before dispatching a line matching `stop`; the returned
    /// `last_line` is that line's index so the next run resumes on it.
    pub async fn run<R>(
        &mut self,
        reader: R,
        start_line: usize,
        stop: Option<&Regex>,
    ) -> Result<ReplayOutcome>
    where
        R: AsyncBufRead + Unpin,
    {
        self.state = ReplayState::Reading;
        info!("Replaying from line {start_line} at speed {}", self.speed);

        let mut segments = reader.split(b'\n');
        let mut index = 0;
        let mut dispatched = 0;

        while let Some(segment) = segments
            .next_segment()
            .await
            .context("Failed to read replay log")?
        {
            if index < start_line {
                index += 1;
                continue;
            }

            let line = String::from_utf8_lossy(&segment);
            let line = line.trim_end_matches('\r');

            if self.cancel.load(Ordering::Relaxed) {
                info!("Replay cancelled at line {index}");
                return Ok(self.finish(ReplayState::Stopped, index, dispatched));
            }
            if stop.is_some_and(|stop| stop.is_match(line)) {
                info!("Replay stopped at line {index}: {line}");
                return Ok(self.finish(ReplayState::Stopped, index, dispatched));
            }
            if let Some(observer) = self.observer.as_mut() {
                observer(index, line);
            }
            index += 1;

            let Some(entry) = self.manager.interpreter().parse_log_line(line) else {
                debug!("Skipping unparsable line {index}");
                continue;
            };

            let delay = self.pace(entry.timestamp);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.manager
                .dispatch(&entry.entity, &entry.message, entry.timestamp)
                .await;
            dispatched += 1;
        }

        info!("Replay finished after {index} lines");
        Ok(self.finish(ReplayState::Done, index, dispatched))
    }

    fn finish(&mut self, state: ReplayState, last_line: usize, dispatched: usize) -> ReplayOutcome {
        self.state = state;
        ReplayOutcome {
            last_line,
            state,
            dispatched,
        }
    }

    /// Wall time to wait before a line logged at `timestamp`
    fn pace(&mut self, timestamp: NaiveDateTime) -> Duration {
        let Some(previous) = self.last_time.replace(timestamp) else {
            return Duration::ZERO;
        };
        match (timestamp - previous).to_std() {
            Ok(elapsed) => Duration::try_from_secs_f64(elapsed.as_secs_f64() / self.speed)
                .unwrap_or(Duration::MAX),
            // Out of order timestamps replay without delay
            Err(_) => Duration::ZERO,
        }
    }
}
