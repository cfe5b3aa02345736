//! Cadences and the scheduling loop.
//!
//! A single task owns the engine and drives all miners; cross-miner order
//! within a tick is an implementation detail, but one miner's updates are
//! strictly sequential and never re-entrant. The graph period follows the
//! configured refresh interval; the other three cadences are fixed.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Sub-second sampling for lightweight aggregate readings.
    Fast,
    /// One tick per graph sample; period set by the refresh interval.
    Graph,
    /// Device re-enumeration.
    Min5,
    /// Remote feed fetches.
    Min30,
}

pub const FAST_PERIOD: Duration = Duration::from_millis(500);
pub const MIN5_PERIOD: Duration = Duration::from_secs(300);
pub const MIN30_PERIOD: Duration = Duration::from_secs(1800);

pub struct Scheduler {
    engine: Engine,
}

impl Scheduler {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// One full sweep outside the timer loop: enumerate devices, then take
    /// a graph sample. Used for single-shot reporting.
    pub fn run_once(&mut self) {
        self.engine.update(Cadence::Min5);
        self.engine.update(Cadence::Graph);
    }

    /// Drive the engine until the surrounding task is cancelled.
    pub async fn run(&mut self) {
        let graph_period = self.graph_period();
        info!(
            graph_ms = graph_period.as_millis() as u64,
            "scheduler running"
        );

        let mut fast = interval(FAST_PERIOD);
        let mut graph = interval(graph_period);
        let mut min5 = interval(MIN5_PERIOD);
        let mut min30 = interval(MIN30_PERIOD);
        // Rate computation measures real elapsed time, so skip missed
        // ticks instead of bursting to catch up after a stall.
        for i in [&mut fast, &mut graph, &mut min5, &mut min30] {
            i.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
        let mut current_graph_period = graph_period;

        loop {
            tokio::select! {
                _ = fast.tick() => self.engine.update(Cadence::Fast),
                _ = graph.tick() => {
                    self.engine.update(Cadence::Graph);
                    // Honor a refresh-interval change on the next tick.
                    let wanted = self.graph_period();
                    if wanted != current_graph_period {
                        debug!(graph_ms = wanted.as_millis() as u64, "graph period changed");
                        graph = interval(wanted);
                        graph.set_missed_tick_behavior(MissedTickBehavior::Skip);
                        // A fresh interval fires immediately; consume that.
                        graph.tick().await;
                        current_graph_period = wanted;
                    }
                }
                _ = min5.tick() => self.engine.update(Cadence::Min5),
                _ = min30.tick() => self.engine.update(Cadence::Min30),
            }
        }
    }

    fn graph_period(&self) -> Duration {
        let secs = self
            .engine
            .settings()
            .read()
            .map(|s| s.refresh_interval_secs)
            .unwrap_or(1.0)
            .clamp(0.1, 60.0);
        Duration::from_secs_f64(secs)
    }
}
