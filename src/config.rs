//! Controller configuration.

use std::time::Duration;

use crate::backend::Color;

/// Tunables for the pondering controller.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PonderConfig {
    /// Iterative-deepening schedule for engine searches.
    pub search_depths: Vec<u32>,
    /// Schedule for the shallow opponent-analysis pass.
    pub opponent_search_depths: Vec<u32>,
    /// Hard cap on concurrent search workers.
    pub max_parallel: usize,
    /// Deadline for speculative workers, measured from spawn.
    pub max_search_duration: Duration,
    /// Deadline for workers launched once the opponent move is known,
    /// measured from spawn. A speculative worker promoted by a matching
    /// opponent move keeps the deadline it was spawned with.
    pub max_response_duration: Duration,
    /// Color the engine plays.
    pub engine_color: Color,
}

impl Default for PonderConfig {
    fn default() -> Self {
        PonderConfig {
            search_depths: (3..=10).collect(),
            opponent_search_depths: (3..=7).collect(),
            max_parallel: 7,
            max_search_duration: Duration::from_secs(20),
            max_response_duration: Duration::from_secs(10),
            engine_color: Color::White,
        }
    }
}

impl PonderConfig {
    /// Set the engine search depth schedule.
    #[must_use]
    pub fn depths(mut self, depths: Vec<u32>) -> Self {
        self.search_depths = depths;
        self
    }

    /// Set the opponent-analysis depth schedule.
    #[must_use]
    pub fn opponent_depths(mut self, depths: Vec<u32>) -> Self {
        self.opponent_search_depths = depths;
        self
    }

    /// Set the concurrent-worker cap (at least 1).
    #[must_use]
    pub fn parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Set the speculative search deadline.
    #[must_use]
    pub fn search_duration(mut self, duration: Duration) -> Self {
        self.max_search_duration = duration;
        self
    }

    /// Set the committed response deadline.
    #[must_use]
    pub fn response_duration(mut self, duration: Duration) -> Self {
        self.max_response_duration = duration;
        self
    }

    /// Set the color the engine plays.
    #[must_use]
    pub fn color(mut self, color: Color) -> Self {
        self.engine_color = color;
        self
    }
}
