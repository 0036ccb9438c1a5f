//! Scripted search backend for driving the controller in tests.
//!
//! Searches do no chess: each root has a configured wall-clock duration, and
//! the "search" just watches its cancel flag and deadline until that duration
//! elapses. Telemetry counters let tests observe spawn order, concurrency,
//! and completions from outside.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use chess_ponder::backend::{Color, PonderBoard, SearchBackend, SearchOutcome, Termination};
use chess_ponder::sync::StopFlag;

/// A move in the scripted game: a small id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mv(pub u32);

/// The scripted reply a completed search reports for root move `mv`.
pub fn reply_to(mv: Mv) -> Mv {
    Mv(1000 + mv.0)
}

/// Board = the move history from the starting position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptBoard {
    pub history: Vec<Mv>,
}

impl PonderBoard for ScriptBoard {
    type Move = Mv;

    fn make(&mut self, mv: Mv) {
        self.history.push(mv);
    }

    fn unmake(&mut self) {
        self.history.pop();
    }
}

/// Transposition table that records every operation applied to it, so tests
/// can check snapshot independence and merge propagation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptTable {
    pub lineage: Vec<String>,
}

impl ScriptTable {
    pub fn has(&self, entry: &str) -> bool {
        self.lineage.iter().any(|e| e == entry)
    }
}

#[derive(Debug)]
pub struct ScriptError(pub String);

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ScriptError {}

pub struct ScriptBackend {
    /// Ranked opponent replies returned by the shallow analysis pass.
    pub candidates: Vec<(Mv, i32)>,
    /// How long the deep search at each root runs if left alone.
    pub durations: HashMap<Mv, Duration>,
    pub default_duration: Duration,
    /// Roots whose searches fail outright.
    pub failing: Vec<Mv>,

    live: AtomicUsize,
    max_live: AtomicUsize,
    finished: AtomicUsize,
    spawn_order: Mutex<Vec<Mv>>,
    analysis_tables: Mutex<Vec<ScriptTable>>,
}

impl ScriptBackend {
    /// Backend whose opponent analysis ranks `candidates` in the given
    /// order, with descending scores.
    pub fn new(candidates: &[u32]) -> Self {
        let ranked = candidates
            .iter()
            .enumerate()
            .map(|(i, id)| (Mv(*id), 100 - i as i32))
            .collect();
        ScriptBackend {
            candidates: ranked,
            durations: HashMap::new(),
            default_duration: Duration::from_millis(5),
            failing: Vec::new(),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            spawn_order: Mutex::new(Vec::new()),
            analysis_tables: Mutex::new(Vec::new()),
        }
    }

    pub fn duration_for(mut self, id: u32, duration: Duration) -> Self {
        self.durations.insert(Mv(id), duration);
        self
    }

    pub fn all_lasting(mut self, duration: Duration) -> Self {
        self.default_duration = duration;
        self
    }

    pub fn failing_at(mut self, id: u32) -> Self {
        self.failing.push(Mv(id));
        self
    }

    /// Peak number of concurrently running deep searches.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Number of currently running deep searches.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of deep searches that have returned (including failures).
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Root moves of deep searches, in the order they started.
    pub fn spawn_order(&self) -> Vec<Mv> {
        self.spawn_order.lock().clone()
    }

    /// The table handed to each opponent-analysis pass, in call order.
    pub fn analysis_tables(&self) -> Vec<ScriptTable> {
        self.analysis_tables.lock().clone()
    }

    fn run_deep(
        &self,
        mv: Mv,
        depths: &[u32],
        table: &mut ScriptTable,
        cancel: &StopFlag,
        deadline: Option<Instant>,
    ) -> Result<(Vec<(Mv, i32)>, u32, Termination), ScriptError> {
        if self.failing.contains(&mv) {
            return Err(ScriptError(format!("scripted failure at {mv:?}")));
        }

        let duration = self.durations.get(&mv).copied().unwrap_or(self.default_duration);
        let started = Instant::now();
        let termination = loop {
            if cancel.is_stopped() {
                break Termination::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Termination::Deadline;
            }
            if started.elapsed() >= duration {
                break Termination::Completed;
            }
            std::thread::sleep(Duration::from_millis(1));
        };

        table.lineage.push(format!("searched@{}", mv.0));
        let (ranked, depth) = match termination {
            Termination::Cancelled => (Vec::new(), 0),
            Termination::Deadline => (
                vec![(reply_to(mv), 10)],
                depths.first().copied().unwrap_or(0),
            ),
            Termination::Completed => (
                vec![(reply_to(mv), 42), (Mv(2000 + mv.0), 17)],
                depths.last().copied().unwrap_or(0),
            ),
        };
        Ok((ranked, depth, termination))
    }
}

impl SearchBackend for ScriptBackend {
    type Board = ScriptBoard;
    type Table = ScriptTable;
    type Error = ScriptError;

    fn empty_table(&self) -> ScriptTable {
        ScriptTable::default()
    }

    fn prune(&self, table: &ScriptTable, root: &ScriptBoard) -> ScriptTable {
        let mut snapshot = table.clone();
        let root_id = root.history.last().map_or(0, |mv| mv.0);
        snapshot.lineage.push(format!("pruned@{root_id}"));
        snapshot
    }

    fn merge(&self, mut cumulative: ScriptTable, incoming: ScriptTable) -> ScriptTable {
        cumulative.lineage.extend(incoming.lineage);
        cumulative
    }

    fn iterative_deepening(
        &self,
        root: &mut ScriptBoard,
        _to_move: Color,
        depths: &[u32],
        record_moves: bool,
        mut table: ScriptTable,
        cancel: &StopFlag,
        deadline: Option<Instant>,
    ) -> Result<SearchOutcome<Mv, ScriptTable>, ScriptError> {
        if !record_moves {
            // Shallow opponent-analysis pass.
            self.analysis_tables.lock().push(table.clone());
            table.lineage.push("analysis".to_string());
            return Ok(SearchOutcome {
                ranked_moves: self.candidates.clone(),
                table,
                reached_depth: depths.last().copied().unwrap_or(0),
                termination: Termination::Completed,
            });
        }

        let mv = root
            .history
            .last()
            .copied()
            .ok_or_else(|| ScriptError("deep search with no root move".to_string()))?;
        self.spawn_order.lock().push(mv);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        let result = self.run_deep(mv, depths, &mut table, cancel, deadline);

        self.live.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);

        result.map(|(ranked_moves, reached_depth, termination)| SearchOutcome {
            ranked_moves,
            table,
            reached_depth,
            termination,
        })
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
