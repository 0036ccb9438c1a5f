//! The pondering controller.
//!
//! While the opponent is on the move, the controller task explores searches
//! rooted at each plausible opponent reply, keeping at most `max_parallel`
//! workers alive and starting the next candidate whenever one finishes. When
//! the opponent's actual move is announced via [`PonderController::stop_precomputation`],
//! every other search is cancelled and the matching one is harvested, or
//! launched fresh with the response deadline if it never started.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::backend::{Color, MoveOf, PonderBoard, SearchBackend};
use crate::config::PonderConfig;
use crate::error::PonderError;
use crate::queue::CompletionQueue;
use crate::sync::StopFlag;
use crate::worker::{spawn_search, SearchHandle, SearchReport, SearchSpec};

/// Locates one harvested search among the controller's handles after
/// `stop_precomputation` returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchLocator(usize);

/// What the controller task hands back when it is joined.
struct ControllerOutput<B: SearchBackend> {
    handles: Vec<SearchHandle<B>>,
    table: B::Table,
}

/// Owns the game state, the cumulative transposition table, and the
/// controller task that schedules speculative searches.
pub struct PonderController<B: SearchBackend> {
    backend: Arc<B>,
    config: PonderConfig,
    board: B::Board,
    to_move: Color,
    table: Option<B::Table>,
    queue: Arc<CompletionQueue<MoveOf<B>>>,
    task: Option<JoinHandle<ControllerOutput<B>>>,
    handles: Vec<SearchHandle<B>>,
}

impl<B: SearchBackend> PonderController<B> {
    #[must_use]
    pub fn new(backend: B, config: PonderConfig) -> Self {
        let backend = Arc::new(backend);
        let table = Some(backend.empty_table());
        PonderController {
            backend,
            config,
            board: B::Board::default(),
            to_move: Color::White,
            table,
            queue: Arc::new(CompletionQueue::new()),
            task: None,
            handles: Vec::new(),
        }
    }

    /// The shared search backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The cumulative game board.
    #[must_use]
    pub fn board(&self) -> &B::Board {
        &self.board
    }

    /// Whose turn it is on the cumulative board.
    #[must_use]
    pub fn to_move(&self) -> Color {
        self.to_move
    }

    #[must_use]
    pub fn config(&self) -> &PonderConfig {
        &self.config
    }

    /// Whether the controller task is running.
    #[must_use]
    pub fn is_pondering(&self) -> bool {
        self.task.is_some()
    }

    /// Handles retained from the most recent precomputation run.
    #[must_use]
    pub fn searches(&self) -> &[SearchHandle<B>] {
        &self.handles
    }

    /// Play `mv` on the cumulative board and flip the side to move.
    ///
    /// # Errors
    /// `InvalidState` while the controller task is running.
    pub fn make_move(&mut self, mv: MoveOf<B>) -> Result<(), PonderError> {
        if self.task.is_some() {
            return Err(PonderError::InvalidState);
        }
        self.board.make(mv);
        self.to_move = self.to_move.other();
        Ok(())
    }

    /// Replace the game state. Stops any precomputation first.
    pub fn set_position(&mut self, board: B::Board, to_move: Color) {
        self.stop_precomputation(None);
        self.board = board;
        self.to_move = to_move;
    }

    /// Begin precomputing responses to the opponent's plausible replies.
    ///
    /// Returns immediately; the controller task runs asynchronously. Handles
    /// retained from the previous run are discarded.
    ///
    /// # Errors
    /// `InvalidState` if the controller task is already running.
    pub fn start_precomputation(&mut self) -> Result<(), PonderError> {
        if self.task.is_some() {
            return Err(PonderError::InvalidState);
        }
        self.handles.clear();
        self.queue = Arc::new(CompletionQueue::new());

        let backend = Arc::clone(&self.backend);
        let queue = Arc::clone(&self.queue);
        let board = self.board.clone();
        let config = self.config.clone();
        let table = self
            .table
            .take()
            .unwrap_or_else(|| self.backend.empty_table());

        let task = thread::Builder::new()
            .name("ponder-ctrl".to_string())
            .spawn(move || run_controller(&backend, &queue, board, &config, table))
            .expect("failed to spawn ponder controller");
        self.task = Some(task);
        Ok(())
    }

    /// Announce the opponent's actual move (or `None` for "just stop") and
    /// block until the controller task and every worker have finished.
    ///
    /// Idempotent; when already idle only the handle lookup runs, so a
    /// locator can still be obtained after an earlier plain stop. Returns the
    /// locator of the search rooted at `known_move`, or `None` if there is no
    /// match.
    pub fn stop_precomputation(&mut self, known_move: Option<MoveOf<B>>) -> Option<SearchLocator> {
        if let Some(task) = self.task.take() {
            self.queue.signal_end(known_move);
            match task.join() {
                Ok(output) => {
                    self.handles = output.handles;
                    self.table = Some(output.table);
                }
                Err(_) => {
                    log::error!("ponder controller task panicked");
                    self.handles.clear();
                    self.table = Some(self.backend.empty_table());
                }
            }
        }

        let known = known_move?;
        self.handles
            .iter()
            .position(|handle| handle.opponent_move() == known)
            .map(SearchLocator)
    }

    /// The harvested report at `locator`.
    #[must_use]
    pub fn result(&self, locator: SearchLocator) -> Option<&SearchReport<MoveOf<B>>> {
        self.handles.get(locator.0).and_then(SearchHandle::report)
    }

    /// Remove and return the harvested report at `locator`.
    pub fn take_result(&mut self, locator: SearchLocator) -> Option<SearchReport<MoveOf<B>>> {
        self.handles
            .get_mut(locator.0)
            .and_then(SearchHandle::take_report)
    }

    /// Stop any precomputation, drop retained results, and reinitialize the
    /// game state. Safe to call in any state.
    pub fn reset(&mut self) {
        self.stop_precomputation(None);
        self.handles.clear();
        self.board = B::Board::default();
        self.to_move = Color::White;
    }
}

impl<B: SearchBackend> Drop for PonderController<B> {
    fn drop(&mut self) {
        self.stop_precomputation(None);
    }
}

/// Make `mv`, capture the position, prune the cumulative table for it, and
/// spawn the worker; then take the move back.
#[allow(clippy::too_many_arguments)]
fn launch<B: SearchBackend>(
    backend: &Arc<B>,
    queue: &Arc<CompletionQueue<MoveOf<B>>>,
    board: &mut B::Board,
    table: &B::Table,
    config: &PonderConfig,
    mv: MoveOf<B>,
    index: usize,
    direct_response: bool,
) -> SearchHandle<B> {
    board.make(mv);
    let root = board.clone();
    let snapshot = backend.prune(table, &root);
    board.unmake();

    let duration = if direct_response {
        config.max_response_duration
    } else {
        config.max_search_duration
    };
    log::debug!(
        "starting {} search {index} for {mv:?}",
        if direct_response { "direct" } else { "speculative" },
    );
    let spec = SearchSpec {
        root,
        to_move: config.engine_color,
        opponent_move: mv,
        depth_schedule: config.search_depths.clone(),
        table: snapshot,
        deadline: Instant::now() + duration,
    };
    spawn_search(backend, queue, spec, index, direct_response)
}

/// Body of the controller task.
fn run_controller<B: SearchBackend>(
    backend: &Arc<B>,
    queue: &Arc<CompletionQueue<MoveOf<B>>>,
    mut board: B::Board,
    config: &PonderConfig,
    table: B::Table,
) -> ControllerOutput<B> {
    // Opponent analysis: shallow, depth-bounded by construction, so neither
    // cancellable nor deadlined. The cumulative table travels through it.
    let analysis_cancel = StopFlag::new();
    let analysis = backend.iterative_deepening(
        &mut board,
        config.engine_color.other(),
        &config.opponent_search_depths,
        false,
        table,
        &analysis_cancel,
        None,
    );
    let (mut table, candidates) = match analysis {
        Ok(outcome) => (outcome.table, outcome.ranked_moves),
        Err(err) => {
            log::warn!("opponent analysis failed: {err}");
            (backend.empty_table(), Vec::new())
        }
    };

    let mut handles: Vec<SearchHandle<B>> = Vec::new();

    // Terminal position: the opponent has nothing to play, nothing to ponder.
    if candidates.is_empty() {
        log::debug!("no opponent replies; precomputation ends");
        return ControllerOutput { handles, table };
    }
    log::debug!("pondering {} candidate replies", candidates.len());

    let total = candidates.len();
    let initial = config.max_parallel.min(total);
    for (rank, (mv, _)) in candidates.iter().take(initial).enumerate() {
        handles.push(launch(backend, queue, &mut board, &table, config, *mv, rank, false));
    }

    // Steady state: each harvested completion frees a slot for the next
    // candidate, best-ranked first.
    let mut next_rank = initial;
    let mut seen = 0;
    while seen < total {
        let event = {
            let mut state = queue.lock();
            queue.wait_for_event(&mut state, |s| s.completed_count() > seen || s.ended());
            if state.ended() {
                None
            } else {
                state.completed_at(seen)
            }
        };
        let Some(index) = event else { break };
        seen += 1;

        if let Some(handle) = handles.get_mut(index) {
            handle.harvest(backend);
        }
        if next_rank < total {
            let (mv, _) = candidates[next_rank];
            handles.push(launch(
                backend, queue, &mut board, &table, config, mv, next_rank, false,
            ));
            next_rank += 1;
        }
    }

    // Commit: wait for the announced opponent move, then cancel every search
    // not rooted at it. The cancel pass runs under the queue mutex; joining
    // is deferred until after it is released.
    let known = {
        let mut state = queue.lock();
        queue.wait_for_event(&mut state, |s| s.ended());
        let known = state.known_move();
        for handle in &handles {
            if known != Some(handle.opponent_move()) {
                handle.cancel();
            }
        }
        known
    };
    log::debug!("commit: known opponent move {known:?}");

    for handle in &mut handles {
        handle.harvest(backend);
    }

    // Miss: the known move was never reached in the spawn window. Launch the
    // direct reply under the response deadline and wait it out.
    if let Some(mv) = known {
        if !handles.iter().any(|handle| handle.opponent_move() == mv) {
            let index = handles.len();
            let mut handle = launch(backend, queue, &mut board, &table, config, mv, index, true);
            handle.harvest(backend);
            handles.push(handle);
        }

        // Fold the committed search's table into the cumulative table. The
        // speculative tables are dropped with their handles.
        let committed = handles
            .iter_mut()
            .find(|handle| handle.opponent_move() == mv);
        if let Some(incoming) = committed.and_then(SearchHandle::take_table) {
            table = backend.merge(table, incoming);
        }
    }

    ControllerOutput { handles, table }
}
