//! Search workers: one thread per candidate opponent reply.
//!
//! A worker runs the black-box search once over the full depth schedule,
//! converts a backend failure into an empty result, and posts exactly one
//! completion event before its thread exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::backend::{Color, MoveOf, SearchBackend, SearchOutcome, Termination};
use crate::queue::CompletionQueue;
use crate::sync::StopFlag;

/// Search thread stack size (32 MB to handle deep recursion in the backend).
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Everything a worker needs to run one search.
pub struct SearchSpec<B: SearchBackend> {
    /// Position after the candidate opponent move. Owned by the worker.
    pub root: B::Board,
    /// Color the search plays for.
    pub to_move: Color,
    /// The candidate opponent move that produced `root`.
    pub opponent_move: MoveOf<B>,
    /// Iterative-deepening schedule.
    pub depth_schedule: Vec<u32>,
    /// Pruned transposition-table snapshot. Owned by the worker.
    pub table: B::Table,
    /// Absolute instant at which the search must terminate.
    pub deadline: Instant,
}

/// Result of a harvested search, as handed back to the caller.
#[derive(Debug, Clone)]
pub struct SearchReport<M> {
    /// Root-level moves with scores, best first. Empty if the branch was
    /// cancelled before the shallowest depth completed, or failed.
    pub ranked_moves: Vec<(M, i32)>,
    /// Deepest depth of the schedule that fully completed.
    pub reached_depth: u32,
    /// How the search ended.
    pub termination: Termination,
}

impl<M: Copy> SearchReport<M> {
    /// The top-ranked reply, if any move was evaluated.
    #[must_use]
    pub fn best_move(&self) -> Option<M> {
        self.ranked_moves.first().map(|(mv, _)| *mv)
    }
}

/// One in-flight or harvested worker search.
pub struct SearchHandle<B: SearchBackend> {
    opponent_move: MoveOf<B>,
    cancel: StopFlag,
    index: usize,
    direct_response: bool,
    join: Option<JoinHandle<SearchOutcome<MoveOf<B>, B::Table>>>,
    report: Option<SearchReport<MoveOf<B>>>,
    table: Option<B::Table>,
}

impl<B: SearchBackend> SearchHandle<B> {
    /// The candidate opponent move this search is rooted at.
    #[must_use]
    pub fn opponent_move(&self) -> MoveOf<B> {
        self.opponent_move
    }

    /// Queue identifier of this search.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this search was launched after the opponent move was known.
    #[must_use]
    pub fn is_direct_response(&self) -> bool {
        self.direct_response
    }

    /// Whether this search's cancel flag has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_stopped()
    }

    /// The harvested report, once the search has been joined.
    #[must_use]
    pub fn report(&self) -> Option<&SearchReport<MoveOf<B>>> {
        self.report.as_ref()
    }

    /// Remove and return the harvested report.
    pub fn take_report(&mut self) -> Option<SearchReport<MoveOf<B>>> {
        self.report.take()
    }

    /// Trip the cancel flag. The worker notices at its next safe-point.
    pub(crate) fn cancel(&self) {
        self.cancel.stop();
    }

    /// Join the worker (once) and split its outcome into the caller-facing
    /// report and the table the controller decides over. Idempotent.
    pub(crate) fn harvest(&mut self, backend: &B) {
        let Some(join) = self.join.take() else { return };
        let outcome = match join.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                log::error!(
                    "search {} for {:?} panicked; treating as empty",
                    self.index,
                    self.opponent_move
                );
                SearchOutcome {
                    ranked_moves: Vec::new(),
                    table: backend.empty_table(),
                    reached_depth: 0,
                    termination: Termination::Cancelled,
                }
            }
        };
        log::debug!(
            "harvested search {} for {:?}: {} moves, depth {}, {:?}",
            self.index,
            self.opponent_move,
            outcome.ranked_moves.len(),
            outcome.reached_depth,
            outcome.termination
        );
        self.table = Some(outcome.table);
        self.report = Some(SearchReport {
            ranked_moves: outcome.ranked_moves,
            reached_depth: outcome.reached_depth,
            termination: outcome.termination,
        });
    }

    /// Take the search's output table, if still held.
    pub(crate) fn take_table(&mut self) -> Option<B::Table> {
        self.table.take()
    }
}

/// Spawn a worker search on its own thread.
pub(crate) fn spawn_search<B: SearchBackend>(
    backend: &Arc<B>,
    queue: &Arc<CompletionQueue<MoveOf<B>>>,
    spec: SearchSpec<B>,
    index: usize,
    direct_response: bool,
) -> SearchHandle<B> {
    let cancel = StopFlag::new();
    let opponent_move = spec.opponent_move;

    let backend = Arc::clone(backend);
    let queue = Arc::clone(queue);
    let worker_cancel = cancel.clone();
    let join = thread::Builder::new()
        .name(format!("ponder-{index}"))
        .stack_size(SEARCH_STACK_SIZE)
        .spawn(move || run_worker(backend.as_ref(), &queue, spec, &worker_cancel, index))
        .expect("failed to spawn search worker");

    SearchHandle {
        opponent_move,
        cancel,
        index,
        direct_response,
        join: Some(join),
        report: None,
        table: None,
    }
}

fn run_worker<B: SearchBackend>(
    backend: &B,
    queue: &CompletionQueue<MoveOf<B>>,
    spec: SearchSpec<B>,
    cancel: &StopFlag,
    index: usize,
) -> SearchOutcome<MoveOf<B>, B::Table> {
    let SearchSpec {
        mut root,
        to_move,
        opponent_move,
        depth_schedule,
        table,
        deadline,
    } = spec;

    let outcome = backend.iterative_deepening(
        &mut root,
        to_move,
        &depth_schedule,
        true,
        table,
        cancel,
        Some(deadline),
    );
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            log::warn!("search {index} for {opponent_move:?} failed: {err}");
            SearchOutcome {
                ranked_moves: Vec::new(),
                table: backend.empty_table(),
                reached_depth: 0,
                termination: Termination::Cancelled,
            }
        }
    };

    queue.push(index);
    outcome
}
