//! Collaborator contracts consumed by the pondering controller.
//!
//! The controller does not know how to represent a chessboard, generate
//! moves, or score positions. It drives a [`SearchBackend`], which bundles
//! the black-box iterative-deepening search together with the board and
//! transposition-table operations the scheduler needs.

use std::fmt;
use std::time::Instant;

use crate::sync::StopFlag;

/// Side to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// The opposing color.
    #[must_use]
    pub fn other(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

/// Board state as seen by the controller: opaque, cloneable, and mutable
/// through paired `make`/`unmake` calls.
///
/// `Default` is the game's starting position.
pub trait PonderBoard: Clone + Default + Send + 'static {
    /// Move representation. Cheap to copy, comparable, printable in logs.
    type Move: Copy + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Play `mv` on this board.
    fn make(&mut self, mv: Self::Move);

    /// Take back the most recently made move.
    fn unmake(&mut self);
}

/// How a search run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The full depth schedule was searched.
    Completed,
    /// The deadline arrived first; the deepest finished depth stands.
    Deadline,
    /// The cancel flag was tripped first.
    Cancelled,
}

/// Product of one iterative-deepening run.
#[derive(Debug)]
pub struct SearchOutcome<M, T> {
    /// Root-level moves with scores, best first. Empty iff the search was
    /// cancelled (or failed) before any root move was evaluated.
    pub ranked_moves: Vec<(M, i32)>,
    /// The transposition table, updated by the run.
    pub table: T,
    /// Deepest depth of the schedule that fully completed (0 = none).
    pub reached_depth: u32,
    /// How the run ended.
    pub termination: Termination,
}

/// The move type of a backend's board.
pub type MoveOf<B> = <<B as SearchBackend>::Board as PonderBoard>::Move;

/// The black-box search and its supporting table operations.
///
/// One backend instance is shared by the controller task and every worker
/// thread, so implementations must be freely callable from multiple threads
/// at once.
pub trait SearchBackend: Send + Sync + 'static {
    /// Board the searches run on.
    type Board: PonderBoard;
    /// Opaque transposition table. Owned snapshots only; never shared.
    type Table: Send + 'static;
    /// Failure reported by a search run. Swallowed by the controller into an
    /// empty result for that branch.
    type Error: std::error::Error + Send + 'static;

    /// A table with no entries.
    fn empty_table(&self) -> Self::Table;

    /// Restrict `table` to entries reachable from `root`, as an owned
    /// snapshot. Read-only on `table`.
    fn prune(&self, table: &Self::Table, root: &Self::Board) -> Self::Table;

    /// Fold `incoming` into `cumulative`, preferring deeper entries.
    fn merge(&self, cumulative: Self::Table, incoming: Self::Table) -> Self::Table;

    /// Run iterative deepening over `depths` from `root` for `to_move`.
    ///
    /// `record_moves = false` returns only the principal variation at each
    /// depth; `true` returns the full root-level ranking. `deadline` absent
    /// means unbounded. The run must notice `cancel` or an expired deadline
    /// within one root-level iteration, and must leave `root` in the state it
    /// was given (internal `make`s undone).
    #[allow(clippy::too_many_arguments)]
    fn iterative_deepening(
        &self,
        root: &mut Self::Board,
        to_move: Color,
        depths: &[u32],
        record_moves: bool,
        table: Self::Table,
        cancel: &StopFlag,
        deadline: Option<Instant>,
    ) -> Result<SearchOutcome<MoveOf<Self>, Self::Table>, Self::Error>;
}
