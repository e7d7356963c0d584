//! Heads-up postflop CFR solver core.
//!
//! Given a pot, two stacks, a 3–5 card board and weighted hand ranges for
//! both players, the engine enumerates the betting tree into flat
//! offset-indexed arrays, runs external-sampling Monte-Carlo CFR with
//! discounted reweighting, and reads back per-hand mixed strategies at any
//! decision point.

pub mod cards;
pub mod cfr_engine;
pub mod cli;
pub mod display;
pub mod equity;
pub mod error;
pub mod game_tree;
pub mod hand_evaluator;
pub mod ranges;

pub use cfr_engine::{CfrConfig, CfrEngine, NodeData, NodeRegrets, StopHandle};
pub use error::{SolverError, SolverResult};
pub use game_tree::{
    Action, ActionKind, BettingConfig, GameTreeBuilder, Node, NodeKind, Street, TreeDataPool,
};
pub use ranges::Combo;
