//! Go engine core: an incremental board with exact undo and a
//! multi-threaded Monte Carlo tree search that consults a batched
//! policy/value evaluator.

pub mod agents;
pub mod array_util;
pub mod board;
pub mod hyper;
pub mod point_set;
pub mod position;
pub mod random;
pub mod search;
pub mod topology;
pub mod worker;

pub use crate::board::{Coord, KoRule, Point, Rules, RuleSet, Stone, SuicideRule};
pub use crate::position::{Board, BoardError};
pub use crate::topology::{Topology, TopologyRegistry};
