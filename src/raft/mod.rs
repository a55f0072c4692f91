pub mod election;
pub mod rpc;
pub mod state;
pub mod timer;

pub use election::{quorum_size, ElectionOutcome, ElectionRound};
pub use state::{RaftRole, RaftState, TermStore};
pub use timer::RandomDelay;
