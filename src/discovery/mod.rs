//! Cold-start discovery: find out whether a leader already exists before
//! joining it or standing for election.

mod ping;

pub use ping::{resolve_advice, DiscoveryProbe, PingResult};
