//! Liveness pinging between leader and followers.

mod detector;

pub use detector::{
    DetectorSettings, FaultDetector, FaultEvent, MonitorMode, PeerLivenessRecord,
};
