//! Camera-facing side of the monitor: sample acquisition and fusion.

pub mod adapter;
pub mod fuser;

pub use adapter::{Detector, DetectorReading, SampleStatus, SensorAdapter, SensorFault, SensorSample};
pub use fuser::{
    FuserSettings, FusionOutput, MovementLevel, PostureAlerts, PostureState, PresenceState,
    PresenceTransition, SignalFuser,
};
