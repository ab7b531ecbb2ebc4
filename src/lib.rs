//! Myco Telemetry: sensor analytics for greenhouse and mycelium farms
//!
//! Turns a stream of timestamped environmental readings into the three
//! derived views the farm dashboard consumes.
//!
//! ## Architecture
//!
//! - **Setpoint Registry**: validated ideal value and tolerance band per sensor type
//! - **Windowed Sample Store**: ordered, time-evicted readings per sensor type
//! - **Analytics**: drift, deviation/spikes, stability and efficiency scoring
//! - **Snapshot Cache**: whole-bundle memoization per (timeframe, sensor set)
//! - **Engine**: explicit-init owner wiring the above to a clock
//! - **Sources**: CSV and stdin reading feeds for the CLI

pub mod analytics;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod setpoints;
pub mod source;
pub mod store;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, EngineConfig};

// Re-export commonly used types
pub use types::{
    DeviationStats, DriftStatus, EfficiencyProfile, IngestError, Reading, ReadingEvent,
    SensorType, Snapshot, SnapshotKey, StabilityStats, StatsBundle, Subsystem, SubsystemScore,
    SubsystemStatus, Timeframe,
};

// Re-export engine components
pub use cache::SnapshotCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ChangeKind, EngineError, SampleChange, TelemetryEngine};
pub use setpoints::{Setpoint, SetpointError, SetpointRegistry};
pub use store::{AppendOutcome, SeriesStats, StoreStats, WindowedSampleStore};
