//! Pose and visibility reconciliation for AR marker tracking engines.
//!
//! A tracking engine reports, per frame and per trackable, a visibility
//! flag and a raw pose matrix in millimetre-scaled, right-handed tracker
//! space. This crate turns those raw results into a coherent scene: it
//! converts poses to metre-scaled, left-handed scene space, elects a
//! reference (origin) trackable, computes every dependent's pose relative
//! to it, suppresses tracking-loss flicker with a grace window, and keeps a
//! viewing camera's projection in step with the viewport.
//!
//! The engine itself is out of scope and modeled by the [`TrackingEngine`]
//! trait; see [`ScenePipeline`] for the per-tick entry point.

pub mod error;
pub mod integration;
pub mod scene;

pub use error::TrackError;
pub use integration::{
    AssetStore, EngineEvent, ResidentStore, SceneConfig, ScenePipeline, TickReport,
    TrackableBuilder, TrackingEngine,
};
pub use scene::{
    Anchor, CameraPoseProjector, EventKind, ReferenceSelector, SelectionMode, Trackable,
    TrackableConfig, TrackableRegistry, TrackingEvent, Visibility,
};
