//! Integration module for connecting native tracking engines with the scene.
//!
//! This module provides the engine trait, asset staging, and the per-tick
//! pipeline tying an engine to the scene-side reconciliation.

mod builder;
mod engine;
mod pipeline;
mod staging;

pub use builder::TrackableBuilder;
pub use engine::{
    EngineEvent, EngineEventPoster, EngineEventQueue, HorizontalAlign, OpticalParams,
    OpticalSource, PatternInfo, TrackingEngine, VerticalAlign, ViewportFit, ViewportParams,
};
pub use pipeline::{
    AnchorDef, CameraConfig, SceneConfig, ScenePipeline, TickReport, TrackableDef,
};
pub use staging::{AssetStore, ResidentStore, StagingError, StagingPoll, StagingTask};
