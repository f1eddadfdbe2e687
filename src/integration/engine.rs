//! Trait for native tracking engine backends.
//!
//! The actual marker detection, natural-feature tracking and camera
//! calibration live in an external engine. This crate only consumes its
//! per-frame results: implement this trait to connect an engine (FFI
//! binding, remote process, test double) to the scene pipeline.
//!
//! All matrices crossing this boundary are column-major `[f32; 16]` arrays
//! in millimetre-scaled, right-handed tracker space; the scene side performs
//! every scaling and handedness conversion.

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};

use crate::scene::{PatternImage, TrackableId, TrackableOption};

/// How engine video content is fitted into the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewportFit {
    /// Fill the viewport exactly, distorting aspect if needed.
    Stretch,
    /// Largest size that fits entirely, letterboxing the rest.
    Fit,
    /// Smallest size that covers the viewport, cropping the overflow.
    Fill,
    /// One content pixel per screen pixel.
    OneToOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlign {
    Top,
    Center,
    Bottom,
}

/// Arguments for the engine's viewport-fitting projection routine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportParams {
    pub width: u32,
    pub height: u32,
    pub fit: ViewportFit,
    pub h_align: HorizontalAlign,
    pub v_align: VerticalAlign,
    pub near: f32,
    pub far: f32,
}

/// Source for an optical see-through calibration.
#[derive(Debug, Clone)]
pub enum OpticalSource {
    Path(String),
    Bytes(Vec<u8>),
}

/// Result of loading an optical calibration: the display's projection and
/// the fixed camera-to-eye offset pose, both raw (millimetres,
/// right-handed).
#[derive(Debug, Clone)]
pub struct OpticalParams {
    pub fovy: f32,
    pub aspect: f32,
    pub eye_offset: [f32; 16],
    pub projection: [f32; 16],
}

/// One sub-pattern of a loaded trackable, as reported by the engine.
/// Raw units: millimetres, right-handed.
#[derive(Debug, Clone)]
pub struct PatternInfo {
    pub matrix: [f32; 16],
    pub width_mm: f32,
    pub image: Option<PatternImage>,
}

/// Notification emitted by the engine outside the query path, e.g. when a
/// previously-unseen barcode is autocreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Autocreated(TrackableId),
    Autoremoved(TrackableId),
}

/// Thread-safe queue for engine notifications.
///
/// Engines may emit autocreate/autoremove callbacks from arbitrary threads;
/// posting them through this queue keeps the reconciliation core
/// single-threaded. The pipeline drains it at one fixed point per tick.
#[derive(Debug)]
pub struct EngineEventQueue {
    tx: Sender<EngineEvent>,
    rx: Receiver<EngineEvent>,
}

impl Default for EngineEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineEventQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Cloneable posting handle, safe to hand to an engine callback thread.
    pub fn poster(&self) -> EngineEventPoster {
        EngineEventPoster(self.tx.clone())
    }

    /// Drain all queued notifications.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.rx.try_iter().collect()
    }
}

/// Posting side of an [`EngineEventQueue`].
#[derive(Debug, Clone)]
pub struct EngineEventPoster(Sender<EngineEvent>);

impl EngineEventPoster {
    pub fn post(&self, event: EngineEvent) {
        // receiver dropped means the pipeline is gone; nothing to do
        let _ = self.0.send(event);
    }
}

/// Trait for native tracking engine backends.
///
/// # Example
///
/// ```ignore
/// use artrack_rs::{TrackingEngine, TrackableId};
///
/// struct MyEngine {
///     // FFI handle here
/// }
///
/// impl TrackingEngine for MyEngine {
///     type Error = std::io::Error;
///
///     fn started(&self) -> bool { true }
///
///     fn add_trackable(&mut self, config: &str) -> Result<TrackableId, Self::Error> {
///         // hand the config string to the native library
///         Ok(0)
///     }
///     // ...
/// }
/// ```
pub trait TrackingEngine {
    /// Error type for engine call failures.
    type Error: std::error::Error;

    /// Whether the engine is initialized and running. Loads are silently
    /// retried each tick until this turns true.
    fn started(&self) -> bool;

    /// Create an engine-side trackable from a configuration string
    /// (`single_buffer;...`, `single_barcode;...`, `multi;...`, `nft;...`,
    /// `2d;...`) and return its id.
    fn add_trackable(&mut self, config: &str) -> Result<TrackableId, Self::Error>;

    /// Release an engine-side trackable. Returns false if the id was
    /// unknown.
    fn remove_trackable(&mut self, id: TrackableId) -> bool;

    /// Visibility and pose for one trackable this frame. `None` means not
    /// visible.
    fn query_pose(&self, id: TrackableId) -> Result<Option<[f32; 16]>, Self::Error>;

    /// Stereo variant returning (left, right) poses.
    fn query_pose_stereo(
        &self,
        id: TrackableId,
    ) -> Result<Option<([f32; 16], [f32; 16])>, Self::Error> {
        Ok(self.query_pose(id)?.map(|m| (m, m)))
    }

    /// Projection matrix fitted to the given viewport.
    fn projection_for_viewport(&self, params: &ViewportParams) -> Result<[f32; 16], Self::Error>;

    /// Stereo-right variant of [`projection_for_viewport`].
    ///
    /// [`projection_for_viewport`]: TrackingEngine::projection_for_viewport
    fn projection_for_viewport_right(
        &self,
        params: &ViewportParams,
    ) -> Result<[f32; 16], Self::Error> {
        self.projection_for_viewport(params)
    }

    /// Load an optical see-through calibration.
    fn load_optical_calibration(
        &mut self,
        source: &OpticalSource,
        near: f32,
        far: f32,
    ) -> Result<OpticalParams, Self::Error>;

    /// Push a per-trackable option value.
    fn set_option(&mut self, id: TrackableId, option: TrackableOption)
    -> Result<(), Self::Error>;

    /// Number of visual sub-patterns the loaded trackable reports.
    fn pattern_count(&self, id: TrackableId) -> usize;

    /// Descriptor of one sub-pattern.
    fn pattern_info(&self, id: TrackableId, index: usize) -> Result<PatternInfo, Self::Error>;

    /// Drain autocreate/autoremove notifications queued since the last
    /// call. Engines without autocreation keep the default.
    fn drain_events(&mut self) -> Vec<EngineEvent> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_queue_drains_in_post_order() {
        let queue = EngineEventQueue::new();
        let poster = queue.poster();
        poster.post(EngineEvent::Autocreated(3));
        poster.post(EngineEvent::Autoremoved(3));
        assert_eq!(
            queue.drain(),
            vec![EngineEvent::Autocreated(3), EngineEvent::Autoremoved(3)]
        );
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn poster_survives_cross_thread_posting() {
        let queue = EngineEventQueue::new();
        let poster = queue.poster();
        let handle = std::thread::spawn(move || poster.post(EngineEvent::Autocreated(9)));
        handle.join().unwrap();
        assert_eq!(queue.drain(), vec![EngineEvent::Autocreated(9)]);
    }
}
