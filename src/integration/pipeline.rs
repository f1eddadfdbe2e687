//! ScenePipeline: per-tick orchestration of engine, registry and scene.

use std::sync::Arc;

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::TrackError;
use crate::integration::engine::{
    HorizontalAlign, OpticalSource, TrackingEngine, VerticalAlign, ViewportFit,
};
use crate::integration::staging::AssetStore;
use crate::scene::{
    Anchor, CameraMode, CameraPoseProjector, EventDispatcher, ReferenceSelector, SelectionMode,
    StereoEye, Trackable, TrackableConfig, TrackableHandle, TrackableOption, TrackableRegistry,
    TrackingEvent, compute_world_pose,
};

/// Declarative description of one trackable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackableDef {
    pub tag: String,
    #[serde(flatten)]
    pub config: TrackableConfig,
}

/// Declarative description of one dependent anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorDef {
    /// Tag of the trackable this anchor is keyed to.
    pub target: String,
    #[serde(default)]
    pub seconds_to_remain_visible: f64,
}

/// Declarative camera setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fit: ViewportFit,
    pub h_align: HorizontalAlign,
    pub v_align: VerticalAlign,
    pub near: f32,
    pub far: f32,
    pub seconds_to_remain_visible: f64,
    /// Path to an optical see-through calibration; enables optical mode.
    pub optical_calibration: Option<String>,
    /// Lateral right-eye offset in metres, for optical stereo rigs.
    pub eye_separation: f32,
    pub eye: StereoEye,
    /// Query stereo pose pairs from the engine.
    pub stereo: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fit: ViewportFit::Fill,
            h_align: HorizontalAlign::Center,
            v_align: VerticalAlign::Center,
            near: 0.01,
            far: 10.0,
            seconds_to_remain_visible: 0.0,
            optical_calibration: None,
            eye_separation: 0.0,
            eye: StereoEye::Left,
            stereo: false,
        }
    }
}

/// Declarative scene setup, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub trackables: Vec<TrackableDef>,
    #[serde(default)]
    pub anchors: Vec<AnchorDef>,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub selection: SelectionMode,
}

impl SceneConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Found/tracked/lost events emitted this tick, in emit order.
    pub events: Vec<TrackingEvent>,
    /// Trackables visible this tick.
    pub visible: Vec<TrackableHandle>,
    /// The elected reference, if any.
    pub reference: Option<TrackableHandle>,
}

/// The per-frame core: drives the engine, registry, reference election,
/// camera and anchors in a fixed order, once per external tick.
///
/// Within a tick every trackable's pose is refreshed before the reference
/// is elected, and dependents only ever read reference poses refreshed in
/// the same tick.
pub struct ScenePipeline<E: TrackingEngine> {
    engine: E,
    store: Arc<dyn AssetStore>,
    registry: TrackableRegistry,
    selector: ReferenceSelector,
    selection: SelectionMode,
    selector_epoch: Option<u64>,
    camera: CameraPoseProjector,
    anchors: Vec<Anchor>,
    dispatcher: EventDispatcher,
    observer_pose: Matrix4<f32>,
    engine_was_started: bool,
    stereo: bool,
}

impl<E: TrackingEngine> ScenePipeline<E> {
    /// Create an empty pipeline with default camera settings.
    pub fn new(engine: E, store: Arc<dyn AssetStore>) -> Self {
        let defaults = CameraConfig::default();
        Self {
            engine,
            store,
            registry: TrackableRegistry::new(),
            selector: ReferenceSelector::new(),
            selection: SelectionMode::SelectAll,
            selector_epoch: None,
            camera: CameraPoseProjector::new(
                defaults.near,
                defaults.far,
                defaults.seconds_to_remain_visible,
            ),
            anchors: Vec::new(),
            dispatcher: EventDispatcher::new(),
            observer_pose: Matrix4::identity(),
            engine_was_started: false,
            stereo: false,
        }
    }

    /// Create a pipeline from a declarative scene description.
    pub fn from_config(engine: E, store: Arc<dyn AssetStore>, config: &SceneConfig) -> Self {
        let mut pipeline = Self::new(engine, store);
        for def in &config.trackables {
            pipeline.add_trackable(Trackable::new(def.tag.clone(), def.config.clone()));
        }
        for def in &config.anchors {
            pipeline.add_anchor(Anchor::new(
                def.target.clone(),
                def.seconds_to_remain_visible,
            ));
        }
        let cam = &config.camera;
        let mut camera =
            CameraPoseProjector::new(cam.near, cam.far, cam.seconds_to_remain_visible);
        camera.set_fit(cam.fit);
        camera.set_alignment(cam.h_align, cam.v_align);
        camera.set_eye(cam.eye);
        if let Some(path) = &cam.optical_calibration {
            camera.set_mode(CameraMode::Optical {
                source: Some(OpticalSource::Path(path.clone())),
                eye_separation: cam.eye_separation,
            });
        }
        pipeline.camera = camera;
        pipeline.stereo = cam.stereo;
        pipeline.selection = config.selection.clone();
        pipeline
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn registry(&self) -> &TrackableRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TrackableRegistry {
        &mut self.registry
    }

    pub fn camera(&self) -> &CameraPoseProjector {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraPoseProjector {
        &mut self.camera
    }

    pub fn selector(&self) -> &ReferenceSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut ReferenceSelector {
        &mut self.selector
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }

    pub fn add_trackable(&mut self, trackable: Trackable) -> TrackableHandle {
        self.registry.add(trackable)
    }

    /// Explicitly (re)load a trackable, also retrying a failed load.
    pub fn load_trackable(&mut self, handle: TrackableHandle) -> Result<(), TrackError> {
        self.registry.load(&mut self.engine, &self.store, handle)
    }

    /// Release a trackable's engine resource, cancelling any staging in
    /// flight.
    pub fn unload_trackable(&mut self, handle: TrackableHandle) {
        self.registry.unload(&mut self.engine, handle);
    }

    /// Unload and remove a trackable.
    pub fn remove_trackable(&mut self, handle: TrackableHandle) -> bool {
        self.registry.remove(&mut self.engine, handle)
    }

    /// Replace a trackable's configuration and reload it.
    pub fn configure_trackable(
        &mut self,
        handle: TrackableHandle,
        config: TrackableConfig,
    ) -> Result<(), TrackError> {
        self.registry
            .configure(&mut self.engine, &self.store, handle, config)
    }

    /// Set a per-trackable option, pushing it to the engine when loaded.
    pub fn set_trackable_option(&mut self, handle: TrackableHandle, option: TrackableOption) {
        self.registry.set_option(&mut self.engine, handle, option);
    }

    pub fn add_anchor(&mut self, anchor: Anchor) {
        self.anchors.push(anchor);
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Register a listener for found/tracked/lost events.
    pub fn subscribe<F: FnMut(&TrackingEvent) + 'static>(&mut self, listener: F) {
        self.dispatcher.subscribe(listener);
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selection = mode;
        self.selector_epoch = None; // force a rebuild next tick
    }

    /// Observer (camera rig) pose used in camera-relative mode, i.e. when
    /// no reference candidates are configured.
    pub fn set_observer_pose(&mut self, pose: Matrix4<f32>) {
        self.observer_pose = pose;
    }

    pub fn set_stereo(&mut self, stereo: bool) {
        self.stereo = stereo;
    }

    /// Reset all trackables without engine calls, after the engine has been
    /// globally shut down.
    pub fn detach(&mut self) {
        self.registry.detach_all();
        self.engine_was_started = false;
    }

    /// Advance the whole scene one tick. `now` is monotonic seconds.
    pub fn tick(&mut self, now: f64) -> TickReport {
        // 1. Engine notifications (autocreate/autoremove), drained at one
        //    fixed point so the core stays single-threaded.
        let engine_events = self.engine.drain_events();
        if !engine_events.is_empty() {
            self.registry.apply_engine_events(&engine_events);
        }

        // 2. Registry update: staging polls, lazy loads, pose queries.
        let visible = self
            .registry
            .update_all(&mut self.engine, &self.store, self.stereo);

        // 3. Reference election over data refreshed this tick.
        if self.selector_epoch != Some(self.registry.epoch()) {
            self.selector.rebuild(&self.selection, &self.registry);
            self.selector_epoch = Some(self.registry.epoch());
        }
        let reference = self.selector.current_reference(&self.registry);

        // 4. Camera projection (only when dirty or on engine start edge).
        let started = self.engine.started();
        if started && !self.engine_was_started {
            self.camera.mark_projection_dirty();
        }
        self.engine_was_started = started;
        self.camera.update_projection(&mut self.engine);

        // 5. Camera pose.
        for kind in self.camera.update_pose(&self.registry, reference, now) {
            let target = self.camera.name().to_string();
            self.dispatcher.emit(TrackingEvent { target, kind });
        }

        // 6. Anchors. With candidates configured but none visible, anchors
        //    have no frame to be placed in and are treated as lost.
        let reference_in_use = !self.selector.candidates().is_empty();
        for anchor in &mut self.anchors {
            let resolved = anchor.resolve(&self.registry);
            let (source_visible, pose) = match resolved {
                Some(handle) => {
                    anchor_frame_pose(
                        &self.registry,
                        handle,
                        reference,
                        reference_in_use,
                        &self.observer_pose,
                    )
                }
                None => (false, None), // unknown tag: permanently hidden
            };
            for kind in anchor.update(source_visible, pose, now) {
                let target = anchor.target_tag().to_string();
                self.dispatcher.emit(TrackingEvent { target, kind });
            }
        }

        TickReport {
            events: self.dispatcher.drain(),
            visible,
            reference,
        }
    }
}

/// Compute one anchor's visibility and world pose for this tick.
fn anchor_frame_pose(
    registry: &TrackableRegistry,
    target: TrackableHandle,
    reference: Option<TrackableHandle>,
    reference_in_use: bool,
    observer_pose: &Matrix4<f32>,
) -> (bool, Option<Matrix4<f32>>) {
    let Some(t) = registry.get(target) else {
        return (false, None);
    };
    if !t.visible() {
        return (false, None);
    }
    if !reference_in_use {
        return (
            true,
            compute_world_pose(t.pose(), None, false, observer_pose),
        );
    }
    match reference.and_then(|h| registry.get(h).map(|r| (h, r))) {
        Some((ref_handle, ref_trackable)) => (
            true,
            compute_world_pose(
                t.pose(),
                Some(ref_trackable.pose()),
                target == ref_handle,
                observer_pose,
            ),
        ),
        // candidates exist but none is visible this tick
        None => (false, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::builder::TrackableBuilder;
    use crate::integration::engine::{OpticalParams, PatternInfo, ViewportParams};
    use crate::integration::staging::ResidentStore;
    use crate::scene::{EventKind, TrackableId};

    /// Engine double exposing a single always-visible barcode.
    struct MockEngine {
        visible: bool,
    }

    impl TrackingEngine for MockEngine {
        type Error = std::io::Error;

        fn started(&self) -> bool {
            true
        }

        fn add_trackable(&mut self, _config: &str) -> Result<TrackableId, Self::Error> {
            Ok(1)
        }

        fn remove_trackable(&mut self, _id: TrackableId) -> bool {
            true
        }

        fn query_pose(&self, _id: TrackableId) -> Result<Option<[f32; 16]>, Self::Error> {
            if !self.visible {
                return Ok(None);
            }
            let mut raw = [0.0f32; 16];
            raw[0] = 1.0;
            raw[5] = 1.0;
            raw[10] = 1.0;
            raw[15] = 1.0;
            raw[14] = 500.0; // 500 mm in front of the camera
            Ok(Some(raw))
        }

        fn projection_for_viewport(
            &self,
            _params: &ViewportParams,
        ) -> Result<[f32; 16], Self::Error> {
            let mut raw = [0.0f32; 16];
            raw[0] = 1.0;
            raw[5] = 1.0;
            raw[10] = 1.0;
            raw[15] = 1.0;
            Ok(raw)
        }

        fn load_optical_calibration(
            &mut self,
            _source: &OpticalSource,
            _near: f32,
            _far: f32,
        ) -> Result<OpticalParams, Self::Error> {
            Err(std::io::Error::other("no optical calibration"))
        }

        fn set_option(
            &mut self,
            _id: TrackableId,
            _option: TrackableOption,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        fn pattern_count(&self, _id: TrackableId) -> usize {
            1
        }

        fn pattern_info(
            &self,
            _id: TrackableId,
            _index: usize,
        ) -> Result<PatternInfo, Self::Error> {
            let mut matrix = [0.0f32; 16];
            matrix[0] = 1.0;
            matrix[5] = 1.0;
            matrix[10] = 1.0;
            matrix[15] = 1.0;
            Ok(PatternInfo {
                matrix,
                width_mm: 80.0,
                image: None,
            })
        }
    }

    #[test]
    fn tick_loads_and_reports_visibility() {
        let mut pipeline = ScenePipeline::new(
            MockEngine { visible: true },
            Arc::new(ResidentStore) as Arc<dyn AssetStore>,
        );
        let handle = pipeline.add_trackable(TrackableBuilder::barcode(3).tag("origin").build());
        pipeline.add_anchor(Anchor::new("origin", 0.0));

        let report = pipeline.tick(0.0);
        assert_eq!(report.visible, vec![handle]);
        assert_eq!(report.reference, Some(handle));
        // camera and anchor both appear
        assert!(report
            .events
            .iter()
            .any(|e| e.target == "origin" && e.kind == EventKind::Found));
        assert!(report
            .events
            .iter()
            .any(|e| e.target == "camera" && e.kind == EventKind::Found));

        let t = pipeline.registry().get(handle).unwrap();
        assert!(t.is_loaded());
        assert_eq!(t.patterns().len(), 1);
    }

    #[test]
    fn scene_config_parses_from_json() {
        let config = SceneConfig::from_json(
            r#"{
                "trackables": [
                    { "tag": "origin", "kind": "single_barcode", "barcode_id": 0, "width": 0.08 },
                    { "tag": "poster", "kind": "two_d_image", "image": "poster.jpg", "width": 0.3 }
                ],
                "anchors": [
                    { "target": "poster", "seconds_to_remain_visible": 0.5 }
                ],
                "selection": { "mode": "select_by_tag", "tags": ["origin"] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.trackables.len(), 2);
        assert_eq!(config.anchors[0].target, "poster");
        assert_eq!(config.camera.near, 0.01);

        let pipeline = ScenePipeline::from_config(
            MockEngine { visible: false },
            Arc::new(ResidentStore) as Arc<dyn AssetStore>,
            &config,
        );
        assert_eq!(pipeline.registry().len(), 2);
        assert_eq!(pipeline.anchors().len(), 1);
    }
}
