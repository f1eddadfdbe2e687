//! Viewing camera: reconciled pose plus frustum projection.
//!
//! The camera is a dependent like any other, keyed to the elected reference
//! trackable: its world pose is the inverse of the reference's pose (the
//! scene stands still, the camera moves). On top of that it owns the
//! projection matrix, recomputed only when the viewport geometry changes or
//! the engine (re)starts, never per frame.

use log::warn;
use nalgebra::{Matrix4, Perspective3, Rotation3, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::integration::{
    HorizontalAlign, OpticalParams, OpticalSource, TrackingEngine, VerticalAlign, ViewportFit,
    ViewportParams,
};
use crate::scene::anchor::VisibilityGate;
use crate::scene::events::EventKind;
use crate::scene::matrix::{from_raw, invert_pose, pose_from_engine, to_raw};
use crate::scene::registry::{TrackableHandle, TrackableRegistry};
use crate::scene::visibility::Visibility;

/// Screen orientation as reported by the platform. The engine is
/// landscape-native; portrait orientations swap the viewport dimensions
/// passed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenOrientation {
    #[default]
    LandscapeLeft,
    Portrait,
    LandscapeRight,
    PortraitUpsideDown,
}

impl ScreenOrientation {
    pub fn is_portrait(self) -> bool {
        matches!(self, ScreenOrientation::Portrait | ScreenOrientation::PortraitUpsideDown)
    }

    /// Orientation-correcting rotation applied after the other projection
    /// post-transforms.
    pub fn correction_degrees(self) -> f32 {
        match self {
            ScreenOrientation::LandscapeLeft => 0.0,
            ScreenOrientation::Portrait => 90.0,
            ScreenOrientation::LandscapeRight => 180.0,
            ScreenOrientation::PortraitUpsideDown => 270.0,
        }
    }
}

/// Which eye of a stereo pair this camera renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StereoEye {
    #[default]
    Left,
    Right,
}

/// Projection source for the camera.
#[derive(Debug, Clone, Default)]
pub enum CameraMode {
    /// Projection fitted to the video viewport by the engine.
    #[default]
    Video,
    /// Optical see-through display with a fixed calibration supplying both
    /// projection and eye offset. `eye_separation` is the lateral offset in
    /// metres applied for the right eye.
    Optical {
        source: Option<OpticalSource>,
        eye_separation: f32,
    },
}

/// Camera pose and projection, driven once per tick by the pipeline.
pub struct CameraPoseProjector {
    name: String,
    mode: CameraMode,
    eye: StereoEye,
    fit: ViewportFit,
    h_align: HorizontalAlign,
    v_align: VerticalAlign,
    near: f32,
    far: f32,
    rotate90: bool,
    flip_v: bool,
    flip_h: bool,
    orientation: ScreenOrientation,
    viewport: (u32, u32),
    gate: VisibilityGate,
    pose: Matrix4<f32>,
    projection: Option<Matrix4<f32>>,
    eye_offset: Matrix4<f32>,
    projection_dirty: bool,
}

impl CameraPoseProjector {
    pub fn new(near: f32, far: f32, seconds_to_remain_visible: f64) -> Self {
        Self {
            name: "camera".into(),
            mode: CameraMode::Video,
            eye: StereoEye::Left,
            fit: ViewportFit::Fill,
            h_align: HorizontalAlign::Center,
            v_align: VerticalAlign::Center,
            near,
            far,
            rotate90: false,
            flip_v: false,
            flip_h: false,
            orientation: ScreenOrientation::LandscapeLeft,
            viewport: (0, 0),
            gate: VisibilityGate::new(seconds_to_remain_visible),
            pose: Matrix4::identity(),
            projection: None,
            eye_offset: Matrix4::identity(),
            projection_dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Viewport pixel dimensions as reported by the platform (unswapped).
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if self.viewport != (width, height) {
            self.viewport = (width, height);
            self.projection_dirty = true;
        }
    }

    pub fn set_orientation(&mut self, orientation: ScreenOrientation) {
        if self.orientation != orientation {
            self.orientation = orientation;
            self.projection_dirty = true;
        }
    }

    pub fn set_fit(&mut self, fit: ViewportFit) {
        self.fit = fit;
        self.projection_dirty = true;
    }

    pub fn set_alignment(&mut self, h_align: HorizontalAlign, v_align: VerticalAlign) {
        self.h_align = h_align;
        self.v_align = v_align;
        self.projection_dirty = true;
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.projection_dirty = true;
    }

    /// Post-transforms applied to the fetched projection, in this order:
    /// 90° rotation, vertical flip, horizontal flip.
    pub fn set_post_transforms(&mut self, rotate90: bool, flip_v: bool, flip_h: bool) {
        self.rotate90 = rotate90;
        self.flip_v = flip_v;
        self.flip_h = flip_h;
        self.projection_dirty = true;
    }

    pub fn set_mode(&mut self, mode: CameraMode) {
        self.mode = mode;
        self.projection_dirty = true;
    }

    pub fn set_eye(&mut self, eye: StereoEye) {
        if self.eye != eye {
            self.eye = eye;
            self.projection_dirty = true;
        }
    }

    pub fn eye(&self) -> StereoEye {
        self.eye
    }

    /// Force a projection recompute on the next tick (engine restart).
    pub fn mark_projection_dirty(&mut self) {
        self.projection_dirty = true;
    }

    /// Current projection matrix, if one has ever been computed.
    pub fn projection(&self) -> Option<&Matrix4<f32>> {
        self.projection.as_ref()
    }

    /// Camera world pose. Meaningful while `shows_content()` is true.
    pub fn pose(&self) -> &Matrix4<f32> {
        &self.pose
    }

    pub fn visibility(&self) -> Visibility {
        self.gate.state()
    }

    pub fn shows_content(&self) -> bool {
        self.gate.shows_content()
    }

    /// Recompute the projection if the viewport geometry changed.
    ///
    /// On any engine failure the previously-set projection is retained and
    /// the recompute retried next tick; a zero or garbage matrix is never
    /// applied.
    pub fn update_projection<E: TrackingEngine>(&mut self, engine: &mut E) {
        if !self.projection_dirty {
            return;
        }
        let (vw, vh) = self.viewport;
        if vw == 0 || vh == 0 {
            return;
        }
        match self.mode.clone() {
            CameraMode::Video => {
                let (mut w, mut h) = (vw, vh);
                if self.orientation.is_portrait() {
                    // engine assumes landscape
                    std::mem::swap(&mut w, &mut h);
                }
                let params = ViewportParams {
                    width: w,
                    height: h,
                    fit: self.fit,
                    h_align: self.h_align,
                    v_align: self.v_align,
                    near: self.near,
                    far: self.far,
                };
                let result = match self.eye {
                    StereoEye::Left => engine.projection_for_viewport(&params),
                    StereoEye::Right => engine.projection_for_viewport_right(&params),
                };
                match result {
                    Ok(raw) => {
                        self.projection = Some(self.apply_post_transforms(from_raw(&raw)));
                        self.projection_dirty = false;
                    }
                    Err(e) => warn!("viewport projection unavailable: {e}"),
                }
            }
            CameraMode::Optical { source, eye_separation } => {
                let params = match &source {
                    Some(src) => engine.load_optical_calibration(src, self.near, self.far),
                    None => Ok(default_optical_params(self.viewport, self.near, self.far)),
                };
                match params {
                    Ok(p) => {
                        let mut eye_raw = from_raw(&p.eye_offset);
                        if self.eye == StereoEye::Right {
                            // lateral displacement applied in tracker space,
                            // before scale/handedness conversion
                            eye_raw[(0, 3)] += eye_separation * 1000.0;
                        }
                        self.eye_offset = pose_from_engine(&to_raw(&eye_raw));
                        self.projection = Some(from_raw(&p.projection));
                        self.projection_dirty = false;
                    }
                    Err(e) => warn!("optical calibration unavailable: {e}"),
                }
            }
        }
    }

    /// Advance the camera pose one tick from the elected reference.
    ///
    /// In optical mode the eye offset composes with the reference pose
    /// before inversion: the camera pose is `(eye_offset · reference)⁻¹`
    /// rather than plain `reference⁻¹`.
    pub fn update_pose(
        &mut self,
        registry: &TrackableRegistry,
        reference: Option<TrackableHandle>,
        now: f64,
    ) -> Vec<EventKind> {
        let mut visible = false;
        let mut pose = None;
        if let Some(t) = reference.and_then(|h| registry.get(h)) {
            if t.visible() {
                visible = true;
                let target = match self.eye {
                    StereoEye::Right => t.pose_right().unwrap_or_else(|| t.pose()),
                    StereoEye::Left => t.pose(),
                };
                pose = invert_pose(&(self.eye_offset * target));
            }
        }
        if visible {
            if let Some(p) = pose {
                self.pose = p;
            }
        }
        self.gate.update(visible, now)
    }

    fn apply_post_transforms(&self, projection: Matrix4<f32>) -> Matrix4<f32> {
        let mut p = projection;
        if self.rotate90 {
            p = rotation_z_degrees(90.0) * p;
        }
        if self.flip_v {
            p = Matrix4::from_diagonal(&Vector4::new(1.0, -1.0, 1.0, 1.0)) * p;
        }
        if self.flip_h {
            p = Matrix4::from_diagonal(&Vector4::new(-1.0, 1.0, 1.0, 1.0)) * p;
        }
        let correction = self.orientation.correction_degrees();
        if correction != 0.0 {
            p = rotation_z_degrees(correction) * p;
        }
        p
    }
}

fn rotation_z_degrees(degrees: f32) -> Matrix4<f32> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians()).to_homogeneous()
}

/// Built-in stand-in calibration when optical mode has no source: identity
/// eye offset and a plain perspective projection.
fn default_optical_params(viewport: (u32, u32), near: f32, far: f32) -> OpticalParams {
    let aspect = if viewport.1 > 0 {
        viewport.0 as f32 / viewport.1 as f32
    } else {
        4.0 / 3.0
    };
    let fovy = 45.0f32;
    let projection = Perspective3::new(aspect, fovy.to_radians(), near, far).to_homogeneous();
    OpticalParams {
        fovy,
        aspect,
        eye_offset: to_raw(&Matrix4::identity()),
        projection: to_raw(&projection),
    }
}
