//! Trackable entity: configuration, load lifecycle and per-frame state.

use log::warn;
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::TrackError;

/// Identifier assigned by the tracking engine when a trackable is loaded.
pub type TrackableId = i32;

/// Sentinel id for a trackable with no engine-side resource.
pub const NO_ID: TrackableId = -1;

/// File extensions an NFT dataset must resolve before it can load.
pub const NFT_DATASET_EXTENSIONS: [&str; 3] = ["iset", "fset", "fset3"];

/// The kind of real-world target a trackable represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackableKind {
    SinglePattern,
    SingleBarcode,
    MultiMarker,
    Nft,
    TwoDImage,
    /// Created by the engine itself when autocreation is enabled.
    Unknown,
}

/// Kind-specific trackable configuration.
///
/// Widths are in metres; they are converted to millimetres when the engine
/// configuration string is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackableConfig {
    /// Square marker identified by raw pattern buffer contents.
    SinglePattern { pattern: String, width: f32 },
    /// Square marker identified by a matrix barcode id.
    SingleBarcode { barcode_id: u32, width: f32 },
    /// Rigid set of markers described by a config file.
    MultiMarker { config_file: String },
    /// Natural-feature-tracking dataset (base path without extension).
    Nft { dataset: String },
    /// Planar image target.
    TwoDImage { image: String, width: f32 },
    /// No payload; the engine already owns the resource.
    Unknown,
}

impl TrackableConfig {
    pub fn kind(&self) -> TrackableKind {
        match self {
            TrackableConfig::SinglePattern { .. } => TrackableKind::SinglePattern,
            TrackableConfig::SingleBarcode { .. } => TrackableKind::SingleBarcode,
            TrackableConfig::MultiMarker { .. } => TrackableKind::MultiMarker,
            TrackableConfig::Nft { .. } => TrackableKind::Nft,
            TrackableConfig::TwoDImage { .. } => TrackableKind::TwoDImage,
            TrackableConfig::Unknown => TrackableKind::Unknown,
        }
    }

    /// Check that the required payload for this kind is present.
    pub fn validate(&self) -> Result<(), TrackError> {
        match self {
            TrackableConfig::SinglePattern { pattern, width } => {
                if pattern.is_empty() {
                    return Err(TrackError::Configuration("empty pattern buffer".into()));
                }
                if *width <= 0.0 {
                    return Err(TrackError::Configuration("pattern width must be positive".into()));
                }
            }
            TrackableConfig::SingleBarcode { width, .. } => {
                if *width <= 0.0 {
                    return Err(TrackError::Configuration("barcode width must be positive".into()));
                }
            }
            TrackableConfig::MultiMarker { config_file } => {
                if config_file.is_empty() {
                    return Err(TrackError::Configuration("missing multimarker config file".into()));
                }
            }
            TrackableConfig::Nft { dataset } => {
                if dataset.is_empty() {
                    return Err(TrackError::Configuration("missing NFT dataset name".into()));
                }
            }
            TrackableConfig::TwoDImage { image, width } => {
                if image.is_empty() {
                    return Err(TrackError::Configuration("missing 2D image reference".into()));
                }
                if *width <= 0.0 {
                    return Err(TrackError::Configuration("2D image width must be positive".into()));
                }
            }
            TrackableConfig::Unknown => {}
        }
        Ok(())
    }

    /// Build the engine configuration string for this trackable.
    pub fn engine_config_string(&self) -> Option<String> {
        match self {
            TrackableConfig::SinglePattern { pattern, width } => Some(format!(
                "single_buffer;{};buffer={}",
                width * 1000.0,
                pattern
            )),
            TrackableConfig::SingleBarcode { barcode_id, width } => {
                Some(format!("single_barcode;{};{}", barcode_id, width * 1000.0))
            }
            TrackableConfig::MultiMarker { config_file } => Some(format!("multi;{}", config_file)),
            TrackableConfig::Nft { dataset } => Some(format!("nft;{}", dataset)),
            TrackableConfig::TwoDImage { image, width } => {
                Some(format!("2d;{};{}", image, width * 1000.0))
            }
            TrackableConfig::Unknown => None,
        }
    }

    /// File references that must be locally resident before loading.
    pub fn asset_refs(&self) -> Vec<String> {
        match self {
            TrackableConfig::MultiMarker { config_file } => vec![config_file.clone()],
            TrackableConfig::Nft { dataset } => NFT_DATASET_EXTENSIONS
                .iter()
                .map(|ext| format!("{}.{}", dataset, ext))
                .collect(),
            TrackableConfig::TwoDImage { image, .. } => vec![image.clone()],
            _ => Vec::new(),
        }
    }
}

/// Load lifecycle of a trackable's engine-side resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No engine resource; load will be retried lazily.
    #[default]
    Unloaded,
    /// Asset staging in flight; queries and duplicate loads are skipped.
    Staging,
    /// Engine resource assigned.
    Loaded,
    /// Last load attempt failed; not retried until an explicit re-load.
    Failed(String),
}

/// Per-trackable option, pushed to the engine when loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackableOption {
    Filtered(bool),
    FilterSampleRate(f32),
    FilterCutoffFreq(f32),
    ContinuousPoseEstimation(bool),
    NftScale(f32),
}

/// Locally cached option values. Survives reloads; getters never re-query
/// the engine.
#[derive(Debug, Clone, Copy, Default)]
struct OptionCache {
    filtered: Option<bool>,
    filter_sample_rate: Option<f32>,
    filter_cutoff_freq: Option<f32>,
    continuous_pose_estimation: Option<bool>,
    nft_scale: Option<f32>,
}

/// Grayscale texel image of a sub-pattern, as reported by the engine.
#[derive(Debug, Clone)]
pub struct PatternImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One visual sub-pattern of a loaded trackable.
///
/// Multimarker sets report one descriptor per member marker; single markers
/// report one; NFT datasets may report none.
#[derive(Debug, Clone)]
pub struct PatternDescriptor {
    pub index: usize,
    /// Local transform relative to the trackable, metre-scaled, left-handed.
    pub local_pose: Matrix4<f32>,
    /// Edge length in metres.
    pub size: f32,
    pub image: Option<PatternImage>,
}

/// An entity whose real-world pose is estimated by the tracking engine.
#[derive(Debug, Clone)]
pub struct Trackable {
    /// Human-assigned tag used by dependents to reference this trackable.
    pub tag: String,
    config: TrackableConfig,
    id: TrackableId,
    state: LoadState,
    /// Bumped on every unload; in-flight staging results carrying an older
    /// generation are discarded.
    generation: u64,
    options: OptionCache,
    patterns: Vec<PatternDescriptor>,
    visible: bool,
    pose: Matrix4<f32>,
    pose_right: Option<Matrix4<f32>>,
}

impl Trackable {
    pub fn new(tag: impl Into<String>, config: TrackableConfig) -> Self {
        Self {
            tag: tag.into(),
            config,
            id: NO_ID,
            state: LoadState::Unloaded,
            generation: 0,
            options: OptionCache::default(),
            patterns: Vec::new(),
            visible: false,
            pose: Matrix4::identity(),
            pose_right: None,
        }
    }

    pub fn kind(&self) -> TrackableKind {
        self.config.kind()
    }

    pub fn config(&self) -> &TrackableConfig {
        &self.config
    }

    /// Replace the configuration. The reset also clears any sticky load
    /// error from the old config; a fresh load is expected to follow.
    pub(crate) fn replace_config(&mut self, config: TrackableConfig) {
        self.config = config;
        self.reset();
    }

    pub fn id(&self) -> TrackableId {
        self.id
    }

    pub fn load_state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    pub fn load_in_flight(&self) -> bool {
        self.state == LoadState::Staging
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Current scene-space pose. Meaningful only while `visible()` is true
    /// for the most recent update; dependents must consult `visible()`
    /// before reading.
    pub fn pose(&self) -> &Matrix4<f32> {
        &self.pose
    }

    /// Stereo right-eye pose, when the last update requested one.
    pub fn pose_right(&self) -> Option<&Matrix4<f32>> {
        self.pose_right.as_ref()
    }

    pub fn patterns(&self) -> &[PatternDescriptor] {
        &self.patterns
    }

    pub(crate) fn mark_staging(&mut self) {
        self.state = LoadState::Staging;
    }

    pub(crate) fn mark_loaded(&mut self, id: TrackableId, patterns: Vec<PatternDescriptor>) {
        self.id = id;
        self.patterns = patterns;
        self.state = LoadState::Loaded;
    }

    pub(crate) fn mark_failed(&mut self, reason: String) {
        self.state = LoadState::Failed(reason);
        self.id = NO_ID;
    }

    /// Clear engine association, poses and descriptors. Any staging task
    /// still in flight becomes stale via the generation bump.
    pub(crate) fn reset(&mut self) {
        self.id = NO_ID;
        self.state = LoadState::Unloaded;
        self.generation += 1;
        self.patterns.clear();
        self.visible = false;
        self.pose = Matrix4::identity();
        self.pose_right = None;
    }

    pub(crate) fn set_visible(&mut self, pose: Matrix4<f32>, pose_right: Option<Matrix4<f32>>) {
        self.visible = true;
        self.pose = pose;
        self.pose_right = pose_right;
    }

    pub(crate) fn clear_visible(&mut self) {
        self.visible = false;
        self.pose_right = None;
    }

    /// Cache an option value locally. Returns true when the value should be
    /// pushed to the engine now (loaded, no staging in flight); the caller
    /// performs the push. Options set while unloaded are queued and applied
    /// on the next successful load.
    pub fn set_option(&mut self, opt: TrackableOption) -> bool {
        match opt {
            TrackableOption::Filtered(v) => self.options.filtered = Some(v),
            TrackableOption::FilterSampleRate(v) => self.options.filter_sample_rate = Some(v),
            TrackableOption::FilterCutoffFreq(v) => self.options.filter_cutoff_freq = Some(v),
            TrackableOption::ContinuousPoseEstimation(v) => {
                if !matches!(
                    self.kind(),
                    TrackableKind::SinglePattern | TrackableKind::SingleBarcode
                ) {
                    warn!(
                        "continuous pose estimation ignored for {:?} trackable '{}'",
                        self.kind(),
                        self.tag
                    );
                    return false;
                }
                self.options.continuous_pose_estimation = Some(v);
            }
            TrackableOption::NftScale(v) => {
                if self.kind() != TrackableKind::Nft {
                    warn!("NFT scale ignored for {:?} trackable '{}'", self.kind(), self.tag);
                    return false;
                }
                self.options.nft_scale = Some(v);
            }
        }
        self.is_loaded()
    }

    pub fn filtered(&self) -> Option<bool> {
        self.options.filtered
    }

    pub fn filter_sample_rate(&self) -> Option<f32> {
        self.options.filter_sample_rate
    }

    pub fn filter_cutoff_freq(&self) -> Option<f32> {
        self.options.filter_cutoff_freq
    }

    pub fn continuous_pose_estimation(&self) -> Option<bool> {
        self.options.continuous_pose_estimation
    }

    pub fn nft_scale(&self) -> Option<f32> {
        self.options.nft_scale
    }

    /// All cached options, in push order. Applied after a successful load.
    pub(crate) fn queued_options(&self) -> Vec<TrackableOption> {
        let mut opts = Vec::new();
        if let Some(v) = self.options.filtered {
            opts.push(TrackableOption::Filtered(v));
        }
        if let Some(v) = self.options.filter_sample_rate {
            opts.push(TrackableOption::FilterSampleRate(v));
        }
        if let Some(v) = self.options.filter_cutoff_freq {
            opts.push(TrackableOption::FilterCutoffFreq(v));
        }
        if let Some(v) = self.options.continuous_pose_estimation {
            opts.push(TrackableOption::ContinuousPoseEstimation(v));
        }
        if let Some(v) = self.options.nft_scale {
            opts.push(TrackableOption::NftScale(v));
        }
        opts
    }
}
