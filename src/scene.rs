mod anchor;
mod camera;
mod events;
mod matrix;
mod origin;
mod registry;
mod trackable;
mod visibility;

pub use anchor::{Anchor, VisibilityGate, compute_world_pose};
pub use camera::{CameraMode, CameraPoseProjector, ScreenOrientation, StereoEye};
pub use events::{EventDispatcher, EventKind, TrackingEvent};
pub use matrix::{
    convert_handedness, extract_orientation, extract_position, from_raw, invert_pose,
    pose_from_engine, rescale_translation, to_raw,
};
pub use origin::{ReferenceSelector, SelectionMode};
pub use registry::{TrackableHandle, TrackableRegistry};
pub use trackable::{
    LoadState, NFT_DATASET_EXTENSIONS, NO_ID, PatternDescriptor, PatternImage, Trackable,
    TrackableConfig, TrackableId, TrackableKind, TrackableOption,
};
pub use visibility::Visibility;
