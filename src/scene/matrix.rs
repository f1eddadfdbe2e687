//! Pose matrix conversion between tracker space and scene space.
//!
//! Tracking engines deliver 4x4 poses as column-major `[f32; 16]` arrays in
//! a right-handed, millimetre-scaled coordinate system. The scene graph uses
//! left-handed, metre-scaled poses. All conversion happens here, at the
//! boundary, so the rest of the crate only ever sees scene-space matrices.

use log::warn;
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

/// Millimetres (tracker space) to metres (scene space).
const MM_TO_M: f32 = 0.001;

/// Build a `Matrix4` from a column-major 16-float array.
#[inline]
pub fn from_raw(raw: &[f32; 16]) -> Matrix4<f32> {
    Matrix4::from_column_slice(raw)
}

/// Flatten a `Matrix4` back into a column-major 16-float array.
#[inline]
pub fn to_raw(m: &Matrix4<f32>) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    out.copy_from_slice(m.as_slice());
    out
}

/// Convert a pose between right-handed and left-handed conventions.
///
/// Negates row 2, then column 2. The axis convention is the same on both
/// sides (normal -> +x, orthogonal -> +y, approach -> +z), so applying the
/// conversion twice yields the original matrix.
pub fn convert_handedness(m: &Matrix4<f32>) -> Matrix4<f32> {
    let mut out = *m;
    for c in 0..4 {
        out[(2, c)] = -out[(2, c)];
    }
    for r in 0..4 {
        out[(r, 2)] = -out[(r, 2)];
    }
    out
}

/// Rescale the translation components of a pose from millimetres to metres.
pub fn rescale_translation(m: &Matrix4<f32>) -> Matrix4<f32> {
    let mut out = *m;
    out[(0, 3)] *= MM_TO_M;
    out[(1, 3)] *= MM_TO_M;
    out[(2, 3)] *= MM_TO_M;
    out
}

/// Convert a raw engine pose into a scene-space pose.
///
/// Rescales millimetres to metres, then converts handedness. This is the
/// single ingestion point used for trackable poses, optical eye offsets and
/// sub-pattern transforms.
pub fn pose_from_engine(raw: &[f32; 16]) -> Matrix4<f32> {
    convert_handedness(&rescale_translation(&from_raw(raw)))
}

/// The translation column of a pose.
#[inline]
pub fn extract_position(m: &Matrix4<f32>) -> Vector3<f32> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// The orientation of a pose, built from its approach (+z) and up (+y)
/// basis columns via a look-rotation construction.
///
/// A zero approach column means the engine handed over a degenerate matrix
/// for an untracked target; that case falls back to the identity rotation
/// and logs a warning instead of failing.
pub fn extract_orientation(m: &Matrix4<f32>) -> UnitQuaternion<f32> {
    let forward = Vector3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)]);
    let up = Vector3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)]);

    if forward.norm_squared() <= f32::EPSILON {
        warn!("degenerate pose matrix (zero approach column), using identity orientation");
        return UnitQuaternion::identity();
    }

    let z = forward.normalize();
    let x = up.cross(&z);
    if x.norm_squared() <= f32::EPSILON {
        warn!("degenerate pose matrix (up parallel to approach), using identity orientation");
        return UnitQuaternion::identity();
    }
    let x = x.normalize();
    let y = z.cross(&x);

    let rot = Matrix3::from_columns(&[x, y, z]);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot))
}

/// Invert a pose, warning instead of panicking on a singular matrix.
///
/// Rigid poses are always invertible; a `None` here means the engine
/// produced garbage, in which case the caller skips the frame.
pub fn invert_pose(m: &Matrix4<f32>) -> Option<Matrix4<f32>> {
    let inv = m.try_inverse();
    if inv.is_none() {
        warn!("pose matrix is singular, skipping");
    }
    inv
}
