//! Mathematical structs and functions.

use cgmath::{InnerSpace, Point2, Point3, Vector2, Vector3};
pub use polygon::*;

mod polygon;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// Projects a vector onto the xy plane and normalizes it.
/// Returns `None` for vectors with no planar extent.
pub fn flat_unit(v: Vector3d) -> Option<Vector2d> {
    let flat = Vector2d::new(v.x, v.y);
    if flat.magnitude() > 2.0 * f64::EPSILON {
        Some(flat.normalize())
    } else {
        None
    }
}

/// Drops the z component of a point.
pub fn flatten(p: Point3d) -> Point2d {
    Point2d::new(p.x, p.y)
}

/// Planar dot product between a heading and the direction towards a target,
/// both unit-normalized. A degenerate heading or a target on top of the
/// reference point yields zero.
pub fn deviation_dot(forward: Vector3d, location: Point3d, target: Point3d) -> f64 {
    let (Some(heading), Some(next)) = (flat_unit(forward), flat_unit(target - location)) else {
        return 0.0;
    };
    heading.dot(next)
}

/// The z component of the planar cross product between a heading and the
/// direction towards a target, both unit-normalized.
pub fn deviation_cross(forward: Vector3d, location: Point3d, target: Point3d) -> f64 {
    let (Some(heading), Some(next)) = (flat_unit(forward), flat_unit(target - location)) else {
        return 0.0;
    };
    heading.x * next.y - heading.y * next.x
}
