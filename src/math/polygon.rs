use super::{Point2d, Vector2d};
use cgmath::InnerSpace;
use itertools::Itertools;
use smallvec::SmallVec;

/// A convex polygon in the xy plane.
#[derive(Clone, Debug)]
pub struct ConvexPolygon {
    verts: SmallVec<[Point2d; 4]>,
}

impl ConvexPolygon {
    /// Creates a polygon from its vertices, wound consistently.
    pub fn new(verts: impl IntoIterator<Item = Point2d>) -> Self {
        Self {
            verts: verts.into_iter().collect(),
        }
    }

    /// The polygon's vertices.
    pub fn verts(&self) -> &[Point2d] {
        &self.verts
    }

    /// Returns true if the two polygons intersect, using a separating
    /// axis test over the edge normals of both polygons.
    pub fn overlaps(&self, other: &ConvexPolygon) -> bool {
        if self.verts.len() < 3 || other.verts.len() < 3 {
            return false;
        }
        self.axes()
            .chain(other.axes())
            .all(|axis| intervals_touch(self.project(axis), other.project(axis)))
    }

    /// The outward normals of the polygon's edges.
    fn axes(&self) -> impl Iterator<Item = Vector2d> + '_ {
        self.verts
            .iter()
            .circular_tuple_windows()
            .map(|(&a, &b)| {
                let edge = b - a;
                Vector2d::new(-edge.y, edge.x)
            })
    }

    /// Projects the polygon onto an axis, returning the covered interval.
    fn project(&self, axis: Vector2d) -> (f64, f64) {
        self.verts
            .iter()
            .map(|v| Vector2d::new(v.x, v.y).dot(axis))
            .minmax()
            .into_option()
            .unwrap_or((0.0, 0.0))
    }
}

fn intervals_touch((min_a, max_a): (f64, f64), (min_b, max_b): (f64, f64)) -> bool {
    max_a >= min_b && max_b >= min_a
}
