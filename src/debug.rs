//! Overlay draw commands for inspecting the pipeline from an embedder.

use crate::math::Point2d;
use crate::util::lock;
use serde_json::{json, Value};
use std::sync::Mutex;

static DEBUG_FRAME: Mutex<Vec<Value>> = Mutex::new(Vec::new());

/// Records a polyline, e.g. the head of a waypoint buffer.
pub fn debug_polyline(name: &str, points: impl IntoIterator<Item = Point2d>) {
    let points: Vec<[f64; 2]> = points.into_iter().map(|p| [p.x, p.y]).collect();
    lock(&DEBUG_FRAME).push(json!({
        "type": "polyline",
        "name": name,
        "points": points,
    }));
}

/// Records a closed polygon, e.g. a geodesic boundary.
pub fn debug_polygon(name: &str, verts: impl IntoIterator<Item = Point2d>) {
    let verts: Vec<[f64; 2]> = verts.into_iter().map(|p| [p.x, p.y]).collect();
    lock(&DEBUG_FRAME).push(json!({
        "type": "polygon",
        "name": name,
        "verts": verts,
    }));
}

/// Takes everything drawn since the last call, across all stage threads.
pub fn take_debug_frame() -> Value {
    json!(std::mem::take(&mut *lock(&DEBUG_FRAME)))
}
