//! Collision detection: shapes, the broad phase grid and narrow phase intersection tests.

use crate::{
    math::{self as m, Unit},
    physics::{BodyKey, ShapeKey},
};

mod grid;
pub use grid::GridParams;
pub(crate) use grid::SpatialGrid;

mod narrowphase;
use narrowphase::intersection_check;

mod query;
pub(crate) use query::point_in_shape;

mod shape;
pub(crate) use shape::ShapeKind;
pub use shape::{Geometry, Shape, ShapeConfig, AABB};

/// A contact between two bodies, as reported to collision handlers and by
/// [`World::query_contacts`][crate::physics::World::query_contacts].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    pub bodies: [BodyKey; 2],
    pub shapes: [ShapeKey; 2],
    /// Unit normal pointing from `bodies[0]` towards `bodies[1]`.
    pub normal: Unit<m::Vec2>,
    /// Deepest penetration among the points of the contact.
    pub depth: f64,
    /// Contact point in world space, the mean of the contact's points.
    pub point: m::Vec2,
    /// Total normal impulse the solver applied to separate the bodies.
    /// Zero for sensors and contacts that weren't solved.
    pub normal_impulse: f64,
    /// Whether either shape is a sensor.
    pub sensor: bool,
}

impl Contact {
    /// The same contact seen from the other body.
    pub fn flipped(&self) -> Self {
        Self {
            bodies: [self.bodies[1], self.bodies[0]],
            shapes: [self.shapes[1], self.shapes[0]],
            normal: -self.normal,
            ..*self
        }
    }
}

/// A shape positioned in the world for one round of collision detection.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlacedShape {
    pub key: ShapeKey,
    pub body: BodyKey,
    /// Index of the body in the per-step working arrays.
    pub body_idx: usize,
    pub kind: ShapeKind,
    pub pose: m::Pose,
    pub aabb: AABB,
    pub friction: f64,
    pub elasticity: f64,
    pub sensor: bool,
    /// Whether the owning body responds to contacts.
    pub dynamic: bool,
}

impl PlacedShape {
    pub fn new(
        key: ShapeKey,
        shape: &Shape,
        body_idx: usize,
        body_pose: &m::Pose,
        dynamic: bool,
    ) -> Self {
        let pose = shape.world_pose(body_pose);
        Self {
            key,
            body: shape.body,
            body_idx,
            kind: shape.kind,
            pose,
            aabb: shape.kind.aabb(&pose),
            friction: shape.friction(),
            elasticity: shape.elasticity(),
            sensor: shape.is_sensor(),
            dynamic,
        }
    }
}

/// A single point of a detected contact in world space.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ContactPointWorld {
    /// Midpoint between the surfaces of the two shapes.
    pub position: m::Vec2,
    pub depth: f64,
}

/// Narrow phase output for one pair of shapes, oriented so that `bodies[0] < bodies[1]`.
#[derive(Clone, Debug)]
pub(crate) struct DetectedContact {
    pub bodies: [BodyKey; 2],
    pub body_idx: [usize; 2],
    pub shapes: [ShapeKey; 2],
    pub normal: Unit<m::Vec2>,
    pub points: Vec<ContactPointWorld>,
    pub friction: f64,
    pub restitution: f64,
    pub sensor: bool,
}

impl DetectedContact {
    pub fn to_contact(&self, normal_impulse: f64) -> Contact {
        let depth = self.points.iter().map(|p| p.depth).fold(f64::MIN, f64::max);
        let point = self
            .points
            .iter()
            .fold(m::Vec2::zero(), |acc, p| acc + p.position)
            / self.points.len().max(1) as f64;
        Contact {
            bodies: self.bodies,
            shapes: self.shapes,
            normal: self.normal,
            depth,
            point,
            normal_impulse,
            sensor: self.sensor,
        }
    }

    fn sort_key(&self) -> (BodyKey, BodyKey, ShapeKey, ShapeKey) {
        (self.bodies[0], self.bodies[1], self.shapes[0], self.shapes[1])
    }
}

/// Find all contacts between the given shapes, in deterministic order.
///
/// Shapes must be given in ascending key order. Pairs on the same body and pairs where
/// neither body responds to contacts are skipped.
pub(crate) fn find_contacts(
    grid: &mut SpatialGrid,
    shapes: &[PlacedShape],
) -> Vec<DetectedContact> {
    let _span = tracy_span!("find contacts", "find_contacts");

    grid.prepare(shapes.len());
    let mut contacts = Vec::new();
    for (id, shape) in shapes.iter().enumerate() {
        for other_id in grid.test_and_insert(id, shape.aabb) {
            let other = &shapes[other_id];
            if other.body == shape.body || !(other.dynamic || shape.dynamic) {
                continue;
            }
            if let Some(contact) = check_pair(other, shape) {
                contacts.push(contact);
            }
        }
    }
    contacts.sort_by_key(DetectedContact::sort_key);
    log::trace!("narrow phase found {} contacts", contacts.len());
    contacts
}

fn check_pair(s1: &PlacedShape, s2: &PlacedShape) -> Option<DetectedContact> {
    // orient by body so that every contact between two bodies faces the same way
    let (s1, s2) = if s2.body < s1.body { (s2, s1) } else { (s1, s2) };
    let manifold = intersection_check(&s1.pose, s1.kind, &s2.pose, s2.kind);
    let mut normal = None;
    let points: Vec<ContactPointWorld> = manifold
        .iter()
        .map(|c| {
            normal.get_or_insert(c.normal);
            let ([p1, p2], depth) = c.resolve(&s1.pose, &s2.pose);
            ContactPointWorld {
                position: (p1 + p2) * 0.5,
                depth,
            }
        })
        .collect();
    let normal = normal?;
    Some(DetectedContact {
        bodies: [s1.body, s2.body],
        body_idx: [s1.body_idx, s2.body_idx],
        shapes: [s1.key, s2.key],
        normal,
        points,
        friction: s1.friction * s2.friction,
        restitution: s1.elasticity * s2.elasticity,
        sensor: s1.sensor || s2.sensor,
    })
}
