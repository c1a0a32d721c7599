use super::{
    collision::{Geometry, Shape},
    Body, PhysicsError,
};

use std::hash::{Hash, Hasher};
use thunderdome as td;

macro_rules! arena_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name(pub(super) td::Index);

        impl $name {
            /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
            /// Useful for creating your own mappings from physics objects to other things
            /// such as sprites.
            #[inline]
            pub fn index(&self) -> td::Index {
                self.0
            }

            /// Position of the object in its arena. Unique among living objects
            /// and used for deterministic ordering.
            #[inline]
            pub(crate) fn slot(&self) -> usize {
                self.0.slot() as usize
            }

            #[inline]
            pub(crate) fn bits(&self) -> u64 {
                self.0.to_bits()
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.bits().hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                (self.slot(), self.bits()).cmp(&(other.slot(), other.bits()))
            }
        }
    };
}

arena_key! {
    /// Key type to look up a body stored in the physics world.
    ///
    /// Keys are generational: once a body is removed, its key never refers to anything again,
    /// even if the storage slot is reused by a later body.
    BodyKey
}

arena_key! {
    /// Key type to look up a shape stored in the physics world.
    ShapeKey
}

/// Internal storage of the physics world, comprised of bodies and the shapes attached to them.
///
/// Every shape belongs to exactly one body, and removing a body removes its shapes
/// in the same call so that they can never take part in collision detection again.
#[derive(Default)]
pub struct EntitySet {
    pub(super) bodies: td::Arena<Body>,
    pub(super) shapes: td::Arena<Shape>,
}

impl EntitySet {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Access a [`Body`][super::Body] in the physics world, if it still exists.
    #[inline]
    pub fn get_body(&self, body: BodyKey) -> Option<&Body> {
        self.bodies.get(body.0)
    }

    #[inline]
    pub(crate) fn get_body_mut(&mut self, body: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(body.0)
    }

    #[inline]
    pub fn contains_body(&self, body: BodyKey) -> bool {
        self.bodies.contains(body.0)
    }

    /// Access a [`Shape`][super::collision::Shape] in the physics world, if it still exists.
    #[inline]
    pub fn get_shape(&self, shape: ShapeKey) -> Option<&Shape> {
        self.shapes.get(shape.0)
    }

    /// Iterate over all bodies in storage order.
    pub fn bodies(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter().map(|(idx, body)| (BodyKey(idx), body))
    }

    /// Iterate over all shapes in storage order.
    pub fn shapes(&self) -> impl '_ + Iterator<Item = (ShapeKey, &Shape)> {
        self.shapes.iter().map(|(idx, shape)| (ShapeKey(idx), shape))
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// One past the highest slot index in use by a body.
    pub(crate) fn body_slot_bound(&self) -> usize {
        self.bodies
            .iter()
            .map(|(idx, _)| idx.slot() as usize + 1)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn insert_body(&mut self, body: Body) -> BodyKey {
        BodyKey(self.bodies.insert(body))
    }

    /// Attach a shape to a body. Recomputes the body's moment of inertia
    /// if it's derived from its shapes.
    pub(crate) fn attach_shape(
        &mut self,
        body_key: BodyKey,
        shape: Shape,
    ) -> Result<ShapeKey, PhysicsError> {
        if !self.bodies.contains(body_key.0) {
            return Err(PhysicsError::NotFound(body_key));
        }
        let shape_key = ShapeKey(self.shapes.insert(shape));
        let body = &mut self.bodies[body_key.0];
        body.shapes.push(shape_key);
        refresh_moment(body, &self.shapes);
        Ok(shape_key)
    }

    /// Remove a body and every shape attached to it, returning the body if it still existed.
    pub(crate) fn remove_body(&mut self, body_key: BodyKey) -> Option<Body> {
        let body = self.bodies.remove(body_key.0)?;
        for shape in &body.shapes {
            self.shapes.remove(shape.0);
        }
        Some(body)
    }

    /// Remove a single shape, detaching it from its body.
    pub(crate) fn remove_shape(&mut self, shape_key: ShapeKey) -> Option<Shape> {
        let shape = self.shapes.remove(shape_key.0)?;
        if let Some(body) = self.bodies.get_mut(shape.body.0) {
            body.shapes.retain(|s| *s != shape_key);
            refresh_moment(body, &self.shapes);
        }
        Some(shape)
    }

    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.shapes.clear();
    }
}

fn refresh_moment(body: &mut Body, shapes: &td::Arena<Shape>) {
    let geometry: Vec<Geometry> = body
        .shapes
        .iter()
        .filter_map(|key| shapes.get(key.0))
        .map(|shape| *shape.geometry())
        .collect();
    body.refresh_moment(geometry.iter());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{body::BodyConfig, collision::ShapeConfig, Geometry};

    fn body(config: BodyConfig) -> Body {
        Body::from_config(&config, 0.0).unwrap()
    }

    fn shape(body: BodyKey, geometry: Geometry) -> Shape {
        Shape::from_config(body, &ShapeConfig::new(geometry)).unwrap()
    }

    #[test]
    fn removing_body_removes_its_shapes() {
        let mut set = EntitySet::new();
        let b1 = set.insert_body(body(BodyConfig::new_dynamic(1.0)));
        let b2 = set.insert_body(body(BodyConfig::new_static()));
        let s1 = set.attach_shape(b1, shape(b1, Geometry::circle(1.0))).unwrap();
        let s2 = set.attach_shape(b1, shape(b1, Geometry::rect(1.0, 2.0))).unwrap();
        let s3 = set.attach_shape(b2, shape(b2, Geometry::rect(10.0, 1.0))).unwrap();

        assert!(set.remove_body(b1).is_some());
        assert!(set.get_shape(s1).is_none());
        assert!(set.get_shape(s2).is_none());
        assert!(set.get_shape(s3).is_some());
        assert_eq!(set.shape_count(), 1);
        assert!(set.remove_body(b1).is_none());
    }

    #[test]
    fn keys_are_not_reused() {
        let mut set = EntitySet::new();
        let b1 = set.insert_body(body(BodyConfig::new_dynamic(1.0)));
        set.remove_body(b1);
        let b2 = set.insert_body(body(BodyConfig::new_dynamic(1.0)));
        // the slot is recycled but the old key stays dead
        assert_eq!(b1.slot(), b2.slot());
        assert_ne!(b1, b2);
        assert!(set.get_body(b1).is_none());
        assert!(set.get_body(b2).is_some());
    }

    #[test]
    fn attaching_to_missing_body_fails() {
        let mut set = EntitySet::new();
        let b1 = set.insert_body(body(BodyConfig::new_dynamic(1.0)));
        set.remove_body(b1);
        let result = set.attach_shape(b1, shape(b1, Geometry::circle(1.0)));
        assert_eq!(result, Err(PhysicsError::NotFound(b1)));
        assert_eq!(set.shape_count(), 0);
    }

    #[test]
    fn derived_moment_follows_shapes() {
        let mut set = EntitySet::new();
        let b = set.insert_body(body(BodyConfig::new_dynamic(2.0)));
        assert_eq!(set.get_body(b).unwrap().inverse_moment_of_inertia(), 0.0);

        let s = set.attach_shape(b, shape(b, Geometry::circle(1.0))).unwrap();
        // solid disc: I = m r^2 / 2
        let moi = set.get_body(b).unwrap().moment_of_inertia().unwrap();
        assert!((moi - 1.0).abs() < 1e-9);

        set.remove_shape(s);
        assert!(set.get_body(b).unwrap().moment_of_inertia().is_none());
        assert!(set.get_body(b).unwrap().shapes().is_empty());
    }

    #[test]
    fn derived_moment_combines_shapes() {
        let mut set = EntitySet::new();
        let b = set.insert_body(body(BodyConfig::new_dynamic(2.0)));
        let disc = set.attach_shape(b, shape(b, Geometry::circle(1.0))).unwrap();
        let offset_disc = Geometry::circle(1.0).with_offset([2.0, 0.0]);
        set.attach_shape(b, shape(b, offset_disc)).unwrap();
        // each disc carries half the mass; the offset one adds m d^2
        let moi = set.get_body(b).unwrap().moment_of_inertia().unwrap();
        assert!((moi - (0.5 + 0.5 + 4.0)).abs() < 1e-9, "moi = {moi}");

        set.remove_shape(disc);
        // the remaining disc has all the mass, 2 * (0.5 + 4)
        let moi = set.get_body(b).unwrap().moment_of_inertia().unwrap();
        assert!((moi - 9.0).abs() < 1e-9, "moi = {moi}");
    }
}
