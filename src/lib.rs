//! A deterministic 2D rigid body physics core for platformer games.
//!
//! Bodies live in a [`World`][physics::World] and are addressed with [`BodyKey`]s.
//! Each call to [`World::step`][physics::World::step] integrates forces, resolves contacts,
//! dispatches collision handlers and notifies listeners of bodies that moved.

/// Open a profiling span that lasts until the end of the enclosing scope.
/// Does nothing unless the `tracy` feature is enabled and a client is running.
macro_rules! tracy_span {
    ($name:expr, $fn_name:expr) => {
        tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), $fn_name, file!(), line!(), 0))
    };
}

pub mod math;
pub use math::{uv, Angle, Pose, Rotor2, Unit, Vec2};

pub mod physics;
pub use physics::{
    body::{Body, BodyConfig, BodyState, BodyType, Mass, MaxVelocity, Moment},
    collision::{Contact, Geometry, GridParams, Shape, ShapeConfig, AABB},
    dispatch::{CollisionHandler, CollisionType, Commands, MovedEvent, TagPattern},
    entity_set::{BodyKey, ShapeKey},
    Grounding, PhysicsError, StepReport, Velocity, World, WorldParams,
};
