use crate::math::{self as m, Angle};

use itertools::izip;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

//

pub mod body;
pub use body::{Body, BodyConfig, BodyState, BodyType};

mod bitmatrix;

pub mod collision;
use collision::{find_contacts, point_in_shape, DetectedContact, PlacedShape, SpatialGrid};
pub use collision::{Contact, Geometry, GridParams, Shape, ShapeConfig};

pub mod dispatch;
use dispatch::{CollisionHandler, Commands, HandlerSet, MovedEvent, MovedListener, Resolved};

pub mod entity_set;
use entity_set::EntitySet;
pub use entity_set::{BodyKey, ShapeKey};

mod solver;
use solver::{integrate_forces, ContactSolver, SolverBody, SolverParams};

//

/// Velocity of an object.
///
// Equivalent to a Vec3 but with names for the translational and rotational part.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Velocity {
    /// Linear velocity in pixels per second.
    pub linear: m::Vec2,
    /// Angular velocity in radians per second, counterclockwise.
    pub angular: f64,
}

impl Default for Velocity {
    fn default() -> Self {
        Velocity {
            linear: m::Vec2::zero(),
            angular: 0.0,
        }
    }
}

impl Velocity {
    /// Get the linear velocity of a point offset from the center of mass.
    pub fn point_velocity(&self, offset: m::Vec2) -> m::Vec2 {
        let tangent = m::left_normal(offset) * self.angular;
        self.linear + tangent
    }

    pub fn apply_to_pose(&self, dt: f64, mut pose: m::Pose) -> m::Pose {
        let scaled = *self * dt;
        pose.append_translation(scaled.linear);
        pose.prepend_rotation(Angle::Rad(scaled.angular).into());
        // keep floating point drift from accumulating into a scale
        pose.rotation.normalize();
        pose
    }
}

impl std::ops::Add for Velocity {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            linear: self.linear + other.linear,
            angular: self.angular + other.angular,
        }
    }
}
impl std::ops::AddAssign for Velocity {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}
impl std::ops::Mul<f64> for Velocity {
    type Output = Velocity;

    fn mul(self, rhs: f64) -> Self::Output {
        Velocity {
            linear: self.linear * rhs,
            angular: self.angular * rhs,
        }
    }
}

/// Errors reported by the physics world.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Body {0:?} does not exist")]
    NotFound(BodyKey),
    #[error("Shape {0:?} does not exist")]
    ShapeNotFound(ShapeKey),
    #[error("Body {0:?} has a non-finite state and was skipped")]
    DegenerateBody(BodyKey),
}

/// Global parameters of a physics world.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct WorldParams {
    /// Acceleration applied to every dynamic body, in pixels per second squared.
    pub gravity: [f64; 2],
    /// Damping of bodies that don't set their own.
    pub damping: f64,
    /// Maximum number of contact solver iterations per step.
    pub solver_iterations: usize,
    /// The contact solver stops early once no impulse changes by more than this.
    pub convergence_threshold: f64,
    /// Fraction of penetration resolved per step.
    pub baumgarte: f64,
    /// Penetration depth left alone by position correction.
    pub slop: f64,
    /// Contacts approaching slower than this don't bounce.
    pub restitution_threshold: f64,
    /// Smallest change of position or rotation that counts as moving.
    pub moved_epsilon: f64,
    pub grid: GridParams,
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            gravity: [0.0, -981.0],
            damping: 0.0,
            solver_iterations: 10,
            convergence_threshold: 1e-4,
            baumgarte: 0.2,
            slop: 0.1,
            restitution_threshold: 1.0,
            moved_epsilon: 1e-9,
            grid: GridParams::default(),
        }
    }
}

impl WorldParams {
    #[inline]
    pub fn with_gravity(mut self, gravity: impl Into<[f64; 2]>) -> Self {
        self.gravity = gravity.into();
        self
    }

    #[inline]
    pub fn with_grid(mut self, grid: GridParams) -> Self {
        self.grid = grid;
        self
    }

    fn validate(&self) -> Result<(), PhysicsError> {
        let invalid = |msg: String| Err(PhysicsError::InvalidConfig(msg));
        let non_negative = |v: f64| v >= 0.0 && v.is_finite();

        if !self.gravity.iter().all(|g| g.is_finite()) {
            return invalid(format!("gravity must be finite, got {:?}", self.gravity));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return invalid(format!("damping must be in [0, 1], got {}", self.damping));
        }
        if self.solver_iterations == 0 {
            return invalid("the solver needs at least one iteration".to_string());
        }
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return invalid(format!("baumgarte must be in [0, 1], got {}", self.baumgarte));
        }
        for (value, name) in [
            (self.convergence_threshold, "convergence threshold"),
            (self.slop, "slop"),
            (self.restitution_threshold, "restitution threshold"),
            (self.moved_epsilon, "moved epsilon"),
        ] {
            if !non_negative(value) {
                return invalid(format!("{name} must be non-negative, got {value}"));
            }
        }
        self.grid.validate()
    }

    fn solver_params(&self) -> SolverParams {
        SolverParams {
            max_iterations: self.solver_iterations,
            convergence_threshold: self.convergence_threshold,
            baumgarte: self.baumgarte,
            slop: self.slop,
            restitution_threshold: self.restitution_threshold,
        }
    }
}

/// What a body is standing on, recorded during the last step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grounding {
    /// The most upward-facing contact normal, pointing out of the ground.
    pub normal: m::Unit<m::Vec2>,
    /// The body underneath.
    pub body: BodyKey,
    /// Linear velocity of the body underneath, e.g. a moving platform.
    pub ground_velocity: m::Vec2,
}

/// Summary of what happened during a step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepReport {
    /// Number of shape pairs in contact, including sensors and filtered contacts.
    pub contact_count: usize,
    /// Iterations the contact solver ran.
    pub solver_iterations: usize,
    /// Bodies removed by collision handlers, in the order they were removed.
    pub removed: Vec<BodyKey>,
    /// Problems with individual bodies that didn't stop the step,
    /// currently only [`PhysicsError::DegenerateBody`].
    pub warnings: Vec<PhysicsError>,
}

/// Working copies of body state for one step.
///
/// Buffers are kept separate from the bodies themselves
/// to make it simpler to mutate things without breaking borrowing rules.
/// Indexed in ascending body key order.
#[derive(Debug, Default)]
struct Frame {
    keys: Vec<BodyKey>,
    slot_to_idx: Vec<Option<usize>>,
    body_types: Vec<BodyType>,
    old_poses: Vec<m::Pose>,
    poses: Vec<m::Pose>,
    old_velocities: Vec<Velocity>,
    solver_bodies: Vec<SolverBody>,
    max_velocities: Vec<body::MaxVelocity>,
    /// Healthy bodies take part in the step, degenerate ones are left as they were.
    degenerate: Vec<bool>,
}

impl Frame {
    fn gather(&mut self, entities: &EntitySet) {
        self.keys.clear();
        self.slot_to_idx.clear();
        self.slot_to_idx.resize(entities.body_slot_bound(), None);
        self.body_types.clear();
        self.old_poses.clear();
        self.poses.clear();
        self.old_velocities.clear();
        self.solver_bodies.clear();
        self.max_velocities.clear();
        self.degenerate.clear();

        for (idx, (key, body)) in entities.bodies().enumerate() {
            self.keys.push(key);
            self.slot_to_idx[key.slot()] = Some(idx);
            self.body_types.push(body.body_type());
            self.old_poses.push(*body.pose());
            self.poses.push(*body.pose());
            self.old_velocities.push(body.velocity());
            self.solver_bodies.push(SolverBody {
                position: body.position(),
                velocity: body.velocity(),
                inv_mass: body.inverse_mass(),
                inv_moment: body.inverse_moment_of_inertia(),
            });
            self.max_velocities.push(*body.max_velocity());
            self.degenerate.push(false);
            if !body.is_finite() {
                self.mark_degenerate(idx);
            }
        }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn index_of(&self, key: BodyKey) -> Option<usize> {
        let idx = (*self.slot_to_idx.get(key.slot())?)?;
        (self.keys[idx] == key).then_some(idx)
    }

    fn is_dynamic(&self, idx: usize) -> bool {
        self.body_types[idx] == BodyType::Dynamic && !self.degenerate[idx]
    }

    /// Exclude a body from the rest of the step and restore its state from before it,
    /// still respecting its speed limits.
    fn mark_degenerate(&mut self, idx: usize) {
        self.degenerate[idx] = true;
        self.poses[idx] = self.old_poses[idx];
        let mut velocity = self.old_velocities[idx];
        velocity.linear = self.max_velocities[idx].clamp(velocity.linear);
        self.solver_bodies[idx].velocity = velocity;
    }
}

/// A 2D physics world: bodies, their shapes, and the handlers reacting to their contacts.
///
/// Several worlds can exist side by side; nothing is shared between them.
pub struct World {
    params: WorldParams,
    entities: EntitySet,
    grid: SpatialGrid,
    solver: ContactSolver,
    handlers: HandlerSet,
    moved_listeners: Vec<MovedListener>,
    commands: Commands,
    frame: Frame,
}

impl Default for World {
    fn default() -> Self {
        Self::from_valid_params(WorldParams::default())
    }
}

impl World {
    /// Create an empty world. Fails if the parameters are out of range.
    pub fn new(params: WorldParams) -> Result<Self, PhysicsError> {
        params.validate()?;
        Ok(Self::from_valid_params(params))
    }

    fn from_valid_params(params: WorldParams) -> Self {
        Self {
            params,
            entities: EntitySet::new(),
            grid: SpatialGrid::new(&params.grid),
            solver: ContactSolver::new(params.solver_params()),
            handlers: HandlerSet::default(),
            moved_listeners: Vec::new(),
            commands: Commands::default(),
            frame: Frame::default(),
        }
    }

    #[inline]
    pub fn params(&self) -> &WorldParams {
        &self.params
    }

    //
    // bodies
    //

    /// Add a body to the world. Nothing changes if the config is invalid.
    pub fn add_body(&mut self, config: BodyConfig) -> Result<BodyKey, PhysicsError> {
        let body = Body::from_config(&config, self.params.damping)?;
        Ok(self.entities.insert_body(body))
    }

    /// Remove a body and all of its shapes.
    pub fn remove_body(&mut self, key: BodyKey) -> Result<(), PhysicsError> {
        self.entities
            .remove_body(key)
            .map(|_| ())
            .ok_or(PhysicsError::NotFound(key))
    }

    /// Access a body if it still exists.
    #[inline]
    pub fn body(&self, key: BodyKey) -> Option<&Body> {
        self.entities.get_body(key)
    }

    /// Iterate over all bodies in ascending key order.
    pub fn bodies(&self) -> impl '_ + Iterator<Item = (BodyKey, &Body)> {
        self.entities.bodies()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.entities.body_count()
    }

    pub fn get_state(&self, key: BodyKey) -> Result<BodyState, PhysicsError> {
        self.body_ref(key).map(Body::state)
    }

    /// Set a force applied to the body every step until changed.
    /// Only affects dynamic bodies.
    pub fn set_force(&mut self, key: BodyKey, force: m::Vec2) -> Result<(), PhysicsError> {
        self.body_mut(key)?.force = force;
        Ok(())
    }

    /// Change the velocity of a dynamic body immediately by `impulse / mass`.
    /// Does nothing to static and kinematic bodies.
    pub fn apply_impulse(&mut self, key: BodyKey, impulse: m::Vec2) -> Result<(), PhysicsError> {
        let body = self.body_mut(key)?;
        let inv_mass = body.inverse_mass();
        body.velocity.linear += impulse * inv_mass;
        Ok(())
    }

    /// Overwrite the linear velocity of a body. Static bodies stay still regardless.
    pub fn set_velocity(&mut self, key: BodyKey, velocity: m::Vec2) -> Result<(), PhysicsError> {
        let body = self.body_mut(key)?;
        if body.body_type() != BodyType::Static {
            body.velocity.linear = velocity;
        }
        Ok(())
    }

    /// Teleport a body. Its rotation and velocity are unchanged.
    pub fn set_position(&mut self, key: BodyKey, position: m::Vec2) -> Result<(), PhysicsError> {
        self.body_mut(key)?.pose.translation = position;
        Ok(())
    }

    fn body_ref(&self, key: BodyKey) -> Result<&Body, PhysicsError> {
        self.entities.get_body(key).ok_or(PhysicsError::NotFound(key))
    }

    fn body_mut(&mut self, key: BodyKey) -> Result<&mut Body, PhysicsError> {
        self.entities
            .get_body_mut(key)
            .ok_or(PhysicsError::NotFound(key))
    }

    //
    // shapes
    //

    /// Attach a shape to a body.
    pub fn add_shape(
        &mut self,
        body: BodyKey,
        config: ShapeConfig,
    ) -> Result<ShapeKey, PhysicsError> {
        if !self.entities.contains_body(body) {
            return Err(PhysicsError::NotFound(body));
        }
        let shape = Shape::from_config(body, &config)?;
        self.entities.attach_shape(body, shape)
    }

    pub fn remove_shape(&mut self, key: ShapeKey) -> Result<(), PhysicsError> {
        self.entities
            .remove_shape(key)
            .map(|_| ())
            .ok_or(PhysicsError::ShapeNotFound(key))
    }

    #[inline]
    pub fn shape(&self, key: ShapeKey) -> Option<&Shape> {
        self.entities.get_shape(key)
    }

    /// Remove every body and shape. Handlers and listeners stay registered.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.solver.clear_cache();
    }

    //
    // events
    //

    pub fn add_collision_handler(&mut self, handler: CollisionHandler) {
        self.handlers.push(handler);
    }

    /// Register a function called for every body that moved during a step.
    pub fn add_moved_listener(&mut self, listener: impl FnMut(&MovedEvent) + 'static) {
        self.moved_listeners.push(Box::new(listener));
    }

    //
    // queries
    //

    /// Detect contacts in the current state of the world without stepping.
    pub fn query_contacts(&mut self) -> Vec<Contact> {
        self.frame.gather(&self.entities);
        self.detect()
            .iter()
            .map(|contact| contact.to_contact(0.0))
            .collect()
    }

    /// Find the first body, in key order, with a shape containing the point.
    pub fn query_point(&self, point: m::Vec2) -> Option<BodyKey> {
        let mut hits = self.entities.shapes().filter_map(|(_, shape)| {
            let body = self.entities.get_body(shape.body())?;
            let pose = shape.world_pose(body.pose());
            let inside = shape.kind.aabb(&pose).contains_point(point)
                && point_in_shape(point, &pose, shape.kind);
            inside.then_some(shape.body())
        });
        let first = hits.next()?;
        Some(hits.fold(first, |best, key| best.min(key)))
    }

    /// What the body was standing on after the last step, if anything.
    pub fn check_grounding(&self, key: BodyKey) -> Result<Option<Grounding>, PhysicsError> {
        Ok(self.body_ref(key)?.grounding)
    }

    /// Whether the body touched the ground during the last step.
    /// False for bodies that don't exist.
    pub fn is_on_ground(&self, key: BodyKey) -> bool {
        matches!(self.check_grounding(key), Ok(Some(_)))
    }

    //
    // stepping
    //

    /// Run collision detection on the bodies gathered into the frame.
    fn detect(&mut self) -> Vec<DetectedContact> {
        let frame = &self.frame;
        let candidates: Vec<(ShapeKey, &Shape, usize)> = self
            .entities
            .shapes()
            .filter_map(|(key, shape)| {
                let idx = frame.index_of(shape.body())?;
                (!frame.degenerate[idx]).then_some((key, shape, idx))
            })
            .collect();

        #[cfg(feature = "parallel")]
        let candidate_iter = candidates.par_iter();
        #[cfg(not(feature = "parallel"))]
        let candidate_iter = candidates.iter();
        let placed: Vec<PlacedShape> = candidate_iter
            .map(|&(key, shape, idx)| {
                PlacedShape::new(key, shape, idx, &frame.poses[idx], frame.is_dynamic(idx))
            })
            .collect();

        find_contacts(&mut self.grid, &placed)
    }

    /// Advance the world by `dt` seconds.
    ///
    /// Integrates forces, resolves contacts, moves bodies, then runs collision handlers
    /// in contact order and notifies moved listeners.
    /// A `dt` of zero does nothing at all.
    pub fn step(&mut self, dt: f64) -> Result<StepReport, PhysicsError> {
        let _span = tracy_span!("physics step", "step");

        if !(dt >= 0.0 && dt.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!(
                "timestep must be non-negative and finite, got {dt}"
            )));
        }
        let mut report = StepReport::default();
        if dt == 0.0 {
            return Ok(report);
        }

        self.frame.gather(&self.entities);

        //
        // external forces
        //

        let gravity = m::Vec2::from(self.params.gravity);
        for idx in 0..self.frame.len() {
            if !self.frame.is_dynamic(idx) {
                continue;
            }
            let Some(body) = self.entities.get_body(self.frame.keys[idx]) else {
                continue;
            };
            let vel = &mut self.frame.solver_bodies[idx].velocity;
            integrate_forces(vel, gravity, body.force(), body.inverse_mass(), body.damping(), dt);
            if !(m::vec_is_finite(vel.linear) && vel.angular.is_finite()) {
                self.frame.mark_degenerate(idx);
            }
        }

        //
        // contacts
        //

        let contacts = self.detect();
        report.contact_count = contacts.len();

        let resolved: Vec<Option<Resolved>> = contacts
            .iter()
            .map(|c| {
                if self.handlers.is_empty() {
                    return None;
                }
                let tags = c.bodies.map(|key| {
                    self.entities
                        .get_body(key)
                        .and_then(|body| body.collision_type())
                });
                self.handlers.resolve(tags)
            })
            .collect();
        let accepted: Vec<bool> = contacts
            .iter()
            .zip(&resolved)
            .map(|(contact, resolved)| match resolved {
                Some(r) => {
                    let keep = self.handlers.accepts(*r, &contact.to_contact(0.0));
                    if !keep {
                        log::debug!("contact between {:?} filtered out", contact.bodies);
                    }
                    keep
                }
                None => true,
            })
            .collect();
        let solid: Vec<bool> = contacts
            .iter()
            .zip(&accepted)
            .map(|(contact, accepted)| *accepted && !contact.sensor)
            .collect();

        let outcome = self
            .solver
            .solve(&mut self.frame.solver_bodies, &contacts, &solid, dt);
        report.solver_iterations = outcome.iterations;

        //
        // speed limits and movement
        //

        for idx in 0..self.frame.len() {
            if self.frame.degenerate[idx] || self.frame.body_types[idx] == BodyType::Static {
                continue;
            }
            // semi-implicit Euler integration: use velocities at the end of the time step
            let vel = &mut self.frame.solver_bodies[idx].velocity;
            vel.linear = self.frame.max_velocities[idx].clamp(vel.linear);
            let pose = vel.apply_to_pose(dt, self.frame.poses[idx]);
            let finite = m::pose_is_finite(&pose)
                && m::vec_is_finite(vel.linear)
                && vel.angular.is_finite();
            if finite {
                self.frame.poses[idx] = pose;
            } else {
                self.frame.mark_degenerate(idx);
            }
        }

        let groundings = self.find_groundings(&contacts, &solid);

        //
        // write back
        //

        for (key, pose, solver_body, degenerate, grounding) in izip!(
            &self.frame.keys,
            &self.frame.poses,
            &self.frame.solver_bodies,
            &self.frame.degenerate,
            groundings
        ) {
            let Some(body) = self.entities.get_body_mut(*key) else {
                continue;
            };
            body.pose = *pose;
            body.velocity = solver_body.velocity;
            body.degenerate = *degenerate;
            body.grounding = grounding;
            if *degenerate {
                log::warn!("body {key:?} has a non-finite state, skipping it");
                report.warnings.push(PhysicsError::DegenerateBody(*key));
            }
        }

        //
        // collision handlers
        //

        for (contact, resolved, accepted, impulse) in
            izip!(&contacts, &resolved, &accepted, &outcome.impulses)
        {
            let (Some(resolved), true) = (resolved, *accepted) else {
                continue;
            };
            // an earlier handler may have removed one of the bodies
            if !contact.bodies.iter().all(|b| self.entities.contains_body(*b)) {
                continue;
            }
            self.handlers
                .invoke(*resolved, &contact.to_contact(*impulse), &mut self.commands);
            for key in self.commands.drain_removals() {
                if self.entities.remove_body(key).is_some() {
                    report.removed.push(key);
                } else {
                    log::debug!("ignoring removal of {key:?} which no longer exists");
                }
            }
        }

        //
        // moved notifications
        //

        if !self.moved_listeners.is_empty() {
            let epsilon = self.params.moved_epsilon;
            let frame = &self.frame;
            for (key, old_pose, pose) in izip!(&frame.keys, &frame.old_poses, &frame.poses) {
                if !self.entities.contains_body(*key) {
                    continue;
                }
                let moved_by = (pose.translation - old_pose.translation).mag();
                let turn = pose.rotation * old_pose.rotation.reversed();
                let turned_by = Angle::from(turn).rad().abs();
                if moved_by <= epsilon && turned_by <= epsilon {
                    continue;
                }
                let event = MovedEvent {
                    body: *key,
                    position: pose.translation,
                    rotation: m::pose_angle(pose),
                };
                for listener in &mut self.moved_listeners {
                    listener(&event);
                }
            }
        }

        log::trace!(
            "stepped {} bodies, {} contacts, {} solver iterations",
            self.frame.len(),
            report.contact_count,
            report.solver_iterations
        );
        Ok(report)
    }

    /// For each dynamic body, the solid contact
    /// whose normal points most upward out of the other body.
    fn find_groundings(
        &self,
        contacts: &[DetectedContact],
        solid: &[bool],
    ) -> Vec<Option<Grounding>> {
        let mut groundings: Vec<Option<Grounding>> = vec![None; self.frame.len()];
        for (contact, _) in contacts.iter().zip(solid).filter(|(_, solid)| **solid) {
            for side in 0..2 {
                let idx = contact.body_idx[side];
                if !self.frame.is_dynamic(idx) {
                    continue;
                }
                // the normal points from bodies[0] to bodies[1]
                let up = if side == 1 {
                    contact.normal
                } else {
                    -contact.normal
                };
                let other = 1 - side;
                let better = match &groundings[idx] {
                    Some(current) => up.y > current.normal.y,
                    None => up.y > 0.0,
                };
                if better {
                    groundings[idx] = Some(Grounding {
                        normal: up,
                        body: contact.bodies[other],
                        ground_velocity: self.frame.solver_bodies[contact.body_idx[other]]
                            .velocity
                            .linear,
                    });
                }
            }
        }
        groundings
    }
}
