use super::{
    collision::Geometry, dispatch::CollisionType, entity_set::ShapeKey, Grounding, PhysicsError,
    Velocity,
};
use crate::math as m;

/// The type of a body determines how it is treated in physics updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum BodyType {
    /// The default type of body; responds to forces and collisions.
    Dynamic,
    /// Moves according to its own velocity but is not affected by forces or collisions.
    /// Useful for moving platforms.
    Kinematic,
    /// Never moves.
    Static,
}

/// Mass or moment of inertia of a body, which can be infinite.
///
/// This stores both a mass value and its inverse, because calculating inverse mass
/// is expensive and needed a lot in physics calculations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mass {
    Finite { mass: f64, inverse: f64 },
    Infinite,
}

impl From<f64> for Mass {
    #[inline]
    fn from(mass: f64) -> Self {
        Mass::Finite {
            mass,
            inverse: 1.0 / mass,
        }
    }
}

impl Mass {
    /// Get the inverse of the mass, which is zero if the mass is infinite.
    #[inline]
    pub fn inv(&self) -> f64 {
        match self {
            Mass::Finite { inverse, .. } => *inverse,
            Mass::Infinite => 0.0,
        }
    }

    /// Get the mass if it's finite.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            Mass::Finite { mass, .. } => Some(*mass),
            Mass::Infinite => None,
        }
    }

    #[inline]
    fn is_usable(&self) -> bool {
        match self {
            Mass::Finite { mass, inverse } => mass.is_finite() && inverse.is_finite(),
            Mass::Infinite => true,
        }
    }
}

/// How the moment of inertia of a dynamic body is determined.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Moment {
    /// Computed from the body's mass and the geometry of its shapes,
    /// recomputed whenever a shape is added or removed.
    /// Infinite as long as the body has no shapes with area.
    Derived,
    /// A fixed moment of inertia.
    Fixed(f64),
    /// The body never rotates. Typical for platformer characters.
    Infinite,
}

/// Optional per-axis speed limits for a body.
///
/// Limits truncate each axis independently, so a body moving diagonally
/// can exceed the horizontal limit in total speed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct MaxVelocity {
    pub horizontal: Option<f64>,
    pub vertical: Option<f64>,
}

impl MaxVelocity {
    #[inline]
    pub fn clamp(&self, v: m::Vec2) -> m::Vec2 {
        let mut v = v;
        if let Some(h) = self.horizontal {
            v.x = v.x.clamp(-h, h);
        }
        if let Some(vert) = self.vertical {
            v.y = v.y.clamp(-vert, vert);
        }
        v
    }

    fn validate(&self) -> Result<(), PhysicsError> {
        for (limit, axis) in [(self.horizontal, "horizontal"), (self.vertical, "vertical")] {
            if let Some(limit) = limit {
                if !(limit >= 0.0) {
                    return Err(PhysicsError::InvalidConfig(format!(
                        "max {axis} velocity must be non-negative, got {limit}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Everything needed to create a body.
///
/// Vectors are plain arrays so that level files can describe bodies without
/// knowing about the math library.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(default))]
pub struct BodyConfig {
    pub body_type: BodyType,
    pub position: [f64; 2],
    pub rotation: m::Angle,
    pub velocity: [f64; 2],
    pub angular_velocity: f64,
    /// Mass of the body. Only meaningful for dynamic bodies.
    pub mass: f64,
    pub moment: Moment,
    /// Fraction of velocity lost per second in the absence of forces, in [0, 1].
    /// Uses the world's default if not set.
    pub damping: Option<f64>,
    pub max_velocity: MaxVelocity,
    pub collision_type: Option<CollisionType>,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self::new_dynamic(1.0)
    }
}

impl BodyConfig {
    /// Dynamic bodies respond to forces and collisions.
    pub fn new_dynamic(mass: f64) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: [0.0, 0.0],
            rotation: m::Angle::default(),
            velocity: [0.0, 0.0],
            angular_velocity: 0.0,
            mass,
            moment: Moment::Derived,
            damping: None,
            max_velocity: MaxVelocity::default(),
            collision_type: None,
        }
    }

    /// Kinematic bodies move by their own velocity and push dynamic bodies around.
    pub fn new_kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            moment: Moment::Infinite,
            ..Self::new_dynamic(1.0)
        }
    }

    /// Static bodies do not move at all.
    pub fn new_static() -> Self {
        Self {
            body_type: BodyType::Static,
            moment: Moment::Infinite,
            ..Self::new_dynamic(1.0)
        }
    }

    #[inline]
    pub fn with_position(mut self, pos: impl Into<[f64; 2]>) -> Self {
        self.position = pos.into();
        self
    }

    #[inline]
    pub fn with_rotation(mut self, angle: m::Angle) -> Self {
        self.rotation = angle;
        self
    }

    #[inline]
    pub fn with_velocity(mut self, vel: impl Into<[f64; 2]>) -> Self {
        self.velocity = vel.into();
        self
    }

    #[inline]
    pub fn with_angular_velocity(mut self, angular: f64) -> Self {
        self.angular_velocity = angular;
        self
    }

    #[inline]
    pub fn with_moment(mut self, moment: Moment) -> Self {
        self.moment = moment;
        self
    }

    #[inline]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = Some(damping);
        self
    }

    #[inline]
    pub fn with_max_horizontal_velocity(mut self, limit: f64) -> Self {
        self.max_velocity.horizontal = Some(limit);
        self
    }

    #[inline]
    pub fn with_max_vertical_velocity(mut self, limit: f64) -> Self {
        self.max_velocity.vertical = Some(limit);
        self
    }

    #[inline]
    pub fn with_collision_type(mut self, ty: impl Into<CollisionType>) -> Self {
        self.collision_type = Some(ty.into());
        self
    }

    fn validate(&self, damping: f64) -> Result<(), PhysicsError> {
        let invalid = |msg: String| Err(PhysicsError::InvalidConfig(msg));

        if self.body_type == BodyType::Dynamic && !(self.mass > 0.0 && self.mass.is_finite()) {
            return invalid(format!(
                "dynamic bodies need a positive finite mass, got {}",
                self.mass
            ));
        }
        if !(0.0..=1.0).contains(&damping) {
            return invalid(format!("damping must be in [0, 1], got {damping}"));
        }
        if let Moment::Fixed(moi) = self.moment {
            if !(moi > 0.0 && moi.is_finite()) {
                return invalid(format!(
                    "moment of inertia must be positive and finite, got {moi}"
                ));
            }
        }
        let finite = self.position.iter().all(|c| c.is_finite())
            && self.velocity.iter().all(|c| c.is_finite())
            && self.rotation.rad().is_finite()
            && self.angular_velocity.is_finite();
        if !finite {
            return invalid("initial position and velocity must be finite".to_string());
        }
        self.max_velocity.validate()
    }
}

/// A body is something that moves (or doesn't), owning zero or more shapes.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) pose: m::Pose,
    pub(crate) velocity: Velocity,
    pub(crate) mass: Mass,
    moment: Moment,
    pub(crate) moment_of_inertia: Mass,
    pub(crate) damping: f64,
    pub(crate) max_velocity: MaxVelocity,
    pub(crate) collision_type: Option<CollisionType>,
    pub(crate) force: m::Vec2,
    pub(crate) shapes: Vec<ShapeKey>,
    pub(crate) degenerate: bool,
    pub(crate) grounding: Option<Grounding>,
}

impl Body {
    /// Build a body from a config, using `default_damping` if the config doesn't set one.
    pub(crate) fn from_config(
        config: &BodyConfig,
        default_damping: f64,
    ) -> Result<Self, PhysicsError> {
        let damping = config.damping.unwrap_or(default_damping);
        config.validate(damping)?;

        let dynamic = config.body_type == BodyType::Dynamic;
        let mass = if dynamic {
            Mass::from(config.mass)
        } else {
            Mass::Infinite
        };
        let moment_of_inertia = match (dynamic, config.moment) {
            (true, Moment::Fixed(moi)) => Mass::from(moi),
            // derived moment needs shapes, which are attached later
            _ => Mass::Infinite,
        };
        let velocity = match config.body_type {
            BodyType::Static => Velocity::default(),
            _ => Velocity {
                linear: m::Vec2::from(config.velocity),
                angular: config.angular_velocity,
            },
        };

        Ok(Self {
            body_type: config.body_type,
            pose: m::pose_from_parts(m::Vec2::from(config.position), config.rotation),
            velocity,
            mass,
            moment: config.moment,
            moment_of_inertia,
            damping,
            max_velocity: config.max_velocity,
            collision_type: config.collision_type.clone(),
            force: m::Vec2::zero(),
            shapes: Vec::new(),
            degenerate: false,
            grounding: None,
        })
    }

    /// Recompute a derived moment of inertia from the given shape geometries,
    /// distributing mass evenly over their combined area.
    pub(crate) fn refresh_moment<'a>(&mut self, geometry: impl Iterator<Item = &'a Geometry>) {
        let (Moment::Derived, Mass::Finite { mass, .. }) = (self.moment, self.mass) else {
            return;
        };
        let (area, second_moment) = geometry.fold((0.0, 0.0), |(area, sm), g| {
            (area + g.area(), sm + g.second_moment_of_area())
        });
        self.moment_of_inertia = if area > 0.0 {
            Mass::from(mass * second_moment / area)
        } else {
            Mass::Infinite
        };
    }

    // accessors

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    #[inline]
    pub fn pose(&self) -> &m::Pose {
        &self.pose
    }

    #[inline]
    pub fn position(&self) -> m::Vec2 {
        self.pose.translation
    }

    /// Rotation of the body in radians.
    #[inline]
    pub fn rotation(&self) -> f64 {
        m::pose_angle(&self.pose)
    }

    #[inline]
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Returns the mass of the body if finite, otherwise None.
    #[inline]
    pub fn mass(&self) -> Option<f64> {
        self.mass.value()
    }

    /// Returns the inverse mass of the body, which is zero if the mass is infinite.
    #[inline]
    pub fn inverse_mass(&self) -> f64 {
        match self.body_type {
            BodyType::Dynamic => self.mass.inv(),
            _ => 0.0,
        }
    }

    /// Returns the moment of inertia of the body if finite, otherwise None.
    #[inline]
    pub fn moment_of_inertia(&self) -> Option<f64> {
        self.moment_of_inertia.value()
    }

    #[inline]
    pub fn inverse_moment_of_inertia(&self) -> f64 {
        match self.body_type {
            BodyType::Dynamic => self.moment_of_inertia.inv(),
            _ => 0.0,
        }
    }

    #[inline]
    pub fn damping(&self) -> f64 {
        self.damping
    }

    #[inline]
    pub fn max_velocity(&self) -> &MaxVelocity {
        &self.max_velocity
    }

    #[inline]
    pub fn collision_type(&self) -> Option<&CollisionType> {
        self.collision_type.as_ref()
    }

    /// The force currently applied to the body every step.
    #[inline]
    pub fn force(&self) -> m::Vec2 {
        self.force
    }

    #[inline]
    pub fn shapes(&self) -> &[ShapeKey] {
        &self.shapes
    }

    /// Whether the body was skipped during the last step because its state wasn't finite.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    #[inline]
    pub fn grounding(&self) -> Option<&Grounding> {
        self.grounding.as_ref()
    }

    #[inline]
    pub fn state(&self) -> BodyState {
        BodyState {
            position: self.pose.translation,
            velocity: self.velocity.linear,
            rotation: self.rotation(),
            angular_velocity: self.velocity.angular,
        }
    }

    /// Check that every quantity the integrator reads is finite.
    pub(crate) fn is_finite(&self) -> bool {
        self.mass.is_usable()
            && self.moment_of_inertia.is_usable()
            && m::pose_is_finite(&self.pose)
            && m::vec_is_finite(self.velocity.linear)
            && self.velocity.angular.is_finite()
            && m::vec_is_finite(self.force)
    }
}

/// A snapshot of the kinematic state of a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub position: m::Vec2,
    pub velocity: m::Vec2,
    /// Rotation in radians.
    pub rotation: f64,
    pub angular_velocity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_dynamic_mass() {
        for mass in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Body::from_config(&BodyConfig::new_dynamic(mass), 0.0);
            assert!(
                matches!(result, Err(PhysicsError::InvalidConfig(_))),
                "mass {mass} was accepted"
            );
        }
        // mass is ignored for bodies that never see forces
        let mut config = BodyConfig::new_static();
        config.mass = -5.0;
        assert!(Body::from_config(&config, 0.0).is_ok());
    }

    #[test]
    fn rejects_bad_damping_and_limits() {
        let config = BodyConfig::new_dynamic(1.0).with_damping(1.5);
        assert!(Body::from_config(&config, 0.0).is_err());
        assert!(Body::from_config(&BodyConfig::new_dynamic(1.0), -0.1).is_err());

        let config = BodyConfig::new_dynamic(1.0).with_max_horizontal_velocity(-1.0);
        assert!(Body::from_config(&config, 0.0).is_err());
        let config = BodyConfig::new_dynamic(1.0).with_max_vertical_velocity(f64::NAN);
        assert!(Body::from_config(&config, 0.0).is_err());
    }

    #[test]
    fn rejects_non_finite_fixed_moment() {
        for moi in [f64::INFINITY, f64::NAN, 0.0] {
            let config = BodyConfig::new_dynamic(1.0).with_moment(Moment::Fixed(moi));
            assert!(
                matches!(Body::from_config(&config, 0.0), Err(PhysicsError::InvalidConfig(_))),
                "moment {moi} was accepted"
            );
        }
        let config = BodyConfig::new_dynamic(1.0).with_moment(Moment::Infinite);
        let body = Body::from_config(&config, 0.0).unwrap();
        assert!(body.is_finite());
        assert_eq!(body.inverse_moment_of_inertia(), 0.0);
    }

    #[test]
    fn world_damping_is_the_fallback() {
        let body = Body::from_config(&BodyConfig::new_dynamic(1.0), 0.25).unwrap();
        assert_eq!(body.damping(), 0.25);
        let config = BodyConfig::new_dynamic(1.0).with_damping(0.5);
        let body = Body::from_config(&config, 0.25).unwrap();
        assert_eq!(body.damping(), 0.5);
    }

    #[test]
    fn static_bodies_have_infinite_mass() {
        let config = BodyConfig::new_static().with_velocity([3.0, 4.0]);
        let body = Body::from_config(&config, 0.0).unwrap();
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.inverse_moment_of_inertia(), 0.0);
        assert_eq!(body.velocity().linear, m::Vec2::zero());
    }

    #[test]
    fn clamp_truncates_each_axis() {
        let limits = MaxVelocity {
            horizontal: Some(2.0),
            vertical: None,
        };
        let v = limits.clamp(m::Vec2::new(-5.0, 100.0));
        assert_eq!(v, m::Vec2::new(-2.0, 100.0));
        let v = limits.clamp(m::Vec2::new(1.0, -3.0));
        assert_eq!(v, m::Vec2::new(1.0, -3.0));
    }
}
