//! Force integration and the sequential impulse contact solver.

use super::{collision::DetectedContact, ShapeKey, Velocity};
use crate::math as m;

use std::collections::HashMap;

/// Tuning parameters of the contact solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SolverParams {
    pub max_iterations: usize,
    /// Iteration stops when no impulse changes by more than this.
    pub convergence_threshold: f64,
    /// Fraction of penetration corrected per second, divided by the timestep.
    pub baumgarte: f64,
    /// Penetration allowed without correction, to keep resting contacts stable.
    pub slop: f64,
    /// Approach speed below which contacts don't bounce.
    pub restitution_threshold: f64,
}

/// The parts of a body the contact solver needs.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverBody {
    pub position: m::Vec2,
    pub velocity: Velocity,
    pub inv_mass: f64,
    pub inv_moment: f64,
}

/// Apply gravity, the body's persistent force and damping to a velocity.
///
/// Damping is the fraction of velocity lost per second, so it's applied as `(1 - d)^dt`
/// which is independent of how the time is split into steps.
pub(crate) fn integrate_forces(
    vel: &mut Velocity,
    gravity: m::Vec2,
    force: m::Vec2,
    inv_mass: f64,
    damping: f64,
    dt: f64,
) {
    vel.linear += (gravity + force * inv_mass) * dt;
    let retained = if damping >= 1.0 {
        0.0
    } else {
        (1.0 - damping).powf(dt)
    };
    *vel = *vel * retained;
}

/// Identifies a contact point across steps for warm starting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    shapes: [u64; 2],
    feature: u8,
}

impl CacheKey {
    fn new(shapes: [ShapeKey; 2], feature: usize) -> Self {
        Self {
            shapes: [shapes[0].bits(), shapes[1].bits()],
            feature: feature as u8,
        }
    }
}

/// A container to store impulses across updates,
/// used for warm starting the solver algorithm.
#[derive(Clone, Debug, Default)]
pub(crate) struct ImpulseCache(HashMap<CacheKey, CachedImpulse>);

#[derive(Clone, Copy, Debug, Default)]
struct CachedImpulse {
    normal: f64,
    tangent: f64,
}

impl ImpulseCache {
    pub fn clear(&mut self) {
        self.0.clear();
    }

    fn replace<'a>(&mut self, items: impl IntoIterator<Item = &'a PointConstraint>) {
        self.0.clear();
        self.0.extend(items.into_iter().map(|c| {
            (
                c.cache_key,
                CachedImpulse {
                    normal: c.normal_impulse,
                    tangent: c.tangent_impulse,
                },
            )
        }));
    }
}

/// A non-penetration constraint with friction at a single contact point.
#[derive(Clone, Copy, Debug)]
struct PointConstraint {
    contact_idx: usize,
    cache_key: CacheKey,
    bodies: [usize; 2],
    normal: m::Vec2,
    tangent: m::Vec2,
    offsets: [m::Vec2; 2],
    normal_mass: f64,
    tangent_mass: f64,
    bias: f64,
    friction: f64,
    normal_impulse: f64,
    tangent_impulse: f64,
}

/// Result of a round of contact solving.
#[derive(Clone, Debug, Default)]
pub(crate) struct SolveOutcome {
    pub iterations: usize,
    /// Total normal impulse per contact, indexed like the contacts given to the solver.
    pub impulses: Vec<f64>,
}

#[derive(Clone, Debug)]
pub(crate) struct ContactSolver {
    pub params: SolverParams,
    cache: ImpulseCache,
}

impl ContactSolver {
    pub fn new(params: SolverParams) -> Self {
        Self {
            params,
            cache: ImpulseCache::default(),
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Resolve the contacts for which `solve[i]` is true by changing body velocities.
    pub fn solve(
        &mut self,
        bodies: &mut [SolverBody],
        contacts: &[DetectedContact],
        solve: &[bool],
        dt: f64,
    ) -> SolveOutcome {
        let _span = tracy_span!("solve contacts", "solve");

        let mut constraints = self.build_constraints(bodies, contacts, solve, dt);

        // warm start
        for c in &constraints {
            let impulse = c.normal * c.normal_impulse + c.tangent * c.tangent_impulse;
            apply_impulse(bodies, c, impulse);
        }

        let mut iterations = 0;
        if !constraints.is_empty() {
            let mut biggest_change = f64::MAX;
            while biggest_change > self.params.convergence_threshold
                && iterations < self.params.max_iterations
            {
                iterations += 1;
                biggest_change = 0.0;
                for c in constraints.iter_mut() {
                    biggest_change = biggest_change.max(solve_friction(bodies, c));
                    biggest_change = biggest_change.max(solve_normal(bodies, c));
                }
            }
        }

        let mut impulses = vec![0.0; contacts.len()];
        for c in &constraints {
            impulses[c.contact_idx] += c.normal_impulse;
        }
        // store impulses for next step's warm start
        self.cache.replace(&constraints);

        SolveOutcome {
            iterations,
            impulses,
        }
    }

    fn build_constraints(
        &self,
        bodies: &[SolverBody],
        contacts: &[DetectedContact],
        solve: &[bool],
        dt: f64,
    ) -> Vec<PointConstraint> {
        let mut constraints = Vec::new();
        for (contact_idx, contact) in contacts.iter().enumerate() {
            if !solve[contact_idx] {
                continue;
            }
            let [b0, b1] = contact.body_idx;
            let normal = *contact.normal;
            let tangent = m::left_normal(normal);
            for (feature, point) in contact.points.iter().enumerate() {
                let offsets = [
                    point.position - bodies[b0].position,
                    point.position - bodies[b1].position,
                ];
                let effective_mass = |dir: m::Vec2| {
                    let k = bodies[b0].inv_mass
                        + bodies[b1].inv_mass
                        + bodies[b0].inv_moment * m::cross(offsets[0], dir).powi(2)
                        + bodies[b1].inv_moment * m::cross(offsets[1], dir).powi(2);
                    if k > 0.0 {
                        1.0 / k
                    } else {
                        0.0
                    }
                };

                let approach_speed = (bodies[b0].velocity.point_velocity(offsets[0])
                    - bodies[b1].velocity.point_velocity(offsets[1]))
                .dot(normal);
                let position_bias =
                    self.params.baumgarte / dt * (point.depth - self.params.slop).max(0.0);
                let bounce_bias = if approach_speed > self.params.restitution_threshold {
                    contact.restitution * approach_speed
                } else {
                    0.0
                };

                let cache_key = CacheKey::new(contact.shapes, feature);
                let cached = self.cache.0.get(&cache_key).copied().unwrap_or_default();
                constraints.push(PointConstraint {
                    contact_idx,
                    cache_key,
                    bodies: [b0, b1],
                    normal,
                    tangent,
                    offsets,
                    normal_mass: effective_mass(normal),
                    tangent_mass: effective_mass(tangent),
                    bias: position_bias.max(bounce_bias),
                    friction: contact.friction,
                    normal_impulse: cached.normal,
                    tangent_impulse: cached
                        .tangent
                        .clamp(-contact.friction * cached.normal, contact.friction * cached.normal),
                });
            }
        }
        constraints
    }
}

/// Speed at which the contact point on body 0 moves towards body 1 along `dir`.
fn relative_speed(bodies: &[SolverBody], c: &PointConstraint, dir: m::Vec2) -> f64 {
    let [b0, b1] = c.bodies;
    (bodies[b0].velocity.point_velocity(c.offsets[0])
        - bodies[b1].velocity.point_velocity(c.offsets[1]))
    .dot(dir)
}

fn solve_normal(bodies: &mut [SolverBody], c: &mut PointConstraint) -> f64 {
    let speed = relative_speed(bodies, c, c.normal);
    let delta = (speed + c.bias) * c.normal_mass;
    // clamp the accumulated impulse, contacts only push
    let new_total = (c.normal_impulse + delta).max(0.0);
    let applied = new_total - c.normal_impulse;
    c.normal_impulse = new_total;
    apply_impulse(bodies, c, c.normal * applied);
    applied.abs()
}

fn solve_friction(bodies: &mut [SolverBody], c: &mut PointConstraint) -> f64 {
    let speed = relative_speed(bodies, c, c.tangent);
    let delta = speed * c.tangent_mass;
    let limit = c.friction * c.normal_impulse;
    let new_total = (c.tangent_impulse + delta).clamp(-limit, limit);
    let applied = new_total - c.tangent_impulse;
    c.tangent_impulse = new_total;
    apply_impulse(bodies, c, c.tangent * applied);
    applied.abs()
}

/// Push body 0 along `-impulse` and body 1 along `impulse`.
fn apply_impulse(bodies: &mut [SolverBody], c: &PointConstraint, impulse: m::Vec2) {
    let [b0, b1] = c.bodies;
    let body = &mut bodies[b0];
    body.velocity.linear -= impulse * body.inv_mass;
    body.velocity.angular -= body.inv_moment * m::cross(c.offsets[0], impulse);
    let body = &mut bodies[b1];
    body.velocity.linear += impulse * body.inv_mass;
    body.velocity.angular += body.inv_moment * m::cross(c.offsets[1], impulse);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{collision::ContactPointWorld, BodyKey};
    use thunderdome as td;

    fn params() -> SolverParams {
        SolverParams {
            max_iterations: 10,
            convergence_threshold: 1e-6,
            baumgarte: 0.0,
            slop: 0.0,
            restitution_threshold: 1.0,
        }
    }

    fn body(x: f64, vx: f64, inv_mass: f64) -> SolverBody {
        SolverBody {
            position: m::Vec2::new(x, 0.0),
            velocity: Velocity {
                linear: m::Vec2::new(vx, 0.0),
                angular: 0.0,
            },
            inv_mass,
            inv_moment: 0.0,
        }
    }

    fn head_on_contact(restitution: f64) -> DetectedContact {
        let mut bodies = td::Arena::new();
        let mut shapes = td::Arena::new();
        DetectedContact {
            bodies: [BodyKey(bodies.insert(())), BodyKey(bodies.insert(()))],
            body_idx: [0, 1],
            shapes: [ShapeKey(shapes.insert(())), ShapeKey(shapes.insert(()))],
            normal: m::Unit::unit_x(),
            points: vec![ContactPointWorld {
                position: m::Vec2::new(1.0, 0.0),
                depth: 0.0,
            }],
            friction: 0.0,
            restitution,
            sensor: false,
        }
    }

    #[test]
    fn full_damping_stops_and_none_keeps() {
        let mut vel = Velocity {
            linear: m::Vec2::new(3.0, -2.0),
            angular: 1.0,
        };
        integrate_forces(&mut vel, m::Vec2::zero(), m::Vec2::zero(), 1.0, 0.0, 0.5);
        assert_eq!(vel.linear, m::Vec2::new(3.0, -2.0));
        integrate_forces(&mut vel, m::Vec2::zero(), m::Vec2::zero(), 1.0, 1.0, 0.5);
        assert_eq!(vel.linear, m::Vec2::zero());
        assert_eq!(vel.angular, 0.0);
    }

    #[test]
    fn damping_is_independent_of_step_split() {
        let start = Velocity {
            linear: m::Vec2::new(10.0, 0.0),
            angular: 0.0,
        };
        let mut once = start;
        integrate_forces(&mut once, m::Vec2::zero(), m::Vec2::zero(), 1.0, 0.5, 1.0);
        let mut split = start;
        for _ in 0..4 {
            integrate_forces(&mut split, m::Vec2::zero(), m::Vec2::zero(), 1.0, 0.5, 0.25);
        }
        assert!((once.linear.x - 5.0).abs() < 1e-12);
        assert!((split.linear.x - 5.0).abs() < 1e-9);
    }

    #[test]
    fn inelastic_collision_conserves_momentum() {
        let mut bodies = [body(0.0, 2.0, 1.0), body(2.0, 0.0, 1.0)];
        let contacts = [head_on_contact(0.0)];
        let mut solver = ContactSolver::new(params());
        let outcome = solver.solve(&mut bodies, &contacts, &[true], 1.0 / 60.0);
        assert!((bodies[0].velocity.linear.x - 1.0).abs() < 1e-9);
        assert!((bodies[1].velocity.linear.x - 1.0).abs() < 1e-9);
        assert!((outcome.impulses[0] - 1.0).abs() < 1e-9);
        assert!(outcome.iterations >= 1 && outcome.iterations <= 10);
    }

    #[test]
    fn elastic_collision_against_wall() {
        let mut bodies = [body(0.0, 5.0, 1.0), body(2.0, 0.0, 0.0)];
        let contacts = [head_on_contact(1.0)];
        let mut solver = ContactSolver::new(params());
        solver.solve(&mut bodies, &contacts, &[true], 1.0 / 60.0);
        assert!((bodies[0].velocity.linear.x + 5.0).abs() < 1e-9);
        assert_eq!(bodies[1].velocity.linear.x, 0.0);
    }

    #[test]
    fn skipped_contacts_apply_nothing() {
        let mut bodies = [body(0.0, 2.0, 1.0), body(2.0, 0.0, 1.0)];
        let contacts = [head_on_contact(0.0)];
        let mut solver = ContactSolver::new(params());
        let outcome = solver.solve(&mut bodies, &contacts, &[false], 1.0 / 60.0);
        assert_eq!(bodies[0].velocity.linear.x, 2.0);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.impulses, vec![0.0]);
    }
}
