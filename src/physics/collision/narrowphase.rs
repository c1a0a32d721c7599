use super::shape::ShapeKind;
use crate::math::{self as m, Pose, Unit};

/// 0-2 points of contact can occur between two 2D objects.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Manifold {
    Empty,
    One(ContactPoint),
    Two(ContactPoint, ContactPoint),
}

impl Manifold {
    pub fn iter(&self) -> impl '_ + Iterator<Item = &ContactPoint> {
        let pair = match self {
            Manifold::Empty => [None, None],
            Manifold::One(c) => [Some(c), None],
            Manifold::Two(c1, c2) => [Some(c1), Some(c2)],
        };
        pair.into_iter().flatten()
    }

    /// Execute a function on every contact in the result.
    fn map(self, f: impl Fn(ContactPoint) -> ContactPoint) -> Self {
        match self {
            Manifold::Empty => Manifold::Empty,
            Manifold::One(c) => Manifold::One(f(c)),
            Manifold::Two(c1, c2) => Manifold::Two(f(c1), f(c2)),
        }
    }

    /// Swap the roles of the two objects.
    pub fn flipped(self) -> Self {
        self.map(|c| ContactPoint {
            normal: -c.normal,
            offsets: [c.offsets[1], c.offsets[0]],
        })
    }
}

/// An intersection between two objects.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ContactPoint {
    /// The normal, facing away from obj1
    pub normal: Unit<m::Vec2>,
    /// Points of contact on the surface of each object, in object-local space.
    pub offsets: [m::Vec2; 2],
}

impl ContactPoint {
    /// World-space surface points on each object and the penetration depth between them.
    pub fn resolve(&self, pose1: &Pose, pose2: &Pose) -> ([m::Vec2; 2], f64) {
        let p1 = *pose1 * self.offsets[0];
        let p2 = *pose2 * self.offsets[1];
        ([p1, p2], (p1 - p2).dot(*self.normal))
    }
}

/// Checks two shapes for intersection.
pub(crate) fn intersection_check(
    pose1: &Pose,
    shape1: ShapeKind,
    pose2: &Pose,
    shape2: ShapeKind,
) -> Manifold {
    use ShapeKind::*;
    // a capsule with no length is a circle, and the edge tests below need some length
    let shape1 = as_circle_if_pointlike(shape1);
    let shape2 = as_circle_if_pointlike(shape2);
    match (shape1, shape2) {
        (Circle { r: r1 }, Circle { r: r2 }) => circle_circle(pose1, r1, pose2, r2),
        (Circle { r }, Rect { hw, hh }) => rect_circle(pose2, hw, hh, pose1, r).flipped(),
        (Rect { hw, hh }, Circle { r }) => rect_circle(pose1, hw, hh, pose2, r),
        (Circle { r: rcirc }, Capsule { hl, r: rcap }) => {
            circle_capsule(pose1, rcirc, pose2, hl, rcap)
        }
        (Capsule { hl, r: rcap }, Circle { r: rcirc }) => {
            circle_capsule(pose2, rcirc, pose1, hl, rcap).flipped()
        }
        (Rect { hw: hw1, hh: hh1 }, Rect { hw: hw2, hh: hh2 }) => {
            rect_rect(pose1, m::Vec2::new(hw1, hh1), pose2, m::Vec2::new(hw2, hh2))
        }
        (Rect { hw, hh }, Capsule { hl, r }) => rect_capsule(pose1, hw, hh, pose2, hl, r),
        (Capsule { hl, r }, Rect { hw, hh }) => {
            rect_capsule(pose2, hw, hh, pose1, hl, r).flipped()
        }
        (Capsule { hl: hl1, r: r1 }, Capsule { hl: hl2, r: r2 }) => {
            capsule_capsule(pose1, hl1, r1, pose2, hl2, r2)
        }
    }
}

fn as_circle_if_pointlike(shape: ShapeKind) -> ShapeKind {
    match shape {
        ShapeKind::Capsule { hl, r } if hl <= 0.0 => ShapeKind::Circle { r },
        other => other,
    }
}

/// Index and value of the smallest of a set of penetration depths.
/// Earlier entries win ties.
fn shallowest(depths: &[f64]) -> (usize, f64) {
    let mut best = (0, depths[0]);
    for (i, &d) in depths.iter().enumerate().skip(1) {
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

//
// CIRCLE <-> CIRCLE
//

fn circle_circle(pose1: &Pose, r1: f64, pose2: &Pose, r2: f64) -> Manifold {
    let dist = pose2.translation - pose1.translation;
    let dist_sq = dist.mag_sq();
    let r_sum = r1 + r2;

    let normal = if dist_sq < 0.001 {
        // same position, consider penetration to be on x axis
        Unit::unit_x()
    } else if dist_sq < r_sum * r_sum {
        Unit::new_normalize(dist)
    } else {
        return Manifold::Empty;
    };

    Manifold::One(ContactPoint {
        normal,
        offsets: [
            pose1.rotation.reversed() * (r1 * *normal),
            pose2.rotation.reversed() * (-r2 * *normal),
        ],
    })
}

//
// RECT <-> CIRCLE
//

fn rect_circle(pose_rect: &Pose, hw: f64, hh: f64, pose_circle: &Pose, r: f64) -> Manifold {
    let pose_c_wrt_rect = pose_rect.inversed() * *pose_circle;
    let dist = pose_c_wrt_rect.translation;
    let dist_abs = m::Vec2::new(dist.x.abs(), dist.y.abs());
    let dist_signums = m::signum_nonzero(dist);

    let c_to_corner = m::Vec2::new(hw - dist_abs.x, hh - dist_abs.y);
    if c_to_corner.x < -r || c_to_corner.y < -r {
        return Manifold::Empty;
    }
    let (point_abs, normal_abs) = if c_to_corner.x > 0.0 && c_to_corner.y > 0.0 {
        // center inside the rect, push out through the nearest face
        if c_to_corner.x < c_to_corner.y {
            (m::Vec2::new(hw, dist_abs.y), Unit::unit_x())
        } else {
            (m::Vec2::new(dist_abs.x, hh), Unit::unit_y())
        }
    } else if c_to_corner.x > 0.0 {
        (m::Vec2::new(dist_abs.x, hh), Unit::unit_y())
    } else if c_to_corner.y > 0.0 {
        (m::Vec2::new(hw, dist_abs.y), Unit::unit_x())
    } else {
        // outside both faces, only the corner can touch
        if r - c_to_corner.mag() <= 0.0 {
            return Manifold::Empty;
        }
        (m::Vec2::new(hw, hh), Unit::new_normalize(-c_to_corner))
    };

    let normal_wrt_rect = Unit::new_unchecked(m::Vec2::new(
        dist_signums.x * normal_abs.x,
        dist_signums.y * normal_abs.y,
    ));

    Manifold::One(ContactPoint {
        normal: pose_rect.rotation * normal_wrt_rect,
        offsets: [
            m::Vec2::new(dist_signums.x * point_abs.x, dist_signums.y * point_abs.y),
            pose_c_wrt_rect.rotation.reversed() * (-r * *normal_wrt_rect),
        ],
    })
}

//
// CIRCLE <-> CAPSULE
//

fn circle_capsule(pose_circ: &Pose, r_circ: f64, pose_cap: &Pose, hl: f64, r_cap: f64) -> Manifold {
    let pose_circ_wrt_cap = pose_cap.inversed() * *pose_circ;
    let center_dist = pose_circ_wrt_cap.translation;

    let dist = m::Vec2::new(
        // x distance is 0 if the circle is along the line segment defining the capsule
        (center_dist.x.abs() - hl).max(0.0) * center_dist.x.signum(),
        center_dist.y,
    );
    let dist_sq = dist.mag_sq();
    let r_sum = r_circ + r_cap;

    let normal = if dist_sq < 0.001 {
        Unit::unit_y()
    } else if dist_sq < r_sum * r_sum {
        // normal must be away from the circle, dist is from cap to circle
        Unit::new_normalize(-dist)
    } else {
        return Manifold::Empty;
    };

    let depth = r_sum - dist_sq.sqrt();

    Manifold::One(ContactPoint {
        normal: pose_cap.rotation * normal,
        offsets: [
            pose_circ_wrt_cap.rotation.reversed() * (r_circ * *normal),
            center_dist + (r_circ - depth) * *normal,
        ],
    })
}

//
// RECT <-> RECT
//

/// Shallowest penetration along the face normals of a rect at the origin
/// by a rect at `other` relative to it. `None` if one of them separates the two.
fn rect_face_penetration(other: &Pose, he: m::Vec2, other_he: m::Vec2) -> Option<(usize, f64)> {
    let dist = other.translation;
    let x2_axis = other.rotation * m::Vec2::unit_x();
    let y2_axis = m::left_normal(x2_axis);
    let other_extent_x = (x2_axis.x * other_he.x).abs() + (y2_axis.x * other_he.y).abs();
    let other_extent_y = (x2_axis.y * other_he.x).abs() + (y2_axis.y * other_he.y).abs();
    let x_pen = he.x + other_extent_x - dist.x.abs();
    let y_pen = he.y + other_extent_y - dist.y.abs();
    if x_pen <= 0.0 || y_pen <= 0.0 {
        return None;
    }
    Some(shallowest(&[x_pen, y_pen]))
}

fn rect_rect(pose1: &Pose, he1: m::Vec2, pose2: &Pose, he2: m::Vec2) -> Manifold {
    let pose2_wrt_pose1 = pose1.inversed() * *pose2;
    let pose1_wrt_pose2 = pose2_wrt_pose1.inversed();

    let Some((axis1, depth1)) = rect_face_penetration(&pose2_wrt_pose1, he1, he2) else {
        return Manifold::Empty;
    };
    let Some((axis2, depth2)) = rect_face_penetration(&pose1_wrt_pose2, he2, he1) else {
        return Manifold::Empty;
    };

    // prefer obj1's faces unless obj2's are clearly better, to keep resting stacks stable
    if depth2 < depth1 * 0.999 {
        rect_face_clip(pose2, he2, &pose1_wrt_pose2, he1, axis2, depth2).flipped()
    } else {
        rect_face_clip(pose1, he1, &pose2_wrt_pose1, he2, axis1, depth1)
    }
}

/// Contacts of an incident rect against a face of the reference rect (obj1),
/// given the reference axis of least penetration.
fn rect_face_clip(
    pose1: &Pose,
    he1: m::Vec2,
    pose2_wrt_pose1: &Pose,
    he2: m::Vec2,
    axis_i: usize,
    depth: f64,
) -> Manifold {
    let dist = pose2_wrt_pose1.translation;
    let x2_axis = pose2_wrt_pose1.rotation * Unit::unit_x();
    let y2_axis = m::unit_left_normal(x2_axis);

    // orient axis of penetration towards obj2
    let axis = if axis_i == 0 {
        Unit::new_unchecked(m::Vec2::new(m::signum_nonzero(dist).x, 0.0))
    } else {
        Unit::new_unchecked(m::Vec2::new(0.0, m::signum_nonzero(dist).y))
    };
    let normal = pose1.rotation * axis;

    let axis_dot_x2 = axis.dot(*x2_axis);
    let axis_dot_y2 = axis.dot(*y2_axis);
    let x2_axis_facing_point = -axis_dot_x2.signum() * *x2_axis;
    let y2_axis_facing_point = -axis_dot_y2.signum() * *y2_axis;
    let extreme_point_on_obj2 = dist + x2_axis_facing_point * he2.x + y2_axis_facing_point * he2.y;
    // clip incident edges to find possible second contact point
    let incident_edge = if axis_dot_x2.abs() < axis_dot_y2.abs() {
        Edge {
            start: extreme_point_on_obj2,
            dir: Unit::new_unchecked(-x2_axis_facing_point),
            length: he2.x * 2.0,
        }
    } else {
        Edge {
            start: extreme_point_on_obj2,
            dir: Unit::new_unchecked(-y2_axis_facing_point),
            length: he2.y * 2.0,
        }
    };
    let reference_edge = if axis_i == 1 {
        Edge {
            start: m::Vec2::new(-he1.x, axis.y * he1.y),
            dir: Unit::unit_x(),
            length: he1.x * 2.0,
        }
    } else {
        Edge {
            start: m::Vec2::new(axis.x * he1.x, -he1.y),
            dir: Unit::unit_y(),
            length: he1.y * 2.0,
        }
    };

    let to_obj2_local = pose2_wrt_pose1.inversed();
    match clip_edge(reference_edge, incident_edge) {
        EdgeClipResult::Intersects => Manifold::One(ContactPoint {
            normal,
            offsets: [
                incident_edge.start + depth * *axis,
                to_obj2_local * incident_edge.start,
            ],
        }),
        EdgeClipResult::Passes { enters, exits } => {
            let edge_dot_axis = incident_edge.dir.dot(*axis);
            let enter_depth = depth - enters * edge_dot_axis;
            let exit_depth = depth - exits * edge_dot_axis;
            // floating point inaccuracy can get us here with a clip that actually misses
            if enter_depth <= 0.0 || exit_depth <= 0.0 {
                return Manifold::Empty;
            }

            let enter_point = incident_edge.start + (enters * *incident_edge.dir);
            let exit_point = incident_edge.start + (exits * *incident_edge.dir);
            Manifold::Two(
                ContactPoint {
                    normal,
                    offsets: [
                        enter_point + (enter_depth * *axis),
                        to_obj2_local * enter_point,
                    ],
                },
                ContactPoint {
                    normal,
                    offsets: [exit_point + (exit_depth * *axis), to_obj2_local * exit_point],
                },
            )
        }
        EdgeClipResult::Misses => Manifold::Empty,
    }
}

//
// RECT <-> CAPSULE
//

fn rect_capsule(pose_rect: &Pose, hw: f64, hh: f64, pose_cap: &Pose, hl: f64, r: f64) -> Manifold {
    let pose_cap_wrt_rect = pose_rect.inversed() * *pose_cap;

    // four possible separating axes:
    // rect's principal axes, axis normal to the capsule's line segment,
    // and axis between the closest cap end point and the closest rect corner

    let dist = pose_cap_wrt_rect.translation;
    let cap_dir = pose_cap_wrt_rect.rotation * m::Vec2::unit_x();
    // orient normal away from rect
    let cap_normal = *Unit::new_unchecked(m::left_normal(cap_dir)).facing(dist);

    let pen_rect_x = (hw + cap_dir.x.abs() * hl + r) - dist.x.abs();
    if pen_rect_x <= 0.0 {
        return Manifold::Empty;
    }
    let pen_rect_y = (hh + cap_dir.y.abs() * hl + r) - dist.y.abs();
    if pen_rect_y <= 0.0 {
        return Manifold::Empty;
    }
    let pen_cap_normal =
        (cap_normal.x.abs() * hw + cap_normal.y.abs() * hh + r) - dist.dot(cap_normal);
    if pen_cap_normal <= 0.0 {
        return Manifold::Empty;
    }
    let cap_ends = [dist + hl * cap_dir, dist - hl * cap_dir];
    let cap_end_dists = [
        cap_ends[0].abs() - m::Vec2::new(hw, hh),
        cap_ends[1].abs() - m::Vec2::new(hw, hh),
    ];
    let closer_cap_end = if cap_end_dists[0].mag_sq() <= cap_end_dists[1].mag_sq() {
        cap_ends[0]
    } else {
        cap_ends[1]
    };
    let (closest_rect_corner, axis_cap_end, pen_cap_end) =
        if closer_cap_end.x.abs() <= hw || closer_cap_end.y.abs() <= hh {
            // the cap end only matters in the voronoi region outside both rect faces
            (m::Vec2::zero(), Unit::unit_x(), f64::MAX)
        } else {
            let closest_rect_corner = m::Vec2::new(
                hw * closer_cap_end.x.signum(),
                hh * closer_cap_end.y.signum(),
            );
            let axis = Unit::new_normalize(closer_cap_end - closest_rect_corner).facing(dist);
            let pen = (axis.abs().dot(m::Vec2::new(hw, hh)) + axis.dot(cap_dir).abs() * hl + r)
                - axis.dot(dist);
            if pen <= 0.0 {
                return Manifold::Empty;
            }
            (closest_rect_corner, axis, pen)
        };

    let (lowest_pen_axis, _) =
        shallowest(&[pen_rect_x, pen_rect_y, pen_cap_normal, pen_cap_end]);

    let rect_face = |pen: f64, normal: m::Vec2, tangent: m::Vec2, he_normal: f64, he_tangent: f64| {
        let normal_worldspace = pose_rect.rotation * Unit::new_unchecked(normal);
        // make cap_dir point along the normal so the edge starts at the deeper end
        let cap_dir = if normal.dot(cap_dir) < 0.0 {
            -cap_dir
        } else {
            cap_dir
        };
        let rounded_end_contact = || {
            let point_on_cap = dist - cap_dir * hl - r * normal;
            Manifold::One(ContactPoint {
                normal: normal_worldspace,
                offsets: [
                    point_on_cap + normal * pen,
                    pose_cap_wrt_rect.inversed() * point_on_cap,
                ],
            })
        };
        // there might be two contact points along the straight edge of the capsule
        let rect_edge = Edge {
            start: normal * he_normal - tangent * he_tangent,
            dir: Unit::new_unchecked(tangent),
            length: he_tangent * 2.0,
        };
        let cap_edge = Edge {
            start: dist - cap_normal * r - cap_dir * hl,
            dir: Unit::new_unchecked(cap_dir),
            length: hl * 2.0,
        };
        match clip_edge(rect_edge, cap_edge) {
            EdgeClipResult::Intersects | EdgeClipResult::Misses => rounded_end_contact(),
            EdgeClipResult::Passes { enters, exits } => {
                let edge_dot_axis = cap_edge.dir.dot(normal);
                let start_depth = he_normal - cap_edge.start.dot(normal).abs();
                let enter_depth = start_depth - enters * edge_dot_axis;
                let exit_depth = start_depth - exits * edge_dot_axis;
                if enter_depth <= 0.0 || exit_depth <= 0.0 {
                    // flat edge missed, so the point is on the circular part
                    return rounded_end_contact();
                }

                let enter_point = cap_edge.start + (enters * *cap_edge.dir);
                let exit_point = cap_edge.start + (exits * *cap_edge.dir);
                let pc_wrt_pr_inv = pose_cap_wrt_rect.inversed();
                Manifold::Two(
                    ContactPoint {
                        normal: normal_worldspace,
                        offsets: [
                            enter_point + normal * enter_depth,
                            pc_wrt_pr_inv * enter_point,
                        ],
                    },
                    ContactPoint {
                        normal: normal_worldspace,
                        offsets: [exit_point + normal * exit_depth, pc_wrt_pr_inv * exit_point],
                    },
                )
            }
        }
    };

    let signs = m::signum_nonzero(dist);
    match lowest_pen_axis {
        0 => rect_face(
            pen_rect_x,
            m::Vec2::new(signs.x, 0.0),
            m::Vec2::unit_y(),
            hw,
            hh,
        ),
        1 => rect_face(
            pen_rect_y,
            m::Vec2::new(0.0, signs.y),
            m::Vec2::unit_x(),
            hh,
            hw,
        ),
        // capsule normal direction
        2 => {
            let normal_worldspace = pose_rect.rotation * Unit::new_unchecked(cap_normal);
            let rect_edge = if cap_normal.x.abs() > cap_normal.y.abs() {
                Edge {
                    start: m::Vec2::new(-hw, cap_normal.y.signum() * hh),
                    dir: Unit::unit_x(),
                    length: hw * 2.0,
                }
            } else {
                Edge {
                    start: m::Vec2::new(cap_normal.x.signum() * hw, -hh),
                    dir: Unit::unit_y(),
                    length: hh * 2.0,
                }
            };
            let cap_edge = Edge {
                start: dist - cap_normal * r - cap_dir * hl,
                dir: Unit::new_unchecked(cap_dir),
                length: hl * 2.0,
            };
            match clip_edge(cap_edge, rect_edge) {
                EdgeClipResult::Misses => Manifold::Empty,
                EdgeClipResult::Intersects => {
                    // contact point is at the tip of the rect
                    let point_on_rect =
                        m::Vec2::new(cap_normal.x.signum() * hw, cap_normal.y.signum() * hh);
                    Manifold::One(ContactPoint {
                        normal: normal_worldspace,
                        offsets: [
                            point_on_rect,
                            pose_cap_wrt_rect.inversed()
                                * (point_on_rect - cap_normal * pen_cap_normal),
                        ],
                    })
                }
                EdgeClipResult::Passes { enters, exits } => {
                    let edge_dot_axis = rect_edge.dir.dot(cap_normal);
                    let enter_depth = pen_cap_normal - enters * edge_dot_axis;
                    let exit_depth = pen_cap_normal - exits * edge_dot_axis;
                    if enter_depth <= 0.0 || exit_depth <= 0.0 {
                        return Manifold::Empty;
                    }

                    let enter_point = rect_edge.start + (enters * *rect_edge.dir);
                    let exit_point = rect_edge.start + (exits * *rect_edge.dir);
                    let pc_wrt_pr_inv = pose_cap_wrt_rect.inversed();
                    Manifold::Two(
                        ContactPoint {
                            normal: normal_worldspace,
                            offsets: [
                                enter_point,
                                pc_wrt_pr_inv * (enter_point - cap_normal * enter_depth),
                            ],
                        },
                        ContactPoint {
                            normal: normal_worldspace,
                            offsets: [
                                exit_point,
                                pc_wrt_pr_inv * (exit_point - cap_normal * exit_depth),
                            ],
                        },
                    )
                }
            }
        }
        // capsule end against the closest corner
        _ => Manifold::One(ContactPoint {
            normal: pose_rect.rotation * axis_cap_end,
            offsets: [
                closest_rect_corner,
                pose_cap_wrt_rect.inversed() * (closest_rect_corner - pen_cap_end * *axis_cap_end),
            ],
        }),
    }
}

//
// CAPSULE <-> CAPSULE
//

fn capsule_capsule(pose1: &Pose, hl1: f64, r1: f64, pose2: &Pose, hl2: f64, r2: f64) -> Manifold {
    let pose2_wrt_pose1 = pose1.inversed() * *pose2;
    let to_obj2_local = pose2_wrt_pose1.inversed();

    let dist = pose2_wrt_pose1.translation;
    let cap2_dir = pose2_wrt_pose1.rotation * m::Vec2::unit_x();

    // closest points on the line segments defining the capsules
    let closest_points = if cap2_dir.y == 0.0 {
        // parallel, pick the closer end of cap2 and the closest point to it on cap1
        let closer_cap2_end = if cap2_dir.x.signum() == dist.x.signum() {
            dist - cap2_dir * hl2
        } else {
            dist + cap2_dir * hl2
        };
        [
            m::Vec2::new(closer_cap2_end.x.clamp(-hl1, hl1), 0.0),
            closer_cap2_end,
        ]
    } else {
        // intersection of the whole lines from cap 2's POV,
        // clamped to the extents of the line segment
        let t2 = (-dist.y / cap2_dir.y).clamp(-hl2, hl2);
        let t1 = (dist.x + t2 * cap2_dir.x).clamp(-hl1, hl1);
        // back to cap 2 from the clamped point on cap 1
        let t2 = m::Vec2::new(t1 - dist.x, -dist.y)
            .dot(cap2_dir)
            .clamp(-hl2, hl2);
        [m::Vec2::new(t1, 0.0), dist + t2 * cap2_dir]
    };
    let between = closest_points[1] - closest_points[0];
    if (r1 + r2).powi(2) - between.mag_sq() <= 0.0 {
        return Manifold::Empty;
    }

    let closest_point_contact = || {
        let normal = if between.mag_sq() > 0.0 {
            Unit::new_normalize(between)
        } else {
            Unit::new_unchecked(m::Vec2::new(0.0, m::signum_nonzero(dist).y))
        };
        Manifold::One(ContactPoint {
            normal: pose1.rotation * normal,
            offsets: [
                closest_points[0] + r1 * *normal,
                to_obj2_local * (closest_points[1] - r2 * *normal),
            ],
        })
    };

    // check closest straight edges for intersection
    let side = m::signum_nonzero(dist).y;
    let cap1_edge = Edge {
        start: m::Vec2::new(-hl1, side * r1),
        dir: Unit::unit_x(),
        length: hl1 * 2.0,
    };
    let cap2_normal = *Unit::new_unchecked(m::left_normal(cap2_dir)).facing(dist);
    let cap2_edge = Edge {
        start: dist - hl2 * cap2_dir - r2 * cap2_normal,
        dir: Unit::new_unchecked(cap2_dir),
        length: hl2 * 2.0,
    };
    match clip_edge(cap1_edge, cap2_edge) {
        EdgeClipResult::Intersects | EdgeClipResult::Misses => closest_point_contact(),
        EdgeClipResult::Passes { enters, exits } => {
            let enter_depth = r1 - (cap2_edge.start.y + enters * cap2_edge.dir.y).abs();
            let exit_depth = r1 - (cap2_edge.start.y + exits * cap2_edge.dir.y).abs();
            if enter_depth <= 0.0 || exit_depth <= 0.0 {
                return closest_point_contact();
            }
            let normal_worldspace = pose1.rotation * Unit::new_unchecked(m::Vec2::new(0.0, side));
            let enter_point = cap2_edge.start + enters * *cap2_edge.dir;
            let exit_point = cap2_edge.start + exits * *cap2_edge.dir;
            Manifold::Two(
                ContactPoint {
                    normal: normal_worldspace,
                    offsets: [
                        m::Vec2::new(enter_point.x, side * r1),
                        to_obj2_local * enter_point,
                    ],
                },
                ContactPoint {
                    normal: normal_worldspace,
                    offsets: [
                        m::Vec2::new(exit_point.x, side * r1),
                        to_obj2_local * exit_point,
                    ],
                },
            )
        }
    }
}

//
// EDGE CLIP
//

#[derive(Clone, Copy, Debug)]
struct Edge {
    start: m::Vec2,
    dir: Unit<m::Vec2>,
    length: f64,
}

#[derive(Clone, Copy, Debug)]
enum EdgeClipResult {
    /// Intersecting edges mean a single contact point at an already known location
    Intersects,
    /// Otherwise, the distances along `edge` at which it crosses the lines
    /// perpendicular to `target` going through its endpoints.
    Passes { enters: f64, exits: f64 },
    /// `edge` is completely outside the slab defined by `target`.
    Misses,
}

fn clip_edge(target: Edge, edge: Edge) -> EdgeClipResult {
    let start_dist = target.start - edge.start;
    // cramer's rule solution for t in At = b
    // where A = [dir1, -dir2] and b = start_dist.
    // denom is 0 and t is NaN for parallel edges, which fails the comparison below as it should
    let denom = edge.dir.x * (-target.dir.y) - (-target.dir.x) * edge.dir.y;
    let t = [
        (start_dist.x * (-target.dir.y) - (-target.dir.x) * start_dist.y) / denom,
        (edge.dir.x * start_dist.y - start_dist.x * edge.dir.y) / denom,
    ];
    if t[0] >= 0.0 && t[0] <= edge.length && t[1] >= 0.0 && t[1] <= target.length {
        return EdgeClipResult::Intersects;
    }
    let dist_dot_dir2 = start_dist.dot(*target.dir);
    let dirs_dot = edge.dir.dot(*target.dir);
    let start_clip_t = dist_dot_dir2 / dirs_dot;
    let end_clip_t = (target.length + dist_dot_dir2) / dirs_dot;
    if (start_clip_t <= 0.0 && end_clip_t <= 0.0)
        || (start_clip_t >= edge.length && end_clip_t >= edge.length)
    {
        return EdgeClipResult::Misses;
    }
    let (enters, exits) = if start_clip_t < end_clip_t {
        (start_clip_t.max(0.0), end_clip_t.min(edge.length))
    } else {
        (end_clip_t.max(0.0), start_clip_t.min(edge.length))
    };
    EdgeClipResult::Passes { enters, exits }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Angle;
    use std::f64::consts::PI;

    fn at(x: f64, y: f64) -> Pose {
        m::pose_from_parts(m::Vec2::new(x, y), Angle::Rad(0.0))
    }

    fn depths(manifold: Manifold, pose1: &Pose, pose2: &Pose) -> Vec<f64> {
        manifold.iter().map(|c| c.resolve(pose1, pose2).1).collect()
    }

    #[test]
    fn clip_various_edges() {
        match clip_edge(
            Edge {
                start: m::Vec2::new(1.0, 1.0),
                dir: Unit::unit_x(),
                length: 2.0,
            },
            Edge {
                start: m::Vec2::new(1.0, 0.0),
                dir: Unit::new_normalize(m::Vec2::new(1.0, 1.0)),
                length: 2.0,
            },
        ) {
            EdgeClipResult::Intersects => (),
            other => panic!("Didn't intersect: {other:?}"),
        }
        // passes that starts at 0
        match clip_edge(
            Edge {
                start: m::Vec2::new(1.0, 1.0),
                dir: Unit::unit_x(),
                length: 2.0,
            },
            Edge {
                start: m::Vec2::new(2.0, 0.0),
                dir: m::Rotor2::from_angle(PI / 6.0) * Unit::unit_x(),
                length: 2.0,
            },
        ) {
            EdgeClipResult::Passes { enters, exits } => {
                assert_eq!(enters, 0.0);
                assert!((exits - 1.0 / (PI / 6.0).cos()).abs() < 0.001);
            }
            other => panic!("Expected a pass, got {other:?}"),
        }
        // completely beside the target slab
        match clip_edge(
            Edge {
                start: m::Vec2::new(0.0, 0.0),
                dir: Unit::unit_x(),
                length: 1.0,
            },
            Edge {
                start: m::Vec2::new(5.0, 1.0),
                dir: Unit::unit_x(),
                length: 1.0,
            },
        ) {
            EdgeClipResult::Misses => (),
            other => panic!("Expected a miss, got {other:?}"),
        }
    }

    #[test]
    fn circles() {
        let (p1, p2) = (at(0.0, 0.0), at(1.5, 0.0));
        let circle = ShapeKind::Circle { r: 1.0 };
        let manifold = intersection_check(&p1, circle, &p2, circle);
        let Manifold::One(contact) = manifold else {
            panic!("expected one contact, got {manifold:?}");
        };
        assert!((*contact.normal - m::Vec2::unit_x()).mag() < 1e-9);
        assert!((contact.resolve(&p1, &p2).1 - 0.5).abs() < 1e-9);

        let far = at(2.5, 0.0);
        assert!(matches!(
            intersection_check(&p1, circle, &far, circle),
            Manifold::Empty
        ));
    }

    #[test]
    fn box_resting_on_box_gives_two_points() {
        let ground = at(0.0, 0.0);
        let ground_shape = ShapeKind::Rect { hw: 10.0, hh: 1.0 };
        let block = at(2.0, 1.9);
        let block_shape = ShapeKind::Rect { hw: 1.0, hh: 1.0 };

        let manifold = intersection_check(&block, block_shape, &ground, ground_shape);
        assert!(matches!(manifold, Manifold::Two(..)), "got {manifold:?}");
        for c in manifold.iter() {
            // normal points away from the block, i.e. down into the ground
            assert!((*c.normal - -m::Vec2::unit_y()).mag() < 1e-9);
        }
        for d in depths(manifold, &block, &ground) {
            assert!((d - 0.1).abs() < 1e-9, "depth {d}");
        }

        // same thing with the roles swapped
        let manifold = intersection_check(&ground, ground_shape, &block, block_shape);
        for c in manifold.iter() {
            assert!((*c.normal - m::Vec2::unit_y()).mag() < 1e-9);
        }
        for d in depths(manifold, &ground, &block) {
            assert!((d - 0.1).abs() < 1e-9, "depth {d}");
        }
    }

    #[test]
    fn tilted_box_hits_with_a_corner() {
        let ground = at(0.0, 0.0);
        let ground_shape = ShapeKind::Rect { hw: 10.0, hh: 1.0 };
        let corner_depth = 0.05;
        let half_diag = 2.0_f64.sqrt();
        let block = m::pose_from_parts(
            m::Vec2::new(0.0, 1.0 + half_diag - corner_depth),
            Angle::Deg(45.0),
        );
        let manifold = intersection_check(
            &block,
            ShapeKind::Rect { hw: 1.0, hh: 1.0 },
            &ground,
            ground_shape,
        );
        let Manifold::One(contact) = manifold else {
            panic!("expected a single corner contact, got {manifold:?}");
        };
        assert!((contact.resolve(&block, &ground).1 - corner_depth).abs() < 1e-6);
        assert!(contact.normal.y < -0.99);
    }

    #[test]
    fn circle_on_segment() {
        let floor = at(0.0, 0.0);
        let floor_shape = ShapeKind::Capsule { hl: 5.0, r: 0.0 };
        let ball = at(3.0, 0.9);
        let manifold = intersection_check(&ball, ShapeKind::Circle { r: 1.0 }, &floor, floor_shape);
        let Manifold::One(contact) = manifold else {
            panic!("expected one contact, got {manifold:?}");
        };
        assert!((*contact.normal - -m::Vec2::unit_y()).mag() < 1e-9);
        assert!((contact.resolve(&ball, &floor).1 - 0.1).abs() < 1e-9);

        // past the end of the segment
        let beside = at(6.5, 0.5);
        assert!(matches!(
            intersection_check(&beside, ShapeKind::Circle { r: 1.0 }, &floor, floor_shape),
            Manifold::Empty
        ));
    }

    #[test]
    fn box_on_segment() {
        let floor = at(0.0, 0.0);
        let floor_shape = ShapeKind::Capsule { hl: 5.0, r: 0.0 };
        let block = at(0.0, 0.95);
        let manifold =
            intersection_check(&block, ShapeKind::Rect { hw: 1.0, hh: 1.0 }, &floor, floor_shape);
        assert!(matches!(manifold, Manifold::Two(..)), "got {manifold:?}");
        for c in manifold.iter() {
            assert!(c.normal.y < -0.99);
        }
        for d in depths(manifold, &block, &floor) {
            assert!((d - 0.05).abs() < 1e-9, "depth {d}");
        }
    }

    #[test]
    fn crossing_capsules() {
        let p1 = at(0.0, 0.0);
        let p2 = m::pose_from_parts(m::Vec2::new(0.0, 0.5), Angle::Deg(90.0));
        let manifold = intersection_check(
            &p1,
            ShapeKind::Capsule { hl: 2.0, r: 0.5 },
            &p2,
            ShapeKind::Capsule { hl: 2.0, r: 0.5 },
        );
        assert!(!matches!(manifold, Manifold::Empty));

        let apart = at(0.0, 1.5);
        assert!(matches!(
            intersection_check(
                &p1,
                ShapeKind::Capsule { hl: 2.0, r: 0.5 },
                &apart,
                ShapeKind::Capsule { hl: 2.0, r: 0.5 },
            ),
            Manifold::Empty
        ));
    }

    #[test]
    fn pointlike_capsule_acts_as_circle() {
        let p1 = at(0.0, 0.0);
        let p2 = at(0.0, 1.5);
        let manifold = intersection_check(
            &p1,
            ShapeKind::Capsule { hl: 0.0, r: 1.0 },
            &p2,
            ShapeKind::Circle { r: 1.0 },
        );
        let Manifold::One(contact) = manifold else {
            panic!("expected one contact, got {manifold:?}");
        };
        assert!((*contact.normal - m::Vec2::unit_y()).mag() < 1e-9);
    }
}
