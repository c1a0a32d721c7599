//! Intersection queries for points vs. shapes.

use super::ShapeKind;
use crate::math as m;

/// Check whether or not a point is inside a shape at the given world pose.
pub(crate) fn point_in_shape(point: m::Vec2, pose: &m::Pose, shape: ShapeKind) -> bool {
    let p_wrt_s = pose.inversed() * point;
    match shape {
        ShapeKind::Circle { r } => p_wrt_s.mag_sq() < r * r,
        ShapeKind::Rect { hw, hh } => p_wrt_s.x.abs() < hw && p_wrt_s.y.abs() < hh,
        ShapeKind::Capsule { hl, r } => {
            let x_dist = (p_wrt_s.x.abs() - hl).max(0.0);
            let y_dist = p_wrt_s.y.abs();
            x_dist * x_dist + y_dist * y_dist < r * r
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Angle;

    #[test]
    fn points_in_rotated_rect() {
        let pose = m::pose_from_parts(m::Vec2::new(5.0, 5.0), Angle::Deg(90.0));
        let rect = ShapeKind::Rect { hw: 3.0, hh: 1.0 };
        assert!(point_in_shape(m::Vec2::new(5.0, 7.5), &pose, rect));
        assert!(!point_in_shape(m::Vec2::new(7.5, 5.0), &pose, rect));
    }

    #[test]
    fn points_near_capsule() {
        let pose = m::Pose::identity();
        let cap = ShapeKind::Capsule { hl: 2.0, r: 0.5 };
        assert!(point_in_shape(m::Vec2::new(2.3, 0.0), &pose, cap));
        assert!(point_in_shape(m::Vec2::new(-1.0, 0.4), &pose, cap));
        assert!(!point_in_shape(m::Vec2::new(2.4, 0.4), &pose, cap));
        // zero radius segments have no inside
        let seg = ShapeKind::Capsule { hl: 2.0, r: 0.0 };
        assert!(!point_in_shape(m::Vec2::zero(), &pose, seg));
    }
}
