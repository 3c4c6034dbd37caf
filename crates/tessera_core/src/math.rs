//! World-space math
//!
//! Re-exports glam plus the few helpers the coordinators need for
//! world-location bookkeeping.

pub use glam::{Quat, Vec3};

/// Squared horizontal (XZ-plane) distance between two points.
pub fn horizontal_distance_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    dx * dx + dz * dz
}

/// Point-in-polygon test on the XZ plane (even-odd rule).
pub fn polygon_contains_xz(points: &[Vec3], p: Vec3) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (a, b) = (points[i], points[j]);
        if (a.z > p.z) != (b.z > p.z) && p.x < (b.x - a.x) * (p.z - a.z) / (b.z - a.z) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_contains_center() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, 10.0),
        ];
        assert!(polygon_contains_xz(&square, Vec3::new(5.0, 3.0, 5.0)));
        assert!(!polygon_contains_xz(&square, Vec3::new(15.0, 0.0, 5.0)));
    }

    #[test]
    fn horizontal_distance_ignores_height() {
        let d = horizontal_distance_sq(Vec3::new(0.0, 100.0, 0.0), Vec3::new(3.0, 0.0, 4.0));
        assert_eq!(d, 25.0);
    }
}
