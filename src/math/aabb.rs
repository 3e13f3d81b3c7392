//! Axis-aligned bounding box
//!
//! Boxes are the three coordinate intervals of an octree cell. Splitting is
//! exact: both halves of an axis share the same midpoint value, so siblings
//! tile their parent with no gap or overlap.

use std::fmt;

use crate::core::types::DVec3;
use crate::math::interval::Interval;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: DVec3, half_extent: DVec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// Cube spanning `[0, size]` on every axis
    pub fn cube(size: f64) -> Self {
        Self::new(DVec3::ZERO, DVec3::splat(size))
    }

    /// Get center point
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size (max - min)
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Volume of the box
    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// The box as three coordinate intervals
    pub fn intervals(&self) -> [Interval; 3] {
        [
            Interval::new(self.min.x, self.max.x),
            Interval::new(self.min.y, self.max.y),
            Interval::new(self.min.z, self.max.z),
        ]
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.x >= self.min.x && p.x <= self.max.x &&
        p.y >= self.min.y && p.y <= self.max.y &&
        p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if `other` lies entirely inside this box
    pub fn contains(&self, other: &Aabb) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if two AABBs overlap with positive volume (touching faces do not count)
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x && self.max.x > other.min.x &&
        self.min.y < other.max.y && self.max.y > other.min.y &&
        self.min.z < other.max.z && self.max.z > other.min.z
    }

    /// Expand AABB to include point
    pub fn expand(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Corner position; index bits are (bit 0 = +x, bit 1 = +y, bit 2 = +z)
    pub fn corner(&self, index: u8) -> DVec3 {
        DVec3::new(
            if index & 1 != 0 { self.max.x } else { self.min.x },
            if index & 2 != 0 { self.max.y } else { self.min.y },
            if index & 4 != 0 { self.max.z } else { self.min.z },
        )
    }

    /// Bitmask of axes (bit 0 = x, 1 = y, 2 = z) long enough to split,
    /// i.e. whose halves would still be at least `min_cell` wide.
    pub fn split_axes(&self, min_cell: f64) -> u8 {
        let s = self.size();
        let mut axes = 0u8;
        if s.x >= 2.0 * min_cell { axes |= 1; }
        if s.y >= 2.0 * min_cell { axes |= 2; }
        if s.z >= 2.0 * min_cell { axes |= 4; }
        axes
    }

    /// Octant slots that exist when splitting only along `axes`.
    ///
    /// A slot is present when every axis bit it sets is a split axis. All 8
    /// slots exist when all three axes split; a fully indivisible box yields
    /// only slot 0, which is the box itself.
    pub fn octant_mask(axes: u8) -> u8 {
        (0u8..8)
            .filter(|i| i & !axes == 0)
            .fold(0u8, |mask, i| mask | (1 << i))
    }

    /// Get child octant AABB, splitting only along `axes`.
    /// Axes that are not split keep the parent's full extent.
    pub fn octant(&self, index: u8, axes: u8) -> Aabb {
        let mid = self.center();
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..3 {
            let bit = 1 << axis;
            if axes & bit == 0 {
                continue;
            }
            if index & bit != 0 {
                min[axis] = mid[axis];
            } else {
                max[axis] = mid[axis];
            }
        }
        Aabb { min, max }
    }

    /// Get child octant AABB for a full octree split
    pub fn child_octant(&self, index: u8) -> Aabb {
        self.octant(index, 0b111)
    }

    /// Scale about the origin
    pub fn scaled(&self, factor: f64) -> Aabb {
        let a = self.min * factor;
        let b = self.max * factor;
        Aabb { min: a.min(b), max: a.max(b) }
    }

    /// Translate by `delta`
    pub fn translated(&self, delta: DVec3) -> Aabb {
        Aabb { min: self.min + delta, max: self.max + delta }
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}, {:.4}]..[{:.4}, {:.4}, {:.4}]",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);
        assert_eq!(aabb.center(), DVec3::splat(0.5));
        assert_eq!(aabb.size(), DVec3::ONE);
        assert_eq!(aabb.volume(), 1.0);
    }

    #[test]
    fn test_corners() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.corner(0), DVec3::ZERO);
        assert_eq!(aabb.corner(7), DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.corner(0b010), DVec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_child_octant() {
        let parent = Aabb::new(DVec3::ZERO, DVec3::splat(2.0));
        let child0 = parent.child_octant(0); // -x, -y, -z
        assert_eq!(child0.min, DVec3::ZERO);
        assert_eq!(child0.max, DVec3::ONE);
        let child7 = parent.child_octant(7);
        assert_eq!(child7.min, DVec3::ONE);
        assert_eq!(child7.max, DVec3::splat(2.0));
    }

    #[test]
    fn test_octants_tile_parent() {
        let parent = Aabb::new(DVec3::new(-1.0, 0.5, 2.0), DVec3::new(3.0, 1.5, 9.0));
        let total: f64 = (0..8).map(|i| parent.child_octant(i).volume()).sum();
        assert!((total - parent.volume()).abs() < 1e-12);
        for a in 0..8 {
            for b in (a + 1)..8 {
                assert!(!parent.child_octant(a).overlaps(&parent.child_octant(b)));
            }
        }
    }

    #[test]
    fn test_degenerate_axis_split() {
        // Flat along z: only x and y split
        let flat = Aabb::new(DVec3::ZERO, DVec3::new(1.0, 1.0, 0.001));
        let axes = flat.split_axes(0.01);
        assert_eq!(axes, 0b011);
        let mask = Aabb::octant_mask(axes);
        assert_eq!(mask, 0b0000_1111);

        let total: f64 = (0..8u8)
            .filter(|i| mask & (1 << i) != 0)
            .map(|i| flat.octant(i, axes).volume())
            .sum();
        assert!((total - flat.volume()).abs() < 1e-15);
        assert_eq!(flat.octant(3, axes).max.z, 0.001);
    }

    #[test]
    fn test_indivisible_box_has_single_slot() {
        assert_eq!(Aabb::octant_mask(0), 0b1);
        assert_eq!(Aabb::octant_mask(0b111), 0xFF);
    }

    #[test]
    fn test_overlap_excludes_touching() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let b = Aabb::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(2.0, 1.0, 1.0));
        let c = Aabb::new(DVec3::splat(0.5), DVec3::splat(1.5));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_scaled_and_translated() {
        let a = Aabb::new(DVec3::ONE, DVec3::splat(2.0));
        assert_eq!(a.scaled(2.0), Aabb::new(DVec3::splat(2.0), DVec3::splat(4.0)));
        assert_eq!(a.scaled(-1.0), Aabb::new(DVec3::splat(-2.0), DVec3::splat(-1.0)));
        assert_eq!(a.translated(DVec3::X), Aabb::new(DVec3::new(2.0, 1.0, 1.0), DVec3::new(3.0, 2.0, 2.0)));
    }
}
