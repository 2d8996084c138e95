// Copyright 2017 Matthew Plant. This file is part of collgraph.
//
// collgraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// collgraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with collgraph. If not, see <http://www.gnu.org/licenses/>.

use cgmath::{EuclideanSpace, Point3, Vector3};

use crate::geom::*;

/// A type that can be decomposed into an axis aligned bound.
pub trait BoundedBy {
    fn bounds(&self) -> AABB;
}

impl AABB {
    /// Produce a bound that encloses the two arguments.
    pub fn combine(a: &AABB, b: &AABB) -> AABB {
        let (amin, amax) = (a.min(), a.max());
        let (bmin, bmax) = (b.min(), b.max());
        AABB::from_min_max(
            Point3::new(amin.x.min(bmin.x), amin.y.min(bmin.y), amin.z.min(bmin.z)),
            Point3::new(amax.x.max(bmax.x), amax.y.max(bmax.y), amax.z.max(bmax.z)),
        )
    }

    /// The smallest box enclosing every point. Returns None for an empty
    /// iterator.
    pub fn from_points<I>(points: I) -> Option<AABB>
    where
        I: IntoIterator<Item = Point3<f32>>
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (mut min, mut max) = (first, first);
        for p in points {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some(AABB::from_min_max(min, max))
    }
}

impl BoundedBy for AABB {
    #[inline(always)]
    fn bounds(&self) -> AABB {
        *self
    }
}

impl BoundedBy for Triangle {
    fn bounds(&self) -> AABB {
        let min = Point3::new(
            self.a.x.min(self.b.x).min(self.c.x),
            self.a.y.min(self.b.y).min(self.c.y),
            self.a.z.min(self.b.z).min(self.c.z),
        );
        let max = Point3::new(
            self.a.x.max(self.b.x).max(self.c.x),
            self.a.y.max(self.b.y).max(self.c.y),
            self.a.z.max(self.b.z).max(self.c.z),
        );
        AABB::from_min_max(min, max)
    }
}

impl BoundedBy for Sphere {
    fn bounds(&self) -> AABB {
        AABB {
            c: self.c,
            r: Vector3::new(self.r, self.r, self.r),
        }
    }
}

impl BoundedBy for Capsule {
    fn bounds(&self) -> AABB {
        let a = Sphere { c: self.a, r: self.r }.bounds();
        let b = Sphere { c: self.a + self.d, r: self.r }.bounds();
        AABB::combine(&a, &b)
    }
}

impl BoundedBy for OBB {
    fn bounds(&self) -> AABB {
        let mut r = Vector3::new(0.0, 0.0, 0.0);
        for i in 0..3 {
            r += Vector3::new(self.u[i].x.abs(), self.u[i].y.abs(), self.u[i].z.abs()) * self.e[i];
        }
        AABB { c: self.c, r }
    }
}

impl<'a, B: BoundedBy> BoundedBy for &'a [B] {
    /// The bound of a non-empty slice of bounded objects. An empty slice
    /// yields a degenerate box at the origin.
    fn bounds(&self) -> AABB {
        let mut iter = self.iter();
        match iter.next() {
            Some(first) => iter.fold(first.bounds(), |acc, b| AABB::combine(&acc, &b.bounds())),
            None => AABB { c: Point3::origin(), r: Vector3::new(0.0, 0.0, 0.0) },
        }
    }
}
