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

use std::f32;

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3, Zero};

use crate::geom::*;

/// An object that has a volume or area and can be tested against another for
/// overlap. No contact information is produced.
pub trait Overlaps<RHS> {
    /// Returns true if the two objects overlap and false otherwise.
    fn overlaps(&self, rhs: &RHS) -> bool;
}

impl Overlaps<AABB> for AABB {
    fn overlaps(&self, rhs: &AABB) -> bool {
        (self.c.x - rhs.c.x).abs() <= (self.r.x + rhs.r.x)
            && (self.c.y - rhs.c.y).abs() <= (self.r.y + rhs.r.y)
            && (self.c.z - rhs.c.z).abs() <= (self.r.z + rhs.r.z)
    }
}

impl Overlaps<AABB> for Sphere {
    fn overlaps(&self, rhs: &AABB) -> bool {
        let d: f32 = rhs.min_dist(&self.c);
        d <= self.r * self.r
    }
}

impl Overlaps<AABB> for Plane {
    /// The box overlaps the plane if its projection radius onto the normal
    /// reaches the plane.
    fn overlaps(&self, rhs: &AABB) -> bool {
        let r = rhs.r.x * self.n.x.abs()
            + rhs.r.y * self.n.y.abs()
            + rhs.r.z * self.n.z.abs();
        self.distance(rhs.c).abs() <= r
    }
}

impl Overlaps<AABB> for Segment {
    /// Separating axis test between a segment and a box.
    fn overlaps(&self, rhs: &AABB) -> bool {
        let e = rhs.r;
        let mid = self.a.midpoint(self.b);
        let d = self.b - mid;
        let m = mid - rhs.c;

        let mut adx = d.x.abs();
        if m.x.abs() > e.x + adx {
            return false;
        }
        let mut ady = d.y.abs();
        if m.y.abs() > e.y + ady {
            return false;
        }
        let mut adz = d.z.abs();
        if m.z.abs() > e.z + adz {
            return false;
        }

        // Counteract arithmetic errors when the segment is near parallel to
        // a coordinate axis.
        adx += ROUNDING_ERROR;
        ady += ROUNDING_ERROR;
        adz += ROUNDING_ERROR;

        if (m.y * d.z - m.z * d.y).abs() > e.y * adz + e.z * ady {
            return false;
        }
        if (m.z * d.x - m.x * d.z).abs() > e.x * adz + e.z * adx {
            return false;
        }
        if (m.x * d.y - m.y * d.x).abs() > e.x * ady + e.y * adx {
            return false;
        }
        true
    }
}

impl Overlaps<OBB> for Segment {
    fn overlaps(&self, rhs: &OBB) -> bool {
        self.transform(&rhs.world_to_local()).overlaps(&rhs.local_aabb())
    }
}

impl Overlaps<AABB> for Triangle {
    /// Separating axis test over the three box normals, the triangle normal
    /// and the nine edge cross products.
    fn overlaps(&self, rhs: &AABB) -> bool {
        let e = rhs.r;
        let v = [self.a - rhs.c, self.b - rhs.c, self.c - rhs.c];
        let f = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];

        let separated = |axis: Vector3<f32>| -> bool {
            if axis.magnitude2() <= COLLISION_EPSILON * COLLISION_EPSILON {
                return false;
            }
            let p = [v[0].dot(axis), v[1].dot(axis), v[2].dot(axis)];
            let r = e.x * axis.x.abs() + e.y * axis.y.abs() + e.z * axis.z.abs();
            p[0].max(p[1]).max(p[2]) < -r || p[0].min(p[1]).min(p[2]) > r
        };

        for fj in f.iter() {
            for i in 0..3 {
                let mut u: Vector3<f32> = Vector3::zero();
                u[i] = 1.0;
                if separated(u.cross(*fj)) {
                    return false;
                }
            }
        }

        for i in 0..3 {
            let mut u: Vector3<f32> = Vector3::zero();
            u[i] = 1.0;
            if separated(u) {
                return false;
            }
        }

        !separated(f[0].cross(f[1]))
    }
}

impl Overlaps<Triangle> for Triangle {
    /// Two triangles overlap if an edge of either pierces the other.
    /// Coplanar triangles are not detected.
    fn overlaps(&self, rhs: &Triangle) -> bool {
        self.edges().iter().any(|e| e.intersection(rhs).is_some())
            || rhs.edges().iter().any(|e| e.intersection(self).is_some())
    }
}

impl Overlaps<OBB> for OBB {
    /// Separating axis test over the fifteen candidate axes of two oriented
    /// boxes.
    fn overlaps(&self, rhs: &OBB) -> bool {
        let a = self;
        let b = rhs;
        let mut rot = [[0.0f32; 3]; 3];
        let mut abs_rot = [[0.0f32; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                rot[i][j] = a.u[i].dot(b.u[j]);
                // The rounding error keeps near parallel edge pairs from
                // producing a null cross product axis.
                abs_rot[i][j] = rot[i][j].abs() + ROUNDING_ERROR;
            }
        }
        let t = b.c - a.c;
        let t = [t.dot(a.u[0]), t.dot(a.u[1]), t.dot(a.u[2])];

        for i in 0..3 {
            let ra = a.e[i];
            let rb = b.e[0] * abs_rot[i][0] + b.e[1] * abs_rot[i][1] + b.e[2] * abs_rot[i][2];
            if t[i].abs() > ra + rb {
                return false;
            }
        }

        for j in 0..3 {
            let ra = a.e[0] * abs_rot[0][j] + a.e[1] * abs_rot[1][j] + a.e[2] * abs_rot[2][j];
            let rb = b.e[j];
            let dist = t[0] * rot[0][j] + t[1] * rot[1][j] + t[2] * rot[2][j];
            if dist.abs() > ra + rb {
                return false;
            }
        }

        for i in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            for j in 0..3 {
                let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                let ra = a.e[i1] * abs_rot[i2][j] + a.e[i2] * abs_rot[i1][j];
                let rb = b.e[j1] * abs_rot[i][j2] + b.e[j2] * abs_rot[i][j1];
                let dist = t[i2] * rot[i1][j] - t[i1] * rot[i2][j];
                if dist.abs() > ra + rb {
                    return false;
                }
            }
        }
        true
    }
}

/// An object that completely encloses another.
pub trait Contains<RHS> {
    /// Returns true if the current object contains the argument.
    fn contains(&self, rhs: &RHS) -> bool;
}

impl Contains<Point3<f32>> for Triangle {
    /// The point must lie on the triangle's plane and inside its edges.
    fn contains(&self, p: &Point3<f32>) -> bool {
        let plane = self.plane();
        if !relative_eq!(plane.distance(*p), 0.0, epsilon = ROUNDING_ERROR) {
            return false;
        }
        let v = p - self.a;
        let ac = self.c - self.a;
        let ab = self.b - self.a;
        let dot1 = ac.dot(ac);
        let dot2 = ac.dot(ab);
        let dot3 = ac.dot(v);
        let dot4 = ab.dot(ab);
        let dot5 = ab.dot(v);
        let denom = dot1 * dot4 - dot2 * dot2;
        if denom.abs() <= COLLISION_EPSILON {
            return false;
        }
        let invd = 1.0 / denom;
        let u = (dot4 * dot3 - dot2 * dot5) * invd;
        let v = (dot1 * dot5 - dot2 * dot3) * invd;
        u >= -ROUNDING_ERROR && v >= -ROUNDING_ERROR && (u + v) <= 1.0 + ROUNDING_ERROR
    }
}

impl Contains<Point3<f32>> for AABB {
    fn contains(&self, p: &Point3<f32>) -> bool {
        (self.c.x - p.x).abs() <= self.r.x
            && (self.c.y - p.y).abs() <= self.r.y
            && (self.c.z - p.z).abs() <= self.r.z
    }
}

impl Contains<Point3<f32>> for OBB {
    fn contains(&self, p: &Point3<f32>) -> bool {
        let d = p - self.c;
        (0..3).all(|i| d.dot(self.u[i]).abs() <= self.e[i] + ROUNDING_ERROR)
    }
}

impl Contains<Point3<f32>> for Sphere {
    fn contains(&self, p: &Point3<f32>) -> bool {
        (p - self.c).magnitude2() <= self.r * self.r
    }
}

impl Contains<AABB> for AABB {
    fn contains(&self, rhs: &AABB) -> bool {
        let (amin, amax) = (self.min(), self.max());
        let (bmin, bmax) = (rhs.min(), rhs.max());
        (0..3).all(|i| amin[i] <= bmin[i] && amax[i] >= bmax[i])
    }
}

impl Contains<OBB> for OBB {
    fn contains(&self, rhs: &OBB) -> bool {
        rhs.corners().iter().all(|p| self.contains(p))
    }
}

/// A collision between a segment and a surface or volume.
#[derive(Copy, Clone, Debug)]
pub struct Intersection {
    /// The point of intersection.
    pub p: Point3<f32>,
    /// Unit surface normal at the point of intersection. Segment to segment
    /// intersections have no surface and report a zero normal.
    pub n: Vector3<f32>,
    /// Parameter along the segment, zero at its start and one at its end.
    pub t: f32,
}

/// A segment that can be tested against an object for its first point of
/// contact. Intersects is not a commutative operator.
pub trait Intersects<RHS> {
    /// Returns an Intersection if one exists.
    fn intersection(&self, rhs: &RHS) -> Option<Intersection>;
}

impl Intersects<Plane> for Segment {
    /// The normal faces the side the segment starts on.
    fn intersection(&self, p: &Plane) -> Option<Intersection> {
        let d = self.direction();
        let denom = p.n.dot(d);
        if denom.abs() <= COLLISION_EPSILON {
            return None;
        }
        let t = (p.d - p.n.dot(self.a.to_vec())) / denom;
        if t < 0.0 || t > 1.0 {
            return None;
        }
        Intersection {
            p: self.at(t),
            n: if p.distance(self.a) < 0.0 { -p.n } else { p.n },
            t,
        }.into()
    }
}

impl Intersects<Triangle> for Segment {
    /// Double sided segment triangle test.
    fn intersection(&self, tri: &Triangle) -> Option<Intersection> {
        let d = self.direction();
        let e1 = tri.b - tri.a;
        let e2 = tri.c - tri.a;
        let pvec = d.cross(e2);
        let det = e1.dot(pvec);
        if det.abs() <= COLLISION_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = self.a - tri.a;
        let u = tvec.dot(pvec) * inv_det;
        if u < 0.0 || u > 1.0 {
            return None;
        }
        let qvec = tvec.cross(e1);
        let v = d.dot(qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(qvec) * inv_det;
        if t < 0.0 || t > 1.0 {
            return None;
        }
        Intersection {
            p: self.at(t),
            n: tri.normal(),
            t,
        }.into()
    }
}

impl Intersects<Sphere> for Segment {
    fn intersection(&self, s: &Sphere) -> Option<Intersection> {
        let d = self.direction();
        let m = self.a - s.c;
        let a = d.magnitude2();
        let b = m.dot(d);
        let c = m.magnitude2() - s.r * s.r;
        if c > 0.0 && b > 0.0 {
            return None;
        }
        if a <= COLLISION_EPSILON {
            // Degenerate segment: a point either inside or outside.
            return if c <= 0.0 {
                Some(Intersection { p: self.a, n: surface_normal(self.a - s.c, d), t: 0.0 })
            } else {
                None
            };
        }
        let discr = b * b - a * c;
        if discr < 0.0 {
            return None;
        }
        let t = ((-b - discr.sqrt()) / a).max(0.0);
        if t > 1.0 {
            return None;
        }
        let p = self.at(t);
        Intersection {
            p,
            n: surface_normal(p - s.c, d),
            t,
        }.into()
    }
}

impl Intersects<AABB> for Segment {
    /// Slab test. The normal is that of the face the segment enters through.
    fn intersection(&self, a: &AABB) -> Option<Intersection> {
        let (mut t_min, mut t_max): (f32, f32) = (0.0, f32::INFINITY);
        let mut enter_axis: Option<(usize, f32)> = None;
        let p = self.a;
        let d = self.direction();
        for dim in 0..3 {
            if d[dim].abs() < COLLISION_EPSILON {
                if (p[dim] - a.c[dim]).abs() > a.r[dim] {
                    return None;
                }
            } else {
                let ood = 1.0 / d[dim];
                let t1 = (a.c[dim] - a.r[dim] - p[dim]) * ood;
                let t2 = (a.c[dim] + a.r[dim] - p[dim]) * ood;
                let (near, far, sign) = if t1 > t2 { (t2, t1, 1.0) } else { (t1, t2, -1.0) };
                if near > t_min {
                    t_min = near;
                    enter_axis = Some((dim, sign));
                }
                t_max = t_max.min(far);
                if t_min > t_max {
                    return None;
                }
            }
        }
        if t_min > 1.0 {
            return None;
        }
        let hit = self.at(t_min);
        let n = match enter_axis {
            Some((dim, sign)) => {
                let mut n: Vector3<f32> = Vector3::zero();
                n[dim] = sign;
                n
            },
            // The segment starts inside the box.
            None => nearest_face(a, hit).0,
        };
        Intersection {
            p: hit,
            n,
            t: t_min,
        }.into()
    }
}

impl Intersects<OBB> for Segment {
    fn intersection(&self, obb: &OBB) -> Option<Intersection> {
        let local = self.transform(&obb.world_to_local());
        local.intersection(&obb.local_aabb()).map(|i| {
            let n = obb.u[0] * i.n.x + obb.u[1] * i.n.y + obb.u[2] * i.n.z;
            Intersection { p: self.at(i.t), n, t: i.t }
        })
    }
}

impl Intersects<Capsule> for Segment {
    /// The first hit is the earliest of the body cylinder and the two end
    /// caps. A segment starting inside the capsule hits at its start.
    fn intersection(&self, cap: &Capsule) -> Option<Intersection> {
        let axis = Segment::from(*cap);
        let d = self.direction();
        let hit_at = |t: f32| -> Intersection {
            let p = self.at(t);
            let on_axis: Point3<f32> = axis.min_dist(&p);
            Intersection { p, n: surface_normal(p - on_axis, d), t }
        };

        let start_dist: f32 = axis.min_dist(&self.a);
        if start_dist <= cap.r * cap.r {
            return Some(hit_at(0.0));
        }

        let mut best: Option<f32> = None;
        let mut consider = |t: f32| {
            if t >= 0.0 && t <= 1.0 && best.map_or(true, |b| t < b) {
                best = Some(t);
            }
        };

        for &c in [axis.a, axis.b].iter() {
            if let Some(i) = self.intersection(&Sphere { c, r: cap.r }) {
                consider(i.t);
            }
        }

        // Infinite cylinder around the axis, restricted to the body.
        let ad = cap.d;
        let m = self.a - cap.a;
        let dd = ad.magnitude2();
        let md = m.dot(ad);
        let nd = d.dot(ad);
        let a = dd * d.magnitude2() - nd * nd;
        if a.abs() > COLLISION_EPSILON && dd > COLLISION_EPSILON {
            let k = m.magnitude2() - cap.r * cap.r;
            let c = dd * k - md * md;
            let b = dd * m.dot(d) - nd * md;
            let discr = b * b - a * c;
            if discr >= 0.0 {
                let t = (-b - discr.sqrt()) / a;
                let along = md + t * nd;
                if along >= 0.0 && along <= dd {
                    consider(t);
                }
            }
        }

        best.map(hit_at)
    }
}

impl Intersects<Segment> for Segment {
    /// Two segments intersect when their closest points coincide within the
    /// rounding error.
    fn intersection(&self, rhs: &Segment) -> Option<Intersection> {
        let (p, q) = self.min_dist(rhs);
        if (p - q).magnitude2() > ROUNDING_ERROR * ROUNDING_ERROR {
            return None;
        }
        let len2 = self.length2();
        let t = if len2 > COLLISION_EPSILON {
            (p - self.a).dot(self.direction()) / len2
        } else {
            0.0
        };
        Intersection {
            p: p.midpoint(q),
            n: Vector3::zero(),
            t,
        }.into()
    }
}

/// Normalizes an outward vector, falling back to facing the incoming
/// direction when the vector is degenerate.
fn surface_normal(outward: Vector3<f32>, incoming: Vector3<f32>) -> Vector3<f32> {
    if outward.magnitude2() > COLLISION_EPSILON * COLLISION_EPSILON {
        outward.normalize()
    } else if incoming.magnitude2() > COLLISION_EPSILON * COLLISION_EPSILON {
        -incoming.normalize()
    } else {
        Vector3::new(0.0, 1.0, 0.0)
    }
}

/// Returns true if a hit point is far enough from both ends of the segment
/// to not count as touching a corner.
pub fn excludes_corners(seg: &Segment, p: Point3<f32>) -> bool {
    (seg.a - p).magnitude2() > ROUNDING_ERROR && (seg.b - p).magnitude2() > ROUNDING_ERROR
}
