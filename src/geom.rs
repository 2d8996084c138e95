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
use std::ops::{Add, Sub};

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix,
             Transform, Vector3};
use serde::{Deserialize, Serialize};

/// Maximum tolerence for error, i.e. what we consider the x86 floating
/// point epsilon.
pub const COLLISION_EPSILON: f32 = 0.000001;

/// Slack added on top of a penetration depth when a node is pushed out of a
/// rival, and the tolerance used for corner exclusion and movement checks.
pub const ROUNDING_ERROR: f32 = 0.00001;

/// Planes are a unit normal vector and a distance: every point x on the plane
/// satisfies `n.dot(x) == d`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub n: Vector3<f32>,
    pub d: f32,
}

impl Plane {
    /// Creates a plane passing through p with the given normal.
    pub fn from_point_normal(p: Point3<f32>, n: Vector3<f32>) -> Self {
        let n = n.normalize();
        Plane { n, d: n.dot(p.to_vec()) }
    }

    /// Signed distance of p to the plane, positive on the front side.
    pub fn distance(&self, p: Point3<f32>) -> f32 {
        self.n.dot(p.to_vec()) - self.d
    }

    pub fn is_front(&self, p: Point3<f32>) -> bool {
        self.distance(p) > 0.0
    }

    /// Maps the plane through an affine transform. Non-uniform scaling is
    /// handled by transforming the normal with the inverse transpose.
    pub fn transform(&self, m: &Matrix4<f32>) -> Plane {
        let p = m.transform_point(Point3::from_vec(self.n * self.d));
        let n = match m.invert() {
            Some(inv) => normal_matrix(&inv) * self.n,
            None => self.n,
        };
        Plane::from_point_normal(p, n)
    }
}

impl From<(Point3<f32>, Point3<f32>, Point3<f32>)> for Plane {
    fn from(p: (Point3<f32>, Point3<f32>, Point3<f32>)) -> Self {
        let (a, b, c) = p;
        Plane::from_point_normal(a, (b - a).cross(c - a))
    }
}

/// Segments are lines with finite length running from a to b.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub a: Point3<f32>,
    pub b: Point3<f32>,
}

impl Segment {
    pub fn new(a: Point3<f32>, b: Point3<f32>) -> Self {
        Segment { a, b }
    }

    pub fn direction(&self) -> Vector3<f32> {
        self.b - self.a
    }

    pub fn length2(&self) -> f32 {
        self.direction().magnitude2()
    }

    /// Point at parameter t, where 0 is a and 1 is b.
    pub fn at(&self, t: f32) -> Point3<f32> {
        self.a + self.direction() * t
    }

    pub fn reversed(&self) -> Segment {
        Segment { a: self.b, b: self.a }
    }

    pub fn transform(&self, m: &Matrix4<f32>) -> Segment {
        Segment {
            a: m.transform_point(self.a),
            b: m.transform_point(self.b),
        }
    }
}

impl From<(Point3<f32>, Point3<f32>)> for Segment {
    fn from(p: (Point3<f32>, Point3<f32>)) -> Self {
        Segment {
            a: p.0,
            b: p.1
        }
    }
}

/// Triangles are three points in space. The front side is the one the
/// counter-clockwise normal `(b - a) x (c - a)` points to.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub a: Point3<f32>,
    pub b: Point3<f32>,
    pub c: Point3<f32>,
}

impl Triangle {
    pub fn new(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> Self {
        Triangle { a, b, c }
    }

    /// Unit normal of the triangle. Degenerate triangles yield a zero vector.
    pub fn normal(&self) -> Vector3<f32> {
        let n = (self.b - self.a).cross(self.c - self.a);
        let len = n.magnitude();
        if len <= COLLISION_EPSILON {
            Vector3::new(0.0, 0.0, 0.0)
        } else {
            n / len
        }
    }

    pub fn plane(&self) -> Plane {
        let n = self.normal();
        Plane { n, d: n.dot(self.a.to_vec()) }
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::centroid(&[self.a, self.b, self.c])
    }

    /// True if p lies strictly on the front side of the triangle's plane.
    pub fn is_front(&self, p: Point3<f32>) -> bool {
        self.plane().is_front(p)
    }

    pub fn edges(&self) -> [Segment; 3] {
        [
            Segment::new(self.a, self.b),
            Segment::new(self.b, self.c),
            Segment::new(self.c, self.a),
        ]
    }

    pub fn transform(&self, m: &Matrix4<f32>) -> Triangle {
        Triangle {
            a: m.transform_point(self.a),
            b: m.transform_point(self.b),
            c: m.transform_point(self.c),
        }
    }

    pub fn vertices(&self) -> [Point3<f32>; 3] {
        [self.a, self.b, self.c]
    }
}

impl From<(Point3<f32>, Point3<f32>, Point3<f32>)> for Triangle {
    fn from(p: (Point3<f32>, Point3<f32>, Point3<f32>)) -> Self {
        Triangle::new(p.0, p.1, p.2)
    }
}

/// Axis Aligned Bounding Boxes are closed boxes aligned to the axes of the
/// coordinate system. AABBs are described by a point and three half widths.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AABB {
    pub c: Point3<f32>,
    pub r: Vector3<f32>,
}

impl AABB {
    pub fn from_min_max(min: Point3<f32>, max: Point3<f32>) -> Self {
        AABB {
            c: min.midpoint(max),
            r: (max - min) * 0.5,
        }
    }

    pub fn min(&self) -> Point3<f32> {
        self.c - self.r
    }

    pub fn max(&self) -> Point3<f32> {
        self.c + self.r
    }

    /// Index of the axis with the largest extent. Ties go to the lowest axis.
    pub fn longest_axis(&self) -> usize {
        let mut axis = 0;
        for i in 1..3 {
            if self.r[i] > self.r[axis] {
                axis = i;
            }
        }
        axis
    }

    /// The eight corners of the box.
    pub fn corners(&self) -> [Point3<f32>; 8] {
        let mut corners = [self.c; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            for axis in 0..3 {
                let sign = if i >> axis & 1 == 1 { 1.0 } else { -1.0 };
                corner[axis] += self.r[axis] * sign;
            }
        }
        corners
    }

    /// Splits the box at the given distance along an axis, returning the
    /// lower (near) and upper (far) halves.
    pub fn split(&self, axis: usize, distance: f32) -> (AABB, AABB) {
        let (min, max) = (self.min(), self.max());
        let distance = clamp(distance, min[axis], max[axis]);
        let mut near_max = max;
        near_max[axis] = distance;
        let mut far_min = min;
        far_min[axis] = distance;
        (AABB::from_min_max(min, near_max), AABB::from_min_max(far_min, max))
    }

    /// Scales the box about the origin of its frame, component wise.
    pub fn scale(&self, s: Vector3<f32>) -> AABB {
        AABB {
            c: Point3::new(self.c.x * s.x, self.c.y * s.y, self.c.z * s.z),
            r: Vector3::new(
                (self.r.x * s.x).abs(),
                (self.r.y * s.y).abs(),
                (self.r.z * s.z).abs()
            ),
        }
    }
}

/// Oriented Bounding Boxes are a center, three orthonormal axes and three
/// half widths measured along those axes.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OBB {
    pub c: Point3<f32>,
    pub u: [Vector3<f32>; 3],
    pub e: Vector3<f32>,
}

impl OBB {
    /// An OBB large enough to hold anything a scene reasonably contains.
    pub fn huge() -> Self {
        OBB::from(AABB {
            c: Point3::new(0.0, 0.0, 0.0),
            r: Vector3::new(1.0e9, 1.0e9, 1.0e9),
        })
    }

    /// Builds an OBB enclosing the swept sphere (capsule) of the given radius
    /// along the segment. The first axis runs along the segment.
    pub fn from_segment(seg: &Segment, radius: f32) -> Self {
        let d = seg.direction();
        let len = d.magnitude();
        let u0 = if len > COLLISION_EPSILON {
            d / len
        } else {
            Vector3::new(1.0, 0.0, 0.0)
        };
        let helper = if u0.x.abs() < 0.9 {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };
        let u1 = u0.cross(helper).normalize();
        let u2 = u0.cross(u1);
        OBB {
            c: seg.a.midpoint(seg.b),
            u: [u0, u1, u2],
            e: Vector3::new(len * 0.5 + radius, radius, radius),
        }
    }

    /// Maps a local AABB through an affine transform. The scale of the
    /// transform ends up in the half widths.
    pub fn from_transformed_aabb(aabb: &AABB, m: &Matrix4<f32>) -> Self {
        let c = m.transform_point(aabb.c);
        let mut u = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        ];
        let mut e = Vector3::new(0.0, 0.0, 0.0);
        for i in 0..3 {
            let axis = m[i].truncate();
            let len = axis.magnitude();
            u[i] = if len > COLLISION_EPSILON { axis / len } else { u[i] };
            e[i] = aabb.r[i] * len;
        }
        // Keep the basis orthonormal even when the axes were sheared.
        let u2 = u[0].cross(u[1]).normalize();
        let u1 = u2.cross(u[0]);
        OBB { c, u: [u[0], u1, u2], e }
    }

    /// Matrix taking world coordinates into the box's frame, where the box
    /// becomes an AABB centered on the origin with half widths `e`.
    pub fn world_to_local(&self) -> Matrix4<f32> {
        let rot = Matrix3::from_cols(self.u[0], self.u[1], self.u[2]).transpose();
        Matrix4::from(rot) * Matrix4::from_translation(-self.c.to_vec())
    }

    /// The box as an AABB in its own frame.
    pub fn local_aabb(&self) -> AABB {
        AABB { c: Point3::new(0.0, 0.0, 0.0), r: self.e }
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let mut corners = [self.c; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            for axis in 0..3 {
                let sign = if i >> axis & 1 == 1 { 1.0 } else { -1.0 };
                *corner += self.u[axis] * self.e[axis] * sign;
            }
        }
        corners
    }
}

impl From<AABB> for OBB {
    fn from(aabb: AABB) -> Self {
        OBB {
            c: aabb.c,
            u: [
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
                Vector3::new(0.0, 0.0, 1.0),
            ],
            e: aabb.r,
        }
    }
}

/// Spheres are a point and a distance.
/// Like AABBs, spheres as bounds are closed.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub c: Point3<f32>,
    pub r: f32,
}

/// A sphere swept along a line.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub a: Point3<f32>,  // Line start
    pub d: Vector3<f32>, // Line direction
    pub r: f32,
}

impl From<Capsule> for Segment {
    fn from(c: Capsule) -> Segment {
        Segment{ a: c.a, b: c.a + c.d }
    }
}

impl Add<Vector3<f32>> for AABB {
    type Output = AABB;

    fn add(self, v: Vector3<f32>) -> AABB {
        AABB { c: self.c + v, ..self }
    }
}

impl Sub<Vector3<f32>> for AABB {
    type Output = AABB;

    fn sub(self, v: Vector3<f32>) -> AABB {
        AABB { c: self.c - v, ..self }
    }
}

#[inline(always)]
pub(crate) fn clamp(n: f32, min: f32, max: f32) -> f32 {
    if n < min {
        min
    } else if n > max {
        max
    } else {
        n
    }
}

/// The upper left 3x3 of the inverse transpose, used to carry normals through
/// a transform. Pass the inverse of the transform the points went through.
pub fn normal_matrix(inverse: &Matrix4<f32>) -> Matrix3<f32> {
    Matrix3::from_cols(
        inverse.x.truncate(),
        inverse.y.truncate(),
        inverse.z.truncate()
    ).transpose()
}

/// Length of each basis column of a transform, i.e. its scale per axis.
pub fn matrix_scale(m: &Matrix4<f32>) -> Vector3<f32> {
    Vector3::new(
        m.x.truncate().magnitude(),
        m.y.truncate().magnitude(),
        m.z.truncate().magnitude(),
    )
}

/// Often times we want to determine how close to objects are, or what pair of
/// points on their surfaces are closest.
pub trait MinDistance<To = Point3<f32>, Result = Point3<f32>> {
    fn min_dist(&self, to: &To) -> Result;
}

impl MinDistance<Point3<f32>, f32> for Plane {
    /// Returns the signed distance
    fn min_dist(&self, q: &Point3<f32>) -> f32 {
        self.distance(*q)
    }
}

impl MinDistance<Point3<f32>> for Plane {
    /// Returns closest point on plane to q
    fn min_dist(&self, q: &Point3<f32>) -> Point3<f32> {
        q + -self.n * self.distance(*q)
    }
}

impl MinDistance<Point3<f32>, f32> for Segment {
    /// Returns squared distance between the segment and the point.
    fn min_dist(&self, c: &Point3<f32>) -> f32 {
        let ab = self.b - self.a;
        let ac = c - self.a;
        let e = ac.dot(ab);
        if e <= 0.0 {
            ac.magnitude2()
        } else {
            let f = ab.magnitude2();
            if e >= f {
                (c - self.b).magnitude2()
            } else {
                ac.magnitude2() - e * e / f
            }
        }
    }
}

impl MinDistance<Point3<f32>> for Segment {
    /// Returns closest point on segment to q
    fn min_dist(&self, q: &Point3<f32>) -> Point3<f32> {
        let ab = self.b - self.a;
        let t = ab.dot(q - self.a);
        if t <= 0.0 {
            self.a
        } else {
            let denom = ab.dot(ab);
            if t >= denom {
                self.b
            } else {
                self.a + ab * (t / denom)
            }
        }
    }
}

impl MinDistance<Segment, (Point3<f32>, Point3<f32>)> for Segment {
    /// Returns the pair of points, one on each segment, that are the minimum
    /// distance from each other. Parallel segments pick the pair anchored at
    /// the start of self.
    fn min_dist(&self, to: &Segment) -> (Point3<f32>, Point3<f32>) {
        let d1 = self.b - self.a;
        let d2 = to.b - to.a;
        let a = d1.magnitude2();
        let e = d2.magnitude2();
        let r = self.a - to.a;
        let f = d2.dot(r);
        let (s, t) = if a <= COLLISION_EPSILON {
            if e <= COLLISION_EPSILON {
                (0.0, 0.0)
            } else {
                (0.0, clamp(f / e, 0.0, 1.0))
            }
        } else {
            let c = d1.dot(r);
            if e <= COLLISION_EPSILON {
                (clamp(-c / a, 0.0, 1.0), 0.0)
            } else {
                let b = d1.dot(d2);
                let denom = a * e - b * b;
                let s = if denom.abs() > COLLISION_EPSILON * a * e {
                    clamp((b * f - c * e) / denom, 0.0, 1.0)
                } else {
                    0.0
                };
                let t = (b * s + f) / e;
                if t < 0.0 {
                    (clamp(-c / a, 0.0, 1.0), 0.0)
                } else if t > 1.0 {
                    (clamp((b - c) / a, 0.0, 1.0), 1.0)
                } else {
                    (s, t)
                }
            }
        };
        (self.a + d1 * s, to.a + d2 * t)
    }
}

impl MinDistance<Point3<f32>> for Triangle {
    /// Returns closest point on the triangle to q
    fn min_dist(&self, q: &Point3<f32>) -> Point3<f32> {
        let ab = self.b - self.a;
        let ac = self.c - self.a;
        let ap = q - self.a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return self.a;
        }

        let bp = q - self.b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return self.b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return self.a + ab * v;
        }

        let cp = q - self.c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return self.c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return self.a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return self.b + (self.c - self.b) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        self.a + ab * v + ac * w
    }
}

impl MinDistance<Segment, (Point3<f32>, Point3<f32>)> for Triangle {
    /// Returns the closest pair of points between the triangle and the
    /// segment, the first on the triangle and the second on the segment.
    /// Candidates are the three edges, both endpoints projected onto the
    /// triangle and the point where the segment pierces the triangle.
    fn min_dist(&self, seg: &Segment) -> (Point3<f32>, Point3<f32>) {
        use crate::collision::Intersects;

        if let Some(hit) = seg.intersection(self) {
            return (hit.p, hit.p);
        }

        let mut best = {
            let q: Point3<f32> = self.min_dist(&seg.a);
            (q, seg.a)
        };
        let mut best_dist = (best.0 - best.1).magnitude2();
        let mut consider = |pair: (Point3<f32>, Point3<f32>)| {
            let dist = (pair.0 - pair.1).magnitude2();
            if dist < best_dist {
                best_dist = dist;
                best = pair;
            }
        };

        let q: Point3<f32> = self.min_dist(&seg.b);
        consider((q, seg.b));
        for edge in self.edges().iter() {
            let (on_edge, on_seg) = edge.min_dist(seg);
            consider((on_edge, on_seg));
        }
        best
    }
}

impl MinDistance<Point3<f32>> for AABB {
    /// Returns closest point on the AABB to q
    fn min_dist(&self, q: &Point3<f32>) -> Point3<f32> {
        Point3::new(
            clamp(q.x, self.c.x - self.r.x, self.c.x + self.r.x),
            clamp(q.y, self.c.y - self.r.y, self.c.y + self.r.y),
            clamp(q.z, self.c.z - self.r.z, self.c.z + self.r.z),
        )
    }
}

impl MinDistance<Point3<f32>, f32> for AABB {
    /// Returns the squared distance between the AABB and q, zero inside.
    fn min_dist(&self, q: &Point3<f32>) -> f32 {
        let p: Point3<f32> = self.min_dist(q);
        (p - q).magnitude2()
    }
}

impl MinDistance<Segment, (Point3<f32>, Point3<f32>)> for AABB {
    /// Returns the closest pair of points between the box and the segment,
    /// the first on the box and the second on the segment.
    ///
    /// The distance from a point moving along a line to a convex set is
    /// convex in the line parameter, so a golden section search over the
    /// segment converges on the global minimum.
    fn min_dist(&self, seg: &Segment) -> (Point3<f32>, Point3<f32>) {
        const INV_PHI: f32 = 0.618_034;
        let dist = |t: f32| -> f32 {
            let p = seg.at(t);
            MinDistance::<Point3<f32>, f32>::min_dist(self, &p)
        };
        let (mut lo, mut hi) = (0.0f32, 1.0f32);
        let mut x1 = hi - (hi - lo) * INV_PHI;
        let mut x2 = lo + (hi - lo) * INV_PHI;
        let (mut f1, mut f2) = (dist(x1), dist(x2));
        for _ in 0..48 {
            if f1 <= f2 {
                hi = x2;
                x2 = x1;
                f2 = f1;
                x1 = hi - (hi - lo) * INV_PHI;
                f1 = dist(x1);
            } else {
                lo = x1;
                x1 = x2;
                f1 = f2;
                x2 = lo + (hi - lo) * INV_PHI;
                f2 = dist(x2);
            }
        }
        // The endpoints are not sampled by the search itself.
        let mut t = (lo + hi) * 0.5;
        let mut best = dist(t);
        for &end in [0.0f32, 1.0].iter() {
            let d = dist(end);
            if d < best {
                best = d;
                t = end;
            }
        }
        let on_seg = seg.at(t);
        let on_box: Point3<f32> = self.min_dist(&on_seg);
        (on_box, on_seg)
    }
}

impl MinDistance<Point3<f32>> for OBB {
    /// Returns closest point on the OBB to q
    fn min_dist(&self, q: &Point3<f32>) -> Point3<f32> {
        let d = q - self.c;
        let mut p = self.c;
        for i in 0..3 {
            let dist = clamp(d.dot(self.u[i]), -self.e[i], self.e[i]);
            p += self.u[i] * dist;
        }
        p
    }
}

impl MinDistance<Point3<f32>, f32> for OBB {
    /// Returns the squared distance between the OBB and q, zero inside.
    fn min_dist(&self, q: &Point3<f32>) -> f32 {
        let d = q - self.c;
        let mut sq_dist = 0.0;
        for i in 0..3 {
            let dist = d.dot(self.u[i]);
            let excess = if dist < -self.e[i] {
                dist + self.e[i]
            } else if dist > self.e[i] {
                dist - self.e[i]
            } else {
                0.0
            };
            sq_dist += excess * excess;
        }
        sq_dist
    }
}

impl MinDistance<Segment, f32> for AABB {
    /// Returns the squared distance between the segment and the box.
    fn min_dist(&self, seg: &Segment) -> f32 {
        let (on_box, on_seg): (Point3<f32>, Point3<f32>) = self.min_dist(seg);
        (on_box - on_seg).magnitude2()
    }
}

/// Pushes a point lying inside a box out through the face closest to it.
/// Returns the outward local normal and the distance to that face.
pub(crate) fn nearest_face(aabb: &AABB, p: Point3<f32>) -> (Vector3<f32>, f32) {
    let d = p - aabb.c;
    let mut best_axis = 0;
    let mut best_depth = f32::INFINITY;
    for axis in 0..3 {
        let depth = aabb.r[axis] - d[axis].abs();
        if depth < best_depth {
            best_depth = depth;
            best_axis = axis;
        }
    }
    let mut n = Vector3::new(0.0, 0.0, 0.0);
    n[best_axis] = if d[best_axis] < 0.0 { -1.0 } else { 1.0 };
    (n, best_depth.max(0.0))
}
