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

use cgmath::{InnerSpace, Vector3};

use crate::config::PhysicsConfig;
use crate::geom::COLLISION_EPSILON;
use crate::node::CollisionNode;

/// A type that moves a collision node over time.
pub trait PhysicsObject {
    /// Moves the node by the current velocity and advances the velocity.
    fn integrate(&mut self, node: &mut CollisionNode, dt: f32);

    /// Accumulates a force for the next integration.
    fn apply_force(&mut self, force: Vector3<f32>);

    fn velocity(&self) -> Vector3<f32>;
}

/// Linear motion under gravity, accumulated forces and ground friction. There
/// is no rotation and no velocity response to contacts.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearBody {
    pub gravity: Vector3<f32>,
    pub mass: f32,
    pub velocity: Vector3<f32>,
    /// Force accumulated since the last integration.
    pub force: Vector3<f32>,
    pub friction: f32,
}

impl LinearBody {
    pub fn new(config: &PhysicsConfig) -> Self {
        LinearBody {
            gravity: config.gravity,
            mass: config.mass,
            velocity: Vector3::new(0.0, 0.0, 0.0),
            force: Vector3::new(0.0, 0.0, 0.0),
            friction: config.friction,
        }
    }

    /// Unit vector against gravity. Without gravity, +Y.
    pub fn up(&self) -> Vector3<f32> {
        if self.gravity.magnitude2() > COLLISION_EPSILON * COLLISION_EPSILON {
            -self.gravity.normalize()
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        }
    }

    /// Damps the part of the velocity perpendicular to gravity.
    pub fn apply_friction(&mut self) {
        let up = self.up();
        let vertical = up * self.velocity.dot(up);
        let horizontal = self.velocity - vertical;
        self.velocity -= horizontal * self.friction;
    }

    /// Removes any velocity pointing into the ground.
    pub fn stop_falling(&mut self) {
        let up = self.up();
        let along = self.velocity.dot(up);
        if along < 0.0 {
            self.velocity -= up * along;
        }
    }
}

impl PhysicsObject for LinearBody {
    fn integrate(&mut self, node: &mut CollisionNode, dt: f32) {
        let inv_mass = if self.mass > COLLISION_EPSILON { 1.0 / self.mass } else { 0.0 };
        let acceleration = (self.gravity + self.force) * inv_mass;
        node.translate(self.velocity * dt);
        self.velocity += acceleration * inv_mass;
        self.force = Vector3::new(0.0, 0.0, 0.0);
    }

    fn apply_force(&mut self, force: Vector3<f32>) {
        self.force += force;
    }

    fn velocity(&self) -> Vector3<f32> {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    mod physics {
        use cgmath::{Point3, Vector3};
        use crate::config::PhysicsConfig;
        use crate::node::*;
        use crate::physics::*;
        use crate::shape::Shape;

        fn body() -> LinearBody {
            LinearBody::new(&PhysicsConfig {
                gravity: Vector3::new(0.0, -1.0, 0.0),
                mass: 2.0,
                friction: 0.5,
                ground_cosine: 0.5,
            })
        }

        #[test]
        fn test_integrate() {
            let scene = BasicSceneNode::new(Point3::new(0.0, 10.0, 0.0)).shared();
            let shared: SceneNodeRef = scene.clone();
            let mut node = CollisionNode::new(Shape::Sphere { radius: 1.0 }, &shared).unwrap();
            let mut body = body();
            body.apply_force(Vector3::new(4.0, 1.0, 0.0));

            // The first tick moves by the initial velocity, which is zero.
            body.integrate(&mut node, 1.0);
            assert_relative_eq!(scene.borrow().position, Point3::new(0.0, 10.0, 0.0), epsilon = 1e-6);
            // (gravity + force) / mass, divided by the mass once more.
            assert_relative_eq!(body.velocity, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
            assert_relative_eq!(body.force, Vector3::new(0.0, 0.0, 0.0), epsilon = 1e-6);

            body.integrate(&mut node, 0.5);
            assert_relative_eq!(scene.borrow().position, Point3::new(0.5, 10.0, 0.0), epsilon = 1e-6);
            assert_relative_eq!(body.velocity, Vector3::new(1.0, -0.25, 0.0), epsilon = 1e-6);
        }

        #[test]
        fn test_friction_keeps_vertical_velocity() {
            let mut body = body();
            body.velocity = Vector3::new(2.0, -3.0, 4.0);
            body.apply_friction();
            assert_relative_eq!(body.velocity, Vector3::new(1.0, -3.0, 2.0), epsilon = 1e-6);
            body.stop_falling();
            assert_relative_eq!(body.velocity, Vector3::new(1.0, 0.0, 2.0), epsilon = 1e-6);
        }

        #[test]
        fn test_weightless_up() {
            let mut body = body();
            body.gravity = Vector3::new(0.0, 0.0, 0.0);
            assert_relative_eq!(body.up(), Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        }
    }
}
