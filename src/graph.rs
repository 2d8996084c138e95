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

use std::cmp::Ordering;
use std::vec::Vec;

use cgmath::{InnerSpace, Point3};
use log::{error, trace};

use crate::config::GraphConfig;
use crate::collision::excludes_corners;
use crate::contact::*;
use crate::error::CollisionError;
use crate::geom::*;
use crate::material::*;
use crate::mesh::{MeshShape, TriangleSource};
use crate::node::*;
use crate::pool::Pool;
use crate::shape::*;

/// Decides whether a node takes part in an intersection query.
pub type IntersectionCriteria<'a> = &'a dyn Fn(&CollisionNode) -> bool;

/// Owns every collision node and material of a scene.
///
/// Nodes and materials are referred to by handles. Deleting an object makes
/// its handles stale; using a stale handle is reported as an error and never
/// touches a newer object that reuses the slot.
pub struct CollisionGraph {
    config: GraphConfig,
    nodes: Pool<CollisionNode>,
    node_order: Vec<NodeHandle>,
    materials: Pool<CollisionMaterial>,
}

impl Default for CollisionGraph {
    fn default() -> Self {
        CollisionGraph::new()
    }
}

impl CollisionGraph {
    pub fn new() -> Self {
        CollisionGraph::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        CollisionGraph {
            config,
            nodes: Pool::new(),
            node_order: Vec::new(),
            materials: Pool::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GraphConfig {
        &mut self.config
    }

    pub fn create_material(&mut self) -> MaterialHandle {
        self.materials.push(CollisionMaterial::new())
    }

    pub fn material(&self, material: MaterialHandle) -> Option<&CollisionMaterial> {
        self.materials.get(material)
    }

    pub fn material_mut(&mut self, material: MaterialHandle) -> Option<&mut CollisionMaterial> {
        self.materials.get_mut(material)
    }

    /// Makes nodes of `material` collide with nodes of `rival`.
    pub fn add_rival_material(
        &mut self,
        material: MaterialHandle,
        rival: MaterialHandle
    ) -> Result<(), CollisionError> {
        if !self.materials.contains(rival) {
            return Err(CollisionError::StaleHandle);
        }
        self.materials
            .get_mut(material)
            .ok_or(CollisionError::StaleHandle)?
            .add_rival_material(rival);
        Ok(())
    }

    pub fn node(&self, node: NodeHandle) -> Option<&CollisionNode> {
        self.nodes.get(node)
    }

    pub fn node_mut(&mut self, node: NodeHandle) -> Option<&mut CollisionNode> {
        self.nodes.get_mut(node)
    }

    /// All nodes in the order they were created.
    pub fn nodes<'a>(&'a self) -> impl Iterator<Item = (NodeHandle, &'a CollisionNode)> + 'a {
        let nodes = &self.nodes;
        self.node_order.iter().filter_map(move |&h| nodes.get(h).map(|n| (h, n)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn create_sphere(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        radius: f32
    ) -> Option<NodeHandle> {
        self.add_node(material, Shape::Sphere { radius }, &scene)
    }

    /// A capsule whose axis runs from the scene node's origin up its local Y
    /// axis by `height`.
    pub fn create_capsule(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        radius: f32,
        height: f32
    ) -> Option<NodeHandle> {
        self.add_node(material, Shape::Capsule(LineShape { radius, height }), &scene)
    }

    pub fn create_cylinder(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        radius: f32,
        height: f32
    ) -> Option<NodeHandle> {
        self.add_node(material, Shape::Cylinder(LineShape { radius, height }), &scene)
    }

    pub fn create_cone(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        radius: f32,
        height: f32
    ) -> Option<NodeHandle> {
        self.add_node(material, Shape::Cone(LineShape { radius, height }), &scene)
    }

    pub fn create_box(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        aabb: AABB
    ) -> Option<NodeHandle> {
        self.add_node(material, Shape::Box(aabb), &scene)
    }

    pub fn create_plane(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        plane: Plane
    ) -> Option<NodeHandle> {
        self.add_node(material, Shape::Plane(plane), &scene)
    }

    /// Builds a KD tree over the triangles using the graph's configuration.
    pub fn create_mesh(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        source: &dyn TriangleSource
    ) -> Option<NodeHandle> {
        self.create_mesh_list(material, scene, &[source])
    }

    /// Builds one KD tree over several triangle sources. Face ids record the
    /// index of the source each triangle came from.
    pub fn create_mesh_list(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        sources: &[&dyn TriangleSource]
    ) -> Option<NodeHandle> {
        let config = self.config;
        match MeshShape::new(sources, config.kd_tree_level, config.kd_tree_concept, config.face_mode) {
            Ok(mesh) => self.add_node(material, Shape::Mesh(mesh), &scene),
            Err(e) => {
                error!("could not create collision mesh: {}", e);
                None
            },
        }
    }

    /// A mesh sharing the KD tree of an existing mesh node.
    pub fn create_mesh_instance(
        &mut self,
        material: Option<MaterialHandle>,
        scene: SceneNodeRef,
        instance_of: NodeHandle
    ) -> Option<NodeHandle> {
        let mesh = match self.nodes.get(instance_of).map(|n| n.shape()) {
            Some(&Shape::Mesh(ref mesh)) => mesh.instance(mesh.face_mode),
            Some(shape) => {
                error!("could not instance {:?} node {:?}: not a mesh", shape.kind(), instance_of);
                return None;
            },
            None => {
                error!("could not instance mesh node {:?}: {}", instance_of, CollisionError::StaleHandle);
                return None;
            },
        };
        self.add_node(material, Shape::Mesh(mesh), &scene)
    }

    fn add_node(
        &mut self,
        material: Option<MaterialHandle>,
        shape: Shape,
        scene: &SceneNodeRef
    ) -> Option<NodeHandle> {
        let kind = shape.kind();
        if let Some(m) = material {
            if !self.materials.contains(m) {
                error!("could not create {:?} node: material {:?}: {}", kind, m, CollisionError::StaleHandle);
                return None;
            }
        }
        let mut node = match CollisionNode::new(shape, scene) {
            Ok(node) => node,
            Err(e) => {
                error!("could not create {:?} node: {}", kind, e);
                return None;
            },
        };
        node.set_material(material);
        let handle = self.nodes.push(node);
        self.node_order.push(handle);
        if let Some(m) = material.and_then(|m| self.materials.get_mut(m)) {
            m.add_node(handle);
        }
        Some(handle)
    }

    /// Moves a node to another material, or out of any material.
    pub fn set_node_material(
        &mut self,
        node: NodeHandle,
        material: Option<MaterialHandle>
    ) -> Result<(), CollisionError> {
        if let Some(m) = material {
            if !self.materials.contains(m) {
                return Err(CollisionError::StaleHandle);
            }
        }
        let n = self.nodes.get_mut(node).ok_or(CollisionError::StaleHandle)?;
        let old = n.material();
        n.set_material(material);
        if let Some(old) = old.and_then(|m| self.materials.get_mut(m)) {
            old.remove_node(node);
        }
        if let Some(new) = material.and_then(|m| self.materials.get_mut(m)) {
            new.add_node(node);
        }
        Ok(())
    }

    /// Removes a node from the graph and from its material. A mesh node's KD
    /// tree is dropped once no instance refers to it.
    pub fn delete_node(&mut self, node: NodeHandle) -> Result<(), CollisionError> {
        let n = self.nodes.remove(node).ok_or(CollisionError::StaleHandle)?;
        if let Some(m) = n.material().and_then(|m| self.materials.get_mut(m)) {
            m.remove_node(node);
        }
        self.node_order.retain(|&h| h != node);
        Ok(())
    }

    /// Removes a material. Its nodes stay in the graph without a material and
    /// other materials stop listing it as a rival.
    pub fn delete_material(&mut self, material: MaterialHandle) -> Result<(), CollisionError> {
        let m = self.materials.remove(material).ok_or(CollisionError::StaleHandle)?;
        for &node in m.nodes() {
            if let Some(n) = self.nodes.get_mut(node) {
                n.set_material(None);
            }
        }
        for (_, other) in self.materials.iter_mut() {
            other.remove_rival_material(material);
        }
        Ok(())
    }

    /// Deletes all nodes, all materials, or both.
    pub fn clear_scene(&mut self, delete_nodes: bool, delete_materials: bool) {
        if delete_nodes {
            self.nodes.clear();
            self.node_order.clear();
            for (_, m) in self.materials.iter_mut() {
                m.clear_nodes();
            }
        }
        if delete_materials {
            self.materials.clear();
            for (_, n) in self.nodes.iter_mut() {
                n.set_material(None);
            }
        }
    }

    /// Re-reads every node's transform from its scene node.
    pub fn update_transformations(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.update_transformation();
        }
    }

    /// Resolves every moving node against its rivals, in creation order.
    /// Returns every contact found, resolved or not. Nodes owned by character
    /// controllers are left to their controller.
    pub fn update_scene(&mut self) -> Vec<ResolvedContact> {
        self.update_transformations();
        let mut contacts = Vec::new();
        for node in self.node_order.clone() {
            if self.nodes.get(node).map_or(true, |n| n.is_controlled()) {
                continue;
            }
            self.update_node_inner(node, &mut |_| true, &mut contacts);
        }
        contacts
    }

    /// Resolves a single node.
    pub fn update_node(&mut self, node: NodeHandle) -> Result<Vec<ResolvedContact>, CollisionError> {
        self.update_node_with(node, &mut |_| true)
    }

    /// Resolves a single node. The handler sees every contact after the
    /// material's callback and can veto it the same way.
    pub fn update_node_with(
        &mut self,
        node: NodeHandle,
        handler: &mut dyn FnMut(&ContactEvent) -> bool
    ) -> Result<Vec<ResolvedContact>, CollisionError> {
        if !self.nodes.contains(node) {
            return Err(CollisionError::StaleHandle);
        }
        self.update_transformations();
        let mut contacts = Vec::new();
        self.update_node_inner(node, handler, &mut contacts);
        Ok(contacts)
    }

    fn update_node_inner(
        &mut self,
        handle: NodeHandle,
        handler: &mut dyn FnMut(&ContactEvent) -> bool,
        contacts: &mut Vec<ResolvedContact>
    ) {
        let (material, movement, max_step) = match self.nodes.get(handle) {
            Some(node) => {
                let material = match node.material() {
                    Some(m) if self.materials.contains(m) => m,
                    _ => return,
                };
                if !node.flags().contains(CollisionFlags::DETECTION) || node.support().is_empty() {
                    return;
                }
                let movement = node.position() - node.prev_position();
                if movement.magnitude2() <= COLLISION_EPSILON
                    && !node.flags().contains(CollisionFlags::PERMANENT_UPDATE)
                {
                    return;
                }
                (material, movement, node.max_movement())
            },
            None => return,
        };

        if max_step > COLLISION_EPSILON && movement.magnitude2() > max_step * max_step {
            let distance = movement.magnitude();
            let direction = movement / distance;
            if let Some(node) = self.nodes.get_mut(handle) {
                let prev = node.prev_position();
                node.set_position(prev, false);
            }
            let mut moved = 0.0;
            let mut steps = 0;
            while moved < distance {
                let step = max_step.min(distance - moved);
                if let Some(node) = self.nodes.get_mut(handle) {
                    node.translate(direction * step);
                }
                moved += step;
                steps += 1;
                self.resolve(handle, material, handler, contacts);
            }
            trace!("node {:?} moved {} in {} steps", handle, distance, steps);
        } else {
            self.resolve(handle, material, handler, contacts);
        }

        if let Some(node) = self.nodes.get_mut(handle) {
            node.update_prev_position();
        }
    }

    /// Tests the node against every node of every rival material and pushes it
    /// out of each accepted contact in turn.
    fn resolve(
        &mut self,
        handle: NodeHandle,
        material: MaterialHandle,
        handler: &mut dyn FnMut(&ContactEvent) -> bool,
        contacts: &mut Vec<ResolvedContact>
    ) {
        let rivals = match self.materials.get(material) {
            Some(m) => m.rival_materials().to_vec(),
            None => return,
        };
        for rival_material in rivals {
            let rival_nodes = match self.materials.get(rival_material) {
                Some(m) => m.nodes().to_vec(),
                None => continue,
            };
            for rival in rival_nodes {
                if rival == handle {
                    continue;
                }
                let contact = match (self.nodes.get(handle), self.nodes.get(rival)) {
                    (Some(node), Some(other)) if node.support().contains(other.kind().support_flag()) => {
                        node.check_collision(other)
                    },
                    _ => None,
                };
                let contact = match contact {
                    Some(contact) => contact,
                    None => continue,
                };

                let accepted = self.dispatch_contact(material, handle, rival, &contact, handler);
                let node = match self.nodes.get_mut(handle) {
                    Some(node) => node,
                    None => return,
                };
                let resolved = accepted && node.flags().contains(CollisionFlags::RESOLVE);
                if resolved {
                    node.translate(contact.normal * (contact.impact + ROUNDING_ERROR));
                }
                contacts.push(ResolvedContact { node: handle, rival, contact, resolved });
            }
        }
    }

    /// Runs the material callback and the handler. Both always see the
    /// contact; either can veto it.
    fn dispatch_contact(
        &mut self,
        material: MaterialHandle,
        node: NodeHandle,
        rival: NodeHandle,
        contact: &CollisionContact,
        handler: &mut dyn FnMut(&ContactEvent) -> bool
    ) -> bool {
        let event = ContactEvent { material, node, rival, contact };
        let mut accepted = true;
        if let Some(mut callback) = self.materials.get_mut(material).and_then(|m| m.take_callback()) {
            accepted = callback(&event);
            if let Some(m) = self.materials.get_mut(material) {
                m.restore_callback(callback);
            }
        }
        handler(&event) && accepted
    }

    fn queried_nodes<'a>(
        &'a self,
        criteria: Option<IntersectionCriteria<'a>>
    ) -> impl Iterator<Item = (NodeHandle, &'a CollisionNode)> + 'a {
        self.nodes().filter(move |&(_, node)| {
            node.flags().contains(CollisionFlags::INTERSECTION)
                && criteria.map_or(true, |accept| accept(node))
        })
    }

    /// True if the segment hits any node. With `exclude_corners`, hits at the
    /// segment's very ends do not count.
    pub fn check_intersection(
        &self,
        seg: &Segment,
        exclude_corners: bool,
        criteria: Option<IntersectionCriteria>
    ) -> bool {
        self.queried_nodes(criteria).any(|(_, node)| {
            node.line_hits(seg)
                .iter()
                .any(|hit| !exclude_corners || excludes_corners(seg, hit.point))
        })
    }

    /// Every hit of the segment, nearest to the segment's start first. Ties
    /// keep node creation order. A bidirectional query also reports surfaces
    /// only visible from the segment's end.
    pub fn find_intersections(
        &self,
        seg: &Segment,
        bidirectional: bool,
        criteria: Option<IntersectionCriteria>
    ) -> Vec<IntersectionContact> {
        let mut found = Vec::new();
        for (handle, node) in self.queried_nodes(criteria) {
            for hit in node.line_hits(seg) {
                found.push(IntersectionContact::new(handle, seg.a, hit));
            }
        }
        if bidirectional {
            let reversed = seg.reversed();
            let mut back = Vec::new();
            for (handle, node) in self.queried_nodes(criteria) {
                for hit in node.line_hits(&reversed) {
                    let duplicate = found.iter().any(|f: &IntersectionContact| {
                        f.node == handle
                            && (f.point - hit.point).magnitude2() <= ROUNDING_ERROR * ROUNDING_ERROR
                    });
                    if !duplicate {
                        back.push(IntersectionContact::new(handle, seg.a, hit));
                    }
                }
            }
            found.extend(back);
        }
        found.sort_by(|a, b| {
            a.distance_sq
                .partial_cmp(&b.distance_sq)
                .unwrap_or(Ordering::Equal)
        });
        found
    }

    /// Moves a node without it being resolved along the way.
    pub fn set_node_position(
        &mut self,
        node: NodeHandle,
        position: Point3<f32>
    ) -> Result<(), CollisionError> {
        let node = self.nodes.get_mut(node).ok_or(CollisionError::StaleHandle)?;
        node.set_position(position, true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    mod graph {
        use std::cell::{Cell, RefCell};
        use std::rc::Rc;

        use cgmath::{Matrix3, Point3, Rad, Vector3};
        use crate::error::CollisionError;
        use crate::geom::*;
        use crate::graph::*;
        use crate::mesh::{FaceMode, Mesh, Surface};

        fn scene(x: f32, y: f32, z: f32) -> Rc<RefCell<BasicSceneNode>> {
            BasicSceneNode::new(Point3::new(x, y, z)).shared()
        }

        fn up_plane() -> Plane {
            Plane { n: Vector3::new(0.0, 1.0, 0.0), d: 0.0 }
        }

        /// A graph where `dynamic` nodes are resolved against `world` nodes.
        fn rivals() -> (CollisionGraph, MaterialHandle, MaterialHandle) {
            let mut graph = CollisionGraph::new();
            let dynamic = graph.create_material();
            let world = graph.create_material();
            graph.add_rival_material(dynamic, world).unwrap();
            (graph, dynamic, world)
        }

        fn floor_mesh() -> Mesh {
            let mut surface = Surface::new();
            let a = surface.push_vert(Point3::new(-2.0, 0.0, -2.0));
            let b = surface.push_vert(Point3::new(-2.0, 0.0, 2.0));
            let c = surface.push_vert(Point3::new(2.0, 0.0, 2.0));
            let d = surface.push_vert(Point3::new(2.0, 0.0, -2.0));
            surface.push_face((a, b, c));
            surface.push_face((a, c, d));
            let mut mesh = Mesh::new();
            mesh.push_surface(surface);
            mesh
        }

        #[test]
        fn test_sphere_rests_on_plane() {
            let (mut graph, dynamic, world) = rivals();
            let ground = scene(0.0, 0.0, 0.0);
            graph.create_plane(Some(world), ground.clone(), up_plane()).unwrap();
            let ball = scene(0.0, 0.0, 0.0);
            let sphere = graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();

            ball.borrow_mut().position = Point3::new(0.0, 0.3, 0.0);
            let contacts = graph.update_scene();
            assert_eq!(contacts.len(), 1);
            assert!(contacts[0].resolved);
            assert_eq!(contacts[0].node, sphere);
            assert_relative_eq!(contacts[0].contact.impact, 0.2, epsilon = 1e-5);
            assert_relative_eq!(contacts[0].contact.normal, Vector3::new(0.0, 1.0, 0.0), epsilon = COLLISION_EPSILON);
            assert_relative_eq!(ball.borrow().position.y, 0.5, epsilon = 1e-4);

            // Resolving again is a no-op.
            assert!(graph.update_scene().is_empty());
            assert_relative_eq!(ball.borrow().position.y, 0.5, epsilon = 1e-4);
        }

        #[test]
        fn test_parallel_capsules_separate() {
            let (mut graph, dynamic, world) = rivals();
            let still = scene(0.0, 0.0, 0.0);
            graph.create_capsule(Some(world), still.clone(), 0.5, 2.0).unwrap();
            let moving = scene(0.8, 0.0, 0.0);
            graph.create_capsule(Some(dynamic), moving.clone(), 0.5, 2.0).unwrap();

            let contacts = graph.update_scene();
            assert_eq!(contacts.len(), 1);
            assert_relative_eq!(moving.borrow().position, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-4);
            assert_relative_eq!(still.borrow().position, Point3::new(0.0, 0.0, 0.0), epsilon = COLLISION_EPSILON);
        }

        #[test]
        fn test_fast_sphere_does_not_tunnel() {
            let (mut graph, dynamic, world) = rivals();
            let wall = Plane { n: Vector3::new(-1.0, 0.0, 0.0), d: 0.0 };
            let wall_node = scene(0.0, 0.0, 0.0);
            graph.create_plane(Some(world), wall_node.clone(), wall).unwrap();
            let ball = scene(-1.0, 0.0, 0.0);
            graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();

            // Ten radii in one frame, straight through the wall.
            ball.borrow_mut().position = Point3::new(4.0, 0.0, 0.0);
            let contacts = graph.update_scene();
            assert!(!contacts.is_empty());
            assert_relative_eq!(ball.borrow().position.x, -0.5, epsilon = 1e-3);
        }

        #[test]
        fn test_rivalry_is_directed() {
            let (mut graph, dynamic, world) = rivals();
            let a = scene(0.0, 0.0, 0.0);
            let b = scene(0.5, 0.0, 0.0);
            graph.create_sphere(Some(world), a.clone(), 0.5).unwrap();
            graph.create_sphere(Some(dynamic), b.clone(), 0.5).unwrap();
            graph.update_scene();
            // Only the dynamic sphere moves.
            assert_relative_eq!(a.borrow().position, Point3::new(0.0, 0.0, 0.0), epsilon = COLLISION_EPSILON);
            assert_relative_eq!(b.borrow().position, Point3::new(1.0, 0.0, 0.0), epsilon = 1e-4);
        }

        #[test]
        fn test_callback_vetoes_resolution() {
            let (mut graph, dynamic, world) = rivals();
            let seen = Rc::new(Cell::new(0));
            let counter = seen.clone();
            graph.material_mut(dynamic).unwrap().set_contact_callback(move |event| {
                counter.set(counter.get() + 1);
                assert!(event.contact.impact > 0.0);
                false
            });
            graph.create_plane(Some(world), scene(0.0, 0.0, 0.0), up_plane()).unwrap();
            let ball = scene(0.0, 0.3, 0.0);
            graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();

            let contacts = graph.update_scene();
            assert_eq!(seen.get(), 1);
            assert_eq!(contacts.len(), 1);
            assert!(!contacts[0].resolved);
            assert_relative_eq!(ball.borrow().position.y, 0.3, epsilon = COLLISION_EPSILON);
            assert!(graph.material(dynamic).unwrap().has_contact_callback());
        }

        #[test]
        fn test_handler_vetoes_resolution() {
            let (mut graph, dynamic, world) = rivals();
            graph.create_plane(Some(world), scene(0.0, 0.0, 0.0), up_plane()).unwrap();
            let ball = scene(0.0, 0.3, 0.0);
            let sphere = graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();

            let mut rivals_seen = Vec::new();
            let contacts = graph
                .update_node_with(sphere, &mut |event| {
                    rivals_seen.push(event.rival);
                    false
                })
                .unwrap();
            assert_eq!(rivals_seen.len(), 1);
            assert!(!contacts[0].resolved);
            assert_relative_eq!(ball.borrow().position.y, 0.3, epsilon = COLLISION_EPSILON);
        }

        #[test]
        fn test_detection_only() {
            let (mut graph, dynamic, world) = rivals();
            graph.create_plane(Some(world), scene(0.0, 0.0, 0.0), up_plane()).unwrap();
            let ball = scene(0.0, 0.3, 0.0);
            let sphere = graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();
            graph.node_mut(sphere).unwrap().set_flags(CollisionFlags::DETECTION | CollisionFlags::PERMANENT_UPDATE);

            let contacts = graph.update_scene();
            assert_eq!(contacts.len(), 1);
            assert!(!contacts[0].resolved);
            assert_relative_eq!(ball.borrow().position.y, 0.3, epsilon = COLLISION_EPSILON);
        }

        #[test]
        fn test_factory_failures() {
            let mut graph = CollisionGraph::new();
            assert!(graph.create_sphere(None, scene(0.0, 0.0, 0.0), 0.0).is_none());
            assert!(graph.create_capsule(None, scene(0.0, 0.0, 0.0), 0.5, -1.0).is_none());
            assert!(graph.create_mesh(None, scene(0.0, 0.0, 0.0), &Mesh::new()).is_none());

            let material = graph.create_material();
            graph.delete_material(material).unwrap();
            assert!(graph.create_sphere(Some(material), scene(0.0, 0.0, 0.0), 1.0).is_none());
            assert_eq!(graph.node_count(), 0);
        }

        #[test]
        fn test_stale_handles() {
            let mut graph = CollisionGraph::new();
            let material = graph.create_material();
            let a = graph.create_sphere(Some(material), scene(0.0, 0.0, 0.0), 1.0).unwrap();
            graph.delete_node(a).unwrap();
            assert!(graph.node(a).is_none());
            assert_eq!(graph.delete_node(a), Err(CollisionError::StaleHandle));
            assert!(graph.material(material).unwrap().nodes().is_empty());

            // The slot is reused but the old handle stays dead.
            let b = graph.create_sphere(Some(material), scene(0.0, 0.0, 0.0), 1.0).unwrap();
            assert_eq!(a.index(), b.index());
            assert!(graph.node(a).is_none());
            assert!(graph.node(b).is_some());
            assert_eq!(graph.update_node(a).unwrap_err(), CollisionError::StaleHandle);
            assert_eq!(graph.set_node_material(a, None), Err(CollisionError::StaleHandle));
        }

        #[test]
        fn test_delete_material() {
            let (mut graph, dynamic, world) = rivals();
            let node = graph.create_sphere(Some(world), scene(0.0, 0.0, 0.0), 1.0).unwrap();
            graph.delete_material(world).unwrap();
            assert_eq!(graph.node(node).unwrap().material(), None);
            assert!(graph.material(dynamic).unwrap().rival_materials().is_empty());
            assert_eq!(graph.delete_material(world), Err(CollisionError::StaleHandle));
        }

        #[test]
        fn test_set_node_material() {
            let (mut graph, dynamic, world) = rivals();
            let node = graph.create_sphere(Some(world), scene(0.0, 0.0, 0.0), 1.0).unwrap();
            graph.set_node_material(node, Some(dynamic)).unwrap();
            assert!(graph.material(world).unwrap().nodes().is_empty());
            assert_eq!(graph.material(dynamic).unwrap().nodes(), &[node]);
            assert_eq!(graph.node(node).unwrap().material(), Some(dynamic));
        }

        #[test]
        fn test_clear_scene() {
            let (mut graph, dynamic, _) = rivals();
            graph.create_sphere(Some(dynamic), scene(0.0, 0.0, 0.0), 1.0).unwrap();
            graph.clear_scene(true, false);
            assert_eq!(graph.node_count(), 0);
            assert!(graph.material(dynamic).unwrap().nodes().is_empty());

            let node = graph.create_sphere(Some(dynamic), scene(0.0, 0.0, 0.0), 1.0).unwrap();
            graph.clear_scene(false, true);
            assert!(graph.material(dynamic).is_none());
            assert_eq!(graph.node(node).unwrap().material(), None);
        }

        #[test]
        fn test_find_intersections_sorted() {
            let mut graph = CollisionGraph::new();
            let unit_box = AABB { c: Point3::new(0.0, 0.0, 0.0), r: Vector3::new(1.0, 1.0, 1.0) };
            let far_box = graph.create_box(None, scene(10.0, 0.0, 0.0), unit_box).unwrap();
            let near_sphere = graph.create_sphere(None, scene(5.0, 0.0, 0.0), 1.0).unwrap();
            let cone = graph.create_cone(None, scene(2.0, -1.0, 0.0), 1.0, 2.0).unwrap();

            let seg = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(20.0, 0.0, 0.0));
            let hits = graph.find_intersections(&seg, false, None);
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].node, near_sphere);
            assert_relative_eq!(hits[0].point, Point3::new(4.0, 0.0, 0.0), epsilon = 1e-4);
            assert_relative_eq!(hits[0].distance_sq, 16.0, epsilon = 1e-3);
            assert_relative_eq!(hits[0].normal, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-4);
            assert_eq!(hits[1].node, far_box);
            assert_relative_eq!(hits[1].point, Point3::new(9.0, 0.0, 0.0), epsilon = 1e-4);
            assert!(hits.iter().all(|h| h.node != cone));

            let no_spheres = |n: &CollisionNode| n.kind() != ShapeKind::Sphere;
            let hits = graph.find_intersections(&seg, false, Some(&no_spheres));
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].node, far_box);

            // Nodes without the intersection flag are invisible to queries.
            graph.node_mut(far_box).unwrap().set_flags(CollisionFlags::RESOLVE);
            assert_eq!(graph.find_intersections(&seg, false, None).len(), 1);
        }

        #[test]
        fn test_check_intersection_corners() {
            let mut graph = CollisionGraph::new();
            graph.create_sphere(None, scene(5.0, 0.0, 0.0), 1.0).unwrap();
            let touching = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 0.0, 0.0));
            assert!(graph.check_intersection(&touching, false, None));
            assert!(!graph.check_intersection(&touching, true, None));
            let through = Segment::new(Point3::new(0.0, 0.0, 0.0), Point3::new(8.0, 0.0, 0.0));
            assert!(graph.check_intersection(&through, true, None));
            let miss = Segment::new(Point3::new(0.0, 3.0, 0.0), Point3::new(8.0, 3.0, 0.0));
            assert!(!graph.check_intersection(&miss, false, None));
        }

        #[test]
        fn test_bidirectional_mesh_query() {
            let mut graph = CollisionGraph::new();
            let floor = graph.create_mesh(None, scene(0.0, 0.0, 0.0), &floor_mesh()).unwrap();
            // From below a front facing floor is invisible.
            let up = Segment::new(Point3::new(1.0, -1.0, -0.5), Point3::new(1.0, 3.0, -0.5));
            assert!(graph.find_intersections(&up, false, None).is_empty());

            let hits = graph.find_intersections(&up, true, None);
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].node, floor);
            assert!(hits[0].face.is_some());
            assert_relative_eq!(hits[0].distance_sq, 1.0, epsilon = 1e-4);
            assert_relative_eq!(hits[0].normal, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
        }

        #[test]
        fn test_sphere_on_mesh() {
            let (mut graph, dynamic, world) = rivals();
            let floor = graph.create_mesh(Some(world), scene(0.0, 0.0, 0.0), &floor_mesh()).unwrap();
            let copy = graph.create_mesh_instance(Some(world), scene(10.0, 0.0, 0.0), floor).unwrap();
            match (graph.node(floor).unwrap().shape(), graph.node(copy).unwrap().shape()) {
                (&Shape::Mesh(ref a), &Shape::Mesh(ref b)) => {
                    assert!(Rc::ptr_eq(&a.tree, &b.tree));
                    assert_eq!(b.face_mode, FaceMode::Front);
                },
                _ => panic!("expected two meshes"),
            }

            let ball = scene(10.5, 0.25, -0.5);
            graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();
            let contacts = graph.update_scene();
            assert_eq!(contacts.len(), 1);
            assert_eq!(contacts[0].rival, copy);
            assert!(contacts[0].contact.face.is_some());
            assert_relative_eq!(ball.borrow().position.y, 0.5, epsilon = 1e-4);
        }

        #[test]
        fn test_box_falls_onto_plane() {
            let (mut graph, dynamic, world) = rivals();
            graph.create_plane(Some(world), scene(0.0, 0.0, 0.0), up_plane()).unwrap();
            let crate_node = scene(0.0, 0.8, 0.0);
            let half = AABB { c: Point3::new(0.0, 0.0, 0.0), r: Vector3::new(1.0, 1.0, 1.0) };
            graph.create_box(Some(dynamic), crate_node.clone(), half).unwrap();
            graph.update_scene();
            assert_relative_eq!(crate_node.borrow().position.y, 1.0, epsilon = 1e-4);
        }

        #[test]
        fn test_tilted_capsule_stays_out_of_box() {
            let (mut graph, dynamic, world) = rivals();
            let unit_box = AABB { c: Point3::new(0.0, 0.0, 0.0), r: Vector3::new(1.0, 1.0, 1.0) };
            graph.create_box(Some(world), scene(0.0, 0.0, 0.0), unit_box).unwrap();
            let mut tilted = BasicSceneNode::new(Point3::new(-0.5, -1.5, 0.3));
            tilted.rotation = Matrix3::from_angle_z(Rad(-0.6));
            let body = tilted.shared();
            graph.create_capsule(Some(dynamic), body.clone(), 0.3, 3.0).unwrap();

            let contacts = graph.update_scene();
            assert_eq!(contacts.len(), 1);
            assert!(contacts[0].resolved);
            assert!(graph.update_scene().is_empty());
            assert_relative_eq!(body.borrow().position.z, 1.3, epsilon = 1e-4);
        }

        #[test]
        fn test_unsupported_rivals_are_ignored() {
            let (mut graph, dynamic, world) = rivals();
            graph.create_cone(Some(world), scene(0.0, 0.0, 0.0), 1.0, 2.0).unwrap();
            let ball = scene(0.5, 0.5, 0.0);
            graph.create_sphere(Some(dynamic), ball.clone(), 0.5).unwrap();
            assert!(graph.update_scene().is_empty());
            assert_relative_eq!(ball.borrow().position, Point3::new(0.5, 0.5, 0.0), epsilon = COLLISION_EPSILON);
        }
    }
}
