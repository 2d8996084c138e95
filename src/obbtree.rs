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

use std::mem;
use std::vec::Vec;

use cgmath::Point3;
use smallvec::SmallVec;

use crate::collision::{Contains, Overlaps};
use crate::error::CollisionError;
use crate::geom::*;
use crate::pool::{Handle, Pool};

pub type ObbHandle<V> = Handle<ObbNode<V>>;

/// A node of an `ObbTree`. Every node's box lies inside its parent's box.
pub struct ObbNode<V> {
    bounds: OBB,
    parent: Option<ObbHandle<V>>,
    children: Vec<ObbHandle<V>>,
    payload: Option<V>,
}

/// A containment hierarchy of oriented boxes for objects that move.
///
/// Unlike the KD tree a node may have any number of children. A box is
/// stored below the deepest node that fully contains it and adopts the
/// nodes it fully contains itself. The root is a huge box without payload.
pub struct ObbTree<V> {
    root: ObbHandle<V>,
    pool: Pool<ObbNode<V>>,
}

impl<V> Default for ObbTree<V> {
    fn default() -> Self {
        ObbTree::new()
    }
}

impl<V> ObbTree<V> {
    pub fn new() -> Self {
        let mut pool = Pool::new();
        let root = pool.push(ObbNode {
            bounds: OBB::huge(),
            parent: None,
            children: Vec::new(),
            payload: None,
        });
        ObbTree { root, pool }
    }

    pub fn root(&self) -> ObbHandle<V> {
        self.root
    }

    /// Number of inserted boxes, not counting the root.
    pub fn len(&self) -> usize {
        self.pool.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ObbHandle<V>) -> Option<&V> {
        self.pool.get(id).and_then(|n| n.payload.as_ref())
    }

    pub fn get_mut(&mut self, id: ObbHandle<V>) -> Option<&mut V> {
        self.pool.get_mut(id).and_then(|n| n.payload.as_mut())
    }

    pub fn bounds(&self, id: ObbHandle<V>) -> Option<&OBB> {
        self.pool.get(id).map(|n| &n.bounds)
    }

    pub fn parent(&self, id: ObbHandle<V>) -> Option<ObbHandle<V>> {
        self.pool.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ObbHandle<V>) -> &[ObbHandle<V>] {
        self.pool.get(id).map_or(&[][..], |n| n.children.as_slice())
    }

    /// Inserts a box and returns its id. Ids stay valid until removed.
    pub fn insert(&mut self, bounds: OBB, payload: V) -> ObbHandle<V> {
        let id = self.pool.push(ObbNode {
            bounds,
            parent: None,
            children: Vec::new(),
            payload: Some(payload),
        });
        let root = self.root;
        self.attach(id, root);
        id
    }

    /// Changes a node's box. A node that no longer fits inside its parent
    /// moves up to the closest ancestor that holds it and sinks down from
    /// there. Children that no longer fit inside the node move the same way.
    pub fn update(&mut self, id: ObbHandle<V>, bounds: OBB) -> Result<(), CollisionError> {
        if id == self.root || !self.pool.contains(id) {
            return Err(CollisionError::StaleHandle);
        }
        self.pool[id].bounds = bounds;
        if let Some(parent) = self.pool[id].parent {
            if !self.pool[parent].bounds.contains(&bounds) {
                self.reparent(id, parent);
            }
        }
        let escaped: Vec<ObbHandle<V>> = self.pool[id]
            .children
            .iter()
            .cloned()
            .filter(|&c| !bounds.contains(&self.pool[c].bounds))
            .collect();
        for child in escaped {
            self.reparent(child, id);
        }
        Ok(())
    }

    /// Removes a node and returns its payload. Its children move to its
    /// parent.
    pub fn remove(&mut self, id: ObbHandle<V>) -> Option<V> {
        if id == self.root {
            return None;
        }
        let node = self.pool.remove(id)?;
        let parent = node.parent.unwrap_or(self.root);
        self.pool[parent].children.retain(|&c| c != id);
        for &child in &node.children {
            self.pool[child].parent = Some(parent);
        }
        self.pool[parent].children.extend(node.children);
        node.payload
    }

    /// The deepest node whose box contains the point. The root if no other
    /// box does.
    pub fn find_leaf(&self, p: Point3<f32>) -> ObbHandle<V> {
        let mut node = self.root;
        'descend: loop {
            for &child in &self.pool[node].children {
                if self.pool[child].bounds.contains(&p) {
                    node = child;
                    continue 'descend;
                }
            }
            return node;
        }
    }

    /// Nodes whose boxes lie within radius of the point.
    pub fn find_leaf_list_sphere(&self, p: Point3<f32>, radius: f32) -> Vec<ObbHandle<V>> {
        let r2 = radius * radius;
        self.collect(|b| {
            let d: f32 = b.min_dist(&p);
            d <= r2
        })
    }

    /// Nodes whose boxes the segment passes through.
    pub fn find_leaf_list_segment(&self, seg: &Segment) -> Vec<ObbHandle<V>> {
        self.collect(|b| seg.overlaps(b))
    }

    /// Nodes whose boxes overlap the box around the segment swept by the
    /// radius.
    pub fn find_leaf_list_capsule(&self, seg: &Segment, radius: f32) -> Vec<ObbHandle<V>> {
        let query = OBB::from_segment(seg, radius);
        self.collect(|b| query.overlaps(b))
    }

    /// Walks every node whose box passes the test. Children of a rejected
    /// node are skipped, they lie inside it.
    fn collect<F: Fn(&OBB) -> bool>(&self, visit: F) -> Vec<ObbHandle<V>> {
        let mut found = Vec::new();
        let mut stack = SmallVec::<[ObbHandle<V>; 32]>::new();
        stack.extend(self.pool[self.root].children.iter().rev().cloned());
        while let Some(top) = stack.pop() {
            let node = &self.pool[top];
            if !visit(&node.bounds) {
                continue;
            }
            found.push(top);
            stack.extend(node.children.iter().rev().cloned());
        }
        found
    }

    /// Sinks a detached node from `start` to the deepest node containing it,
    /// then adopts the siblings it contains.
    fn attach(&mut self, id: ObbHandle<V>, start: ObbHandle<V>) {
        let bounds = self.pool[id].bounds;
        let mut parent = start;
        'descend: loop {
            for &child in &self.pool[parent].children {
                if self.pool[child].bounds.contains(&bounds) {
                    parent = child;
                    continue 'descend;
                }
            }
            break;
        }

        let siblings = mem::replace(&mut self.pool[parent].children, Vec::new());
        let (adopted, kept): (Vec<_>, Vec<_>) = siblings
            .into_iter()
            .partition(|&c| bounds.contains(&self.pool[c].bounds));
        for &child in &adopted {
            self.pool[child].parent = Some(id);
        }
        self.pool[parent].children = kept;
        self.pool[parent].children.push(id);
        let node = &mut self.pool[id];
        node.parent = Some(parent);
        node.children.extend(adopted);
    }

    /// Detaches a node from `parent` and attaches it below the closest
    /// ancestor that still contains it.
    fn reparent(&mut self, id: ObbHandle<V>, parent: ObbHandle<V>) {
        self.pool[parent].children.retain(|&c| c != id);
        self.pool[id].parent = None;
        let bounds = self.pool[id].bounds;
        let mut ancestor = parent;
        while ancestor != self.root && !self.pool[ancestor].bounds.contains(&bounds) {
            ancestor = self.pool[ancestor].parent.unwrap_or(self.root);
        }
        self.attach(id, ancestor);
    }
}

#[cfg(test)]
mod tests {
    mod obbtree {
        use cgmath::{Point3, Vector3};
        use crate::error::CollisionError;
        use crate::obbtree::*;

        fn cube(x: f32, y: f32, z: f32, r: f32) -> OBB {
            OBB::from(AABB { c: Point3::new(x, y, z), r: Vector3::new(r, r, r) })
        }

        #[test]
        fn test_insert_nests() {
            let mut tree: ObbTree<&str> = ObbTree::new();
            let big = tree.insert(cube(0.0, 0.0, 0.0, 10.0), "big");
            let small = tree.insert(cube(1.0, 1.0, 1.0, 1.0), "small");
            let apart = tree.insert(cube(50.0, 0.0, 0.0, 1.0), "apart");
            assert_eq!(tree.len(), 3);
            assert_eq!(tree.parent(big), Some(tree.root()));
            assert_eq!(tree.parent(small), Some(big));
            assert_eq!(tree.parent(apart), Some(tree.root()));
            assert_eq!(tree.get(small), Some(&"small"));
        }

        #[test]
        fn test_insert_adopts() {
            let mut tree = ObbTree::new();
            let a = tree.insert(cube(1.0, 0.0, 0.0, 0.5), 1);
            let b = tree.insert(cube(-1.0, 0.0, 0.0, 0.5), 2);
            let c = tree.insert(cube(9.0, 0.0, 0.0, 0.5), 3);
            let around = tree.insert(cube(0.0, 0.0, 0.0, 2.0), 4);
            assert_eq!(tree.parent(a), Some(around));
            assert_eq!(tree.parent(b), Some(around));
            assert_eq!(tree.parent(c), Some(tree.root()));
            assert_eq!(tree.children(around), &[a, b]);
        }

        #[test]
        fn test_update_reparents() {
            let mut tree = ObbTree::new();
            let left = tree.insert(cube(-5.0, 0.0, 0.0, 3.0), "left");
            let right = tree.insert(cube(5.0, 0.0, 0.0, 3.0), "right");
            let mover = tree.insert(cube(-5.0, 0.0, 0.0, 1.0), "mover");
            assert_eq!(tree.parent(mover), Some(left));

            tree.update(mover, cube(5.0, 0.0, 0.0, 1.0)).unwrap();
            assert_eq!(tree.parent(mover), Some(right));
            assert!(tree.children(left).is_empty());

            // Moving within the parent keeps the parent.
            tree.update(mover, cube(6.0, 0.0, 0.0, 1.0)).unwrap();
            assert_eq!(tree.parent(mover), Some(right));

            // A shrinking parent drops children it no longer holds.
            tree.update(right, cube(4.0, 0.0, 0.0, 1.0)).unwrap();
            assert_eq!(tree.parent(mover), Some(tree.root()));
        }

        #[test]
        fn test_remove() {
            let mut tree = ObbTree::new();
            let outer = tree.insert(cube(0.0, 0.0, 0.0, 5.0), 1);
            let inner = tree.insert(cube(0.0, 0.0, 0.0, 1.0), 2);
            assert_eq!(tree.remove(outer), Some(1));
            assert_eq!(tree.parent(inner), Some(tree.root()));
            assert_eq!(tree.remove(outer), None);
            assert_eq!(tree.update(outer, cube(0.0, 0.0, 0.0, 1.0)), Err(CollisionError::StaleHandle));
            assert_eq!(tree.remove(tree.root()), None);
            assert_eq!(tree.len(), 1);
        }

        #[test]
        fn test_queries() {
            let mut tree = ObbTree::new();
            let outer = tree.insert(cube(0.0, 0.0, 0.0, 4.0), 1);
            let inner = tree.insert(cube(2.0, 0.0, 0.0, 1.0), 2);
            let far = tree.insert(cube(14.0, 0.0, 0.0, 1.0), 3);

            assert_eq!(tree.find_leaf(Point3::new(2.5, 0.0, 0.0)), inner);
            assert_eq!(tree.find_leaf(Point3::new(-2.0, 0.0, 0.0)), outer);
            assert_eq!(tree.find_leaf(Point3::new(10.0, 0.0, 0.0)), tree.root());

            assert_eq!(tree.find_leaf_list_sphere(Point3::new(-6.0, 0.0, 0.0), 2.5), vec![outer]);
            assert_eq!(tree.find_leaf_list_sphere(Point3::new(17.0, 0.0, 0.0), 2.5), vec![far]);

            let seg = Segment::new(Point3::new(2.5, -10.0, 0.0), Point3::new(2.5, 10.0, 0.0));
            assert_eq!(tree.find_leaf_list_segment(&seg), vec![outer, inner]);

            let seg = Segment::new(Point3::new(10.0, -10.0, 0.0), Point3::new(10.0, 10.0, 0.0));
            assert!(tree.find_leaf_list_segment(&seg).is_empty());
            assert_eq!(tree.find_leaf_list_capsule(&seg, 5.5), vec![far]);
        }
    }
}
