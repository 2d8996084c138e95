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

use std::fmt;
use std::vec::Vec;

use crate::contact::ContactEvent;
use crate::node::NodeHandle;
use crate::pool::Handle;

pub type MaterialHandle = Handle<CollisionMaterial>;

/// Called for every contact a node of the material detects. Returning false
/// vetoes the positional correction; the contact is still reported.
pub type ContactCallback = Box<dyn FnMut(&ContactEvent) -> bool>;

/// A group of nodes together with the materials they are tested against.
///
/// Rivalry is directed: if A lists B then nodes of A are resolved against
/// nodes of B, but nodes of B never see nodes of A unless B lists A as well.
#[derive(Default)]
pub struct CollisionMaterial {
    nodes: Vec<NodeHandle>,
    rivals: Vec<MaterialHandle>,
    callback: Option<ContactCallback>,
}

impl CollisionMaterial {
    pub fn new() -> Self {
        CollisionMaterial::default()
    }

    /// Nodes of this material in the order they joined it.
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn rival_materials(&self) -> &[MaterialHandle] {
        &self.rivals
    }

    /// Adds a rival. Adding the same rival twice has no effect.
    pub fn add_rival_material(&mut self, rival: MaterialHandle) {
        if !self.rivals.contains(&rival) {
            self.rivals.push(rival);
        }
    }

    pub fn remove_rival_material(&mut self, rival: MaterialHandle) {
        self.rivals.retain(|&r| r != rival);
    }

    pub fn set_contact_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&ContactEvent) -> bool + 'static
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_contact_callback(&mut self) {
        self.callback = None;
    }

    pub fn has_contact_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn add_node(&mut self, node: NodeHandle) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    pub(crate) fn remove_node(&mut self, node: NodeHandle) {
        self.nodes.retain(|&n| n != node);
    }

    pub(crate) fn clear_nodes(&mut self) {
        self.nodes.clear();
    }

    pub(crate) fn take_callback(&mut self) -> Option<ContactCallback> {
        self.callback.take()
    }

    /// Puts a taken callback back unless a new one was installed meanwhile.
    pub(crate) fn restore_callback(&mut self, callback: ContactCallback) {
        if self.callback.is_none() {
            self.callback = Some(callback);
        }
    }
}

impl fmt::Debug for CollisionMaterial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CollisionMaterial")
            .field("nodes", &self.nodes)
            .field("rivals", &self.rivals)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    mod material {
        use crate::material::*;
        use crate::pool::Pool;

        #[test]
        fn test_rivals_are_unique() {
            let mut pool: Pool<CollisionMaterial> = Pool::new();
            let a = pool.push(CollisionMaterial::new());
            let b = pool.push(CollisionMaterial::new());
            pool[a].add_rival_material(b);
            pool[a].add_rival_material(b);
            assert_eq!(pool[a].rival_materials(), &[b]);
            // Rivalry is directed.
            assert!(pool[b].rival_materials().is_empty());
            pool[a].remove_rival_material(b);
            assert!(pool[a].rival_materials().is_empty());
        }

        #[test]
        fn test_callback_restore() {
            let mut material = CollisionMaterial::new();
            material.set_contact_callback(|_| false);
            let taken = material.take_callback().unwrap();
            assert!(!material.has_contact_callback());
            material.restore_callback(taken);
            assert!(material.has_contact_callback());
        }
    }
}
