// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Indexed binary min-heap keyed by node id.
use crate::network::NodeId;

/// Sentinel marking a node that is not currently on the heap.
const ABSENT: usize = usize::MAX;

/// A binary min-heap over dense node ids with `insert`, `pop` and `decrease_key` in
/// O(log n).
///
/// The heap keeps a position map from node id to heap slot, so the slot of a node can
/// be found in O(1) when its key decreases. Relaxing an edge during a shortest-path
/// search therefore costs a single sift-up instead of a linear scan.
#[derive(Clone, Debug)]
pub struct IndexedMinHeap {
    /// Heap slots holding `(node, key)`, ordered so that `slot[i] <= slot[2i+1], slot[2i+2]`.
    slots: Vec<(NodeId, f64)>,
    /// Maps a node id to its slot in `slots`, or [ABSENT].
    position: Vec<usize>,
}

impl IndexedMinHeap {
    /// Returns an empty heap able to hold node ids `1..=num_nodes`.
    pub fn new(num_nodes: usize) -> Self {
        IndexedMinHeap {
            slots: Vec::with_capacity(num_nodes),
            position: vec![ABSENT; num_nodes + 1],
        }
    }

    /// Removes all items from the heap.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.position.fill(ABSENT);
    }

    /// Returns `true` if the node is currently on the heap.
    pub fn contains(&self, node: NodeId) -> bool {
        self.position[node] != ABSENT
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Pushes a node that is not yet on the heap.
    ///
    /// **Panics** in debug builds if the node is already present; use
    /// [IndexedMinHeap::decrease_key] to lower the key of a present node.
    pub fn insert(&mut self, node: NodeId, key: f64) {
        debug_assert!(!self.contains(node));
        let slot = self.slots.len();
        self.slots.push((node, key));
        self.position[node] = slot;
        self.sift_up(slot);
    }

    /// Lowers the key of a node already on the heap and restores the heap order.
    pub fn decrease_key(&mut self, node: NodeId, key: f64) {
        let slot = self.position[node];
        debug_assert!(slot != ABSENT);
        debug_assert!(key <= self.slots[slot].1);
        self.slots[slot].1 = key;
        self.sift_up(slot);
    }

    /// Removes and returns the node with the smallest key.
    pub fn pop(&mut self) -> Option<(NodeId, f64)> {
        if self.slots.is_empty() {
            return None;
        }
        let last = self.slots.len() - 1;
        self.swap_slots(0, last);
        let (node, key) = self.slots.pop().unwrap();
        self.position[node] = ABSENT;
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        Some((node, key))
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.slots[slot].1 >= self.slots[parent].1 {
                break;
            }
            self.swap_slots(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        loop {
            let left = 2 * slot + 1;
            let right = 2 * slot + 2;
            let mut smallest = slot;
            if left < self.slots.len() && self.slots[left].1 < self.slots[smallest].1 {
                smallest = left;
            }
            if right < self.slots.len() && self.slots[right].1 < self.slots[smallest].1 {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap_slots(slot, smallest);
            slot = smallest;
        }
    }

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.slots.swap(a, b);
        self.position[self.slots[a].0] = a;
        self.position[self.slots[b].0] = b;
    }
}
