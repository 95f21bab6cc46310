use thiserror::Error;

const NIL: u32 = u32::MAX;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug, Copy, Clone)]
struct Node {
    lo: u64,
    hi: u64,
    color: Color,
    parent: u32,
    left: u32,
    right: u32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("custody id is already acknowledged")]
    Duplicate,

    #[error("custody range tree is full")]
    Full,
}

/// A red-black tree of disjoint, maximally coalesced closed ranges of
/// acknowledged custody ids.
///
/// Inserting a custody id adjacent to an existing range extends that range
/// in place; an id bridging two ranges merges them into one, releasing the
/// absorbed node.  Nodes live in a fixed-capacity arena and link by index,
/// so a full tree reports [`Error::Full`] instead of allocating.
#[derive(Debug)]
pub struct RangeTree {
    nodes: Vec<Node>,
    free: Vec<u32>,
    root: u32,
    count: usize,
    capacity: usize,
}

impl RangeTree {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "range tree must hold at least one range");
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            root: NIL,
            count: 0,
            capacity,
        }
    }

    /// Number of stored ranges.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = NIL;
        self.count = 0;
    }

    /// Records `cid` as acknowledged.
    ///
    /// Re-inserting an id an existing range already covers reports a
    /// duplicate and leaves the tree untouched.
    pub fn insert(&mut self, cid: u64) -> Result<(), Error> {
        // Descend, remembering the closest range on either side
        let mut parent = NIL;
        let mut pred = NIL;
        let mut succ = NIL;
        let mut cur = self.root;
        while cur != NIL {
            let node = self.nodes[cur as usize];
            if cid >= node.lo && cid <= node.hi {
                return Err(Error::Duplicate);
            }
            parent = cur;
            if cid < node.lo {
                succ = cur;
                cur = node.left;
            } else {
                pred = cur;
                cur = node.right;
            }
        }

        let left_adjacent =
            pred != NIL && self.nodes[pred as usize].hi.checked_add(1) == Some(cid);
        let right_adjacent =
            succ != NIL && cid.checked_add(1) == Some(self.nodes[succ as usize].lo);

        match (left_adjacent, right_adjacent) {
            (true, true) => {
                // Bridge: the predecessor swallows the successor's range
                let hi = self.nodes[succ as usize].hi;
                self.nodes[pred as usize].hi = hi;
                self.remove_node(succ);
            }
            (true, false) => self.nodes[pred as usize].hi = cid,
            (false, true) => self.nodes[succ as usize].lo = cid,
            (false, false) => {
                let z = self.alloc(Node {
                    lo: cid,
                    hi: cid,
                    color: Color::Red,
                    parent,
                    left: NIL,
                    right: NIL,
                })?;
                if parent == NIL {
                    self.root = z;
                } else if cid < self.nodes[parent as usize].lo {
                    self.nodes[parent as usize].left = z;
                } else {
                    self.nodes[parent as usize].right = z;
                }
                self.count += 1;
                self.insert_fixup(z);
            }
        }
        Ok(())
    }

    /// The lowest stored range, if any.
    pub fn first(&self) -> Option<(u64, u64)> {
        if self.root == NIL {
            return None;
        }
        let node = &self.nodes[self.minimum(self.root) as usize];
        Some((node.lo, node.hi))
    }

    /// Drops the lowest stored range.
    pub fn pop_first(&mut self) {
        if self.root != NIL {
            let z = self.minimum(self.root);
            self.remove_node(z);
        }
    }

    /// Ascending iteration over the stored ranges.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tree: self,
            next: if self.root == NIL {
                NIL
            } else {
                self.minimum(self.root)
            },
        }
    }

    fn alloc(&mut self, node: Node) -> Result<u32, Error> {
        if let Some(i) = self.free.pop() {
            self.nodes[i as usize] = node;
            Ok(i)
        } else if self.nodes.len() < self.capacity {
            self.nodes.push(node);
            Ok((self.nodes.len() - 1) as u32)
        } else {
            Err(Error::Full)
        }
    }

    fn color(&self, i: u32) -> Color {
        if i == NIL {
            Color::Black
        } else {
            self.nodes[i as usize].color
        }
    }

    fn set_color(&mut self, i: u32, color: Color) {
        if i != NIL {
            self.nodes[i as usize].color = color;
        }
    }

    fn parent(&self, i: u32) -> u32 {
        self.nodes[i as usize].parent
    }

    fn minimum(&self, mut i: u32) -> u32 {
        while self.nodes[i as usize].left != NIL {
            i = self.nodes[i as usize].left;
        }
        i
    }

    fn rotate_left(&mut self, x: u32) {
        let y = self.nodes[x as usize].right;
        let y_left = self.nodes[y as usize].left;
        self.nodes[x as usize].right = y_left;
        if y_left != NIL {
            self.nodes[y_left as usize].parent = x;
        }
        let x_parent = self.nodes[x as usize].parent;
        self.nodes[y as usize].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if self.nodes[x_parent as usize].left == x {
            self.nodes[x_parent as usize].left = y;
        } else {
            self.nodes[x_parent as usize].right = y;
        }
        self.nodes[y as usize].left = x;
        self.nodes[x as usize].parent = y;
    }

    fn rotate_right(&mut self, x: u32) {
        let y = self.nodes[x as usize].left;
        let y_right = self.nodes[y as usize].right;
        self.nodes[x as usize].left = y_right;
        if y_right != NIL {
            self.nodes[y_right as usize].parent = x;
        }
        let x_parent = self.nodes[x as usize].parent;
        self.nodes[y as usize].parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if self.nodes[x_parent as usize].right == x {
            self.nodes[x_parent as usize].right = y;
        } else {
            self.nodes[x_parent as usize].left = y;
        }
        self.nodes[y as usize].right = x;
        self.nodes[x as usize].parent = y;
    }

    fn insert_fixup(&mut self, mut z: u32) {
        while self.color(self.parent(z)) == Color::Red {
            let p = self.parent(z);
            let g = self.parent(p);
            if p == self.nodes[g as usize].left {
                let u = self.nodes[g as usize].right;
                if self.color(u) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(u, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.nodes[p as usize].right {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_right(g);
                }
            } else {
                let u = self.nodes[g as usize].left;
                if self.color(u) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(u, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.nodes[p as usize].left {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    fn transplant(&mut self, u: u32, v: u32) {
        let up = self.nodes[u as usize].parent;
        if up == NIL {
            self.root = v;
        } else if self.nodes[up as usize].left == u {
            self.nodes[up as usize].left = v;
        } else {
            self.nodes[up as usize].right = v;
        }
        if v != NIL {
            self.nodes[v as usize].parent = up;
        }
    }

    /// Standard red-black extraction of `z`, rebalancing as needed.
    fn remove_node(&mut self, z: u32) {
        let mut y_color = self.nodes[z as usize].color;
        let x;
        let x_parent;

        if self.nodes[z as usize].left == NIL {
            x = self.nodes[z as usize].right;
            x_parent = self.nodes[z as usize].parent;
            self.transplant(z, x);
        } else if self.nodes[z as usize].right == NIL {
            x = self.nodes[z as usize].left;
            x_parent = self.nodes[z as usize].parent;
            self.transplant(z, x);
        } else {
            let y = self.minimum(self.nodes[z as usize].right);
            y_color = self.nodes[y as usize].color;
            x = self.nodes[y as usize].right;
            if self.nodes[y as usize].parent == z {
                x_parent = y;
            } else {
                x_parent = self.nodes[y as usize].parent;
                self.transplant(y, x);
                let z_right = self.nodes[z as usize].right;
                self.nodes[y as usize].right = z_right;
                self.nodes[z_right as usize].parent = y;
            }
            self.transplant(z, y);
            let z_left = self.nodes[z as usize].left;
            self.nodes[y as usize].left = z_left;
            self.nodes[z_left as usize].parent = y;
            self.nodes[y as usize].color = self.nodes[z as usize].color;
        }

        if y_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }
        self.free.push(z);
        self.count -= 1;
    }

    fn delete_fixup(&mut self, mut x: u32, mut x_parent: u32) {
        while x != self.root && self.color(x) == Color::Black && x_parent != NIL {
            if x == self.nodes[x_parent as usize].left {
                let mut w = self.nodes[x_parent as usize].right;
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(x_parent, Color::Red);
                    self.rotate_left(x_parent);
                    w = self.nodes[x_parent as usize].right;
                }
                let w_left = self.nodes[w as usize].left;
                let w_right = self.nodes[w as usize].right;
                if self.color(w_left) == Color::Black && self.color(w_right) == Color::Black {
                    self.set_color(w, Color::Red);
                    x = x_parent;
                    x_parent = self.nodes[x as usize].parent;
                } else {
                    if self.color(w_right) == Color::Black {
                        self.set_color(w_left, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.nodes[x_parent as usize].right;
                    }
                    let parent_color = self.color(x_parent);
                    self.set_color(w, parent_color);
                    self.set_color(x_parent, Color::Black);
                    let w_right = self.nodes[w as usize].right;
                    self.set_color(w_right, Color::Black);
                    self.rotate_left(x_parent);
                    x = self.root;
                    x_parent = NIL;
                }
            } else {
                let mut w = self.nodes[x_parent as usize].left;
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(x_parent, Color::Red);
                    self.rotate_right(x_parent);
                    w = self.nodes[x_parent as usize].left;
                }
                let w_left = self.nodes[w as usize].left;
                let w_right = self.nodes[w as usize].right;
                if self.color(w_left) == Color::Black && self.color(w_right) == Color::Black {
                    self.set_color(w, Color::Red);
                    x = x_parent;
                    x_parent = self.nodes[x as usize].parent;
                } else {
                    if self.color(w_left) == Color::Black {
                        self.set_color(w_right, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.nodes[x_parent as usize].left;
                    }
                    let parent_color = self.color(x_parent);
                    self.set_color(w, parent_color);
                    self.set_color(x_parent, Color::Black);
                    let w_left = self.nodes[w as usize].left;
                    self.set_color(w_left, Color::Black);
                    self.rotate_right(x_parent);
                    x = self.root;
                    x_parent = NIL;
                }
            }
        }
        self.set_color(x, Color::Black);
    }
}

impl quill_bpv6::dacs::RangeSource for RangeTree {
    fn first(&self) -> Option<(u64, u64)> {
        RangeTree::first(self)
    }

    fn pop_first(&mut self) {
        RangeTree::pop_first(self)
    }
}

pub struct Iter<'a> {
    tree: &'a RangeTree,
    next: u32,
}

impl Iterator for Iter<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<(u64, u64)> {
        if self.next == NIL {
            return None;
        }
        let nodes = &self.tree.nodes;
        let current = self.next;
        let node = nodes[current as usize];

        // in-order successor
        if node.right != NIL {
            self.next = self.tree.minimum(node.right);
        } else {
            let mut child = current;
            let mut parent = node.parent;
            while parent != NIL && nodes[parent as usize].right == child {
                child = parent;
                parent = nodes[parent as usize].parent;
            }
            self.next = parent;
        }
        Some((node.lo, node.hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl RangeTree {
        fn ranges(&self) -> Vec<(u64, u64)> {
            self.iter().collect()
        }

        /// Checks every red-black and range invariant.
        fn validate(&self) {
            assert_eq!(self.color(self.root), Color::Black, "root must be black");

            fn black_height(tree: &RangeTree, i: u32) -> usize {
                if i == NIL {
                    return 1;
                }
                let node = &tree.nodes[i as usize];
                assert!(node.lo <= node.hi);
                if node.color == Color::Red {
                    assert_eq!(tree.color(node.left), Color::Black, "red-red violation");
                    assert_eq!(tree.color(node.right), Color::Black, "red-red violation");
                }
                let left = black_height(tree, node.left);
                let right = black_height(tree, node.right);
                assert_eq!(left, right, "black height mismatch");
                left + usize::from(node.color == Color::Black)
            }
            black_height(self, self.root);

            let ranges = self.ranges();
            assert_eq!(ranges.len(), self.count);
            for pair in ranges.windows(2) {
                assert!(
                    pair[0].1 + 1 < pair[1].0,
                    "ranges {pair:?} are not disjoint and non-adjacent"
                );
            }
        }
    }

    #[test]
    fn sequential_inserts_coalesce() {
        let mut tree = RangeTree::with_capacity(8);
        for cid in 0..5 {
            tree.insert(cid).unwrap();
            tree.validate();
        }
        assert_eq!(tree.ranges(), vec![(0, 4)]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn bridge_merges_two_ranges() {
        let mut tree = RangeTree::with_capacity(8);
        tree.insert(10).unwrap();
        tree.insert(12).unwrap();
        assert_eq!(tree.ranges(), vec![(10, 10), (12, 12)]);

        tree.insert(11).unwrap();
        tree.validate();
        assert_eq!(tree.ranges(), vec![(10, 12)]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut tree = RangeTree::with_capacity(8);
        for cid in [5, 6, 7, 20] {
            tree.insert(cid).unwrap();
        }
        let before = tree.ranges();
        for cid in [5, 6, 7, 20] {
            assert_eq!(tree.insert(cid), Err(Error::Duplicate));
        }
        tree.validate();
        assert_eq!(tree.ranges(), before);
    }

    #[test]
    fn capacity_bounds_node_count() {
        let mut tree = RangeTree::with_capacity(2);
        tree.insert(0).unwrap();
        tree.insert(10).unwrap();
        assert_eq!(tree.insert(20), Err(Error::Full));

        // adjacency still extends without a new node
        tree.insert(1).unwrap();
        assert_eq!(tree.ranges(), vec![(0, 1), (10, 10)]);

        // a bridge releases a node back to the arena
        for cid in 2..10 {
            tree.insert(cid).unwrap();
        }
        assert_eq!(tree.ranges(), vec![(0, 10)]);
        tree.insert(20).unwrap();
        tree.validate();
    }

    #[test]
    fn pop_first_drains_in_ascending_order() {
        let mut tree = RangeTree::with_capacity(8);
        for cid in [30, 10, 20, 11] {
            tree.insert(cid).unwrap();
        }

        let mut drained = Vec::new();
        while let Some(range) = tree.first() {
            drained.push(range);
            tree.pop_first();
            tree.validate();
        }
        assert_eq!(drained, vec![(10, 11), (20, 20), (30, 30)]);
        assert!(tree.is_empty());
    }

    #[test]
    fn scattered_inserts_keep_invariants() {
        let mut tree = RangeTree::with_capacity(256);
        // a deterministic shuffle of 0..200
        let mut cid = 0u64;
        for _ in 0..200 {
            cid = (cid + 73) % 200;
            tree.insert(cid).unwrap();
            tree.validate();
        }
        // 73 and 200 are coprime, so everything coalesces into one range
        assert_eq!(tree.ranges(), vec![(0, 199)]);
    }

    #[test]
    fn clear_resets_the_arena() {
        let mut tree = RangeTree::with_capacity(4);
        for cid in [1, 10, 20, 30] {
            tree.insert(cid).unwrap();
        }
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.first(), None);
        tree.insert(5).unwrap();
        assert_eq!(tree.ranges(), vec![(5, 5)]);
    }
}
