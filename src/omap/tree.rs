use std::{
    cmp::Ordering,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use crate::{omap::Node, record::Record, Error, Result};

pub const MAX_TREE_DEPTH: usize = 100;

/// Omap is one immutable snapshot of the ordered map, a set of
/// `(key, record)` entries ordered by key.
///
/// Omap values are cheap to clone and safe to share across threads, all
/// nodes are reference-counted and never mutated in place. Mutations go
/// through a copy-on-write [Txn] handle obtained from
/// [transaction][Omap::transaction]; entries inserted or deleted on the
/// handle do not affect pre-existing Omap values.
#[derive(Clone, Default, Debug)]
pub struct Omap {
    root: Option<Arc<Node>>,
    n_count: usize,
}

impl Omap {
    /// Create an empty ordered map.
    pub fn new() -> Omap {
        Omap {
            root: None,
            n_count: 0,
        }
    }

    /// Return the number of entries in this snapshot.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_count
    }

    /// Return whether this snapshot holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_count == 0
    }

    /// Get the record for `key`, O(log n).
    pub fn get(&self, key: &[u8]) -> Option<Arc<Record>> {
        get_key(self.root.as_deref(), key)
    }

    /// Full table scan in ascending key order.
    pub fn iter(&self) -> Iter {
        let root = self.root.as_ref().map(Arc::clone);
        let mut paths = Vec::default();
        build_iter(IFlag::Left, root, &mut paths);

        Iter { paths }
    }

    /// Iterate over entries within the specified `range`, ascending.
    pub fn range<R>(&self, range: R) -> Range<R>
    where
        R: RangeBounds<Vec<u8>>,
    {
        let root = self.root.as_ref().map(Arc::clone);

        let mut paths = Vec::default();
        match range.start_bound() {
            Bound::Unbounded => build_iter(IFlag::Left, root, &mut paths),
            Bound::Included(low) => find_start(root, low.as_slice(), true, &mut paths),
            Bound::Excluded(low) => find_start(root, low.as_slice(), false, &mut paths),
        };
        let iter = Iter { paths };

        Range {
            range,
            iter,
            fin: false,
        }
    }

    /// Start a copy-on-write transaction over this snapshot.
    pub fn transaction(&self) -> Txn {
        Txn {
            root: self.root.as_ref().map(Arc::clone),
            n_count: self.n_count,
        }
    }

    /// Validate the tree with the following rules:
    ///
    /// * Root node is always black in color.
    /// * Verify the sort order between a node and its left/right child.
    /// * Make sure there are no consecutive reds.
    /// * Make sure number of blacks are same on both left and right arm.
    /// * Make sure that the maximum depth do not exceed [MAX_TREE_DEPTH].
    pub fn validate(&self) -> Result<()> {
        let root = self.root.as_deref();
        let (red, depth) = (is_red(root), 0);

        if red {
            return err_at!(Fatal, msg: "root node must be black");
        }

        let n_blacks = 0;
        let (_, n_count) = validate_tree(root, red, n_blacks, depth)?;
        if n_count != self.n_count {
            return err_at!(Fatal, msg: "n_count {} != {}", n_count, self.n_count);
        }

        Ok(())
    }
}

/// Txn is the write-handle into an [Omap] snapshot.
///
/// Inserts and deletes rebuild only the tree path they touch, unchanged
/// subtrees stay shared with the originating snapshot. Committing yields
/// a fresh [Omap] value, the originating snapshot is left intact.
pub struct Txn {
    root: Option<Arc<Node>>,
    n_count: usize,
}

impl Txn {
    /// Get the record for `key` as staged within this transaction.
    pub fn get(&self, key: &[u8]) -> Option<Arc<Record>> {
        get_key(self.root.as_deref(), key)
    }

    /// Return the number of entries staged within this transaction.
    #[inline]
    pub fn len(&self) -> usize {
        self.n_count
    }

    /// Insert `record`, keyed by its own key. If an entry exists for the
    /// key it is replaced and the old record returned.
    pub fn set(&mut self, record: Record) -> Option<Arc<Record>> {
        let (mut root, old) = do_set(self.root.as_deref(), Arc::new(record));

        root.as_mut().map(|root| Arc::get_mut(root).map(Node::set_black));

        if old.is_none() {
            self.n_count += 1;
        }
        self.root = root;
        old
    }

    /// Remove the entry for `key`, returning the removed record. Absent
    /// keys return none and leave the transaction unchanged.
    pub fn delete(&mut self, key: &[u8]) -> Option<Arc<Record>> {
        let (root, old) = do_remove(self.root.as_deref(), key);
        let mut root = root.map(Arc::new);

        root.as_mut().map(|root| Arc::get_mut(root).map(Node::set_black));

        if old.is_some() {
            self.n_count -= 1;
            self.root = root;
        }
        old
    }

    /// Commit the staged entries into a fresh [Omap] snapshot.
    pub fn commit(self) -> Omap {
        Omap {
            root: self.root,
            n_count: self.n_count,
        }
    }
}

fn do_set(node: Option<&Node>, record: Arc<Record>) -> (Option<Arc<Node>>, Option<Arc<Record>>) {
    let mut node: Node = match node {
        Some(node) => node.clone(),
        None => {
            let node = Node::from(record);
            return (Some(Arc::new(node)), None);
        }
    };

    let (node, old) = match node.as_key().cmp(record.as_key()) {
        Ordering::Greater => {
            let (root, old) = do_set(node.as_left_ref(), record);
            node.left = root;
            (walkuprot_23(node), old)
        }
        Ordering::Less => {
            let (root, old) = do_set(node.as_right_ref(), record);
            node.right = root;
            (walkuprot_23(node), old)
        }
        Ordering::Equal => {
            let old = Arc::clone(&node.record);
            node.set_record(record);
            (node, Some(old))
        }
    };

    (Some(Arc::new(node)), old)
}

fn do_remove(node: Option<&Node>, key: &[u8]) -> (Option<Node>, Option<Arc<Record>>) {
    let mut node: Node = match node {
        Some(node) => node.clone(),
        None => return (None, None),
    };

    match node.as_key().cmp(key) {
        Ordering::Greater if node.left.is_none() => (Some(node), None),
        Ordering::Greater => {
            let left = node.as_left_ref();
            if !is_red(left) && !is_red(left.and_then(Node::as_left_ref)) {
                node = move_red_left(node)
            }

            let (left, old) = do_remove(node.as_left_ref(), key);
            node.left = left.map(Arc::new);
            (Some(fixup(node)), old)
        }
        _ => {
            if is_red(node.as_left_ref()) {
                node = rotate_right(node);
            }

            if !node.as_key().lt(key) && node.right.is_none() {
                return (None, Some(Arc::clone(&node.record)));
            }

            node = match node.as_right_ref() {
                r @ Some(_) if !is_red(r) && !is_red(r.and_then(Node::as_left_ref)) => {
                    move_red_right(node)
                }
                Some(_) | None => node,
            };

            if !node.as_key().lt(key) {
                let old = Arc::clone(&node.record);
                let [right, sub_node] = do_remove_min(node.as_right_ref());
                node.right = right.map(Arc::new);
                let mut sub_node = match sub_node {
                    Some(sub_node) => sub_node,
                    None => return (Some(node), None), // missing key
                };
                sub_node.left = node.left;
                sub_node.right = node.right;
                sub_node.black = node.black;
                (Some(fixup(sub_node)), Some(old))
            } else {
                let (right, old) = do_remove(node.as_right_ref(), key);
                node.right = right.map(Arc::new);
                (Some(fixup(node)), old)
            }
        }
    }
}

fn do_remove_min(node: Option<&Node>) -> [Option<Node>; 2] {
    let mut node = match node {
        Some(node) => node.clone(),
        None => return [None, None],
    };

    if node.left.is_none() {
        return [None, Some(node)];
    }

    let left = node.as_left_ref();

    if !is_red(left) && !is_red(left.and_then(Node::as_left_ref)) {
        node = move_red_left(node);
    }
    let [left, sub_node] = do_remove_min(node.as_left_ref());
    node.left = left.map(Arc::new);
    [Some(fixup(node)), sub_node]
}

#[inline]
fn is_red(node: Option<&Node>) -> bool {
    node.map_or(false, |node| !node.is_black())
}

#[inline]
fn is_black(node: Option<&Node>) -> bool {
    node.map_or(true, Node::is_black)
}

fn walkuprot_23(mut node: Node) -> Node {
    if is_red(node.as_right_ref()) && !is_red(node.as_left_ref()) {
        node = rotate_left(node)
    }
    let left = node.as_left_ref();
    if is_red(left) && is_red(left.and_then(Node::as_left_ref)) {
        node = rotate_right(node);
    }
    if is_red(node.as_left_ref()) && is_red(node.as_right_ref()) {
        flip(&mut node)
    }
    node
}

//              (i)                       (i)
//               |                         |
//              node                     right
//              /  \                      / \
//             /    (r)                 (r)  \
//            /       \                 /     \
//          left     right           node     r-r
//                    / \            /  \
//                 r-l  r-r       left  r-l
//
fn rotate_left(mut node: Node) -> Node {
    let old_right: &Node = match node.right.as_deref() {
        Some(right) if !is_black(Some(right)) => right,
        Some(_) | None => panic!("rotate_left(): rotating a black link"),
    };

    let mut right = old_right.clone();

    node.right = right.left.take();
    right.black = node.black;
    node.set_red();
    right.left = Some(Arc::new(node));

    right
}

//              (i)                       (i)
//               |                         |
//              node                      left
//              /  \                      / \
//            (r)   \                   (r)  \
//           /       \                 /      \
//         left     right            l-l      node
//         / \                                / \
//      l-l  l-r                            l-r  right
//
fn rotate_right(mut node: Node) -> Node {
    let old_left: &Node = match node.left.as_deref() {
        Some(left) if !is_black(Some(left)) => left,
        Some(_) | None => panic!("rotate_right(): rotating a black link"),
    };

    let mut left = old_left.clone();

    node.left = left.right.take();
    left.black = node.black;
    node.set_red();
    left.right = Some(Arc::new(node));

    left
}

//        (x)                   (!x)
//         |                     |
//        node                  node
//        / \                   / \
//      (y) (z)              (!y) (!z)
//     /      \              /      \
//   left    right         left    right
//
fn flip(node: &mut Node) {
    let mut left = match node.left.as_deref() {
        Some(left) => left.clone(),
        None => panic!("flip(): missing left child"),
    };
    let mut right = match node.right.as_deref() {
        Some(right) => right.clone(),
        None => panic!("flip(): missing right child"),
    };

    node.toggle_link();
    left.toggle_link();
    right.toggle_link();

    node.left = Some(Arc::new(left));
    node.right = Some(Arc::new(right));
}

fn fixup(mut node: Node) -> Node {
    if is_red(node.as_right_ref()) {
        node = rotate_left(node)
    }

    let left = node.as_left_ref();
    if is_red(left) && is_red(left.and_then(Node::as_left_ref)) {
        node = rotate_right(node)
    }

    if is_red(node.as_left_ref()) && is_red(node.as_right_ref()) {
        flip(&mut node)
    }
    node
}

fn move_red_left(mut node: Node) -> Node {
    flip(&mut node);

    if is_red(node.right.as_deref().and_then(Node::as_left_ref)) {
        let right = match node.right.take() {
            Some(right) => right.as_ref().clone(),
            None => panic!("move_red_left(): missing right child"),
        };
        node.right = Some(Arc::new(rotate_right(right)));
        node = rotate_left(node);
        flip(&mut node);
    }
    node
}

fn move_red_right(mut node: Node) -> Node {
    flip(&mut node);

    if is_red(node.left.as_deref().and_then(Node::as_left_ref)) {
        node = rotate_right(node);
        flip(&mut node);
    }
    node
}

// Get the record for key.
fn get_key(node: Option<&Node>, key: &[u8]) -> Option<Arc<Record>> {
    let node = node?;
    match node.as_key().cmp(key) {
        Ordering::Less => get_key(node.as_right_ref(), key),
        Ordering::Greater => get_key(node.as_left_ref(), key),
        Ordering::Equal => Some(Arc::clone(&node.record)),
    }
}

fn validate_tree(
    node: Option<&Node>,
    fromred: bool,
    mut n_blacks: usize,
    depth: usize,
) -> Result<(usize, usize)> {
    let red = is_red(node);

    let node = match node {
        Some(_) if fromred && red => err_at!(Fatal, msg: "consecutive reds")?,
        Some(node) => node,
        None => return Ok((n_blacks, 0)),
    };

    if !red {
        n_blacks += 1;
    }

    if depth > MAX_TREE_DEPTH {
        return err_at!(Fatal, msg: "tree exceeds max_depth {}", depth);
    }

    // confirm sort order in the tree.
    if let Some(left) = node.as_left_ref() {
        if left.as_key().ge(node.as_key()) {
            let (lk, nk) = (left.as_key(), node.as_key());
            return err_at!(Fatal, msg: "sort order left:{:?}, parent:{:?}", lk, nk);
        }
    }
    if let Some(right) = node.as_right_ref() {
        if right.as_key().le(node.as_key()) {
            let (rk, nk) = (right.as_key(), node.as_key());
            return err_at!(Fatal, msg: "sort order right:{:?}, parent:{:?}", rk, nk);
        }
    }

    let (lb, lc) = validate_tree(node.as_left_ref(), red, n_blacks, depth + 1)?;
    let (rb, rc) = validate_tree(node.as_right_ref(), red, n_blacks, depth + 1)?;

    if lb != rb {
        return err_at!(Fatal, msg: "unbalanced blacks l:{}, r:{}", lb, rb);
    }

    Ok((lb, lc + rc + 1))
}

/// Iterator type, to do full table scan over an [Omap] snapshot.
///
/// A full table scan using this type is optimal when used with concurrent
/// read threads, but not with concurrent write threads.
pub struct Iter {
    paths: Vec<Fragment>,
}

impl Iterator for Iter {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let path = self.paths.last_mut()?;
            match path.flag {
                IFlag::Left => {
                    path.flag = IFlag::Center;
                    break Some(Arc::clone(&path.node.record));
                }
                IFlag::Center => {
                    path.flag = IFlag::Right;
                    let right = path.node.right.as_ref().map(Arc::clone);
                    build_iter(IFlag::Left, right, &mut self.paths)
                }
                IFlag::Right => {
                    self.paths.pop();
                }
            }
        }
    }
}

/// Iterator type, to scan between a _lower-bound_ and _higher-bound_.
pub struct Range<R>
where
    R: RangeBounds<Vec<u8>>,
{
    range: R,
    iter: Iter,
    fin: bool,
}

impl<R> Iterator for Range<R>
where
    R: RangeBounds<Vec<u8>>,
{
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.fin {
            false => {
                let record = self.iter.next()?;
                let qey = record.as_key();
                match self.range.end_bound() {
                    Bound::Unbounded => Some(record),
                    Bound::Included(high) if qey.le(high.as_slice()) => Some(record),
                    Bound::Excluded(high) if qey.lt(high.as_slice()) => Some(record),
                    Bound::Included(_) | Bound::Excluded(_) => {
                        self.fin = true;
                        None
                    }
                }
            }
            true => None,
        }
    }
}

// Continuous iteration without walking through the whole tree from root.
// Achieved by maintaining a FIFO queue of tree-path to the previous
// iterated node. Each node in the FIFO queue is a tuple of tree-node and
// its current state (IFlag), together this tuple is called as a Fragment.
struct Fragment {
    flag: IFlag,
    node: Arc<Node>,
}

#[derive(Copy, Clone)]
enum IFlag {
    Left,   // left path is iterated.
    Center, // current node is iterated.
    Right,  // right paths is being iterated.
}

fn build_iter(flag: IFlag, node: Option<Arc<Node>>, paths: &mut Vec<Fragment>) {
    if let Some(node) = node {
        let item = Fragment {
            flag,
            node: Arc::clone(&node),
        };
        let node = match flag {
            IFlag::Left => node.left.as_ref().map(Arc::clone),
            IFlag::Right => node.right.as_ref().map(Arc::clone),
            IFlag::Center => unreachable!(),
        };
        paths.push(item);
        build_iter(flag, node, paths)
    }
}

fn find_start(node: Option<Arc<Node>>, low: &[u8], incl: bool, paths: &mut Vec<Fragment>) {
    if let Some(node) = node {
        let left = node.left.as_ref().map(Arc::clone);
        let right = node.right.as_ref().map(Arc::clone);

        let cmp = node.as_key().cmp(low);

        let flag = match cmp {
            Ordering::Less => IFlag::Right,
            Ordering::Equal if incl => IFlag::Left,
            Ordering::Equal => IFlag::Center,
            Ordering::Greater => IFlag::Left,
        };
        paths.push(Fragment { flag, node });

        match cmp {
            Ordering::Equal => (),
            Ordering::Less => find_start(right, low, incl, paths),
            Ordering::Greater => find_start(left, low, incl, paths),
        }
    }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
