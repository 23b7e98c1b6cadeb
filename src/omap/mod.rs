//! Module implement the ordered-map substrate, an immutable
//! left-leaning red-black tree with copy-on-write transactions and
//! multi-reader structural sharing.

mod node;
mod tree;

use node::Node;
pub use tree::{Iter, Omap, Range, Txn};
