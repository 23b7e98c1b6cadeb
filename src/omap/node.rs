use std::sync::Arc;

use crate::record::Record;

// Node corresponds to a single entry in an Omap instance.
#[derive(Clone, Debug)]
pub struct Node {
    pub record: Arc<Record>,
    pub black: bool,                 // store: black or red
    pub left: Option<Arc<Node>>,     // store: left child
    pub right: Option<Arc<Node>>,    // store: right child
}

impl Node {
    pub fn set_record(&mut self, record: Arc<Record>) {
        self.record = record;
    }

    #[inline]
    pub fn set_red(&mut self) {
        self.black = false
    }

    #[inline]
    pub fn set_black(&mut self) {
        self.black = true
    }

    #[inline]
    pub fn toggle_link(&mut self) {
        self.black = !self.black
    }
}

impl Node {
    #[inline]
    pub fn as_left_ref(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    #[inline]
    pub fn as_right_ref(&self) -> Option<&Node> {
        self.right.as_deref()
    }

    #[inline]
    pub fn is_black(&self) -> bool {
        self.black
    }

    #[inline]
    pub fn as_key(&self) -> &[u8] {
        self.record.as_key()
    }
}

impl From<Arc<Record>> for Node {
    fn from(record: Arc<Record>) -> Node {
        Node {
            record,
            black: false,
            left: None,
            right: None,
        }
    }
}
