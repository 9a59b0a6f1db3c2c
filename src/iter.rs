//! Deterministic traversal over a parsed tree.
//!
//! [`iterate`] walks depth-first in pre-order (a node before its children,
//! children in stored order) using an explicit stack, so deep trees never
//! recurse. Traversal only borrows the tree; call it again for a fresh walk.

use std::iter::FusedIterator;
use std::slice;

use crate::object::FirmwareObject;

/// Lazy pre-order iterator returned by [`iterate`].
#[derive(Debug, Clone)]
pub struct Objects<'a> {
    root: Option<&'a FirmwareObject>,
    stack: Vec<slice::Iter<'a, FirmwareObject>>,
}

impl<'a> Iterator for Objects<'a> {
    type Item = &'a FirmwareObject;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            self.stack.push(root.children.iter());
            return Some(root);
        }
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(node) => {
                    self.stack.push(node.children.iter());
                    return Some(node);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl FusedIterator for Objects<'_> {}

/// Pre-order traversal of `root` and all of its descendants.
pub fn iterate(root: &FirmwareObject) -> Objects<'_> {
    Objects {
        root: Some(root),
        stack: Vec::new(),
    }
}

/// Materialise a traversal into an ordered list.
pub fn flatten<'a, I>(objects: I) -> Vec<&'a FirmwareObject>
where
    I: IntoIterator<Item = &'a FirmwareObject>,
{
    objects.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::object::{Details, Validity};

    fn node(offset: usize) -> FirmwareObject {
        FirmwareObject::new(Details::RawBlob, offset, Bytes::new())
    }

    #[test]
    fn preorder_with_flagged_nodes() {
        let mut root = node(0);
        let mut a = node(1);
        let mut a1 = node(2);
        a1.flag(Validity::Truncated);
        a.children.push(a1);
        root.children.push(a);
        root.children.push(node(3));

        let offsets: Vec<usize> = iterate(&root).map(|n| n.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
        assert_eq!(flatten(iterate(&root)).len(), 4);
    }

    #[test]
    fn restartable_and_single_node() {
        let root = node(7);
        assert_eq!(flatten(iterate(&root)).len(), 1);
        assert_eq!(flatten(iterate(&root)).len(), 1);

        let mut it = iterate(&root);
        assert!(it.next().is_some());
        assert!(it.next().is_none());
        assert!(it.next().is_none());
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let mut root = node(0);
        for depth in (1..10_000).rev() {
            let mut parent = node(depth);
            parent.children.push(root);
            root = parent;
        }
        assert_eq!(iterate(&root).count(), 10_000);
        // Dropping a deep chain recurses; unwind it by hand.
        let mut cur = Some(root);
        while let Some(mut n) = cur {
            cur = n.children.pop();
        }
    }
}
