//! Arena-allocated doubly linked list.
//!
//! Nodes live in a [`Slab`] and are addressed by a [`Key`] that stays valid
//! until the node is removed. This provides O(1) append, O(1) removal of an
//! arbitrary node and cheap iteration in both directions, which is what the
//! LP input queue needs for straggler insertion, bound repositioning and
//! antimessage matching.
//!
//! Keys of removed nodes may be recycled by later insertions, so a key must
//! never be used after the node it designates has been removed.
use std::fmt;
use std::ops::{Index, IndexMut};

use slab::Slab;

/// Handle to a node of a [`List`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Key(usize);

struct Node<T> {
    value: T,
    prev: Option<Key>,
    next: Option<Key>,
}

/// A doubly linked list with stable node handles.
pub(crate) struct List<T> {
    nodes: Slab<Node<T>>,
    head: Option<Key>,
    tail: Option<Key>,
}

impl<T> List<T> {
    /// Creates an empty list.
    pub(crate) fn new() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn head(&self) -> Option<Key> {
        self.head
    }

    pub(crate) fn tail(&self) -> Option<Key> {
        self.tail
    }

    pub(crate) fn next(&self, key: Key) -> Option<Key> {
        self.nodes[key.0].next
    }

    pub(crate) fn prev(&self, key: Key) -> Option<Key> {
        self.nodes[key.0].prev
    }

    /// Inserts a value after the specified node, or at the front of the list
    /// if `after` is `None`.
    pub(crate) fn insert_after(&mut self, after: Option<Key>, value: T) -> Key {
        let next = match after {
            Some(after) => self.nodes[after.0].next,
            None => self.head,
        };
        let key = Key(self.nodes.insert(Node {
            value,
            prev: after,
            next,
        }));

        match after {
            Some(after) => self.nodes[after.0].next = Some(key),
            None => self.head = Some(key),
        }
        match next {
            Some(next) => self.nodes[next.0].prev = Some(key),
            None => self.tail = Some(key),
        }

        key
    }

    #[cfg(test)]
    pub(crate) fn push_back(&mut self, value: T) -> Key {
        self.insert_after(self.tail, value)
    }

    pub(crate) fn push_front(&mut self, value: T) -> Key {
        self.insert_after(None, value)
    }

    /// Inserts a value in a list ordered by `sort_key`, after all the nodes
    /// with an equal key.
    ///
    /// The search starts from the tail since new values are most often the
    /// latest ones.
    pub(crate) fn place_by<K, F>(&mut self, value: T, sort_key: F) -> Key
    where
        K: Ord,
        F: Fn(&T) -> K,
    {
        let k = sort_key(&value);
        let mut after = self.tail;
        while let Some(node) = after {
            if sort_key(&self.nodes[node.0].value) <= k {
                break;
            }
            after = self.nodes[node.0].prev;
        }

        self.insert_after(after, value)
    }

    /// Unlinks a node and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if the key does not designate a node of this list.
    pub(crate) fn remove(&mut self, key: Key) -> T {
        let node = self.nodes.remove(key.0);
        match node.prev {
            Some(prev) => self.nodes[prev.0].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next.0].prev = node.prev,
            None => self.tail = node.prev,
        }

        node.value
    }

    /// Removes nodes from the front of the list as long as they satisfy the
    /// predicate, stopping at `keep` regardless. Returns the number of removed
    /// nodes.
    pub(crate) fn truncate_front_while<F>(&mut self, keep: Option<Key>, mut pred: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut count = 0;
        while let Some(head) = self.head {
            if Some(head) == keep || !pred(&self.nodes[head.0].value) {
                break;
            }
            self.remove(head);
            count += 1;
        }

        count
    }

    /// Finds the last node satisfying the predicate, scanning from the tail.
    pub(crate) fn rfind<F>(&self, mut pred: F) -> Option<Key>
    where
        F: FnMut(&T) -> bool,
    {
        let mut cursor = self.tail;
        while let Some(node) = cursor {
            if pred(&self.nodes[node.0].value) {
                return Some(node);
            }
            cursor = self.nodes[node.0].prev;
        }

        None
    }

    /// Iterates over the values from head to tail.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        self.iter_after(None)
    }

    /// Iterates over the values following `key` (excluded), or over the whole
    /// list if `key` is `None`.
    pub(crate) fn iter_after(&self, key: Option<Key>) -> Iter<'_, T> {
        let cursor = match key {
            Some(key) => self.next(key),
            None => self.head,
        };

        Iter { list: self, cursor }
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<Key> for List<T> {
    type Output = T;

    fn index(&self, key: Key) -> &T {
        &self.nodes[key.0].value
    }
}

impl<T> IndexMut<Key> for List<T> {
    fn index_mut(&mut self, key: Key) -> &mut T {
        &mut self.nodes[key.0].value
    }
}

impl<T: fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(_, value)| value))
            .finish()
    }
}

/// Forward iterator over the nodes of a [`List`].
pub(crate) struct Iter<'a, T> {
    list: &'a List<T>,
    cursor: Option<Key>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Key, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor?;
        let node = &self.list.nodes[key.0];
        self.cursor = node.next;

        Some((key, &node.value))
    }
}
