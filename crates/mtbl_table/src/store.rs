//! Ordered storage for table entries.
//!
//! [`EntryStore`] is an AVL tree. It knows nothing about message tables: values are ordered by
//! the comparison routine handed to [`EntryStore::create`], and every node is charged to the
//! [`Pool`] it was created with.

use std::{alloc::Layout, cmp::Ordering, fmt, iter::FusedIterator};

use crate::{error::Result, pool::Pool};

/// Comparison routine used to order values in an [`EntryStore`].
pub type CompareFn<T> = fn(&T, &T) -> Ordering;

type Link<T> = Option<Box<Node<T>>>;

struct Node<T> {
    value: T,
    height: u8,
    left: Link<T>,
    right: Link<T>,
}

impl<T> Node<T> {
    fn leaf(value: T) -> Box<Self> {
        Box::new(Node {
            value,
            height: 1,
            left: None,
            right: None,
        })
    }

    fn layout() -> Layout {
        Layout::new::<Self>()
    }
}

fn height<T>(link: &Link<T>) -> u8 {
    link.as_ref().map_or(0, |node| node.height)
}

fn update_height<T>(node: &mut Node<T>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn balance_factor<T>(node: &Node<T>) -> i16 {
    i16::from(height(&node.left)) - i16::from(height(&node.right))
}

fn rotate_right<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let Some(mut pivot) = node.left.take() else {
        return node;
    };
    node.left = pivot.right.take();
    update_height(&mut node);
    pivot.right = Some(node);
    update_height(&mut pivot);
    pivot
}

fn rotate_left<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    let Some(mut pivot) = node.right.take() else {
        return node;
    };
    node.right = pivot.left.take();
    update_height(&mut node);
    pivot.left = Some(node);
    update_height(&mut pivot);
    pivot
}

fn rebalance<T>(mut node: Box<Node<T>>) -> Box<Node<T>> {
    update_height(&mut node);
    let balance = balance_factor(&node);

    if balance > 1 {
        if node.left.as_ref().is_some_and(|left| balance_factor(left) < 0) {
            node.left = node.left.take().map(rotate_left);
        }
        rotate_right(node)
    } else if balance < -1 {
        if node.right.as_ref().is_some_and(|right| balance_factor(right) > 0) {
            node.right = node.right.take().map(rotate_right);
        }
        rotate_left(node)
    } else {
        node
    }
}

fn insert_node<T>(link: Link<T>, value: T, compare: CompareFn<T>) -> Box<Node<T>> {
    let Some(mut node) = link else {
        return Node::leaf(value);
    };

    match compare(&value, &node.value) {
        Ordering::Less => node.left = Some(insert_node(node.left.take(), value, compare)),
        Ordering::Greater => node.right = Some(insert_node(node.right.take(), value, compare)),
        Ordering::Equal => {
            // callers look the key up first, equal keys never reach this point
            node.value = value;
            return node;
        }
    }

    rebalance(node)
}

/// Detach the leftmost node. Returns the remaining subtree and the detached node.
fn take_min<T>(mut node: Box<Node<T>>) -> (Link<T>, Box<Node<T>>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    }
}

fn remove_node<T, F>(link: Link<T>, locate: &mut F) -> (Link<T>, Option<Box<Node<T>>>)
where
    F: FnMut(&T) -> Ordering,
{
    let Some(mut node) = link else {
        return (None, None);
    };

    match locate(&node.value) {
        Ordering::Less => {
            let (rest, removed) = remove_node(node.right.take(), locate);
            node.right = rest;
            (Some(rebalance(node)), removed)
        }
        Ordering::Greater => {
            let (rest, removed) = remove_node(node.left.take(), locate);
            node.left = rest;
            (Some(rebalance(node)), removed)
        }
        Ordering::Equal => {
            let replacement = match (node.left.take(), node.right.take()) {
                (None, None) => None,
                (Some(child), None) | (None, Some(child)) => Some(child),
                (Some(left), Some(right)) => {
                    let (rest, mut successor) = take_min(right);
                    successor.left = Some(left);
                    successor.right = rest;
                    Some(rebalance(successor))
                }
            };
            (replacement, Some(node))
        }
    }
}

fn find<T, F>(mut link: &Link<T>, mut locate: F) -> Option<&T>
where
    F: FnMut(&T) -> Ordering,
{
    while let Some(node) = link {
        match locate(&node.value) {
            Ordering::Less => link = &node.right,
            Ordering::Greater => link = &node.left,
            Ordering::Equal => return Some(&node.value),
        }
    }
    None
}

fn find_mut<T, F>(mut link: &mut Link<T>, mut locate: F) -> Option<&mut T>
where
    F: FnMut(&T) -> Ordering,
{
    while let Some(node) = link {
        match locate(&node.value) {
            Ordering::Less => link = &mut node.right,
            Ordering::Greater => link = &mut node.left,
            Ordering::Equal => return Some(&mut node.value),
        }
    }
    None
}

fn first<T>(link: &Link<T>) -> Option<&T> {
    let node = link.as_ref()?;
    match node.left {
        Some(_) => first(&node.left),
        None => Some(&node.value),
    }
}

fn first_mut<T>(link: &mut Link<T>) -> Option<&mut T> {
    let node = link.as_mut()?;
    if node.left.is_some() {
        first_mut(&mut node.left)
    } else {
        Some(&mut node.value)
    }
}

/// Balanced ordered container with injected comparison and allocation.
///
/// Lookups take a locator closure in the manner of [`slice::binary_search_by`]: it receives a
/// stored value and returns how that value orders against the target.
pub struct EntryStore<T, P: Pool> {
    root: Link<T>,
    len: usize,
    compare: CompareFn<T>,
    pool: P,
}

impl<T, P: Pool> EntryStore<T, P> {
    /// Allocate an empty store.
    ///
    /// Fails with [`crate::error::Error::OutOfMemory`] when the pool refuses the control
    /// structure.
    pub fn create(compare: CompareFn<T>, pool: P) -> Result<Self> {
        pool.allocate(Layout::new::<Self>())?;

        Ok(Self {
            root: None,
            len: 0,
            compare,
            pool,
        })
    }

    /// Number of values in the store
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the store holds no values
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The pool nodes are charged to
    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Insert `value`, or overwrite the stored value comparing equal to it.
    ///
    /// When overwriting, `release` runs on the stored value in place before it is replaced, so
    /// the value still carries its key while being released. When the pool refuses a new node,
    /// `release` runs on `value` instead and the error is returned.
    ///
    /// Returns `true` when a new key was added.
    pub fn insert_or_replace<F>(&mut self, mut value: T, release: F) -> Result<bool>
    where
        F: FnOnce(&mut T, &P),
    {
        let compare = self.compare;

        if let Some(existing) = find_mut(&mut self.root, |existing| compare(existing, &value)) {
            release(existing, &self.pool);
            *existing = value;
            return Ok(false);
        }

        if let Err(e) = self.pool.allocate(Node::<T>::layout()) {
            release(&mut value, &self.pool);
            return Err(e);
        }

        self.root = Some(insert_node(self.root.take(), value, compare));
        self.len += 1;

        Ok(true)
    }

    /// Find a value using `locate`.
    pub fn search_by<F>(&self, locate: F) -> Option<&T>
    where
        F: FnMut(&T) -> Ordering,
    {
        find(&self.root, locate)
    }

    /// Smallest value in the store
    pub fn first(&self) -> Option<&T> {
        first(&self.root)
    }

    /// Remove the value matching `locate`.
    ///
    /// `release` runs on the value while it is still linked into the tree, then the node is
    /// unlinked and returned to the pool.
    pub fn remove_by<F, R>(&mut self, mut locate: F, release: R) -> Option<T>
    where
        F: FnMut(&T) -> Ordering,
        R: FnOnce(&mut T, &P),
    {
        let existing = find_mut(&mut self.root, &mut locate)?;
        release(existing, &self.pool);

        let (root, removed) = remove_node(self.root.take(), &mut locate);
        self.root = root;
        removed.map(|node| self.unlink(node))
    }

    /// Remove the smallest value, running `release` on it before it is unlinked.
    pub fn pop_first_with<R>(&mut self, release: R) -> Option<T>
    where
        R: FnOnce(&mut T, &P),
    {
        let first = first_mut(&mut self.root)?;
        release(first, &self.pool);

        let (root, node) = take_min(self.root.take()?);
        self.root = root;
        Some(self.unlink(node))
    }

    /// Iterate over the values in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(&self.root, self.len)
    }

    /// Remove every value in ascending order.
    ///
    /// Values not consumed by the caller are removed when the iterator is dropped.
    pub fn drain(&mut self) -> Drain<'_, T, P> {
        Drain { store: self }
    }

    fn unlink(&mut self, node: Box<Node<T>>) -> T {
        self.len -= 1;
        self.pool.free(Node::<T>::layout());

        let Node { value, .. } = *node;
        value
    }
}

impl<T, P: Pool> Drop for EntryStore<T, P> {
    fn drop(&mut self) {
        while self.pop_first_with(|_, _| ()).is_some() {}
        self.pool.free(Layout::new::<Self>());
    }
}

impl<T: fmt::Debug, P: Pool> fmt::Debug for EntryStore<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// In-order iterator over an [`EntryStore`]
pub struct Iter<'a, T> {
    stack: Vec<&'a Node<T>>,
    remaining: usize,
}

impl<'a, T> Iter<'a, T> {
    fn new(root: &'a Link<T>, len: usize) -> Self {
        let mut iter = Iter {
            stack: Vec::new(),
            remaining: len,
        };
        iter.push_left(root.as_deref());
        iter
    }

    fn push_left(&mut self, mut node: Option<&'a Node<T>>) {
        while let Some(current) = node {
            self.stack.push(current);
            node = current.left.as_deref();
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        self.remaining = self.remaining.saturating_sub(1);
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

/// Destructive in-order iterator over an [`EntryStore`]
pub struct Drain<'a, T, P: Pool> {
    store: &'a mut EntryStore<T, P>,
}

impl<T, P: Pool> Iterator for Drain<'_, T, P> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.store.pop_first_with(|_, _| ())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.store.len, Some(self.store.len))
    }
}

impl<T, P: Pool> Drop for Drain<'_, T, P> {
    fn drop(&mut self) {
        self.by_ref().for_each(drop);
    }
}
