//! Element-aware doubly linked list.
//!
//! `add` hands back a [`ListEntry`] that the caller keeps next to the element
//! (usually in a tuple store slot). Removing through that entry unlinks the
//! element in O(1) without searching. Entries carry a generation, so an entry
//! whose element is already gone resolves to nothing instead of hitting the
//! element that reused its slot.
//!
//! Nodes live in a slab. A dense position array on the side allows O(1)
//! uniform sampling of live elements.

use core::fmt;

/// Handle to one element of an [`ElementAwareList`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListEntry {
    index: u32,
    generation: u32,
}

struct Node<T> {
    value: Option<T>,
    generation: u32,
    prev: Option<u32>,
    next: Option<u32>,
    /// Index into `positions` while occupied.
    position: u32,
}

/// Doubly linked list whose elements can be removed in O(1) through their entry.
pub struct ElementAwareList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<u32>,
    positions: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
}

impl<T> ElementAwareList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            positions: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if the list has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Appends an element and returns its entry.
    pub fn add(&mut self, value: T) -> ListEntry {
        let position = self.positions.len() as u32;
        let prev = self.tail;
        let index = match self.free.pop() {
            Some(index) => {
                let node = &mut self.nodes[index as usize];
                node.value = Some(value);
                node.prev = prev;
                node.next = None;
                node.position = position;
                index
            }
            None => {
                let index = self.nodes.len() as u32;
                self.nodes.push(Node {
                    value: Some(value),
                    generation: 0,
                    prev,
                    next: None,
                    position,
                });
                index
            }
        };

        match prev {
            Some(tail) => self.nodes[tail as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.positions.push(index);

        ListEntry {
            index,
            generation: self.nodes[index as usize].generation,
        }
    }

    fn live_node(&self, entry: ListEntry) -> Option<&Node<T>> {
        self.nodes
            .get(entry.index as usize)
            .filter(|node| node.generation == entry.generation && node.value.is_some())
    }

    /// Returns true if the entry still refers to an element of this list.
    pub fn contains(&self, entry: ListEntry) -> bool {
        self.live_node(entry).is_some()
    }

    /// Returns the element behind an entry.
    pub fn get(&self, entry: ListEntry) -> Option<&T> {
        self.live_node(entry).and_then(|node| node.value.as_ref())
    }

    /// Returns the element behind an entry mutably.
    pub fn get_mut(&mut self, entry: ListEntry) -> Option<&mut T> {
        let node = self.nodes.get_mut(entry.index as usize)?;
        if node.generation != entry.generation {
            return None;
        }
        node.value.as_mut()
    }

    /// Unlinks the element behind `entry` and returns it.
    ///
    /// Returns `None` when the entry was already removed.
    pub fn remove(&mut self, entry: ListEntry) -> Option<T> {
        let node = self.nodes.get_mut(entry.index as usize)?;
        if node.generation != entry.generation {
            return None;
        }
        let value = node.value.take()?;
        node.generation = node.generation.wrapping_add(1);
        let (prev, next, position) = (node.prev, node.next, node.position);

        match prev {
            Some(p) => self.nodes[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n as usize].prev = prev,
            None => self.tail = prev,
        }

        self.positions.swap_remove(position as usize);
        if let Some(&moved) = self.positions.get(position as usize) {
            self.nodes[moved as usize].position = position;
        }
        self.free.push(entry.index);
        Some(value)
    }

    /// Returns the first element.
    pub fn first(&self) -> Option<&T> {
        self.head
            .and_then(|index| self.nodes[index as usize].value.as_ref())
    }

    /// Returns the element stored at a dense position in `0..len()`.
    ///
    /// Positions are unrelated to list order and change as elements are
    /// removed; they exist for uniform random picks.
    pub fn get_by_position(&self, position: usize) -> Option<(ListEntry, &T)> {
        let index = *self.positions.get(position)?;
        let node = &self.nodes[index as usize];
        let entry = ListEntry {
            index,
            generation: node.generation,
        };
        node.value.as_ref().map(|value| (entry, value))
    }

    /// Returns the entries of all elements in list order.
    pub fn entries(&self) -> Vec<ListEntry> {
        let mut entries = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let node = &self.nodes[index as usize];
            entries.push(ListEntry {
                index,
                generation: node.generation,
            });
            cursor = node.next;
        }
        entries
    }

    /// Iterates the elements in list order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len(),
        }
    }

    /// Removes every element, returning them in list order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len());
        while let Some(head) = self.head {
            let entry = ListEntry {
                index: head,
                generation: self.nodes[head as usize].generation,
            };
            match self.remove(entry) {
                Some(value) => values.push(value),
                None => break,
            }
        }
        values
    }
}

impl<T> Default for ElementAwareList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ElementAwareList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over an [`ElementAwareList`] in list order.
pub struct Iter<'a, T> {
    list: &'a ElementAwareList<T>,
    cursor: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.list.nodes[index as usize];
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        node.value.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a ElementAwareList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &ElementAwareList<i32>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_add_preserves_order() {
        let mut list = ElementAwareList::new();
        list.add(1);
        list.add(2);
        list.add(3);
        assert_eq!(collect(&list), vec![1, 2, 3]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.first(), Some(&1));
    }

    #[test]
    fn test_remove_middle_head_tail() {
        let mut list = ElementAwareList::new();
        let a = list.add(1);
        let b = list.add(2);
        let c = list.add(3);

        assert_eq!(list.remove(b), Some(2));
        assert_eq!(collect(&list), vec![1, 3]);
        assert_eq!(list.remove(a), Some(1));
        assert_eq!(collect(&list), vec![3]);
        assert_eq!(list.remove(c), Some(3));
        assert!(list.is_empty());
        assert_eq!(list.first(), None);
    }

    #[test]
    fn test_stale_entry_is_rejected() {
        let mut list = ElementAwareList::new();
        let a = list.add(10);
        list.remove(a);
        let b = list.add(20);

        // `b` reuses the slot of `a`, the old entry must not reach it.
        assert_eq!(list.remove(a), None);
        assert_eq!(list.get(a), None);
        assert!(!list.contains(a));
        assert_eq!(list.get(b), Some(&20));
    }

    #[test]
    fn test_positions_after_removal() {
        let mut list = ElementAwareList::new();
        let entries: Vec<_> = (0..5).map(|i| list.add(i)).collect();
        list.remove(entries[1]);
        list.remove(entries[3]);

        let mut seen: Vec<i32> = (0..list.len())
            .map(|p| *list.get_by_position(p).unwrap().1)
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 2, 4]);
        assert!(list.get_by_position(3).is_none());
    }

    #[test]
    fn test_drain_and_entries() {
        let mut list = ElementAwareList::new();
        let a = list.add(1);
        list.add(2);
        list.add(3);
        assert_eq!(list.entries().len(), 3);
        assert_eq!(list.entries()[0], a);

        assert_eq!(list.drain(), vec![1, 2, 3]);
        assert!(list.is_empty());
        assert_eq!(list.remove(a), None);

        list.add(4);
        assert_eq!(collect(&list), vec![4]);
    }

    #[test]
    fn test_get_mut() {
        let mut list = ElementAwareList::new();
        let a = list.add(1);
        *list.get_mut(a).unwrap() = 7;
        assert_eq!(list.get(a), Some(&7));
    }
}
