//! Growable array with a fixed growth policy.
//!
//! Capacity grows to `size * 12 / 10 + 2` when an insertion overflows,
//! and [`GrowableArray::reserve`] reallocates to an exact capacity.

use std::ops::{Index, IndexMut};

/// Resizable buffer backing in-memory column data.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GrowableArray<T> {
    data: Vec<T>,
}

impl<T> GrowableArray<T> {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates an empty array with an exact initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Alias of [`size`](Self::size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in elements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<&T> {
        self.data.get(i)
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        self.data.get_mut(i)
    }

    /// Reallocates to exactly `capacity` elements, truncating if smaller
    /// than the current size.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity < self.data.len() {
            self.data.truncate(capacity);
        }
        if capacity > self.data.capacity() {
            self.data.reserve_exact(capacity - self.data.len());
        } else {
            self.data.shrink_to(capacity);
        }
    }

    fn grow_for(&mut self, new_size: usize) {
        if new_size > self.data.capacity() {
            let target = (new_size * 12 / 10 + 2).max(new_size);
            self.data.reserve_exact(target - self.data.len());
        }
    }

    /// Appends one element.
    pub fn append(&mut self, elem: T) {
        self.grow_for(self.data.len() + 1);
        self.data.push(elem);
    }

    /// Inserts `elem` at position `i`, shifting later elements up.
    ///
    /// # Panics
    ///
    /// Panics if `i > size()`.
    pub fn insert(&mut self, i: usize, elem: T) {
        self.grow_for(self.data.len() + 1);
        self.data.insert(i, elem);
    }

    /// Removes element `i` preserving order. O(n).
    pub fn delete_ordered(&mut self, i: usize) -> Option<T> {
        (i < self.data.len()).then(|| self.data.remove(i))
    }

    /// Removes element `i` by moving the last element into its slot. O(1).
    pub fn delete_swap(&mut self, i: usize) -> Option<T> {
        (i < self.data.len()).then(|| self.data.swap_remove(i))
    }

    /// Removes the last element.
    pub fn delete_last(&mut self) -> Option<T> {
        self.data.pop()
    }

    /// Consumes the array, returning the backing vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Clone> GrowableArray<T> {
    /// Appends `n` copies of `elem`.
    pub fn append_n(&mut self, elem: T, n: usize) {
        self.grow_for(self.data.len() + n);
        self.data.extend(std::iter::repeat(elem).take(n));
    }

    /// Appends a copy of every element of `slice`.
    pub fn append_slice(&mut self, slice: &[T]) {
        self.grow_for(self.data.len() + slice.len());
        self.data.extend_from_slice(slice);
    }

    /// Resizes to `n` elements, filling new slots with `fill`.
    pub fn resize_with_value(&mut self, n: usize, fill: T) {
        self.grow_for(n);
        self.data.resize(n, fill);
    }
}

impl<T: Clone + Default> GrowableArray<T> {
    /// Creates an array holding `n` default elements.
    #[must_use]
    pub fn new_with_size(n: usize) -> Self {
        let mut a = Self::with_capacity(n);
        a.data.resize(n, T::default());
        a
    }

    /// Resizes to `n` elements, filling new slots with `T::default()`.
    pub fn resize(&mut self, n: usize) {
        self.resize_with_value(n, T::default());
    }
}

impl<T> From<Vec<T>> for GrowableArray<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> Index<usize> for GrowableArray<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T> IndexMut<usize> for GrowableArray<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

impl<'a, T> IntoIterator for &'a GrowableArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_policy() {
        let mut a: GrowableArray<i32> = GrowableArray::new();
        a.append(1);
        // 1 * 12 / 10 + 2
        assert!(a.capacity() >= 3);
        for i in 0..100 {
            a.append(i);
        }
        assert_eq!(a.size(), 101);
        assert_eq!(a[0], 1);
        assert_eq!(a[100], 99);
    }

    #[test]
    fn test_reserve_clamps_size() {
        let mut a = GrowableArray::from(vec![1, 2, 3, 4, 5]);
        a.reserve(3);
        assert_eq!(a.as_slice(), &[1, 2, 3]);
        a.reserve(50);
        assert!(a.capacity() >= 50);
        assert_eq!(a.size(), 3);
    }

    #[test]
    fn test_insert_and_deletes() {
        let mut a = GrowableArray::from(vec![10, 20, 30, 40]);
        a.insert(1, 15);
        assert_eq!(a.as_slice(), &[10, 15, 20, 30, 40]);

        assert_eq!(a.delete_ordered(0), Some(10));
        assert_eq!(a.as_slice(), &[15, 20, 30, 40]);

        assert_eq!(a.delete_swap(0), Some(15));
        assert_eq!(a.as_slice(), &[40, 20, 30]);

        assert_eq!(a.delete_last(), Some(30));
        assert_eq!(a.delete_ordered(7), None);
        assert_eq!(a.size(), 2);
    }

    #[test]
    fn test_append_n_and_slice() {
        let mut a: GrowableArray<f32> = GrowableArray::new_with_size(2);
        a.append_n(1.5, 3);
        a.append_slice(&[7.0, 8.0]);
        assert_eq!(a.as_slice(), &[0.0, 0.0, 1.5, 1.5, 1.5, 7.0, 8.0]);

        a.resize(3);
        assert_eq!(a.size(), 3);
        a.resize_with_value(5, -1.0);
        assert_eq!(a.as_slice(), &[0.0, 0.0, 1.5, -1.0, -1.0]);
    }
}
