//! Window - fixed-capacity circular buffer
//!
//! Backing storage for every windowed statistic in the pipeline. The slice is
//! allocated once when the window is built; afterwards `push` is O(1) and
//! never touches the allocator, so a window can be driven from the sampling
//! interrupt.
//!
//! Two warm-up flavours exist:
//! - `Window::zeroed`: starts full of `T::default()` (the slots count towards
//!   every statistic from the first sample on)
//! - `Window::empty`: starts empty and grows until it reaches capacity

/// Fixed-capacity FIFO ring buffer.
#[derive(Debug, Clone)]
pub struct Window<T> {
    slots: Box<[T]>,
    /// Index of the oldest element
    head: usize,
    len: usize,
}

impl<T: Copy + Default> Window<T> {
    /// Create a window that is already full of `T::default()`.
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn zeroed(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be greater than 0");
        Self {
            slots: vec![T::default(); capacity].into_boxed_slice(),
            head: 0,
            len: capacity,
        }
    }

    /// Create an empty window that grows up to `capacity`.
    ///
    /// # Panics
    /// Panics if `capacity` is 0
    pub fn empty(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be greater than 0");
        Self {
            slots: vec![T::default(); capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Append `value`, evicting and returning the oldest element once full.
    #[inline]
    pub fn push(&mut self, value: T) -> Option<T> {
        let capacity = self.slots.len();
        if self.len < capacity {
            let tail = (self.head + self.len) % capacity;
            self.slots[tail] = value;
            self.len += 1;
            None
        } else {
            let evicted = self.slots[self.head];
            self.slots[self.head] = value;
            self.head = (self.head + 1) % capacity;
            Some(evicted)
        }
    }

    /// Most recently inserted element.
    #[inline]
    pub fn newest(&self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.slots.len();
        Some(self.slots[(self.head + self.len - 1) % capacity])
    }

    /// Oldest element still held.
    #[inline]
    pub fn oldest(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.slots[self.head])
        }
    }

    /// Drop every element and return to the empty state.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Copy the contents, oldest first, into `out`. Returns the number of
    /// elements written (`min(len, out.len())`).
    pub fn copy_into(&self, out: &mut [T]) -> usize {
        let mut written = 0;
        for (dst, value) in out.iter_mut().zip(self.iter()) {
            *dst = value;
            written += 1;
        }
        written
    }
}

impl<T: Copy> Window<T> {
    /// Iterate from the oldest to the newest element.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let capacity = self.slots.len();
        (0..self.len).map(move |offset| self.slots[(self.head + offset) % capacity])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
