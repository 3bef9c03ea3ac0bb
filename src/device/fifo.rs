//! Hardware FIFO
//!
//! A fixed-storage circular buffer with a run-time capacity, used for the transmit and receive
//! queues of the peripheral models. Storage is sized for the largest supported depth so that the
//! depth can be picked per instance without allocating.

/// A circular FIFO holding at most `capacity` elements, with `capacity <= N`.
#[derive(Clone, Debug)]
pub struct Fifo<T, const N: usize> {
    buffer: [T; N],
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T: Copy + Default, const N: usize> Fifo<T, N> {
    /// Creates an empty FIFO, the capacity is clamped to the range `1..=N`.
    pub fn new(capacity: usize) -> Self {
        Fifo {
            buffer: [T::default(); N],
            capacity: capacity.clamp(1, N),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Pushes a value at the tail.
    ///
    /// Returns false and leaves the FIFO untouched if it is full, the caller is responsible for
    /// latching the overflow condition.
    #[must_use]
    pub fn push(&mut self, value: T) -> bool {
        if self.is_full() {
            return false;
        }

        self.buffer[self.tail] = value;
        self.tail = (self.tail + 1) % self.capacity;
        self.count += 1;
        true
    }

    /// Pops the value at the head, or returns `None` if the FIFO is empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let value = self.buffer[self.head];
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        Some(value)
    }

    /// Returns the value at the head without removing it.
    pub fn peek(&self) -> Option<T> {
        if self.is_empty() {
            None
        } else {
            Some(self.buffer[self.head])
        }
    }

    /// Empties the FIFO.
    pub fn clear(&mut self) {
        self.buffer = [T::default(); N];
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

#[cfg(test)]
mod tests {
    use super::Fifo;

    #[test]
    fn fifo_order() {
        let mut fifo: Fifo<u32, 16> = Fifo::new(4);
        assert!(fifo.is_empty());
        for value in 1..=4 {
            assert!(fifo.push(value));
        }
        assert!(fifo.is_full());
        assert_eq!(fifo.len(), 4);

        for value in 1..=4 {
            assert_eq!(fifo.pop(), Some(value));
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn overflow_keeps_content() {
        let mut fifo: Fifo<u8, 16> = Fifo::new(4);
        for value in [0xAA, 0x55, 0x12, 0x34] {
            assert!(fifo.push(value));
        }

        assert!(!fifo.push(0x99));
        assert_eq!(fifo.len(), 4);
        assert_eq!(fifo.peek(), Some(0xAA));
        assert_eq!(fifo.pop(), Some(0xAA));
        assert_eq!(fifo.pop(), Some(0x55));
        assert_eq!(fifo.pop(), Some(0x12));
        assert_eq!(fifo.pop(), Some(0x34));
    }

    #[test]
    fn underflow() {
        let mut fifo: Fifo<u32, 4> = Fifo::new(4);
        assert_eq!(fifo.pop(), None);
        assert_eq!(fifo.peek(), None);
        assert_eq!(fifo.len(), 0);
    }

    #[test]
    fn wrap_around() {
        // Interleave pushes and pops so that head and tail wrap several times, checking the
        // count invariant along the way.
        let mut fifo: Fifo<u32, 16> = Fifo::new(4);
        let mut next_in = 0;
        let mut next_out = 0;
        for round in 0..50 {
            let pushes = round % 5;
            for _ in 0..pushes {
                if fifo.push(next_in) {
                    next_in += 1;
                }
                assert!(fifo.len() <= fifo.capacity());
            }
            let pops = (round * 3) % 4;
            for _ in 0..pops {
                if let Some(value) = fifo.pop() {
                    assert_eq!(value, next_out);
                    next_out += 1;
                }
            }
            assert_eq!(fifo.len(), (next_in - next_out) as usize);
        }
    }

    #[test]
    fn capacity_is_clamped() {
        let fifo: Fifo<u8, 16> = Fifo::new(32);
        assert_eq!(fifo.capacity(), 16);
        let fifo: Fifo<u8, 16> = Fifo::new(0);
        assert_eq!(fifo.capacity(), 1);
    }

    #[test]
    fn clear() {
        let mut fifo: Fifo<u8, 4> = Fifo::new(4);
        assert!(fifo.push(1));
        assert!(fifo.push(2));
        fifo.clear();
        assert!(fifo.is_empty());
        assert!(fifo.push(3));
        assert_eq!(fifo.pop(), Some(3));
    }
}
