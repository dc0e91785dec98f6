//! Fixed-capacity byte FIFO shared between an interrupt producer and a
//! main-loop consumer.
//!
//! Cursors count modulo `2 * N`, so a full buffer and an empty one stay
//! distinguishable; the physical slot is `cursor % N`. When the consumer
//! drains the buffer both cursors are rebased under a critical section.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU16, Ordering};

pub struct RingBuffer<const N: usize> {
    storage: UnsafeCell<[u8; N]>,
    producer: AtomicU16,
    consumer: AtomicU16,
}

// Shared access only happens through one `Producer` and one `Consumer`
// obtained from `split`, which holds the exclusive borrow.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    const CAPACITY_FITS: () = assert!(N > 0 && N < (1 << 15), "ring capacity must fit the u16 cursors");

    pub const fn new() -> Self {
        let () = Self::CAPACITY_FITS;
        Self {
            storage: UnsafeCell::new([0; N]),
            producer: AtomicU16::new(0),
            consumer: AtomicU16::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        occupancy::<N>(
            self.producer.load(Ordering::Acquire),
            self.consumer.load(Ordering::Acquire),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        N.saturating_sub(self.len())
    }

    pub fn is_full(&self) -> bool {
        self.len() >= N
    }

    /// Append a byte; returns `false` and drops it when the buffer is full.
    pub fn enqueue(&mut self, byte: u8) -> bool {
        self.push(byte)
    }

    pub fn dequeue(&mut self) -> Option<u8> {
        self.pop()
    }

    pub fn clear(&mut self) {
        self.producer.store(0, Ordering::Release);
        self.consumer.store(0, Ordering::Release);
    }

    /// Split into the interrupt-side writer and the main-loop reader.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        let ring: &Self = self;
        (Producer { ring }, Consumer { ring })
    }

    fn push(&self, byte: u8) -> bool {
        critical_section::with(|_| {
            let producer = self.producer.load(Ordering::Acquire);
            let consumer = self.consumer.load(Ordering::Acquire);
            if occupancy::<N>(producer, consumer) >= N {
                return false;
            }

            let slot = usize::from(producer) % N;
            // SAFETY: `slot < N`, and the consumer never reads a slot at or past
            // the producer cursor, which is only advanced after this write.
            unsafe { self.storage.get().cast::<u8>().add(slot).write(byte) };
            self.producer.store(advance::<N>(producer), Ordering::Release);
            true
        })
    }

    fn pop(&self) -> Option<u8> {
        let producer = self.producer_snapshot();
        let consumer = self.consumer.load(Ordering::Acquire);
        if producer == consumer {
            return None;
        }

        let slot = usize::from(consumer) % N;
        // SAFETY: `slot < N` and lies before the producer cursor, so the
        // producer will not write it until the consumer cursor moves past.
        let byte = unsafe { self.storage.get().cast::<u8>().add(slot).read() };
        let consumer = advance::<N>(consumer);
        self.consumer.store(consumer, Ordering::Release);

        critical_section::with(|_| {
            if self.producer.load(Ordering::Acquire) == consumer {
                let rebased = (slot + 1) as u16;
                self.producer.store(rebased, Ordering::Release);
                self.consumer.store(rebased, Ordering::Release);
            }
        });

        Some(byte)
    }

    fn producer_snapshot(&self) -> u16 {
        critical_section::with(|_| self.producer.load(Ordering::Acquire))
    }
}

fn occupancy<const N: usize>(producer: u16, consumer: u16) -> usize {
    (usize::from(producer) + 2 * N - usize::from(consumer)) % (2 * N)
}

fn advance<const N: usize>(cursor: u16) -> u16 {
    ((usize::from(cursor) + 1) % (2 * N)) as u16
}

/// Writing half of a split [`RingBuffer`].
pub struct Producer<'a, const N: usize> {
    ring: &'a RingBuffer<N>,
}

impl<const N: usize> Producer<'_, N> {
    pub fn enqueue(&mut self, byte: u8) -> bool {
        self.ring.push(byte)
    }

    pub fn free(&self) -> usize {
        self.ring.free()
    }
}

/// Reading half of a split [`RingBuffer`].
pub struct Consumer<'a, const N: usize> {
    ring: &'a RingBuffer<N>,
}

impl<const N: usize> Consumer<'_, N> {
    pub fn dequeue(&mut self) -> Option<u8> {
        self.ring.pop()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Current producer cursor. Changes whenever the producer appends data.
    pub fn producer_index(&self) -> u16 {
        self.ring.producer_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn preserves_fifo_order() {
        let mut ring = RingBuffer::<8>::new();
        for byte in b"abc" {
            assert!(ring.enqueue(*byte));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.dequeue(), Some(b'a'));
        assert_eq!(ring.dequeue(), Some(b'b'));
        assert_eq!(ring.dequeue(), Some(b'c'));
        assert_eq!(ring.dequeue(), None);
    }

    #[test]
    fn drops_bytes_when_full() {
        let mut ring = RingBuffer::<4>::new();
        for byte in 0..4 {
            assert!(ring.enqueue(byte));
        }
        assert!(!ring.enqueue(99));
        assert!(ring.is_full());
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.free(), 0);

        let drained: Vec<u8> = core::iter::from_fn(|| ring.dequeue()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn rebases_cursors_when_drained() {
        let mut ring = RingBuffer::<5>::new();
        for round in 0..20u8 {
            assert!(ring.enqueue(round));
            assert!(ring.enqueue(round.wrapping_add(1)));
            assert_eq!(ring.dequeue(), Some(round));
            assert_eq!(ring.dequeue(), Some(round.wrapping_add(1)));
            assert!(ring.producer.load(Ordering::Relaxed) <= 5);
            assert_eq!(
                ring.producer.load(Ordering::Relaxed),
                ring.consumer.load(Ordering::Relaxed)
            );
        }
    }

    #[test]
    fn stream_that_never_drains_keeps_order() {
        let mut ring = RingBuffer::<320>::new();
        assert!(ring.enqueue(0));
        for step in 1..100_000u32 {
            assert!(ring.enqueue(step as u8));
            assert_eq!(ring.dequeue(), Some((step - 1) as u8));
            assert_eq!(ring.len(), 1);
        }
        assert!(!ring.is_full());
    }

    #[test]
    fn matches_model_under_interleaving() {
        let mut ring = RingBuffer::<7>::new();
        let mut model = VecDeque::new();
        let mut seed = 0x1234_5678u32;

        for step in 0..2_000u32 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            if (seed >> 16) % 3 != 0 {
                let byte = step as u8;
                let accepted = ring.enqueue(byte);
                assert_eq!(accepted, model.len() < 7);
                if accepted {
                    model.push_back(byte);
                }
            } else {
                assert_eq!(ring.dequeue(), model.pop_front());
            }
            assert_eq!(ring.len(), model.len());
        }
    }

    #[test]
    fn split_halves_share_the_buffer() {
        let mut ring = RingBuffer::<16>::new();
        let (mut producer, mut consumer) = ring.split();

        let before = consumer.producer_index();
        assert!(producer.enqueue(b'x'));
        assert_ne!(consumer.producer_index(), before);
        assert_eq!(consumer.len(), 1);
        assert_eq!(producer.free(), 15);
        assert_eq!(consumer.dequeue(), Some(b'x'));
        assert!(consumer.is_empty());
    }

    #[test]
    fn concurrent_producer_delivers_everything_in_order() {
        let mut ring = RingBuffer::<32>::new();
        let (mut producer, mut consumer) = ring.split();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                for byte in 0..=255u8 {
                    while !producer.enqueue(byte) {
                        std::thread::yield_now();
                    }
                }
            });

            let mut expected = 0u16;
            while expected <= 255 {
                if let Some(byte) = consumer.dequeue() {
                    assert_eq!(u16::from(byte), expected);
                    expected += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });
    }
}
