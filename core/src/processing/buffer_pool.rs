use num_complex::Complex32;
use rustfft::num_traits::Zero;

/// Simple scoped pool of complex work buffers, so evicted streams hand their
/// window and scratch allocations to the next stream that starts.
pub struct BufferPool {
    buffers: Vec<Vec<Complex32>>,
    max_capacity: usize,
}

impl BufferPool {
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(max_capacity),
            max_capacity,
        }
    }

    /// Takes a zeroed buffer of `length` from the pool, allocating when empty.
    pub fn checkout(&mut self, length: usize) -> Vec<Complex32> {
        match self.buffers.pop() {
            Some(mut buffer) => {
                buffer.resize(length, Complex32::zero());
                buffer
            }
            None => vec![Complex32::zero(); length],
        }
    }

    /// Returns a buffer back to the pool for reuse. Buffers beyond the pool
    /// capacity are dropped.
    pub fn release(&mut self, mut buffer: Vec<Complex32>) {
        buffer.clear();
        if self.buffers.len() < self.max_capacity {
            self.buffers.push(buffer);
        }
    }

    pub fn available(&self) -> usize {
        self.buffers.len()
    }

    pub fn reset(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffers_are_reused_and_zeroed() {
        let mut pool = BufferPool::with_capacity(2);
        let mut buffer = pool.checkout(8);
        buffer[3] = Complex32::new(1.0, 2.0);
        let capacity = buffer.capacity();
        pool.release(buffer);
        assert_eq!(pool.available(), 1);

        let reused = pool.checkout(4);
        assert_eq!(reused.len(), 4);
        assert!(reused.capacity() >= capacity.min(4));
        assert!(reused.iter().all(|v| *v == Complex32::zero()));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn pool_never_grows_past_capacity() {
        let mut pool = BufferPool::with_capacity(1);
        pool.release(vec![Complex32::zero(); 4]);
        pool.release(vec![Complex32::zero(); 4]);
        assert_eq!(pool.available(), 1);
        pool.reset();
        assert_eq!(pool.available(), 0);
    }
}
