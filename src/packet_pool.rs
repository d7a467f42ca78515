//! Admission control for response buffers.
use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

struct State<const N: usize> {
    free: [bool; N],
}

impl<const N: usize> State<N> {
    const fn new() -> Self {
        Self { free: [true; N] }
    }

    fn alloc(&mut self) -> Option<usize> {
        for (idx, free) in self.free.iter_mut().enumerate() {
            if *free {
                *free = false;
                return Some(idx);
            }
        }
        None
    }

    fn free(&mut self, idx: usize) {
        self.free[idx] = true;
    }

    fn available(&self) -> usize {
        self.free.iter().filter(|f| **f).count()
    }
}

/// Counts the response buffers in flight and refuses more than `N` at a time.
///
/// The pool owns no storage. Each [`Packet`] carries its own `MTU` byte buffer, and
/// its slot is released when the packet is dropped.
pub struct PacketPool<M: RawMutex, const MTU: usize, const N: usize> {
    state: Mutex<M, RefCell<State<N>>>,
}

impl<M: RawMutex, const MTU: usize, const N: usize> Default for PacketPool<M, MTU, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex, const MTU: usize, const N: usize> PacketPool<M, MTU, N> {
    /// Create a new packet pool with all buffers free.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State::new())),
        }
    }

    /// Take a zeroed buffer from the pool, `None` if all are in use.
    pub fn alloc(&self) -> Option<Packet<'_, M, MTU, N>> {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.alloc().map(|idx| Packet {
                idx,
                buf: [0; MTU],
                pool: self,
            })
        })
    }

    fn free(&self, idx: usize) {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            state.free(idx);
        });
    }

    /// Number of buffers that can currently be allocated.
    pub fn available(&self) -> usize {
        self.state.lock(|state| state.borrow().available())
    }
}

/// A buffer taken from a [`PacketPool`].
pub struct Packet<'d, M: RawMutex, const MTU: usize, const N: usize> {
    idx: usize,
    buf: [u8; MTU],
    pool: &'d PacketPool<M, MTU, N>,
}

impl<'d, M: RawMutex, const MTU: usize, const N: usize> Drop for Packet<'d, M, MTU, N> {
    fn drop(&mut self) {
        self.pool.free(self.idx);
    }
}

impl<'d, M: RawMutex, const MTU: usize, const N: usize> AsRef<[u8]> for Packet<'d, M, MTU, N> {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..]
    }
}

impl<'d, M: RawMutex, const MTU: usize, const N: usize> AsMut<[u8]> for Packet<'d, M, MTU, N> {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    use super::*;

    #[test]
    fn exhausted_pool_returns_none() {
        let pool: PacketPool<NoopRawMutex, 4, 3> = PacketPool::new();

        let a1 = pool.alloc();
        assert!(a1.is_some());
        let a2 = pool.alloc();
        assert!(a2.is_some());
        let a3 = pool.alloc();
        assert!(a3.is_some());
        assert_eq!(pool.available(), 0);

        let b1 = pool.alloc();
        assert!(b1.is_none());
    }

    #[test]
    fn dropped_packet_is_reused() {
        let pool: PacketPool<NoopRawMutex, 4, 1> = PacketPool::new();

        let mut p = pool.alloc().unwrap();
        p.as_mut()[0] = 0xff;
        assert!(pool.alloc().is_none());
        drop(p);

        assert_eq!(pool.available(), 1);
        let p = pool.alloc().unwrap();
        assert_eq!(p.as_ref(), &[0, 0, 0, 0]);
    }
}
