use rand::{Rng, SeedableRng, rngs::StdRng};

/// Proposes candidate addresses for new blocks. The allocator rejects
/// candidates that collide with live blocks and asks again.
pub trait AllocationStrategy: Send {
    /// `None` means the strategy has nothing left to offer.
    fn propose(&mut self, size: u64) -> Option<u64>;
}

/// Uniformly random 64-bit addresses.
#[derive(Debug)]
pub struct RandomProbe {
    rng: StdRng,
}

impl RandomProbe {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// reproducible address sequence, mostly for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationStrategy for RandomProbe {
    fn propose(&mut self, _size: u64) -> Option<u64> {
        Some(self.rng.random::<u64>())
    }
}

/// Monotonic arena: every block starts after the previous one, aligned.
/// Freed space is never handed out again.
#[derive(Debug)]
pub struct BumpArena {
    cursor: u64,
    align: u64,
}

impl BumpArena {
    pub const DEFAULT_BASE: u64 = 0x1000;

    pub fn new(base: u64, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self {
            cursor: base.max(1),
            align,
        }
    }
}

impl Default for BumpArena {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, 8)
    }
}

impl AllocationStrategy for BumpArena {
    fn propose(&mut self, size: u64) -> Option<u64> {
        let start = self.cursor.checked_add(self.align - 1)? & !(self.align - 1);
        self.cursor = start.checked_add(size)?;
        Some(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_probes_repeat() {
        let mut a = RandomProbe::seeded(7);
        let mut b = RandomProbe::seeded(7);
        for _ in 0..16 {
            assert_eq!(a.propose(8), b.propose(8));
        }
    }

    #[test]
    fn bump_is_aligned_and_disjoint() {
        let mut arena = BumpArena::new(0x1001, 8);
        let first = arena.propose(13).unwrap();
        let second = arena.propose(4).unwrap();
        assert_eq!(first, 0x1008);
        assert_eq!(second % 8, 0);
        assert!(second >= first + 13);
    }

    #[test]
    fn bump_reports_exhaustion() {
        let mut arena = BumpArena::new(u64::MAX - 16, 8);
        assert!(arena.propose(64).is_none());
    }
}
