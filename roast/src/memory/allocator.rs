use std::{cell::RefCell, collections::BTreeMap};

use parking_lot::Mutex;

use crate::{AllocationStrategy, MemoryData};

/// how many rejected proposals we accept before giving up on a request
const MAX_PROBES: usize = 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// garbage-collected style storage, objects live here
    Heap,
    /// native/off-heap style storage
    Direct,
}

#[derive(Debug, Clone)]
pub struct MemoryBlock {
    address: u64,
    data: MemoryData,
    kind: BlockKind,
}

impl MemoryBlock {
    pub fn new(address: u64, data: MemoryData, kind: BlockKind) -> Self {
        Self {
            address,
            data,
            kind,
        }
    }

    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    #[inline]
    pub fn data(&self) -> &MemoryData {
        &self.data
    }

    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.data.length() as u64
    }

    #[inline]
    pub fn is_heap(&self) -> bool {
        self.kind == BlockKind::Heap
    }

    /// true if `address` falls inside the reserved span of this block
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.size()
    }
}

/// Owner of the emulated address space.
pub trait MemoryAllocator {
    fn allocate_heap(&self, bytes: usize) -> Option<MemoryBlock>;
    fn allocate_direct(&self, bytes: usize) -> Option<MemoryBlock>;
    /// Grow a direct block, moving its contents. Shrinking is a fault.
    fn reallocate_direct(&self, address: u64, bytes: usize) -> Option<MemoryBlock>;
    fn free_heap(&self, address: u64) -> bool;
    fn free_direct(&self, address: u64) -> bool;
    fn find_heap_block(&self, address: u64) -> Option<MemoryBlock>;
    fn find_direct_block(&self, address: u64) -> Option<MemoryBlock>;
}

#[derive(Debug)]
struct Blocks {
    heap: BTreeMap<u64, MemoryBlock>,
    direct: BTreeMap<u64, MemoryBlock>,
}

impl Blocks {
    fn of(&mut self, kind: BlockKind) -> &mut BTreeMap<u64, MemoryBlock> {
        match kind {
            BlockKind::Heap => &mut self.heap,
            BlockKind::Direct => &mut self.direct,
        }
    }
}

/// Sorted address index per block kind plus a pluggable address strategy.
/// Not thread safe, wrap it in [`SynchronizedMemoryAllocator`] to share it.
pub struct SimpleMemoryAllocator {
    blocks: RefCell<Blocks>,
    strategy: RefCell<Box<dyn AllocationStrategy>>,
    empty_heap: MemoryBlock,
    empty_direct: MemoryBlock,
}

impl SimpleMemoryAllocator {
    pub fn new(strategy: Box<dyn AllocationStrategy>) -> Self {
        Self {
            blocks: RefCell::new(Blocks {
                heap: BTreeMap::new(),
                direct: BTreeMap::new(),
            }),
            strategy: RefCell::new(strategy),
            empty_heap: MemoryBlock::new(0, MemoryData::new(0), BlockKind::Heap),
            empty_direct: MemoryBlock::new(0, MemoryData::new(0), BlockKind::Direct),
        }
    }

    pub fn live_blocks(&self, kind: BlockKind) -> usize {
        self.blocks.borrow_mut().of(kind).len()
    }

    fn collides(map: &BTreeMap<u64, MemoryBlock>, address: u64, size: u64) -> bool {
        if address == 0 {
            return true;
        }
        let Some(end) = address.checked_add(size) else {
            return true;
        };
        // the nearest block starting before our end is the only candidate
        // that can overlap, blocks never overlap each other
        match map.range(..end).next_back() {
            Some((_, block)) => block.address() + block.size() > address,
            None => false,
        }
    }

    fn allocate(&self, bytes: usize, kind: BlockKind) -> Option<MemoryBlock> {
        if bytes == 0 {
            return Some(match kind {
                BlockKind::Heap => self.empty_heap.clone(),
                BlockKind::Direct => self.empty_direct.clone(),
            });
        }
        let size = bytes as u64;
        let mut blocks = self.blocks.borrow_mut();
        let map = blocks.of(kind);
        let mut strategy = self.strategy.borrow_mut();
        for probe in 0..MAX_PROBES {
            let address = strategy.propose(size)?;
            if Self::collides(map, address, size) {
                log::trace!("address {address:#x} rejected on probe {probe}");
                continue;
            }
            let block = MemoryBlock::new(address, MemoryData::new(bytes), kind);
            map.insert(address, block.clone());
            return Some(block);
        }
        log::warn!("address space exhausted allocating {bytes} {kind:?} bytes");
        None
    }

    fn find(&self, address: u64, kind: BlockKind) -> Option<MemoryBlock> {
        let mut blocks = self.blocks.borrow_mut();
        let (_, block) = blocks.of(kind).range(..=address).next_back()?;
        block.contains(address).then(|| block.clone())
    }

    fn free(&self, address: u64, kind: BlockKind) -> bool {
        let mut blocks = self.blocks.borrow_mut();
        let map = blocks.of(kind);
        let Some((&start, block)) = map.range(..=address).next_back() else {
            log::debug!("free of unknown {kind:?} address {address:#x}");
            return false;
        };
        if !block.contains(address) {
            log::debug!("free of unknown {kind:?} address {address:#x}");
            return false;
        }
        map.remove(&start);
        true
    }
}

impl MemoryAllocator for SimpleMemoryAllocator {
    fn allocate_heap(&self, bytes: usize) -> Option<MemoryBlock> {
        self.allocate(bytes, BlockKind::Heap)
    }

    fn allocate_direct(&self, bytes: usize) -> Option<MemoryBlock> {
        self.allocate(bytes, BlockKind::Direct)
    }

    fn reallocate_direct(&self, address: u64, bytes: usize) -> Option<MemoryBlock> {
        let old = self.find(address, BlockKind::Direct)?;
        let old_size = old.data().length();
        assert!(
            bytes >= old_size,
            "segmentation fault: cannot shrink direct block {address:#x} from {old_size} to {bytes} bytes"
        );
        let new = self.allocate(bytes, BlockKind::Direct)?;
        old.data().copy(0, new.data(), 0, old_size);
        self.free(old.address(), BlockKind::Direct);
        Some(new)
    }

    fn free_heap(&self, address: u64) -> bool {
        self.free(address, BlockKind::Heap)
    }

    fn free_direct(&self, address: u64) -> bool {
        self.free(address, BlockKind::Direct)
    }

    fn find_heap_block(&self, address: u64) -> Option<MemoryBlock> {
        self.find(address, BlockKind::Heap)
    }

    fn find_direct_block(&self, address: u64) -> Option<MemoryBlock> {
        self.find(address, BlockKind::Direct)
    }
}

/// Coarse lock around another allocator. Opt-in for embedders that share
/// one address space between threads.
pub struct SynchronizedMemoryAllocator<A> {
    inner: Mutex<A>,
}

impl<A: MemoryAllocator> SynchronizedMemoryAllocator<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// run several operations under one lock acquisition
    pub fn with<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.lock())
    }
}

impl<A: MemoryAllocator> MemoryAllocator for SynchronizedMemoryAllocator<A> {
    fn allocate_heap(&self, bytes: usize) -> Option<MemoryBlock> {
        self.inner.lock().allocate_heap(bytes)
    }

    fn allocate_direct(&self, bytes: usize) -> Option<MemoryBlock> {
        self.inner.lock().allocate_direct(bytes)
    }

    fn reallocate_direct(&self, address: u64, bytes: usize) -> Option<MemoryBlock> {
        self.inner.lock().reallocate_direct(address, bytes)
    }

    fn free_heap(&self, address: u64) -> bool {
        self.inner.lock().free_heap(address)
    }

    fn free_direct(&self, address: u64) -> bool {
        self.inner.lock().free_direct(address)
    }

    fn find_heap_block(&self, address: u64) -> Option<MemoryBlock> {
        self.inner.lock().find_heap_block(address)
    }

    fn find_direct_block(&self, address: u64) -> Option<MemoryBlock> {
        self.inner.lock().find_direct_block(address)
    }
}
