mod allocator;
mod data;
mod strategy;

pub use allocator::{
    BlockKind, MemoryAllocator, MemoryBlock, SimpleMemoryAllocator,
    SynchronizedMemoryAllocator,
};
pub use data::{BUFFER_ALIGN, ByteOrder, MemoryData, Scalar, VolatileAccess};
pub use strategy::{AllocationStrategy, BumpArena, RandomProbe};
