use std::{
    alloc::{self, Layout},
    fmt,
    ptr::{self, NonNull},
    sync::{
        Arc, OnceLock,
        atomic::{
            AtomicU8, AtomicU16, AtomicU32, AtomicU64,
            Ordering::SeqCst, fence,
        },
    },
};

/// alignment of every root buffer, so natural alignment inside a buffer
/// only depends on the offset
pub const BUFFER_ALIGN: usize = 8;

/// fills up to this size are done byte by byte
const SET_THRESHOLD: usize = 64;
/// upper bound of a single batch when filling bigger regions
const SET_SCRATCH: usize = 4096;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub const NATIVE: Self = if cfg!(target_endian = "little") {
        Self::Little
    } else {
        Self::Big
    };

    #[inline]
    fn decode<T: Scalar>(self, bytes: &[u8]) -> T {
        let mut buf = [0u8; 8];
        match self {
            Self::Little => {
                buf[..T::SIZE].copy_from_slice(bytes);
                T::from_bits(u64::from_le_bytes(buf))
            }
            Self::Big => {
                buf[8 - T::SIZE..].copy_from_slice(bytes);
                T::from_bits(u64::from_be_bytes(buf))
            }
        }
    }

    #[inline]
    fn encode<T: Scalar>(self, value: T, out: &mut [u8]) {
        let bits = value.to_bits();
        match self {
            Self::Little => out.copy_from_slice(&bits.to_le_bytes()[..T::SIZE]),
            Self::Big => {
                out.copy_from_slice(&bits.to_be_bytes()[8 - T::SIZE..])
            }
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A plain value that can be stored in emulated memory.
/// `to_bits`/`from_bits` go through the raw bit pattern, floats included,
/// so NaN payloads survive a round trip.
pub trait Scalar: Copy + Default + sealed::Sealed {
    const SIZE: usize;
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

macro_rules! scalar {
    ($($ty:ty => $bits:ty),* $(,)?) => {$(
        impl sealed::Sealed for $ty {}
        impl Scalar for $ty {
            const SIZE: usize = size_of::<$ty>();
            #[inline]
            fn to_bits(self) -> u64 {
                self as $bits as u64
            }
            #[inline]
            fn from_bits(bits: u64) -> Self {
                bits as $bits as $ty
            }
        }
    )*};
}

scalar!(
    u8 => u8, i8 => u8,
    u16 => u16, i16 => u16,
    u32 => u32, i32 => u32,
    u64 => u64, i64 => u64,
);

impl sealed::Sealed for f32 {}
impl Scalar for f32 {
    const SIZE: usize = 4;
    #[inline]
    fn to_bits(self) -> u64 {
        f32::to_bits(self) as u64
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        f32::from_bits(bits as u32)
    }
}

impl sealed::Sealed for f64 {}
impl Scalar for f64 {
    const SIZE: usize = 8;
    #[inline]
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }
    #[inline]
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }
}

/// Raw out-of-range access. This is a violated host invariant, the operation
/// layer checks guest-visible bounds before it ever gets here.
#[cold]
#[track_caller]
fn segfault(offset: usize, bytes: usize, length: usize) -> ! {
    panic!(
        "segmentation fault: {bytes} bytes at offset {offset} in a region of {length} bytes"
    )
}

struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is plain bytes, synchronization is the guest's business
// exactly like real memory
unsafe impl Send for Buffer {}
// SAFETY: see above
unsafe impl Sync for Buffer {}

impl Buffer {
    fn zeroed(len: usize) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len,
            };
        }
        let Ok(layout) = Layout::from_size_align(len, BUFFER_ALIGN) else {
            segfault(0, len, isize::MAX as usize)
        };
        // SAFETY: layout has a non zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout)
        };
        Self { ptr, len }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: allocated in `zeroed` with exactly this layout
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len, BUFFER_ALIGN);
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

/// Byte addressable view over a backing store. Either a root buffer or a
/// slice of one; slices share storage with their parent.
///
/// All accessors take `&self`: the view behaves like raw memory that several
/// owners may read and write.
pub struct MemoryData {
    buffer: Arc<Buffer>,
    offset: usize,
    length: usize,
    order: ByteOrder,
    volatile: OnceLock<VolatileAccess>,
}

impl fmt::Debug for MemoryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryData")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("order", &self.order)
            .finish()
    }
}

impl Clone for MemoryData {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            offset: self.offset,
            length: self.length,
            order: self.order,
            volatile: OnceLock::new(),
        }
    }
}

impl MemoryData {
    /// zero filled root buffer in native byte order
    pub fn new(length: usize) -> Self {
        Self::with_byte_order(length, ByteOrder::NATIVE)
    }

    pub fn with_byte_order(length: usize, order: ByteOrder) -> Self {
        Self {
            buffer: Arc::new(Buffer::zeroed(length)),
            offset: 0,
            length,
            order,
            volatile: OnceLock::new(),
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// same bytes, interpreted in another byte order
    pub fn reordered(&self, order: ByteOrder) -> Self {
        Self {
            order,
            ..self.clone()
        }
    }

    pub fn shares_storage_with(&self, other: &MemoryData) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        // SAFETY: offset is within the buffer by construction
        unsafe { self.buffer.ptr.as_ptr().add(self.offset) }
    }

    #[inline]
    #[track_caller]
    fn address_of(&self, offset: usize, bytes: usize) -> *mut u8 {
        match offset.checked_add(bytes) {
            Some(end) if end <= self.length => {
                // SAFETY: in bounds of this view, hence of the buffer
                unsafe { self.base().add(offset) }
            }
            _ => segfault(offset, bytes, self.length),
        }
    }

    #[inline]
    #[track_caller]
    pub fn read<T: Scalar>(&self, offset: usize) -> T {
        let src = self.address_of(offset, T::SIZE);
        let mut bytes = [0u8; 8];
        // SAFETY: bounds checked above
        unsafe { ptr::copy_nonoverlapping(src, bytes.as_mut_ptr(), T::SIZE) };
        self.order.decode(&bytes[..T::SIZE])
    }

    #[inline]
    #[track_caller]
    pub fn write<T: Scalar>(&self, offset: usize, value: T) {
        let dst = self.address_of(offset, T::SIZE);
        let mut bytes = [0u8; 8];
        self.order.encode(value, &mut bytes[..T::SIZE]);
        // SAFETY: bounds checked above
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dst, T::SIZE) };
    }

    /// Volatile accessors for this view, created on first use.
    pub fn volatile(&self) -> &VolatileAccess {
        self.volatile.get_or_init(|| VolatileAccess {
            // SAFETY: base is never null, dangling only for empty buffers
            base: unsafe { NonNull::new_unchecked(self.base()) },
            length: self.length,
            order: self.order,
            _storage: self.buffer.clone(),
        })
    }

    /// Fill `bytes` bytes at `offset` with `value`.
    #[track_caller]
    pub fn set(&self, offset: usize, bytes: usize, value: u8) {
        let dst = self.address_of(offset, bytes);
        if bytes <= SET_THRESHOLD {
            for i in 0..bytes {
                // SAFETY: within the checked range
                unsafe { dst.add(i).write(value) };
            }
            return;
        }
        let scratch = [value; SET_SCRATCH];
        let mut done = 0;
        while done < bytes {
            let batch = (bytes - done).min(SET_SCRATCH);
            // SAFETY: within the checked range, scratch is a distinct buffer
            unsafe {
                ptr::copy_nonoverlapping(scratch.as_ptr(), dst.add(done), batch)
            };
            done += batch;
        }
    }

    /// Copy `bytes` bytes from this view into `dst`. Overlapping ranges of a
    /// shared buffer behave like `memmove`. Bytes carry no order, so this is
    /// always a store-to-store copy.
    #[track_caller]
    pub fn copy(
        &self,
        src_offset: usize,
        dst: &MemoryData,
        dst_offset: usize,
        bytes: usize,
    ) {
        let src = self.address_of(src_offset, bytes);
        let target = dst.address_of(dst_offset, bytes);
        // SAFETY: both ranges are checked, `ptr::copy` allows overlap
        unsafe { ptr::copy(src, target, bytes) };
    }

    /// Copy `count` elements of `T` into `dst`. Views sharing a byte order
    /// take the store-to-store path of [`MemoryData::copy`]; otherwise each
    /// element is decoded in this view's order and encoded in `dst`'s.
    #[track_caller]
    pub fn copy_elements<T: Scalar>(
        &self,
        src_offset: usize,
        dst: &MemoryData,
        dst_offset: usize,
        count: usize,
    ) {
        let Some(bytes) = count.checked_mul(T::SIZE) else {
            segfault(src_offset, usize::MAX, self.length)
        };
        if self.order == dst.order {
            self.copy(src_offset, dst, dst_offset, bytes);
            return;
        }
        let mut elements = vec![T::default(); count];
        self.read_array(src_offset, &mut elements);
        dst.write_array(dst_offset, &elements);
    }

    /// Export the whole view into the start of `other`.
    #[track_caller]
    pub fn transfer_to(&self, other: &MemoryData) {
        self.copy(0, other, 0, self.length);
    }

    /// Zero-copy view of `bytes` bytes starting at `offset`.
    #[track_caller]
    pub fn slice(&self, offset: usize, bytes: usize) -> MemoryData {
        self.address_of(offset, bytes);
        Self {
            buffer: self.buffer.clone(),
            offset: self.offset + offset,
            length: bytes,
            order: self.order,
            volatile: OnceLock::new(),
        }
    }

    /// Bulk store of a primitive array. Native order views take a single
    /// copy, others are written element by element.
    #[track_caller]
    pub fn write_array<T: Scalar>(&self, offset: usize, values: &[T]) {
        let Some(bytes) = values.len().checked_mul(T::SIZE) else {
            segfault(offset, usize::MAX, self.length)
        };
        let dst = self.address_of(offset, bytes);
        if self.order == ByteOrder::NATIVE {
            // SAFETY: scalars are plain data in native order, range checked
            unsafe {
                ptr::copy_nonoverlapping(values.as_ptr().cast::<u8>(), dst, bytes)
            };
            return;
        }
        for (i, value) in values.iter().enumerate() {
            self.write(offset + i * T::SIZE, *value);
        }
    }

    /// Bulk load into a primitive array, see [`MemoryData::write_array`].
    #[track_caller]
    pub fn read_array<T: Scalar>(&self, offset: usize, out: &mut [T]) {
        let Some(bytes) = out.len().checked_mul(T::SIZE) else {
            segfault(offset, usize::MAX, self.length)
        };
        let src = self.address_of(offset, bytes);
        if self.order == ByteOrder::NATIVE {
            // SAFETY: any bit pattern is a valid scalar, range checked
            unsafe {
                ptr::copy_nonoverlapping(src, out.as_mut_ptr().cast::<u8>(), bytes)
            };
            return;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.read(offset + i * T::SIZE);
        }
    }

    /// References are stored as 64-bit heap addresses.
    #[track_caller]
    pub fn write_references(&self, offset: usize, addresses: &[u64]) {
        self.write_array(offset, addresses);
    }

    #[track_caller]
    pub fn read_references(&self, offset: usize, out: &mut [u64]) {
        self.read_array(offset, out);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.length];
        self.read_array(0, &mut out);
        out
    }
}

macro_rules! typed_accessors {
    ($($ty:ty: $read:ident, $write:ident, $read_volatile:ident, $write_volatile:ident;)*) => {
        impl MemoryData {
            $(
                #[inline]
                #[track_caller]
                pub fn $read(&self, offset: usize) -> $ty {
                    self.read::<$ty>(offset)
                }

                #[inline]
                #[track_caller]
                pub fn $write(&self, offset: usize, value: $ty) {
                    self.write::<$ty>(offset, value)
                }

                #[inline]
                #[track_caller]
                pub fn $read_volatile(&self, offset: usize) -> $ty {
                    self.volatile().read::<$ty>(offset)
                }

                #[inline]
                #[track_caller]
                pub fn $write_volatile(&self, offset: usize, value: $ty) {
                    self.volatile().write::<$ty>(offset, value)
                }
            )*
        }
    };
}

typed_accessors! {
    i8: read_byte, write_byte, read_byte_volatile, write_byte_volatile;
    u16: read_char, write_char, read_char_volatile, write_char_volatile;
    i16: read_short, write_short, read_short_volatile, write_short_volatile;
    i32: read_int, write_int, read_int_volatile, write_int_volatile;
    i64: read_long, write_long, read_long_volatile, write_long_volatile;
    f32: read_float, write_float, read_float_volatile, write_float_volatile;
    f64: read_double, write_double, read_double_volatile, write_double_volatile;
}

/// Sequentially consistent accessors over the same bytes as their view.
/// Aligned native-order accesses are real atomics, everything else is a
/// volatile byte access fenced on both sides.
pub struct VolatileAccess {
    base: NonNull<u8>,
    length: usize,
    order: ByteOrder,
    _storage: Arc<Buffer>,
}

// SAFETY: only touches the buffer it keeps alive through `_storage`
unsafe impl Send for VolatileAccess {}
// SAFETY: see above
unsafe impl Sync for VolatileAccess {}

impl VolatileAccess {
    #[inline]
    #[track_caller]
    fn address_of(&self, offset: usize, bytes: usize) -> *mut u8 {
        match offset.checked_add(bytes) {
            // SAFETY: in bounds of the owning view
            Some(end) if end <= self.length => unsafe { self.base.as_ptr().add(offset) },
            _ => segfault(offset, bytes, self.length),
        }
    }

    #[inline]
    fn atomic(&self, ptr: *mut u8, size: usize) -> bool {
        self.order == ByteOrder::NATIVE && (ptr as usize) % size == 0
    }

    #[track_caller]
    pub fn read<T: Scalar>(&self, offset: usize) -> T {
        let ptr = self.address_of(offset, T::SIZE);
        if self.atomic(ptr, T::SIZE) {
            // SAFETY: aligned, in bounds and alive for the duration of the call
            let bits = unsafe {
                match T::SIZE {
                    1 => AtomicU8::from_ptr(ptr).load(SeqCst) as u64,
                    2 => AtomicU16::from_ptr(ptr.cast()).load(SeqCst) as u64,
                    4 => AtomicU32::from_ptr(ptr.cast()).load(SeqCst) as u64,
                    _ => AtomicU64::from_ptr(ptr.cast()).load(SeqCst),
                }
            };
            return T::from_bits(bits);
        }
        let mut bytes = [0u8; 8];
        fence(SeqCst);
        for (i, byte) in bytes[..T::SIZE].iter_mut().enumerate() {
            // SAFETY: within the checked range
            *byte = unsafe { ptr::read_volatile(ptr.add(i)) };
        }
        fence(SeqCst);
        self.order.decode(&bytes[..T::SIZE])
    }

    #[track_caller]
    pub fn write<T: Scalar>(&self, offset: usize, value: T) {
        let ptr = self.address_of(offset, T::SIZE);
        if self.atomic(ptr, T::SIZE) {
            let bits = value.to_bits();
            // SAFETY: aligned, in bounds and alive for the duration of the call
            unsafe {
                match T::SIZE {
                    1 => AtomicU8::from_ptr(ptr).store(bits as u8, SeqCst),
                    2 => AtomicU16::from_ptr(ptr.cast()).store(bits as u16, SeqCst),
                    4 => AtomicU32::from_ptr(ptr.cast()).store(bits as u32, SeqCst),
                    _ => AtomicU64::from_ptr(ptr.cast()).store(bits, SeqCst),
                }
            }
            return;
        }
        let mut bytes = [0u8; 8];
        self.order.encode(value, &mut bytes[..T::SIZE]);
        fence(SeqCst);
        for (i, byte) in bytes[..T::SIZE].iter().enumerate() {
            // SAFETY: within the checked range
            unsafe { ptr::write_volatile(ptr.add(i), *byte) };
        }
        fence(SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_round_trip_every_width() {
        let data = MemoryData::new(32);
        data.write_byte(0, -5);
        data.write_char(1, 0xBEEF);
        data.write_short(3, -12345);
        data.write_int(5, 0x7eadbeef);
        data.write_long(9, i64::MIN + 3);
        data.write_float(17, 1.5);
        data.write_double(21, -0.25);

        assert_eq!(data.read_byte(0), -5);
        assert_eq!(data.read_char(1), 0xBEEF);
        assert_eq!(data.read_short(3), -12345);
        assert_eq!(data.read_int(5), 0x7eadbeef);
        assert_eq!(data.read_long(9), i64::MIN + 3);
        assert_eq!(data.read_float(17), 1.5);
        assert_eq!(data.read_double(21), -0.25);
    }

    #[test]
    fn volatile_round_trip_aligned_and_unaligned() {
        let data = MemoryData::new(64);
        data.write_long_volatile(8, 0x0102030405060708);
        data.write_long_volatile(17, -2);
        data.write_int_volatile(32, -7);
        data.write_char_volatile(37, 0xFFFE);

        assert_eq!(data.read_long_volatile(8), 0x0102030405060708);
        assert_eq!(data.read_long(8), 0x0102030405060708);
        assert_eq!(data.read_long_volatile(17), -2);
        assert_eq!(data.read_int_volatile(32), -7);
        assert_eq!(data.read_char_volatile(37), 0xFFFE);
        assert_eq!(data.read_char(37), 0xFFFE);
    }

    #[test]
    fn nan_payloads_survive() {
        let data = MemoryData::new(16);
        let float = f32::from_bits(0x7fc0_1234);
        let double = f64::from_bits(0x7ff8_dead_beef_0001);
        data.write_float(0, float);
        data.write_double(8, double);
        assert_eq!(data.read_float(0).to_bits(), 0x7fc0_1234);
        assert_eq!(data.read_double(8).to_bits(), 0x7ff8_dead_beef_0001);
        assert_eq!(data.read_double_volatile(8).to_bits(), 0x7ff8_dead_beef_0001);
    }

    #[test]
    fn big_endian_views_store_big_endian_bytes() {
        let data = MemoryData::with_byte_order(8, ByteOrder::Big);
        data.write_int(0, 0x01020304);
        assert_eq!(&data.to_vec()[..4], &[1, 2, 3, 4]);

        let little = data.reordered(ByteOrder::Little);
        assert_eq!(little.read_int(0), 0x04030201);
    }

    #[test]
    fn slice_shares_storage_and_rebases() {
        let data = MemoryData::new(64);
        data.write_long(0, 0x1122334455667788);
        let slice = data.slice(0, 8);
        assert_eq!(slice.read_long(0), 0x1122334455667788);

        let inner = data.slice(16, 16).slice(4, 8);
        inner.write_int(0, 42);
        assert_eq!(data.read_int(20), 42);
        assert!(inner.shares_storage_with(&data));
    }

    #[test]
    fn set_small_and_batched() {
        let data = MemoryData::new(10_000);
        data.set(3, 10, 0xAB);
        assert_eq!(data.read::<u8>(2), 0);
        assert_eq!(data.read::<u8>(3), 0xAB);
        assert_eq!(data.read::<u8>(12), 0xAB);
        assert_eq!(data.read::<u8>(13), 0);

        data.set(100, 9000, 7);
        assert!(data.to_vec()[100..9100].iter().all(|&b| b == 7));
        assert_eq!(data.read::<u8>(9100), 0);
    }

    #[test]
    fn element_copy_converts_between_orders() {
        let big = MemoryData::with_byte_order(8, ByteOrder::Big);
        big.write_short(0, 0x0102);
        big.write_short(2, -2);
        let little = MemoryData::with_byte_order(8, ByteOrder::Little);
        big.copy_elements::<i16>(0, &little, 4, 2);
        assert_eq!(little.read_short(4), 0x0102);
        assert_eq!(little.read_short(6), -2);
        assert_eq!(&little.to_vec()[4..8], &[0x02, 0x01, 0xfe, 0xff]);

        // same order degrades to a plain byte copy, overlap included
        big.copy_elements::<i16>(0, &big, 2, 2);
        assert_eq!(big.read_short(2), 0x0102);
        assert_eq!(big.read_short(4), -2);
    }

    #[test]
    fn copy_handles_overlap() {
        let data = MemoryData::new(16);
        data.write_array::<u8>(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        data.copy(0, &data, 2, 8);
        assert_eq!(&data.to_vec()[..10], &[1, 2, 1, 2, 3, 4, 5, 6, 7, 8]);

        let other = MemoryData::new(4);
        data.slice(4, 4).transfer_to(&other);
        assert_eq!(other.to_vec(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn bulk_arrays_in_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let data = MemoryData::with_byte_order(64, order);
            data.write_array::<i32>(4, &[1, -2, 3]);
            data.write_array::<f64>(16, &[0.5, f64::MAX]);
            data.write_references(40, &[0xdead, 0xbeef]);

            let mut ints = [0i32; 3];
            data.read_array(4, &mut ints);
            assert_eq!(ints, [1, -2, 3]);
            assert_eq!(data.read_int(8), -2);

            let mut doubles = [0f64; 2];
            data.read_array(16, &mut doubles);
            assert_eq!(doubles, [0.5, f64::MAX]);

            let mut refs = [0u64; 2];
            data.read_references(40, &mut refs);
            assert_eq!(refs, [0xdead, 0xbeef]);
        }
    }

    #[test]
    #[should_panic(expected = "segmentation fault")]
    fn out_of_range_read_faults() {
        let data = MemoryData::new(8);
        data.read_long(1);
    }

    #[test]
    #[should_panic(expected = "segmentation fault")]
    fn slice_past_end_faults() {
        let data = MemoryData::new(8);
        data.slice(4, 8);
    }

    #[test]
    fn empty_views_are_usable() {
        let data = MemoryData::new(0);
        assert_eq!(data.length(), 0);
        data.set(0, 0, 1);
        assert!(data.slice(0, 0).to_vec().is_empty());
    }
}
