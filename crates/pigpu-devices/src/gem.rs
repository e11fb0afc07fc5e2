//! Buffer objects.
//!
//! The device does not own a memory manager. It sees buffer objects through [`BufferObject`] and
//! resolves client handles through a [`BufferObjectTable`]. [`ShmemObjectTable`] is the
//! system-memory backed implementation used by the platform layer and the tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::device::DeviceId;
use crate::error::FramebufferError;

/// Kernel-style mapping of a pinned buffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoMapping {
    /// Address the device uses to reach the object's memory.
    pub vaddr: u64,
    /// The object lives in I/O memory rather than system memory.
    pub is_iomem: bool,
}

pub trait BufferObject: Send + Sync + fmt::Debug {
    /// Device that created the object.
    fn owner(&self) -> DeviceId;

    /// Size of the backing store in bytes.
    fn size(&self) -> usize;

    /// Pins the backing store and maps it. Fails with a negative errno.
    fn vmap(&self) -> Result<BoMapping, i32>;

    /// Releases one pin taken by [`BufferObject::vmap`].
    fn vunmap(&self, map: &BoMapping);

    /// Copies `out.len()` bytes starting at `offset`. Returns `false` if the range is out of
    /// bounds.
    fn read(&self, offset: usize, out: &mut [u8]) -> bool;
}

/// Per-client handle namespace.
pub trait BufferObjectTable {
    fn lookup(&self, handle: u32) -> Option<Arc<dyn BufferObject>>;
}

/// A pinned and mapped buffer object. The pin is released when the guard drops.
#[derive(Debug)]
pub struct PinnedBo {
    handle: u32,
    bo: Arc<dyn BufferObject>,
    map: BoMapping,
}

impl PinnedBo {
    pub fn acquire(handle: u32, bo: Arc<dyn BufferObject>) -> Result<Self, i32> {
        let map = bo.vmap()?;
        trace!(handle, vaddr = format_args!("0x{:x}", map.vaddr), "pinned buffer object");
        Ok(Self { handle, bo, map })
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn vaddr(&self) -> u64 {
        self.map.vaddr
    }

    pub fn is_iomem(&self) -> bool {
        self.map.is_iomem
    }

    pub fn bo(&self) -> &Arc<dyn BufferObject> {
        &self.bo
    }
}

impl Drop for PinnedBo {
    fn drop(&mut self) {
        self.bo.vunmap(&self.map);
        trace!(handle = self.handle, "released buffer object pin");
    }
}

const PAGE_SIZE: u64 = 4096;

/// First synthetic address handed out by [`ShmemObjectTable`]. Above 4 GiB so that both halves of
/// a split address are exercised.
const SHMEM_VADDR_BASE: u64 = 0x1_0000_0000;

/// System-memory buffer object.
pub struct ShmemObject {
    owner: DeviceId,
    vaddr: u64,
    iomem: bool,
    data: Mutex<Vec<u8>>,
    pins: AtomicUsize,
    table_pins: Arc<AtomicUsize>,
    /// Non-zero: the next `vmap` fails with this errno.
    pin_error: AtomicI32,
}

impl fmt::Debug for ShmemObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmemObject")
            .field("owner", &self.owner)
            .field("vaddr", &format_args!("0x{:x}", self.vaddr))
            .field("iomem", &self.iomem)
            .field("size", &self.size())
            .field("pins", &self.pin_count())
            .finish()
    }
}

impl ShmemObject {
    pub fn vaddr(&self) -> u64 {
        self.vaddr
    }

    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }

    fn data(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BufferObject for ShmemObject {
    fn owner(&self) -> DeviceId {
        self.owner
    }

    fn size(&self) -> usize {
        self.data().len()
    }

    fn vmap(&self) -> Result<BoMapping, i32> {
        let err = self.pin_error.load(Ordering::SeqCst);
        if err != 0 {
            return Err(err);
        }
        self.pins.fetch_add(1, Ordering::SeqCst);
        self.table_pins.fetch_add(1, Ordering::SeqCst);
        Ok(BoMapping {
            vaddr: self.vaddr,
            is_iomem: self.iomem,
        })
    }

    fn vunmap(&self, _map: &BoMapping) {
        // Unbalanced unmaps are ignored.
        if self
            .pins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| p.checked_sub(1))
            .is_ok()
        {
            self.table_pins.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn read(&self, offset: usize, out: &mut [u8]) -> bool {
        let data = self.data();
        let Some(end) = offset.checked_add(out.len()) else {
            return false;
        };
        match data.get(offset..end) {
            Some(src) => {
                out.copy_from_slice(src);
                true
            }
            None => false,
        }
    }
}

/// Result of [`ShmemObjectTable::create_dumb`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DumbBuffer {
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

/// Handle table backed by [`ShmemObject`]s.
///
/// Handles start at 1; 0 is never valid.
pub struct ShmemObjectTable {
    owner: DeviceId,
    next_handle: AtomicU32,
    next_vaddr: AtomicU64,
    objects: Mutex<HashMap<u32, Arc<ShmemObject>>>,
    imported: Mutex<HashMap<u32, Arc<dyn BufferObject>>>,
    pins: Arc<AtomicUsize>,
}

impl ShmemObjectTable {
    pub fn new(owner: DeviceId) -> Self {
        Self {
            owner,
            next_handle: AtomicU32::new(1),
            next_vaddr: AtomicU64::new(SHMEM_VADDR_BASE),
            objects: Mutex::new(HashMap::new()),
            imported: Mutex::new(HashMap::new()),
            pins: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn owner(&self) -> DeviceId {
        self.owner
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Arc<ShmemObject>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn imported(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Arc<dyn BufferObject>>> {
        self.imported.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, size: usize, iomem: bool) -> u32 {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let span = (size as u64).div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE;
        let vaddr = self.next_vaddr.fetch_add(span, Ordering::SeqCst);
        let obj = Arc::new(ShmemObject {
            owner: self.owner,
            vaddr,
            iomem,
            data: Mutex::new(vec![0; size]),
            pins: AtomicUsize::new(0),
            table_pins: Arc::clone(&self.pins),
            pin_error: AtomicI32::new(0),
        });
        self.objects().insert(handle, obj);
        handle
    }

    /// Allocates a zeroed system-memory object of `size` bytes.
    pub fn create(&self, size: usize) -> u32 {
        self.insert(size, false)
    }

    /// Allocates an object whose mapping reports I/O memory.
    pub fn create_iomem(&self, size: usize) -> u32 {
        self.insert(size, true)
    }

    /// Allocates a linear buffer for a `width x height` surface at `bpp` bits per pixel.
    ///
    /// The pitch is `width * ceil(bpp / 8)` and the size is rounded up to whole pages.
    pub fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<DumbBuffer, FramebufferError> {
        let invalid = FramebufferError::InvalidSize { width, height };
        if width == 0 || height == 0 || bpp == 0 {
            return Err(invalid);
        }
        let pitch = width.checked_mul(bpp.div_ceil(8)).ok_or(invalid.clone())?;
        let size = u64::from(pitch)
            .checked_mul(u64::from(height))
            .and_then(|s| s.checked_next_multiple_of(PAGE_SIZE))
            .ok_or(invalid.clone())?;
        let len = usize::try_from(size).map_err(|_| invalid)?;
        let handle = self.create(len);
        Ok(DumbBuffer {
            handle,
            pitch,
            size,
        })
    }

    /// Drops the table's reference. Outstanding framebuffers and pins keep the object alive.
    pub fn destroy_dumb(&self, handle: u32) -> bool {
        self.objects().remove(&handle).is_some() || self.imported().remove(&handle).is_some()
    }

    /// Registers an object created elsewhere (e.g. by another device) under a new handle.
    pub fn import(&self, bo: Arc<dyn BufferObject>) -> u32 {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.imported().insert(handle, bo);
        handle
    }

    /// Writes `bytes` at `offset` into the object. Returns `false` if out of bounds.
    pub fn write(&self, handle: u32, offset: usize, bytes: &[u8]) -> bool {
        let Some(obj) = self.objects().get(&handle).cloned() else {
            return false;
        };
        let mut data = obj.data();
        let Some(end) = offset.checked_add(bytes.len()) else {
            return false;
        };
        match data.get_mut(offset..end) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Makes every later pin of `handle` fail with `errno` (0 clears).
    pub fn set_pin_error(&self, handle: u32, errno: i32) -> bool {
        match self.objects().get(&handle) {
            Some(obj) => {
                obj.pin_error.store(errno, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn shmem(&self, handle: u32) -> Option<Arc<ShmemObject>> {
        self.objects().get(&handle).cloned()
    }

    /// Pins currently held on objects created by this table.
    pub fn outstanding_pins(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }
}

impl BufferObjectTable for ShmemObjectTable {
    fn lookup(&self, handle: u32) -> Option<Arc<dyn BufferObject>> {
        if let Some(obj) = self.objects().get(&handle) {
            return Some(Arc::clone(obj) as Arc<dyn BufferObject>);
        }
        self.imported().get(&handle).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumb_buffers_are_page_rounded() {
        let table = ShmemObjectTable::new(DeviceId(1));
        let dumb = table.create_dumb(100, 10, 32).unwrap();
        assert_eq!(dumb.pitch, 400);
        assert_eq!(dumb.size, 4096);
        assert_eq!(table.lookup(dumb.handle).unwrap().size(), 4096);

        let dumb = table.create_dumb(1920, 1080, 16).unwrap();
        assert_eq!(dumb.pitch, 3840);
        assert_eq!(dumb.size, (3840 * 1080u64).next_multiple_of(4096));
        assert_eq!(dumb.size, 4_149_248);

        assert!(table.create_dumb(0, 10, 32).is_err());
    }

    #[test]
    fn pin_guard_balances_pins() {
        let table = ShmemObjectTable::new(DeviceId(1));
        let handle = table.create(64);
        let bo = table.lookup(handle).unwrap();
        {
            let a = PinnedBo::acquire(handle, Arc::clone(&bo)).unwrap();
            let _b = PinnedBo::acquire(handle, Arc::clone(&bo)).unwrap();
            assert_eq!(table.outstanding_pins(), 2);
            assert!(a.vaddr() >= SHMEM_VADDR_BASE);
            assert!(!a.is_iomem());
        }
        assert_eq!(table.outstanding_pins(), 0);
        assert_eq!(table.shmem(handle).unwrap().pin_count(), 0);
    }

    #[test]
    fn injected_pin_error_is_reported() {
        let table = ShmemObjectTable::new(DeviceId(1));
        let handle = table.create(64);
        assert!(table.set_pin_error(handle, -12));
        let bo = table.lookup(handle).unwrap();
        assert_eq!(PinnedBo::acquire(handle, bo).unwrap_err(), -12);
        assert_eq!(table.outstanding_pins(), 0);
    }

    #[test]
    fn writes_are_bounds_checked() {
        let table = ShmemObjectTable::new(DeviceId(1));
        let handle = table.create(8);
        assert!(table.write(handle, 4, &[1, 2, 3, 4]));
        assert!(!table.write(handle, 6, &[1, 2, 3]));
        assert!(!table.write(99, 0, &[0]));

        let mut out = [0u8; 4];
        assert!(table.lookup(handle).unwrap().read(4, &mut out));
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(!table.lookup(handle).unwrap().read(usize::MAX, &mut out));
    }

    #[test]
    fn destroyed_handles_no_longer_resolve() {
        let table = ShmemObjectTable::new(DeviceId(1));
        let handle = table.create(8);
        let held = table.lookup(handle).unwrap();
        assert!(table.destroy_dumb(handle));
        assert!(table.lookup(handle).is_none());
        assert_eq!(held.size(), 8);
    }

    #[test]
    fn imported_objects_keep_their_owner() {
        let other = ShmemObjectTable::new(DeviceId(2));
        let foreign = other.lookup(other.create(8)).unwrap();
        let table = ShmemObjectTable::new(DeviceId(1));
        let handle = table.import(foreign);
        assert_eq!(table.lookup(handle).unwrap().owner(), DeviceId(2));
    }
}
