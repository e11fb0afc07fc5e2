//! Access to client memory.

use crate::error::UserFault;

/// Client address space as seen by the command entry point.
pub trait UserMemory {
    /// Copies `out.len()` bytes from client address `addr`.
    fn copy_from_user(&self, addr: u64, out: &mut [u8]) -> Result<(), UserFault>;
}

/// A single contiguous client mapping starting at `base`.
#[derive(Clone, Debug, Default)]
pub struct VecUserMemory {
    base: u64,
    bytes: Vec<u8>,
}

impl VecUserMemory {
    pub fn new(base: u64, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl UserMemory for VecUserMemory {
    fn copy_from_user(&self, addr: u64, out: &mut [u8]) -> Result<(), UserFault> {
        if out.is_empty() {
            return Ok(());
        }
        let fault = UserFault {
            addr,
            len: out.len(),
        };
        let start = addr
            .checked_sub(self.base)
            .and_then(|off| usize::try_from(off).ok())
            .ok_or(fault)?;
        let end = start.checked_add(out.len()).ok_or(fault)?;
        let src = self.bytes.get(start..end).ok_or(fault)?;
        out.copy_from_slice(src);
        Ok(())
    }
}
