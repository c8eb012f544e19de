//! Seam for moving payload bytes across the user/kernel boundary.
//!
//! The syscall layer supplies implementations backed by its copyin/copyout
//! primitives; the slice impls below serve in-kernel callers and tests.

/// The destination or source memory range was invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFault;

/// Destination for received payload bytes.
pub trait UserSink {
    /// Deliver `bytes` to the caller. Called at most once per datagram.
    fn write(&mut self, bytes: &[u8]) -> Result<(), CopyFault>;
}

/// Source of outbound payload bytes.
pub trait UserSource {
    /// Fill `dst` completely from the caller's memory.
    fn read_into(&mut self, dst: &mut [u8]) -> Result<(), CopyFault>;
}

impl UserSink for &mut [u8] {
    fn write(&mut self, bytes: &[u8]) -> Result<(), CopyFault> {
        if bytes.len() > self.len() {
            return Err(CopyFault);
        }
        self[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl UserSource for &[u8] {
    fn read_into(&mut self, dst: &mut [u8]) -> Result<(), CopyFault> {
        if dst.len() > self.len() {
            return Err(CopyFault);
        }
        dst.copy_from_slice(&self[..dst.len()]);
        Ok(())
    }
}
