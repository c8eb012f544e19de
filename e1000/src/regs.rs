//! Register map of the 82540EM.
//!
//! Byte offsets into the memory-mapped register window and the bit
//! constants this driver programs ([E1000 13.4]). Registers the driver
//! never touches are not listed.

/// Device Control.
pub const CTRL: usize = 0x0000;
/// Device Status.
pub const STATUS: usize = 0x0008;
/// Interrupt Cause Read.
pub const ICR: usize = 0x00C0;
/// Interrupt Mask Set/Read.
pub const IMS: usize = 0x00D0;
/// Receive Control.
pub const RCTL: usize = 0x0100;
/// Transmit Control.
pub const TCTL: usize = 0x0400;
/// Transmit Inter-Packet Gap.
pub const TIPG: usize = 0x0410;
/// RX Descriptor Base Address, low half.
pub const RDBAL: usize = 0x2800;
/// RX Descriptor Base Address, high half.
pub const RDBAH: usize = 0x2804;
/// RX Descriptor ring byte length.
pub const RDLEN: usize = 0x2808;
/// RX Descriptor Head.
pub const RDH: usize = 0x2810;
/// RX Descriptor Tail.
pub const RDT: usize = 0x2818;
/// RX Interrupt Delay Timer.
pub const RDTR: usize = 0x2820;
/// RX Interrupt Absolute Delay Timer.
pub const RADV: usize = 0x282C;
/// TX Descriptor Base Address, low half.
pub const TDBAL: usize = 0x3800;
/// TX Descriptor Base Address, high half.
pub const TDBAH: usize = 0x3804;
/// TX Descriptor ring byte length.
pub const TDLEN: usize = 0x3808;
/// TX Descriptor Head.
pub const TDH: usize = 0x3810;
/// TX Descriptor Tail.
pub const TDT: usize = 0x3818;
/// Multicast Table Array (128 u32 entries).
pub const MTA: usize = 0x5200;
/// Receive Address 0, low half (filter MAC bytes 0-3).
pub const RAL0: usize = 0x5400;
/// Receive Address 0, high half (filter MAC bytes 4-5 + valid bit).
pub const RAH0: usize = 0x5404;

/// CTRL: device reset.
pub const CTRL_RST: u32 = 1 << 26;

/// RCTL: receiver enable.
pub const RCTL_EN: u32 = 1 << 1;
/// RCTL: accept broadcast.
pub const RCTL_BAM: u32 = 1 << 15;
/// RCTL: 2048-byte receive buffers (BSIZE bits 16-17 = 00).
pub const RCTL_BSIZE_2048: u32 = 0;
/// RCTL: strip Ethernet CRC on receive.
pub const RCTL_SECRC: u32 = 1 << 26;

/// TCTL: transmitter enable.
pub const TCTL_EN: u32 = 1 << 1;
/// TCTL: pad short packets.
pub const TCTL_PSP: u32 = 1 << 3;
/// TCTL: collision threshold field shift.
pub const TCTL_CT_SHIFT: u32 = 4;
/// TCTL: collision distance field shift.
pub const TCTL_COLD_SHIFT: u32 = 12;

/// RAH: receive address valid.
pub const RAH_AV: u32 = 1 << 31;

/// IMS: receive descriptor write-back.
pub const IMS_RXDW: u32 = 1 << 7;

/// Register access seam between ring logic and the hardware.
///
/// Methods take `&self`: register I/O has interior mutability at the
/// device, and the transmit and receive paths hold different locks while
/// touching disjoint registers.
pub trait DeviceRegs: Send + Sync {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);
}

/// Memory-mapped register window.
pub struct Mmio {
    base: *mut u32,
}

impl Mmio {
    /// # Safety
    ///
    /// `base` must point at the controller's mapped register window and
    /// remain valid (and uncached) for the life of the driver.
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }
}

impl DeviceRegs for Mmio {
    fn read(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile(self.base.byte_add(offset)) }
    }

    fn write(&self, offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile(self.base.byte_add(offset), value) }
    }
}

// The window is a fixed hardware resource; concurrent access is governed by
// the driver's locks, not by the pointer.
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}
