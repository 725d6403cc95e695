//! Guest memory and IPC request plumbing.
//!
//! ES never owns the emulated address space. It reads arguments from and
//! writes results to guest memory through the [`GuestMemory`] trait, and
//! receives its requests as [`IoctlvRequest`]s decoded from an IPC command
//! buffer.
//!
//! ## Ioctlv command buffer
//! ```text
//! [0x00] Command           (u32 BE)
//! [0x04] Result            (u32 BE)
//! [0x08] Fd                (u32 BE)
//! [0x0C] Request           (u32 BE)  ioctlv selector
//! [0x10] InCount           (u32 BE)
//! [0x14] IoCount           (u32 BE)
//! [0x18] VectorTable       (u32 BE)  guest pointer
//! ```
//!
//! The vector table holds `InCount + IoCount` entries of `{address, size}`
//! (two big-endian `u32`s); input vectors come first.

use crate::{Error, Result};

/// Access to emulated guest memory.
///
/// All multi-byte values are big-endian, as on the PowerPC.
pub trait GuestMemory {
    /// Whether `[address, address + size)` is backed by memory.
    fn is_valid_range(&self, address: u32, size: u32) -> bool;

    /// Copy `buf.len()` bytes out of guest memory.
    fn copy_from_emu(&self, buf: &mut [u8], address: u32) -> Result<()>;

    /// Copy `data` into guest memory.
    fn copy_to_emu(&mut self, address: u32, data: &[u8]) -> Result<()>;

    fn read_u16(&self, address: u32) -> Result<u16> {
        let mut b = [0u8; 2];
        self.copy_from_emu(&mut b, address)?;
        Ok(u16::from_be_bytes(b))
    }

    fn read_u32(&self, address: u32) -> Result<u32> {
        let mut b = [0u8; 4];
        self.copy_from_emu(&mut b, address)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_u64(&self, address: u32) -> Result<u64> {
        let mut b = [0u8; 8];
        self.copy_from_emu(&mut b, address)?;
        Ok(u64::from_be_bytes(b))
    }

    /// Read `size` bytes into a new `Vec`.
    fn read_bytes(&self, address: u32, size: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        self.copy_from_emu(&mut buf, address)?;
        Ok(buf)
    }

    fn write_u32(&mut self, address: u32, value: u32) -> Result<()> {
        self.copy_to_emu(address, &value.to_be_bytes())
    }

    fn write_u64(&mut self, address: u32, value: u64) -> Result<()> {
        self.copy_to_emu(address, &value.to_be_bytes())
    }

    /// Fill `size` bytes at `address` with `value`.
    fn memset(&mut self, address: u32, value: u8, size: u32) -> Result<()> {
        self.copy_to_emu(address, &vec![value; size as usize])
    }
}

/// A flat block of guest memory starting at `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ram {
    base: u32,
    bytes: Vec<u8>,
}

impl Ram {
    /// Zeroed memory covering `[base, base + size)`.
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn range(&self, address: u32, size: usize) -> Result<std::ops::Range<usize>> {
        let start = address
            .checked_sub(self.base)
            .map(|offset| offset as usize)
            .filter(|&start| start.checked_add(size).is_some_and(|end| end <= self.bytes.len()))
            .ok_or(Error::InvalidAddress {
                address,
                size: size as u32,
            })?;
        Ok(start..start + size)
    }
}

impl GuestMemory for Ram {
    fn is_valid_range(&self, address: u32, size: u32) -> bool {
        address != 0 && self.range(address, size as usize).is_ok()
    }

    fn copy_from_emu(&self, buf: &mut [u8], address: u32) -> Result<()> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn copy_to_emu(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let range = self.range(address, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

/// One ioctlv buffer descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoVector {
    pub address: u32,
    pub size: u32,
}

impl IoVector {
    pub fn new(address: u32, size: u32) -> Self {
        Self { address, size }
    }

    /// A vector is usable when it is empty or points somewhere.
    pub fn is_valid(&self) -> bool {
        self.size == 0 || self.address != 0
    }
}

/// A decoded ioctlv request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoctlvRequest {
    /// Guest address of the IPC command buffer.
    pub address: u32,
    /// Ioctlv selector.
    pub request: u32,
    pub in_vectors: Vec<IoVector>,
    pub io_vectors: Vec<IoVector>,
}

impl IoctlvRequest {
    /// Decode the ioctlv command buffer at `address`.
    ///
    /// Buffers or vector tables that would run past the end of the address
    /// space fail with [`Error::InvalidAddress`].
    pub fn read_from(memory: &dyn GuestMemory, address: u32) -> Result<Self> {
        let field = |offset: u32| memory.read_u32(offset_address(address, offset)?);
        let request = field(0x0C)?;
        let in_count = field(0x10)?;
        let io_count = field(0x14)?;
        let mut table = field(0x18)?;

        let mut read_vectors = |count: u32| -> Result<Vec<IoVector>> {
            (0..count)
                .map(|_| {
                    let vector = IoVector::new(
                        memory.read_u32(table)?,
                        memory.read_u32(offset_address(table, 4)?)?,
                    );
                    table = offset_address(table, 8)?;
                    Ok(vector)
                })
                .collect()
        };
        let in_vectors = read_vectors(in_count)?;
        let io_vectors = read_vectors(io_count)?;

        Ok(Self {
            address,
            request,
            in_vectors,
            io_vectors,
        })
    }

    /// Whether the request carries exactly `in_count` input and `io_count`
    /// output vectors, all of them usable.
    pub fn has_number_of_valid_vectors(&self, in_count: usize, io_count: usize) -> bool {
        self.in_vectors.len() == in_count
            && self.io_vectors.len() == io_count
            && self.in_vectors.iter().chain(&self.io_vectors).all(IoVector::is_valid)
    }

    /// Whether any input vector points at `address`.
    pub fn has_input_vector_with_address(&self, address: u32) -> bool {
        self.in_vectors.iter().any(|v| v.address == address)
    }

    /// Input vector `n`. Only call after the vector count has been checked.
    pub(crate) fn input(&self, n: usize) -> Result<IoVector> {
        self.in_vectors.get(n).copied().ok_or(Error::InvalidParameters)
    }

    /// Output vector `n`. Only call after the vector count has been checked.
    pub(crate) fn output(&self, n: usize) -> Result<IoVector> {
        self.io_vectors.get(n).copied().ok_or(Error::InvalidParameters)
    }
}

/// Outcome of an IPC command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcReply {
    /// Value written to the command buffer's result field.
    pub return_value: i32,
    /// `false` when the reply is delivered later (through an acknowledgement)
    /// rather than now.
    pub send_reply: bool,
}

impl IpcReply {
    pub fn new(return_value: i32) -> Self {
        Self {
            return_value,
            send_reply: true,
        }
    }

    /// A command that must not be answered now.
    pub fn no_reply() -> Self {
        Self {
            return_value: 0,
            send_reply: false,
        }
    }
}

impl From<crate::ReturnCode> for IpcReply {
    fn from(code: crate::ReturnCode) -> Self {
        Self::new(code.0)
    }
}

/// `base + offset`, or [`Error::InvalidAddress`] past the end of the
/// address space.
fn offset_address(base: u32, offset: u32) -> Result<u32> {
    base.checked_add(offset).ok_or(Error::InvalidAddress {
        address: base,
        size: offset,
    })
}
