// This file is part of afu-dma, a host driver for FPGA DMA accelerators exposed through the Linux DFL subsystem.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// afu-dma is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// afu-dma is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Host memory shared with the accelerator.
//!
//! The DMA engine moves whole cache lines and the driver pins whole pages, so every
//! buffer is rounded up to a multiple of [`CL_BYTES`] and of its backing page size.
//! Without an IOMMU the kernel requires a DMA mapping to be physically contiguous,
//! which for anything bigger than one page means a hugepage:
//!
//! | Requested length | Backing page |
//! |------------------|--------------|
//! | ≤ 4 KiB          | normal page  |
//! | ≤ 2 MiB          | 2 MiB hugepage |
//! | ≤ 1 GiB          | 1 GiB hugepage |
//!
//! When hugepages are disabled, or the system has none reserved, normal pages are used.
//!
//! Buffer contents are accessed with volatile reads and writes only: the accelerator
//! writes into them behind the compiler's back.

use crate::config::AddressMode;
use crate::error::AfuError;
use crate::mmio::CL_BYTES;
use log::{debug, trace, warn};
use rand::Rng;
use rand::distributions::Standard;
use std::sync::Arc;

const SIZE_2M: usize = 2 << 20;
const SIZE_1G: usize = 1 << 30;

/// Largest shared buffer a DMA test allocates.
pub const MAX_BUFFER_BYTES: usize = SIZE_1G;

/// Element type of a DMA buffer.
pub trait DmaWord: Copy + PartialEq + std::fmt::Debug + std::fmt::LowerHex + Send + 'static {
    const BITS: u32;

    fn zero() -> Self;

    fn random<R: Rng>(rng: &mut R) -> Self;
}

macro_rules! impl_dma_word {
    ($($t:ty),*) => {
        $(
            impl DmaWord for $t {
                const BITS: u32 = <$t>::BITS;

                fn zero() -> Self {
                    0
                }

                fn random<R: Rng>(rng: &mut R) -> Self {
                    rng.sample(Standard)
                }
            }
        )*
    };
}

impl_dma_word!(u8, u16, u32, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Normal,
    Huge2M,
    Huge1G,
}

/// Size of a normal page on this system.
pub fn normal_page_bytes() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

impl PageSize {
    pub fn bytes(self) -> usize {
        match self {
            PageSize::Normal => normal_page_bytes(),
            PageSize::Huge2M => SIZE_2M,
            PageSize::Huge1G => SIZE_1G,
        }
    }

    /// Smallest page that holds `len` bytes in one physically contiguous piece.
    pub fn for_len(len: usize, use_hugepages: bool) -> Result<PageSize, AfuError> {
        if !use_hugepages || len <= normal_page_bytes() {
            Ok(PageSize::Normal)
        } else if len <= SIZE_2M {
            Ok(PageSize::Huge2M)
        } else if len <= SIZE_1G {
            Ok(PageSize::Huge1G)
        } else {
            Err(AfuError::Argument(format!(
                "A shared buffer of {len} bytes does not fit in a 1 GiB hugepage"
            )))
        }
    }

    fn mmap_flags(self) -> libc::c_int {
        let base = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
        match self {
            PageSize::Normal => base,
            PageSize::Huge2M => base | libc::MAP_HUGETLB | libc::MAP_HUGE_2MB,
            PageSize::Huge1G => base | libc::MAP_HUGETLB | libc::MAP_HUGE_1GB,
        }
    }
}

/// Round `len` up to whole cache lines and whole pages of `page_size`.
pub fn rounded_len(len: usize, page_size: PageSize) -> usize {
    let page = page_size.bytes();
    len.div_ceil(CL_BYTES).max(1).saturating_mul(CL_BYTES).div_ceil(page) * page
}

/// A page-aligned anonymous mapping.
pub struct HostMemory {
    ptr: *mut u8,
    len: usize,
    page_size: PageSize,
}

impl std::fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMemory")
            .field("ptr", &format_args!("{:p}", self.ptr))
            .field("len", &self.len)
            .field("page_size", &self.page_size)
            .finish()
    }
}

// SAFETY: HostMemory owns its mapping; all access goes through volatile element reads and
// writes or bounds-checked copies, none of which hand out references into the memory.
unsafe impl Send for HostMemory {}
// SAFETY: see above
unsafe impl Sync for HostMemory {}

fn map_anonymous(len: usize, page_size: PageSize) -> Result<*mut u8, std::io::Error> {
    // SAFETY: anonymous mapping without a fixed address; failure is reported as MAP_FAILED
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            page_size.mmap_flags(),
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(ptr.cast::<u8>())
    }
}

impl HostMemory {
    /// Allocate at least `len` bytes, zero filled.
    pub fn allocate(len: usize, use_hugepages: bool) -> Result<Self, AfuError> {
        if len == 0 {
            return Err(AfuError::Argument(
                "Cannot allocate an empty shared buffer".into(),
            ));
        }
        let page_size = PageSize::for_len(len, use_hugepages)?;
        let rounded = rounded_len(len, page_size);
        trace!("Allocating {rounded} bytes ({len} requested) with {page_size:?} pages");

        match map_anonymous(rounded, page_size) {
            Ok(ptr) => Ok(HostMemory {
                ptr,
                len: rounded,
                page_size,
            }),
            Err(e) if page_size != PageSize::Normal => {
                warn!(
                    "No {page_size:?} hugepage available ({e}). Falling back to normal pages; \
                    the buffer may not be physically contiguous."
                );
                let rounded = rounded_len(len, PageSize::Normal);
                let ptr = map_anonymous(rounded, PageSize::Normal)
                    .map_err(|e| AfuError::Mmap { len: rounded, e })?;
                Ok(HostMemory {
                    ptr,
                    len: rounded,
                    page_size: PageSize::Normal,
                })
            }
            Err(e) => Err(AfuError::Mmap { len: rounded, e }),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn virtual_address(&self) -> u64 {
        self.ptr as u64
    }

    /// Number of `T` elements that fit.
    pub fn capacity<T: DmaWord>(&self) -> usize {
        self.len / size_of::<T>()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn read<T: DmaWord>(&self, index: usize) -> T {
        assert!(
            index < self.capacity::<T>(),
            "index {index} out of bounds for shared buffer of {} bytes",
            self.len
        );
        // SAFETY: in bounds and aligned, the mapping is page aligned and T is a primitive
        unsafe { std::ptr::read_volatile(self.ptr.cast::<T>().add(index)) }
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn write<T: DmaWord>(&self, index: usize, value: T) {
        assert!(
            index < self.capacity::<T>(),
            "index {index} out of bounds for shared buffer of {} bytes",
            self.len
        );
        // SAFETY: in bounds and aligned, see read()
        unsafe { std::ptr::write_volatile(self.ptr.cast::<T>().add(index), value) }
    }

    /// Copy `len` bytes from `self` at `src_offset` into `dst` at `dst_offset`.
    ///
    /// This is what a DMA engine does; source and destination may be the same mapping.
    pub fn copy_to(
        &self,
        src_offset: usize,
        dst: &HostMemory,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), AfuError> {
        let fits = |offset: usize, total: usize| offset.checked_add(len).is_some_and(|end| end <= total);
        if !fits(src_offset, self.len) || !fits(dst_offset, dst.len) {
            return Err(AfuError::Argument(format!(
                "Copy of {len} bytes from offset {src_offset:#x} to offset {dst_offset:#x} \
                exceeds buffer bounds"
            )));
        }
        // SAFETY: both ranges checked against their mappings; ptr::copy allows overlap
        unsafe { std::ptr::copy(self.ptr.add(src_offset), dst.ptr.add(dst_offset), len) };
        Ok(())
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        trace!("Unmapping {} bytes at {:p}", self.len, self.ptr);
        // SAFETY: ptr/len describe the mapping created in allocate()
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
        }
    }
}

/// Undo the accelerator side of a buffer mapping.
pub trait DmaRelease: Send {
    fn release(&self, io_address: u64) -> Result<(), AfuError>;
}

/// A buffer usable by both software and the accelerator.
///
/// Freed with [`SharedBuffer::release`], or on drop (errors are then only logged).
pub struct SharedBuffer {
    memory: Arc<HostMemory>,
    io_address: u64,
    releaser: Option<Box<dyn DmaRelease>>,
}

impl std::fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("memory", &self.memory)
            .field("io_address", &format_args!("{:#x}", self.io_address))
            .field("released", &self.releaser.is_none())
            .finish()
    }
}

impl SharedBuffer {
    pub fn new(
        memory: Arc<HostMemory>,
        io_address: u64,
        releaser: Option<Box<dyn DmaRelease>>,
    ) -> Self {
        debug!(
            "Shared buffer: va={:#x} iova={io_address:#x} len={:#x}",
            memory.virtual_address(),
            memory.len()
        );
        SharedBuffer {
            memory,
            io_address,
            releaser,
        }
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn io_address(&self) -> u64 {
        self.io_address
    }

    pub fn virtual_address(&self) -> u64 {
        self.memory.virtual_address()
    }

    /// The address to hand to the accelerator.
    pub fn device_address(&self, mode: AddressMode) -> u64 {
        match mode {
            AddressMode::Iova => self.io_address,
            AddressMode::Virtual => self.virtual_address(),
        }
    }

    pub fn memory(&self) -> &Arc<HostMemory> {
        &self.memory
    }

    pub fn capacity<T: DmaWord>(&self) -> usize {
        self.memory.capacity::<T>()
    }

    pub fn read<T: DmaWord>(&self, index: usize) -> T {
        self.memory.read(index)
    }

    pub fn write<T: DmaWord>(&self, index: usize, value: T) {
        self.memory.write(index, value)
    }

    /// Release the accelerator mapping and free the memory.
    pub fn release(mut self) -> Result<(), AfuError> {
        self.release_mapping()
    }

    fn release_mapping(&mut self) -> Result<(), AfuError> {
        match self.releaser.take() {
            Some(releaser) => releaser.release(self.io_address),
            None => Ok(()),
        }
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.release_mapping() {
            warn!("Failed to release shared buffer {:#x}: {e}", self.io_address);
        }
    }
}
