//! Read-only view of a GBA ROM image.
//!
//! All sequence, instrument and sample data is read in place; nothing is
//! copied out of the image apart from small fixed-size headers. Pointers
//! inside the ROM use the AGB bus address space (cartridge at 0x08000000)
//! and are translated and bounds-checked here.

use std::sync::Arc;

use crate::types::SampleInfo;
use crate::{Mp2kError, Result};

/// Cartridge base address on the AGB bus.
const AGB_ROM_BASE: u32 = 0x0800_0000;

/// Highest mappable cartridge address (32 MiB window).
const AGB_ROM_END: u32 = 0x0A00_0000;

/// Loop flag in a sample header's mode word.
const SAMPLE_LOOP_FLAG: u32 = 0x4000_0000;

/// A ROM image plus bounds-checked accessors.
///
/// The image is immutable for the lifetime of the synthesizer; sequences and
/// voices keep `Arc<Rom>` handles into it.
pub struct Rom {
    data: Vec<u8>,
}

impl std::fmt::Debug for Rom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rom")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl Rom {
    /// Wrap a ROM image.
    pub fn new(data: Vec<u8>) -> Self {
        Rom { data }
    }

    /// Size of the image in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw image bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Translate an AGB bus address to an offset into the image.
    pub fn offset_of(&self, addr: u32) -> Result<usize> {
        if !(AGB_ROM_BASE..AGB_ROM_END).contains(&addr) {
            return Err(Mp2kError::Data(format!(
                "0x{addr:08X} is not a cartridge address"
            )));
        }
        let offset = (addr - AGB_ROM_BASE) as usize;
        if offset >= self.data.len() {
            return Err(Mp2kError::Data(format!(
                "0x{addr:08X} lies past the end of the {} byte image",
                self.data.len()
            )));
        }
        Ok(offset)
    }

    /// Byte at `pos`.
    #[inline]
    pub fn read_u8(&self, pos: usize) -> Result<u8> {
        self.data
            .get(pos)
            .copied()
            .ok_or_else(|| truncated(pos, 1, self.data.len()))
    }

    /// Signed byte at `pos`.
    #[inline]
    pub fn read_i8(&self, pos: usize) -> Result<i8> {
        Ok(self.read_u8(pos)? as i8)
    }

    /// Little-endian u16 at `pos`.
    pub fn read_u16(&self, pos: usize) -> Result<u16> {
        let bytes = self
            .data
            .get(pos..pos + 2)
            .ok_or_else(|| truncated(pos, 2, self.data.len()))?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Little-endian u32 at `pos`.
    pub fn read_u32(&self, pos: usize) -> Result<u32> {
        let bytes = self
            .data
            .get(pos..pos + 4)
            .ok_or_else(|| truncated(pos, 4, self.data.len()))?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read an AGB pointer at `pos` and translate it to an image offset.
    pub fn read_pointer(&self, pos: usize) -> Result<usize> {
        self.offset_of(self.read_u32(pos)?)
    }

    /// Resolve the `index`-th entry of the song table at `table_addr`.
    ///
    /// Song table entries are 8 bytes: a pointer to the song header followed
    /// by two player-group words the synthesizer does not interpret.
    pub fn song_table_entry(&self, table_addr: u32, index: usize) -> Result<usize> {
        let table_pos = self.offset_of(table_addr)?;
        self.read_pointer(table_pos + index * 8)
    }

    /// Decode the sample header at `pos` into a [`SampleInfo`].
    ///
    /// Layout: mode word (loop flag), pitch in Hz scaled by 1024, loop start,
    /// sample count, then the signed 8-bit PCM data.
    pub fn sample_info(self: &Arc<Self>, pos: usize) -> Result<SampleInfo> {
        let mode = self.read_u32(pos)?;
        let pitch = self.read_u32(pos + 4)?;
        let loop_pos = self.read_u32(pos + 8)?;
        let end_pos = self.read_u32(pos + 12)?;
        SampleInfo::new(
            Arc::clone(self),
            pos + 16,
            pitch as f32 / 1024.0,
            mode & SAMPLE_LOOP_FLAG != 0,
            loop_pos,
            end_pos,
        )
    }

    /// Copy the 16 packed bytes of a programmable waveform at `pos`.
    pub fn wave_data(&self, pos: usize) -> Result<[u8; 16]> {
        let bytes = self
            .data
            .get(pos..pos + 16)
            .ok_or_else(|| truncated(pos, 16, self.data.len()))?;
        let mut wave = [0u8; 16];
        wave.copy_from_slice(bytes);
        Ok(wave)
    }
}

fn truncated(pos: usize, want: usize, len: usize) -> Mp2kError {
    Mp2kError::Data(format!(
        "read of {want} bytes at offset 0x{pos:X} past end of {len} byte image"
    ))
}
