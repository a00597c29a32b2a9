//! Instrument table (voicegroup) lookup.
//!
//! A song's voicegroup is an array of 12-byte entries indexed by program
//! number. An entry either describes a playable source directly (PCM sample
//! or one of the CGB channels) or redirects per key: a keysplit maps the MIDI
//! key through a table to a sub-instrument, a drumkit uses the key itself as
//! the sub-instrument index.

use std::sync::Arc;

use crate::channels::CgbKind;
use crate::rom::Rom;
use crate::types::{Adsr, CgbDef, NoisePattern, SampleInfo, WaveDuty};
use crate::{Mp2kError, Result};

/// Size of one voicegroup entry in bytes.
const ENTRY_SIZE: usize = 12;

/// Instrument type bits.
const TYPE_FIXED_PITCH: u8 = 0x08;
const TYPE_KEYSPLIT: u8 = 0x40;
const TYPE_DRUMKIT: u8 = 0x80;

/// Sound source resolved for one note.
#[derive(Debug, Clone)]
pub enum VoiceSource {
    /// ROM-resident PCM sample
    Pcm {
        /// The sample to play
        sample: SampleInfo,
        /// Play at the sample's own rate regardless of key
        fixed_pitch: bool,
    },
    /// CGB channel with its waveform definition
    Cgb {
        /// Which CGB channel the voice occupies
        kind: CgbKind,
        /// Waveform source
        def: CgbDef,
    },
}

/// Result of an instrument lookup for a (program, key) pair.
#[derive(Debug, Clone)]
pub struct VoiceSelection {
    /// What to play
    pub source: VoiceSource,
    /// Envelope rates from the instrument entry
    pub adsr: Adsr,
    /// Forced pan from the instrument, if any (-64..=63)
    pub pan: Option<i8>,
    /// Key override for drumkit entries (drums sound at a fixed key)
    pub key_override: Option<u8>,
}

/// A voicegroup inside the ROM image.
#[derive(Debug, Clone)]
pub struct InstrumentBank {
    rom: Arc<Rom>,
    pos: usize,
}

impl InstrumentBank {
    /// Bind a bank at image offset `pos`.
    pub fn new(rom: Arc<Rom>, pos: usize) -> Self {
        InstrumentBank { rom, pos }
    }

    /// Resolve `program` for `midi_key` to a playable source.
    pub fn select(&self, program: u8, midi_key: u8) -> Result<VoiceSelection> {
        self.decode(self.pos + program as usize * ENTRY_SIZE, midi_key, false, 0)
    }

    fn decode(
        &self,
        entry_pos: usize,
        midi_key: u8,
        via_drumkit: bool,
        depth: u8,
    ) -> Result<VoiceSelection> {
        let kind = self.rom.read_u8(entry_pos)?;

        match kind {
            TYPE_KEYSPLIT | TYPE_DRUMKIT if depth > 0 => Err(Mp2kError::Data(format!(
                "nested key-mapped instrument at 0x{entry_pos:X}"
            ))),
            TYPE_KEYSPLIT => {
                let sub_bank = self.rom.read_pointer(entry_pos + 4)?;
                let keymap = self.rom.read_pointer(entry_pos + 8)?;
                let sub_program = self.rom.read_u8(keymap + midi_key as usize)?;
                self.decode(
                    sub_bank + sub_program as usize * ENTRY_SIZE,
                    midi_key,
                    false,
                    depth + 1,
                )
            }
            TYPE_DRUMKIT => {
                let sub_bank = self.rom.read_pointer(entry_pos + 4)?;
                self.decode(
                    sub_bank + midi_key as usize * ENTRY_SIZE,
                    midi_key,
                    true,
                    depth + 1,
                )
            }
            _ => self.decode_leaf(entry_pos, kind, via_drumkit),
        }
    }

    fn decode_leaf(&self, entry_pos: usize, kind: u8, via_drumkit: bool) -> Result<VoiceSelection> {
        let root_key = self.rom.read_u8(entry_pos + 1)?;
        let pan_byte = self.rom.read_u8(entry_pos + 3)?;
        let pan = if pan_byte & 0x80 != 0 {
            Some((pan_byte & 0x7F) as i8 - 64)
        } else {
            None
        };
        let adsr = Adsr::new(
            self.rom.read_u8(entry_pos + 8)?,
            self.rom.read_u8(entry_pos + 9)?,
            self.rom.read_u8(entry_pos + 10)?,
            self.rom.read_u8(entry_pos + 11)?,
        );
        let key_override = if via_drumkit { Some(root_key) } else { None };

        let source = match kind & !TYPE_FIXED_PITCH {
            0x00 => {
                let sample_pos = self.rom.read_pointer(entry_pos + 4)?;
                VoiceSource::Pcm {
                    sample: self.rom.sample_info(sample_pos)?,
                    fixed_pitch: kind & TYPE_FIXED_PITCH != 0,
                }
            }
            0x01 => VoiceSource::Cgb {
                kind: CgbKind::Sq1,
                def: CgbDef::Square(WaveDuty::from_raw(self.rom.read_u32(entry_pos + 4)?)),
            },
            0x02 => VoiceSource::Cgb {
                kind: CgbKind::Sq2,
                def: CgbDef::Square(WaveDuty::from_raw(self.rom.read_u32(entry_pos + 4)?)),
            },
            0x03 => {
                let wave_pos = self.rom.read_pointer(entry_pos + 4)?;
                VoiceSource::Cgb {
                    kind: CgbKind::Wave,
                    def: CgbDef::Wave(self.rom.wave_data(wave_pos)?),
                }
            }
            0x04 => {
                let pattern = match self.rom.read_u32(entry_pos + 4)? & 1 {
                    0 => NoisePattern::Fine,
                    _ => NoisePattern::Rough,
                };
                VoiceSource::Cgb {
                    kind: CgbKind::Noise,
                    def: CgbDef::Noise(pattern),
                }
            }
            other => {
                return Err(Mp2kError::Data(format!(
                    "unknown instrument type 0x{other:02X} at 0x{entry_pos:X}"
                )))
            }
        };

        Ok(VoiceSelection {
            source,
            adsr,
            pan,
            key_override,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a ROM image containing a voicegroup at offset 0 with `entries`,
    /// followed by arbitrary payload bytes.
    fn bank_rom(entries: &[[u8; 12]], payload: &[u8]) -> (Arc<Rom>, InstrumentBank) {
        let mut data = Vec::new();
        for e in entries {
            data.extend_from_slice(e);
        }
        data.extend_from_slice(payload);
        let rom = Arc::new(Rom::new(data));
        let bank = InstrumentBank::new(rom.clone(), 0);
        (rom, bank)
    }

    fn square_entry(channel: u8, duty: u32, adsr: [u8; 4]) -> [u8; 12] {
        let mut e = [0u8; 12];
        e[0] = channel;
        e[4..8].copy_from_slice(&duty.to_le_bytes());
        e[8..12].copy_from_slice(&adsr);
        e
    }

    #[test]
    fn test_square_instrument() {
        let (_, bank) = bank_rom(&[square_entry(0x01, 2, [255, 0, 255, 165])], &[]);
        let sel = bank.select(0, 60).unwrap();
        match sel.source {
            VoiceSource::Cgb {
                kind: CgbKind::Sq1,
                def: CgbDef::Square(WaveDuty::D50),
            } => {}
            other => panic!("unexpected selection: {other:?}"),
        }
        assert_eq!(sel.adsr, Adsr::new(255, 0, 255, 165));
        assert_eq!(sel.pan, None);
        assert_eq!(sel.key_override, None);
    }

    #[test]
    fn test_pcm_instrument_with_pan() {
        // Entry 0: PCM pointing at a sample header at offset 12 + 12 = 24.
        let mut e = [0u8; 12];
        e[0] = 0x00;
        e[3] = 0x80 | 96; // pan enabled, 96 - 64 = +32
        e[4..8].copy_from_slice(&(0x0800_0000u32 + 12).to_le_bytes());
        e[8..12].copy_from_slice(&[255, 0, 255, 0]);

        // Sample header: no loop, 4 samples, pitch for 4186 Hz mid-C
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&(4186u32 * 1024).to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&4u32.to_le_bytes());
        payload.extend_from_slice(&[1, 2, 3, 4]);

        let (_, bank) = bank_rom(&[e], &payload);
        let sel = bank.select(0, 60).unwrap();
        match sel.source {
            VoiceSource::Pcm {
                sample,
                fixed_pitch: false,
            } => {
                assert_eq!(sample.end_pos, 4);
                assert_eq!(sample.mid_c_freq, 4186.0);
            }
            other => panic!("unexpected selection: {other:?}"),
        }
        assert_eq!(sel.pan, Some(32));
    }

    #[test]
    fn test_keysplit_redirects_by_key() {
        // Entry 0: keysplit -> sub bank at entry 1, keymap at offset 36.
        let mut split = [0u8; 12];
        split[0] = TYPE_KEYSPLIT;
        split[4..8].copy_from_slice(&(0x0800_0000u32 + 12).to_le_bytes());
        split[8..12].copy_from_slice(&(0x0800_0000u32 + 36).to_le_bytes());

        // Sub bank: program 0 = noise fine, program 1 = noise rough.
        let sub0 = square_entry(0x04, 0, [255, 0, 255, 0]);
        let sub1 = square_entry(0x04, 1, [255, 0, 255, 0]);

        // Keymap: keys 0..=63 -> program 0, 64..=127 -> program 1.
        let mut keymap = [0u8; 128];
        for k in keymap.iter_mut().skip(64) {
            *k = 1;
        }

        let (_, bank) = bank_rom(&[split, sub0, sub1], &keymap);
        let low = bank.select(0, 40).unwrap();
        let high = bank.select(0, 100).unwrap();
        assert!(matches!(
            low.source,
            VoiceSource::Cgb {
                def: CgbDef::Noise(NoisePattern::Fine),
                ..
            }
        ));
        assert!(matches!(
            high.source,
            VoiceSource::Cgb {
                def: CgbDef::Noise(NoisePattern::Rough),
                ..
            }
        ));
    }

    #[test]
    fn test_drumkit_uses_key_as_index() {
        // Entry 0: drumkit -> sub bank right after it (entry 1 onwards).
        let mut drums = [0u8; 12];
        drums[0] = TYPE_DRUMKIT;
        drums[4..8].copy_from_slice(&(0x0800_0000u32 + 12).to_le_bytes());

        // Drum 0: square with root key 48.
        let mut drum0 = square_entry(0x02, 3, [200, 150, 100, 50]);
        drum0[1] = 48;

        let (_, bank) = bank_rom(&[drums, drum0], &[]);
        let sel = bank.select(0, 0).unwrap();
        assert_eq!(sel.key_override, Some(48));
        assert!(matches!(
            sel.source,
            VoiceSource::Cgb {
                kind: CgbKind::Sq2,
                def: CgbDef::Square(WaveDuty::D75),
            }
        ));
        assert_eq!(sel.adsr, Adsr::new(200, 150, 100, 50));
    }

    #[test]
    fn test_nested_keysplit_rejected() {
        // Keysplit whose sub entry is itself a drumkit.
        let mut split = [0u8; 12];
        split[0] = TYPE_KEYSPLIT;
        split[4..8].copy_from_slice(&(0x0800_0000u32 + 12).to_le_bytes());
        split[8..12].copy_from_slice(&(0x0800_0000u32 + 24).to_le_bytes());

        let mut nested = [0u8; 12];
        nested[0] = TYPE_DRUMKIT;
        nested[4..8].copy_from_slice(&(0x0800_0000u32 + 12).to_le_bytes());

        let keymap = [0u8; 128];
        let (_, bank) = bank_rom(&[split, nested], &keymap);
        assert!(bank.select(0, 60).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let (_, bank) = bank_rom(&[square_entry(0x27, 0, [0; 4])], &[]);
        assert!(bank.select(0, 60).is_err());
    }

    #[test]
    fn test_truncated_entry_rejected() {
        let (_, bank) = bank_rom(&[square_entry(0x01, 0, [0; 4])], &[]);
        assert!(bank.select(5, 60).is_err());
    }
}
