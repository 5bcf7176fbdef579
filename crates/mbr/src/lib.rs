#![no_std]

use core::fmt::Debug;

/// Size of a boot sector, as loaded by the BIOS
pub const SECTOR_SIZE: usize = 512;
/// Bytes available for code and data, everything before the signature
pub const CODE_AREA: usize = SECTOR_SIZE - 2;
/// Offset of the boot signature within the sector
pub const SIGNATURE_OFFSET: usize = CODE_AREA;
/// The boot signature, stored little endian as `55 AA`
pub const SIGNATURE: u16 = 0xAA55;
/// Physical address the firmware loads the sector to
pub const LOAD_ADDRESS: u16 = 0x7C00;

/// Errors that can occur when building or reading a boot sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SectorError {
    /// The code does not fit in front of the signature
    #[error("code is {len}b, but only 510b fit before the boot signature")]
    CodeTooLarge { len: usize },
    /// The input is not exactly one sector long
    #[error("a boot sector is exactly 512b, got {len}b")]
    WrongLength { len: usize },
    /// The final two bytes are not `55 AA`, so firmware will refuse to boot it
    #[error("missing boot signature, found {found:#06x}")]
    MissingSignature { found: u16 },
}

/// A 512-byte boot sector
///
/// The layout is fixed: the code area fills offsets 0..510, and the signature sits in the
/// final two bytes no matter how much code there is. Any code area bytes not written are zero.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BootSector {
    code: [u8; CODE_AREA],
    signature: [u8; 2],
}

impl Debug for BootSector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootSector")
            .field("code_len", &self.code_len())
            .field("signature", &format_args!("{:#06x}", self.signature()))
            .finish()
    }
}

impl BootSector {
    /// Creates a signed boot sector with the given code placed at offset 0
    pub fn new(code: &[u8]) -> Result<Self, SectorError> {
        if code.len() > CODE_AREA {
            return Err(SectorError::CodeTooLarge { len: code.len() });
        }
        let mut sector = Self {
            code: [0; CODE_AREA],
            signature: SIGNATURE.to_le_bytes(),
        };
        sector.code[..code.len()].copy_from_slice(code);
        Ok(sector)
    }

    /// Reads a sector without checking the signature
    pub fn read(bytes: &[u8]) -> Result<Self, SectorError> {
        let bytes: &[u8; SECTOR_SIZE] = bytes
            .try_into()
            .map_err(|_| SectorError::WrongLength { len: bytes.len() })?;
        Ok(bytemuck::cast(*bytes))
    }

    /// Reads a sector, rejecting it the way firmware would if the signature is missing
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SectorError> {
        let sector = Self::read(bytes)?;
        if !sector.is_bootable() {
            return Err(SectorError::MissingSignature {
                found: sector.signature(),
            });
        }
        Ok(sector)
    }

    pub fn signature(&self) -> u16 {
        u16::from_le_bytes(self.signature)
    }

    pub fn is_bootable(&self) -> bool {
        self.signature() == SIGNATURE
    }

    pub fn code(&self) -> &[u8; CODE_AREA] {
        &self.code
    }

    /// Length of the code area up to and including the last non-zero byte
    pub fn code_len(&self) -> usize {
        self.code
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1)
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        bytemuck::cast_ref(self)
    }
}
