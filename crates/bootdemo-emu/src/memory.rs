/// Real-mode address space, 1 MiB with the A20 line disabled
pub const MEMORY_SIZE: usize = 1 << 20;

/// Address of the BIOS timer tick counter in the BIOS data area (`0040:006C`)
pub const BDA_TICKS: usize = 0x046C;

/// Translates `segment:offset` to a physical address, wrapping at 1 MiB
pub const fn linear(segment: u16, offset: u16) -> usize {
    (((segment as usize) << 4) + offset as usize) & (MEMORY_SIZE - 1)
}

pub struct Memory {
    bytes: Vec<u8>,
}

impl core::fmt::Debug for Memory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE],
        }
    }

    /// Copies `data` to `address`, wrapping at the top of memory
    pub fn load(&mut self, address: usize, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.bytes[(address + i) & (MEMORY_SIZE - 1)] = byte;
        }
    }

    pub fn read_u8(&self, segment: u16, offset: u16) -> u8 {
        self.bytes[linear(segment, offset)]
    }

    /// Reads a little endian word, the offset wraps within the segment
    pub fn read_u16(&self, segment: u16, offset: u16) -> u16 {
        u16::from_le_bytes([
            self.read_u8(segment, offset),
            self.read_u8(segment, offset.wrapping_add(1)),
        ])
    }

    pub fn write_u8(&mut self, segment: u16, offset: u16, value: u8) {
        self.bytes[linear(segment, offset)] = value;
    }

    pub fn write_u16(&mut self, segment: u16, offset: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_u8(segment, offset, low);
        self.write_u8(segment, offset.wrapping_add(1), high);
    }

    pub fn read_u32_at(&self, address: usize) -> u32 {
        let mut bytes = [0; 4];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.bytes[(address + i) & (MEMORY_SIZE - 1)];
        }
        u32::from_le_bytes(bytes)
    }

    pub fn write_u32_at(&mut self, address: usize, value: u32) {
        self.load(address, &value.to_le_bytes());
    }

    /// A view of physical memory, clamped to the end of the address space
    pub fn slice(&self, address: usize, len: usize) -> &[u8] {
        let start = address.min(MEMORY_SIZE);
        let end = start.saturating_add(len).min(MEMORY_SIZE);
        &self.bytes[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        assert_eq!(linear(0x0000, 0x7C00), 0x7C00);
        assert_eq!(linear(0x07C0, 0x0000), 0x7C00);
        assert_eq!(linear(0x0040, 0x006C), BDA_TICKS);
        // FFFF:0010 wraps to 0 without A20
        assert_eq!(linear(0xFFFF, 0x0010), 0);
    }

    #[test]
    fn test_word_wraps_in_segment() {
        let mut memory = Memory::new();
        memory.write_u16(0x1000, 0xFFFF, 0xBEEF);
        assert_eq!(memory.read_u8(0x1000, 0xFFFF), 0xEF);
        assert_eq!(memory.read_u8(0x1000, 0x0000), 0xBE);
        assert_eq!(memory.read_u16(0x1000, 0xFFFF), 0xBEEF);
    }

    #[test]
    fn test_u32() {
        let mut memory = Memory::new();
        memory.write_u32_at(BDA_TICKS, 0x0102_0304);
        assert_eq!(memory.read_u32_at(BDA_TICKS), 0x0102_0304);
        assert_eq!(memory.slice(BDA_TICKS, 4), &[4, 3, 2, 1]);
    }
}
