use std::{fs::File, io::Read, io::Write, path::Path};

use bootdemo_bios::{AsmError, DemoConfig};
use mbr::{BootSector, SECTOR_SIZE, SectorError};

/// Errors that can occur when building, writing or reading an image
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error(transparent)]
    Sector(#[from] SectorError),
    #[error("failed to encode the demo: {0}")]
    Asm(#[from] AsmError),
    /// An IO error occurred
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A bootable image, one sector long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Image {
    sector: BootSector,
}

impl Image {
    /// Builds the image for a demo
    ///
    /// The same demo always produces the same bytes.
    pub fn build(demo: &DemoConfig) -> Result<Self, ImageError> {
        let code = demo.assemble()?;
        let sector = BootSector::new(&code)?;
        tracing::debug!(
            demo = demo.name,
            code_len = code.len(),
            "built boot sector, {} bytes free",
            mbr::CODE_AREA - code.len()
        );
        Ok(Self { sector })
    }

    pub fn from_sector(sector: BootSector) -> Self {
        Self { sector }
    }

    /// Reads an image, which must be exactly one signed sector
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        Ok(Self {
            sector: BootSector::from_bytes(bytes)?,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let mut bytes = Vec::with_capacity(SECTOR_SIZE);
        // One byte past a sector is enough to tell an oversized file apart
        File::open(path)?
            .take(SECTOR_SIZE as u64 + 1)
            .read_to_end(&mut bytes)?;
        tracing::trace!("read {}b from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ImageError> {
        writer.write_all(self.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ImageError> {
        let path = path.as_ref();
        let mut file = File::create(path)?;
        self.write_to(&mut file)?;
        tracing::debug!("wrote {SECTOR_SIZE}b image to {}", path.display());
        Ok(())
    }

    pub fn sector(&self) -> &BootSector {
        &self.sector
    }

    pub fn as_bytes(&self) -> &[u8; SECTOR_SIZE] {
        self.sector.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootdemo_bios::{CIALLO, HELLO_WORLD};

    #[test]
    fn test_build_signature() {
        for demo in [&CIALLO, &HELLO_WORLD] {
            let image = Image::build(demo).unwrap();
            let bytes = image.as_bytes();
            assert_eq!(bytes.len(), 512);
            assert_eq!(&bytes[510..], &[0x55, 0xAA]);
        }
    }

    #[test]
    fn test_build_deterministic() {
        assert_eq!(
            Image::build(&CIALLO).unwrap().as_bytes(),
            Image::build(&CIALLO).unwrap().as_bytes()
        );
        assert_ne!(
            Image::build(&CIALLO).unwrap().as_bytes(),
            Image::build(&HELLO_WORLD).unwrap().as_bytes()
        );
    }

    #[test]
    fn test_write_to_buffer() {
        let image = Image::build(&HELLO_WORLD).unwrap();
        let mut out = Vec::new();
        image.write_to(&mut out).unwrap();
        assert_eq!(out.as_slice(), image.as_bytes());
    }

    #[test]
    fn test_from_bytes_rejects_oversized() {
        let mut bytes = Image::build(&CIALLO).unwrap().as_bytes().to_vec();
        bytes.push(0);
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(ImageError::Sector(SectorError::WrongLength { len: 513 }))
        ));
    }
}
