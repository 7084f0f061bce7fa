use super::error::{ChecksumKind, Error, Result};
use super::varint;
use byteorder::{ByteOrder, ReadBytesExt, LE};
use std::io::{Read, Seek, SeekFrom};

/// File format marker, `BPS1`.
pub const MARKER: [u8; 4] = *b"BPS1";

/// Size of the trailing checksum block.
pub const FOOTER_SIZE: u64 = 12;

/// Smallest possible patch: marker, three one-byte sizes and the footer.
pub const MIN_PATCH_SIZE: usize = MARKER.len() + 3 + FOOTER_SIZE as usize;

/// Checks the `BPS1` marker at the current stream position.
///
/// On success the stream is left right after the marker.
pub fn verify_marker<R: Read>(r: &mut R) -> Result<()> {
    let mut marker = [0u8; 4];
    r.read_exact(&mut marker).map_err(|_| Error::Format)?;
    if marker != MARKER {
        return Err(Error::Format);
    }
    Ok(())
}

/// Sizes declared by the patch header.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Header {
    pub source_size: u64,
    pub target_size: u64,
    pub metadata_size: u64,
}

impl Header {
    /// Decodes the three sizes following the marker.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let source_size = varint::decode_number(r)?;
        let target_size = varint::decode_number(r)?;
        let metadata_size = varint::decode_number(r)?;
        Ok(Header {
            source_size,
            target_size,
            metadata_size,
        })
    }

    /// Decodes the three sizes from a slice positioned after the marker.
    ///
    /// Returns the header and the count of bytes consumed.
    pub fn parse(b: &[u8]) -> Result<(Self, usize)> {
        let (source_size, i) = varint::read_number(b)?;
        let (target_size, j) = varint::read_number(&b[i..])?;
        let (metadata_size, k) = varint::read_number(&b[i + j..])?;
        let header = Header {
            source_size,
            target_size,
            metadata_size,
        };
        Ok((header, i + j + k))
    }
}

/// The three CRC32 checksums at the end of every patch.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Footer {
    pub source_crc32: u32,
    pub target_crc32: u32,
    pub patch_crc32: u32,
}

impl Footer {
    /// Reads the footer from the last 12 bytes of a stream.
    ///
    /// The stream position is restored afterwards.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let pos = r.stream_position()?;
        r.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let source_crc32 = r.read_u32::<LE>()?;
        let target_crc32 = r.read_u32::<LE>()?;
        let patch_crc32 = r.read_u32::<LE>()?;
        r.seek(SeekFrom::Start(pos))?;
        Ok(Footer {
            source_crc32,
            target_crc32,
            patch_crc32,
        })
    }

    /// Parses the footer from the tail of a whole patch.
    pub fn parse(patch: &[u8]) -> Result<Self> {
        if patch.len() < FOOTER_SIZE as usize {
            return Err(Error::Format);
        }
        let b = &patch[patch.len() - FOOTER_SIZE as usize..];
        Ok(Footer {
            source_crc32: LE::read_u32(&b[0..4]),
            target_crc32: LE::read_u32(&b[4..8]),
            patch_crc32: LE::read_u32(&b[8..12]),
        })
    }

    /// Checks the source checksum.
    pub fn verify_source(&self, source: &[u8]) -> Result<()> {
        check(ChecksumKind::Source, self.source_crc32, crc32fast::hash(source))
    }

    /// Checks the target checksum.
    pub fn verify_target(&self, target: &[u8]) -> Result<()> {
        check(ChecksumKind::Target, self.target_crc32, crc32fast::hash(target))
    }

    /// Checks the patch checksum, which covers everything but its own 4 bytes.
    pub fn verify_patch(&self, patch: &[u8]) -> Result<()> {
        if patch.len() < FOOTER_SIZE as usize {
            return Err(Error::Format);
        }
        let covered = &patch[..patch.len() - 4];
        check(ChecksumKind::Patch, self.patch_crc32, crc32fast::hash(covered))
    }
}

fn check(kind: ChecksumKind, expected: u32, actual: u32) -> Result<()> {
    if expected != actual {
        log::warn!(
            "{} checksum mismatch: expected {:#010x}, got {:#010x}",
            kind,
            expected,
            actual
        );
        return Err(Error::Checksum {
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}
