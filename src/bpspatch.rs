#![forbid(unsafe_code)]
use super::error::{Error, Result};
use super::header::{Footer, Header, FOOTER_SIZE, MARKER, MIN_PATCH_SIZE};
use super::session::{cursor_position, shift_cursor, split_token, Command};
use super::varint;
use std::convert::TryFrom;
use std::io::{self, ErrorKind, Write};

/// Fast in-memory patcher for the beat patch format.
///
/// The whole target is built in a buffer that grows up to the size declared
/// in the patch header, then written out at once.
///
/// Apply patch to source:
/// ```
/// use beatpatch::Bpspatch;
///
/// fn bps(source: &[u8], patch: &[u8]) -> beatpatch::Result<Vec<u8>> {
///     let mut target = Vec::new();
///     Bpspatch::new(patch)?.apply(source, &mut target)?;
///     Ok(target)
/// }
/// ```
///
/// Verify checksums and sizes:
/// ```
/// use beatpatch::Bpspatch;
///
/// fn bps(source: &[u8], patch: &[u8]) -> beatpatch::Result<Vec<u8>> {
///     let patcher = Bpspatch::new(patch)?
///         .verify_checksums(true)
///         .strict_size(true);
///     let mut target = Vec::new();
///     patcher.apply(source, &mut target)?;
///     Ok(target)
/// }
/// ```
pub struct Bpspatch<'p> {
    patch: PatchFile<'p>,
    checksums: bool,
    strict: bool,
}

impl<'p> Bpspatch<'p> {
    /// Parse the patch header and create new patcher configuration.
    ///
    /// Return error if failed to parse the patch header.
    pub fn new(patch: &'p [u8]) -> Result<Self> {
        Ok(Bpspatch {
            patch: parse(patch)?,
            checksums: false,
            strict: false,
        })
    }

    /// Verify the source, target and patch checksums (default is `false`).
    pub fn verify_checksums(mut self, enable: bool) -> Self {
        self.checksums = enable;
        self
    }

    /// Require the source and output sizes to match the header exactly
    /// (default is `false`).
    pub fn strict_size(mut self, enable: bool) -> Self {
        self.strict = enable;
        self
    }

    /// Hint the final target file size, as provided in the patch header.
    pub fn hint_target_size(&self) -> u64 {
        self.patch.header.target_size
    }

    /// Source file size, as provided in the patch header.
    pub fn source_size(&self) -> u64 {
        self.patch.header.source_size
    }

    /// Raw metadata block of the patch.
    pub fn metadata(&self) -> &'p [u8] {
        self.patch.metadata
    }

    /// Checksums stored at the end of the patch.
    pub fn footer(&self) -> Footer {
        self.patch.footer
    }

    /// Apply patch to the source data and output the stream of target.
    ///
    /// The target data size would be returned if no error occurs.
    pub fn apply<T: Write>(self, source: &[u8], mut target: T) -> Result<u64> {
        if self.checksums {
            self.patch.footer.verify_patch(self.patch.whole)?;
            self.patch.footer.verify_source(source)?;
        }
        if self.strict && source.len() as u64 != self.patch.header.source_size {
            return Err(Error::SourceSizeMismatch {
                expected: self.patch.header.source_size,
                actual: source.len() as u64,
            });
        }

        let ctx = Context::new(&self.patch, source)?;
        let output = ctx.apply()?;

        if self.strict && output.len() as u64 != self.patch.header.target_size {
            return Err(Error::TargetSizeMismatch {
                expected: self.patch.header.target_size,
                actual: output.len() as u64,
            });
        }
        if self.checksums {
            self.patch.footer.verify_target(&output[..])?;
        }

        target.write_all(&output[..])?;
        target.flush()?;
        Ok(output.len() as u64)
    }
}

struct PatchFile<'a> {
    whole: &'a [u8],
    header: Header,
    metadata: &'a [u8],
    commands: &'a [u8],
    footer: Footer,
}

/// Parse the beat patch file.
fn parse(patch: &[u8]) -> Result<PatchFile> {
    if patch.len() < MIN_PATCH_SIZE || patch[..MARKER.len()] != MARKER {
        return Err(Error::Format);
    }

    let end = patch.len() - FOOTER_SIZE as usize;
    let body = &patch[MARKER.len()..end];
    let (header, n) = Header::parse(body)?;
    let remain = &body[n..];
    let metadata_size = usize::try_from(header.metadata_size)
        .ok()
        .filter(|&m| m <= remain.len())
        .ok_or(Error::Format)?;
    let (metadata, commands) = remain.split_at(metadata_size);

    Ok(PatchFile {
        whole: patch,
        header,
        metadata,
        commands,
        footer: Footer::parse(patch)?,
    })
}

/// Bpspatch context.
struct Context<'s, 'p> {
    source: &'s [u8],
    commands: &'p [u8],
    pos: usize,

    target: Vec<u8>,
    limit: usize,

    source_offset: i64,
    target_offset: i64,
}

impl<'s, 'p> Context<'s, 'p> {
    /// Create context.
    pub fn new(patch: &PatchFile<'p>, source: &'s [u8]) -> Result<Self> {
        let limit = usize::try_from(patch.header.target_size)
            .map_err(|_| io::Error::new(ErrorKind::InvalidData, "target too large"))?;
        Ok(Context {
            source,
            commands: patch.commands,
            pos: 0,
            target: Vec::with_capacity(limit.min(source.len() + patch.commands.len())),
            limit,
            source_offset: 0,
            target_offset: 0,
        })
    }

    /// Apply the patch file.
    pub fn apply(mut self) -> Result<Vec<u8>> {
        while self.pos < self.commands.len() {
            let token = self.number()?;
            let (command, length) = split_token(token)?;
            let length = self.reserve(length)?;
            log::trace!("bps command: {:?}, length {}", command, length);
            match command {
                Command::SourceRead => self.source_read(length)?,
                Command::TargetRead => self.target_read(length)?,
                Command::SourceCopy => self.source_copy(length)?,
                Command::TargetCopy => self.target_copy(length)?,
            }
        }
        Ok(self.target)
    }

    /// Copy source bytes at the output offset.
    fn source_read(&mut self, length: usize) -> Result<()> {
        let start = self.target.len();
        let bytes = self
            .source
            .get(start..start + length)
            .ok_or_else(|| eof("source read past the end of source"))?;
        self.target.extend_from_slice(bytes);
        Ok(())
    }

    /// Copy literal bytes from the patch.
    fn target_read(&mut self, length: usize) -> Result<()> {
        let bytes = self
            .commands
            .get(self.pos..self.pos + length)
            .ok_or_else(|| eof("target read past the end of patch"))?;
        self.target.extend_from_slice(bytes);
        self.pos += length;
        Ok(())
    }

    /// Copy source bytes from the relative source cursor.
    fn source_copy(&mut self, length: usize) -> Result<()> {
        let delta = self.offset()?;
        self.source_offset = shift_cursor(self.source_offset, delta)?;
        let start = index(self.source_offset)?;
        let bytes = self
            .source
            .get(start..start + length)
            .ok_or_else(|| eof("source copy past the end of source"))?;
        self.target.extend_from_slice(bytes);
        self.source_offset += length as i64;
        Ok(())
    }

    /// Copy target bytes from the relative target cursor, one at a time.
    fn target_copy(&mut self, length: usize) -> Result<()> {
        let delta = self.offset()?;
        self.target_offset = shift_cursor(self.target_offset, delta)?;
        let mut from = index(self.target_offset)?;
        for _ in 0..length {
            let byte = *self
                .target
                .get(from)
                .ok_or_else(|| eof("target copy past the written output"))?;
            self.target.push(byte);
            from += 1;
        }
        self.target_offset += length as i64;
        Ok(())
    }

    /// Check that `length` more bytes fit in the declared target size.
    fn reserve(&self, length: u64) -> Result<usize> {
        usize::try_from(length)
            .ok()
            .filter(|&n| n <= self.limit - self.target.len())
            .ok_or_else(|| {
                io::Error::new(ErrorKind::InvalidData, "command exceeds target size").into()
            })
    }

    fn number(&mut self) -> Result<u64> {
        let (x, n) = varint::read_number(&self.commands[self.pos..])?;
        self.pos += n;
        Ok(x)
    }

    fn offset(&mut self) -> Result<i64> {
        let (x, n) = varint::read_offset(&self.commands[self.pos..])?;
        self.pos += n;
        Ok(x)
    }
}

#[inline]
fn index(cursor: i64) -> io::Result<usize> {
    usize::try_from(cursor_position(cursor)?)
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "relative offset too large"))
}

fn eof(msg: &'static str) -> io::Error {
    io::Error::new(ErrorKind::UnexpectedEof, msg)
}
