#![forbid(unsafe_code)]
use super::error::{Error, Result};
use super::header::{Header, FOOTER_SIZE, MARKER};
use super::varint;
use std::convert::TryFrom;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

/// One beat patch command, selected by the low two bits of its token.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    SourceRead,
    TargetRead,
    SourceCopy,
    TargetCopy,
}

impl TryFrom<u64> for Command {
    type Error = Error;

    fn try_from(x: u64) -> Result<Self> {
        match x {
            0 => Ok(Command::SourceRead),
            1 => Ok(Command::TargetRead),
            2 => Ok(Command::SourceCopy),
            3 => Ok(Command::TargetCopy),
            _ => Err(Error::UnknownCommand(x)),
        }
    }
}

/// Splits a command token into command and transfer length.
#[inline]
pub fn split_token(token: u64) -> Result<(Command, u64)> {
    Ok((Command::try_from(token & 3)?, (token >> 2) + 1))
}

/// Outcome of a single dispatcher step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// One command was applied, more may follow.
    Continue,
    /// The footer was reached.
    Done,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum State {
    Ready,
    Done,
    Failed,
}

/// Streaming patch application state.
///
/// The session never owns the streams: source, target and patch are handed
/// in on every step, so the caller decides how they are opened and buffered.
///
/// Apply a patch step by step:
/// ```
/// use std::io::Cursor;
/// use beatpatch::{verify_marker, PatchSession, Step};
///
/// fn bps(source: &[u8], patch: &[u8]) -> beatpatch::Result<Vec<u8>> {
///     let mut source = Cursor::new(source);
///     let mut patch = Cursor::new(patch);
///     let mut target = Cursor::new(Vec::new());
///     verify_marker(&mut patch)?;
///     let mut session = PatchSession::start(&mut patch)?;
///     while session.next(&mut source, &mut target, &mut patch)? == Step::Continue {}
///     session.finish()?;
///     Ok(target.into_inner())
/// }
/// ```
#[derive(Debug)]
pub struct PatchSession {
    patch_size: u64,
    header: Header,
    output_offset: u64,
    source_offset: i64,
    target_offset: i64,
    state: State,
}

impl PatchSession {
    /// Read the patch header and initialize the cursors.
    ///
    /// Should be called once, after `verify_marker`.
    pub fn start<P: Read + Seek>(patch: &mut P) -> Result<Self> {
        let patch_size = patch.seek(SeekFrom::End(0))?;
        patch.seek(SeekFrom::Start(MARKER.len() as u64))?;
        let header = Header::read_from(patch)?;
        if header.metadata_size > 0 {
            let skip = i64::try_from(header.metadata_size)
                .map_err(|_| io::Error::new(ErrorKind::InvalidData, "metadata too large"))?;
            patch.seek(SeekFrom::Current(skip))?;
        }
        log::debug!(
            "bps header: source_size={}, target_size={}, metadata_size={}",
            header.source_size,
            header.target_size,
            header.metadata_size
        );

        Ok(PatchSession {
            patch_size,
            header,
            output_offset: 0,
            source_offset: 0,
            target_offset: 0,
            state: State::Ready,
        })
    }

    /// Apply exactly one command.
    ///
    /// Returns `Step::Done` once the patch position reaches the footer, and
    /// keeps returning it on later calls. After an error the session is
    /// unusable and every later call fails with `Error::Halted`.
    pub fn next<S, T, P>(&mut self, source: &mut S, target: &mut T, patch: &mut P) -> Result<Step>
    where
        S: Read + Seek,
        T: Read + Write + Seek,
        P: Read + Seek,
    {
        match self.state {
            State::Done => return Ok(Step::Done),
            State::Failed => return Err(Error::Halted),
            State::Ready => (),
        }
        match self.dispatch(source, target, patch) {
            Ok(step) => {
                if step == Step::Done {
                    self.state = State::Done;
                }
                Ok(step)
            }
            Err(e) => {
                log::debug!("bps command failed at output offset {}: {}", self.output_offset, e);
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    /// Apply all remaining commands.
    pub fn run<S, T, P>(&mut self, source: &mut S, target: &mut T, patch: &mut P) -> Result<()>
    where
        S: Read + Seek,
        T: Read + Write + Seek,
        P: Read + Seek,
    {
        while self.next(source, target, patch)? == Step::Continue {}
        Ok(())
    }

    /// Check that the produced output has exactly the declared target size.
    ///
    /// Returns the output size.
    pub fn finish(&self) -> Result<u64> {
        if self.output_offset != self.header.target_size {
            return Err(Error::TargetSizeMismatch {
                expected: self.header.target_size,
                actual: self.output_offset,
            });
        }
        Ok(self.output_offset)
    }

    fn dispatch<S, T, P>(&mut self, source: &mut S, target: &mut T, patch: &mut P) -> Result<Step>
    where
        S: Read + Seek,
        T: Read + Write + Seek,
        P: Read + Seek,
    {
        let pos = patch.stream_position()?;
        if pos >= self.patch_size.saturating_sub(FOOTER_SIZE) {
            return Ok(Step::Done);
        }

        let (command, length) = split_token(varint::decode_number(patch)?)?;
        log::trace!("bps command at {}: {:?}, length {}", pos, command, length);
        match command {
            Command::SourceRead => self.source_read(length, source, target)?,
            Command::TargetRead => self.target_read(length, target, patch)?,
            Command::SourceCopy => self.source_copy(length, source, target, patch)?,
            Command::TargetCopy => self.target_copy(length, target, patch)?,
        }
        Ok(Step::Continue)
    }

    /// Copy source bytes at the output offset.
    fn source_read<S, T>(&mut self, length: u64, source: &mut S, target: &mut T) -> Result<()>
    where
        S: Read + Seek,
        T: Write + Seek,
    {
        source.seek(SeekFrom::Start(self.output_offset))?;
        target.seek(SeekFrom::Start(self.output_offset))?;
        for _ in 0..length {
            let byte = read_byte(source)?;
            target.write_all(&[byte])?;
            self.output_offset += 1;
        }
        Ok(())
    }

    /// Copy literal bytes embedded in the patch.
    fn target_read<T, P>(&mut self, length: u64, target: &mut T, patch: &mut P) -> Result<()>
    where
        T: Write + Seek,
        P: Read,
    {
        target.seek(SeekFrom::Start(self.output_offset))?;
        for _ in 0..length {
            let byte = read_byte(patch)?;
            target.write_all(&[byte])?;
            self.output_offset += 1;
        }
        Ok(())
    }

    /// Copy source bytes from the relative source cursor.
    fn source_copy<S, T, P>(
        &mut self,
        length: u64,
        source: &mut S,
        target: &mut T,
        patch: &mut P,
    ) -> Result<()>
    where
        S: Read + Seek,
        T: Write + Seek,
        P: Read,
    {
        self.source_offset = shift_cursor(self.source_offset, varint::decode_offset(patch)?)?;
        log::trace!("bps source offset: {}", self.source_offset);

        target.seek(SeekFrom::Start(self.output_offset))?;
        source.seek(SeekFrom::Start(cursor_position(self.source_offset)?))?;
        for _ in 0..length {
            let byte = read_byte(source)?;
            target.write_all(&[byte])?;
            self.output_offset += 1;
            self.source_offset += 1;
        }
        Ok(())
    }

    /// Copy already written target bytes from the relative target cursor.
    ///
    /// Every byte is read only after the previous one was written, so a
    /// cursor just behind the output offset repeats a run.
    fn target_copy<T, P>(&mut self, length: u64, target: &mut T, patch: &mut P) -> Result<()>
    where
        T: Read + Write + Seek,
        P: Read,
    {
        self.target_offset = shift_cursor(self.target_offset, varint::decode_offset(patch)?)?;
        log::trace!("bps target offset: {}", self.target_offset);

        for _ in 0..length {
            target.seek(SeekFrom::Start(cursor_position(self.target_offset)?))?;
            let byte = read_byte(target)?;
            target.seek(SeekFrom::Start(self.output_offset))?;
            target.write_all(&[byte])?;
            self.output_offset += 1;
            self.target_offset += 1;
        }
        Ok(())
    }

    /// Total patch length, footer included.
    pub fn patch_size(&self) -> u64 {
        self.patch_size
    }

    /// Source size declared by the header.
    pub fn source_size(&self) -> u64 {
        self.header.source_size
    }

    /// Target size declared by the header.
    pub fn target_size(&self) -> u64 {
        self.header.target_size
    }

    /// Length of the skipped metadata block.
    pub fn metadata_size(&self) -> u64 {
        self.header.metadata_size
    }

    /// Next write position in the target.
    pub fn output_offset(&self) -> u64 {
        self.output_offset
    }

    /// Current Source-Copy cursor.
    pub fn source_offset(&self) -> i64 {
        self.source_offset
    }

    /// Current Target-Copy cursor.
    pub fn target_offset(&self) -> i64 {
        self.target_offset
    }

    /// Whether the footer has been reached.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }
}

#[inline]
fn read_byte<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut byte = [0u8; 1];
    r.read_exact(&mut byte)?;
    Ok(byte[0])
}

#[inline]
pub(crate) fn shift_cursor(cursor: i64, delta: i64) -> io::Result<i64> {
    cursor
        .checked_add(delta)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "relative offset overflow"))
}

#[inline]
pub(crate) fn cursor_position(cursor: i64) -> io::Result<u64> {
    u64::try_from(cursor).map_err(|_| {
        io::Error::new(
            ErrorKind::InvalidInput,
            "relative offset points before the start of the file",
        )
    })
}
