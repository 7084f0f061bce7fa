#![allow(unused)]

use beatpatch::varint::{encode_number, encode_offset};
use beatpatch::{verify_marker, Bpspatch, PatchSession};
use chrono::Utc;
use rand::random;
use std::fs;
use std::io;
use std::path;

/// Builds well-formed patches and tracks the target they describe.
pub struct PatchBuilder {
    source: Vec<u8>,
    target: Vec<u8>,
    metadata: Vec<u8>,
    body: Vec<u8>,
    source_offset: i64,
    target_offset: i64,
}

impl PatchBuilder {
    pub fn new(source: &[u8]) -> Self {
        PatchBuilder {
            source: source.to_vec(),
            target: Vec::new(),
            metadata: Vec::new(),
            body: Vec::new(),
            source_offset: 0,
            target_offset: 0,
        }
    }

    pub fn metadata(&mut self, metadata: &[u8]) -> &mut Self {
        self.metadata = metadata.to_vec();
        self
    }

    pub fn source_read(&mut self, len: usize) -> &mut Self {
        let at = self.target.len();
        self.token(0, len);
        let bytes = self.source[at..at + len].to_vec();
        self.target.extend_from_slice(&bytes[..]);
        self
    }

    pub fn target_read(&mut self, data: &[u8]) -> &mut Self {
        self.token(1, data.len());
        self.body.extend_from_slice(data);
        self.target.extend_from_slice(data);
        self
    }

    pub fn source_copy(&mut self, start: usize, len: usize) -> &mut Self {
        self.token(2, len);
        encode_offset(start as i64 - self.source_offset, &mut self.body);
        let bytes = self.source[start..start + len].to_vec();
        self.target.extend_from_slice(&bytes[..]);
        self.source_offset = (start + len) as i64;
        self
    }

    pub fn target_copy(&mut self, start: usize, len: usize) -> &mut Self {
        self.token(3, len);
        encode_offset(start as i64 - self.target_offset, &mut self.body);
        for i in start..start + len {
            let byte = self.target[i];
            self.target.push(byte);
        }
        self.target_offset = (start + len) as i64;
        self
    }

    pub fn target(&self) -> &[u8] {
        &self.target[..]
    }

    /// Patch with correct sizes and checksums.
    pub fn build(&self) -> Vec<u8> {
        self.build_with_target_size(self.target.len() as u64)
    }

    pub fn build_with_target_size(&self, target_size: u64) -> Vec<u8> {
        let mut p = b"BPS1".to_vec();
        encode_number(self.source.len() as u64, &mut p);
        encode_number(target_size, &mut p);
        encode_number(self.metadata.len() as u64, &mut p);
        p.extend_from_slice(&self.metadata[..]);
        p.extend_from_slice(&self.body[..]);
        p.extend_from_slice(&crc32fast::hash(&self.source[..]).to_le_bytes());
        p.extend_from_slice(&crc32fast::hash(&self.target[..]).to_le_bytes());
        let crc = crc32fast::hash(&p[..]);
        p.extend_from_slice(&crc.to_le_bytes());
        p
    }

    fn token(&mut self, kind: u64, len: usize) {
        assert!(len > 0);
        encode_number(((len as u64 - 1) << 2) | kind, &mut self.body);
    }
}

/// Apply a patch through the streaming session.
pub fn stream_patch(s: &[u8], p: &[u8]) -> beatpatch::Result<Vec<u8>> {
    let mut source = io::Cursor::new(s);
    let mut patch = io::Cursor::new(p);
    let mut target = io::Cursor::new(Vec::new());
    verify_marker(&mut patch)?;
    let mut session = PatchSession::start(&mut patch)?;
    session.run(&mut source, &mut target, &mut patch)?;
    session.finish()?;
    Ok(target.into_inner())
}

/// Apply a patch through the in-memory patcher.
pub fn memory_patch(s: &[u8], p: &[u8]) -> beatpatch::Result<Vec<u8>> {
    let patcher = Bpspatch::new(p)?;
    let mut t = Vec::with_capacity(Ord::min(patcher.hint_target_size(), 1 << 20) as usize);
    patcher.apply(s, io::Cursor::new(&mut t))?;
    Ok(t)
}

pub fn create_temp<B: AsRef<[u8]>>(bytes: B) -> io::Result<path::PathBuf> {
    let dir = std::env::temp_dir().join("beatpatch-test");
    fs::create_dir_all(dir.as_path())?;

    let id = format!("{}-{:x}", Utc::now().format("%s.%f"), random::<u32>());
    let p = dir.join(id);

    fs::write(p.as_path(), bytes)?;
    Ok(p)
}
