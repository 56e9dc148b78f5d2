//! File-backed `RecordLog`.
//!
//! Mirrors the real flash log's write-ahead structure: every mutation is one
//! physical append to the backing file, and `init()` replays every frame
//! written so far to reconstruct in-RAM state. There is no in-place flash
//! rewrite to emulate wear-leveling for; a plain append is the host-side
//! equivalent.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::LogError;

use super::memory::MemoryLog;
use super::RecordLog;

const OP_SET: u8 = 1;
const OP_DELETE: u8 = 2;
const OP_PREALLOCATE: u8 = 3;
const OP_APPEND_BYTES: u8 = 4;
const OP_SET_COUNTER: u8 = 5;
const OP_NEXT_COUNTER: u8 = 6;
const OP_VERSION: u8 = 7;
const OP_WIPE: u8 = 8;

fn io_err(e: io::Error) -> LogError {
    LogError::Io(e.to_string())
}

/// A `RecordLog` backed by an append-only frame file.
pub struct FileLog {
    inner: MemoryLog,
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
}

impl FileLog {
    /// Open (creating if absent) the log file at `path`. Does not replay
    /// frames yet; call `init()` before any other `RecordLog` method.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(io_err)?;
        Ok(Self {
            inner: MemoryLog::new(),
            file,
            path,
        })
    }

    fn write_frame(&mut self, op: u8, key: u16, payload: &[u8]) -> Result<(), LogError> {
        let mut frame = Vec::with_capacity(1 + 2 + 4 + payload.len());
        frame.push(op);
        frame.extend_from_slice(&key.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(payload);
        self.file.write_all(&frame).map_err(io_err)?;
        self.file.flush().map_err(io_err)
    }

    fn replay(&mut self) -> Result<(), LogError> {
        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf).map_err(io_err)?;

        let mut pos = 0usize;
        while pos < buf.len() {
            if buf.len() - pos < 7 {
                return Err(LogError::Corrupt("truncated frame header".into()));
            }
            let op = buf[pos];
            let key = u16::from_le_bytes([buf[pos + 1], buf[pos + 2]]);
            let len = u32::from_le_bytes([buf[pos + 3], buf[pos + 4], buf[pos + 5], buf[pos + 6]]) as usize;
            pos += 7;
            if buf.len() - pos < len {
                return Err(LogError::Corrupt("truncated frame payload".into()));
            }
            let payload = &buf[pos..pos + len];
            pos += len;

            match op {
                OP_SET => self.inner.set(key, payload)?,
                OP_DELETE => self.inner.delete(key)?,
                OP_PREALLOCATE => {
                    if payload.len() != 4 {
                        return Err(LogError::Corrupt("bad preallocate frame".into()));
                    }
                    let total_len = u32::from_le_bytes(payload.try_into().unwrap()) as usize;
                    self.inner.preallocate(key, total_len)?
                }
                OP_APPEND_BYTES => self.inner.append_bytes(key, payload)?,
                OP_SET_COUNTER => {
                    if payload.len() != 4 {
                        return Err(LogError::Corrupt("bad counter frame".into()));
                    }
                    let value = u32::from_le_bytes(payload.try_into().unwrap());
                    self.inner.set_counter(key, value)?
                }
                OP_NEXT_COUNTER => {
                    self.inner.next_counter(key)?;
                }
                OP_VERSION => self.inner.upgrade_finish()?,
                OP_WIPE => self.inner.wipe()?,
                _ => return Err(LogError::Corrupt(format!("unknown frame op {op}"))),
            }
        }
        Ok(())
    }
}

impl RecordLog for FileLog {
    fn init(&mut self) -> Result<u32, LogError> {
        self.replay()?;
        self.inner.init()
    }

    fn get(&self, key: u16) -> Result<Option<Vec<u8>>, LogError> {
        self.inner.get(key)
    }

    fn snapshot(&self) -> Result<Vec<(u16, Vec<u8>)>, LogError> {
        self.inner.snapshot()
    }

    fn set(&mut self, key: u16, buf: &[u8]) -> Result<(), LogError> {
        self.write_frame(OP_SET, key, buf)?;
        self.inner.set(key, buf)
    }

    fn set_ex(&mut self, key: u16, buf: &[u8]) -> Result<bool, LogError> {
        let existed = self.inner.get(key)?.is_some();
        self.set(key, buf)?;
        Ok(existed)
    }

    fn preallocate(&mut self, key: u16, total_len: usize) -> Result<(), LogError> {
        self.write_frame(OP_PREALLOCATE, key, &(total_len as u32).to_le_bytes())?;
        self.inner.preallocate(key, total_len)
    }

    fn append_bytes(&mut self, key: u16, chunk: &[u8]) -> Result<(), LogError> {
        self.write_frame(OP_APPEND_BYTES, key, chunk)?;
        self.inner.append_bytes(key, chunk)
    }

    fn delete(&mut self, key: u16) -> Result<(), LogError> {
        self.write_frame(OP_DELETE, key, &[])?;
        self.inner.delete(key)
    }

    fn wipe(&mut self) -> Result<(), LogError> {
        self.file.set_len(0).map_err(io_err)?;
        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        self.write_frame(OP_WIPE, 0, &[])?;
        self.inner.wipe()
    }

    fn upgrade_finish(&mut self) -> Result<(), LogError> {
        self.write_frame(OP_VERSION, 0, &[])?;
        self.inner.upgrade_finish()
    }

    fn set_counter(&mut self, key: u16, value: u32) -> Result<(), LogError> {
        self.write_frame(OP_SET_COUNTER, key, &value.to_le_bytes())?;
        self.inner.set_counter(key, value)
    }

    fn next_counter(&mut self, key: u16) -> Result<u32, LogError> {
        self.write_frame(OP_NEXT_COUNTER, key, &[])?;
        self.inner.next_counter(key)
    }
}
