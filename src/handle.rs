// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-open byte buffer backing pseudo-file handles.
// Author: Lukas Bower

//! Open pseudo-file handles.
//!
//! A [`StrHandle`] owns the bytes produced at open time. Reads and writes move a cursor over that
//! buffer, writes never grow it past the capacity declared by the node, and an optional commit hook
//! receives the final contents exactly once when the handle is closed or dropped.

use std::fmt;
use std::io::{self, SeekFrom};

use bitflags::bitflags;
use log::debug;

use crate::FsError;

bitflags! {
    /// Access-mode flags supplied to `open`, using the Linux `O_*` encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for writing only.
        const WRONLY = 0o1;
        /// Open for reading and writing.
        const RDWR = 0o2;
    }
}

impl OpenFlags {
    /// Open for reading only.
    pub const RDONLY: Self = Self::empty();

    /// Whether the flags request write access.
    #[must_use]
    pub fn wants_write(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }

    /// Whether the flags request read access.
    #[must_use]
    pub fn wants_read(self) -> bool {
        !self.contains(Self::WRONLY) || self.contains(Self::RDWR)
    }
}

bitflags! {
    /// Operations a node permits on its handles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        /// Reads allowed.
        const READ = 0b01;
        /// Writes allowed.
        const WRITE = 0b10;
    }
}

bitflags! {
    /// Readiness bits reported by [`StrHandle::poll`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PollEvents: u8 {
        /// Handle can be read.
        const READ = 0b01;
        /// Handle can be written.
        const WRITE = 0b10;
    }
}

/// Callback receiving the final handle contents on close.
pub type CommitHook = Box<dyn FnOnce(&[u8]) + Send>;

/// Open handle over an in-memory byte buffer.
pub struct StrHandle {
    name: String,
    access: Access,
    data: Vec<u8>,
    capacity: usize,
    cursor: usize,
    commit: Option<CommitHook>,
}

impl fmt::Debug for StrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrHandle")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("len", &self.data.len())
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("commit", &self.commit.is_some())
            .finish()
    }
}

impl StrHandle {
    /// Wrap `data` in a handle. The declared capacity is at least the initial length.
    #[must_use]
    pub fn new(name: impl Into<String>, access: Access, data: Vec<u8>, capacity: usize) -> Self {
        let capacity = capacity.max(data.len());
        Self {
            name: name.into(),
            access,
            data,
            capacity,
            cursor: 0,
            commit: None,
        }
    }

    /// Attach a hook fired with the buffer contents when the handle closes.
    #[must_use]
    pub fn with_commit(mut self, hook: CommitHook) -> Self {
        self.commit = Some(hook);
        self
    }

    /// Name of the node this handle was opened on.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access granted to the handle.
    #[must_use]
    pub fn access(&self) -> Access {
        self.access
    }

    /// Number of valid bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of bytes the buffer may hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current cursor position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Borrow the current buffer contents.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Copy bytes from the cursor into `buf`. Returns zero once the cursor reaches the end.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        if !self.access.contains(Access::READ) {
            return Err(FsError::access(format!("{} not opened for reading", self.name)));
        }
        if self.cursor >= self.data.len() {
            return Ok(0);
        }
        let count = buf.len().min(self.data.len() - self.cursor);
        buf[..count].copy_from_slice(&self.data[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }

    /// Copy bytes from `buf` into the buffer at the cursor. Writes stop at the declared capacity,
    /// so the count may be short and is zero once the buffer is full.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        if !self.access.contains(Access::WRITE) {
            return Err(FsError::access(format!("{} not opened for writing", self.name)));
        }
        let count = buf.len().min(self.capacity.saturating_sub(self.cursor));
        if count == 0 {
            return Ok(0);
        }
        let end = self.cursor + count;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.cursor..end].copy_from_slice(&buf[..count]);
        self.cursor = end;
        Ok(count)
    }

    /// Move the cursor. The resulting position must lie within the declared capacity.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::Current(delta) => (self.cursor as i64).saturating_add(delta),
            SeekFrom::End(delta) => (self.data.len() as i64).saturating_add(delta),
        };
        if target < 0 || target as u64 > self.capacity as u64 {
            return Err(FsError::InvalidSeek(target));
        }
        self.cursor = target as usize;
        Ok(target as u64)
    }

    /// Report which of the requested events the handle supports.
    #[must_use]
    pub fn poll(&self, events: PollEvents) -> PollEvents {
        let mut ready = PollEvents::empty();
        if self.access.contains(Access::READ) {
            ready |= PollEvents::READ;
        }
        if self.access.contains(Access::WRITE) {
            ready |= PollEvents::WRITE;
        }
        ready & events
    }

    /// Size reported to a size poll.
    #[must_use]
    pub fn poll_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Close the handle, firing the commit hook if one is attached.
    pub fn close(mut self) {
        self.fire_commit();
    }

    fn fire_commit(&mut self) {
        if let Some(hook) = self.commit.take() {
            debug!("committing {} bytes from {}", self.data.len(), self.name);
            hook(&self.data);
        }
    }
}

impl Drop for StrHandle {
    fn drop(&mut self) {
        self.fire_commit();
    }
}

fn io_error(err: FsError) -> io::Error {
    let kind = match err {
        FsError::AccessDenied(_) => io::ErrorKind::PermissionDenied,
        FsError::InvalidSeek(_) => io::ErrorKind::InvalidInput,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err)
}

impl io::Read for StrHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StrHandle::read(self, buf).map_err(io_error)
    }
}

impl io::Write for StrHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        StrHandle::write(self, buf).map_err(io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for StrHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        StrHandle::seek(self, pos).map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::{Arc, Mutex};

    fn rw(data: &[u8]) -> StrHandle {
        StrHandle::new("buf", Access::READ | Access::WRITE, data.to_vec(), data.len())
    }

    #[test]
    fn open_flags_decode_access() {
        assert!(OpenFlags::RDONLY.wants_read());
        assert!(!OpenFlags::RDONLY.wants_write());
        assert!(!OpenFlags::WRONLY.wants_read());
        assert!(OpenFlags::WRONLY.wants_write());
        assert!(OpenFlags::RDWR.wants_read());
        assert!(OpenFlags::RDWR.wants_write());
    }

    #[test]
    fn read_stops_at_end_of_buffer() {
        let mut handle = StrHandle::new("r", Access::READ, b"abcdef".to_vec(), 6);
        let mut buf = [0u8; 4];
        assert_eq!(handle.read(&mut buf).expect("read"), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(handle.read(&mut buf).expect("read"), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(handle.read(&mut buf).expect("read"), 0);
    }

    #[test]
    fn writes_are_bounded_by_capacity() {
        let mut handle = rw(&[0u8; 4]);
        assert_eq!(handle.write(b"xyz").expect("write"), 3);
        assert_eq!(handle.write(b"123").expect("write"), 1);
        assert_eq!(handle.write(b"9").expect("write"), 0);
        assert_eq!(handle.contents(), b"xyz1");
    }

    #[test]
    fn partial_write_keeps_tail() {
        let mut handle = rw(b"aaaa");
        handle.write(b"bb").expect("write");
        assert_eq!(handle.contents(), b"bbaa");
    }

    #[test]
    fn wrong_direction_io_is_denied() {
        let mut ro = StrHandle::new("ro", Access::READ, vec![1, 2], 2);
        assert!(matches!(ro.write(b"x"), Err(FsError::AccessDenied(_))));
        let mut wo = StrHandle::new("wo", Access::WRITE, vec![1, 2], 2);
        let mut buf = [0u8; 2];
        assert!(matches!(wo.read(&mut buf), Err(FsError::AccessDenied(_))));
    }

    #[test]
    fn seek_is_confined_to_capacity() {
        let mut handle = rw(b"abcd");
        assert_eq!(handle.seek(SeekFrom::End(-1)).expect("seek"), 3);
        assert_eq!(handle.seek(SeekFrom::Current(1)).expect("seek"), 4);
        assert_eq!(handle.seek(SeekFrom::Start(0)).expect("seek"), 0);
        assert_eq!(handle.seek(SeekFrom::Current(-1)), Err(FsError::InvalidSeek(-1)));
        assert_eq!(handle.seek(SeekFrom::Start(5)), Err(FsError::InvalidSeek(5)));
        assert_eq!(handle.position(), 0);
    }

    #[test]
    fn poll_reports_access_and_size() {
        let handle = StrHandle::new("ro", Access::READ, vec![0; 7], 7);
        assert_eq!(handle.poll(PollEvents::all()), PollEvents::READ);
        assert_eq!(handle.poll(PollEvents::WRITE), PollEvents::empty());
        assert_eq!(handle.poll_size(), 7);
    }

    #[test]
    fn commit_fires_once_on_close() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut handle = rw(&[0u8; 3]).with_commit(Box::new(move |data: &[u8]| {
            sink.lock().expect("sink").push(data.to_vec());
        }));
        handle.write(b"hey").expect("write");
        handle.close();
        assert_eq!(*seen.lock().expect("seen"), vec![b"hey".to_vec()]);
    }

    #[test]
    fn commit_fires_on_drop() {
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        {
            let _handle = rw(&[0u8; 3]).with_commit(Box::new(move |_: &[u8]| {
                *sink.lock().expect("sink") += 1;
            }));
        }
        assert_eq!(*seen.lock().expect("seen"), 1);
    }

    #[test]
    fn std_io_traits_drive_the_buffer() {
        let mut handle = rw(&[0u8; 5]);
        handle.write_all(b"hello").expect("write_all");
        std::io::Seek::seek(&mut handle, SeekFrom::Start(0)).expect("rewind");
        let mut out = Vec::new();
        handle.read_to_end(&mut out).expect("read_to_end");
        assert_eq!(out, b"hello");
        let err = handle.write_all(b"!").expect_err("buffer is full");
        assert_eq!(err.kind(), std::io::ErrorKind::WriteZero);
    }
}
