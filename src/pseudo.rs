// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Static pseudo-directory tree dispatching to per-node operation tables.
// Author: Lukas Bower

//! Pseudo-filesystem shell.
//!
//! Directories are static lists of named entries. Leaves carry a [`PseudoOps`] table that decides
//! what an open produces; everything after open runs on the returned [`StrHandle`].

use std::fmt;
use std::sync::Arc;

use crate::handle::{Access, OpenFlags, StrHandle};
use crate::FsError;

/// Regular file type bit.
pub const S_IFREG: u32 = 0o100_000;
/// Directory type bit.
pub const S_IFDIR: u32 = 0o040_000;
/// Read permission for owner, group and others.
pub const FILE_R_MODE: u32 = 0o444;
/// Read and write permission for owner, group and others.
pub const FILE_RW_MODE: u32 = 0o666;
/// Read and traverse permission for owner, group and others.
pub const DIR_RX_MODE: u32 = 0o555;

/// Placeholder device id reported by pseudo nodes.
const PSEUDO_DEV: u64 = 1;
/// Placeholder inode number reported by pseudo nodes.
const PSEUDO_INO: u64 = 1;

/// Directory entry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Directory.
    Directory,
    /// Regular file.
    Regular,
}

/// Subset of `struct stat` reported for pseudo nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Device id.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// File type and permission bits.
    pub mode: u32,
    /// Size in bytes.
    pub size: u64,
}

impl Stat {
    /// Stat record for a pseudo node with the given mode.
    #[must_use]
    pub fn pseudo(mode: u32) -> Self {
        Self {
            dev: PSEUDO_DEV,
            ino: PSEUDO_INO,
            mode,
            size: 0,
        }
    }
}

/// One entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    /// Entry name.
    pub name: String,
    /// Entry type.
    pub ty: NodeType,
}

/// Operation table supplied by a leaf node.
pub trait PseudoOps: Send + Sync {
    /// Produce a handle for `name` opened with `flags`.
    fn open(&self, name: &str, flags: OpenFlags) -> Result<StrHandle, FsError>;
    /// File type and permission bits.
    fn mode(&self, name: &str) -> Result<u32, FsError>;
    /// Stat record.
    fn stat(&self, name: &str) -> Result<Stat, FsError> {
        self.mode(name).map(Stat::pseudo)
    }
}

/// Node referenced by a directory entry.
#[derive(Clone)]
pub enum PseudoNode {
    /// Nested directory.
    Directory(PseudoDir),
    /// Leaf with its operation table.
    File(Arc<dyn PseudoOps>),
}

impl PseudoNode {
    /// Type tag of the node.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            PseudoNode::Directory(_) => NodeType::Directory,
            PseudoNode::File(_) => NodeType::Regular,
        }
    }
}

impl fmt::Debug for PseudoNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PseudoNode::Directory(dir) => f.debug_tuple("Directory").field(dir).finish(),
            PseudoNode::File(_) => f.write_str("File(..)"),
        }
    }
}

/// Named entry inside a [`PseudoDir`].
#[derive(Debug, Clone)]
pub struct PseudoEntry {
    name: &'static str,
    node: PseudoNode,
}

impl PseudoEntry {
    /// Regular file entry backed by `ops`.
    #[must_use]
    pub fn file(name: &'static str, ops: Arc<dyn PseudoOps>) -> Self {
        Self {
            name,
            node: PseudoNode::File(ops),
        }
    }

    /// Directory entry.
    #[must_use]
    pub fn directory(name: &'static str, dir: PseudoDir) -> Self {
        Self {
            name,
            node: PseudoNode::Directory(dir),
        }
    }

    /// Entry name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Referenced node.
    #[must_use]
    pub fn node(&self) -> &PseudoNode {
        &self.node
    }
}

/// Static directory descriptor.
#[derive(Debug, Clone, Default)]
pub struct PseudoDir {
    entries: Vec<PseudoEntry>,
}

impl PseudoDir {
    /// Directory holding `entries` in the given order.
    #[must_use]
    pub fn new(entries: Vec<PseudoEntry>) -> Self {
        Self { entries }
    }

    /// Find a direct child by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&PseudoEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// List the direct children.
    #[must_use]
    pub fn readdir(&self) -> Vec<Dirent> {
        self.entries
            .iter()
            .map(|entry| Dirent {
                name: entry.name.to_owned(),
                ty: entry.node.node_type(),
            })
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generic directory open: read-only, empty contents.
    pub fn open(&self, name: &str, flags: OpenFlags) -> Result<StrHandle, FsError> {
        if flags.wants_write() {
            return Err(FsError::IsDirectory(name.to_owned()));
        }
        Ok(StrHandle::new(name, Access::READ, Vec::new(), 0))
    }

    /// Generic directory mode.
    #[must_use]
    pub fn mode(&self) -> u32 {
        DIR_RX_MODE | S_IFDIR
    }

    /// Generic directory stat.
    #[must_use]
    pub fn stat(&self) -> Stat {
        Stat::pseudo(self.mode())
    }
}

/// Pseudo-filesystem rooted at a static directory.
#[derive(Debug, Clone)]
pub struct PseudoFs {
    root: PseudoDir,
}

impl PseudoFs {
    /// Filesystem rooted at `root`.
    #[must_use]
    pub fn new(root: PseudoDir) -> Self {
        Self { root }
    }

    /// Resolve `path` to a node. An empty path or `/` names the root.
    pub fn lookup(&self, path: &str) -> Result<Resolved<'_>, FsError> {
        let components = split_path(path);
        let mut dir = &self.root;
        let mut resolved = Resolved::Root(&self.root);
        for (depth, component) in components.iter().enumerate() {
            if let Resolved::Entry(entry) = resolved {
                dir = match &entry.node {
                    PseudoNode::Directory(dir) => dir,
                    PseudoNode::File(_) => {
                        return Err(FsError::NotDirectory(components[..depth].join("/")))
                    }
                };
            }
            let entry = dir
                .lookup(component)
                .ok_or_else(|| FsError::NotFound(components[..=depth].join("/")))?;
            resolved = Resolved::Entry(entry);
        }
        Ok(resolved)
    }

    /// List the directory at `path`.
    pub fn readdir(&self, path: &str) -> Result<Vec<Dirent>, FsError> {
        match self.lookup(path)? {
            Resolved::Root(dir) => Ok(dir.readdir()),
            Resolved::Entry(entry) => match &entry.node {
                PseudoNode::Directory(dir) => Ok(dir.readdir()),
                PseudoNode::File(_) => Err(FsError::NotDirectory(join_path(path))),
            },
        }
    }

    /// Mode bits of the node at `path`.
    pub fn mode(&self, path: &str) -> Result<u32, FsError> {
        match self.lookup(path)? {
            Resolved::Root(dir) => Ok(dir.mode()),
            Resolved::Entry(entry) => match &entry.node {
                PseudoNode::Directory(dir) => Ok(dir.mode()),
                PseudoNode::File(ops) => ops.mode(entry.name),
            },
        }
    }

    /// Stat record of the node at `path`.
    pub fn stat(&self, path: &str) -> Result<Stat, FsError> {
        match self.lookup(path)? {
            Resolved::Root(dir) => Ok(dir.stat()),
            Resolved::Entry(entry) => match &entry.node {
                PseudoNode::Directory(dir) => Ok(dir.stat()),
                PseudoNode::File(ops) => ops.stat(entry.name),
            },
        }
    }

    /// Open the node at `path`.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<StrHandle, FsError> {
        match self.lookup(path)? {
            Resolved::Root(dir) => dir.open("", flags),
            Resolved::Entry(entry) => match &entry.node {
                PseudoNode::Directory(dir) => dir.open(&join_path(path), flags),
                PseudoNode::File(ops) => ops.open(entry.name, flags),
            },
        }
    }
}

/// Result of a path lookup.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    /// The filesystem root.
    Root(&'a PseudoDir),
    /// A named entry.
    Entry(&'a PseudoEntry),
}

impl Resolved<'_> {
    /// Type tag of the resolved node.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Resolved::Root(_) => NodeType::Directory,
            Resolved::Entry(entry) => entry.node.node_type(),
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

fn join_path(path: &str) -> String {
    split_path(path).join("/")
}
