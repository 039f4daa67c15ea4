//! Entry identity and attribute model.
//!
//! Attributes are stored as `Option<T>` fields: `None` means the attribute
//! was never fetched or does not apply, and any policy comparison over it is
//! `Indeterminate`. A derived [`AttrMask`] records which attributes are
//! present, mirroring the mask the database layer uses to describe a row.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque composite key identifying one filesystem object across renames.
///
/// `fs_key` distinguishes filesystems (a registered namespace gets a stable
/// key), `inode` is the object number within it. Never reused while
/// referenced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    /// Stable key of the filesystem the entry lives on.
    pub fs_key: u64,
    /// Inode (or handle-derived object) number within that filesystem.
    pub inode: u64,
}

impl EntryId {
    /// Creates an entry id from its two components.
    pub fn new(fs_key: u64, inode: u64) -> Self {
        Self { fs_key, inode }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{}", self.fs_key, self.inode)
    }
}

/// File type of an entry as reported by the filesystem.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Anything else (device, socket, fifo).
    Other,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileType::File => "file",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
            FileType::Other => "other",
        };
        f.write_str(s)
    }
}

/// Synchronization status of an entry with respect to its reference tier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Entry was created locally and never examined.
    New,
    /// Cache and reference copies agree.
    Synchronized,
    /// Cache copy is newer and needs archiving.
    Modified,
    /// A copy between tiers is currently running.
    TransferInProgress,
    /// State could not be determined (latency window, size conflict).
    Unknown,
    /// Database record is known stale; corrected on the next inventory pass.
    Invalid,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryStatus::New => "new",
            EntryStatus::Synchronized => "synchronized",
            EntryStatus::Modified => "modified",
            EntryStatus::TransferInProgress => "transfer_in_progress",
            EntryStatus::Unknown => "unknown",
            EntryStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Fixed enumeration of attribute kinds a policy criterion can select.
///
/// Discriminants double as bit positions in [`AttrMask`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttrKind {
    /// Full path from the filesystem root.
    Fullpath = 0,
    /// Final path component.
    Name = 1,
    /// Identifier of the parent directory.
    ParentId = 2,
    /// File type.
    Type = 3,
    /// Size in bytes.
    Size = 4,
    /// Owner (user name).
    Owner = 5,
    /// Group name.
    Group = 6,
    /// Last access time, epoch seconds.
    LastAccess = 7,
    /// Last modification time, epoch seconds.
    LastMod = 8,
    /// Number of direct children (directories only).
    DirCount = 9,
    /// Stripe count (striped-layout filesystems).
    StripeCount = 10,
    /// Storage pool the entry is striped on.
    PoolName = 11,
    /// Synchronization status.
    Status = 12,
    /// Matched fileclass tag, stored back by a previous policy run.
    Fileclass = 13,
}

impl AttrKind {
    /// All attribute kinds, in mask-bit order.
    pub const ALL: [AttrKind; 14] = [
        AttrKind::Fullpath,
        AttrKind::Name,
        AttrKind::ParentId,
        AttrKind::Type,
        AttrKind::Size,
        AttrKind::Owner,
        AttrKind::Group,
        AttrKind::LastAccess,
        AttrKind::LastMod,
        AttrKind::DirCount,
        AttrKind::StripeCount,
        AttrKind::PoolName,
        AttrKind::Status,
        AttrKind::Fileclass,
    ];

    /// The mask bit for this attribute kind.
    pub fn bit(self) -> u32 {
        1u32 << (self as u32)
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttrKind::Fullpath => "path",
            AttrKind::Name => "name",
            AttrKind::ParentId => "parent",
            AttrKind::Type => "type",
            AttrKind::Size => "size",
            AttrKind::Owner => "owner",
            AttrKind::Group => "group",
            AttrKind::LastAccess => "last_access",
            AttrKind::LastMod => "last_mod",
            AttrKind::DirCount => "dircount",
            AttrKind::StripeCount => "stripe_count",
            AttrKind::PoolName => "pool",
            AttrKind::Status => "status",
            AttrKind::Fileclass => "fileclass",
        };
        f.write_str(s)
    }
}

/// Bitmask over [`AttrKind`], recording which attributes are required or
/// present.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrMask(pub u32);

impl AttrMask {
    /// The empty mask.
    pub const EMPTY: AttrMask = AttrMask(0);

    /// Mask containing a single attribute kind.
    pub fn of(kind: AttrKind) -> Self {
        AttrMask(kind.bit())
    }

    /// Union of two masks.
    pub fn union(self, other: AttrMask) -> Self {
        AttrMask(self.0 | other.0)
    }

    /// Whether the mask contains the given attribute kind.
    pub fn contains(self, kind: AttrKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether every bit of `other` is also set in `self`.
    pub fn covers(self, other: AttrMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the mask is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Attribute set of one entry.
///
/// Every field is optional; absence means "not fetched / not applicable" and
/// must never be collapsed to a zero value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryAttrs {
    /// Full path from the filesystem root.
    pub fullpath: Option<String>,
    /// Final path component.
    pub name: Option<String>,
    /// Parent directory id.
    pub parent: Option<EntryId>,
    /// File type.
    pub ftype: Option<FileType>,
    /// Size in bytes.
    pub size: Option<u64>,
    /// Owner user name.
    pub owner: Option<String>,
    /// Group name.
    pub group: Option<String>,
    /// Last access time, epoch seconds.
    pub last_access: Option<u64>,
    /// Last modification time, epoch seconds.
    pub last_mod: Option<u64>,
    /// Number of direct children (directories).
    pub dircount: Option<u64>,
    /// Stripe count.
    pub stripe_count: Option<u32>,
    /// Storage pool name.
    pub pool_name: Option<String>,
    /// Synchronization status.
    pub status: Option<EntryStatus>,
    /// Fileclass tag from a previous policy run.
    pub fileclass: Option<String>,
    /// The reference copy lost authority in a size-conflict resolution; its
    /// mtime is ignored in tier comparisons until the copies agree again.
    pub ref_invalidated: Option<bool>,
}

impl EntryAttrs {
    /// Derives the presence mask from the populated fields.
    pub fn mask(&self) -> AttrMask {
        let mut mask = AttrMask::EMPTY;
        let mut set = |cond: bool, kind: AttrKind| {
            if cond {
                mask = mask.union(AttrMask::of(kind));
            }
        };
        set(self.fullpath.is_some(), AttrKind::Fullpath);
        set(self.name.is_some(), AttrKind::Name);
        set(self.parent.is_some(), AttrKind::ParentId);
        set(self.ftype.is_some(), AttrKind::Type);
        set(self.size.is_some(), AttrKind::Size);
        set(self.owner.is_some(), AttrKind::Owner);
        set(self.group.is_some(), AttrKind::Group);
        set(self.last_access.is_some(), AttrKind::LastAccess);
        set(self.last_mod.is_some(), AttrKind::LastMod);
        set(self.dircount.is_some(), AttrKind::DirCount);
        set(self.stripe_count.is_some(), AttrKind::StripeCount);
        set(self.pool_name.is_some(), AttrKind::PoolName);
        set(self.status.is_some(), AttrKind::Status);
        set(self.fileclass.is_some(), AttrKind::Fileclass);
        mask
    }

    /// Merges `fresh` into `self`: present fields of `fresh` win.
    pub fn merge(&mut self, fresh: &EntryAttrs) {
        macro_rules! take {
            ($field:ident) => {
                if fresh.$field.is_some() {
                    self.$field = fresh.$field.clone();
                }
            };
        }
        take!(fullpath);
        take!(name);
        take!(parent);
        take!(ftype);
        take!(size);
        take!(owner);
        take!(group);
        take!(last_access);
        take!(last_mod);
        take!(dircount);
        take!(stripe_count);
        take!(pool_name);
        take!(status);
        take!(fileclass);
        take!(ref_invalidated);
    }
}
