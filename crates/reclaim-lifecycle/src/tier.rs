//! Live tier views: what the filesystem reports about each copy of an entry.

use reclaim_policy::FileType;
use serde::{Deserialize, Serialize};

/// Freshly queried state of one tier's copy of an entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCopy {
    /// File type of the copy.
    pub ftype: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, epoch seconds.
    pub mtime: u64,
    /// Last access time, epoch seconds.
    pub atime: u64,
    /// A reader currently holds the copy open.
    pub being_read: bool,
    /// A writer currently holds the copy open.
    pub being_written: bool,
    /// The copy lost authority in a previous size-conflict resolution; its
    /// mtime no longer counts in comparisons.
    pub invalidated: bool,
}

impl TierCopy {
    /// Effective modification time for cross-tier comparison.
    ///
    /// An invalidated copy is forced to look older than anything, so the
    /// surviving side wins the next comparison. This replaces the historical
    /// trick of overwriting the stored mtime with a sentinel.
    pub fn effective_mtime(&self) -> u64 {
        if self.invalidated {
            0
        } else {
            self.mtime
        }
    }

    /// Whether a transfer currently touches this copy.
    pub fn in_transfer(&self) -> bool {
        self.being_read || self.being_written
    }
}

/// Pending-copy timeout markers on the cache side.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyTimeout {
    /// No timed-out transfer.
    #[default]
    None,
    /// A copy into the cache exceeded its deadline; the cache copy is
    /// incomplete.
    CopyIn,
    /// A copy out of the cache (archiving) exceeded its deadline; the
    /// in-flight marker is stale.
    CopyOut,
}

/// The cache tier's view of an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheView {
    /// The live copy, `None` if it disappeared.
    pub copy: Option<TierCopy>,
    /// Timed-out transfer markers.
    pub timeout: CopyTimeout,
    /// Recorded metadata (owner/mode) diverged from the live copy and needs
    /// a refresh before status comparison.
    pub metadata_stale: bool,
}

/// The reference tier's view of an entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefView {
    /// The reference location is known but not currently mounted.
    Unmounted,
    /// No reference copy exists.
    Missing,
    /// The reference copy, freshly queried.
    Present(TierCopy),
}

/// Classified cache status, the first axis of the decision cross product.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheState {
    /// Cache copy disappeared.
    Missing,
    /// Cache copy exists with a different file type than recorded.
    WrongType,
    /// Metadata needs refreshing before comparison.
    StaleMetadata,
    /// Copy is present and quiescent.
    UpToDate,
    /// A writer holds the copy.
    BeingWritten,
    /// A reader holds the copy.
    BeingRead,
    /// Copy-into-cache timed out.
    CopyInTimedOut,
    /// Copy-out-of-cache timed out.
    CopyOutTimedOut,
}

impl CacheView {
    /// Classifies this view against the recorded file type.
    pub fn classify(&self, recorded_type: Option<FileType>) -> CacheState {
        match self.timeout {
            CopyTimeout::CopyIn => return CacheState::CopyInTimedOut,
            CopyTimeout::CopyOut => return CacheState::CopyOutTimedOut,
            CopyTimeout::None => {}
        }
        let Some(copy) = &self.copy else {
            return CacheState::Missing;
        };
        if let Some(recorded) = recorded_type {
            if recorded != copy.ftype {
                return CacheState::WrongType;
            }
        }
        if copy.being_written {
            return CacheState::BeingWritten;
        }
        if copy.being_read {
            return CacheState::BeingRead;
        }
        if self.metadata_stale {
            return CacheState::StaleMetadata;
        }
        CacheState::UpToDate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy(ftype: FileType) -> TierCopy {
        TierCopy {
            ftype,
            size: 100,
            mtime: 1000,
            atime: 1000,
            being_read: false,
            being_written: false,
            invalidated: false,
        }
    }

    #[test]
    fn test_classify_missing() {
        let view = CacheView::default();
        assert_eq!(view.classify(Some(FileType::File)), CacheState::Missing);
    }

    #[test]
    fn test_classify_wrong_type() {
        let view = CacheView {
            copy: Some(copy(FileType::Directory)),
            ..Default::default()
        };
        assert_eq!(view.classify(Some(FileType::File)), CacheState::WrongType);
    }

    #[test]
    fn test_classify_up_to_date_without_recorded_type() {
        let view = CacheView {
            copy: Some(copy(FileType::File)),
            ..Default::default()
        };
        assert_eq!(view.classify(None), CacheState::UpToDate);
    }

    #[test]
    fn test_classify_transfer_states() {
        let mut c = copy(FileType::File);
        c.being_written = true;
        let view = CacheView {
            copy: Some(c),
            ..Default::default()
        };
        assert_eq!(view.classify(Some(FileType::File)), CacheState::BeingWritten);
    }

    #[test]
    fn test_timeout_takes_precedence() {
        let view = CacheView {
            copy: Some(copy(FileType::File)),
            timeout: CopyTimeout::CopyIn,
            metadata_stale: true,
        };
        assert_eq!(
            view.classify(Some(FileType::File)),
            CacheState::CopyInTimedOut
        );
    }

    #[test]
    fn test_effective_mtime_of_invalidated_copy() {
        let mut c = copy(FileType::File);
        c.invalidated = true;
        assert_eq!(c.effective_mtime(), 0);
        c.invalidated = false;
        assert_eq!(c.effective_mtime(), 1000);
    }
}
