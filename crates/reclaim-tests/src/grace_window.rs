//! Grace-window bias of the lifecycle decision table.
//!
//! Sweeps entry ages across the configured grace boundaries and checks the
//! safety property the table is built around: no destructive decision while
//! a propagation delay could still explain the observed inconsistency.

#[cfg(test)]
mod tests {
    use reclaim_lifecycle::{
        decide, CacheView, DecisionCtx, GracePolicy, LifecycleDecision, MountEntry, MountTable,
        RefView, RemoveReason, TierCopy,
    };
    use reclaim_policy::{EntryAttrs, EntryStatus, FileType};

    const NOW: u64 = 10_000_000;
    const GRACE: u64 = 300;

    fn mounts() -> MountTable {
        MountTable::new(vec![MountEntry {
            name: "data".into(),
            cache_root: "/fs".into(),
            reference_root: "/backing".into(),
            mounted: true,
        }])
    }

    fn ctx(mounts: &MountTable) -> DecisionCtx<'_> {
        DecisionCtx {
            mounts,
            grace: GracePolicy {
                latency_grace_secs: GRACE,
                recent_mod_secs: 3600,
                copy_timeout_secs: 21_600,
            },
            now: NOW,
        }
    }

    fn attrs() -> EntryAttrs {
        EntryAttrs {
            fullpath: Some("/fs/x".into()),
            ftype: Some(FileType::File),
            ..Default::default()
        }
    }

    fn copy(size: u64, mtime: u64) -> TierCopy {
        TierCopy {
            ftype: FileType::File,
            size,
            mtime,
            atime: mtime,
            being_read: false,
            being_written: false,
            invalidated: false,
        }
    }

    fn view(c: TierCopy) -> CacheView {
        CacheView {
            copy: Some(c),
            ..Default::default()
        }
    }

    fn is_destructive(d: &LifecycleDecision) -> bool {
        matches!(d, LifecycleDecision::Remove { .. })
    }

    #[test]
    fn test_reference_newer_boundary_sweep() {
        let m = mounts();
        let cache_mtime = NOW - 50_000;
        // Reference mtime sweeps from inside the window to well past it.
        for ref_age in [0, 1, GRACE - 1, GRACE, GRACE + 1, GRACE * 10] {
            let d = decide(
                &ctx(&m),
                &attrs(),
                &view(copy(4096, cache_mtime)),
                &RefView::Present(copy(4096, NOW - ref_age)),
            );
            if ref_age <= GRACE {
                assert!(
                    !is_destructive(&d),
                    "removed inside grace window (ref_age={ref_age})"
                );
                match d {
                    LifecycleDecision::UpdateOnly(u) => {
                        assert_eq!(u.status, EntryStatus::Unknown)
                    }
                    other => panic!("unexpected decision {other:?}"),
                }
            } else {
                assert_eq!(
                    d,
                    LifecycleDecision::Remove {
                        reason: RemoveReason::StaleCopy
                    },
                    "ref_age={ref_age}"
                );
            }
        }
    }

    #[test]
    fn test_cache_newer_boundary_sweep() {
        let m = mounts();
        let ref_mtime = NOW - 50_000;
        for cache_age in [0, GRACE - 1, GRACE, GRACE + 1, GRACE * 10] {
            let d = decide(
                &ctx(&m),
                &attrs(),
                &view(copy(4096, NOW - cache_age)),
                &RefView::Present(copy(4096, ref_mtime)),
            );
            assert!(!is_destructive(&d), "cache_age={cache_age}");
            let expected = if cache_age <= GRACE {
                EntryStatus::Unknown
            } else {
                EntryStatus::Modified
            };
            match d {
                LifecycleDecision::UpdateOnly(u) => {
                    assert_eq!(u.status, expected, "cache_age={cache_age}")
                }
                other => panic!("unexpected decision {other:?}"),
            }
        }
    }

    #[test]
    fn test_size_conflict_invalidation_boundary() {
        let m = mounts();
        for age in [GRACE - 1, GRACE, GRACE + 1] {
            let mtime = NOW - age;
            let d = decide(
                &ctx(&m),
                &attrs(),
                &view(copy(8192, mtime)),
                &RefView::Present(copy(4096, mtime)),
            );
            match d {
                LifecycleDecision::UpdateOnly(u) => {
                    assert_eq!(u.status, EntryStatus::Unknown);
                    if age <= GRACE {
                        assert!(u.invalidate.is_none(), "invalidated inside grace (age={age})");
                    } else {
                        assert!(u.invalidate.is_some(), "no invalidation outside grace");
                    }
                }
                other => panic!("unexpected decision {other:?}"),
            }
        }
    }

    #[test]
    fn test_reference_gone_recent_mod_boundary() {
        let m = mounts();
        let recent = 3600;
        for age in [recent - 1, recent, recent + 1, recent * 4] {
            let d = decide(
                &ctx(&m),
                &attrs(),
                &view(copy(4096, NOW - age)),
                &RefView::Missing,
            );
            if age <= recent {
                assert_eq!(d, LifecycleDecision::Keep, "age={age}");
            } else {
                assert_eq!(
                    d,
                    LifecycleDecision::Remove {
                        reason: RemoveReason::ReferenceGone
                    },
                    "age={age}"
                );
            }
        }
    }

    #[test]
    fn test_no_destructive_decision_while_in_transfer() {
        let m = mounts();
        // Every combination of tier staleness with an active transfer on
        // either side stays non-destructive.
        let mut busy_cache = copy(4096, NOW - 50_000);
        busy_cache.being_written = true;
        let mut busy_ref = copy(4096, NOW - 1000);
        busy_ref.being_read = true;

        let cases = [
            (view(busy_cache), RefView::Present(copy(4096, NOW - 1000))),
            (
                view(copy(4096, NOW - 50_000)),
                RefView::Present(busy_ref),
            ),
        ];
        for (cache, reference) in cases {
            let d = decide(&ctx(&m), &attrs(), &cache, &reference);
            assert!(!is_destructive(&d), "{d:?}");
        }
    }
}
