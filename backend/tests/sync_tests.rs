//! Tests for two-site reconciliation behavior
//!
//! The simulation here drives the row decision rules the way a sync pass
//! does: walk the source, compare against the target, copy what the rules
//! say to copy. Push then pull must leave both sites identical, and a
//! second cycle must find nothing to do.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

use shared::{decide_row_action, SyncAction};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

/// One row as stored on a site
#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredRow {
    updated_at: Option<DateTime<Utc>>,
    payload: String,
}

fn row(stamp: Option<i64>, payload: &str) -> StoredRow {
    StoredRow {
        updated_at: stamp.map(ts),
        payload: payload.to_string(),
    }
}

type Site = BTreeMap<Uuid, StoredRow>;

#[derive(Debug, Default)]
struct PassCounts {
    inserted: usize,
    overwritten: usize,
    skipped: usize,
}

impl PassCounts {
    fn applied(&self) -> usize {
        self.inserted + self.overwritten
    }
}

/// One reconciliation pass from source to target
///
/// A watermark keeps rows off the wire unless their timestamp is strictly
/// past it, matching how an incremental pass reads its source.
fn reconcile(
    source: &Site,
    target: &mut Site,
    has_updated_at: bool,
    watermark: Option<DateTime<Utc>>,
) -> PassCounts {
    let mut counts = PassCounts::default();
    for (row_id, source_row) in source {
        if let Some(mark) = watermark {
            match source_row.updated_at {
                Some(stamp) if stamp > mark => {}
                _ => continue,
            }
        }
        let target_row = target.get(row_id);
        let action = decide_row_action(
            target_row.is_some(),
            has_updated_at,
            source_row.updated_at,
            target_row.and_then(|r| r.updated_at),
        );
        match action {
            SyncAction::Insert => {
                target.insert(*row_id, source_row.clone());
                counts.inserted += 1;
            }
            SyncAction::Overwrite => {
                target.insert(*row_id, source_row.clone());
                counts.overwritten += 1;
            }
            SyncAction::Skip => counts.skipped += 1,
        }
    }
    counts
}

/// Push local to remote, then pull remote back to local
fn run_cycle(local: &mut Site, remote: &mut Site, has_updated_at: bool) -> (PassCounts, PassCounts) {
    let push = reconcile(local, remote, has_updated_at, None);
    let pull = reconcile(remote, local, has_updated_at, None);
    (push, pull)
}

/// The fixed point both sites should reach: per row, the copy with the
/// latest timestamp from either side
fn expected_merge(local: &Site, remote: &Site) -> Site {
    let mut merged = local.clone();
    for (row_id, remote_row) in remote {
        match merged.get(row_id) {
            None => {
                merged.insert(*row_id, remote_row.clone());
            }
            Some(local_row) if remote_row.updated_at > local_row.updated_at => {
                merged.insert(*row_id, remote_row.clone());
            }
            Some(_) => {}
        }
    }
    merged
}

// ============================================================================
// Convergence
// ============================================================================

#[cfg(test)]
mod reconciliation_tests {
    use super::*;

    #[test]
    fn test_push_then_pull_converges_both_sites() {
        let mut local = Site::from([
            (id(1), row(Some(100), "local sale")),
            (id(2), row(Some(50), "stale entry")),
        ]);
        let mut remote = Site::from([
            (id(2), row(Some(200), "repriced entry")),
            (id(3), row(Some(30), "head office rate")),
        ]);

        run_cycle(&mut local, &mut remote, true);

        assert_eq!(local, remote);
        assert_eq!(local[&id(1)].payload, "local sale");
        assert_eq!(local[&id(2)].payload, "repriced entry");
        assert_eq!(local[&id(3)].payload, "head office rate");
    }

    #[test]
    fn test_newest_edit_wins_in_either_direction() {
        let contested = id(7);

        let mut local = Site::from([(contested, row(Some(200), "edited at the counter"))]);
        let mut remote = Site::from([(contested, row(Some(100), "edited at head office"))]);
        run_cycle(&mut local, &mut remote, true);
        assert_eq!(remote[&contested].payload, "edited at the counter");
        assert_eq!(local, remote);

        let mut local = Site::from([(contested, row(Some(100), "edited at the counter"))]);
        let mut remote = Site::from([(contested, row(Some(300), "edited at head office"))]);
        run_cycle(&mut local, &mut remote, true);
        assert_eq!(local[&contested].payload, "edited at head office");
        assert_eq!(local, remote);
    }

    #[test]
    fn test_create_once_rows_spread_but_never_overwrite() {
        let shared_user = id(10);
        let local_only = id(11);
        let remote_only = id(12);

        let mut local = Site::from([
            (shared_user, row(None, "cashier, local copy")),
            (local_only, row(None, "new hire")),
        ]);
        let mut remote = Site::from([
            (shared_user, row(None, "cashier, remote copy")),
            (remote_only, row(None, "manager")),
        ]);

        run_cycle(&mut local, &mut remote, false);

        // Missing rows travel; existing rows keep their own copy
        assert_eq!(local[&local_only].payload, "new hire");
        assert_eq!(remote[&local_only].payload, "new hire");
        assert_eq!(local[&remote_only].payload, "manager");
        assert_eq!(local[&shared_user].payload, "cashier, local copy");
        assert_eq!(remote[&shared_user].payload, "cashier, remote copy");
    }

    #[test]
    fn test_second_cycle_finds_nothing_to_do() {
        let mut local = Site::from([
            (id(1), row(Some(100), "a")),
            (id(2), row(Some(50), "b")),
        ]);
        let mut remote = Site::from([(id(3), row(Some(75), "c"))]);

        run_cycle(&mut local, &mut remote, true);
        let (push, pull) = run_cycle(&mut local, &mut remote, true);

        assert_eq!(push.applied(), 0);
        assert_eq!(pull.applied(), 0);
        assert_eq!(push.skipped, 3);
    }

    #[test]
    fn test_exact_timestamp_ties_leave_both_copies_in_place() {
        // Strictly-newer means a tie moves nothing in either direction
        let contested = id(4);
        let mut local = Site::from([(contested, row(Some(100), "local wording"))]);
        let mut remote = Site::from([(contested, row(Some(100), "remote wording"))]);

        let (push, pull) = run_cycle(&mut local, &mut remote, true);

        assert_eq!(push.applied() + pull.applied(), 0);
        assert_eq!(local[&contested].payload, "local wording");
        assert_eq!(remote[&contested].payload, "remote wording");
    }

    #[test]
    fn test_watermark_keeps_untouched_rows_off_the_wire() {
        let source = Site::from([
            (id(1), row(Some(50), "before the mark")),
            (id(2), row(Some(150), "after the mark")),
            (id(3), row(None, "no timestamp at all")),
        ]);
        let mut target = Site::new();

        let counts = reconcile(&source, &mut target, true, Some(ts(100)));

        assert_eq!(counts.inserted, 1);
        assert_eq!(target.len(), 1);
        assert!(target.contains_key(&id(2)));
    }

    #[test]
    fn test_a_full_pass_backfills_what_a_watermark_skipped() {
        let source = Site::from([(id(1), row(Some(50), "missed earlier"))]);
        let mut target = Site::new();

        reconcile(&source, &mut target, true, Some(ts(100)));
        assert!(target.is_empty());

        reconcile(&source, &mut target, true, None);
        assert_eq!(target[&id(1)].payload, "missed earlier");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// A site keyed on a small id space so two sites overlap; timestamps
    /// get distinct parities per side so no cross-site tie can occur
    fn site_strategy(parity: i64) -> impl Strategy<Value = Site> {
        prop::collection::btree_map(0u128..16, (0i64..500, "[a-z]{4}"), 0..12).prop_map(
            move |rows| {
                rows.into_iter()
                    .map(|(key, (stamp, payload))| {
                        (
                            id(key),
                            StoredRow {
                                updated_at: Some(ts(stamp * 2 + parity)),
                                payload,
                            },
                        )
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_one_cycle_reaches_the_latest_writer_merge(
            local in site_strategy(0),
            remote in site_strategy(1),
        ) {
            let merged = expected_merge(&local, &remote);

            let mut local = local;
            let mut remote = remote;
            run_cycle(&mut local, &mut remote, true);

            prop_assert_eq!(&local, &remote);
            prop_assert_eq!(&local, &merged);
        }

        #[test]
        fn test_cycles_are_idempotent(
            local in site_strategy(0),
            remote in site_strategy(1),
        ) {
            let mut local = local;
            let mut remote = remote;
            run_cycle(&mut local, &mut remote, true);

            let frozen_local = local.clone();
            let frozen_remote = remote.clone();
            let (push, pull) = run_cycle(&mut local, &mut remote, true);

            prop_assert_eq!(push.applied(), 0);
            prop_assert_eq!(pull.applied(), 0);
            prop_assert_eq!(local, frozen_local);
            prop_assert_eq!(remote, frozen_remote);
        }

        #[test]
        fn test_a_pass_never_drops_target_rows(
            source in site_strategy(0),
            target in site_strategy(1),
        ) {
            let before: Vec<Uuid> = target.keys().copied().collect();

            let mut target = target;
            reconcile(&source, &mut target, true, None);

            for row_id in before {
                prop_assert!(target.contains_key(&row_id));
            }
        }
    }
}
