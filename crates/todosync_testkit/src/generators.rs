//! Property-based test generators using proptest.
//!
//! Provides strategies for generating task records, partial records and
//! changesets that satisfy the wire format's constraints: identifiers fit
//! in 32 bits and every text field fits in one chunk.

use proptest::prelude::*;
use todosync_protocol::{Changeset, MirrorRecord, TaskRecord};

/// Strategy for record titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,23}").expect("Invalid regex")
}

/// Strategy for `YYYY-MM-DD` deadlines.
pub fn deadline_strategy() -> impl Strategy<Value = String> {
    (2000u32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(year, month, day)| format!("{year:04}-{month:02}-{day:02}"))
}

/// Strategy for status values.
pub fn status_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["open", "in progress", "done"]).prop_map(String::from)
}

/// Strategy for descriptions, including empty and non-ASCII text.
pub fn description_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        1 => Just(String::new()),
        3 => prop::string::string_regex("\\PC{0,48}").expect("Invalid regex"),
    ]
}

/// Strategy for identifiers that fit the 32-bit wire field.
pub fn wire_id_strategy() -> impl Strategy<Value = i64> {
    (0..=i32::MAX).prop_map(i64::from)
}

/// Strategy for synchronized task records.
pub fn task_record_strategy() -> impl Strategy<Value = TaskRecord> {
    (
        wire_id_strategy(),
        title_strategy(),
        deadline_strategy(),
        any::<i32>(),
        status_strategy(),
        description_strategy(),
        1i32..10_000,
    )
        .prop_map(
            |(id, title, deadline, priority, status, description, revision)| {
                TaskRecord::draft(title, deadline, priority, status)
                    .with_id(id)
                    .with_description(description)
                    .with_revision(revision)
            },
        )
}

/// Strategy for records that were never synchronized.
pub fn draft_record_strategy() -> impl Strategy<Value = TaskRecord> {
    (
        title_strategy(),
        deadline_strategy(),
        0i32..5,
        status_strategy(),
        description_strategy(),
    )
        .prop_map(|(title, deadline, priority, status, description)| {
            TaskRecord::draft(title, deadline, priority, status).with_description(description)
        })
}

/// Strategy for partial records with any subset of fields set.
pub fn mirror_record_strategy() -> impl Strategy<Value = MirrorRecord> {
    (
        wire_id_strategy(),
        prop::option::of(title_strategy()),
        prop::option::of(deadline_strategy()),
        prop::option::of(any::<i32>()),
        prop::option::of(status_strategy()),
        prop::option::of(description_strategy()),
        prop::option::of(-100i32..10_000),
    )
        .prop_map(
            |(id, title, deadline, priority, status, description, revision)| MirrorRecord {
                id,
                title,
                deadline,
                priority,
                status,
                description,
                revision,
            },
        )
}

/// Strategy for outbound changesets.
pub fn changeset_strategy() -> impl Strategy<Value = Changeset> {
    (
        prop::collection::vec(task_record_strategy(), 0..6),
        prop::collection::vec(wire_id_strategy(), 0..6),
        prop::collection::vec(mirror_record_strategy(), 0..6),
    )
        .prop_map(|(new, deleted, updated)| Changeset {
            new,
            deleted,
            updated,
        })
}

/// Strategy for a server snapshot with distinct identifiers.
pub fn snapshot_strategy(max_records: usize) -> impl Strategy<Value = Vec<TaskRecord>> {
    prop::collection::btree_map(wire_id_strategy(), task_record_strategy(), 0..max_records)
        .prop_map(|records| {
            records
                .into_iter()
                .map(|(id, record)| record.with_id(id))
                .collect()
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn deadlines_are_iso_dates(deadline in deadline_strategy()) {
            prop_assert_eq!(deadline.len(), 10);
            prop_assert_eq!(&deadline[4..5], "-");
            prop_assert_eq!(&deadline[7..8], "-");
        }

        #[test]
        fn synced_records_are_not_new(record in task_record_strategy()) {
            prop_assert!(!record.is_new());
            prop_assert!(record.id >= 0);
        }

        #[test]
        fn drafts_are_new(record in draft_record_strategy()) {
            prop_assert!(record.is_new());
        }

        #[test]
        fn snapshots_have_distinct_ids(records in snapshot_strategy(8)) {
            let mut ids: Vec<i64> = records.iter().map(|r| r.id).collect();
            ids.dedup();
            prop_assert_eq!(ids.len(), records.len());
        }
    }
}
