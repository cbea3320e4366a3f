//! Admission of listed files into a retrieve session.
//!
//! For every listing record the pipeline decides fetch, delete-remote, or
//! ignore. Masks and predicates come from the directory configuration; the
//! actual reservation in the shared retrieve list is delegated to a caller
//! closure so that list locking stays out of this crate.

use status::{DeletePolicy, SelectorSet};

use crate::mlsd::{EntryType, MlsdEntry, PermSet};

/// Fallback floor for the unknown-file age check, in seconds.
///
/// A file that no mask admits is only deleted once it is older than both
/// the configured unknown-file time and this floor, so a file that is still
/// being uploaded is never removed mid-transfer.
pub const DEFAULT_TRANSFER_TIMEOUT: i64 = 120;

/// `unknown_file_time` value that deletes unknown files unconditionally.
pub const DELETE_UNKNOWN_IMMEDIATELY: i32 = -2;

/// Result of matching one file-mask pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMatch {
    /// The pattern admits the name.
    Match,
    /// The pattern explicitly excludes the name; skip the rest of its group.
    Exclude,
    /// The pattern says nothing about the name.
    NoMatch,
}

/// A compiled file-mask pattern.
///
/// Mask compilation lives outside the engine; workers receive the compiled
/// masks grouped the way the directory configuration groups them.
pub trait FileMask {
    /// Matches `name` against this pattern.
    fn matches(&self, name: &str) -> MaskMatch;
}

impl<F> FileMask for F
where
    F: Fn(&str) -> MaskMatch,
{
    fn matches(&self, name: &str) -> MaskMatch {
        self(name)
    }
}

impl FileMask for Box<dyn FileMask + '_> {
    fn matches(&self, name: &str) -> MaskMatch {
        (**self).matches(name)
    }
}

/// Size and age predicates from the directory configuration.
#[derive(Debug, Clone, Copy)]
pub struct Predicates {
    /// Size threshold, -1 accepts any size.
    pub ignore_size: i64,
    /// Age threshold in seconds, 0 disables the check.
    pub ignore_file_time: i32,
    /// Which relations against the thresholds count as acceptance.
    pub selectors: SelectorSet,
}

impl Predicates {
    /// A configuration that admits everything.
    #[must_use]
    pub fn accept_all() -> Self {
        Self {
            ignore_size: -1,
            ignore_file_time: 0,
            selectors: SelectorSet::empty(),
        }
    }

    /// Whether `size` passes the size predicate.
    ///
    /// With no size selector bit set the relation defaults to equality.
    #[must_use]
    pub fn size_ok(&self, size: i64) -> bool {
        if self.ignore_size == -1 {
            return true;
        }
        let s = self.selectors;
        let any_selected = s.intersects(
            SelectorSet::SIZE_EQUAL | SelectorSet::SIZE_LESS | SelectorSet::SIZE_GREATER,
        );
        if !any_selected {
            return size == self.ignore_size;
        }
        (s.contains(SelectorSet::SIZE_EQUAL) && size == self.ignore_size)
            || (s.contains(SelectorSet::SIZE_LESS) && size < self.ignore_size)
            || (s.contains(SelectorSet::SIZE_GREATER) && size > self.ignore_size)
    }

    /// Whether a file modified at `mtime` passes the age predicate at `now`.
    ///
    /// Files without a reliable modification time bypass the check.
    #[must_use]
    pub fn age_ok(&self, now: i64, mtime: i64, got_date: bool) -> bool {
        if self.ignore_file_time == 0 || !got_date {
            return true;
        }
        let diff = now - mtime;
        let threshold = i64::from(self.ignore_file_time);
        let s = self.selectors;
        let any_selected = s.intersects(
            SelectorSet::TIME_EQUAL | SelectorSet::TIME_LESS | SelectorSet::TIME_GREATER,
        );
        if !any_selected {
            return diff == threshold;
        }
        (s.contains(SelectorSet::TIME_EQUAL) && diff == threshold)
            || (s.contains(SelectorSet::TIME_LESS) && diff < threshold)
            || (s.contains(SelectorSet::TIME_GREATER) && diff > threshold)
    }
}

/// Everything the pipeline needs besides the masks.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    /// Admit names starting with a dot.
    pub accept_dot_files: bool,
    /// Size and age predicates.
    pub predicates: Predicates,
    /// Which classes of remote files may be deleted.
    pub delete_policy: DeletePolicy,
    /// Age threshold for unknown-file deletion;
    /// [`DELETE_UNKNOWN_IMMEDIATELY`] forces it.
    pub unknown_file_time: i32,
}

/// Decision for one listing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The file was reserved for this session.
    Fetch,
    /// No mask admits the file and policy says to remove it remotely.
    DeleteRemote,
    /// Nothing to do for this record.
    Ignore,
}

/// Runs the admission pipeline for one listing record.
///
/// `groups` are the directory's file-mask groups; within a group an
/// explicit exclude skips the remaining patterns of that group only. The
/// first admitting pattern hands the record to `reserve`, which applies
/// the predicates, the session caps, and the retrieve-list bookkeeping,
/// returning whether the file was actually reserved.
pub fn consider<M: FileMask>(
    entry: &MlsdEntry,
    now: i64,
    policy: &AdmissionPolicy,
    groups: &[Vec<M>],
    mut reserve: impl FnMut(&MlsdEntry) -> bool,
) -> Verdict {
    if entry.entry_type != EntryType::File {
        return Verdict::Ignore;
    }
    if let Some(perm) = entry.perm {
        if !perm.contains(PermSet::RETRIEVE) {
            return Verdict::Ignore;
        }
    }
    if entry.name.starts_with('.') && !policy.accept_dot_files {
        return Verdict::Ignore;
    }

    let mut gotcha = false;
    'groups: for group in groups {
        for mask in group {
            match mask.matches(&entry.name) {
                MaskMatch::Match => {
                    gotcha = true;
                    // The reservation is idempotent per name; a second
                    // admitting group would land on the same list entry.
                    if reserve(entry) {
                        return Verdict::Fetch;
                    }
                    break 'groups;
                }
                MaskMatch::Exclude => continue 'groups,
                MaskMatch::NoMatch => {}
            }
        }
    }

    if !gotcha && policy.delete_policy.contains(DeletePolicy::UNKNOWN_FILES) {
        if policy.unknown_file_time == DELETE_UNKNOWN_IMMEDIATELY {
            return Verdict::DeleteRemote;
        }
        if entry.got_date {
            let diff = now - entry.mtime;
            let floor = i64::from(policy.unknown_file_time).max(DEFAULT_TRANSFER_TIMEOUT);
            if diff > floor {
                return Verdict::DeleteRemote;
            }
        }
    }
    Verdict::Ignore
}

#[cfg(test)]
mod tests {
    use super::*;
    use status::DeletePolicy;

    fn file(name: &str, size: i64, age: i64, now: i64) -> MlsdEntry {
        MlsdEntry {
            name: name.to_owned(),
            size,
            mtime: now - age,
            got_date: true,
            entry_type: EntryType::File,
            perm: Some(PermSet::RETRIEVE | PermSet::LIST),
        }
    }

    fn match_all(_: &str) -> MaskMatch {
        MaskMatch::Match
    }

    fn policy() -> AdmissionPolicy {
        AdmissionPolicy {
            accept_dot_files: false,
            predicates: Predicates::accept_all(),
            delete_policy: DeletePolicy::empty(),
            unknown_file_time: 0,
        }
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn matching_file_is_fetched_when_reservation_succeeds() {
        let entry = file("data.bin", 10, 60, NOW);
        let groups = vec![vec![match_all as fn(&str) -> MaskMatch]];
        let verdict = consider(&entry, NOW, &policy(), &groups, |_| true);
        assert_eq!(verdict, Verdict::Fetch);
    }

    #[test]
    fn failed_reservation_downgrades_to_ignore() {
        let entry = file("data.bin", 10, 60, NOW);
        let groups = vec![vec![match_all as fn(&str) -> MaskMatch]];
        let verdict = consider(&entry, NOW, &policy(), &groups, |_| false);
        assert_eq!(verdict, Verdict::Ignore);
    }

    #[test]
    fn directories_and_special_types_are_ignored() {
        let mut entry = file("sub", 0, 0, NOW);
        entry.entry_type = EntryType::Dir;
        let groups = vec![vec![match_all as fn(&str) -> MaskMatch]];
        assert_eq!(consider(&entry, NOW, &policy(), &groups, |_| true), Verdict::Ignore);

        entry.entry_type = EntryType::OsSpecial;
        assert_eq!(consider(&entry, NOW, &policy(), &groups, |_| true), Verdict::Ignore);
    }

    #[test]
    fn missing_retrieve_permission_is_ignored() {
        let mut entry = file("data.bin", 10, 60, NOW);
        entry.perm = Some(PermSet::LIST);
        let groups = vec![vec![match_all as fn(&str) -> MaskMatch]];
        assert_eq!(consider(&entry, NOW, &policy(), &groups, |_| true), Verdict::Ignore);

        // Absent perm fact means no restriction.
        entry.perm = None;
        assert_eq!(consider(&entry, NOW, &policy(), &groups, |_| true), Verdict::Fetch);
    }

    #[test]
    fn dot_files_need_the_option() {
        let entry = file(".hidden", 10, 60, NOW);
        let groups = vec![vec![match_all as fn(&str) -> MaskMatch]];
        assert_eq!(consider(&entry, NOW, &policy(), &groups, |_| true), Verdict::Ignore);

        let mut open = policy();
        open.accept_dot_files = true;
        assert_eq!(consider(&entry, NOW, &open, &groups, |_| true), Verdict::Fetch);
    }

    #[test]
    fn exclude_skips_rest_of_group_but_not_next_group() {
        let entry = file("data.bin", 10, 60, NOW);
        let exclude: fn(&str) -> MaskMatch = |_| MaskMatch::Exclude;
        let never: fn(&str) -> MaskMatch = |_| panic!("must be skipped");
        let groups = vec![vec![exclude, never], vec![match_all]];
        assert_eq!(consider(&entry, NOW, &policy(), &groups, |_| true), Verdict::Fetch);
    }

    #[test]
    fn old_unknown_file_is_deleted_when_policy_allows() {
        let entry = file("stray.tmp", 10, 4000, NOW);
        let nomatch: fn(&str) -> MaskMatch = |_| MaskMatch::NoMatch;
        let groups = vec![vec![nomatch]];
        let mut p = policy();
        p.delete_policy = DeletePolicy::UNKNOWN_FILES;
        p.unknown_file_time = 3600;
        assert_eq!(consider(&entry, NOW, &p, &groups, |_| true), Verdict::DeleteRemote);

        // Too young to delete.
        let young = file("stray.tmp", 10, 30, NOW);
        assert_eq!(consider(&young, NOW, &p, &groups, |_| true), Verdict::Ignore);
    }

    #[test]
    fn unknown_file_deletion_respects_transfer_timeout_floor() {
        // Threshold below the floor: the floor wins.
        let entry = file("stray.tmp", 10, 100, NOW);
        let nomatch: fn(&str) -> MaskMatch = |_| MaskMatch::NoMatch;
        let groups = vec![vec![nomatch]];
        let mut p = policy();
        p.delete_policy = DeletePolicy::UNKNOWN_FILES;
        p.unknown_file_time = 10;
        assert_eq!(consider(&entry, NOW, &p, &groups, |_| true), Verdict::Ignore);

        let older = file("stray.tmp", 10, 200, NOW);
        assert_eq!(consider(&older, NOW, &p, &groups, |_| true), Verdict::DeleteRemote);
    }

    #[test]
    fn forced_unknown_deletion_ignores_age() {
        let entry = file("stray.tmp", 10, 1, NOW);
        let nomatch: fn(&str) -> MaskMatch = |_| MaskMatch::NoMatch;
        let groups = vec![vec![nomatch]];
        let mut p = policy();
        p.delete_policy = DeletePolicy::UNKNOWN_FILES;
        p.unknown_file_time = DELETE_UNKNOWN_IMMEDIATELY;
        assert_eq!(consider(&entry, NOW, &p, &groups, |_| true), Verdict::DeleteRemote);
    }

    #[test]
    fn size_predicate_relations() {
        let mut p = Predicates::accept_all();
        p.ignore_size = 100;
        p.selectors = SelectorSet::SIZE_GREATER;
        assert!(p.size_ok(101));
        assert!(!p.size_ok(100));

        p.selectors = SelectorSet::SIZE_GREATER | SelectorSet::SIZE_EQUAL;
        assert!(p.size_ok(100));
        assert!(!p.size_ok(99));

        // No selector bit defaults to equality.
        p.selectors = SelectorSet::empty();
        assert!(p.size_ok(100));
        assert!(!p.size_ok(101));
    }

    #[test]
    fn age_predicate_bypasses_undated_files() {
        let mut p = Predicates::accept_all();
        p.ignore_file_time = 300;
        p.selectors = SelectorSet::TIME_GREATER;
        assert!(p.age_ok(NOW, NOW - 400, true));
        assert!(!p.age_ok(NOW, NOW - 200, true));
        assert!(p.age_ok(NOW, 0, false));
    }
}
