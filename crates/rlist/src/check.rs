//! Concurrent-safe reservation of a listed file for one worker.

use listing::Predicates;
use status::StupidMode;

use crate::layout::{NO, RlEntry, YES};
use crate::list::RetrieveList;
use crate::Result;

/// Session accounting updated by successful reservations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanTotals {
    /// Files reserved for this session so far.
    pub files_to_retrieve: u32,
    /// Bytes reserved for this session so far.
    pub file_size_to_retrieve: i64,
    /// A cap stopped this session before the listing was exhausted.
    pub more_files_in_list: bool,
}

/// Reservation context of the calling worker.
#[derive(Debug, Clone, Copy)]
pub struct ReservePolicy<'a> {
    /// Directory bookkeeping mode.
    pub mode: StupidMode,
    /// Remote files are deleted after download.
    pub remove: bool,
    /// The job is a retry after a prior failure.
    pub old_error_job: bool,
    /// The calling worker's slot number plus one.
    pub worker_stamp: u8,
    /// Size and age predicates of the directory.
    pub predicates: &'a Predicates,
    /// File-count cap for one session.
    pub max_files: u32,
    /// Byte cap for one session.
    pub max_bytes: i64,
    /// Current time, for the age predicate.
    pub now: i64,
}

impl ReservePolicy<'_> {
    /// Stateless bookkeeping: refetch everything, nothing persists.
    #[must_use]
    pub fn stateless(&self) -> bool {
        self.mode == StupidMode::Yes || self.remove
    }

    /// Session caps only apply to stateful bookkeeping.
    fn caps_enabled(&self) -> bool {
        !self.stateless()
    }

    fn within_caps(&self, totals: &ScanTotals) -> bool {
        !self.caps_enabled()
            || (totals.files_to_retrieve < self.max_files
                && totals.file_size_to_retrieve < self.max_bytes)
    }
}

/// Result of one reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The record at this index now belongs to the caller.
    Reserved(usize),
    /// Nothing was reserved; the session totals are untouched.
    Rejected,
}

/// Applies predicates and caps to the record at `index` and stamps it.
///
/// The caller holds the record's byte-range lock.
fn try_assign(
    list: &mut RetrieveList,
    index: usize,
    policy: &ReservePolicy<'_>,
    totals: &mut ScanTotals,
) -> CheckOutcome {
    let (size, mtime, got_date) = {
        let entry = list.entry(index);
        (entry.size, entry.file_mtime, entry.got_date == YES)
    };
    if !policy.predicates.size_ok(size)
        || !policy.predicates.age_ok(policy.now, mtime, got_date)
    {
        return CheckOutcome::Rejected;
    }
    if !policy.within_caps(totals) {
        // Cap rollback: the record stays known but unclaimed and the
        // session is flagged as incomplete.
        list.entry_mut(index).assigned = 0;
        totals.more_files_in_list = true;
        return CheckOutcome::Rejected;
    }

    let entry = list.entry_mut(index);
    entry.retrieved = NO;
    entry.assigned = policy.worker_stamp;
    totals.files_to_retrieve += 1;
    totals.file_size_to_retrieve += size.max(0);
    CheckOutcome::Reserved(index)
}

/// Locates, reconciles, or appends the record for one listed file and
/// reserves it for the calling worker.
///
/// The observed `size`/`mtime` replace stale stored values; a change in
/// either re-arms a previously retrieved record. Reservations and cap
/// rollbacks happen under the record's byte-range lock, so concurrent
/// workers of the same directory never double-claim
pub fn check_list(
    list: &mut RetrieveList,
    name: &str,
    size: i64,
    mtime: i64,
    got_date: bool,
    policy: &ReservePolicy<'_>,
    totals: &mut ScanTotals,
) -> Result<CheckOutcome> {
    if let Some(index) = list.find(name) {
        list.entry_mut(index).in_list = YES;

        if policy.mode == StupidMode::GetOnceOnly && list.entry(index).retrieved == YES {
            return Ok(CheckOutcome::Rejected);
        }

        let _guard = list.lock_entry(index)?;

        if policy.stateless() {
            let entry = list.entry(index);
            if entry.assigned != 0 && entry.retrieved == NO {
                return Ok(CheckOutcome::Rejected);
            }
            let entry = list.entry_mut(index);
            entry.size = size;
            entry.file_mtime = mtime;
            entry.got_date = if got_date { YES } else { NO };
            return Ok(try_assign(list, index, policy, totals));
        }

        {
            let entry = list.entry_mut(index);
            if entry.file_mtime != mtime {
                entry.file_mtime = mtime;
                entry.got_date = if got_date { YES } else { NO };
                entry.retrieved = NO;
                entry.assigned = 0;
            }
            if entry.size != size {
                entry.prev_size = entry.size;
                entry.size = size;
                entry.retrieved = NO;
                entry.assigned = 0;
            }
        }

        let entry = list.entry(index);
        if entry.retrieved == YES || entry.assigned != 0 {
            return Ok(CheckOutcome::Rejected);
        }
        return Ok(try_assign(list, index, policy, totals));
    }

    let mut fresh = RlEntry::new(name, size, mtime, got_date);
    fresh.in_list = YES;
    let index = list.push(fresh)?;
    let _guard = list.lock_entry(index)?;
    Ok(try_assign(list, index, policy, totals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use listing::Predicates;
    use status::SelectorSet;

    const NOW: i64 = 1_700_000_000;

    fn policy<'a>(predicates: &'a Predicates) -> ReservePolicy<'a> {
        ReservePolicy {
            mode: StupidMode::No,
            remove: false,
            old_error_job: false,
            worker_stamp: 1,
            predicates,
            max_files: 100,
            max_bytes: i64::MAX,
            now: NOW,
        }
    }

    fn reserve(
        list: &mut RetrieveList,
        name: &str,
        size: i64,
        policy: &ReservePolicy<'_>,
        totals: &mut ScanTotals,
    ) -> CheckOutcome {
        check_list(list, name, size, NOW - 60, true, policy, totals).expect("check_list")
    }

    #[test]
    fn new_file_is_appended_and_reserved() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let policy = policy(&predicates);
        let mut totals = ScanTotals::default();

        let outcome = reserve(&mut list, "a", 100, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Reserved(0));
        assert_eq!(list.entry(0).assigned, 1);
        assert_eq!(totals.files_to_retrieve, 1);
        assert_eq!(totals.file_size_to_retrieve, 100);
        assert!(!totals.more_files_in_list);
    }

    #[test]
    fn cap_rollback_leaves_totals_untouched() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let mut policy = policy(&predicates);
        policy.max_files = 3;
        let mut totals = ScanTotals::default();

        for name in ["a", "b", "c"] {
            assert!(matches!(
                reserve(&mut list, name, 100, &policy, &mut totals),
                CheckOutcome::Reserved(_)
            ));
        }
        let before = totals;

        let outcome = reserve(&mut list, "d", 100, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Rejected);

        // The fourth record was appended but stays unclaimed.
        assert_eq!(list.len(), 4);
        assert_eq!(list.entry(3).name(), "d");
        assert_eq!(list.entry(3).assigned, 0);
        assert_eq!(totals.files_to_retrieve, before.files_to_retrieve);
        assert_eq!(totals.file_size_to_retrieve, before.file_size_to_retrieve);
        assert!(totals.more_files_in_list);
    }

    #[test]
    fn byte_cap_also_rolls_back() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let mut policy = policy(&predicates);
        policy.max_bytes = 150;
        let mut totals = ScanTotals::default();

        assert!(matches!(
            reserve(&mut list, "a", 100, &policy, &mut totals),
            CheckOutcome::Reserved(_)
        ));
        // 100 < 150, so one more file may start; after it the cap is hit.
        assert!(matches!(
            reserve(&mut list, "b", 100, &policy, &mut totals),
            CheckOutcome::Reserved(_)
        ));
        assert_eq!(
            reserve(&mut list, "c", 100, &policy, &mut totals),
            CheckOutcome::Rejected
        );
        assert!(totals.more_files_in_list);
        assert_eq!(totals.file_size_to_retrieve, 200);
    }

    #[test]
    fn get_once_only_rejects_already_retrieved() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let mut policy = policy(&predicates);
        policy.mode = StupidMode::GetOnceOnly;
        let mut totals = ScanTotals::default();

        reserve(&mut list, "a", 100, &policy, &mut totals);
        list.entry_mut(0).retrieved = YES;
        list.entry_mut(0).assigned = 0;

        let outcome = reserve(&mut list, "a", 100, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Rejected);
        assert_eq!(totals.files_to_retrieve, 1);
    }

    #[test]
    fn changed_mtime_rearms_a_retrieved_record() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let policy = policy(&predicates);
        let mut totals = ScanTotals::default();

        reserve(&mut list, "a", 100, &policy, &mut totals);
        {
            let entry = list.entry_mut(0);
            entry.retrieved = YES;
            entry.assigned = 0;
        }

        let outcome = check_list(&mut list, "a", 100, NOW - 5, true, &policy, &mut totals)
            .expect("check_list");
        assert_eq!(outcome, CheckOutcome::Reserved(0));
        assert_eq!(list.entry(0).file_mtime, NOW - 5);
        assert_eq!(list.entry(0).retrieved, NO);
        assert_eq!(list.entry(0).assigned, 1);
    }

    #[test]
    fn changed_size_keeps_previous_size_for_appends() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let policy = policy(&predicates);
        let mut totals = ScanTotals::default();

        reserve(&mut list, "a", 100, &policy, &mut totals);
        {
            let entry = list.entry_mut(0);
            entry.retrieved = YES;
            entry.assigned = 0;
        }

        let outcome = reserve(&mut list, "a", 250, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Reserved(0));
        assert_eq!(list.entry(0).size, 250);
        assert_eq!(list.entry(0).prev_size, 100);
    }

    #[test]
    fn record_owned_by_another_worker_is_rejected() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let policy = policy(&predicates);
        let mut totals = ScanTotals::default();

        reserve(&mut list, "a", 100, &policy, &mut totals);
        assert_eq!(list.entry(0).assigned, 1);

        let mut other = policy;
        other.worker_stamp = 2;
        let mut other_totals = ScanTotals::default();
        let outcome = reserve(&mut list, "a", 100, &other, &mut other_totals);
        assert_eq!(outcome, CheckOutcome::Rejected);
        assert_eq!(list.entry(0).assigned, 1);
        assert_eq!(other_totals.files_to_retrieve, 0);
    }

    #[test]
    fn stateless_mode_reclaims_retrieved_records() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let mut policy = policy(&predicates);
        policy.mode = StupidMode::Yes;
        let mut totals = ScanTotals::default();

        reserve(&mut list, "a", 100, &policy, &mut totals);
        {
            let entry = list.entry_mut(0);
            entry.retrieved = YES;
            entry.assigned = 0;
        }

        // Same file again: stateless bookkeeping fetches it once more.
        let outcome = reserve(&mut list, "a", 100, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Reserved(0));
        assert_eq!(list.entry(0).retrieved, NO);
        assert_eq!(totals.files_to_retrieve, 2);
    }

    #[test]
    fn stateless_mode_ignores_caps() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates::accept_all();
        let mut policy = policy(&predicates);
        policy.mode = StupidMode::Yes;
        policy.max_files = 1;
        let mut totals = ScanTotals::default();

        for name in ["a", "b", "c"] {
            assert!(matches!(
                reserve(&mut list, name, 10, &policy, &mut totals),
                CheckOutcome::Reserved(_)
            ));
        }
        assert!(!totals.more_files_in_list);
    }

    #[test]
    fn failed_predicate_rejects_without_claiming() {
        let mut list = RetrieveList::open_session().expect("session");
        let predicates = Predicates {
            ignore_size: 50,
            ignore_file_time: 0,
            selectors: SelectorSet::SIZE_GREATER,
        };
        let policy = policy(&predicates);
        let mut totals = ScanTotals::default();

        let outcome = reserve(&mut list, "small", 10, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Rejected);
        assert_eq!(list.len(), 1);
        assert_eq!(list.entry(0).assigned, 0);
        assert_eq!(totals.files_to_retrieve, 0);

        let outcome = reserve(&mut list, "big", 60, &policy, &mut totals);
        assert_eq!(outcome, CheckOutcome::Reserved(1));
    }
}
