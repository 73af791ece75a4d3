//! Summaries over a user's journal, for calendar and profile views

use super::JournalEntry;
use crate::wisdom::Tradition;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Traditions shown per calendar day
pub const MAX_TRADITIONS_PER_DAY: usize = 3;

/// Distinct traditions engaged with on each (UTC) day, in entry order, at most three per day.
///
/// Days with only incomplete entries map to an empty list.
pub fn traditions_per_day(entries: &[JournalEntry]) -> BTreeMap<NaiveDate, Vec<Tradition>> {
    let mut days: BTreeMap<NaiveDate, Vec<Tradition>> = BTreeMap::new();
    for entry in entries {
        let day = days.entry(entry.created_at.date_naive()).or_default();
        if let Some(tradition) = entry.tradition() {
            if day.len() < MAX_TRADITIONS_PER_DAY && !day.contains(&tradition) {
                day.push(tradition);
            }
        }
    }
    days
}

/// Entry count per tradition; every tradition is present, possibly with zero
pub fn tradition_counts(entries: &[JournalEntry]) -> BTreeMap<Tradition, usize> {
    let mut counts: BTreeMap<Tradition, usize> = Tradition::ALL.iter().map(|t| (*t, 0)).collect();
    for tradition in entries.iter().filter_map(JournalEntry::tradition) {
        *counts.entry(tradition).or_default() += 1;
    }
    counts
}

/// Tradition with the most entries; ties go to the earlier tradition in [`Tradition::ALL`]
pub fn most_engaged_tradition(entries: &[JournalEntry]) -> Option<Tradition> {
    let counts = tradition_counts(entries);
    let mut best = None;
    let mut max = 0;
    for tradition in Tradition::ALL {
        let count = counts.get(&tradition).copied().unwrap_or(0);
        if count > max {
            max = count;
            best = Some(tradition);
        }
    }
    best
}

/// Entries that recorded a voice
pub fn total_voices(entries: &[JournalEntry]) -> usize {
    entries.iter().filter(|e| e.is_complete()).count()
}
