use log::debug;

use super::Fingerprint;
use crate::reference::ReferenceRecord;

/// Distance at or below which a reference is accepted without looking further.
pub const ACCEPT_DISTANCE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub key: String,
    pub distance: u32,
}

/// Nearest-neighbour search over reference fingerprints.
///
/// Records are scanned in table order. The first one within the accept
/// distance wins, even if a closer one follows. When none qualifies the
/// globally closest is returned, ties going to the earlier record.
#[derive(Debug, Clone, Copy)]
pub struct IconMatcher {
    accept_distance: u32,
}

impl Default for IconMatcher {
    fn default() -> Self {
        Self {
            accept_distance: ACCEPT_DISTANCE,
        }
    }
}

impl IconMatcher {
    pub fn new(accept_distance: u32) -> Self {
        Self { accept_distance }
    }

    /// `None` only when no record carries a fingerprint.
    pub fn find_nearest(
        &self,
        fingerprint: &Fingerprint,
        records: &[ReferenceRecord],
    ) -> Option<MatchResult> {
        let mut best: Option<(&ReferenceRecord, u32)> = None;

        for record in records {
            let Some(reference) = record.fingerprint.as_ref() else {
                continue;
            };

            let distance = fingerprint.distance(reference);
            if distance <= self.accept_distance {
                debug!("accepted key={} distance={}", record.key, distance);
                return Some(MatchResult {
                    key: record.key.clone(),
                    distance,
                });
            }

            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((record, distance));
            }
        }

        best.map(|(record, distance)| {
            debug!("nearest key={} distance={}", record.key, distance);
            MatchResult {
                key: record.key.clone(),
                distance,
            }
        })
    }

    pub fn is_confident(&self, result: &MatchResult) -> bool {
        result.distance <= self.accept_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: u64 = 0xDEAD_BEEF_0123_4567;

    fn record(key: &str, flipped_bits: u32) -> ReferenceRecord {
        let mask = if flipped_bits == 0 {
            0
        } else {
            u64::MAX >> (64 - flipped_bits)
        };
        ReferenceRecord::new(key, key).with_fingerprint(Fingerprint::from_bits(QUERY ^ mask))
    }

    fn query() -> Fingerprint {
        Fingerprint::from_bits(QUERY)
    }

    #[test]
    fn first_record_within_threshold_wins() {
        let records = vec![record("far", 30), record("three", 3), record("five", 5), record("exact", 0)];
        let result = IconMatcher::default().find_nearest(&query(), &records).unwrap();

        assert_eq!(result.key, "three");
        assert_eq!(result.distance, 3);
    }

    #[test]
    fn threshold_is_inclusive() {
        let records = vec![record("nine", 9), record("eight", 8)];
        let result = IconMatcher::default().find_nearest(&query(), &records).unwrap();
        assert_eq!(result.key, "eight");
    }

    #[test]
    fn falls_back_to_global_minimum() {
        let records = vec![record("twenty", 20), record("twelve", 12), record("fifteen", 15)];
        let result = IconMatcher::default().find_nearest(&query(), &records).unwrap();

        assert_eq!(result.key, "twelve");
        assert_eq!(result.distance, 12);
        assert!(!IconMatcher::default().is_confident(&result));
    }

    #[test]
    fn ties_go_to_earlier_record() {
        let records = vec![record("first", 11), record("second", 11)];
        let result = IconMatcher::default().find_nearest(&query(), &records).unwrap();
        assert_eq!(result.key, "first");
    }

    #[test]
    fn records_without_fingerprint_are_skipped() {
        let records = vec![ReferenceRecord::new("blank", "blank"), record("ten", 10)];
        let result = IconMatcher::default().find_nearest(&query(), &records).unwrap();
        assert_eq!(result.key, "ten");
    }

    #[test]
    fn no_fingerprints_means_no_match() {
        let records = vec![ReferenceRecord::new("a", "a"), ReferenceRecord::new("b", "b")];
        assert!(IconMatcher::default().find_nearest(&query(), &records).is_none());
        assert!(IconMatcher::default().find_nearest(&query(), &[]).is_none());
    }
}
