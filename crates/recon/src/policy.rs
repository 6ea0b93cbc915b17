//! Recency policy for price observations.
//!
//! An incoming observation is compared with the latest stored observation
//! of the same (station, product) pair:
//!
//! | stored latest        | incoming                 | decision            |
//! |----------------------|--------------------------|---------------------|
//! | none                 | any                      | `Insert`            |
//! | date D               | date > D                 | `Supersede` (new row for the new date) |
//! | date D, price P      | date D, price ≠ P        | `Overwrite` (same row) |
//! | date D, price P      | date D, price P          | `Skip(Identical)`   |
//! | date D               | date < D                 | `Skip(Stale)`       |

use std::fmt;

use serde::Serialize;

use fuelgrid_core::PriceObservation;

use crate::store::{RowId, StoredObservation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Same date, same price and state as storage.
    Identical,
    /// Older than what storage already has for the pair.
    Stale,
    /// A later row in the same file carries the same key.
    SupersededInFile,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identical => write!(f, "identical"),
            Self::Stale => write!(f, "stale"),
            Self::SupersededInFile => write!(f, "superseded in file"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Insert,
    /// Newer collection date: recorded as a new dated row.
    Supersede,
    /// Same collection date, different price or active flag.
    Overwrite { id: RowId },
    Skip(SkipReason),
}

impl Decision {
    /// Whether the row counts as an update in the run report.
    pub fn is_update(&self) -> bool {
        matches!(self, Self::Supersede | Self::Overwrite { .. })
    }
}

pub fn decide(existing: Option<&StoredObservation>, incoming: &PriceObservation) -> Decision {
    let Some(stored) = existing else {
        return Decision::Insert;
    };
    let current = &stored.observation;

    match incoming.collected_on.cmp(&current.collected_on) {
        std::cmp::Ordering::Greater => Decision::Supersede,
        std::cmp::Ordering::Less => Decision::Skip(SkipReason::Stale),
        std::cmp::Ordering::Equal => {
            if incoming.price == current.price && incoming.active == current.active {
                Decision::Skip(SkipReason::Identical)
            } else {
                Decision::Overwrite { id: stored.id }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fuelgrid_core::Price;

    fn obs(date: &str, price: &str) -> PriceObservation {
        PriceObservation {
            collected_on: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            price: Some(Price::parse(price).unwrap()),
            active: true,
        }
    }

    fn stored(date: &str, price: &str) -> StoredObservation {
        StoredObservation {
            id: 7,
            created_at: "2025-05-01T00:00:00+00:00".into(),
            station_id: 1,
            product_id: 2,
            observation: obs(date, price),
        }
    }

    #[test]
    fn newer_date_supersedes() {
        let existing = stored("2025-05-01", "5.50");
        let d = decide(Some(&existing), &obs("2025-05-08", "5.60"));
        assert_eq!(d, Decision::Supersede);
        assert!(d.is_update());
    }

    #[test]
    fn identical_is_skipped() {
        let existing = stored("2025-05-01", "5.50");
        assert_eq!(
            decide(Some(&existing), &obs("2025-05-01", "5,50")),
            Decision::Skip(SkipReason::Identical)
        );
    }

    #[test]
    fn older_date_is_stale_regardless_of_price() {
        let existing = stored("2025-05-01", "5.50");
        assert_eq!(
            decide(Some(&existing), &obs("2025-04-20", "5.00")),
            Decision::Skip(SkipReason::Stale)
        );
    }

    #[test]
    fn same_date_new_price_overwrites() {
        let existing = stored("2025-05-01", "5.50");
        assert_eq!(
            decide(Some(&existing), &obs("2025-05-01", "5.55")),
            Decision::Overwrite { id: 7 }
        );
    }

    #[test]
    fn new_pair_is_inserted() {
        assert_eq!(decide(None, &obs("2025-05-01", "5.50")), Decision::Insert);
    }

    #[test]
    fn price_dropping_to_null_overwrites() {
        let existing = stored("2025-05-01", "5.50");
        let mut incoming = obs("2025-05-01", "5.50");
        incoming.price = None;
        assert!(matches!(decide(Some(&existing), &incoming), Decision::Overwrite { .. }));
    }
}
