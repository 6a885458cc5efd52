//! Age computation and the fixed age-band partition used by household
//! composition recalculation.

use chrono::{Datelike, NaiveDate};

/// Age bands for household composition counts.
///
/// The bands are fixed offsets from the individual's last registration date:
/// 0-5, 6-11, 12-17, 18-59, 60+.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeBand {
    Y0To5,
    Y6To11,
    Y12To17,
    Y18To59,
    Y60Plus,
}

impl AgeBand {
    /// Band for an age in whole years.
    pub fn for_age(age_years: i32) -> Self {
        match age_years {
            i32::MIN..=5 => AgeBand::Y0To5,
            6..=11 => AgeBand::Y6To11,
            12..=17 => AgeBand::Y12To17,
            18..=59 => AgeBand::Y18To59,
            _ => AgeBand::Y60Plus,
        }
    }

    /// Whether this band counts as a child (under 18).
    pub fn is_child(&self) -> bool {
        matches!(self, AgeBand::Y0To5 | AgeBand::Y6To11 | AgeBand::Y12To17)
    }
}

/// Age in whole years at `as_of`, birthday-aware.
///
/// An individual born 2006-03-01 is 17 on 2024-02-29 and 18 on 2024-03-01.
/// Future birth dates clamp to zero rather than going negative.
pub fn age_in_years(birth_date: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut age = as_of.year() - birth_date.year();
    if (as_of.month(), as_of.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age.max(0)
}

// =============================================================================
// TESTS
// =============================================================================
