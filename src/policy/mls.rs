//! MLS levels and ranges.
//!
//! A [`Level`] is a sensitivity plus a category set. Levels are partially
//! ordered by dominance: `a >= b` iff `a.sensitivity >= b.sensitivity` and
//! `a.categories ⊇ b.categories`. Two levels where neither dominates are
//! incomparable and `partial_cmp` returns `None`.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::symbols::{CategoryId, SensitivityId};
use super::{Policy, PolicyDisplay};
use crate::error::{PolicyError, Result};

/// An MLS level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Level {
    pub sensitivity: SensitivityId,
    pub categories: BTreeSet<CategoryId>,
}

impl Level {
    pub fn new(sensitivity: SensitivityId, categories: impl IntoIterator<Item = CategoryId>) -> Self {
        Self {
            sensitivity,
            categories: categories.into_iter().collect(),
        }
    }

    /// `self >= other` in the dominance order.
    pub fn dominates(&self, other: &Level) -> bool {
        self.sensitivity >= other.sensitivity && self.categories.is_superset(&other.categories)
    }

    /// Neither level dominates the other.
    pub fn incomparable(&self, other: &Level) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }
}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.dominates(other), other.dominates(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => None,
        }
    }
}

impl PolicyDisplay for Level {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", policy.sensitivity(self.sensitivity).name)?;

        // short notation: consecutive runs become c0.c3
        let cats: Vec<CategoryId> = self.categories.iter().copied().collect();
        let mut groups: Vec<String> = Vec::new();
        let mut i = 0;
        while i < cats.len() {
            let mut j = i;
            while j + 1 < cats.len() && cats[j + 1].index() == cats[j].index() + 1 {
                j += 1;
            }
            let first = &policy.category(cats[i]).name;
            if j > i {
                groups.push(format!("{}.{}", first, policy.category(cats[j]).name));
            } else {
                groups.push(first.clone());
            }
            i = j + 1;
        }

        if !groups.is_empty() {
            write!(f, ":{}", groups.join(","))?;
        }
        Ok(())
    }
}

/// An MLS range. `high` always dominates `low`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub low: Level,
    pub high: Level,
}

impl Range {
    pub fn new(low: Level, high: Level) -> Result<Self> {
        if !high.dominates(&low) {
            return Err(PolicyError::InvalidRange(
                "high level does not dominate low level".to_string(),
            ));
        }
        Ok(Self { low, high })
    }

    /// `low <= level <= high`.
    pub fn contains(&self, level: &Level) -> bool {
        self.low <= *level && *level <= self.high
    }
}

impl PolicyDisplay for Range {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            self.low.fmt_with(policy, f)
        } else {
            write!(
                f,
                "{} - {}",
                self.low.display(policy),
                self.high.display(policy)
            )
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse `s0`, `s0:c0`, `s0:c0,c2.c5` against the policy's MLS symbols.
pub(crate) fn parse_level(policy: &Policy, text: &str) -> Result<Level> {
    if !policy.mls() {
        return Err(PolicyError::MlsDisabled);
    }

    let invalid = |why: &str| PolicyError::InvalidLevel(format!("{} is invalid ({})", text, why));

    let (sens_name, cats) = match text.split_once(':') {
        Some((s, c)) => (s.trim(), Some(c.trim())),
        None => (text.trim(), None),
    };

    let sens = policy
        .lookup_sensitivity(sens_name)
        .map_err(|_| invalid(&format!("{} is not a valid sensitivity", sens_name)))?;

    let mut categories = BTreeSet::new();
    if let Some(cats) = cats {
        for group in cats.split(',') {
            let bounds: Vec<&str> = group.split('.').collect();
            match bounds.as_slice() {
                [single] => {
                    let cat = policy
                        .lookup_category(single.trim())
                        .map_err(|_| invalid(&format!("{} is not a valid category", group)))?;
                    categories.insert(cat.id);
                }
                [low, high] => {
                    let low = policy.lookup_category(low.trim());
                    let high = policy.lookup_category(high.trim());
                    match (low, high) {
                        (Ok(low), Ok(high)) if low.id <= high.id => {
                            for index in low.id.index()..=high.id.index() {
                                categories.insert(CategoryId::from_index(index));
                            }
                        }
                        _ => {
                            return Err(invalid(&format!(
                                "{} is not a valid category range",
                                group
                            )))
                        }
                    }
                }
                _ => return Err(invalid("level parsing error")),
            }
        }
    }

    if !sens.categories.is_empty() && !categories.is_subset(&sens.categories) {
        return Err(invalid(
            "one or more categories are not associated with the sensitivity",
        ));
    }

    Ok(Level::new(sens.id, categories))
}

/// Parse `low` or `low - high`; whitespace around the dash is optional.
pub(crate) fn parse_range(policy: &Policy, text: &str) -> Result<Range> {
    let invalid = |why: String| PolicyError::InvalidRange(format!("{} is not a valid range ({})", text, why));

    let (low_text, high_text) = match text.split_once('-') {
        Some((low, high)) => (low.trim(), Some(high.trim())),
        None => (text.trim(), None),
    };

    let low = parse_level(policy, low_text).map_err(|e| match e {
        PolicyError::MlsDisabled => e,
        other => invalid(other.to_string()),
    })?;
    let high = match high_text {
        Some(high) => parse_level(policy, high).map_err(|e| invalid(e.to_string()))?,
        None => low.clone(),
    };

    if !high.dominates(&low) {
        return Err(invalid(format!(
            "{} is not dominated by {}",
            low.display(policy),
            high.display(policy)
        )));
    }

    Ok(Range { low, high })
}
