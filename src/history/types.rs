//! Draw history types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Canonical order of the named prize fields, highest prize first
pub const PRIZE_ORDER: [&str; 8] = [
    "special", "first", "second", "third", "fourth", "fifth", "sixth", "seventh",
];

/// A single recorded draw
///
/// Keyed by a strictly increasing period id. Each named prize field holds one
/// or more number strings. Records are never mutated once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    /// Period id
    pub period: u32,
    /// Prize field name -> numbers drawn for that field
    pub prizes: BTreeMap<String, Vec<String>>,
}

impl DrawRecord {
    /// Create a record from `(field, numbers)` pairs
    pub fn new<I, K, V>(period: u32, prizes: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            period,
            prizes: prizes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// All numbers in canonical prize order; unknown fields follow, sorted by name
    pub fn ordered_numbers(&self) -> Vec<&str> {
        let known = PRIZE_ORDER
            .iter()
            .filter_map(|name| self.prizes.get(*name));
        let extra = self
            .prizes
            .iter()
            .filter(|(name, _)| !PRIZE_ORDER.contains(&name.as_str()))
            .map(|(_, numbers)| numbers);

        known
            .chain(extra)
            .flat_map(|numbers| numbers.iter().map(String::as_str))
            .collect()
    }

    /// Concatenated digits of every number, in canonical order
    pub fn digits(&self) -> Vec<u8> {
        self.ordered_numbers()
            .into_iter()
            .flat_map(|n| n.bytes())
            .filter(u8::is_ascii_digit)
            .map(|b| b - b'0')
            .collect()
    }

    /// The 2-digit "loto" values of this draw: last two digits of every number
    pub fn loto(&self) -> BTreeSet<String> {
        self.ordered_numbers()
            .into_iter()
            .filter_map(|n| {
                let digits: String = n.chars().filter(char::is_ascii_digit).collect();
                match digits.len() {
                    0 => None,
                    1 => Some(format!("0{}", digits)),
                    len => Some(digits[len - 2..].to_string()),
                }
            })
            .collect()
    }
}

/// Read-only, contiguous slice of history ending at a given period
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    records: &'a [DrawRecord],
}

impl<'a> HistoryWindow<'a> {
    /// Wrap a contiguous slice of records
    pub fn new(records: &'a [DrawRecord]) -> Self {
        Self { records }
    }

    /// All records in the window, oldest first
    pub fn records(&self) -> &'a [DrawRecord] {
        self.records
    }

    /// Most recent record
    pub fn last(&self) -> Option<&'a DrawRecord> {
        self.records.last()
    }

    /// Period id of the most recent record
    pub fn end_period(&self) -> Option<u32> {
        self.last().map(|r| r.period)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
