//! Wildcard grouping of vendor sensor keys into ordered instrument families.

use std::collections::BTreeMap;

use super::key::{SensorKey, KEY_WIDTH};

/// An ordered run of wildcard characters that are all present in the live
/// key set. A gap ends the run: if the group pattern is `Tp0?` and the live
/// keys are Tp0a, Tp0b, Tp0c, Tp0e, the series holds a, b, c, e but only
/// three of them are concurrent — the missing `d` means `e` belongs to a
/// different physical instrument and must not be presented as part of one
/// continuous family.
#[derive(Debug, Clone)]
pub struct SensorSeries {
    characters: Vec<char>,
}

impl SensorSeries {
    pub fn new(starting_character: char) -> Self {
        Self {
            characters: vec![starting_character],
        }
    }

    pub fn add_character(&mut self, character: char) {
        self.characters.push(character);
    }

    pub fn characters(&self) -> &[char] {
        &self.characters
    }

    /// Count of leading, contiguous characters. Stops at the first gap.
    pub fn concurrent_values(&self) -> usize {
        let mut count = 1;
        for pair in self.characters.windows(2) {
            let expected = pair[0] as u32 + 1;
            if pair[1] as u32 != expected {
                break;
            }
            count += 1;
        }
        count.min(self.characters.len())
    }
}

/// A wildcard key pattern resolved against the live sensor key set.
#[derive(Debug, Clone)]
pub struct SensorGroup {
    pattern: String,
    /// Matched raw keys in discovery order.
    key_order: Vec<SensorKey>,
    /// Matched raw keys and their resolved human-readable descriptions.
    key_descriptions: BTreeMap<SensorKey, String>,
    series: SensorSeries,
}

impl SensorGroup {
    /// Resolve `pattern` (a 4-character code with `?` wildcards) against the
    /// available keys. Returns `None` when nothing matches — a normal
    /// outcome on hardware without that sensor family.
    pub fn build(pattern: &str, available: &[SensorKey], description: &str) -> Option<Self> {
        if pattern.len() != KEY_WIDTH {
            return None;
        }
        let pattern_bytes = pattern.as_bytes();

        let matched: Vec<SensorKey> = available
            .iter()
            .copied()
            .filter(|key| {
                pattern_bytes.iter().enumerate().all(|(i, p)| {
                    *p == b'?' || key.char_at(i) == Some(*p as char)
                })
            })
            .collect();
        if matched.is_empty() {
            return None;
        }

        // The series tracks wildcard values in their natural order even when
        // the discovery order differs.
        let wildcard_positions: Vec<usize> = pattern_bytes
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == b'?')
            .map(|(i, _)| i)
            .collect();

        let mut sorted = matched.clone();
        sorted.sort();
        let mut series: Option<SensorSeries> = None;
        if let Some(&position) = wildcard_positions.first() {
            for key in &sorted {
                if let Some(c) = key.char_at(position) {
                    match series.as_mut() {
                        None => series = Some(SensorSeries::new(c)),
                        Some(s) => s.add_character(c),
                    }
                }
            }
        }
        let series = series.unwrap_or_else(|| SensorSeries::new('\0'));

        let mut key_descriptions = BTreeMap::new();
        for key in &matched {
            let wildcards: Vec<char> = wildcard_positions
                .iter()
                .filter_map(|&i| key.char_at(i))
                .collect();
            key_descriptions.insert(*key, resolve_description(description, &wildcards));
        }

        Some(Self {
            pattern: pattern.to_string(),
            key_order: matched,
            key_descriptions,
            series,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn key_order(&self) -> &[SensorKey] {
        &self.key_order
    }

    pub fn description_for(&self, key: &SensorKey) -> Option<&str> {
        self.key_descriptions.get(key).map(String::as_str)
    }

    pub fn series(&self) -> &SensorSeries {
        &self.series
    }

    /// Keys belonging to the leading contiguous run, in series order.
    pub fn concurrent_keys(&self) -> Vec<SensorKey> {
        let n = self.series.concurrent_values();
        let mut sorted = self.key_order.clone();
        sorted.sort();
        sorted.truncate(n);
        sorted
    }
}

/// Substitute resolved wildcard characters into the description template.
/// A template without placeholders gets the wildcard appended so multiple
/// members of one family stay distinguishable.
fn resolve_description(template: &str, wildcards: &[char]) -> String {
    if !template.contains('?') {
        return match wildcards {
            [] => template.to_string(),
            cs => {
                let suffix: String = cs.iter().collect();
                format!("{template} {suffix}")
            }
        };
    }
    let mut out = String::with_capacity(template.len());
    let mut next = wildcards.iter();
    for ch in template.chars() {
        if ch == '?' {
            match next.next() {
                Some(w) => out.push(*w),
                None => out.push(ch),
            }
        } else {
            out.push(ch);
        }
    }
    out
}
