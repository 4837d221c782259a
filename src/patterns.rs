// Named groups of three correlated games and their empirical distributions.
// Regional groups index into a 15-bit region and are applied to all four regions;
// non-regional groups index into the full 63-bit bracket.

use std::collections::BTreeMap;

use fnv::FnvHashMap;
use log::debug;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::bracket::{NUM_BITS, REGION_BITS};
use crate::error::{Result, SimError};

pub const PATTERN_WIDTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternSection {
    Triplets,
    Paths,
    NonRegionalTriplets,
    NonRegionalPaths,
}

impl PatternSection {
    pub fn is_regional(&self) -> bool {
        matches!(self, PatternSection::Triplets | PatternSection::Paths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub name: String,
    pub bits: [usize; PATTERN_WIDTH],
    pub section: PatternSection,
}

impl PatternSpec {
    pub fn new(name: &str, bits: &[usize], section: PatternSection) -> Result<PatternSpec> {
        let malformed = |reason: String| SimError::MalformedPattern { name: name.to_string(), reason };
        if bits.len() != PATTERN_WIDTH {
            return Err(malformed(format!("expected {} bit positions, got {}", PATTERN_WIDTH, bits.len())));
        }
        let limit = if section.is_regional() { REGION_BITS } else { NUM_BITS };
        if let Some(b) = bits.iter().find(|&&b| b >= limit) {
            return Err(malformed(format!("bit {} out of range for a {:?} pattern (limit {})", b, section, limit)));
        }
        if bits[0] == bits[1] || bits[0] == bits[2] || bits[1] == bits[2] {
            return Err(malformed(format!("repeated bit position in {:?}", bits)));
        }
        Ok(PatternSpec {
            name: name.to_string(),
            bits: [bits[0], bits[1], bits[2]],
            section,
        })
    }

    /// Absolute bracket positions covered by this pattern in `region_idx`.
    /// Non-regional patterns ignore the region.
    pub fn positions(&self, region_idx: usize) -> [usize; PATTERN_WIDTH] {
        if self.section.is_regional() {
            self.bits.map(|b| b + region_idx * REGION_BITS)
        } else {
            self.bits
        }
    }

    fn project(&self, row: &[bool]) -> [bool; PATTERN_WIDTH] {
        self.bits.map(|b| row[b])
    }
}

const BUILTIN_PATTERNS: [(&str, [usize; 3], PatternSection); 34] = [
    ("E8_F4", [12, 13, 14], PatternSection::Triplets),
    ("S16_E8_1", [8, 9, 12], PatternSection::Triplets),
    ("S16_E8_2", [10, 11, 13], PatternSection::Triplets),
    ("R1_R2_1", [0, 1, 8], PatternSection::Triplets),
    ("R1_R2_2", [2, 3, 9], PatternSection::Triplets),
    ("R1_R2_3", [4, 5, 10], PatternSection::Triplets),
    ("R1_R2_4", [6, 7, 11], PatternSection::Triplets),
    ("NCG", [60, 61, 62], PatternSection::NonRegionalTriplets),
    ("R4_R5_1", [14, 29, 60], PatternSection::NonRegionalTriplets),
    ("R4_R5_2", [44, 59, 61], PatternSection::NonRegionalTriplets),
    ("P_S1", [0, 8, 12], PatternSection::Paths),
    ("P_S2", [7, 11, 13], PatternSection::Paths),
    ("P_S3", [5, 10, 13], PatternSection::Paths),
    ("P_S4", [3, 9, 12], PatternSection::Paths),
    ("P_S5", [2, 9, 12], PatternSection::Paths),
    ("P_S6", [4, 10, 13], PatternSection::Paths),
    ("P_S7", [6, 11, 13], PatternSection::Paths),
    ("P_S8", [1, 8, 12], PatternSection::Paths),
    ("P_R2_1", [8, 12, 14], PatternSection::Paths),
    ("P_R2_2", [9, 12, 14], PatternSection::Paths),
    ("P_R2_3", [10, 13, 14], PatternSection::Paths),
    ("P_R2_4", [11, 13, 14], PatternSection::Paths),
    ("P_R4_R6_1", [14, 60, 62], PatternSection::NonRegionalPaths),
    ("P_R4_R6_2", [29, 60, 62], PatternSection::NonRegionalPaths),
    ("P_R4_R6_3", [44, 61, 62], PatternSection::NonRegionalPaths),
    ("P_R4_R6_4", [59, 61, 62], PatternSection::NonRegionalPaths),
    ("P_R3_R5_1", [12, 14, 60], PatternSection::NonRegionalPaths),
    ("P_R3_R5_2", [13, 14, 60], PatternSection::NonRegionalPaths),
    ("P_R3_R5_3", [27, 29, 60], PatternSection::NonRegionalPaths),
    ("P_R3_R5_4", [28, 29, 60], PatternSection::NonRegionalPaths),
    ("P_R3_R5_5", [42, 44, 61], PatternSection::NonRegionalPaths),
    ("P_R3_R5_6", [43, 44, 61], PatternSection::NonRegionalPaths),
    ("P_R3_R5_7", [57, 59, 61], PatternSection::NonRegionalPaths),
    ("P_R3_R5_8", [58, 59, 61], PatternSection::NonRegionalPaths),
];

/// Pattern definitions addressable by name.
#[derive(Debug, Clone)]
pub struct PatternCatalogue {
    specs: FnvHashMap<String, PatternSpec>,
}

impl Default for PatternCatalogue {
    fn default() -> Self {
        let mut specs = FnvHashMap::default();
        for (name, bits, section) in BUILTIN_PATTERNS.iter() {
            specs.insert(
                name.to_string(),
                PatternSpec { name: name.to_string(), bits: *bits, section: *section },
            );
        }
        PatternCatalogue { specs }
    }
}

impl PatternCatalogue {
    /// Adds (or replaces) a pattern definition.
    pub fn insert(&mut self, spec: PatternSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Result<&PatternSpec> {
        self.specs.get(name).ok_or_else(|| SimError::UnknownPattern(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Empirical categorical distribution over bit combinations.
/// `cdf` has one more entry than `outcomes`, starts at 0 and ends at 1;
/// outcome `i` owns the half-open bucket `[cdf[i], cdf[i + 1])`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityTable {
    outcomes: Vec<Vec<bool>>,
    cdf: Vec<f64>,
    support: usize,
}

impl ProbabilityTable {
    /// Counts distinct observations (lexicographic order, 0 before 1).
    /// No observations means no information: every combination gets equal weight.
    pub fn from_observations<I>(width: usize, observations: I) -> ProbabilityTable
    where
        I: IntoIterator<Item = Vec<bool>>,
    {
        let mut counts: BTreeMap<Vec<bool>, usize> = BTreeMap::new();
        for obs in observations {
            debug_assert_eq!(obs.len(), width);
            *counts.entry(obs).or_insert(0) += 1;
        }
        if counts.is_empty() {
            return ProbabilityTable::uniform(width);
        }
        let total: usize = counts.values().sum();
        let mut cdf = Vec::with_capacity(counts.len() + 1);
        let mut running = 0;
        cdf.push(0.0);
        for count in counts.values() {
            running += count;
            cdf.push(running as f64 / total as f64);
        }
        ProbabilityTable {
            outcomes: counts.into_keys().collect(),
            cdf,
            support: total,
        }
    }

    /// Every one of the 2^width combinations, equally likely.
    pub fn uniform(width: usize) -> ProbabilityTable {
        let n = 1usize << width;
        let outcomes = (0..n)
            .map(|code| (0..width).map(|i| (code >> (width - 1 - i)) & 1 == 1).collect())
            .collect();
        let cdf = (0..=n).map(|i| i as f64 / n as f64).collect();
        ProbabilityTable { outcomes, cdf, support: 0 }
    }

    pub fn outcomes(&self) -> &[Vec<bool>] {
        &self.outcomes
    }

    pub fn cdf(&self) -> &[f64] {
        &self.cdf
    }

    /// Number of historical rows behind the table; 0 for the uniform fallback.
    pub fn support(&self) -> usize {
        self.support
    }

    pub fn is_fallback(&self) -> bool {
        self.support == 0
    }

    /// Outcome whose bucket contains `n` (expected in `[0, 1)`).
    pub fn select(&self, n: f64) -> &[bool] {
        let i = self.cdf.partition_point(|&c| c <= n).saturating_sub(1);
        &self.outcomes[i.min(self.outcomes.len() - 1)]
    }

    pub fn sample(&self, rng: &mut dyn RngCore) -> &[bool] {
        self.select(rng.gen::<f64>())
    }
}

/// Fixed positions (0..3 within a pattern) and their values, sorted by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionKey(Vec<(u8, bool)>);

impl ConditionKey {
    pub fn new(mut fixed: Vec<(u8, bool)>) -> ConditionKey {
        fixed.sort();
        fixed.dedup_by_key(|(pos, _)| *pos);
        ConditionKey(fixed)
    }

    pub fn from_known(values: &[Option<bool>; PATTERN_WIDTH]) -> ConditionKey {
        ConditionKey(
            values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (i as u8, v)))
                .collect(),
        )
    }

    pub fn fixed(&self) -> &[(u8, bool)] {
        &self.0
    }

    pub fn free_positions(&self) -> Vec<usize> {
        (0..PATTERN_WIDTH).filter(|&i| !self.0.iter().any(|&(p, _)| p as usize == i)).collect()
    }

    fn matches(&self, row: &[bool; PATTERN_WIDTH]) -> bool {
        self.0.iter().all(|&(p, v)| row[p as usize] == v)
    }

    /// All assignments to one or two of the three positions.
    pub fn all_partial() -> Vec<ConditionKey> {
        let subsets: [&[u8]; 6] = [&[0], &[1], &[2], &[0, 1], &[0, 2], &[1, 2]];
        let mut keys = Vec::new();
        for subset in subsets {
            for code in 0..(1u8 << subset.len()) {
                let fixed = subset
                    .iter()
                    .enumerate()
                    .map(|(i, &pos)| (pos, (code >> (subset.len() - 1 - i)) & 1 == 1))
                    .collect();
                keys.push(ConditionKey(fixed));
            }
        }
        keys
    }
}

/// Unconditional and conditional tables for one pattern and one target year.
#[derive(Debug, Clone)]
pub struct PatternTables {
    pub unconditional: ProbabilityTable,
    conditionals: FnvHashMap<ConditionKey, ProbabilityTable>,
}

impl PatternTables {
    /// `rows` are 15-bit region rows for regional patterns and full 63-bit rows otherwise.
    pub fn build(spec: &PatternSpec, rows: &[&[bool]]) -> PatternTables {
        let projected: Vec<[bool; PATTERN_WIDTH]> = rows.iter().map(|row| spec.project(row)).collect();
        let unconditional = ProbabilityTable::from_observations(PATTERN_WIDTH, projected.iter().map(|r| r.to_vec()));

        let mut conditionals = FnvHashMap::default();
        for key in ConditionKey::all_partial() {
            let free = key.free_positions();
            let table = ProbabilityTable::from_observations(
                free.len(),
                projected
                    .iter()
                    .filter(|r| key.matches(r))
                    .map(|r| free.iter().map(|&i| r[i]).collect()),
            );
            if table.is_fallback() {
                debug!("{}: no history matches {:?}, using uniform fallback", spec.name, key);
            }
            conditionals.insert(key, table);
        }
        PatternTables { unconditional, conditionals }
    }

    pub fn conditional(&self, key: &ConditionKey) -> Option<&ProbabilityTable> {
        self.conditionals.get(key)
    }

    /// Completes a partially-known triple. Returns `None` when nothing is open.
    pub fn resolve(
        &self,
        current: &[Option<bool>; PATTERN_WIDTH],
        rng: &mut dyn RngCore,
    ) -> Result<Option<[bool; PATTERN_WIDTH]>> {
        let known = current.iter().filter(|v| v.is_some()).count();
        if known == PATTERN_WIDTH {
            return Ok(None);
        }
        if known == 0 {
            let drawn = self.unconditional.sample(rng);
            return Ok(Some([drawn[0], drawn[1], drawn[2]]));
        }
        let key = ConditionKey::from_known(current);
        let table = self
            .conditional(&key)
            .ok_or_else(|| SimError::InvariantViolation(format!("no conditional table for {:?}", key)))?;
        let drawn = table.sample(rng);
        let mut resolved = [false; PATTERN_WIDTH];
        let mut free = drawn.iter();
        for (i, slot) in resolved.iter_mut().enumerate() {
            *slot = match current[i] {
                Some(v) => v,
                None => *free
                    .next()
                    .ok_or_else(|| SimError::InvariantViolation(format!("conditional table for {:?} too narrow", key)))?,
            };
        }
        Ok(Some(resolved))
    }
}
