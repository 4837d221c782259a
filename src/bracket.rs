// Bit layout of a 64-team bracket and the helpers that walk seeds through it.
// A bracket is 63 bits: four regions of 15 bits each (8 first-round games, 4 second-round,
// 2 Sweet 16, 1 Elite 8), then the two national semifinals and the championship game.
// In the default (TTT) orientation a 1 means the team in the upper slot of the game won;
// in the FFF orientation a 1 means the lower-numbered seed won.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

pub const NUM_BITS: usize = 63;
pub const NUM_REGIONS: usize = 4;
pub const REGION_BITS: usize = 15;
/// Number of bits covered by the four regions; everything from here on is the Final Four.
pub const REGIONAL_BITS: usize = NUM_REGIONS * REGION_BITS;
pub const SEMIFINAL_BITS: [usize; 2] = [60, 61];
pub const CHAMPIONSHIP_BIT: usize = 62;

/// Canonical top-to-bottom seed order of a region in the official bracket.
pub const SEED_ORDER: [u8; 16] = [1, 16, 8, 9, 5, 12, 4, 13, 6, 11, 3, 14, 7, 10, 2, 15];

// R1: bits 0-7, R2: 8-11, Sweet 16: 12-13, Elite 8: 14 (relative to the region)
const ROUND_OFFSETS: [usize; 4] = [0, 8, 12, 14];
const GAMES_PER_ROUND: [usize; 4] = [8, 4, 2, 1];

/// Relative index of the Elite Eight game inside a region.
pub const REGION_FINAL_BIT: usize = REGION_BITS - 1;

/// Orientation of the bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Format {
    /// Seed-relative: 1 means the upper slot of the game won.
    #[default]
    TTT,
    /// Absolute-seed: 1 means the lower-numbered seed won.
    FFF,
}

pub fn region_offset(region_idx: usize) -> usize {
    region_idx * REGION_BITS
}

// round_idx 0-3: regional rounds, game index within the region
// round_idx 4: national semifinals, game 0 is regions 0/1, game 1 is regions 2/3
// round_idx 5: championship
pub fn get_binary_index_for_game(
    round_idx: usize,
    game_in_round_idx_in_region: usize,
    region_idx: usize,
) -> usize {
    match round_idx {
        0..=3 => {
            assert!(game_in_round_idx_in_region < GAMES_PER_ROUND[round_idx], "Invalid game {} for round {}", game_in_round_idx_in_region, round_idx);
            region_offset(region_idx) + ROUND_OFFSETS[round_idx] + game_in_round_idx_in_region
        }
        4 => SEMIFINAL_BITS[game_in_round_idx_in_region],
        5 => CHAMPIONSHIP_BIT,
        _ => panic!("Invalid round_idx: {}", round_idx),
    }
}

/// Inverse of `get_binary_index_for_game`: (round_idx, game_in_round_idx_in_region, region_idx).
/// Final Four games report region 0.
pub fn get_game_identifier_from_binary_index(binary_idx: usize) -> (usize, usize, usize) {
    match binary_idx {
        0..=59 => {
            let region_idx = binary_idx / REGION_BITS;
            let relative = binary_idx % REGION_BITS;
            let round_idx = ROUND_OFFSETS.iter().rposition(|&o| o <= relative).unwrap_or(0);
            (round_idx, relative - ROUND_OFFSETS[round_idx], region_idx)
        }
        60 | 61 => (4, binary_idx - 60, 0),
        62 => (5, 0, 0),
        _ => panic!("Invalid binary_idx: {}", binary_idx),
    }
}

pub fn is_first_round_bit(binary_idx: usize) -> bool {
    get_game_identifier_from_binary_index(binary_idx).0 == 0
}

/// Winners of one round given the seeds that played it (top to bottom) and the game results.
pub fn apply_round_results(seeds: &[u8], results: &[bool]) -> Vec<u8> {
    results
        .iter()
        .enumerate()
        .map(|(i, &upper_won)| if upper_won { seeds[2 * i] } else { seeds[2 * i + 1] })
        .collect()
}

pub fn apply_round_results_fff(seeds: &[u8], results: &[bool]) -> Vec<u8> {
    results
        .iter()
        .enumerate()
        .map(|(i, &favorite_won)| {
            let (a, b) = (seeds[2 * i], seeds[2 * i + 1]);
            if favorite_won { a.min(b) } else { a.max(b) }
        })
        .collect()
}

/// Surviving seeds after each of the four regional rounds (8, 4, 2 and 1 seeds).
pub fn percolate_region(region_bits: &[bool], format: Format) -> [Vec<u8>; 4] {
    assert_eq!(region_bits.len(), REGION_BITS, "a region has exactly 15 games");
    let apply = match format {
        Format::TTT => apply_round_results,
        Format::FFF => apply_round_results_fff,
    };
    let mut seeds: Vec<u8> = SEED_ORDER.to_vec();
    let mut rounds: [Vec<u8>; 4] = Default::default();
    for (round, survivors) in rounds.iter_mut().enumerate() {
        let start = ROUND_OFFSETS[round];
        seeds = apply(&seeds, &region_bits[start..start + GAMES_PER_ROUND[round]]);
        *survivors = seeds.clone();
    }
    rounds
}

/// Partially-known bits of one region, `None` where the game is still open.
pub type RegionPattern = [Option<bool>; REGION_BITS];

/// The regional bits that make `seed` the region's sole survivor: its four games are fixed,
/// every other game is left open. One pattern per seed, slot-relative (TTT) orientation.
pub fn regional_pattern_for_winner(seed: u8) -> Result<RegionPattern> {
    let slot = SEED_ORDER
        .iter()
        .position(|&s| s == seed)
        .ok_or_else(|| SimError::InvariantViolation(format!("seed {} is not a regional seed", seed)))?;
    let mut pattern: RegionPattern = [None; REGION_BITS];
    let mut position = slot;
    for round in 0..4 {
        // even position = upper slot of the game
        pattern[get_binary_index_for_game(round, position / 2, 0)] = Some(position % 2 == 0);
        position /= 2;
    }
    Ok(pattern)
}

/// Percolates a partially-known region; returns the regional winner if the pattern decides it.
pub fn pattern_winner(pattern: &RegionPattern) -> Option<u8> {
    let mut seeds: Vec<Option<u8>> = SEED_ORDER.iter().map(|&s| Some(s)).collect();
    for round in 0..4 {
        let start = ROUND_OFFSETS[round];
        seeds = (0..GAMES_PER_ROUND[round])
            .map(|g| match pattern[start + g] {
                Some(true) => seeds[2 * g],
                Some(false) => seeds[2 * g + 1],
                None => None,
            })
            .collect();
    }
    seeds[0]
}

/// Bracket under construction. Each position is unknown (`None`) until something fixes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialBracket {
    bits: [Option<bool>; NUM_BITS],
}

impl Default for PartialBracket {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialBracket {
    pub fn new() -> PartialBracket {
        PartialBracket { bits: [None; NUM_BITS] }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<bool> {
        self.bits[idx]
    }

    #[inline]
    pub fn set(&mut self, idx: usize, value: bool) {
        self.bits[idx] = Some(value);
    }

    #[inline]
    pub fn clear(&mut self, idx: usize) {
        self.bits[idx] = None;
    }

    pub fn is_known(&self, idx: usize) -> bool {
        self.bits[idx].is_some()
    }

    pub fn count_known(&self) -> usize {
        self.bits.iter().filter(|b| b.is_some()).count()
    }

    pub fn region(&self, region_idx: usize) -> RegionPattern {
        let offset = region_offset(region_idx);
        let mut pattern: RegionPattern = [None; REGION_BITS];
        pattern.copy_from_slice(&self.bits[offset..offset + REGION_BITS]);
        pattern
    }

    /// Overwrites all 15 bits of the region, open games included.
    pub fn set_region(&mut self, region_idx: usize, pattern: &RegionPattern) {
        let offset = region_offset(region_idx);
        self.bits[offset..offset + REGION_BITS].copy_from_slice(pattern);
    }

    /// Writes the pattern's fixed games into the region where the region is still open.
    pub fn fill_region(&mut self, region_idx: usize, pattern: &RegionPattern) {
        let offset = region_offset(region_idx);
        for (i, value) in pattern.iter().enumerate() {
            if self.bits[offset + i].is_none() {
                self.bits[offset + i] = *value;
            }
        }
    }

    pub fn unknown_positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter(|(_, b)| b.is_none()).map(|(i, _)| i)
    }

    /// Converts into a resolved bracket; every position must be known.
    pub fn finalize(self) -> Result<Bracket> {
        let mut bits = [false; NUM_BITS];
        for (i, bit) in self.bits.iter().enumerate() {
            bits[i] = bit.ok_or_else(|| {
                SimError::InvariantViolation(format!("bit {} left unresolved after generation", i))
            })?;
        }
        Ok(Bracket { bits })
    }
}

/// Fully resolved bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bracket {
    bits: [bool; NUM_BITS],
}

impl Bracket {
    pub fn from_bits(bits: [bool; NUM_BITS]) -> Bracket {
        Bracket { bits }
    }

    /// Parses the 63-character '0'/'1' string used by the historical corpus.
    pub fn from_bit_str(s: &str) -> Result<Bracket> {
        let s = s.trim();
        if s.len() != NUM_BITS {
            return Err(SimError::Corpus(format!("bracket string must be {} characters, got {}", NUM_BITS, s.len())));
        }
        let mut bits = [false; NUM_BITS];
        for (i, c) in s.chars().enumerate() {
            bits[i] = match c {
                '1' => true,
                '0' => false,
                other => return Err(SimError::Corpus(format!("invalid character {:?} at position {}", other, i))),
            };
        }
        Ok(Bracket { bits })
    }

    pub fn to_bit_string(&self) -> String {
        self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect()
    }

    #[inline]
    pub fn bit(&self, idx: usize) -> bool {
        self.bits[idx]
    }

    pub fn bits(&self) -> &[bool; NUM_BITS] {
        &self.bits
    }

    pub fn region_bits(&self, region_idx: usize) -> &[bool] {
        let offset = region_offset(region_idx);
        &self.bits[offset..offset + REGION_BITS]
    }

    pub fn region_winner(&self, region_idx: usize, format: Format) -> u8 {
        percolate_region(self.region_bits(region_idx), format)[3][0]
    }
}
