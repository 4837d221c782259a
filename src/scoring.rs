// ESPN-style scoring of a bracket against the actual results.
// Rounds 1-4 are scored slot by slot inside each region (10, 20, 40, 80 points);
// the semifinals (160) and the championship (320) only count when the team they
// rest on was picked correctly all the way up.

use crate::bracket::{percolate_region, Bracket, Format, CHAMPIONSHIP_BIT, NUM_BITS, NUM_REGIONS, SEMIFINAL_BITS};
use crate::error::Result;

/// Index 0 is the total, 1-6 are the round subtotals.
pub type RoundScores = [u32; 7];

pub const SEMIFINAL_POINTS: u32 = 160;
pub const CHAMPIONSHIP_POINTS: u32 = 320;
pub const MAX_SCORE: u32 = 1920;

/// Always picks the better seed; the reference every pool is compared against.
pub const PICK_FAVORITE: &str = "111111111000101111111111000101111111111000101111111111000101111";

fn round_points(round: usize) -> u32 {
    10 * (1 << (round - 1))
}

/// Scores `bracket` against `actual`. With `pick_favorite` the bracket is credited with the
/// actual Final Four bits, so only its regional picks decide rounds 5 and 6.
pub fn score(bracket: &Bracket, actual: &Bracket, format: Format, pick_favorite: bool) -> RoundScores {
    let mut scores: RoundScores = [0; 7];
    let mut winners = [0u8; NUM_REGIONS];
    let mut actual_winners = [0u8; NUM_REGIONS];

    for region in 0..NUM_REGIONS {
        let picked = percolate_region(bracket.region_bits(region), format);
        let truth = percolate_region(actual.region_bits(region), format);
        for (r, (p, t)) in picked.iter().zip(truth.iter()).enumerate() {
            let matches = p.iter().zip(t.iter()).filter(|(a, b)| a == b).count() as u32;
            scores[r + 1] += round_points(r + 1) * matches;
        }
        winners[region] = picked[3][0];
        actual_winners[region] = truth[3][0];
    }

    let late = |b: &Bracket| [b.bit(SEMIFINAL_BITS[0]), b.bit(SEMIFINAL_BITS[1]), b.bit(CHAMPIONSHIP_BIT)];
    let actual_late = late(actual);
    let picked_late = if pick_favorite { actual_late } else { late(bracket) };

    // semifinal i is fed by regions 2i (bit = 1) and 2i + 1 (bit = 0)
    let semifinal_correct = |i: usize| {
        let region = if picked_late[i] { 2 * i } else { 2 * i + 1 };
        picked_late[i] == actual_late[i] && winners[region] == actual_winners[region]
    };
    let semis = [semifinal_correct(0), semifinal_correct(1)];
    for &correct in semis.iter() {
        if correct {
            scores[5] += SEMIFINAL_POINTS;
        }
    }

    let champion_semi = if picked_late[2] { 0 } else { 1 };
    if picked_late[2] == actual_late[2] && semis[champion_semi] {
        scores[6] += CHAMPIONSHIP_POINTS;
    }

    scores[0] = scores[1..].iter().sum();
    scores
}

/// The better seed winning every game, in the given orientation. In FFF that is all ones.
pub fn pick_favorite_bracket(format: Format) -> Result<Bracket> {
    match format {
        Format::TTT => Bracket::from_bit_str(PICK_FAVORITE),
        Format::FFF => Ok(Bracket::from_bits([true; NUM_BITS])),
    }
}

/// Score of the pick-favorite bracket, evaluated the way pools are compared against it.
/// `actual` must be in `format` orientation.
pub fn pick_favorite_score(actual: &Bracket, format: Format) -> Result<RoundScores> {
    let favorite = pick_favorite_bracket(format)?;
    Ok(score(&favorite, actual, format, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bracket(s: &str) -> Bracket {
        Bracket::from_bit_str(s).unwrap()
    }

    #[test]
    fn test_self_score_is_maximum() {
        let b = bracket(PICK_FAVORITE);
        assert_eq!(score(&b, &b, Format::TTT, false), [1920, 320, 320, 320, 320, 320, 320]);
        assert_eq!(score(&b, &b, Format::FFF, false)[0], MAX_SCORE);
    }

    #[test]
    fn test_wrong_title_bit_only() {
        let actual = bracket(PICK_FAVORITE);
        let mut bits = *actual.bits();
        bits[62] = !bits[62];
        let picked = Bracket::from_bits(bits);
        let scores = score(&picked, &actual, Format::TTT, false);
        assert_eq!(scores[5], 320);
        assert_eq!(scores[6], 0);
        assert_eq!(scores[0], 1600);
    }

    #[test]
    fn test_semifinal_needs_correct_region_winner() {
        let actual = bracket(PICK_FAVORITE);
        let mut bits = *actual.bits();
        // region 0 Elite Eight flipped: the region winner changes, bit 60 still says region 0
        bits[14] = !bits[14];
        let picked = Bracket::from_bits(bits);
        let scores = score(&picked, &actual, Format::TTT, false);
        assert_eq!(scores[4], 320 - 80);
        assert_eq!(scores[5], 160);
        // champion came through the first semifinal, so the title is lost as well
        assert_eq!(scores[6], 0);
        assert_eq!(scores[0], 1920 - 80 - 160 - 320);
    }

    #[test]
    fn test_first_round_upset_costs_later_rounds() {
        let actual = bracket(PICK_FAVORITE);
        let mut bits = *actual.bits();
        // 1 seed of region 3 loses in round 1
        bits[45] = false;
        let picked = Bracket::from_bits(bits);
        let scores = score(&picked, &actual, Format::TTT, false);
        assert_eq!(scores[1], 320 - 10);
        assert_eq!(scores[2], 320 - 20);
        assert_eq!(scores[3], 320 - 40);
        assert_eq!(scores[4], 320 - 80);
    }

    #[test]
    fn test_pick_favorite_uses_actual_late_bits() {
        let actual = bracket(PICK_FAVORITE);
        let mut bits = *actual.bits();
        bits[60] = !bits[60];
        bits[61] = !bits[61];
        bits[62] = !bits[62];
        let picked = Bracket::from_bits(bits);
        assert_eq!(score(&picked, &actual, Format::TTT, false)[0], 1280);
        assert_eq!(score(&picked, &actual, Format::TTT, true)[0], 1920);
        assert_eq!(pick_favorite_score(&actual, Format::TTT).unwrap()[0], 1920);
    }

    #[test]
    fn test_pick_favorite_in_fff_orientation() {
        let chalk = bracket(&"1".repeat(NUM_BITS));
        assert_eq!(pick_favorite_bracket(Format::FFF).unwrap(), chalk);
        assert_eq!(pick_favorite_score(&chalk, Format::FFF).unwrap()[0], MAX_SCORE);
        // the TTT favorite read against an FFF vector is not the same bracket
        assert!(pick_favorite_score(&chalk, Format::TTT).unwrap()[0] < MAX_SCORE);
    }

    #[test]
    fn test_fff_compares_seed_values() {
        // all ones in FFF is "better seed always wins"
        let chalk = bracket(&"1".repeat(NUM_BITS));
        let scores = score(&chalk, &chalk, Format::FFF, false);
        assert_eq!(scores[0], MAX_SCORE);
        let upsets = bracket(&"0".repeat(NUM_BITS));
        let scores = score(&upsets, &chalk, Format::FFF, false);
        assert_eq!(scores[1], 0);
    }

    proptest! {
        #[test]
        fn prop_self_score(bits in prop::array::uniform32(any::<bool>()), more in prop::array::uniform31(any::<bool>())) {
            let mut all = [false; NUM_BITS];
            all[..32].copy_from_slice(&bits);
            all[32..].copy_from_slice(&more);
            let b = Bracket::from_bits(all);
            prop_assert_eq!(score(&b, &b, Format::TTT, false)[0], MAX_SCORE);
            prop_assert_eq!(score(&b, &b, Format::FFF, false)[0], MAX_SCORE);
        }

        #[test]
        fn prop_total_is_sum_and_bounded(a in prop::array::uniform32(any::<bool>()), b in prop::array::uniform31(any::<bool>())) {
            let mut all = [false; NUM_BITS];
            all[..32].copy_from_slice(&a);
            all[32..].copy_from_slice(&b);
            let picked = Bracket::from_bits(all);
            let actual = bracket(PICK_FAVORITE);
            let scores = score(&picked, &actual, Format::TTT, false);
            prop_assert_eq!(scores[0], scores[1..].iter().sum::<u32>());
            prop_assert!(scores[0] <= MAX_SCORE);
        }
    }
}
