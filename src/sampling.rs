// Anchor seed distributions: champion, runner-up, Final Four and Elite Eight seeds,
// drawn from per-year truncated-geometric fits with point masses. Parameters cover 2013-2019.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

pub const FIRST_YEAR: u32 = 2013;
pub const LAST_YEAR: u32 = 2019;

const P_CHAMP: [f64; 7] = [0.5090909091, 0.5178571429, 0.4761904762, 0.484375, 0.4848484848, 0.4925373134, 0.5];
const CHAMP_SUM: [f64; 7] = [0.9966270601, 0.997079845, 0.9943325575, 0.9950034329, 0.9950400208, 0.9956022259, 0.99609375];
const P_RUNNER_UP: [f64; 7] = [0.3835616438, 0.3766233766, 0.3529411765, 0.3604651163, 0.367816092, 0.375, 0.3736263736];
const RUNNER_UP_SUM: [f64; 7] = [0.9791494637, 0.9771963641, 0.9692708809, 0.9720157349, 0.9744878244, 0.9767169356, 0.9763044002];

const P_F4: [f64; 7] = [0.4160, 0.4036, 0.3926, 0.3929, 0.3772, 0.3757, 0.3789];
const P_F4_SUM: [f64; 7] = [0.9984, 0.9980, 0.9975, 0.9975, 0.9966, 0.9965, 0.9967];
const P_F4_CHOOSE_11: [f64; 7] = [0.025, 0.024, 0.022, 0.021, 0.020, 0.019, 0.026];

const N_TOP: [u32; 7] = [105, 108, 110, 113, 116, 119, 122];
const N_BOTTOM: [u32; 7] = [7, 8, 10, 11, 12, 13, 14];
const P_F4_TOP: [f64; 7] = [0.4565, 0.4519, 0.4545, 0.4612, 0.464, 0.4667, 0.4692];
const P_F4_TOP_SUM: [f64; 7] = [0.9742, 0.9729, 0.9737, 0.9755, 0.9763, 0.9770, 0.9776];
// 7, 8 and 11 carry double weight
const F4_BOTTOM_SEEDS: [u8; 9] = [7, 7, 8, 8, 9, 10, 11, 11, 12];

// index 0 is never drawn once the geometric draw is clamped to >= 1
const E8_TOP_SEEDS: [u8; 9] = [0, 1, 4, 5, 8, 9, 12, 13, 16];
const E8_BOTTOM_SEEDS: [u8; 9] = [0, 2, 3, 6, 7, 10, 11, 14, 15];
const P_E8_TOP: [f64; 7] = [0.56, 0.54, 0.54, 0.54, 0.54, 0.53, 0.51];
const P_E8_TOP_SUM: [f64; 7] = [0.99; 7];
const P_E8_CHOOSE_1: [f64; 7] = [0.33, 0.31, 0.31, 0.32, 0.34, 0.34, 0.36];
const P_E8_BOTTOM: [f64; 7] = [0.48, 0.49, 0.49, 0.49, 0.49, 0.48, 0.49];
const P_E8_BOTTOM_SUM: [f64; 7] = [0.98; 7];
const P_E8_CHOOSE_11: [f64; 7] = [0.03, 0.03, 0.03, 0.03, 0.03, 0.03, 0.04];

pub fn year_index(year: u32) -> Result<usize> {
    if (FIRST_YEAR..=LAST_YEAR).contains(&year) {
        Ok((year - FIRST_YEAR) as usize)
    } else {
        Err(SimError::UnsupportedYear(year))
    }
}

/// Inverse-CDF draw from a geometric distribution truncated to total mass `p_sum`,
/// clamped to `1..=max`.
pub fn truncated_geometric(p: f64, p_sum: f64, max: u8, rng: &mut dyn RngCore) -> u8 {
    if p >= 1.0 {
        return 1;
    }
    if p <= 0.0 {
        return max;
    }
    let u = rng.gen::<f64>() * p_sum;
    let k = ((1.0 - u).ln() / (1.0 - p).ln()).ceil();
    if k.is_nan() || k < 1.0 {
        1
    } else if k > max as f64 {
        max
    } else {
        k as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedPerturbationKind {
    /// Shift by a uniform draw in `[0, p * percent)`.
    Rv,
    /// Shift by exactly `percent`.
    Fixed,
}

fn default_kind() -> SeedPerturbationKind {
    SeedPerturbationKind::Rv
}

fn default_percent() -> f64 {
    0.1
}

/// Fuzz applied to the geometric parameter of the anchor seed distributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedPerturbation {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: SeedPerturbationKind,
    #[serde(default = "default_percent")]
    pub percent: f64,
}

impl SeedPerturbation {
    pub fn apply(&self, p: f64, rng: &mut dyn RngCore) -> f64 {
        let shifted = match self.kind {
            SeedPerturbationKind::Rv => p + rng.gen::<f64>() * p * self.percent,
            SeedPerturbationKind::Fixed => p + self.percent,
        };
        shifted.clamp(0.0, 1.0)
    }
}

/// Source of anchor seeds for the end models.
pub trait AnchorSampler: Sync {
    fn champion(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8>;
    fn runner_up(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8>;
    /// Final Four seed, geometric with a point mass on 11.
    fn f4_together(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8>;
    /// Final Four seed, two-stage: geometric over the top seeds or a fixed table over 7-12.
    fn f4_split(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8>;
    fn e8_top(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8>;
    fn e8_bottom(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8>;
}

/// The fitted historical distributions.
#[derive(Debug, Clone, Default)]
pub struct HistoricalSeedSampler {
    pub perturbation: Option<SeedPerturbation>,
}

impl HistoricalSeedSampler {
    pub fn new(perturbation: Option<SeedPerturbation>) -> Self {
        HistoricalSeedSampler { perturbation }
    }

    fn perturb(&self, p: f64, rng: &mut dyn RngCore) -> f64 {
        match &self.perturbation {
            Some(perturbation) => perturbation.apply(p, rng),
            None => p,
        }
    }
}

impl AnchorSampler for HistoricalSeedSampler {
    fn champion(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8> {
        let i = year_index(year)?;
        let p = self.perturb(P_CHAMP[i], rng);
        Ok(truncated_geometric(p, CHAMP_SUM[i], 16, rng))
    }

    fn runner_up(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8> {
        let i = year_index(year)?;
        let p = self.perturb(P_RUNNER_UP[i], rng);
        Ok(truncated_geometric(p, RUNNER_UP_SUM[i], 16, rng))
    }

    fn f4_together(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8> {
        let i = year_index(year)?;
        let p = self.perturb(P_F4[i], rng);
        if rng.gen::<f64>() <= P_F4_CHOOSE_11[i] {
            return Ok(11);
        }
        Ok(truncated_geometric(p, P_F4_SUM[i], 16, rng))
    }

    fn f4_split(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8> {
        let i = year_index(year)?;
        let p_use_top = N_TOP[i] as f64 / (N_TOP[i] + N_BOTTOM[i]) as f64;
        if rng.gen::<f64>() <= p_use_top {
            let p = self.perturb(P_F4_TOP[i], rng);
            Ok(truncated_geometric(p, P_F4_TOP_SUM[i], 16, rng))
        } else {
            Ok(F4_BOTTOM_SEEDS[rng.gen_range(0..F4_BOTTOM_SEEDS.len())])
        }
    }

    fn e8_top(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8> {
        let i = year_index(year)?;
        if rng.gen::<f64>() <= P_E8_CHOOSE_1[i] {
            return Ok(1);
        }
        let p = self.perturb(P_E8_TOP[i], rng);
        let idx = truncated_geometric(p, P_E8_TOP_SUM[i], 8, rng);
        Ok(E8_TOP_SEEDS[idx as usize])
    }

    fn e8_bottom(&self, year: u32, rng: &mut dyn RngCore) -> Result<u8> {
        let i = year_index(year)?;
        if rng.gen::<f64>() <= P_E8_CHOOSE_11[i] {
            return Ok(11);
        }
        let p = self.perturb(P_E8_BOTTOM[i], rng);
        let idx = truncated_geometric(p, P_E8_BOTTOM_SUM[i], 8, rng);
        Ok(E8_BOTTOM_SEEDS[idx as usize])
    }
}
