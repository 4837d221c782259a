// Summary statistics over the score files of an experiment, one row per (model, year, batch).

use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::bracket::{Bracket, Format};
use crate::config::ModelConfig;
use crate::error::{Result, SimError};
use crate::pool::{batch_dir, scores_file, ScoreRecord};
use crate::sampling::year_index;
use crate::scoring::pick_favorite_score;

/// Lowest score on the ESPN Tournament Challenge top-100 leaderboard, 2013-2019.
pub const ESPN_TOP_100_MIN: [u32; 7] = [1590, 1520, 1760, 1630, 1650, 1550, 1730];

pub fn espn_top_100_min(year: u32) -> Result<u32> {
    Ok(ESPN_TOP_100_MIN[year_index(year)?])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub model: String,
    pub year: u32,
    pub batch: usize,
    pub num_brackets: usize,
    pub max: u32,
    pub min: u32,
    pub median: f64,
    pub mean: f64,
    pub variance: f64,
    pub percentile_95: u32,
    pub percentile_99: u32,
    pub count_espn_top_100: usize,
    pub pick_favorite_score: u32,
    pub proportion_at_least_pick_favorite: f64,
}

/// Score at the top `fraction` of a descending list (the 95th percentile is fraction 0.05).
fn upper_percentile(sorted_desc: &[u32], fraction: f64) -> u32 {
    let idx = ((sorted_desc.len() as f64 * fraction) as usize).saturating_sub(1);
    sorted_desc[idx.min(sorted_desc.len() - 1)]
}

impl BatchSummary {
    pub fn from_record(model: &str, format: Format, batch: usize, record: &ScoreRecord) -> Result<BatchSummary> {
        if record.scores.is_empty() {
            return Err(SimError::Corpus(format!("{} {}: score file has no scores", model, record.year)));
        }
        let mut sorted = record.scores.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let n = sorted.len();

        let mean = sorted.iter().map(|&s| s as f64).sum::<f64>() / n as f64;
        let variance = sorted.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            sorted[n / 2] as f64
        } else {
            (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0
        };

        let actual = Bracket::from_bit_str(&record.actual_bracket)?;
        let pick_favorite = pick_favorite_score(&actual, format)?[0];
        let at_least_pf = sorted.iter().filter(|&&s| s >= pick_favorite).count();
        let espn_min = espn_top_100_min(record.year)?;

        Ok(BatchSummary {
            model: model.to_string(),
            year: record.year,
            batch,
            num_brackets: n,
            max: sorted[0],
            min: sorted[n - 1],
            median,
            mean,
            variance,
            percentile_95: upper_percentile(&sorted, 0.05),
            percentile_99: upper_percentile(&sorted, 0.01),
            count_espn_top_100: sorted.iter().filter(|&&s| s >= espn_min).count(),
            pick_favorite_score: pick_favorite,
            proportion_at_least_pick_favorite: at_least_pf as f64 / n as f64,
        })
    }
}

/// Summaries of every score file of one batch; models or years without a file are skipped.
pub fn summarize_batch(
    models: &[ModelConfig],
    years: &[u32],
    root: &Path,
    num_trials: usize,
    batch: usize,
) -> Result<Vec<BatchSummary>> {
    let dir = batch_dir(root, num_trials, batch);
    let mut summaries = Vec::new();
    for &year in years {
        for model in models {
            let path = scores_file(&dir, &model.model_name, year);
            if !path.exists() {
                debug!("no scores at {}", path.display());
                continue;
            }
            let record = ScoreRecord::from_file(&path)?;
            summaries.push(BatchSummary::from_record(&model.model_name, model.format, batch, &record)?);
        }
    }
    Ok(summaries)
}

pub fn write_csv<W: Write>(summaries: &[BatchSummary], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for summary in summaries {
        wtr.serialize(summary)?;
    }
    wtr.flush()?;
    Ok(())
}

/// `<dir>/exp_<N|Nk>_batch_NN.csv`
pub fn summary_file(dir: &Path, num_trials: usize, batch: usize) -> PathBuf {
    let trials = if num_trials < 1000 {
        format!("{}", num_trials)
    } else {
        format!("{}k", num_trials / 1000)
    };
    dir.join(format!("exp_{}_batch_{:02}.csv", trials, batch))
}

/// Writes one csv per batch, returns the files written.
pub fn summarize_experiment(
    models: &[ModelConfig],
    years: &[u32],
    root: &Path,
    num_trials: usize,
    num_batches: usize,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let mut written = Vec::with_capacity(num_batches);
    for batch in 0..num_batches {
        let summaries = summarize_batch(models, years, root, num_trials, batch)?;
        let path = summary_file(output_dir, num_trials, batch);
        write_csv(&summaries, std::fs::File::create(&path)?)?;
        info!("{} rows written to {}", summaries.len(), path.display());
        written.push(path);
    }
    Ok(written)
}
