use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

//This file runs pools of generated brackets for one model and one tournament year.
//Every trial is independent: it owns its RNG (seeded from the batch seed plus the trial number),
//generates a bracket from the shared read-only context and scores it against the actual result.
//Trials are spread over all cores with rayon, so a batch of 100k brackets is a few seconds of work.

use crate::bracket::{Bracket, Format, NUM_BITS};
use crate::config::ModelConfig;
use crate::context::ModelContext;
use crate::error::{Result, SimError};
use crate::generator::BracketGenerator;
use crate::ingest::HistoricalCorpus;
use crate::sampling::{AnchorSampler, HistoricalSeedSampler};
use crate::scoring::score;

/// Scores of one batch, the file the summaries are computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub year: u32,
    pub actual_bracket: String,
    pub scores: Vec<u32>,
}

impl ScoreRecord {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ScoreRecord> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// How often each bit came out 1 over a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitFrequencies {
    pub model_name: String,
    pub year: u32,
    pub num_brackets: usize,
    pub frequencies: Vec<f64>,
}

impl BitFrequencies {
    pub fn from_brackets(model_name: &str, year: u32, brackets: &[Bracket]) -> BitFrequencies {
        let mut ones = [0usize; NUM_BITS];
        for bracket in brackets {
            for (i, &bit) in bracket.bits().iter().enumerate() {
                ones[i] += bit as usize;
            }
        }
        let n = brackets.len().max(1) as f64;
        BitFrequencies {
            model_name: model_name.to_string(),
            year,
            num_brackets: brackets.len(),
            frequencies: ones.iter().map(|&c| c as f64 / n).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub record: ScoreRecord,
    pub frequencies: BitFrequencies,
}

/// RNG of a single trial.
pub fn trial_rng(batch_seed: u64, trial: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(batch_seed.wrapping_add(trial))
}

pub struct TrialBatch<'a> {
    ctx: &'a ModelContext,
    sampler: &'a dyn AnchorSampler,
    actual: Bracket,
}

impl<'a> TrialBatch<'a> {
    pub fn new(ctx: &'a ModelContext, sampler: &'a dyn AnchorSampler, actual: Bracket) -> TrialBatch<'a> {
        TrialBatch { ctx, sampler, actual }
    }

    //Generates and scores num_trials brackets in parallel. Any failed trial fails the batch.
    pub fn run(&self, num_trials: usize, batch_seed: u64, progress: &ProgressBar) -> Result<BatchResult> {
        let generator = BracketGenerator::new(self.ctx, self.sampler);
        let format = self.ctx.model.format;
        let num_cpus = num_cpus::get();
        let num_trials_per_core = (num_trials / num_cpus).max(1);
        let results: Vec<(u32, Bracket)> = (0..num_trials)
            .into_par_iter()
            .with_min_len(num_trials_per_core)
            .map(|trial| -> Result<(u32, Bracket)> {
                let mut rng = trial_rng(batch_seed, trial as u64);
                let bracket = generator.generate(&mut rng)?;
                progress.inc(1);
                Ok((score(&bracket, &self.actual, format, false)[0], bracket))
            })
            .collect::<Result<Vec<_>>>()?;

        let (scores, brackets): (Vec<u32>, Vec<Bracket>) = results.into_iter().unzip();
        Ok(BatchResult {
            record: ScoreRecord {
                year: self.ctx.year,
                actual_bracket: self.actual.to_bit_string(),
                scores,
            },
            frequencies: BitFrequencies::from_brackets(&self.ctx.model.model_name, self.ctx.year, &brackets),
        })
    }
}

/// `<root>/<N>Trials/BatchNN`, or `<N/1000>kTrials` from a thousand trials up.
pub fn batch_dir(root: &Path, num_trials: usize, batch: usize) -> PathBuf {
    let trials = if num_trials < 1000 {
        format!("{}Trials", num_trials)
    } else {
        format!("{}kTrials", num_trials / 1000)
    };
    root.join(trials).join(format!("Batch{:02}", batch))
}

pub fn scores_file(dir: &Path, model_name: &str, year: u32) -> PathBuf {
    dir.join(format!("generatedScores_{}_{}.json", model_name, year))
}

pub fn stats_file(dir: &Path, model_name: &str, year: u32) -> PathBuf {
    dir.join(format!("vectorStats_{}_{}.json", model_name, year))
}

pub fn export_to_file(result: &BatchResult, dir: &Path, model_name: &str) -> Result<()> {
    fs::create_dir_all(dir)?;
    let year = result.record.year;
    serde_json::to_writer(BufWriter::new(File::create(scores_file(dir, model_name, year))?), &result.record)?;
    serde_json::to_writer(BufWriter::new(File::create(stats_file(dir, model_name, year))?), &result.frequencies)?;
    Ok(())
}

/// Historical results per orientation. FFF models train and score on the FFF corpus.
pub struct Corpora {
    pub ttt: HistoricalCorpus,
    pub fff: Option<HistoricalCorpus>,
}

impl Corpora {
    fn for_model(&self, model: &ModelConfig) -> Result<&HistoricalCorpus> {
        match model.format {
            Format::TTT => Ok(&self.ttt),
            Format::FFF => self.fff.as_ref().ok_or_else(|| {
                SimError::Config(format!("{} uses FFF orientation but no FFF corpus was given", model.model_name))
            }),
        }
    }
}

/// Model x year x batch loop of the experiments.
pub struct Experiment {
    pub years: Vec<u32>,
    pub num_trials: usize,
    pub num_batches: usize,
    pub output_root: PathBuf,
    pub base_seed: u64,
    pub show_progress: bool,
}

impl Experiment {
    fn batch_seed(&self, year: u32, batch: usize) -> u64 {
        self.base_seed
            .wrapping_add((year as u64) << 32)
            .wrapping_add((batch as u64).wrapping_mul(self.num_trials as u64))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})")
                .progress_chars("##-"),
        );
        pb
    }

    /// Runs every model, returning how many (model, year, batch) files were written.
    pub fn run(&self, models: &[ModelConfig], corpora: &Corpora) -> Result<usize> {
        let mut written = 0;
        for model in models {
            if !model.runs_on_this_engine() {
                warn!(
                    "skipping {}: generator {:?} is not handled here",
                    model.model_name,
                    model.generator.as_deref().unwrap_or("")
                );
                continue;
            }
            let corpus = corpora.for_model(model)?;
            let sampler = HistoricalSeedSampler::new(model.seed_perturbation());
            info!("{}: {} years x {} batches x {} trials", model.model_name, self.years.len(), self.num_batches, self.num_trials);
            for &year in &self.years {
                let ctx = ModelContext::build(model, corpus, year)?;
                let actual = corpus.actual(year)?;
                let batch = TrialBatch::new(&ctx, &sampler, actual);
                for batch_number in 0..self.num_batches {
                    let pb = self.progress_bar(self.num_trials);
                    pb.set_message(format!("{} {} batch {:02}", model.model_name, year, batch_number));
                    let result = batch.run(self.num_trials, self.batch_seed(year, batch_number), &pb)?;
                    pb.finish_and_clear();
                    let dir = batch_dir(&self.output_root, self.num_trials, batch_number);
                    export_to_file(&result, &dir, &model.model_name)?;
                    info!(
                        "{} {} batch {:02}: max {} written to {}",
                        model.model_name,
                        year,
                        batch_number,
                        result.record.scores.iter().max().copied().unwrap_or(0),
                        dir.display()
                    );
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}
