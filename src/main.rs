use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use ncaa_sim::config::{ModelConfig, ModelsFile};
use ncaa_sim::error::{Result, SimError};
use ncaa_sim::ingest::HistoricalCorpus;
use ncaa_sim::pool::{Corpora, Experiment};
use ncaa_sim::sampling::{FIRST_YEAR, LAST_YEAR};
use ncaa_sim::summary::summarize_experiment;

#[derive(Parser)]
#[command(name = "ncaa-sim", about = "Monte Carlo bracket pools from historical tournament patterns")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate and score bracket pools for every model, year and batch
    Run {
        /// models file (.json or .yaml)
        #[arg(short, long)]
        models: PathBuf,
        /// historical brackets in TTT orientation (.json or .csv)
        #[arg(short, long)]
        corpus: PathBuf,
        /// historical brackets in FFF orientation, needed by FFF models
        #[arg(long)]
        fff_corpus: Option<PathBuf>,
        #[arg(short = 'n', long, default_value_t = 1000)]
        trials: usize,
        #[arg(short, long, default_value_t = 25)]
        batches: usize,
        /// years to simulate, defaults to every supported year
        #[arg(short, long, value_delimiter = ',')]
        years: Vec<u32>,
        #[arg(short, long, default_value = "Experiments")]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// run only the model at this position in the models file
        #[arg(long)]
        model_index: Option<usize>,
        #[arg(long)]
        no_progress: bool,
    },
    /// Summarize the score files of a finished run into one csv per batch
    Summarize {
        #[arg(short, long)]
        models: PathBuf,
        #[arg(short = 'n', long, default_value_t = 1000)]
        trials: usize,
        #[arg(short, long, default_value_t = 25)]
        batches: usize,
        #[arg(short, long, value_delimiter = ',')]
        years: Vec<u32>,
        #[arg(short, long, default_value = "Experiments")]
        output: PathBuf,
        #[arg(long, default_value = "Summaries")]
        summaries: PathBuf,
    },
}

fn years_or_all(years: Vec<u32>) -> Vec<u32> {
    if years.is_empty() {
        (FIRST_YEAR..=LAST_YEAR).collect()
    } else {
        years
    }
}

fn select_models(models: Vec<ModelConfig>, index: Option<usize>) -> Result<Vec<ModelConfig>> {
    match index {
        None => Ok(models),
        Some(i) => {
            let len = models.len();
            models
                .into_iter()
                .nth(i)
                .map(|m| vec![m])
                .ok_or_else(|| SimError::Config(format!("model index {} out of range ({} models)", i, len)))
        }
    }
}

fn execute(command: Command) -> Result<()> {
    match command {
        Command::Run { models, corpus, fff_corpus, trials, batches, years, output, seed, model_index, no_progress } => {
            let models = select_models(ModelsFile::from_file(&models)?.models, model_index)?;
            let corpora = Corpora {
                ttt: HistoricalCorpus::from_file(&corpus)?,
                fff: fff_corpus.map(HistoricalCorpus::from_file).transpose()?,
            };
            let experiment = Experiment {
                years: years_or_all(years),
                num_trials: trials,
                num_batches: batches,
                output_root: output,
                base_seed: seed,
                show_progress: !no_progress,
            };
            let written = experiment.run(&models, &corpora)?;
            info!("done: {} score files under {}", written, experiment.output_root.display());
        }
        Command::Summarize { models, trials, batches, years, output, summaries } => {
            let models = ModelsFile::from_file(&models)?.models;
            let files = summarize_experiment(&models, &years_or_all(years), &output, trials, batches, &summaries)?;
            info!("done: {} summaries under {}", files.len(), summaries.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
