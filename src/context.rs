// Everything a trial needs that only depends on the (model, year) pair: per-bit MLE
// probabilities, the pattern tables built from earlier tournaments and the optional
// Round-1 calibration table. Built once per batch and shared read-only by every worker.

use fnv::FnvHashMap;
use log::{debug, info, warn};
use rand::RngCore;

use crate::bracket::{is_first_round_bit, NUM_BITS, REGION_BITS};
use crate::config::{BitPerturbation, EndModel, ModelConfig};
use crate::error::{Result, SimError};
use crate::ingest::HistoricalCorpus;
use crate::patterns::{PatternCatalogue, PatternSpec, PatternTables};

pub type AnnealingTable = [f64; 8];

/// Round-1 win probabilities per game slot, fit by simulated annealing.
const BUILTIN_ANNEALING: [(&str, AnnealingTable); 9] = [
    ("25_1985", [1.0, 0.4229103348680731, 0.8686253918935398, 1.0, 0.8123704992250859, 1.0, 0.7077991428824237, 1.0]),
    ("26_1985", [1.0, 0.426407803982116, 0.8185896601561352, 1.0, 0.7023989582786588, 1.0, 0.6732989797077819, 1.0]),
    ("27_1985", [1.0, 0.40952672906312887, 0.7854648378949232, 1.0, 0.7606474009097475, 1.0, 0.6539118110780404, 1.0]),
    ("28_1985", [1.0, 0.47544408691902595, 0.7559601878920554, 0.9487586660088168, 0.7109945653089622, 1.0, 0.6877373278227099, 1.0]),
    ("30_1985", [1.0, 0.6897381544845143, 0.6574444680210119, 0.9879908588573346, 0.6011024159891302, 0.9211618267386112, 0.8727621098790732, 1.0]),
    ("31_1985", [0.9926470588235294, 0.5, 0.6544117647058824, 0.7941176470588235, 0.625, 0.8455882352941176, 0.5069725126093771, 0.9411764705882353]),
    ("29_2002", [1.0, 0.7294731173878907, 0.6258223531539129, 0.9164091224773702, 0.5715239568648995, 1.0, 0.7069538395226441, 1.0]),
    ("28_2002", [1.0, 0.6810812994722260, 0.6782287991306060, 1.0, 0.6065824706992460, 0.9954042914277010, 0.6102388677298300, 1.0]),
    ("30_2002", [1.0, 0.7074624431810751, 0.7470166821001302, 1.0, 0.5968548284479815, 0.9691087987086129, 0.8588856269144272, 1.0]),
];

/// Named Round-1 calibration tables.
#[derive(Debug, Clone)]
pub struct AnnealingTables {
    tables: FnvHashMap<String, AnnealingTable>,
}

impl Default for AnnealingTables {
    fn default() -> Self {
        let tables = BUILTIN_ANNEALING.iter().map(|(name, t)| (name.to_string(), *t)).collect();
        AnnealingTables { tables }
    }
}

impl AnnealingTables {
    pub fn insert(&mut self, name: &str, table: AnnealingTable) {
        self.tables.insert(name.to_string(), table);
    }

    pub fn get(&self, name: &str) -> Result<AnnealingTable> {
        self.tables
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownAnnealingModel(name.to_string()))
    }
}

/// A configured pattern together with its tables for the target year.
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub spec: PatternSpec,
    pub tables: PatternTables,
}

#[derive(Debug, Clone)]
pub struct ModelContext {
    pub model: ModelConfig,
    pub year: u32,
    mle: [f64; NUM_BITS],
    annealing: Option<AnnealingTable>,
    bit_perturbation: Option<BitPerturbation>,
    pub non_regional_paths: Vec<PatternGroup>,
    pub non_regional_triplets: Vec<PatternGroup>,
    pub paths: Vec<PatternGroup>,
    pub triplets: Vec<PatternGroup>,
    /// Championship triplet, present for the end models that anchor the title game.
    pub ncg: Option<PatternGroup>,
}

fn build_group(catalogue: &PatternCatalogue, corpus: &HistoricalCorpus, year: u32, name: &str) -> Result<PatternGroup> {
    let spec = catalogue.get(name)?.clone();
    let rows = if spec.section.is_regional() {
        corpus.regional_rows(year)
    } else {
        corpus.full_rows(year)
    };
    let tables = PatternTables::build(&spec, &rows);
    if tables.unconditional.is_fallback() {
        warn!("{}: no brackets before {} to estimate from, sampling uniformly", name, year);
    } else {
        debug!(
            "{}: {} combinations from {} rows",
            name,
            tables.unconditional.outcomes().len(),
            tables.unconditional.support()
        );
    }
    Ok(PatternGroup { spec, tables })
}

fn build_groups(catalogue: &PatternCatalogue, corpus: &HistoricalCorpus, year: u32, names: &[String]) -> Result<Vec<PatternGroup>> {
    names.iter().map(|name| build_group(catalogue, corpus, year, name)).collect()
}

impl ModelContext {
    pub fn build(model: &ModelConfig, corpus: &HistoricalCorpus, year: u32) -> Result<ModelContext> {
        ModelContext::build_with_annealing(model, corpus, year, &AnnealingTables::default())
    }

    pub fn build_with_annealing(
        model: &ModelConfig,
        corpus: &HistoricalCorpus,
        year: u32,
        annealing_tables: &AnnealingTables,
    ) -> Result<ModelContext> {
        let catalogue = model.validate()?;
        let annealing = match &model.annealing_model {
            Some(name) => Some(annealing_tables.get(name)?),
            None => None,
        };
        let ncg = match model.end_model {
            Some(EndModel::Ncg) | Some(EndModel::Combined) | Some(EndModel::NcgE8) => {
                Some(build_group(&catalogue, corpus, year, "NCG")?)
            }
            _ => None,
        };
        let context = ModelContext {
            model: model.clone(),
            year,
            mle: corpus.mle_probabilities(year),
            annealing,
            bit_perturbation: model.bit_perturbation(),
            non_regional_paths: build_groups(&catalogue, corpus, year, &model.non_regional_paths)?,
            non_regional_triplets: build_groups(&catalogue, corpus, year, &model.non_regional_triplets)?,
            paths: build_groups(&catalogue, corpus, year, &model.paths)?,
            triplets: build_groups(&catalogue, corpus, year, &model.triplets)?,
            ncg,
        };
        info!(
            "{} {}: context ready ({} pattern groups)",
            model.model_name,
            year,
            context.non_regional_paths.len() + context.non_regional_triplets.len() + context.paths.len() + context.triplets.len()
        );
        Ok(context)
    }

    pub fn mle(&self, bit: usize) -> f64 {
        self.mle[bit]
    }

    /// Win probability for `bit`: the calibration table for Round-1 games when one is
    /// configured, otherwise the MLE estimate with the model's perturbation applied.
    pub fn p(&self, bit: usize, rng: &mut dyn RngCore) -> f64 {
        if let Some(table) = &self.annealing {
            if is_first_round_bit(bit) {
                return table[bit % REGION_BITS];
            }
        }
        match &self.bit_perturbation {
            Some(perturbation) => perturbation.apply(self.mle[bit], rng),
            None => self.mle[bit],
        }
    }
}
