// Loads the historical tournament results that every probability table is estimated from.
// Supports the brackets JSON file ({"brackets": [{"bracket": {"year": .., "fullvector": ".."}}]})
// and a plain csv file with `year,vector` records.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use crate::bracket::{Bracket, NUM_BITS, REGIONAL_BITS, REGION_BITS};
use crate::error::{Result, SimError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YearField {
    Number(u32),
    Text(String),
}

impl YearField {
    fn parse(&self) -> Result<u32> {
        match self {
            YearField::Number(y) => Ok(*y),
            YearField::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| SimError::Corpus(format!("invalid year {:?}", s))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BracketEntry {
    year: YearField,
    fullvector: String,
}

#[derive(Debug, Deserialize)]
struct BracketWrapper {
    bracket: BracketEntry,
}

#[derive(Debug, Deserialize)]
struct BracketsFile {
    brackets: Vec<BracketWrapper>,
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    year: u32,
    vector: String,
}

/// Observed tournament outcomes keyed by year. Vectors are 63 bits, or 60 when only the
/// regional rounds were recorded.
#[derive(Debug, Clone, Default)]
pub struct HistoricalCorpus {
    brackets: BTreeMap<u32, Vec<bool>>,
}

fn parse_vector(year: u32, s: &str) -> Result<Vec<bool>> {
    let s = s.trim();
    if s.len() != NUM_BITS && s.len() != REGIONAL_BITS {
        return Err(SimError::Corpus(format!(
            "{}: vector must have {} or {} characters, got {}",
            year,
            NUM_BITS,
            REGIONAL_BITS,
            s.len()
        )));
    }
    s.chars()
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(SimError::Corpus(format!("{}: invalid character {:?}", year, other))),
        })
        .collect()
}

impl HistoricalCorpus {
    pub fn from_entries<I, S>(entries: I) -> Result<HistoricalCorpus>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: AsRef<str>,
    {
        let mut brackets = BTreeMap::new();
        for (year, vector) in entries {
            brackets.insert(year, parse_vector(year, vector.as_ref())?);
        }
        Ok(HistoricalCorpus { brackets })
    }

    pub fn from_json_str(data: &str) -> Result<HistoricalCorpus> {
        let file: BracketsFile = serde_json::from_str(data)?;
        let mut entries = Vec::with_capacity(file.brackets.len());
        for wrapper in file.brackets {
            entries.push((wrapper.bracket.year.parse()?, wrapper.bracket.fullvector));
        }
        HistoricalCorpus::from_entries(entries)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<HistoricalCorpus> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut entries = Vec::new();
        for result in rdr.deserialize() {
            let record: CsvRecord = result?;
            entries.push((record.year, record.vector));
        }
        HistoricalCorpus::from_entries(entries)
    }

    /// Picks the parser from the file extension (`.csv`, anything else is JSON).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<HistoricalCorpus> {
        let path = path.as_ref();
        let corpus = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => HistoricalCorpus::from_csv_reader(fs::File::open(path)?)?,
            _ => HistoricalCorpus::from_json_str(&fs::read_to_string(path)?)?,
        };
        info!("loaded {} historical brackets from {}", corpus.len(), path.display());
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.brackets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.is_empty()
    }

    pub fn years(&self) -> impl Iterator<Item = u32> + '_ {
        self.brackets.keys().copied()
    }

    /// The complete result of `year`, used as ground truth when scoring.
    pub fn actual(&self, year: u32) -> Result<Bracket> {
        let bits = self
            .brackets
            .get(&year)
            .ok_or_else(|| SimError::Corpus(format!("no actual bracket for {}", year)))?;
        if bits.len() != NUM_BITS {
            return Err(SimError::Corpus(format!("actual bracket for {} is missing the Final Four", year)));
        }
        let mut full = [false; NUM_BITS];
        full.copy_from_slice(bits);
        Ok(Bracket::from_bits(full))
    }

    fn before(&self, year: u32) -> impl Iterator<Item = &Vec<bool>> + '_ {
        self.brackets.range(..year).map(|(_, v)| v)
    }

    /// Every region of every bracket strictly before `year`, as 15-bit rows.
    pub fn regional_rows(&self, year: u32) -> Vec<&[bool]> {
        self.before(year)
            .flat_map(|v| v[..REGIONAL_BITS].chunks(REGION_BITS))
            .collect()
    }

    /// Complete 63-bit brackets strictly before `year`.
    pub fn full_rows(&self, year: u32) -> Vec<&[bool]> {
        self.before(year)
            .filter(|v| v.len() == NUM_BITS)
            .map(|v| v.as_slice())
            .collect()
    }

    /// Per-bit frequency of 1s over brackets strictly before `year`.
    /// A position nothing was observed for gets 0.5.
    pub fn mle_probabilities(&self, year: u32) -> [f64; NUM_BITS] {
        let mut ones = [0usize; NUM_BITS];
        let mut seen = [0usize; NUM_BITS];
        for v in self.before(year) {
            for (i, &bit) in v.iter().enumerate() {
                seen[i] += 1;
                ones[i] += bit as usize;
            }
        }
        let mut probs = [0.5; NUM_BITS];
        for i in 0..NUM_BITS {
            if seen[i] > 0 {
                probs[i] = ones[i] as f64 / seen[i] as f64;
            }
        }
        debug!("MLE probabilities for {} from {} brackets", year, self.before(year).count());
        probs
    }
}
