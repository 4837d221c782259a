// Model configuration for the bracket generator
// Models are read from the models file ({"models": [...]}) in JSON or YAML

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::bracket::Format;
use crate::error::{Result, SimError};
use crate::patterns::{PatternCatalogue, PatternSection, PatternSpec};
use crate::sampling::SeedPerturbation;

/// Anchor-fixing strategy applied before pattern resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndModel {
    /// Champion and runner-up
    #[serde(rename = "NCG")]
    Ncg,
    /// One Final Four seed per region, "together" distribution
    #[serde(rename = "F4_A")]
    F4A,
    /// One Final Four seed per region, "split" distribution
    #[serde(rename = "F4_B")]
    F4B,
    /// Two Elite Eight seeds per region
    #[serde(rename = "E8")]
    E8,
    /// NCG, then split Final Four seeds for the remaining regions
    #[serde(rename = "combined")]
    Combined,
    /// NCG plus Final Four and Elite Eight seeds for every region
    #[serde(rename = "NCG_E8")]
    NcgE8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerturbationType {
    /// p + U(-m, m)
    Fixed,
    /// U((1-m)p, (1+m)p)
    #[default]
    #[serde(other)]
    Scaled,
}

/// A number fuzzes the per-bit probabilities, an object fuzzes the anchor seed distributions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Perturbation {
    Magnitude(f64),
    Seeds(SeedPerturbation),
}

/// Fuzz applied to every per-bit probability draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitPerturbation {
    pub magnitude: f64,
    pub kind: PerturbationType,
}

impl BitPerturbation {
    pub fn apply(&self, p: f64, rng: &mut dyn RngCore) -> f64 {
        let u = rng.gen::<f64>();
        let perturbed = match self.kind {
            PerturbationType::Fixed => p + (2.0 * u - 1.0) * self.magnitude,
            PerturbationType::Scaled => {
                let low = (1.0 - self.magnitude) * p;
                let high = (1.0 + self.magnitude) * p;
                low + u * (high - low)
            }
        };
        perturbed.clamp(0.0, 1.0)
    }
}

/// Custom pattern definition from the `patterns` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDef {
    pub bits: Vec<usize>,
    pub section: PatternSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model_name: String,

    /// Engine the model was written for; only the conditional generator is run
    #[serde(default)]
    pub generator: Option<String>,

    /// Absent or null means no anchors
    #[serde(default)]
    pub end_model: Option<EndModel>,

    #[serde(default)]
    pub triplets: Vec<String>,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(rename = "non-regional-triplets", default)]
    pub non_regional_triplets: Vec<String>,

    #[serde(rename = "non-regional-paths", default)]
    pub non_regional_paths: Vec<String>,

    #[serde(default)]
    pub perturbation: Option<Perturbation>,

    #[serde(default)]
    pub perturbation_type: PerturbationType,

    /// Name of a Round-1 calibration table overriding the MLE probabilities
    #[serde(rename = "annealing_model", default)]
    pub annealing_model: Option<String>,

    #[serde(default)]
    pub format: Format,

    #[serde(default)]
    pub patterns: BTreeMap<String, PatternDef>,
}

pub const CONDITIONAL_GENERATOR: &str = "conditional_generator";

impl ModelConfig {
    pub fn named(name: &str) -> Self {
        ModelConfig {
            model_name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn runs_on_this_engine(&self) -> bool {
        match &self.generator {
            None => true,
            Some(g) => g == CONDITIONAL_GENERATOR,
        }
    }

    pub fn bit_perturbation(&self) -> Option<BitPerturbation> {
        match self.perturbation {
            Some(Perturbation::Magnitude(magnitude)) if magnitude != 0.0 => Some(BitPerturbation {
                magnitude,
                kind: self.perturbation_type,
            }),
            _ => None,
        }
    }

    pub fn seed_perturbation(&self) -> Option<SeedPerturbation> {
        match self.perturbation {
            Some(Perturbation::Seeds(p)) => Some(p),
            _ => None,
        }
    }

    /// Built-in patterns plus the model's own definitions.
    pub fn catalogue(&self) -> Result<PatternCatalogue> {
        let mut catalogue = PatternCatalogue::default();
        for (name, def) in &self.patterns {
            catalogue.insert(PatternSpec::new(name, &def.bits, def.section)?);
        }
        Ok(catalogue)
    }

    /// Checks every configured pattern exists and sits in a list of the right kind.
    pub fn validate(&self) -> Result<PatternCatalogue> {
        if self.end_model.is_some() && self.format == Format::FFF {
            return Err(SimError::Config(format!(
                "{}: end models need TTT orientation, got FFF",
                self.model_name
            )));
        }
        if let Some(Perturbation::Magnitude(m)) = self.perturbation {
            if !m.is_finite() || m < 0.0 {
                return Err(SimError::Config(format!("{}: invalid perturbation {}", self.model_name, m)));
            }
        }
        let catalogue = self.catalogue()?;
        let lists: [(&str, &Vec<String>, bool); 4] = [
            ("triplets", &self.triplets, true),
            ("paths", &self.paths, true),
            ("non-regional-triplets", &self.non_regional_triplets, false),
            ("non-regional-paths", &self.non_regional_paths, false),
        ];
        for (key, names, regional) in lists {
            for name in names {
                let spec = catalogue.get(name)?;
                if spec.section.is_regional() != regional {
                    return Err(SimError::Config(format!(
                        "{}: pattern {} listed under {} but defined as {:?}",
                        self.model_name, name, key, spec.section
                    )));
                }
            }
        }
        Ok(catalogue)
    }
}

/// Root of the models file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsFile {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ModelsFile {
    /// Load models from a JSON (`.json`) or YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SimError::Config(format!("models file not found: {}", path.display())));
        }
        let content = fs::read_to_string(path)?;
        let parsed: std::result::Result<ModelsFile, String> = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| SimError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::io::Write;

    #[test]
    fn test_parse_json_models() {
        let json = r#"{"models": [
            {"modelName": "Conditional_NCG", "generator": "conditional_generator", "endModel": "NCG",
             "triplets": ["E8_F4"], "non-regional-triplets": ["NCG"], "unknownKey": 3},
            {"modelName": "Plain"}
        ]}"#;
        let file: ModelsFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.models.len(), 2);
        let m = &file.models[0];
        assert_eq!(m.end_model, Some(EndModel::Ncg));
        assert_eq!(m.triplets, vec!["E8_F4".to_string()]);
        assert_eq!(m.non_regional_triplets, vec!["NCG".to_string()]);
        assert!(m.runs_on_this_engine());
        assert!(m.validate().is_ok());

        let plain = &file.models[1];
        assert_eq!(plain.end_model, None);
        assert_eq!(plain.format, Format::TTT);
        assert!(plain.paths.is_empty());
    }

    #[test]
    fn test_unknown_end_model_rejected() {
        let json = r#"{"models": [{"modelName": "x", "endModel": "Sweet16"}]}"#;
        assert!(serde_json::from_str::<ModelsFile>(json).is_err());
    }

    #[test]
    fn test_unknown_end_model_in_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"models": [{{"modelName": "x", "endModel": "F4_C"}}]}}"#).unwrap();
        assert!(matches!(ModelsFile::from_file(file.path()), Err(SimError::Config(_))));
    }

    #[test]
    fn test_broken_yaml_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "models:\n  - modelName: x\n    endModel: [unclosed").unwrap();
        assert!(matches!(ModelsFile::from_file(file.path()), Err(SimError::Config(_))));
    }

    #[test]
    fn test_parse_yaml_models() {
        let yaml = r#"
models:
  - modelName: fuzzy
    perturbation: 0.05
    perturbationType: fixed
    annealing_model: "25_1985"
    format: FFF
  - modelName: seeds
    endModel: F4_B
    perturbation:
      type: fixed
      percent: 0.02
"#;
        let file: ModelsFile = serde_yaml::from_str(yaml).unwrap();
        let fuzzy = &file.models[0];
        assert_eq!(
            fuzzy.bit_perturbation(),
            Some(BitPerturbation { magnitude: 0.05, kind: PerturbationType::Fixed })
        );
        assert_eq!(fuzzy.seed_perturbation(), None);
        assert_eq!(fuzzy.annealing_model.as_deref(), Some("25_1985"));
        assert_eq!(fuzzy.format, Format::FFF);

        let seeds = &file.models[1];
        assert_eq!(seeds.bit_perturbation(), None);
        assert_eq!(seeds.seed_perturbation().map(|p| p.percent), Some(0.02));
    }

    #[test]
    fn test_perturbation_type_defaults_to_scaled() {
        let m: ModelConfig = serde_json::from_str(r#"{"modelName": "m", "perturbation": 0.1, "perturbationType": "anything"}"#).unwrap();
        assert_eq!(m.bit_perturbation().map(|p| p.kind), Some(PerturbationType::Scaled));
    }

    #[test]
    fn test_bit_perturbation_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let fixed = BitPerturbation { magnitude: 0.1, kind: PerturbationType::Fixed };
        let scaled = BitPerturbation { magnitude: 0.1, kind: PerturbationType::Scaled };
        for _ in 0..1000 {
            let p = fixed.apply(0.5, &mut rng);
            assert!((0.4..=0.6).contains(&p));
            let p = scaled.apply(0.5, &mut rng);
            assert!((0.45..=0.55).contains(&p));
            assert!(fixed.apply(0.98, &mut rng) <= 1.0);
            assert!(fixed.apply(0.02, &mut rng) >= 0.0);
        }
    }

    #[test]
    fn test_validation() {
        let mut m = ModelConfig::named("bad");
        m.end_model = Some(EndModel::E8);
        m.format = Format::FFF;
        assert!(matches!(m.validate(), Err(SimError::Config(_))));

        let mut m = ModelConfig::named("misplaced");
        m.triplets = vec!["NCG".to_string()];
        assert!(matches!(m.validate(), Err(SimError::Config(_))));

        let mut m = ModelConfig::named("missing");
        m.paths = vec!["P_S42".to_string()];
        assert!(matches!(m.validate(), Err(SimError::UnknownPattern(_))));

        let mut m = ModelConfig::named("custom");
        m.patterns.insert(
            "MY_PATH".to_string(),
            PatternDef { bits: vec![0, 8, 12, 14], section: PatternSection::Paths },
        );
        assert!(matches!(m.validate(), Err(SimError::MalformedPattern { .. })));
        m.patterns.get_mut("MY_PATH").unwrap().bits = vec![1, 8, 14];
        m.paths = vec!["MY_PATH".to_string()];
        assert!(m.validate().is_ok());
    }

    #[test]
    fn test_foreign_generator_skipped() {
        let mut m = ModelConfig::named("bt");
        m.generator = Some("bradley_terry".to_string());
        assert!(!m.runs_on_this_engine());
    }
}
