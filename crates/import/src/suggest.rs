use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clean::{clean, format_name};
use crate::util::similarity_ratio;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("No training examples")]
    Empty,
    #[error("Inconsistent model: {0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SuggestionSource {
    Exact,
    Fuzzy { score: f64 },
    Classifier { probability: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub name: String,
    pub source: SuggestionSource,
}

/// Something that can propose a clean name for raw bank text. Absent
/// suggesters leave the deterministic cleaner in charge.
pub trait NameSuggester: Send + Sync {
    fn suggest(&self, raw_name: &str) -> Option<Suggestion>;
}

/// Suggested name if any, else the cleaner's output.
pub fn predict(raw_name: &str, suggester: Option<&dyn NameSuggester>) -> String {
    match suggester.and_then(|s| s.suggest(raw_name)) {
        Some(suggestion) => format_name(&suggestion.name),
        None => clean(raw_name).name,
    }
}

// ── Trained model ────────────────────────────────────────────────────────────

const NGRAM_RANGE: (usize, usize) = (2, 4);
const SMOOTHING: f64 = 0.1;

/// Immutable name-model artifact, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedNameModel {
    /// Lowercased raw name to clean name.
    reference: BTreeMap<String, String>,
    vectorizer: NgramVectorizer,
    classifier: NaiveBayes,
}

impl TrainedNameModel {
    pub fn train(pairs: &[(String, String)]) -> Result<Self, ModelError> {
        let pairs: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(raw, clean)| (raw.trim(), clean.trim()))
            .filter(|(raw, clean)| !raw.is_empty() && !clean.is_empty())
            .collect();
        if pairs.is_empty() {
            return Err(ModelError::Empty);
        }

        let reference: BTreeMap<String, String> = pairs
            .iter()
            .map(|(raw, clean)| (raw.to_lowercase(), clean.to_string()))
            .collect();

        let raws: Vec<&str> = pairs.iter().map(|(raw, _)| *raw).collect();
        let vectorizer = NgramVectorizer::fit(&raws);
        let samples: Vec<(SparseVec, &str)> = pairs
            .iter()
            .map(|(raw, clean)| (vectorizer.transform(raw), *clean))
            .collect();
        let classifier = NaiveBayes::fit(&samples, vectorizer.len());

        tracing::info!(
            "Trained name model: {} examples, {} classes, {} features",
            pairs.len(),
            classifier.classes.len(),
            vectorizer.len()
        );
        Ok(Self {
            reference,
            vectorizer,
            classifier,
        })
    }

    /// Reads `raw_name,clean_name` rows.
    pub fn read_training_pairs<R: Read>(data: R) -> Result<Vec<(String, String)>, ModelError> {
        let mut reader = csv::Reader::from_reader(data);
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ModelError::MissingColumn(name.to_string()))
        };
        let (raw, clean) = (position("raw_name")?, position("clean_name")?);

        let mut pairs = Vec::new();
        for record in reader.records() {
            let record = record?;
            pairs.push((
                record.get(raw).unwrap_or_default().to_string(),
                record.get(clean).unwrap_or_default().to_string(),
            ));
        }
        Ok(pairs)
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let text = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.reference.is_empty() {
            return Err(ModelError::Inconsistent("empty reference dictionary".into()));
        }
        let features = self.vectorizer.len();
        if features != self.vectorizer.vocabulary.len() {
            return Err(ModelError::Inconsistent("idf and vocabulary sizes differ".into()));
        }
        if let Some((gram, idx)) = self.vectorizer.vocabulary.iter().find(|(_, idx)| **idx >= features) {
            return Err(ModelError::Inconsistent(format!(
                "n-gram {gram:?} points at feature {idx} of {features}"
            )));
        }
        if !all_finite(&self.vectorizer.idf) {
            return Err(ModelError::Inconsistent("non-finite idf weight".into()));
        }
        let classes = self.classifier.classes.len();
        if classes == 0
            || self.classifier.log_prior.len() != classes
            || self.classifier.feature_log_prob.len() != classes
            || self
                .classifier
                .feature_log_prob
                .iter()
                .any(|row| row.len() != features)
        {
            return Err(ModelError::Inconsistent("classifier shape does not match vectorizer".into()));
        }
        if !all_finite(&self.classifier.log_prior)
            || !self.classifier.feature_log_prob.iter().all(|row| all_finite(row))
        {
            return Err(ModelError::Inconsistent("non-finite classifier weight".into()));
        }
        Ok(())
    }

    pub fn exact(&self, raw_name: &str) -> Option<&str> {
        self.reference.get(&raw_name.trim().to_lowercase()).map(String::as_str)
    }

    /// Closest reference key and its score.
    pub fn nearest(&self, raw_name: &str) -> Option<(&str, f64)> {
        let query = raw_name.trim().to_lowercase();
        let mut best: Option<(&str, f64)> = None;
        for (key, clean) in &self.reference {
            let score = similarity_ratio(&query, key);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((clean.as_str(), score));
            }
        }
        best
    }

    /// Most probable class and its probability.
    pub fn classify(&self, raw_name: &str) -> Option<(&str, f64)> {
        self.classifier.predict(&self.vectorizer.transform(raw_name))
    }
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// A trained model paired with its acceptance thresholds.
pub struct ModelSuggester {
    model: TrainedNameModel,
    min_confidence: f64,
    fuzzy_threshold: f64,
}

impl ModelSuggester {
    pub fn new(model: TrainedNameModel, min_confidence: f64, fuzzy_threshold: f64) -> Self {
        Self {
            model,
            min_confidence,
            fuzzy_threshold,
        }
    }
}

impl NameSuggester for ModelSuggester {
    /// Exact lookup, then fuzzy key match, then the classifier.
    fn suggest(&self, raw_name: &str) -> Option<Suggestion> {
        if raw_name.trim().is_empty() {
            return None;
        }
        if let Some(name) = self.model.exact(raw_name) {
            return Some(Suggestion {
                name: name.to_string(),
                source: SuggestionSource::Exact,
            });
        }
        if let Some((name, score)) = self.model.nearest(raw_name) {
            if score >= self.fuzzy_threshold {
                return Some(Suggestion {
                    name: name.to_string(),
                    source: SuggestionSource::Fuzzy { score },
                });
            }
        }
        let (name, probability) = self.model.classify(raw_name)?;
        (probability >= self.min_confidence).then(|| Suggestion {
            name: name.to_string(),
            source: SuggestionSource::Classifier { probability },
        })
    }
}

// ── Character n-gram TF-IDF ──────────────────────────────────────────────────

type SparseVec = Vec<(usize, f64)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NgramVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl NgramVectorizer {
    fn fit(docs: &[&str]) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();

        for doc in docs {
            let unique: BTreeSet<String> = ngrams(doc).into_iter().collect();
            for gram in unique {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(gram).or_insert(next);
                if idx == doc_freq.len() {
                    doc_freq.push(0);
                }
                doc_freq[idx] += 1;
            }
        }

        let n = docs.len() as f64;
        let idf: Vec<f64> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
        Self { vocabulary, idf }
    }

    fn len(&self) -> usize {
        self.idf.len()
    }

    /// L2-normalised tf-idf weights of the known n-grams in `text`.
    fn transform(&self, text: &str) -> SparseVec {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for gram in ngrams(text) {
            if let Some(&idx) = self.vocabulary.get(&gram) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let weighted: SparseVec = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Vec::new();
        }
        weighted.into_iter().map(|(idx, w)| (idx, w / norm)).collect()
    }
}

/// Character n-grams of each lowercased word padded with one space each side.
fn ngrams(text: &str) -> Vec<String> {
    let (lo, hi) = NGRAM_RANGE;
    let mut grams = Vec::new();
    for word in text.to_lowercase().split_whitespace() {
        let padded: Vec<char> = format!(" {word} ").chars().collect();
        for n in lo..=hi {
            if padded.len() < n {
                continue;
            }
            grams.extend(padded.windows(n).map(|w| w.iter().collect::<String>()));
        }
    }
    grams
}

// ── Multinomial naive Bayes ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NaiveBayes {
    classes: Vec<String>,
    log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
}

impl NaiveBayes {
    fn fit(samples: &[(SparseVec, &str)], n_features: usize) -> Self {
        let classes: Vec<String> = samples
            .iter()
            .map(|(_, label)| label.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let class_index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut feature_counts = vec![vec![0.0; n_features]; classes.len()];
        let mut class_counts = vec![0usize; classes.len()];
        for (x, label) in samples {
            let c = class_index[label];
            class_counts[c] += 1;
            for &(idx, w) in x {
                feature_counts[c][idx] += w;
            }
        }

        let total = samples.len() as f64;
        let log_prior: Vec<f64> = class_counts.iter().map(|&n| (n as f64 / total).ln()).collect();
        let feature_log_prob: Vec<Vec<f64>> = feature_counts
            .into_iter()
            .map(|counts| {
                let denom = counts.iter().sum::<f64>() + SMOOTHING * n_features as f64;
                counts
                    .into_iter()
                    .map(|c| ((c + SMOOTHING) / denom).ln())
                    .collect::<Vec<f64>>()
            })
            .collect();

        Self {
            classes,
            log_prior,
            feature_log_prob,
        }
    }

    fn predict(&self, x: &[(usize, f64)]) -> Option<(&str, f64)> {
        let joint: Vec<f64> = self
            .log_prior
            .iter()
            .zip(&self.feature_log_prob)
            .map(|(prior, flp)| prior + x.iter().map(|&(idx, w)| w * flp[idx]).sum::<f64>())
            .collect();

        let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return None;
        }
        let exp: Vec<f64> = joint.iter().map(|j| (j - max).exp()).collect();
        let sum: f64 = exp.iter().sum();

        let mut best = 0;
        for (i, e) in exp.iter().enumerate() {
            if *e > exp[best] {
                best = i;
            }
        }
        Some((self.classes[best].as_str(), exp[best] / sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<(String, String)> {
        [
            ("ACME TRADING SDN BHD INV 22", "ACME TRADING SDN BHD"),
            ("ACME TRDG SB", "ACME TRADING SDN BHD"),
            ("acme trading", "ACME TRADING SDN BHD"),
            ("ZEN INTERIOR DESIGN", "ZEN INTERIOR SDN BHD"),
            ("ZEN INTERIOR", "ZEN INTERIOR SDN BHD"),
            ("BRIGHT SOLUTIONS PTE", "BRIGHT SOLUTIONS PTE LTD"),
            ("BRIGHT SOL", "BRIGHT SOLUTIONS PTE LTD"),
            ("MERLION HOME", "MERLION HOME DECOR"),
            ("MERLION HOME DECO", "MERLION HOME DECOR"),
        ]
        .iter()
        .map(|(r, c)| (r.to_string(), c.to_string()))
        .collect()
    }

    fn suggester(fuzzy: f64) -> ModelSuggester {
        ModelSuggester::new(TrainedNameModel::train(&pairs()).unwrap(), 0.5, fuzzy)
    }

    #[test]
    fn exact_lookup_is_case_insensitive() {
        let s = suggester(0.85).suggest("Acme Trading").unwrap();
        assert_eq!(s.name, "ACME TRADING SDN BHD");
        assert_eq!(s.source, SuggestionSource::Exact);
    }

    #[test]
    fn fuzzy_key_match() {
        let s = suggester(0.85).suggest("ZEN INTERIOR DESIGNS").unwrap();
        assert_eq!(s.name, "ZEN INTERIOR SDN BHD");
        assert!(matches!(s.source, SuggestionSource::Fuzzy { score } if score >= 0.85));
    }

    #[test]
    fn classifier_handles_unseen_variant() {
        let s = suggester(1.1).suggest("ACME TRADNG").unwrap();
        assert_eq!(s.name, "ACME TRADING SDN BHD");
        assert!(matches!(s.source, SuggestionSource::Classifier { probability } if probability >= 0.5));
    }

    #[test]
    fn low_confidence_yields_nothing() {
        assert_eq!(suggester(1.1).suggest("QWERTY XYZ"), None);
        assert_eq!(suggester(0.85).suggest("   "), None);
    }

    #[test]
    fn predict_without_model_uses_cleaner() {
        assert_eq!(predict("12345 acme trading S/B", None), "ACME TRADING SDN BHD");
    }

    #[test]
    fn predict_formats_suggestion() {
        let s = suggester(0.85);
        assert_eq!(predict("acme trdg sb", Some(&s)), "ACME TRADING SDN BHD");
        assert_eq!(predict("QWERTY XYZ 2024", Some(&suggester(1.1))), "QWERTY XYZ");
    }

    #[test]
    fn empty_training_set() {
        assert!(matches!(TrainedNameModel::train(&[]), Err(ModelError::Empty)));
        let blanks = vec![(" ".to_string(), "X".to_string())];
        assert!(matches!(TrainedNameModel::train(&blanks), Err(ModelError::Empty)));
    }

    #[test]
    fn training_csv_columns() {
        let data = "raw_name,clean_name\nACME TRDG SB,ACME TRADING SDN BHD\n";
        let pairs = TrainedNameModel::read_training_pairs(data.as_bytes()).unwrap();
        assert_eq!(pairs, vec![("ACME TRDG SB".to_string(), "ACME TRADING SDN BHD".to_string())]);

        let err = TrainedNameModel::read_training_pairs("raw,clean\na,b\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ModelError::MissingColumn(c) if c == "raw_name"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name_model.json");
        let model = TrainedNameModel::train(&pairs()).unwrap();
        model.save(&path).unwrap();

        let loaded = TrainedNameModel::load(&path).unwrap();
        assert_eq!(loaded.exact("zen interior"), Some("ZEN INTERIOR SDN BHD"));
        assert_eq!(
            loaded.classify("ACME TRADNG").map(|(c, _)| c),
            model.classify("ACME TRADNG").map(|(c, _)| c)
        );
    }

    #[test]
    fn corrupt_or_missing_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(TrainedNameModel::load(&path), Err(ModelError::Json(_))));
        assert!(matches!(
            TrainedNameModel::load(&dir.path().join("absent.json")),
            Err(ModelError::Io(_))
        ));
    }

    fn write_model(dir: &Path, json: &str) -> std::path::PathBuf {
        let path = dir.join("name_model.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn model_with_out_of_range_feature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            r#"{"reference": {"acme": "ACME"},
                "vectorizer": {"vocabulary": {" a": 7}, "idf": [1.0]},
                "classifier": {"classes": ["ACME"], "log_prior": [0.0], "feature_log_prob": [[-1.0]]}}"#,
        );
        assert!(matches!(TrainedNameModel::load(&path), Err(ModelError::Inconsistent(_))));
    }

    #[test]
    fn model_with_short_class_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            r#"{"reference": {"acme": "ACME"},
                "vectorizer": {"vocabulary": {" a": 0, "a ": 1}, "idf": [1.0, 1.0]},
                "classifier": {"classes": ["ACME"], "log_prior": [0.0], "feature_log_prob": [[-1.0]]}}"#,
        );
        assert!(matches!(TrainedNameModel::load(&path), Err(ModelError::Inconsistent(_))));
    }

    #[test]
    fn model_with_non_finite_weights_is_rejected() {
        let mut model = TrainedNameModel::train(&pairs()).unwrap();
        model.vectorizer.idf[0] = f64::NAN;
        assert!(matches!(model.validate(), Err(ModelError::Inconsistent(_))));

        let mut model = TrainedNameModel::train(&pairs()).unwrap();
        model.classifier.feature_log_prob[0][0] = f64::INFINITY;
        assert!(matches!(model.validate(), Err(ModelError::Inconsistent(_))));

        let mut model = TrainedNameModel::train(&pairs()).unwrap();
        model.classifier.log_prior[0] = f64::NEG_INFINITY;
        assert!(matches!(model.validate(), Err(ModelError::Inconsistent(_))));
    }

    #[test]
    fn valid_hand_written_model_suggests() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_model(
            dir.path(),
            r#"{"reference": {"acme": "ACME"},
                "vectorizer": {"vocabulary": {" a": 0}, "idf": [1.0]},
                "classifier": {"classes": ["ACME"], "log_prior": [0.0], "feature_log_prob": [[-1.0]]}}"#,
        );
        let model = TrainedNameModel::load(&path).unwrap();
        let s = ModelSuggester::new(model, 0.5, 1.1).suggest("a zzz").unwrap();
        assert_eq!(s.name, "ACME");
    }

    #[test]
    fn ngrams_pad_each_word() {
        let grams = ngrams("Ab C");
        assert!(grams.contains(&" a".to_string()));
        assert!(grams.contains(&" ab ".to_string()));
        assert!(grams.contains(&" c ".to_string()));
        assert!(!grams.iter().any(|g| g.contains("b c")));
    }
}
