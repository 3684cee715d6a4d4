//! Saving and loading fitted models.
//!
//! Two encodings are supported, chosen per save with [`SerializationFormat`]
//! and recognised automatically on load.
//!
//! JSON files are a single document:
//!
//! ```json
//! { "format": "woods-model", "version": 1, "kind": "decision_tree", "model": { ... } }
//! ```
//!
//! Bincode files start with [`BINARY_MAGIC`], followed by the same header
//! fields and then the model, each encoded with `bincode`.
//!
//! `model` holds the hyperparameters and the fitted nodes. Floats are written
//! with enough digits (or raw bits) to read back the same value, so a loaded
//! model predicts exactly what the saved one did. Loading checks the header
//! first, then the model's shape (hyperparameters, feature indices, depth,
//! finite values) before handing it back.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ensemble::{DeepGradientBoosting, GradientBoosting};
use crate::error::{Result, WoodsError};
use crate::estimator::Regressor;
use crate::tree::{DecisionRule, DecisionTree};

pub const FORMAT_TAG: &str = "woods-model";
pub const FORMAT_VERSION: u32 = 1;

/// First bytes of a bincode model file.
pub const BINARY_MAGIC: &[u8; 8] = b"WOODSBIN";

/// Encoding of a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    #[default]
    Json,
    Bincode,
}

impl SerializationFormat {
    pub const ALL: [SerializationFormat; 2] =
        [SerializationFormat::Json, SerializationFormat::Bincode];

    pub fn as_str(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::Bincode => "bincode",
        }
    }

    /// Format of a file's contents: bincode when it starts with
    /// [`BINARY_MAGIC`], JSON otherwise.
    pub fn detect(bytes: &[u8]) -> SerializationFormat {
        if bytes.starts_with(BINARY_MAGIC) {
            SerializationFormat::Bincode
        } else {
            SerializationFormat::Json
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializationFormat {
    type Err = WoodsError;

    fn from_str(name: &str) -> Result<Self> {
        SerializationFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == name)
            .ok_or_else(|| {
                WoodsError::InvalidConfig(format!(
                    "unknown serialization format {name:?}, expected one of json, bincode"
                ))
            })
    }
}

/// Which model a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    DecisionRule,
    DecisionTree,
    GradientBoosting,
    DeepGradientBoosting,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::DecisionRule => "decision_rule",
            ModelKind::DecisionTree => "decision_tree",
            ModelKind::GradientBoosting => "gradient_boosting",
            ModelKind::DeepGradientBoosting => "deep_gradient_boosting",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<M> {
    format: String,
    version: u32,
    kind: ModelKind,
    model: M,
}

/// Envelope fields of a bincode file, stored ahead of the model.
#[derive(Serialize, Deserialize)]
struct Header {
    format: String,
    version: u32,
    kind: ModelKind,
}

impl Header {
    fn current(kind: ModelKind) -> Self {
        Header {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            kind,
        }
    }

    fn check(&self) -> Result<()> {
        if self.format != FORMAT_TAG {
            return Err(WoodsError::Format(format!(
                "unknown format tag {:?}",
                self.format
            )));
        }
        if self.version != FORMAT_VERSION {
            return Err(WoodsError::Format(format!(
                "unsupported version {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }
}

/// Undecoded model body of a file whose header has been checked.
enum Payload {
    Json(serde_json::Value),
    Bincode(Vec<u8>),
}

/// Save and load for fitted models.
pub trait Persist: Regressor + Serialize + DeserializeOwned + Sized {
    const KIND: ModelKind;

    /// Structural checks on a fitted model: valid hyperparameters, feature
    /// indices in range, depth within bounds and finite values.
    fn check(&self) -> Result<()>;

    /// Save as JSON.
    fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save_model_as(path, SerializationFormat::Json)
    }

    fn save_model_as<P: AsRef<Path>>(&self, path: P, format: SerializationFormat) -> Result<()> {
        let path = path.as_ref();
        if !self.is_fitted() {
            return Err(WoodsError::NotFitted);
        }
        self.check()?;

        let header = Header::current(Self::KIND);
        let mut writer = BufWriter::new(File::create(path)?);
        match format {
            SerializationFormat::Json => {
                let envelope = Envelope {
                    format: header.format,
                    version: header.version,
                    kind: header.kind,
                    model: self,
                };
                serde_json::to_writer(&mut writer, &envelope)?;
            }
            SerializationFormat::Bincode => {
                writer.write_all(BINARY_MAGIC)?;
                bincode::serialize_into(&mut writer, &header)?;
                bincode::serialize_into(&mut writer, self)?;
            }
        }
        writer.flush()?;
        info!(path = %path.display(), kind = %Self::KIND, %format, "saved model");
        Ok(())
    }

    /// Load a model saved in either format.
    fn load_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (kind, payload) = read_stored(path)?;
        if kind != Self::KIND {
            return Err(WoodsError::Format(format!(
                "file holds a {} model, expected {}",
                kind,
                Self::KIND
            )));
        }
        let model: Self = decode(payload)?;
        info!(path = %path.display(), kind = %Self::KIND, "loaded model");
        Ok(model)
    }
}

fn read_stored(path: &Path) -> Result<(ModelKind, Payload)> {
    let bytes = fs::read(path)?;
    match SerializationFormat::detect(&bytes) {
        SerializationFormat::Json => {
            let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&bytes)?;
            Header {
                format: envelope.format,
                version: envelope.version,
                kind: envelope.kind,
            }
            .check()?;
            Ok((envelope.kind, Payload::Json(envelope.model)))
        }
        SerializationFormat::Bincode => {
            let mut rest = &bytes[BINARY_MAGIC.len()..];
            let header: Header = bincode::deserialize_from(&mut rest)?;
            header.check()?;
            Ok((header.kind, Payload::Bincode(rest.to_vec())))
        }
    }
}

impl Persist for DecisionRule {
    const KIND: ModelKind = ModelKind::DecisionRule;

    fn check(&self) -> Result<()> {
        self.validate()
    }
}

impl Persist for DecisionTree {
    const KIND: ModelKind = ModelKind::DecisionTree;

    fn check(&self) -> Result<()> {
        self.validate()
    }
}

impl Persist for GradientBoosting {
    const KIND: ModelKind = ModelKind::GradientBoosting;

    fn check(&self) -> Result<()> {
        self.validate()
    }
}

impl Persist for DeepGradientBoosting {
    const KIND: ModelKind = ModelKind::DeepGradientBoosting;

    fn check(&self) -> Result<()> {
        self.validate()
    }
}

/// Any fitted model, as returned by [`load_any`].
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    DecisionRule(DecisionRule),
    DecisionTree(DecisionTree),
    GradientBoosting(GradientBoosting),
    DeepGradientBoosting(DeepGradientBoosting),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::DecisionRule(_) => ModelKind::DecisionRule,
            Model::DecisionTree(_) => ModelKind::DecisionTree,
            Model::GradientBoosting(_) => ModelKind::GradientBoosting,
            Model::DeepGradientBoosting(_) => ModelKind::DeepGradientBoosting,
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Model::DecisionRule(m) => m.predict(x),
            Model::DecisionTree(m) => m.predict(x),
            Model::GradientBoosting(m) => m.predict(x),
            Model::DeepGradientBoosting(m) => m.predict(x),
        }
    }

    pub fn n_features(&self) -> Option<usize> {
        match self {
            Model::DecisionRule(m) => m.n_features(),
            Model::DecisionTree(m) => m.n_features(),
            Model::GradientBoosting(m) => m.n_features(),
            Model::DeepGradientBoosting(m) => m.n_features(),
        }
    }
}

/// Typed model from the envelope payload. Invalid stored hyperparameters are
/// a property of the file, so they surface as format errors.
fn decode<M: Persist>(payload: Payload) -> Result<M> {
    let model: M = match payload {
        Payload::Json(value) => serde_json::from_value(value)?,
        Payload::Bincode(bytes) => bincode::deserialize(&bytes)?,
    };
    model.check().map_err(|err| match err {
        WoodsError::InvalidConfig(msg) => WoodsError::Format(msg),
        other => other,
    })?;
    Ok(model)
}

/// Load a model file without knowing its kind or format in advance.
pub fn load_any<P: AsRef<Path>>(path: P) -> Result<Model> {
    let path = path.as_ref();
    let (kind, payload) = read_stored(path)?;
    let model = match kind {
        ModelKind::DecisionRule => Model::DecisionRule(decode(payload)?),
        ModelKind::DecisionTree => Model::DecisionTree(decode(payload)?),
        ModelKind::GradientBoosting => Model::GradientBoosting(decode(payload)?),
        ModelKind::DeepGradientBoosting => Model::DeepGradientBoosting(decode(payload)?),
    };
    info!(path = %path.display(), kind = %model.kind(), "loaded model");
    Ok(model)
}
