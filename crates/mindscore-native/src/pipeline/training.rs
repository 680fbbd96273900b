//! Fit, persist and register a model

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mindscore_core::protocol::ModelReference;
use mindscore_core::types::ModelInfo;

use crate::error::ServiceResult;
use crate::ml::dataset::TrainingSet;
use crate::ml::model::{ModelKind, TrainedModel};
use crate::store::{ChecksumSystem, ModelCache, ModelRegistry, RegisteredModel, StoreError};

/// What a successful training run hands back to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainOutput {
    /// `"<path>,<checksum>"` of the stored artifact
    pub model_path: ModelReference,
    /// Unique model name
    pub model_name: String,
    /// Kind that was trained
    pub kind: ModelKind,
}

/// Trains models and stores them where prediction can find them.
pub struct TrainingPipeline {
    checksum: ChecksumSystem,
    model_dir: PathBuf,
    cache: Arc<ModelCache<TrainedModel>>,
    registry: Arc<dyn ModelRegistry>,
}

impl TrainingPipeline {
    /// Pipeline writing artifacts below `model_dir`
    pub fn new(
        model_dir: impl Into<PathBuf>,
        cache: Arc<ModelCache<TrainedModel>>,
        registry: Arc<dyn ModelRegistry>,
    ) -> Self {
        Self {
            checksum: ChecksumSystem::new(),
            model_dir: model_dir.into(),
            cache,
            registry,
        }
    }

    /// Artifact directory
    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Fit a `kind` model on `set`, save it, cache it and register it.
    ///
    /// A failed fit surfaces as a training error; nothing is written.
    pub fn train(&self, info: &ModelInfo, kind: ModelKind, set: &TrainingSet) -> ServiceResult<TrainOutput> {
        debug!(info = %info, kind = %kind, windows = set.len(), "Training model");
        let model = TrainedModel::train(kind, set)?;

        let created_at = Utc::now();
        let model_name = unique_model_name(kind, info, &created_at.to_rfc3339_opts(SecondsFormat::Micros, true));

        let file_name = format!("{}.{}", kind, self.checksum.generate_random_filename(info));
        let dst = self.model_dir.join(file_name);
        let checksum = self.checksum.save_model(info, &model, &dst)?;
        let reference = ModelReference::new(&dst, checksum).map_err(StoreError::from)?;

        self.cache.insert(model, info.clone(), reference.checksum())?;
        self.registry.record(&RegisteredModel {
            info: info.clone(),
            kind,
            model_name: model_name.clone(),
            reference: reference.clone(),
            created_at,
        })?;

        info!(kind = %kind, model_path = %reference, "Model trained");
        Ok(TrainOutput {
            model_path: reference,
            model_name,
            kind,
        })
    }
}

/// Kind, identity fields, a timestamp and a random float, one per line.
fn unique_model_name(kind: ModelKind, info: &ModelInfo, timestamp: &str) -> String {
    let salt: f64 = rand::thread_rng().gen();
    [
        kind.name(),
        info.org_id.as_str(),
        info.user_id.as_str(),
        info.project_name.as_str(),
        info.name.as_str(),
        timestamp,
        &salt.to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mindscore_core::error::TrainingError;
    use mindscore_core::types::EegSegment;

    use crate::error::ServiceError;
    use crate::store::MemoryModelRegistry;

    fn info() -> ModelInfo {
        ModelInfo::new("session", "org", "user", "focus")
    }

    fn tone(freq: f64, secs: f64) -> EegSegment {
        let fs = 250.0;
        let n = (fs * secs) as usize;
        let row = |phase: f64| -> Vec<f64> {
            (0..n)
                .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / fs + phase).sin())
                .collect()
        };
        EegSegment::new(Utc::now() - Duration::seconds(60), fs, vec![row(0.0), row(0.3), row(0.7)]).unwrap()
    }

    fn set() -> TrainingSet {
        TrainingSet {
            sample_rate: 250.0,
            non_target: (0..4).map(|i| tone(18.0 + f64::from(i), 5.0)).collect(),
            target: (0..4).map(|i| tone(5.0 + f64::from(i) * 0.5, 5.0)).collect(),
        }
    }

    fn pipeline(dir: &Path) -> (TrainingPipeline, Arc<ModelCache<TrainedModel>>, Arc<MemoryModelRegistry>) {
        let cache = Arc::new(ModelCache::new());
        let registry = Arc::new(MemoryModelRegistry::new());
        let pipeline = TrainingPipeline::new(dir.join("models"), Arc::clone(&cache), registry.clone());
        (pipeline, cache, registry)
    }

    #[test]
    fn test_train_stores_caches_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache, registry) = pipeline(dir.path());

        let output = pipeline.train(&info(), ModelKind::Attention, &set()).unwrap();

        assert!(output.model_path.path().starts_with(dir.path().join("models")));
        assert!(output.model_path.path().file_name().unwrap().to_string_lossy().starts_with("attention."));
        assert!(cache.contains(output.model_path.checksum()));

        // The reference string is "<path>,<checksum>" and verifies
        let text = output.model_path.to_string();
        let parsed: ModelReference = text.parse().unwrap();
        ChecksumSystem::new().verify(&parsed).unwrap();

        let latest = registry.latest(&info(), ModelKind::Attention).unwrap().unwrap();
        assert_eq!(latest.model_name, output.model_name);
        assert_eq!(latest.reference, output.model_path);
    }

    #[test]
    fn test_model_names_are_unique_and_carry_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _, _) = pipeline(dir.path());

        let a = pipeline.train(&info(), ModelKind::Baseline, &set()).unwrap();
        let b = pipeline.train(&info(), ModelKind::Baseline, &set()).unwrap();

        assert_ne!(a.model_name, b.model_name);
        assert_ne!(a.model_path, b.model_path);

        let lines: Vec<_> = a.model_name.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(&lines[..5], ["baseline", "org", "user", "focus", "session"]);
    }

    #[test]
    fn test_failed_fit_is_a_training_error() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, cache, registry) = pipeline(dir.path());
        let empty = TrainingSet {
            sample_rate: 250.0,
            non_target: Vec::new(),
            target: Vec::new(),
        };

        let err = pipeline.train(&info(), ModelKind::Memory, &empty).unwrap_err();
        assert!(matches!(err, ServiceError::Training(TrainingError::ModelTraining { .. })));
        assert!(cache.is_empty());
        assert!(registry.list(&info()).unwrap().is_empty());
        assert!(!dir.path().join("models").exists());
    }
}
