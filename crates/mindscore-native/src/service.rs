//! Train and predict requests end to end
//!
//! [`MindscoreService`] owns the model cache, the registry, the data source
//! and the routing table. It is `Send + Sync`; share it with `Arc` and call
//! it from as many request threads as needed.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use mindscore_core::error::{KnownError, RequestError};
use mindscore_core::protocol::{ModelReference, Response};
use mindscore_core::types::{EegSegment, ModelInfo};

use crate::config::ServiceConfig;
use crate::dump::{DumpKind, DumpWriter};
use crate::error::{ServiceError, ServiceResult};
use crate::ml::dataset::{prediction_window, TrainingSet};
use crate::ml::model::{ModelKind, Prediction, TrainedModel};
use crate::pipeline::retry::{CancellationToken, RetryPolicy};
use crate::pipeline::training::{TrainOutput, TrainingPipeline};
use crate::selector::ModelSelector;
use crate::source::{EegDataSource, FileDataSource};
use crate::store::{
    CacheEntry, ChecksumSystem, ModelCache, ModelRegistry, RegisteredModel, SqliteModelRegistry, StoreError,
};

/// Identity fields every request must carry
pub const IDENTITY_KEYS: [&str; 4] = ["name", "org_id", "user_id", "project_name"];

/// Label field of predict requests
pub const LABEL_KEY: &str = "label_content";

/// A predict request: who is asking and which label to score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Caller identity
    #[serde(flatten)]
    pub info: ModelInfo,
    /// Label routed to a model kind
    pub label_content: String,
}

impl PredictRequest {
    /// Read a predict request out of a JSON body
    pub fn from_value(body: &Value) -> Result<Self, RequestError> {
        let obj = body.as_object().ok_or(RequestError::NotAnObject)?;
        Ok(Self {
            info: identity_from_object(obj)?,
            label_content: required_str(obj, LABEL_KEY)?,
        })
    }
}

/// Read the caller identity out of a JSON body
pub fn identity_from_value(body: &Value) -> Result<ModelInfo, RequestError> {
    identity_from_object(body.as_object().ok_or(RequestError::NotAnObject)?)
}

fn identity_from_object(obj: &Map<String, Value>) -> Result<ModelInfo, RequestError> {
    let [name, org_id, user_id, project_name] = IDENTITY_KEYS;
    Ok(ModelInfo::new(
        required_str(obj, name)?,
        required_str(obj, org_id)?,
        required_str(obj, user_id)?,
        required_str(obj, project_name)?,
    ))
}

fn required_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, RequestError> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(RequestError::MissingField { field })
}

/// The scoring backend.
pub struct MindscoreService {
    config: ServiceConfig,
    source: Arc<dyn EegDataSource>,
    registry: Arc<dyn ModelRegistry>,
    cache: Arc<ModelCache<TrainedModel>>,
    checksum: ChecksumSystem,
    selector: ModelSelector,
    pipeline: TrainingPipeline,
    retry: RetryPolicy,
    dumps: DumpWriter,
}

impl MindscoreService {
    /// Service over explicit collaborators
    pub fn new(config: ServiceConfig, source: Arc<dyn EegDataSource>, registry: Arc<dyn ModelRegistry>) -> Self {
        let cache = Arc::new(ModelCache::new());
        let pipeline = TrainingPipeline::new(config.model_dir(), Arc::clone(&cache), Arc::clone(&registry));

        Self {
            selector: ModelSelector::new(config.routes.clone()),
            retry: RetryPolicy::from(&config.retry),
            dumps: DumpWriter::new(config.dumps_dir()),
            checksum: ChecksumSystem::new(),
            config,
            source,
            registry,
            cache,
            pipeline,
        }
    }

    /// Service over the file data source and the SQLite registry named in `config`
    pub fn from_config(config: ServiceConfig) -> ServiceResult<Self> {
        let registry = SqliteModelRegistry::open(config.registry_path())?;
        let source = FileDataSource::new(&config.data.dir);
        info!(
            project_dir = %config.project.dir.display(),
            data_dir = %config.data.dir.display(),
            routes = config.routes.len(),
            "Service configured"
        );
        Ok(Self::new(config, Arc::new(source), Arc::new(registry)))
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Loaded models
    #[must_use]
    pub fn cache(&self) -> &ModelCache<TrainedModel> {
        &self.cache
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // ========================================================================
    // Training
    // ========================================================================

    /// Train every model kind routed for the caller's project.
    ///
    /// Kinds are trained independently; a failed kind is logged and dumped
    /// and the others still run. Succeeds if at least one kind trained,
    /// otherwise returns the first failure.
    pub fn train(&self, info: &ModelInfo) -> ServiceResult<Vec<TrainOutput>> {
        let routes = self.selector.training_routes(&info.project_name)?;
        let records = self.source.fetch_training(info)?;
        debug!(info = %info, records = records.len(), kinds = routes.len(), "Fetched training data");

        let mut trained = Vec::with_capacity(routes.len());
        let mut first_error = None;

        for route in routes {
            let result = TrainingSet::from_records(&records, &route.target_label, &self.config.signal)
                .map_err(ServiceError::from)
                .and_then(|set| self.pipeline.train(info, route.model, &set));

            match result {
                Ok(output) => trained.push(output),
                Err(e) => {
                    warn!(info = %info, kind = %route.model, error = %e, "Training failed");
                    self.dumps.write_logged(
                        DumpKind::Train,
                        &json!({
                            "query": info,
                            "model_kind": route.model,
                            "target_label": route.target_label,
                            "records": records.len(),
                            "error": e.to_string(),
                        }),
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if trained.is_empty() => Err(e),
            _ => Ok(trained),
        }
    }

    // ========================================================================
    // Prediction
    // ========================================================================

    /// Load a stored model into the cache, verifying its checksum.
    ///
    /// A checksum already cached is served from memory without touching the
    /// file.
    pub fn prepare_model(&self, reference: &ModelReference) -> ServiceResult<Arc<CacheEntry<TrainedModel>>> {
        if let Ok(entry) = self.cache.get(reference.checksum()) {
            return Ok(entry);
        }

        let (model, info, checksum) = self.checksum.read_reference::<TrainedModel>(reference)?;
        Ok(self.cache.insert(model, info, checksum)?)
    }

    /// Score `segment` with the cached model whose artifact hashes to `checksum`
    pub fn predict_with(&self, checksum: &str, segment: &EegSegment) -> ServiceResult<Prediction> {
        let entry = self.cache.get(checksum)?;
        Ok(entry.model.predict(segment)?)
    }

    /// Latest model of `kind` trained for `info`
    pub fn latest_model(&self, info: &ModelInfo, kind: ModelKind) -> ServiceResult<RegisteredModel> {
        self.registry.latest(info, kind)?.ok_or_else(|| {
            StoreError::NoModel {
                identity: info.to_string(),
                kind: kind.to_string(),
            }
            .into()
        })
    }

    /// Score the caller's freshest data with the latest model for the label.
    ///
    /// Fetch and inference repeat while the data is short or malformed, up
    /// to the retry policy's bound, until `token` is cancelled or `deadline`
    /// passes.
    pub fn predict(
        &self,
        request: &PredictRequest,
        token: &CancellationToken,
        deadline: Option<Instant>,
    ) -> ServiceResult<Prediction> {
        let info = &request.info;
        let kind = self.selector.prediction_kind(&info.project_name, &request.label_content)?;
        let latest = self.latest_model(info, kind)?;
        let entry = self.prepare_model(&latest.reference)?;

        let result = self.retry.run_with_deadline(token, deadline, |attempt| {
            let records = self.source.fetch_prediction(info)?;
            let window = prediction_window(&records, &self.config.signal)?;
            debug!(attempt, samples = window.sample_count(), "Scoring window");
            Ok::<_, ServiceError>(entry.model.predict(&window)?)
        });

        match result {
            Ok(prediction) => {
                info!(info = %info, kind = %kind, score = prediction.score, "Prediction made");
                Ok(prediction)
            }
            Err(e) => {
                let e = ServiceError::from(e);
                self.dumps.write_logged(
                    DumpKind::Predict,
                    &json!({
                        "body": request,
                        "model_name": latest.model_name,
                        "model_path": latest.reference,
                        "error": e.to_string(),
                    }),
                );
                Err(e)
            }
        }
    }

    // ========================================================================
    // Registry and integrity
    // ========================================================================

    /// Every model trained for `info`, oldest first
    pub fn models(&self, info: &ModelInfo) -> ServiceResult<Vec<RegisteredModel>> {
        Ok(self.registry.list(info)?)
    }

    /// Check that a stored artifact still matches its checksum
    pub fn verify(&self, reference: &ModelReference) -> ServiceResult<()> {
        Ok(self.checksum.verify(reference)?)
    }

    // ========================================================================
    // JSON boundary
    // ========================================================================

    /// Handle a JSON train request.
    ///
    /// On success the body is echoed with
    /// `models: [{model_path, model_name}]` added.
    pub fn handle_train(&self, body: &Value) -> Response<Value> {
        let outcome = identity_from_value(body)
            .map_err(ServiceError::from)
            .and_then(|info| self.train(&info));

        match outcome {
            Ok(outputs) => {
                let models: Vec<Value> = outputs
                    .iter()
                    .map(|o| json!({"model_path": o.model_path, "model_name": o.model_name}))
                    .collect();
                let mut reply = body.clone();
                if let Some(obj) = reply.as_object_mut() {
                    obj.insert("models".to_string(), Value::Array(models));
                }
                Response::success(reply)
            }
            Err(e) => failure("train", &e, body),
        }
    }

    /// Handle a JSON predict request.
    ///
    /// On success the body is echoed with `pred` added and `label_content`
    /// removed.
    pub fn handle_predict(&self, body: &Value, token: &CancellationToken, deadline: Option<Instant>) -> Response<Value> {
        let outcome = PredictRequest::from_value(body)
            .map_err(ServiceError::from)
            .and_then(|request| self.predict(&request, token, deadline));

        match outcome {
            Ok(prediction) => {
                let mut reply = body.clone();
                if let Some(obj) = reply.as_object_mut() {
                    obj.remove(LABEL_KEY);
                    obj.insert("pred".to_string(), json!(prediction));
                }
                Response::success(reply)
            }
            Err(e) => failure("predict", &e, body),
        }
    }
}

fn failure(operation: &str, err: &ServiceError, body: &Value) -> Response<Value> {
    error!(operation, error = %err, code = err.code(), "Request failed");
    Response::error(err, body.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use mindscore_core::error::{ErrorKind, PredictingError, TrainingError};

    use crate::config::Route;
    use crate::source::{DataFetchError, DataQuery, EegRecord};
    use crate::store::MemoryModelRegistry;

    const FS: f64 = 250.0;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    /// Three channels of `freq` Hz with a weaker 10 Hz component
    fn record(start: i64, secs: usize, freq: f64, label: Option<&str>) -> EegRecord {
        let n = secs * FS as usize;
        let row = |phase: f64| -> Vec<f64> {
            (0..n)
                .map(|i| {
                    let t = i as f64 / FS;
                    (2.0 * std::f64::consts::PI * freq * t + phase).sin()
                        + 0.3 * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
                })
                .collect()
        };
        EegRecord {
            created_at: at(start),
            sample_rate: FS,
            data: vec![row(0.0), row(0.4), row(0.9)],
            label: label.map(str::to_string),
        }
    }

    /// Serves fixed training data and a queue of prediction batches; the
    /// last batch repeats once the queue drains.
    struct FakeSource {
        training: Vec<EegRecord>,
        prediction: Mutex<VecDeque<Vec<EegRecord>>>,
        prediction_calls: Mutex<u32>,
    }

    impl FakeSource {
        fn new(prediction: Vec<Vec<EegRecord>>) -> Self {
            Self {
                training: vec![
                    record(0, 20, 6.0, Some("focused")),
                    record(20, 20, 20.0, Some("rest")),
                ],
                prediction: Mutex::new(prediction.into()),
                prediction_calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.prediction_calls.lock().unwrap()
        }
    }

    impl EegDataSource for FakeSource {
        fn fetch_training(&self, _query: &DataQuery) -> Result<Vec<EegRecord>, DataFetchError> {
            Ok(self.training.clone())
        }

        fn fetch_prediction(&self, _query: &DataQuery) -> Result<Vec<EegRecord>, DataFetchError> {
            *self.prediction_calls.lock().unwrap() += 1;
            let mut queue = self.prediction.lock().unwrap();
            match queue.len() {
                0 => Err(DataFetchError::Unavailable("no data".into())),
                1 => Ok(queue[0].clone()),
                _ => Ok(queue.pop_front().unwrap_or_default()),
            }
        }
    }

    fn route(label: &str, model: ModelKind, target_label: &str) -> Route {
        Route {
            project_name: "focus".to_string(),
            label: label.to_string(),
            model,
            target_label: target_label.to_string(),
        }
    }

    fn config(dir: &std::path::Path) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.project.dir = dir.to_path_buf();
        config.retry.max_attempts = 5;
        config.retry.backoff_ms = 1;
        config.routes = vec![
            route("attention", ModelKind::Attention, "focused"),
            route("memory", ModelKind::Memory, "focused"),
        ];
        config
    }

    fn service(dir: &std::path::Path, source: Arc<FakeSource>) -> MindscoreService {
        MindscoreService::new(config(dir), source, Arc::new(MemoryModelRegistry::new()))
    }

    fn identity() -> Value {
        json!({"name": "session", "org_id": "org", "user_id": "user", "project_name": "focus"})
    }

    fn predict_body(label: &str) -> Value {
        let mut body = identity();
        body["label_content"] = json!(label);
        body
    }

    fn dump_count(dir: &std::path::Path) -> usize {
        let Ok(days) = std::fs::read_dir(dir.join("dumps")) else {
            return 0;
        };
        days.map(|d| std::fs::read_dir(d.unwrap().path()).unwrap().count()).sum()
    }

    #[test]
    fn test_train_then_predict() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(vec![vec![record(100, 6, 6.0, None)]]));
        let service = service(dir.path(), Arc::clone(&source));

        let body = match service.handle_train(&identity()) {
            Response::Success { body } => body,
            other => panic!("training failed: {other:?}"),
        };
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(body["org_id"], "org");

        let reference: ModelReference = models[0]["model_path"].as_str().unwrap().parse().unwrap();
        service.verify(&reference).unwrap();

        let body = match service.handle_predict(&predict_body("attention"), &CancellationToken::new(), None) {
            Response::Success { body } => body,
            other => panic!("prediction failed: {other:?}"),
        };
        assert!(body.get("label_content").is_none());
        let score = body["pred"]["pred_score"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&score));
        assert_eq!(body["pred"]["model_kind"], "attention");
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_predict_retries_until_enough_data() {
        let dir = tempfile::tempdir().unwrap();
        let short = vec![record(100, 2, 6.0, None)];
        let enough = vec![record(100, 2, 6.0, None), record(102, 4, 6.0, None)];
        let source = Arc::new(FakeSource::new(vec![short.clone(), short, enough]));
        let service = service(dir.path(), Arc::clone(&source));
        service.train(&identity_from_value(&identity()).unwrap()).unwrap();

        let request = PredictRequest::from_value(&predict_body("memory")).unwrap();
        let prediction = service.predict(&request, &CancellationToken::new(), None).unwrap();

        assert_eq!(prediction.model_kind, ModelKind::Memory);
        assert_eq!(source.calls(), 3);
    }

    #[test]
    fn test_predict_gives_up_after_bound() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(vec![vec![record(100, 1, 6.0, None)]]));
        let service = service(dir.path(), Arc::clone(&source));
        service.train(&identity_from_value(&identity()).unwrap()).unwrap();

        let response = service.handle_predict(&predict_body("attention"), &CancellationToken::new(), None);
        let Response::Error { code, body, .. } = response else {
            panic!("expected an error");
        };
        assert_eq!(code, 1515);
        assert_eq!(body["label_content"], "attention");
        assert_eq!(source.calls(), 5);
        assert_eq!(dump_count(dir.path()), 1);
    }

    #[test]
    fn test_fetch_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(Vec::new()));
        let service = service(dir.path(), Arc::clone(&source));
        service.train(&identity_from_value(&identity()).unwrap()).unwrap();

        let request = PredictRequest::from_value(&predict_body("attention")).unwrap();
        let err = service.predict(&request, &CancellationToken::new(), None).unwrap_err();
        assert!(matches!(err, ServiceError::DataFetch(_)));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_cancelled_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(vec![vec![record(100, 1, 6.0, None)]]));
        let service = service(dir.path(), source).with_retry(RetryPolicy::new(100, Duration::from_secs(60)));
        service.train(&identity_from_value(&identity()).unwrap()).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let request = PredictRequest::from_value(&predict_body("attention")).unwrap();
        let err = service.predict(&request, &token, None).unwrap_err();
        assert!(matches!(err, ServiceError::Predicting(PredictingError::Cancelled)));
    }

    #[test]
    fn test_predict_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(FakeSource::new(Vec::new())));

        let request = PredictRequest::from_value(&predict_body("attention")).unwrap();
        let err = service.predict(&request, &CancellationToken::new(), None).unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::NoModel { .. })));
        assert_eq!(err.code(), 1316);
    }

    #[test]
    fn test_routing_errors() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(FakeSource::new(Vec::new())));

        let response = service.handle_predict(&predict_body("sleep"), &CancellationToken::new(), None);
        assert!(matches!(response, Response::Error { code: 1511, .. }));

        let mut body = identity();
        body["project_name"] = json!("unknown");
        assert!(matches!(service.handle_train(&body), Response::Error { code: 1416, .. }));
    }

    #[test]
    fn test_missing_fields_are_request_errors() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(FakeSource::new(Vec::new())));

        let response = service.handle_train(&json!({"name": "session", "org_id": "org"}));
        let Response::Error { code, detail, .. } = response else {
            panic!("expected an error");
        };
        assert_eq!(code, 400);
        assert!(detail.contains("user_id"));

        assert!(matches!(
            service.handle_predict(&identity(), &CancellationToken::new(), None),
            Response::Error { code: 400, .. }
        ));
        assert!(matches!(service.handle_train(&json!([1, 2])), Response::Error { code: 400, .. }));
    }

    #[test]
    fn test_partial_training_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.routes[1].target_label = "never-recorded".to_string();
        let service = MindscoreService::new(
            config,
            Arc::new(FakeSource::new(Vec::new())),
            Arc::new(MemoryModelRegistry::new()),
        );

        let outputs = service.train(&identity_from_value(&identity()).unwrap()).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].kind, ModelKind::Attention);
        assert_eq!(dump_count(dir.path()), 1);
    }

    #[test]
    fn test_all_training_failures_return_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        for route in &mut config.routes {
            route.target_label = "never-recorded".to_string();
        }
        let service = MindscoreService::new(
            config,
            Arc::new(FakeSource::new(Vec::new())),
            Arc::new(MemoryModelRegistry::new()),
        );

        let err = service.train(&identity_from_value(&identity()).unwrap()).unwrap_err();
        assert!(matches!(err, ServiceError::Training(TrainingError::Label { .. })));
        assert_eq!(dump_count(dir.path()), 2);
    }

    #[test]
    fn test_prepare_model_reads_once_then_serves_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(FakeSource::new(Vec::new())));
        let info = identity_from_value(&identity()).unwrap();
        let outputs = service.train(&info).unwrap();
        let reference = &outputs[0].model_path;

        // A fresh service has an empty cache and must read the file
        let fresh = MindscoreService::new(
            config(dir.path()),
            Arc::new(FakeSource::new(Vec::new())),
            Arc::new(MemoryModelRegistry::new()),
        );
        assert!(fresh.cache().is_empty());
        let entry = fresh.prepare_model(reference).unwrap();
        assert_eq!(entry.info, info);
        assert!(fresh.cache().contains(reference.checksum()));

        let segment = record(0, 5, 6.0, None).to_segment().unwrap();
        let prediction = fresh.predict_with(reference.checksum(), &segment).unwrap();
        assert!((0.0..=100.0).contains(&prediction.score));

        let missing = "0".repeat(64);
        assert!(matches!(
            fresh.predict_with(&missing, &segment),
            Err(ServiceError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_tampered_artifact_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), Arc::new(FakeSource::new(Vec::new())));
        let outputs = service.train(&identity_from_value(&identity()).unwrap()).unwrap();
        let reference = &outputs[0].model_path;

        std::fs::write(reference.path(), b"{\"model\": {}}").unwrap();

        let fresh = MindscoreService::new(
            config(dir.path()),
            Arc::new(FakeSource::new(Vec::new())),
            Arc::new(MemoryModelRegistry::new()),
        );
        assert!(matches!(
            fresh.prepare_model(reference),
            Err(ServiceError::Store(StoreError::ChecksumMismatch { .. }))
        ));
        assert_eq!(fresh.verify(reference).unwrap_err().kind(), ErrorKind::ModelLoading);
    }
}
