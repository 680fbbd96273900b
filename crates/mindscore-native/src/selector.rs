//! Routing from project names and labels to model kinds

use mindscore_core::error::{PredictingError, TrainingError};

use crate::config::Route;
use crate::ml::model::ModelKind;

/// Looks up which models serve a project.
#[derive(Clone, Debug, Default)]
pub struct ModelSelector {
    routes: Vec<Route>,
}

impl ModelSelector {
    /// Selector over a routing table
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Routes to train for a project, first route per kind, in table order.
    pub fn training_routes(&self, project_name: &str) -> Result<Vec<&Route>, TrainingError> {
        let mut selected: Vec<&Route> = Vec::new();
        for route in self.routes.iter().filter(|r| r.project_name == project_name) {
            if !selected.iter().any(|r| r.model == route.model) {
                selected.push(route);
            }
        }

        if selected.is_empty() {
            return Err(TrainingError::ProjectName {
                project_name: project_name.to_string(),
            });
        }
        Ok(selected)
    }

    /// Route serving a predict request's label.
    pub fn prediction_route(&self, project_name: &str, label: &str) -> Result<&Route, PredictingError> {
        let mut project = self.routes.iter().filter(|r| r.project_name == project_name).peekable();
        if project.peek().is_none() {
            return Err(PredictingError::ProjectName {
                project_name: project_name.to_string(),
            });
        }

        project
            .find(|r| r.label == label)
            .ok_or_else(|| PredictingError::Label { label: label.to_string() })
    }

    /// Kind serving a predict request's label
    pub fn prediction_kind(&self, project_name: &str, label: &str) -> Result<ModelKind, PredictingError> {
        self.prediction_route(project_name, label).map(|r| r.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(project: &str, label: &str, model: ModelKind) -> Route {
        Route {
            project_name: project.to_string(),
            label: label.to_string(),
            model,
            target_label: "focused".to_string(),
        }
    }

    fn selector() -> ModelSelector {
        ModelSelector::new(vec![
            route("focus", "attention", ModelKind::Attention),
            route("focus", "memory", ModelKind::Memory),
            route("focus", "concentration", ModelKind::Attention),
            route("demo", "anything", ModelKind::Baseline),
        ])
    }

    #[test]
    fn test_training_routes_dedup_by_kind() {
        let selector = selector();
        let kinds: Vec<_> = selector.training_routes("focus").unwrap().iter().map(|r| r.model).collect();
        assert_eq!(kinds, [ModelKind::Attention, ModelKind::Memory]);

        assert!(matches!(
            selector.training_routes("sleep"),
            Err(TrainingError::ProjectName { .. })
        ));
    }

    #[test]
    fn test_prediction_lookup() {
        let selector = selector();
        assert_eq!(selector.prediction_kind("focus", "memory").unwrap(), ModelKind::Memory);
        assert_eq!(selector.prediction_kind("focus", "concentration").unwrap(), ModelKind::Attention);

        assert!(matches!(
            selector.prediction_kind("focus", "sleep"),
            Err(PredictingError::Label { .. })
        ));
        assert!(matches!(
            selector.prediction_kind("unknown", "memory"),
            Err(PredictingError::ProjectName { .. })
        ));
    }
}
