//! Model registry / promotion panel

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use super::FreshnessBands;
use crate::api::{AlertStatus, ApiClient, ModelRow, ModelsQuery, SeedStatus};
use crate::errors::Result;
use crate::poll::{classify, Freshness};

/// Result of one manual registry action, kept for the panel's toast area
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub action: String,
    pub model_id: String,
    pub ok: bool,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Serializable snapshot for the status server
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub has_model: bool,
    pub production: Option<ModelRow>,
    pub recent: Vec<ModelRow>,
    pub alert: Option<AlertStatus>,
    pub seed: Option<SeedStatus>,
    pub last_action: Option<ActionOutcome>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub freshness: Freshness,
}

/// Registry state plus the confirmation-gated manual actions.
///
/// Promote/rollback/delete are single-shot: no retry or backoff is applied;
/// a failure is surfaced and the operator retries by hand.
pub struct RegistryPanel {
    client: Arc<ApiClient>,
    query: ModelsQuery,
    has_model: bool,
    production: Option<ModelRow>,
    recent: Vec<ModelRow>,
    alert: Option<AlertStatus>,
    seed: Option<SeedStatus>,
    last_action: Option<ActionOutcome>,
    last_update: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl RegistryPanel {
    pub fn new(client: Arc<ApiClient>, query: ModelsQuery) -> Self {
        Self {
            client,
            query,
            has_model: false,
            production: None,
            recent: Vec::new(),
            alert: None,
            seed: None,
            last_action: None,
            last_update: None,
            last_error: None,
        }
    }

    /// Refresh summary, cooldown, and seed status. The three fetches are
    /// independent: one failing leaves the other two applied.
    pub async fn refresh(&mut self, now: DateTime<Utc>) {
        let mut errors: Vec<String> = Vec::new();

        match self.client.models_summary(&self.query).await {
            Ok(summary) => {
                self.has_model = summary.has_model;
                self.production = summary.production;
                self.recent = summary.recent;
                self.last_update = Some(now);
            }
            Err(e) => {
                warn!("models summary fetch failed: {}", e);
                errors.push(e.to_string());
            }
        }

        match self.client.promotion_alert_status().await {
            Ok(alert) => self.alert = Some(alert),
            Err(e) => {
                warn!("promotion alert status fetch failed: {}", e);
                errors.push(e.to_string());
            }
        }

        match self.client.seed_status().await {
            Ok(seed) => self.seed = Some(seed),
            Err(e) => {
                warn!("seed status fetch failed: {}", e);
                errors.push(e.to_string());
            }
        }

        self.last_error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };
    }

    /// Promote a candidate to production. Single attempt.
    pub async fn promote(&mut self, model_id: &str, now: DateTime<Utc>) -> Result<ActionOutcome> {
        let response = self.client.promote_model(model_id).await?;
        Ok(self.record_action("promote", model_id, response.succeeded(), response.reason, now))
    }

    /// Roll production back to the previous model. Single attempt.
    pub async fn rollback(&mut self, model_id: &str, now: DateTime<Utc>) -> Result<ActionOutcome> {
        let response = self.client.rollback_model(model_id).await?;
        Ok(self.record_action("rollback", model_id, response.succeeded(), response.reason, now))
    }

    /// Delete a registry entry. Single attempt.
    pub async fn delete(&mut self, model_id: &str, now: DateTime<Utc>) -> Result<ActionOutcome> {
        let response = self.client.delete_model(model_id).await?;
        Ok(self.record_action("delete", model_id, response.succeeded(), response.reason, now))
    }

    fn record_action(
        &mut self,
        action: &str,
        model_id: &str,
        ok: bool,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> ActionOutcome {
        if ok {
            info!("registry action {} on {} succeeded", action, model_id);
        } else {
            warn!(
                "registry action {} on {} refused: {}",
                action,
                model_id,
                reason.as_deref().unwrap_or("no reason given")
            );
        }

        let outcome = ActionOutcome {
            action: action.to_string(),
            model_id: model_id.to_string(),
            ok,
            reason,
            at,
        };
        self.last_action = Some(outcome.clone());
        outcome
    }

    pub fn status(&self, now: DateTime<Utc>, bands: FreshnessBands) -> RegistryStatus {
        RegistryStatus {
            has_model: self.has_model,
            production: self.production.clone(),
            recent: self.recent.clone(),
            alert: self.alert.clone(),
            seed: self.seed.clone(),
            last_action: self.last_action.clone(),
            last_update: self.last_update,
            last_error: self.last_error.clone(),
            freshness: classify(self.last_update, now, bands.fresh, bands.stale),
        }
    }
}
