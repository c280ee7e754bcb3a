//! Job card list and maintenance calls.

use reqwest::Method;
use serde::Deserialize;
use tracing::info;

use crate::api::ApiClient;
use crate::error::{AppError, AppResult};
use crate::models::{JobCard, JobCardStatus, Priority};
use crate::submission::JOB_CARDS_PATH;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobCardFilter {
    #[serde(default)]
    pub status: Option<JobCardStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, alias = "q", alias = "query")]
    pub search: Option<String>,
}

impl JobCardFilter {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(status) = self.status {
            params.push(("status", status.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            params.push(("priority", priority.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        params
    }

    /// Same filter applied to an already fetched list.
    pub fn matches(&self, card: &JobCard) -> bool {
        if self.status.is_some_and(|s| s != card.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != card.priority) {
            return false;
        }
        let Some(needle) = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        else {
            return true;
        };
        [
            Some(card.customer.name.as_str()),
            Some(card.customer.mobile.as_str()),
            Some(card.vehicle.name.as_str()),
            Some(card.vehicle.plate_number.as_str()),
            card.number.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

pub async fn list(api: &ApiClient, filter: &JobCardFilter) -> AppResult<Vec<JobCard>> {
    api.get(JOB_CARDS_PATH, &filter.query_params()).await
}

pub async fn get(api: &ApiClient, id: &str) -> AppResult<JobCard> {
    api.get(&job_card_path(id)?, &[]).await
}

pub async fn delete(api: &ApiClient, id: &str) -> AppResult<()> {
    api.delete(&job_card_path(id)?).await?;
    info!(job_card_id = %id, "job card deleted");
    Ok(())
}

pub async fn update_status(api: &ApiClient, id: &str, status: JobCardStatus) -> AppResult<()> {
    let path = format!("{}/status", job_card_path(id)?);
    api.send_json(
        Method::PATCH,
        &path,
        &serde_json::json!({ "status": status.as_str() }),
    )
    .await?;
    info!(job_card_id = %id, status = status.as_str(), "job card status updated");
    Ok(())
}

fn job_card_path(id: &str) -> AppResult<String> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') {
        return Err(AppError::validation("Invalid job card id"));
    }
    Ok(format!("{JOB_CARDS_PATH}/{id}"))
}
