use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::label::{partition_by_type, partition_by_visibility};
use crate::models::{Label, LabelDraft};
use crate::pagination::Paginator;
use crate::resources::labels;
use crate::safe::safe_call;
use crate::transport::{dispatch, Connector};

struct CachedLabels {
    fetched_at: Instant,
    labels: Vec<Label>,
}

pub struct LabelService {
    connector: Arc<dyn Connector>,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedLabels>>,
}

impl LabelService {
    /// `cache_ttl` of zero disables the label list cache
    pub fn new(connector: Arc<dyn Connector>, cache_ttl: Duration) -> Self {
        Self {
            connector,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn list(&self) -> Result<Vec<Label>> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if !self.cache_ttl.is_zero() && cached.fetched_at.elapsed() < self.cache_ttl {
                debug!(count = cached.labels.len(), "Serving labels from cache");
                return Ok(cached.labels.clone());
            }
        }

        let response = dispatch(self.connector.as_ref(), labels::list(), &labels::collection()).await?;
        let fetched = parse_labels(&response)?;
        debug!(count = fetched.len(), "Fetched labels");

        if !self.cache_ttl.is_zero() {
            *cache = Some(CachedLabels {
                fetched_at: Instant::now(),
                labels: fetched.clone(),
            });
        }
        Ok(fetched)
    }

    pub async fn get(&self, id: &str) -> Result<Label> {
        let response = dispatch(self.connector.as_ref(), labels::get(id), &labels::target(id)).await?;
        Label::from_api_response(&response)
    }

    pub async fn create(&self, draft: &LabelDraft) -> Result<Label> {
        let response =
            dispatch(self.connector.as_ref(), labels::create(draft), &labels::collection()).await?;
        self.invalidate_cache().await;

        let label = Label::from_api_response(&response)?;
        info!(label_id = %label.id, name = %label.name, "Created label");
        Ok(label)
    }

    pub async fn update(&self, id: &str, draft: &LabelDraft) -> Result<Label> {
        let response =
            dispatch(self.connector.as_ref(), labels::update(id, draft), &labels::target(id)).await?;
        self.invalidate_cache().await;
        Label::from_api_response(&response)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        dispatch(self.connector.as_ref(), labels::delete(id), &labels::target(id)).await?;
        self.invalidate_cache().await;
        info!(label_id = %id, "Deleted label");
        Ok(())
    }

    /// Case-insensitive lookup by display name
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Label>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|label| label.name.eq_ignore_ascii_case(name)))
    }

    pub async fn visible_labels(&self) -> Result<Vec<Label>> {
        Ok(partition_by_visibility(&self.list().await?).0)
    }

    pub async fn hidden_labels(&self) -> Result<Vec<Label>> {
        Ok(partition_by_visibility(&self.list().await?).1)
    }

    pub async fn system_labels(&self) -> Result<Vec<Label>> {
        Ok(partition_by_type(&self.list().await?).0)
    }

    pub async fn user_labels(&self) -> Result<Vec<Label>> {
        Ok(partition_by_type(&self.list().await?).1)
    }

    /// The labels endpoint returns everything in one page, but walking it
    /// through a paginator keeps callers uniform with messages
    pub fn paginate(&self) -> Paginator<Label> {
        Paginator::new(
            self.connector.clone(),
            labels::list(),
            labels::collection(),
            "labels",
            u32::MAX,
            Label::from_api_response,
        )
    }

    pub async fn invalidate_cache(&self) {
        *self.cache.lock().await = None;
    }

    pub async fn safe_list(&self) -> Vec<Label> {
        safe_call("list_labels", Vec::new(), self.list()).await
    }

    pub async fn safe_get(&self, id: &str) -> Option<Label> {
        safe_call("get_label", None, async { self.get(id).await.map(Some) }).await
    }

    pub async fn safe_find_by_name(&self, name: &str) -> Option<Label> {
        safe_call("find_label", None, self.find_by_name(name)).await
    }
}

fn parse_labels(response: &Value) -> Result<Vec<Label>> {
    response
        .get("labels")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Label::from_api_response).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use crate::transport::{ApiResponse, MockConnector, Method};
    use serde_json::json;

    fn labels_body() -> Value {
        json!({"labels": [
            {"id": "INBOX", "name": "INBOX", "type": "system"},
            {"id": "Label_1", "name": "Receipts", "type": "user", "labelListVisibility": "labelShow"},
            {"id": "Label_2", "name": "Old", "type": "user", "labelListVisibility": "labelHide"}
        ]})
    }

    #[tokio::test]
    async fn test_list_is_cached_within_ttl() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));

        let service = LabelService::new(Arc::new(connector), Duration::from_secs(300));
        assert_eq!(service.list().await.unwrap().len(), 3);
        assert_eq!(service.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .times(2)
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));

        let service = LabelService::new(Arc::new(connector), Duration::ZERO);
        service.list().await.unwrap();
        service.list().await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_invalidate_cache() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .withf(|r| r.method == Method::Get)
            .times(2)
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));
        connector
            .expect_send()
            .withf(|r| r.method == Method::Post)
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, json!({"id": "Label_9", "name": "New", "type": "user"}))));

        let service = LabelService::new(Arc::new(connector), Duration::from_secs(300));
        service.list().await.unwrap();
        let created = service.create(&LabelDraft::new("New")).await.unwrap();
        assert_eq!(created.id, "Label_9");
        service.list().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_by_name_is_case_insensitive() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));

        let service = LabelService::new(Arc::new(connector), Duration::from_secs(300));
        let found = service.find_by_name("receipts").await.unwrap().unwrap();
        assert_eq!(found.id, "Label_1");
        assert!(service.find_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partitions() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));

        let service = LabelService::new(Arc::new(connector), Duration::from_secs(300));
        assert_eq!(service.visible_labels().await.unwrap().len(), 2);
        let hidden = service.hidden_labels().await.unwrap();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].label_list_visibility, Some(Visibility::Hide));
        assert_eq!(service.system_labels().await.unwrap().len(), 1);
        assert_eq!(service.user_labels().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_safe_list_is_idempotent() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));

        let service = LabelService::new(Arc::new(connector), Duration::ZERO);
        assert_eq!(service.safe_list().await, service.safe_list().await);
    }

    #[tokio::test]
    async fn test_safe_get_missing_is_none() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .returning(|_| Ok(ApiResponse::new(404, json!({}))));

        let service = LabelService::new(Arc::new(connector), Duration::ZERO);
        assert!(service.safe_get("Label_404").await.is_none());
    }

    #[tokio::test]
    async fn test_paginate_single_page() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, labels_body())));

        let service = LabelService::new(Arc::new(connector), Duration::ZERO);
        let mut pages = service.paginate();
        assert_eq!(pages.all_pages().await.unwrap().len(), 3);
        assert!(!pages.has_more_pages());
    }
}
