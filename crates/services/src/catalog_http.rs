use std::env;

use async_trait::async_trait;
use exam_core::model::{Exam, ExamId, ExamResult, ExamSummary, ResultRecord, UserId};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use storage::repository::{ExamCatalog, ResultRepository, StorageError};

use crate::error::CatalogHttpError;

/// Where the exam API lives and how to authenticate against it.
#[derive(Clone, Debug)]
pub struct HttpCatalogConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl HttpCatalogConfig {
    /// Reads `EXAM_API_URL` and the optional `EXAM_API_TOKEN`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("EXAM_API_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        let token = env::var("EXAM_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Some(Self { base_url, token })
    }
}

/// REST-backed exam catalog and result store.
#[derive(Clone)]
pub struct HttpCatalog {
    client: Client,
    config: HttpCatalogConfig,
}

impl HttpCatalog {
    #[must_use]
    pub fn new(config: HttpCatalogConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        key: &str,
    ) -> Result<T, CatalogHttpError> {
        let response = checked(self.authorized(request).send().await?)?;
        let body: Value = response.json().await?;
        decode(body, key)
    }

    async fn fetch_results(&self, user: &UserId) -> Result<Vec<ExamResult>, CatalogHttpError> {
        let request = self
            .client
            .get(self.url("results"))
            .query(&[("userId", user.as_str())]);
        self.fetch(request, "results").await
    }
}

fn checked(response: Response) -> Result<Response, CatalogHttpError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(CatalogHttpError::HttpStatus(response.status()))
    }
}

/// Strips the response envelope: `{"data": ...}`, `{"<key>": ...}` or a bare payload.
pub(crate) fn unwrap_envelope(body: Value, key: &str) -> Value {
    let mut value = body;
    for field in ["data", key] {
        value = match value {
            Value::Object(mut map) if map.contains_key(field) => {
                map.remove(field).unwrap_or(Value::Null)
            }
            other => other,
        };
    }
    value
}

fn decode<T: DeserializeOwned>(body: Value, key: &str) -> Result<T, CatalogHttpError> {
    serde_json::from_value(unwrap_envelope(body, key))
        .map_err(|e| CatalogHttpError::Payload(e.to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultSubmission<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    result: ResultRecord,
}

#[async_trait]
impl ExamCatalog for HttpCatalog {
    async fn list_exams(&self) -> Result<Vec<ExamSummary>, StorageError> {
        let request = self.client.get(self.url("exams"));
        Ok(self.fetch(request, "exams").await?)
    }

    async fn get_exam(&self, id: &ExamId) -> Result<Exam, StorageError> {
        let request = self.client.get(self.url(&format!("exams/{id}")));
        Ok(self.fetch(request, "exam").await?)
    }
}

#[async_trait]
impl ResultRepository for HttpCatalog {
    async fn has_result(&self, user: &UserId, exam: &ExamId) -> Result<bool, StorageError> {
        let results = self.fetch_results(user).await?;
        Ok(results.iter().any(|result| result.exam_id() == exam))
    }

    async fn record_result(&self, user: &UserId, result: &ExamResult) -> Result<(), StorageError> {
        let payload = ResultSubmission {
            user_id: user.as_str(),
            result: result.to_record(),
        };
        let request = self.client.post(self.url("results")).json(&payload);
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(CatalogHttpError::from)?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            // Accept a retry of the attempt the server already holds.
            let existing = self.get_result(user, result.exam_id()).await?;
            return match existing {
                Some(stored) if stored.attempt_id() == result.attempt_id() => Ok(()),
                _ => Err(StorageError::Conflict),
            };
        }
        checked(response)?;
        Ok(())
    }

    async fn get_result(
        &self,
        user: &UserId,
        exam: &ExamId,
    ) -> Result<Option<ExamResult>, StorageError> {
        let results = self.fetch_results(user).await?;
        Ok(results.into_iter().find(|result| result.exam_id() == exam))
    }

    async fn list_results(&self, user: &UserId) -> Result<Vec<ExamResult>, StorageError> {
        let mut results = self.fetch_results(user).await?;
        results.sort_by(|a, b| b.submitted_at().cmp(&a.submitted_at()));
        Ok(results)
    }
}
