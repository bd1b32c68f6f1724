use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use storage::backend::{
    BackendError, CompletionList, DocumentKey, DocumentResolver, GenerateQuizResponse,
    ProgressBackend, StudyPlan, SubmitQuizRequest, SubmitQuizResponse, TopicCompletion,
};
use study_core::model::SubjectContext;

use crate::config::EngineConfig;

/// `ProgressBackend` over the study REST API.
#[derive(Clone)]
pub struct HttpProgressBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpProgressBackend {
    #[must_use]
    pub fn new(base_url: &Url, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// `None` when no backend url is configured.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        config
            .api_base_url
            .as_ref()
            .map(|url| Self::new(url, config.api_token.clone()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;
        decode(check_status(response)?).await
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    BackendError::Network(error.to_string())
}

fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized,
        StatusCode::NOT_FOUND => BackendError::NotFound(response.url().path().to_string()),
        other => BackendError::Status(other.as_u16()),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response.json().await.map_err(|error| {
        if error.is_decode() {
            BackendError::Serialization(error.to_string())
        } else {
            transport_error(error)
        }
    })
}

fn subject_query(subject: &SubjectContext) -> [(&'static str, String); 3] {
    [
        ("subject", subject.name().to_string()),
        ("year", subject.year().to_string()),
        ("semester", subject.semester().to_string()),
    ]
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateQuizRequest<'a> {
    document_key: &'a DocumentKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentLookup {
    document_key: Option<DocumentKey>,
}

#[async_trait]
impl ProgressBackend for HttpProgressBackend {
    async fn completion(&self, subject: &SubjectContext) -> Result<CompletionList, BackendError> {
        let request = self
            .client
            .get(self.url("completion"))
            .query(&subject_query(subject));
        self.send(request).await
    }

    async fn topic_completion(
        &self,
        subject: &SubjectContext,
        unit: &str,
        topic: &str,
    ) -> Result<TopicCompletion, BackendError> {
        let request = self.client.get(self.url("topic-completion")).query(&[
            ("subject", subject.name()),
            ("unit", unit),
            ("topic", topic),
        ]);
        self.send(request).await
    }

    async fn generate_quiz(
        &self,
        document: &DocumentKey,
    ) -> Result<GenerateQuizResponse, BackendError> {
        let request = self
            .client
            .post(self.url("quizzes/generate"))
            .json(&GenerateQuizRequest {
                document_key: document,
            });
        self.send(request).await
    }

    async fn submit_quiz_score(
        &self,
        request: &SubmitQuizRequest,
    ) -> Result<SubmitQuizResponse, BackendError> {
        let http = self.client.post(self.url("quizzes/submit")).json(request);
        self.send(http).await
    }

    async fn study_plan(&self, date: NaiveDate) -> Result<StudyPlan, BackendError> {
        let request = self
            .client
            .get(self.url("study-plan"))
            .query(&[("date", date.format("%Y-%m-%d").to_string())]);
        self.send(request).await
    }
}

#[async_trait]
impl DocumentResolver for HttpProgressBackend {
    async fn resolve_document(
        &self,
        subject: &SubjectContext,
        unit: &str,
        topic: &str,
    ) -> Result<Option<DocumentKey>, BackendError> {
        let request = self.client.get(self.url("documents")).query(&[
            ("subject", subject.name().to_string()),
            ("term", subject.term_code()),
            ("unit", unit.to_string()),
            ("topic", topic.to_string()),
        ]);
        match self.send::<DocumentLookup>(request).await {
            Ok(lookup) => Ok(lookup.document_key),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_urls_without_double_slashes() {
        let base = Url::parse("https://study.example.com/api/").unwrap();
        let backend = HttpProgressBackend::new(&base, None);
        assert_eq!(
            backend.url("completion"),
            "https://study.example.com/api/completion"
        );
    }

    #[test]
    fn from_config_requires_base_url() {
        assert!(HttpProgressBackend::from_config(&EngineConfig::default()).is_none());

        let config = EngineConfig {
            api_base_url: Some(Url::parse("http://localhost:9000").unwrap()),
            api_token: Some("t".into()),
            ..EngineConfig::default()
        };
        let backend = HttpProgressBackend::from_config(&config).unwrap();
        assert_eq!(backend.url("study-plan"), "http://localhost:9000/study-plan");
    }

    #[test]
    fn subject_query_carries_term() {
        let subject = SubjectContext::new("Algebra", 2, 1).unwrap();
        let query = subject_query(&subject);
        assert_eq!(query[0], ("subject", "Algebra".to_string()));
        assert_eq!(query[1], ("year", "2".to_string()));
        assert_eq!(query[2], ("semester", "1".to_string()));
    }

}
