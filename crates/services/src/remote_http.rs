use async_trait::async_trait;
use fitness_core::model::{OwnerId, WorkoutId};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use storage::record::WorkoutRecord;
use storage::remote::{RemoteError, RemoteStore};
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::FitnessServicesError;

/// JSON-over-HTTP remote store.
///
/// Workouts live at `{base}/users/{owner}/workouts/{id}`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    revision: Option<u64>,
}

impl HttpRemoteStore {
    /// Build a client from `FITNESS_REMOTE_*`. `Ok(None)` when no url is configured.
    ///
    /// # Errors
    ///
    /// Returns `FitnessServicesError` for an unusable url or client setup.
    pub fn from_env() -> Result<Option<Self>, FitnessServicesError> {
        RemoteConfig::from_env().map(Self::new).transpose()
    }

    /// # Errors
    ///
    /// Returns `FitnessServicesError::InvalidRemoteUrl` if the url cannot carry
    /// path segments and `FitnessServicesError::Http` if the client fails to build.
    pub fn new(config: RemoteConfig) -> Result<Self, FitnessServicesError> {
        let invalid = |reason: String| FitnessServicesError::InvalidRemoteUrl {
            url: config.base_url.clone(),
            reason,
        };
        let base_url = Url::parse(&config.base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a base url".into()));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url,
            token: config.token,
        })
    }

    fn workouts_url(&self, owner: &OwnerId, id: Option<WorkoutId>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["users", owner.as_str(), "workouts"]);
            if let Some(id) = id {
                segments.push(&id.to_string());
            }
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_workouts(&self, owner: &OwnerId) -> Result<Vec<WorkoutRecord>, RemoteError> {
        let url = self.workouts_url(owner, None);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response)?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Rejected(format!("invalid workout list: {e}")))
    }

    async fn put_workout(&self, record: &WorkoutRecord) -> Result<Option<u64>, RemoteError> {
        let url = self.workouts_url(&record.owner_id, Some(record.id));
        let response = self
            .authorize(self.client.put(url))
            .json(record)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response)?;
        let body = response.text().await.map_err(transport_error)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str::<PutResponse>(&body)
            .ok()
            .and_then(|r| r.revision))
    }

    async fn delete_workout(&self, owner: &OwnerId, id: WorkoutId) -> Result<(), RemoteError> {
        let url = self.workouts_url(owner, Some(id));
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(workout_id = %id, "remote delete of missing workout");
            return Ok(());
        }
        check_status(response).map(|_| ())
    }
}

fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(classify_status(status))
}

/// Map a failed HTTP status onto the retry taxonomy.
fn classify_status(status: StatusCode) -> RemoteError {
    let message = format!("HTTP {status}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Unreachable(message)
        }
        s if s.is_server_error() => RemoteError::Unreachable(message),
        _ => RemoteError::Rejected(message),
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store(base: &str) -> HttpRemoteStore {
        HttpRemoteStore::new(RemoteConfig {
            base_url: base.into(),
            token: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn builds_workout_urls_under_the_base_path() {
        let remote = store("https://api.example.test/v1");
        let id: WorkoutId = "6f1c2b9e-3f0a-4c7d-9a57-2f7b7f7f0c11".parse().unwrap();
        let url = remote.workouts_url(&OwnerId::new("auth0|abc"), Some(id));
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v1/users/auth0|abc/workouts/6f1c2b9e-3f0a-4c7d-9a57-2f7b7f7f0c11"
        );
    }

    #[test]
    fn owner_cannot_add_path_segments() {
        let remote = store("https://api.example.test/v1");
        let url = remote.workouts_url(&OwnerId::new("team/alpha 1"), None);
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v1/users/team%2Falpha%201/workouts"
        );
        assert_eq!(url.path_segments().map(Iterator::count), Some(4));
    }

    #[test]
    fn trailing_slash_base_does_not_double_up() {
        let remote = store("https://api.example.test/");
        let url = remote.workouts_url(&OwnerId::new("u1"), None);
        assert_eq!(url.as_str(), "https://api.example.test/users/u1/workouts");
    }

    #[test]
    fn rejects_non_base_urls() {
        let err = HttpRemoteStore::new(RemoteConfig {
            base_url: "mailto:coach@example.test".into(),
            token: None,
            timeout: Duration::from_secs(1),
        })
        .err()
        .unwrap();
        assert!(matches!(err, FitnessServicesError::InvalidRemoteUrl { .. }));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN),
            RemoteError::PermissionDenied(_)
        ));
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE).is_recoverable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS).is_recoverable());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT).is_recoverable());
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY),
            RemoteError::Rejected(_)
        ));
    }
}
