use std::future::Future;

use kube::{Client, Config};
use secrecy::SecretString;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cluster::KubeClusterClient;
use crate::overrides::{keys, Overrides};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("UnableToInferConfig: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),
    #[error("InvalidApiUrl: {0}")]
    InvalidApiUrl(#[from] http::uri::InvalidUri),
    #[error("UnableToSerializeObject: {0}")]
    UnableToSerializeObject(#[from] serde_json::Error),
    #[error("UnableToParseResource: {0}")]
    UnableToParseResource(#[from] serde_yaml::Error),
    #[error("InvalidReplicaCount: {0}")]
    InvalidReplicaCount(String),
    #[error("InvalidResource: {0}")]
    InvalidResource(String),
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// True when the API server rejected the request, as opposed to the
    /// request never reaching it.
    pub fn is_api_response(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(_)))
    }
}

/// Fields shared by every step.
#[derive(Clone, Debug, Default)]
pub struct StepConfig {
    pub api_url: String,
    pub namespace: String,
    pub auth_token: String,
    pub verbose: bool,
}

impl StepConfig {
    pub fn api_url<'a>(&'a self, overrides: &'a Overrides) -> &'a str {
        overrides.resolve(keys::API_URL, &self.api_url)
    }

    pub fn namespace<'a>(&'a self, overrides: &'a Overrides) -> &'a str {
        overrides.resolve(keys::NAMESPACE, &self.namespace)
    }

    pub fn verbose(&self, overrides: &Overrides) -> bool {
        overrides.resolve_flag(keys::VERBOSE, self.verbose)
    }

    pub fn auth_token(&self, overrides: &Overrides) -> Option<SecretString> {
        bearer_token(overrides.resolve(keys::AUTH_TOKEN, &self.auth_token))
    }

    /// Builds a client for this step's API endpoint and credential.
    pub async fn connect(&self, overrides: &Overrides) -> Result<KubeClusterClient, Error> {
        connect(self.api_url(overrides), self.auth_token(overrides)).await
    }
}

/// An empty token means "use whatever credential the environment provides".
pub fn bearer_token(raw: &str) -> Option<SecretString> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        Some(SecretString::new(raw.to_string()))
    }
}

/// Connects to `api_url` with `token`.
///
/// An empty URL falls back to the in-cluster service account or the local
/// kubeconfig. A missing token keeps the authentication of that fallback.
pub async fn connect(api_url: &str, token: Option<SecretString>) -> Result<KubeClusterClient, Error> {
    let mut config = if api_url.trim().is_empty() {
        Config::infer().await?
    } else {
        Config::new(api_url.trim().parse::<http::Uri>()?)
    };

    if let Some(token) = token {
        config.auth_info.token = Some(token);
    }

    debug!(cluster = %config.cluster_url, "connecting");
    let client = Client::try_from(config)?;
    Ok(KubeClusterClient::new(client))
}

/// Drives `step` until it finishes or `cancel` fires, whichever is first.
pub async fn run_until_cancelled<F, T>(cancel: &CancellationToken, step: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = step => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn blank_token_is_absent() {
        assert!(bearer_token("").is_none());
        assert!(bearer_token("  ").is_none());
        let token = bearer_token(" sha256~abc ").unwrap();
        assert_eq!(token.expose_secret(), "sha256~abc");
    }

    #[test]
    fn overrides_shadow_common_fields() {
        let config = StepConfig {
            api_url: "https://api.example:6443".into(),
            namespace: "dev".into(),
            auth_token: "base".into(),
            verbose: false,
        };
        let overrides: Overrides = [
            (keys::NAMESPACE.to_string(), "qa".to_string()),
            (keys::VERBOSE.to_string(), "true".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(config.namespace(&overrides), "qa");
        assert_eq!(config.api_url(&overrides), "https://api.example:6443");
        assert!(config.verbose(&overrides));
        assert_eq!(
            config.auth_token(&overrides).unwrap().expose_secret(),
            "base"
        );
    }

    #[tokio::test]
    async fn cancellation_wins_over_pending_step() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), Error> =
            run_until_cancelled(&cancel, std::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn finished_step_is_returned() {
        let cancel = CancellationToken::new();
        let result = run_until_cancelled(&cancel, async { Ok::<_, Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
