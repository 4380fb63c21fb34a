//! Client for the upstream directory serving the user/group graph.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::config::DirectorySettings;
use crate::error::{AuthzError, AuthzResult};
use crate::facts::DirectoryDocument;
use crate::gate::{SERVER_NAME_HEADER, SERVER_SECRET_HEADER, SESSION_TOKEN_HEADER};

/// Anything able to produce a fresh directory document.
#[async_trait]
pub trait DirectorySource: Send + Sync + std::fmt::Debug {
    /// Fetch the full `{users, groups}` document.
    async fn fetch(&self) -> AuthzResult<DirectoryDocument>;
}

/// HTTP directory client.
///
/// Logs in against the session service as a server, then downloads the
/// directory document with the resulting token.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: Client,
    settings: DirectorySettings,
}

impl DirectoryClient {
    /// Create a new directory client.
    pub fn new(settings: DirectorySettings) -> AuthzResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AuthzError::upstream(format!("failed to create client: {e}")))?;

        Ok(Self { client, settings })
    }

    /// Obtain a server session token.
    #[instrument(skip(self), fields(server = %self.settings.server_name))]
    pub async fn server_login(&self) -> AuthzResult<String> {
        let url = format!("{}/serverlogin", self.settings.session_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header(SERVER_NAME_HEADER, &self.settings.server_name)
            .header(SERVER_SECRET_HEADER, &self.settings.server_secret)
            .send()
            .await
            .map_err(|e| AuthzError::upstream(format!("server login failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(AuthzError::upstream(format!(
                "server login returned {}",
                response.status()
            )));
        }

        response
            .headers()
            .get(SESSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| AuthzError::upstream("server login response carried no session token"))
    }

    /// Get the directory base URL.
    pub fn directory_url(&self) -> &str {
        &self.settings.directory_url
    }
}

#[async_trait]
impl DirectorySource for DirectoryClient {
    #[instrument(skip(self), fields(url = %self.settings.directory_url))]
    async fn fetch(&self) -> AuthzResult<DirectoryDocument> {
        let token = self.server_login().await?;
        let url = format!(
            "{}/teams/v1/team/opa",
            self.settings.directory_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .header(SESSION_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| AuthzError::upstream(format!("directory request failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(AuthzError::upstream(format!(
                "directory returned {}",
                response.status()
            )));
        }

        let document: DirectoryDocument = response
            .json()
            .await
            .map_err(|e| AuthzError::upstream(format!("undecodable directory document: {e}")))?;

        debug!(
            users = document.users.len(),
            groups = document.groups.len(),
            "fetched directory document"
        );
        Ok(document)
    }
}
