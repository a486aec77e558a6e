use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

const API_PREFIX: &str = "/api/v4";

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{API_PREFIX}{path}"))
            .context("failed to build API URL")
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            // Prefer the server's alert text over the raw body.
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|e| e.alerts.into_iter().next())
                .map(|a| a.text)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let body = self.send(req).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, req: reqwest::RequestBuilder) -> Result<()> {
        self.send(req).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/health")?;
        self.send_json(self.http.get(url)).await
    }

    // Profiles

    pub async fn list_profiles(&self, query: &ProfileQuery) -> Result<Envelope<Vec<Profile>>> {
        let mut url = self.url("/profiles")?;
        let pairs = query.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn create_profile(&self, req: &ProfileRequest) -> Result<Envelope<Profile>> {
        let url = self.url("/profiles")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn update_profile(
        &self,
        id: i64,
        req: &ProfileRequest,
        if_match: Option<&str>,
    ) -> Result<Envelope<Profile>> {
        let url = self.url(&format!("/profiles/{id}"))?;
        let mut builder = self.http.put(url).json(req);
        if let Some(tag) = if_match {
            builder = builder.header("If-Match", tag);
        }
        self.send_json(builder).await
    }

    pub async fn delete_profile(
        &self,
        id: i64,
        if_match: Option<&str>,
    ) -> Result<Envelope<serde_json::Value>> {
        let url = self.url(&format!("/profiles/{id}"))?;
        let mut builder = self.http.delete(url);
        if let Some(tag) = if_match {
            builder = builder.header("If-Match", tag);
        }
        self.send_json(builder).await
    }

    pub async fn copy_profile(
        &self,
        existing_name: &str,
        name: &str,
    ) -> Result<Envelope<CopiedProfile>> {
        let url = self.url("/profiles/copy")?;
        let body = CopyProfileRequest {
            name: name.to_string(),
            existing_name: existing_name.to_string(),
        };
        self.send_json(self.http.post(url).json(&body)).await
    }

    /// The export document is returned as-is so it can be saved and imported.
    pub async fn export_profile(&self, id: i64) -> Result<serde_json::Value> {
        let url = self.url(&format!("/profiles/{id}/export"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn import_profile(
        &self,
        document: &serde_json::Value,
    ) -> Result<Envelope<ImportedProfile>> {
        let url = self.url("/profiles/import")?;
        self.send_json(self.http.post(url).json(document)).await
    }

    // Parameters

    pub async fn list_parameters(&self, name: Option<&str>) -> Result<Envelope<Vec<Parameter>>> {
        let mut url = self.url("/parameters")?;
        if let Some(name) = name {
            url.query_pairs_mut().append_pair("name", name);
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn create_parameter(&self, req: &CreateParameterRequest) -> Result<Envelope<Parameter>> {
        let url = self.url("/parameters")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn delete_parameter(&self, id: i64) -> Result<Envelope<serde_json::Value>> {
        let url = self.url(&format!("/parameters/{id}"))?;
        self.send_json(self.http.delete(url)).await
    }

    pub async fn associate_parameters(
        &self,
        profile_id: i64,
        parameter_ids: &[i64],
    ) -> Result<Envelope<Vec<serde_json::Value>>> {
        let url = self.url("/profileparameters")?;
        let body: Vec<ProfileParameterRequest> = parameter_ids
            .iter()
            .map(|&parameter_id| ProfileParameterRequest {
                profile_id,
                parameter_id,
            })
            .collect();
        self.send_json(self.http.post(url).json(&body)).await
    }

    // CDNs and locks

    pub async fn list_cdns(&self) -> Result<Envelope<Vec<Cdn>>> {
        let url = self.url("/cdns")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn create_cdn(&self, req: &CreateCdnRequest) -> Result<Envelope<Cdn>> {
        let url = self.url("/cdns")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn list_locks(
        &self,
        cdn: Option<&str>,
        username: Option<&str>,
    ) -> Result<Envelope<Vec<CdnLock>>> {
        let mut url = self.url("/cdn_locks")?;
        if let Some(cdn) = cdn {
            url.query_pairs_mut().append_pair("cdn", cdn);
        }
        if let Some(username) = username {
            url.query_pairs_mut().append_pair("username", username);
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn acquire_lock(&self, req: &CreateLockRequest) -> Result<Envelope<CdnLock>> {
        let url = self.url("/cdn_locks")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn release_lock(&self, cdn: &str) -> Result<Envelope<CdnLock>> {
        let mut url = self.url("/cdn_locks")?;
        url.query_pairs_mut().append_pair("cdn", cdn);
        self.send_json(self.http.delete(url)).await
    }

    // Tokens

    pub async fn create_token(&self, req: &CreateTokenRequest) -> Result<Envelope<CreateTokenResponse>> {
        let url = self.url("/tokens")?;
        self.send_json(self.http.post(url).json(req)).await
    }

    pub async fn list_tokens(&self) -> Result<Envelope<Vec<TokenInfo>>> {
        let url = self.url("/tokens")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn revoke_token(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/tokens/{id}"))?;
        self.send_empty(self.http.delete(url)).await
    }
}

// =============================================================================
// Request/response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct Alert {
    pub text: String,
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub response: Option<T>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    alerts: Vec<Alert>,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Filters, ordering and window for `GET /profiles`.
#[derive(Debug, Default)]
pub struct ProfileQuery {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub cdn: Option<i64>,
    pub param: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
    pub orderby: Option<String>,
    pub sort_order: Option<String>,
}

impl ProfileQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let numbers = [
            ("id", self.id),
            ("cdn", self.cdn),
            ("param", self.param),
            ("limit", self.limit),
            ("offset", self.offset),
            ("page", self.page),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                pairs.push((key, value.to_string()));
            }
        }
        let strings = [
            ("name", &self.name),
            ("orderby", &self.orderby),
            ("sortOrder", &self.sort_order),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                pairs.push((key, value.clone()));
            }
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub cdn: i64,
    pub cdn_name: String,
    pub routing_disabled: bool,
    pub last_updated: String,
    #[serde(default)]
    pub params: Option<Vec<Parameter>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub cdn: i64,
    pub routing_disabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CopyProfileRequest {
    name: String,
    existing_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopiedProfile {
    pub id: i64,
    pub name: String,
    pub existing_id: i64,
    pub existing_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedProfile {
    pub id: i64,
    pub name: String,
    pub cdn_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: i64,
    pub name: String,
    pub config_file: String,
    pub value: String,
    pub secure: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParameterRequest {
    pub name: String,
    pub config_file: String,
    pub value: String,
    pub secure: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileParameterRequest {
    profile_id: i64,
    parameter_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cdn {
    pub id: i64,
    pub name: String,
    pub domain_name: String,
    pub dnssec_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCdnRequest {
    pub name: String,
    pub domain_name: String,
    pub dnssec_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnLock {
    pub cdn: String,
    pub user_name: String,
    #[serde(default)]
    pub message: Option<String>,
    pub soft: bool,
    pub last_updated: String,
}

#[derive(Debug, Serialize)]
pub struct CreateLockRequest {
    pub cdn: String,
    pub soft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    pub username: String,
    pub role: String,
    pub expires_in_secs: Option<u64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub token_id: String,
    pub token_secret: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token_id: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub description: Option<String>,
}
