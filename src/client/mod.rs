//! The PAS client.
//!
//! `SeerClient` owns the HTTP connection and the authenticated session,
//! and exposes the API surface in per-area `impl` blocks: projects,
//! plates, samples, analyses, MS data files, and group analysis.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::auth::{Auth, MfaChallenge};
use crate::error::{Error, Result};
use crate::model::{Space, TenantMembership};

mod analyses;
mod group_analysis;
mod msdata;
mod plates;
mod projects;
mod samples;

pub use analyses::{AnalysisQuery, AnalysisSearch, AnalyteType, Rollup};
pub use group_analysis::{GroupAnalysisPlots, GroupAnalysisQuery, StatTest};
pub use plates::PlateMapFile;
pub use samples::{SampleFilter, SampleQuery};

/// Authenticated client for one PAS instance.
pub struct SeerClient {
    http: reqwest::Client,
    auth: Mutex<Auth>,
}

impl SeerClient {
    /// Logs in and returns a ready client.
    ///
    /// `instance` is `"US"`, `"EU"`, or an explicit `https://` base URL.
    /// Accounts with multi-factor authentication enabled get
    /// `Error::MfaRequired`; complete the login with
    /// [`SeerClient::login_with_mfa`].
    pub async fn login(
        username: impl Into<String>,
        password: impl Into<String>,
        instance: &str,
    ) -> Result<Self> {
        let mut auth = Auth::new(username, password, instance)?;
        auth.login().await?;
        Ok(SeerClient {
            http: reqwest::Client::new(),
            auth: Mutex::new(auth),
        })
    }

    /// Completes a login that answered with an MFA challenge.
    pub async fn login_with_mfa(
        username: impl Into<String>,
        password: impl Into<String>,
        instance: &str,
        challenge: &MfaChallenge,
        code: &str,
    ) -> Result<Self> {
        let mut auth = Auth::new(username, password, instance)?;
        auth.confirm_mfa(challenge, code).await?;
        Ok(SeerClient {
            http: reqwest::Client::new(),
            auth: Mutex::new(auth),
        })
    }

    /// Logs in and immediately switches to the given tenant.
    pub async fn login_with_tenant(
        username: impl Into<String>,
        password: impl Into<String>,
        instance: &str,
        tenant: &str,
    ) -> Result<Self> {
        let client = Self::login(username, password, instance).await?;
        client.switch_tenant(tenant).await?;
        Ok(client)
    }

    /// Builds a client from `PAS_USERNAME`, `PAS_PASSWORD`, and
    /// `PAS_INSTANCE` (default `US`), loading a `.env` file when one is
    /// present.
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let username = std::env::var("PAS_USERNAME")
            .map_err(|_| Error::Auth("PAS_USERNAME is not set".into()))?;
        let password = std::env::var("PAS_PASSWORD")
            .map_err(|_| Error::Auth("PAS_PASSWORD is not set".into()))?;
        let instance = std::env::var("PAS_INSTANCE").unwrap_or_else(|_| "US".to_string());
        Self::login(username, password, &instance).await
    }

    /// Invalidates the session on the backend and clears cached tokens.
    pub async fn logout(&self) -> Result<()> {
        self.auth.lock().await.logout().await
    }

    pub async fn username(&self) -> String {
        self.auth.lock().await.username().to_string()
    }

    pub async fn active_tenant_id(&self) -> Option<String> {
        self.auth.lock().await.active_tenant_id().map(str::to_string)
    }

    pub async fn active_role(&self) -> Option<String> {
        self.auth.lock().await.active_role().map(str::to_string)
    }

    /// Tenants the authenticated user belongs to.
    pub async fn user_tenants(&self) -> Result<Vec<TenantMembership>> {
        self.get_json("get_user_tenant", "api/v1/usertenants", &[])
            .await
    }

    /// Institution name to tenant id, for quick lookup before a switch.
    pub async fn list_tenants(&self) -> Result<HashMap<String, String>> {
        let memberships = self.user_tenants().await?;
        Ok(memberships
            .into_iter()
            .map(|m| (m.institution, m.tenant_id))
            .collect())
    }

    /// Switches the active tenant. `identifier` is a tenant id or an
    /// institution name; an institution with several tenants must be
    /// addressed by tenant id.
    pub async fn switch_tenant(&self, identifier: &str) -> Result<()> {
        let memberships = self.user_tenants().await?;

        let membership = match memberships.iter().find(|m| m.tenant_id == identifier) {
            Some(membership) => membership,
            None => {
                let mut by_institution = memberships.iter().filter(|m| m.institution == identifier);
                let first = by_institution.next().ok_or_else(|| {
                    Error::InvalidInput(
                        "invalid tenant identifier, tenant was not switched".into(),
                    )
                })?;
                if by_institution.next().is_some() {
                    return Err(Error::InvalidInput(
                        "multiple tenants found for the institution, specify a tenant id".into(),
                    ));
                }
                first
            }
        };

        let username = self.username().await;
        let _: serde_json::Value = self
            .put_json(
                "switch_tenant",
                "api/v1/users/tenant",
                &serde_json::json!({
                    "currentTenantId": membership.tenant_id,
                    "username": username,
                }),
            )
            .await?;

        let role = membership.role.clone().unwrap_or_default();
        self.auth
            .lock()
            .await
            .set_active_tenant(membership.tenant_id.clone(), role);
        info!(institution = %membership.institution, "switched tenant");
        Ok(())
    }

    /// User groups ("spaces") entities and files can be scoped to.
    pub async fn spaces(&self) -> Result<Vec<Space>> {
        self.get_json("get_spaces", "api/v1/usergroups", &[]).await
    }

    /// Resolves a space name (case-insensitive) to its id.
    pub(crate) async fn space_id_by_name(&self, name: &str) -> Result<String> {
        let spaces = self.spaces().await?;
        spaces
            .into_iter()
            .find(|s| s.usergroup_name.eq_ignore_ascii_case(name))
            .map(|s| s.id)
            .ok_or_else(|| Error::NotFound(format!("no space named '{name}'")))
    }

    pub(crate) async fn base_url(&self) -> String {
        self.auth.lock().await.base_url().to_string()
    }

    /// The tenant id requests are currently scoped to. Several endpoints
    /// need it to build storage keys.
    pub(crate) async fn tenant_id(&self) -> Result<String> {
        self.active_tenant_id()
            .await
            .ok_or_else(|| Error::Auth("no active tenant; log in first".into()))
    }

    async fn auth_headers(&self, operation: &str) -> Result<HeaderMap> {
        let mut auth = self.auth.lock().await;
        let (id_token, access_token) = auth.tokens().await?;
        let mut headers = Auth::seer_headers(operation);
        headers.insert(AUTHORIZATION, header_value(&id_token)?);
        headers.insert("Access-Token", header_value(&access_token)?);
        if let Some(tenant_id) = auth.active_tenant_id() {
            headers.insert("Tenant-Id", header_value(tenant_id)?);
        }
        if let Some(role) = auth.active_role() {
            headers.insert("Role", header_value(role)?);
        }
        Ok(headers)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url().await);
        let response = self
            .http
            .get(url)
            .headers(self.auth_headers(operation).await?)
            .query(query)
            .send()
            .await?;
        into_json(response).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url().await);
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers(operation).await?)
            .json(body)
            .send()
            .await?;
        into_json(response).await
    }

    /// POST whose response body is plain text, such as a signed URL.
    pub(crate) async fn post_text(
        &self,
        operation: &str,
        path: &str,
        body: &impl Serialize,
    ) -> Result<String> {
        let url = format!("{}{path}", self.base_url().await);
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers(operation).await?)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::server(
                status,
                response.text().await.unwrap_or_default(),
            ));
        }
        Ok(response.text().await?.trim_matches('"').to_string())
    }

    pub(crate) async fn put_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url().await);
        let response = self
            .http
            .put(url)
            .headers(self.auth_headers(operation).await?)
            .json(body)
            .send()
            .await?;
        into_json(response).await
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Auth("token is not a valid header value".into()))
}

async fn into_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::server(
            status,
            response.text().await.unwrap_or_default(),
        ));
    }
    Ok(response.json().await?)
}
