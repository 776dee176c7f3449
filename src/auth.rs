//! Authentication against a PAS instance.
//!
//! `Auth` resolves the instance name to a base URL, performs the login
//! and token-refresh calls, and caches the Cognito tokens together with
//! the multi-tenant state decoded from the ID token.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::sdk_version;
use crate::error::{Error, Result};

const US_URL: &str = "https://api.pas.seer.software/";
const EU_URL: &str = "https://api.pas-eu.seer.bio/";

/// Claims the SDK reads from the Cognito ID token. The signature is not
/// verified; the token is only decoded to seed tenant state.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "custom:tenantId")]
    pub tenant_id: String,
    #[serde(rename = "custom:role")]
    pub role: String,
}

/// Challenge handed back when the account requires multi-factor
/// authentication. Complete the login with [`Auth::confirm_mfa`] and a
/// code from the authenticator app.
#[derive(Debug, Clone)]
pub struct MfaChallenge {
    pub username: String,
    pub challenge_name: String,
    pub session: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn", default)]
    expires_in: i64,
    challenge: Option<String>,
    session: Option<String>,
    #[serde(rename = "challengeParameters")]
    challenge_parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct MfaResponse {
    #[serde(rename = "AuthenticationResult")]
    authentication_result: Option<AuthenticationResult>,
}

#[derive(Deserialize)]
struct AuthenticationResult {
    #[serde(rename = "AccessToken")]
    access_token: String,
    #[serde(rename = "IdToken")]
    id_token: String,
    #[serde(rename = "ExpiresIn")]
    expires_in: i64,
    #[serde(rename = "RefreshToken")]
    refresh_token: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(rename = "expiresIn", default)]
    expires_in: i64,
}

/// Holds login credentials and cached tokens for one PAS instance.
pub struct Auth {
    username: String,
    password: String,
    url: String,
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: i64,
    base_tenant_id: Option<String>,
    base_role: Option<String>,
    active_tenant_id: Option<String>,
    active_role: Option<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("url", &self.url)
            .field("active_tenant_id", &self.active_tenant_id)
            .finish()
    }
}

/// Maps an instance name to its base URL. `US` and `EU` are the hosted
/// regions; any other value must be an explicit `https://` endpoint.
fn resolve_instance(instance: &str) -> Result<String> {
    match instance {
        "US" => Ok(US_URL.to_string()),
        "EU" => Ok(EU_URL.to_string()),
        custom if custom.starts_with("https://") => {
            if custom.ends_with('/') {
                Ok(custom.to_string())
            } else {
                Ok(format!("{custom}/"))
            }
        }
        other => Err(Error::InvalidInstance(other.to_string())),
    }
}

impl Auth {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        instance: &str,
    ) -> Result<Self> {
        let url = resolve_instance(instance)?;
        Ok(Auth {
            username: username.into(),
            password: password.into(),
            url,
            id_token: None,
            access_token: None,
            refresh_token: None,
            token_expiry: 0,
            base_tenant_id: None,
            base_role: None,
            active_tenant_id: None,
            active_role: None,
            http: reqwest::Client::new(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Base URL of the instance, always with a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.url
    }

    pub fn active_tenant_id(&self) -> Option<&str> {
        self.active_tenant_id.as_deref()
    }

    pub fn active_role(&self) -> Option<&str> {
        self.active_role.as_deref()
    }

    pub(crate) fn set_active_tenant(&mut self, tenant_id: String, role: String) {
        self.active_tenant_id = Some(tenant_id);
        self.active_role = Some(role);
    }

    /// Headers every request carries so the backend can attribute SDK
    /// traffic to a client version and operation.
    pub(crate) fn seer_headers(operation: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-seer-source", HeaderValue::from_static("sdk"));
        if let Ok(value) = HeaderValue::from_str(&format!("{}/{operation}", sdk_version())) {
            headers.insert("x-seer-id", value);
        }
        headers
    }

    /// Logs in with the stored credentials.
    ///
    /// Returns `Error::MfaRequired` when the account has multi-factor
    /// authentication enabled; the caller completes the login via
    /// [`Auth::confirm_mfa`].
    pub async fn login(&mut self) -> Result<()> {
        let response = self
            .http
            .post(format!("{}auth/login", self.url))
            .headers(Self::seer_headers("login"))
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "could not log in to the PAS instance (status {status})"
            )));
        }

        let body: LoginResponse = response.json().await?;

        if let Some(challenge_name) = body.challenge {
            let session = body.session.ok_or_else(|| {
                Error::UnexpectedResponse("MFA challenge without a session".into())
            })?;
            let username = body
                .challenge_parameters
                .as_ref()
                .and_then(|params| params.get("USER_ID_FOR_SRP"))
                .and_then(|value| value.as_str())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    Error::UnexpectedResponse("MFA challenge without a user id".into())
                })?
                .to_string();
            return Err(Error::MfaRequired(MfaChallenge {
                username,
                challenge_name,
                session,
            }));
        }

        let id_token = body
            .id_token
            .ok_or_else(|| Error::UnexpectedResponse("login response without id token".into()))?;
        let access_token = body.access_token.ok_or_else(|| {
            Error::UnexpectedResponse("login response without access token".into())
        })?;

        self.apply_tokens(id_token, access_token, body.refresh_token, body.expires_in)?;
        info!(username = %self.username, "logged in");
        Ok(())
    }

    /// Completes an MFA login with the code from the authenticator app.
    pub async fn confirm_mfa(&mut self, challenge: &MfaChallenge, code: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}auth/confirmMFA", self.url))
            .headers(Self::seer_headers("login"))
            .json(&serde_json::json!({
                "username": challenge.username,
                "mfaCode": code,
                "challengeName": challenge.challenge_name,
                "session": challenge.session,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "could not confirm MFA for the PAS instance (status {status})"
            )));
        }

        let body: MfaResponse = response.json().await?;
        let result = body.authentication_result.ok_or_else(|| {
            Error::UnexpectedResponse("MFA confirmation without an authentication result".into())
        })?;

        self.apply_tokens(
            result.id_token,
            result.access_token,
            Some(result.refresh_token),
            result.expires_in,
        )?;
        info!(username = %self.username, "logged in with MFA");
        Ok(())
    }

    fn apply_tokens(
        &mut self,
        id_token: String,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
    ) -> Result<()> {
        let claims = decode_claims(&id_token)?;
        self.base_tenant_id = Some(claims.tenant_id.clone());
        self.base_role = Some(claims.role.clone());
        if self.active_tenant_id.is_none() {
            self.active_tenant_id = Some(claims.tenant_id);
        }
        if self.active_role.is_none() {
            self.active_role = Some(claims.role);
        }
        self.id_token = Some(id_token);
        self.access_token = Some(access_token);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.token_expiry = Utc::now().timestamp() + expires_in;
        Ok(())
    }

    fn has_valid_token(&self) -> bool {
        self.id_token.is_some()
            && self.access_token.is_some()
            && self.token_expiry > Utc::now().timestamp()
    }

    /// Returns the cached (id token, access token) pair, refreshing it
    /// first when expired.
    pub async fn tokens(&mut self) -> Result<(String, String)> {
        if !self.has_valid_token() {
            self.refresh().await?;
        }
        match (&self.id_token, &self.access_token) {
            (Some(id), Some(access)) => Ok((id.clone(), access.clone())),
            _ => Err(Error::Auth("no tokens available; log in first".into())),
        }
    }

    async fn refresh(&mut self) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or_else(|| Error::Auth("no refresh token available; log in first".into()))?;

        debug!(username = %self.username, "refreshing expired token");
        let response = self
            .http
            .post(format!("{}auth/refreshtoken", self.url))
            .headers(Self::seer_headers("refresh_token"))
            .json(&serde_json::json!({ "refreshtoken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "could not refresh token (status {status})"
            )));
        }

        let body: RefreshResponse = response.json().await?;
        let id_token = body.id_token.ok_or_else(|| {
            Error::UnexpectedResponse("refresh response without id token".into())
        })?;
        let access_token = body.access_token.ok_or_else(|| {
            Error::UnexpectedResponse("refresh response without access token".into())
        })?;
        self.apply_tokens(id_token, access_token, body.refresh_token, body.expires_in)
    }

    /// Invalidates the refresh token on the backend and clears the
    /// cached tokens. A no-op when no valid session exists.
    pub async fn logout(&mut self) -> Result<()> {
        if !self.has_valid_token() {
            return Ok(());
        }
        let response = self
            .http
            .post(format!("{}auth/logout", self.url))
            .headers(Self::seer_headers("logout"))
            .json(&serde_json::json!({
                "username": self.username,
                "refreshtoken": self.refresh_token,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!(
                "could not log out from the PAS instance (status {status})"
            )));
        }

        self.id_token = None;
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiry = 0;
        info!(username = %self.username, "logged out");
        Ok(())
    }
}

/// Decodes the tenant claims from a Cognito ID token without verifying
/// the signature. The backend is the authority on token validity; the
/// SDK only needs the tenant id and role embedded in the token.
pub fn decode_claims(id_token: &str) -> Result<TokenClaims> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims::<&str>(&[]);
    let data = jsonwebtoken::decode::<TokenClaims>(
        id_token,
        &DecodingKey::from_secret(&[]),
        &validation,
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_regions_resolve() {
        assert_eq!(resolve_instance("US").unwrap(), US_URL);
        assert_eq!(resolve_instance("EU").unwrap(), EU_URL);
    }

    #[test]
    fn custom_instance_must_be_https() {
        assert_eq!(
            resolve_instance("https://secure-https-url.example/").unwrap(),
            "https://secure-https-url.example/"
        );
        assert_eq!(
            resolve_instance("https://secure-https-url.example").unwrap(),
            "https://secure-https-url.example/"
        );
        assert!(resolve_instance("http://insecure-http-url.example/").is_err());
        assert!(resolve_instance("XX").is_err());
        assert!(resolve_instance("my-favorite-instance").is_err());
    }
}
