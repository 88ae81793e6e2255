use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::SET_COOKIE;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::ProxyChatBackend;
use crate::session::{AuthBackend, LoginGrant, UserProfile};

/// Every upstream route, derived from one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub base: String,
    pub login: String,
    pub logout: String,
    pub register: String,
    pub check_auth: String,
    pub verify_email: String,
    pub verify_registration_otp: String,
    pub verify_reset_otp: String,
    pub forgot_password: String,
    pub reset_password: String,
    pub resend_verification: String,
    pub resend_registration_otp: String,
    pub oauth2_success: String,
    pub oauth2_google: String,
    pub ask: String,
}

impl ApiEndpoints {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        let auth = |path: &str| format!("{base}/api/auth/{path}");
        Self {
            login: auth("login"),
            logout: auth("logout"),
            register: auth("register"),
            check_auth: auth("check-auth"),
            verify_email: auth("verify-email"),
            verify_registration_otp: auth("verify-registration-otp"),
            verify_reset_otp: auth("verify-reset-otp"),
            forgot_password: auth("forgot-password"),
            reset_password: auth("reset-password"),
            resend_verification: auth("resend-verification"),
            resend_registration_otp: auth("resend-registration-otp"),
            oauth2_success: auth("oauth2-success"),
            oauth2_google: format!("{base}/oauth2/authorization/google"),
            ask: format!("{base}/api/ask"),
            base,
        }
    }
}

/// Cookie-carrying client for the PanInsight backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: ApiEndpoints,
}

impl ApiClient {
    /// Build a client, replaying `cookies` saved from an earlier login.
    pub fn new(endpoints: ApiEndpoints, timeout: Duration, cookies: &[String]) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        if !cookies.is_empty() {
            let url: Url = endpoints
                .base
                .parse()
                .with_context(|| format!("invalid API base URL {}", endpoints.base))?;
            for cookie in cookies {
                jar.add_cookie_str(cookie, &url);
            }
        }
        let http = Client::builder()
            .user_agent(concat!("paninsight/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .cookie_provider(jar)
            .build()
            .context("failed to build API HTTP client")?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    /// Chat backend for the `ask` proxy, sharing this client's cookies.
    pub fn chat_backend(&self) -> ProxyChatBackend {
        ProxyChatBackend::with_client(self.http.clone(), self.endpoints.ask.clone())
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<LoginGrant> {
        let response = self
            .http
            .post(&self.endpoints.login)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .context("failed to call login endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Login failed ({}): {}", status, body);
        }
        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response.text().await.unwrap_or_default();
        let parsed: LoginResponse = serde_json::from_str(&body).unwrap_or_default();
        let user = parsed.user.unwrap_or_else(|| UserProfile {
            email: email.to_string(),
            name: parsed.name,
        });
        debug!(cookies = cookies.len(), "login accepted");
        Ok(LoginGrant { user, cookies })
    }

    async fn logout(&self) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoints.logout)
            .send()
            .await
            .context("failed to call logout endpoint")?;
        if !response.status().is_success() {
            bail!("Logout failed ({})", response.status());
        }
        Ok(())
    }

    async fn check_auth(&self) -> Result<bool> {
        let response = self
            .http
            .get(&self.endpoints.check_auth)
            .send()
            .await
            .context("failed to call check-auth endpoint")?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            status => bail!("check-auth failed ({})", status),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn endpoints_share_one_base() {
        let endpoints = ApiEndpoints::from_base("http://65.0.121.98:8080/");
        assert_eq!(endpoints.login, "http://65.0.121.98:8080/api/auth/login");
        assert_eq!(endpoints.check_auth, "http://65.0.121.98:8080/api/auth/check-auth");
        assert_eq!(
            endpoints.resend_registration_otp,
            "http://65.0.121.98:8080/api/auth/resend-registration-otp"
        );
        assert_eq!(
            endpoints.oauth2_google,
            "http://65.0.121.98:8080/oauth2/authorization/google"
        );
        assert_eq!(endpoints.ask, "http://65.0.121.98:8080/api/ask");
    }

    #[test]
    fn rejects_unparsable_base_when_replaying_cookies() {
        let endpoints = ApiEndpoints::from_base("not a url");
        assert!(ApiClient::new(endpoints, Duration::from_secs(1), &["a=b".to_string()]).is_err());
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn login_returns_profile_and_cookies() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/auth/login")
                .json_body(json!({"email": "ada@example.org", "password": "hunter2"}));
            then.status(200)
                .header("set-cookie", "JSESSIONID=abc; Path=/")
                .json_body(json!({"user": {"email": "ada@example.org", "name": "Ada"}}));
        });
        let client =
            ApiClient::new(ApiEndpoints::from_base(&server.base_url()), Duration::from_secs(5), &[])
                .unwrap();
        let grant = client.login("ada@example.org", "hunter2").await.unwrap();
        mock.assert();
        assert_eq!(grant.user.display_name(), "Ada");
        assert_eq!(grant.cookies, vec!["JSESSIONID=abc; Path=/".to_string()]);
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn check_auth_maps_unauthorized_to_false() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/auth/check-auth");
            then.status(401);
        });
        let client =
            ApiClient::new(ApiEndpoints::from_base(&server.base_url()), Duration::from_secs(5), &[])
                .unwrap();
        assert!(!client.check_auth().await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn replayed_cookies_are_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/auth/check-auth")
                .cookie("JSESSIONID", "abc");
            then.status(200);
        });
        let client = ApiClient::new(
            ApiEndpoints::from_base(&server.base_url()),
            Duration::from_secs(5),
            &["JSESSIONID=abc; Path=/".to_string()],
        )
        .unwrap();
        assert!(client.check_auth().await.unwrap());
        mock.assert();
    }
}
