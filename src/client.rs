use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderValue, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::feed::Page;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";
pub const SUBMISSIONS_PATH: &str = "/svc/api/submissions/";
pub const LINKS_PATH: &str = "/svc/api/links/";
pub const MARK_SEEN_PATH: &str = "/svc/api/submissions/mark_seen/";

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service: unauthorized")]
    Unauthorized,
    #[error("service: forbidden")]
    Forbidden,
    #[error("service: request failed {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    /// Raw `Cookie` header forwarded with every request.
    pub cookie: Option<String>,
    pub http_client: Option<HttpClient>,
}

/// Where a page request goes: a service path plus query, or a continuation
/// URL handed back by an earlier page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTarget {
    Path {
        path: &'static str,
        params: Vec<(String, String)>,
    },
    Continuation(String),
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    cookie: Option<String>,
    csrf_token: Option<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.user_agent.trim().is_empty(),
            "service client user agent required"
        );
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base).with_context(|| format!("parse base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()
                .context("build http client")?,
        };
        let cookie = config.cookie.filter(|c| !c.trim().is_empty());
        let csrf_token = cookie
            .as_deref()
            .and_then(|raw| cookie_value(raw, CSRF_COOKIE));

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            cookie,
            csrf_token,
        })
    }

    /// Resolves a page target to the absolute URL that will be requested.
    pub fn resolve(&self, target: &PageTarget) -> Result<Url> {
        match target {
            PageTarget::Path { path, params } => {
                let mut url = self.base_url.join(path)?;
                if !params.is_empty() {
                    let mut pairs = url.query_pairs_mut();
                    for (k, v) in params {
                        pairs.append_pair(k, v);
                    }
                }
                Ok(url)
            }
            PageTarget::Continuation(next) => self
                .base_url
                .join(next)
                .with_context(|| format!("parse continuation url {next}")),
        }
    }

    pub fn get_page<T>(&self, target: &PageTarget) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        let url = self.resolve(target)?;
        let resp = self.send(Method::GET, url.clone(), None::<&()>)?;
        resp.json()
            .with_context(|| format!("decode page from {url}"))
    }

    pub fn mark_seen(&self, ids: &[String]) -> Result<()> {
        #[derive(Serialize)]
        struct MarkSeen<'a> {
            ids: &'a [String],
        }

        let url = self.base_url.join(MARK_SEEN_PATH)?;
        self.send(Method::PUT, url, Some(&MarkSeen { ids }))?;
        Ok(())
    }

    fn send<B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let mut req = self.http.request(method, url);
        req = req.header(USER_AGENT, self.user_agent.clone());
        if let Some(cookie) = &self.cookie {
            req = req.header(COOKIE, cookie.clone());
        }
        if let Some(payload) = body {
            req = req.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            if let Some(token) = &self.csrf_token {
                req = req.header(CSRF_HEADER, token.clone());
            }
            req = req.json(payload);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let err = match status.as_u16() {
            401 => ServiceError::Unauthorized,
            403 => ServiceError::Forbidden,
            code => ServiceError::Status { status: code, body },
        };
        Err(err.into())
    }
}

/// Reads one entry from a `Cookie` header value.
pub fn cookie_value(raw: &str, name: &str) -> Option<String> {
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key != name {
            return None;
        }
        Some(percent_decode_str(value).decode_utf8_lossy().into_owned())
    })
}
