use crate::errors::{Error, Result};
use crate::hub::DEFAULT_SUBSCRIBER_BUFFER;
use crate::upstream::UpstreamConfig;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://es-flight-api-us.djigate.com";
const DEFAULT_POLL_SECONDS: f64 = 2.0;
const DEFAULT_FETCH_TIMEOUT_SECONDS: f64 = 1.5;
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_SECRETS_PATH: &str = "Secret/secrets.json";
const DEFAULT_FRONTEND_DIR: &str = "dist";

/// Values handed to the browser app through `/api/config`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppSettings {
    pub api_url: String,
    pub user_token: String,
    pub project_uuid: String,
    pub workflow_uuid: String,
    pub creator_id: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub org_key: String,
    pub project_uuid: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub http_addr: SocketAddr,
    pub subscriber_buffer: usize,
    pub frontend_dir: PathBuf,
    pub mapbox_public_token: String,
    pub app_settings: AppSettings,
    pub stream_urls: HashMap<String, String>,
}

impl GatewayConfig {
    /// Reads the process environment, falling back to the secrets file.
    pub fn from_env() -> Result<Self> {
        let secrets_path =
            std::env::var("SECRETS_PATH").unwrap_or_else(|_| DEFAULT_SECRETS_PATH.to_string());
        let secrets = load_secrets(Path::new(&secrets_path));
        Self::from_lookup(|key| std::env::var(key).ok(), &secrets)
    }

    /// Resolves every setting as environment, then secrets, then default.
    pub fn from_lookup<F>(env: F, secrets: &Map<String, Value>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Option<String> {
            env(key).or_else(|| secrets.get(key).and_then(Value::as_str).map(str::to_string))
        };

        let base_url = get("DJI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let api_url =
            get("DJI_API_URL").unwrap_or_else(|| format!("{}/openapi/v0.1/workflow", base_url));
        let org_key = get("DJI_ORG_KEY").unwrap_or_default();
        let user_token = get("DJI_USER_TOKEN").unwrap_or_else(|| org_key.clone());
        let project_uuid = get("DJI_PROJECT_UUID").unwrap_or_default();

        if org_key.is_empty() {
            warn!("DJI_ORG_KEY is not set (upstream requests will fail)");
        }
        if project_uuid.is_empty() {
            warn!("DJI_PROJECT_UUID is not set (topology requests will fail)");
        }

        let poll_seconds = parse_or(get("POLL_SECONDS"), "POLL_SECONDS", DEFAULT_POLL_SECONDS);
        let timeout_seconds = parse_or(
            get("FETCH_TIMEOUT_SECONDS"),
            "FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT_SECONDS,
        );
        let subscriber_buffer = parse_or(
            get("SUBSCRIBER_BUFFER"),
            "SUBSCRIBER_BUFFER",
            DEFAULT_SUBSCRIBER_BUFFER,
        );

        if !(poll_seconds.is_finite() && poll_seconds > 0.0) {
            return Err(Error::Config(format!(
                "POLL_SECONDS must be positive, got {}",
                poll_seconds
            )));
        }
        if !(timeout_seconds.is_finite() && timeout_seconds > 0.0) || timeout_seconds >= poll_seconds {
            return Err(Error::Config(format!(
                "FETCH_TIMEOUT_SECONDS must be positive and shorter than POLL_SECONDS ({}), got {}",
                poll_seconds, timeout_seconds
            )));
        }
        if subscriber_buffer == 0 {
            return Err(Error::Config("SUBSCRIBER_BUFFER must be at least 1".to_string()));
        }

        let http_addr_raw = get("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = http_addr_raw.parse().map_err(|e| {
            Error::Config(format!("HTTP_ADDR {:?} is not a socket address: {}", http_addr_raw, e))
        })?;

        let stream_urls = secrets
            .get("STREAM_URL_BY_SN")
            .and_then(Value::as_object)
            .map(|urls| {
                urls.iter()
                    .filter_map(|(sn, url)| Some((sn.clone(), url.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            app_settings: AppSettings {
                api_url,
                user_token,
                project_uuid: project_uuid.clone(),
                workflow_uuid: get("DJI_WORKFLOW_UUID").unwrap_or_default(),
                creator_id: get("DJI_CREATOR_ID").unwrap_or_default(),
            },
            base_url,
            org_key,
            project_uuid,
            poll_interval: Duration::from_secs_f64(poll_seconds),
            fetch_timeout: Duration::from_secs_f64(timeout_seconds),
            http_addr,
            subscriber_buffer,
            frontend_dir: PathBuf::from(
                get("FRONTEND_DIR").unwrap_or_else(|| DEFAULT_FRONTEND_DIR.to_string()),
            ),
            mapbox_public_token: get("MAPBOX_PUBLIC_TOKEN").unwrap_or_default(),
            stream_urls,
        })
    }

    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.base_url.clone(),
            org_key: self.org_key.clone(),
            project_uuid: self.project_uuid.clone(),
            timeout: self.fetch_timeout,
        }
    }
}

/// Missing or unreadable secrets behave like an empty file.
pub fn load_secrets(path: &Path) -> Map<String, Value> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Ignoring secrets file {}: not a JSON object", path.display());
            Map::new()
        }
        Err(e) => {
            warn!("Ignoring secrets file {}: {}", path.display(), e);
            Map::new()
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    raw: Option<String>,
    key: &str,
    default: T,
) -> T {
    match raw {
        None => default,
        Some(s) => s.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} value {:?}, using {}", key, s, default);
            default
        }),
    }
}
