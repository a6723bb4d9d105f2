use std::{collections::HashMap, fs, io, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use shared::domain::{Settings, DEFAULT_PURPOSE_MAPPING};
use tracing::warn;
use url::Url;

use crate::{gateway::GatewayConfig, workspace::WorkspaceConfig, COPY_FEEDBACK_DURATION};

pub const CONFIG_FILE: &str = "medidocs.toml";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Everything the hosting environment supplies to the client: backend
/// location, credentials and the document-type purpose mapping.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub csrf_token: Option<String>,
    pub purpose_mapping: HashMap<String, String>,
    pub surface_doctor_refresh_errors: bool,
    pub initial_settings: Settings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            api_key: None,
            csrf_token: None,
            purpose_mapping: DEFAULT_PURPOSE_MAPPING
                .iter()
                .map(|(document_type, purpose)| (document_type.to_string(), purpose.to_string()))
                .collect(),
            surface_doctor_refresh_errors: false,
            initial_settings: Settings::default(),
        }
    }
}

impl ClientConfig {
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn workspace(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            initial_settings: self.initial_settings.clone(),
            purpose_mapping: self.purpose_mapping.clone(),
            csrf_token: self.csrf_token.clone(),
            surface_doctor_refresh_errors: self.surface_doctor_refresh_errors,
            copy_feedback: COPY_FEEDBACK_DURATION,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    base_url: Option<String>,
    api_key: Option<String>,
    csrf_token: Option<String>,
    surface_doctor_refresh_errors: Option<bool>,
    department: Option<String>,
    doctor: Option<String>,
    document_type: Option<String>,
    model: Option<String>,
    purpose_mapping: HashMap<String, String>,
}

pub fn load_client_config() -> Result<ClientConfig> {
    load_client_config_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, overlaid by `path` when it exists, overlaid by environment
/// variables looked up through `env`.
pub fn load_client_config_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();

    match fs::read_to_string(path) {
        Ok(raw) => apply_file_config(&mut config, &raw)
            .with_context(|| format!("failed to load config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env_overrides(&mut config, env)?;
    Ok(config)
}

fn apply_file_config(config: &mut ClientConfig, raw: &str) -> Result<()> {
    let file_cfg: FileConfig = toml::from_str(raw)?;

    if let Some(v) = file_cfg.base_url {
        config.base_url = parse_base_url(&v)?;
    }
    if let Some(v) = file_cfg.api_key {
        config.api_key = non_empty(v);
    }
    if let Some(v) = file_cfg.csrf_token {
        config.csrf_token = non_empty(v);
    }
    if let Some(v) = file_cfg.surface_doctor_refresh_errors {
        config.surface_doctor_refresh_errors = v;
    }
    if let Some(v) = file_cfg.department {
        config.initial_settings.department = v;
    }
    if let Some(v) = file_cfg.doctor {
        config.initial_settings.doctor = v;
    }
    if let Some(v) = file_cfg.document_type {
        config.initial_settings.document_type = v;
    }
    if let Some(v) = file_cfg.model {
        config.initial_settings.model = v;
    }
    config.purpose_mapping.extend(file_cfg.purpose_mapping);

    Ok(())
}

fn apply_env_overrides(
    config: &mut ClientConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = env("MEDIDOCS_BASE_URL") {
        config.base_url = parse_base_url(&v)?;
    }
    if let Some(v) = env("APP__BASE_URL") {
        config.base_url = parse_base_url(&v)?;
    }

    if let Some(v) = env("MEDIDOCS_API_KEY") {
        config.api_key = non_empty(v);
    }
    if let Some(v) = env("APP__API_KEY") {
        config.api_key = non_empty(v);
    }

    if let Some(v) = env("APP__CSRF_TOKEN") {
        config.csrf_token = non_empty(v);
    }

    if let Some(v) = env("APP__SURFACE_DOCTOR_REFRESH_ERRORS") {
        match v.trim().parse::<bool>() {
            Ok(parsed) => config.surface_doctor_refresh_errors = parsed,
            Err(_) => warn!(
                value = %v,
                "config: ignoring non-boolean APP__SURFACE_DOCTOR_REFRESH_ERRORS"
            ),
        }
    }

    Ok(())
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid base url '{raw}'"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("unsupported base url scheme '{other}' in '{raw}'")),
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
