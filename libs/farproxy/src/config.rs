// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-context configuration via `farproxy.yaml` and environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FarProxyError, Result};
use crate::ids::ContextId;

/// Configuration for one [`ClientContext`](crate::ClientContext).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Stable context id. Generated when absent.
    pub context_id: Option<String>,

    /// Send the caller's source location with entry requests.
    pub capture_call_sites: bool,

    /// Bound on blocking requests over [`ChannelTransport`](crate::ChannelTransport).
    pub request_timeout_ms: Option<u64>,

    /// Log every callback still registered when the context is released.
    pub report_leaked_callbacks: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_id: None,
            capture_call_sites: false,
            request_timeout_ms: None,
            report_leaked_callbacks: true,
        }
    }
}

impl ContextConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "farproxy.yaml";

    pub const ENV_CONTEXT_ID: &'static str = "FARPROXY_CONTEXT_ID";
    pub const ENV_CAPTURE_CALL_SITES: &'static str = "FARPROXY_CAPTURE_CALL_SITES";
    pub const ENV_REQUEST_TIMEOUT_MS: &'static str = "FARPROXY_REQUEST_TIMEOUT_MS";

    /// Load configuration from a directory. Returns error if the file is
    /// missing or cannot be parsed.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            FarProxyError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            FarProxyError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;

        tracing::info!("Loaded context config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a directory, returning defaults if the file is
    /// missing or unparseable.
    pub fn load_or_default(dir: &Path) -> Self {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                dir.display()
            );
            return Self::default();
        }

        match Self::load(dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Apply `FARPROXY_*` environment variables on top of this configuration.
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var(Self::ENV_CONTEXT_ID) {
            if !id.is_empty() {
                self.context_id = Some(id);
            }
        }

        if let Ok(raw) = std::env::var(Self::ENV_CAPTURE_CALL_SITES) {
            match parse_flag(&raw) {
                Some(flag) => self.capture_call_sites = flag,
                None => tracing::warn!(
                    "Ignoring {}={:?}: expected a boolean",
                    Self::ENV_CAPTURE_CALL_SITES,
                    raw
                ),
            }
        }

        if let Ok(raw) = std::env::var(Self::ENV_REQUEST_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.request_timeout_ms = Some(ms),
                Err(e) => tracing::warn!(
                    "Ignoring {}={:?}: {}",
                    Self::ENV_REQUEST_TIMEOUT_MS,
                    raw,
                    e
                ),
            }
        }

        self
    }

    /// The configured context id, or a freshly generated one.
    pub fn context_id(&self) -> ContextId {
        match &self.context_id {
            Some(id) => ContextId::from(id.as_str()),
            None => ContextId::generate(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
