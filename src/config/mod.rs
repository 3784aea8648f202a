use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const MASK: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub bloodhound: BloodHoundConfig,
    pub soar: SoarConfig,
    pub poll: PollConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BloodHoundConfig {
    pub base_url: String,
    pub token_id: String,
    pub token_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoarConfig {
    pub base_url: String,
    pub auth_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<u64>,
    pub container_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_containers: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_artifacts: Option<u64>,
    pub request_timeout_secs: u64,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            bloodhound: BloodHoundConfig {
                base_url: String::new(),
                token_id: String::new(),
                token_key: String::new(),
            },
            soar: SoarConfig {
                base_url: String::new(),
                auth_token: String::new(),
                asset_id: None,
                container_label: "events".to_string(),
            },
            poll: PollConfig {
                max_containers: None,
                max_artifacts: None,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
        }
    }
}

impl EffectiveConfig {
    /// Copy safe to print: secrets are replaced when set, left empty when not.
    pub fn masked(&self) -> Self {
        let mut cfg = self.clone();
        mask(&mut cfg.bloodhound.token_key);
        mask(&mut cfg.soar.auth_token);
        cfg
    }

    pub fn require_bloodhound(&self) -> Result<&BloodHoundConfig> {
        let bh = &self.bloodhound;
        let missing: Vec<&str> = [
            ("bloodhound.base_url", &bh.base_url),
            ("bloodhound.token_id", &bh.token_id),
            ("bloodhound.token_key", &bh.token_key),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            anyhow::bail!("必須の設定がありません: {}", missing.join(", "));
        }
        Ok(bh)
    }

    pub fn require_soar(&self) -> Result<(&SoarConfig, u64)> {
        let soar = &self.soar;
        let mut missing = Vec::new();
        if soar.base_url.trim().is_empty() {
            missing.push("soar.base_url");
        }
        if soar.auth_token.trim().is_empty() {
            missing.push("soar.auth_token");
        }
        let Some(asset_id) = soar.asset_id else {
            missing.push("soar.asset_id");
            anyhow::bail!("必須の設定がありません: {}", missing.join(", "));
        };
        if !missing.is_empty() {
            anyhow::bail!("必須の設定がありません: {}", missing.join(", "));
        }
        Ok((soar, asset_id))
    }
}

fn mask(secret: &mut String) {
    if !secret.is_empty() {
        *secret = MASK.to_string();
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    bloodhound: Option<RawBloodHoundConfig>,
    soar: Option<RawSoarConfig>,
    poll: Option<RawPollConfig>,
}

#[derive(Debug, Deserialize)]
struct RawBloodHoundConfig {
    base_url: Option<String>,
    token_id: Option<String>,
    token_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSoarConfig {
    base_url: Option<String>,
    auth_token: Option<String>,
    asset_id: Option<u64>,
    container_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPollConfig {
    max_containers: Option<u64>,
    max_artifacts: Option<u64>,
    request_timeout_secs: Option<u64>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/bhpoll/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    } else if config_path.is_some() {
        anyhow::bail!("設定ファイルが見つかりません: {}", path.display());
    }

    apply_env_overrides(&mut cfg)?;

    if cfg.poll.request_timeout_secs == 0 {
        anyhow::bail!("poll.request_timeout_secs は 0 より大きい必要があります");
    }

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(bh) = raw.bloodhound {
        if let Some(base_url) = bh.base_url {
            cfg.bloodhound.base_url = base_url;
        }
        if let Some(token_id) = bh.token_id {
            cfg.bloodhound.token_id = token_id;
        }
        if let Some(token_key) = bh.token_key {
            cfg.bloodhound.token_key = token_key;
        }
    }

    if let Some(soar) = raw.soar {
        if let Some(base_url) = soar.base_url {
            cfg.soar.base_url = base_url;
        }
        if let Some(auth_token) = soar.auth_token {
            cfg.soar.auth_token = auth_token;
        }
        if soar.asset_id.is_some() {
            cfg.soar.asset_id = soar.asset_id;
        }
        if let Some(container_label) = soar.container_label {
            cfg.soar.container_label = container_label;
        }
    }

    if let Some(poll) = raw.poll {
        if poll.max_containers.is_some() {
            cfg.poll.max_containers = poll.max_containers;
        }
        if poll.max_artifacts.is_some() {
            cfg.poll.max_artifacts = poll.max_artifacts;
        }
        if let Some(request_timeout_secs) = poll.request_timeout_secs {
            cfg.poll.request_timeout_secs = request_timeout_secs;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    override_string("BHPOLL_BLOODHOUND_BASE_URL", &mut cfg.bloodhound.base_url);
    override_string("BHPOLL_BLOODHOUND_TOKEN_ID", &mut cfg.bloodhound.token_id);
    override_string("BHPOLL_BLOODHOUND_TOKEN_KEY", &mut cfg.bloodhound.token_key);
    override_string("BHPOLL_SOAR_BASE_URL", &mut cfg.soar.base_url);
    override_string("BHPOLL_SOAR_AUTH_TOKEN", &mut cfg.soar.auth_token);
    override_string(
        "BHPOLL_SOAR_CONTAINER_LABEL",
        &mut cfg.soar.container_label,
    );

    if let Ok(v) = std::env::var("BHPOLL_SOAR_ASSET_ID") {
        cfg.soar.asset_id = Some(parse_u64(&v).with_context(|| "BHPOLL_SOAR_ASSET_ID")?);
    }
    if let Ok(v) = std::env::var("BHPOLL_POLL_MAX_CONTAINERS") {
        cfg.poll.max_containers = parse_limit(&v).with_context(|| "BHPOLL_POLL_MAX_CONTAINERS")?;
    }
    if let Ok(v) = std::env::var("BHPOLL_POLL_MAX_ARTIFACTS") {
        cfg.poll.max_artifacts = parse_limit(&v).with_context(|| "BHPOLL_POLL_MAX_ARTIFACTS")?;
    }
    if let Ok(v) = std::env::var("BHPOLL_POLL_REQUEST_TIMEOUT_SECS") {
        cfg.poll.request_timeout_secs =
            parse_u64(&v).with_context(|| "BHPOLL_POLL_REQUEST_TIMEOUT_SECS")?;
    }

    Ok(())
}

fn override_string(key: &str, slot: &mut String) {
    if let Ok(v) = std::env::var(key) {
        let v = v.trim();
        if !v.is_empty() {
            *slot = v.to_string();
        }
    }
}

fn parse_u64(s: &str) -> Result<u64> {
    let s = s.trim();
    s.parse::<u64>()
        .map_err(|_| anyhow::anyhow!("数値が不正です: {s}"))
}

/// Empty or `none` clears the limit.
fn parse_limit(s: &str) -> Result<Option<u64>> {
    let t = s.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_u64(t).map(Some)
}
