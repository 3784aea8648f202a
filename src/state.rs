use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::PollSummary;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollState {
    #[serde(default)]
    pub last_poll_started_at: Option<String>,
    #[serde(default)]
    pub last_poll_finished_at: Option<String>,
    #[serde(default)]
    pub last_summary: Option<PollSummary>,
}

/// Host-owned persistence hooks, loaded before and saved after every poll.
pub trait StateStore {
    fn load(&self) -> Result<PollState>;
    fn save(&self, state: &PollState) -> Result<()>;
}

pub fn default_state_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/bhpoll/state.json")
}

#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<PollState> {
        if !self.path.exists() {
            return Ok(PollState::default());
        }
        let bytes = std::fs::read(&self.path).with_context(|| {
            format!("状態ファイルの読み取りに失敗しました: {}", self.path.display())
        })?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("状態ファイルの解析に失敗しました: {}", self.path.display()))
    }

    fn save(&self, state: &PollState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("状態ディレクトリの作成に失敗しました: {}", parent.display())
            })?;
        }
        let buf = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, buf)
            .with_context(|| format!("状態ファイルの書き込みに失敗しました: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("状態ファイルの書き込みに失敗しました: {}", self.path.display()))
    }
}
