use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Serialize;
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use crate::api::{BloodHoundClient, HttpTransport, Transport};
use crate::asset::AssetInformation;
use crate::config::EffectiveConfig;
use crate::core::PollSummary;
use crate::exit;
use crate::logs::PollRunOutcome;
use crate::poll::{PollController, PollLimits};
use crate::signer::RequestSigner;
use crate::state::{FileStateStore, StateStore};
use crate::store::{CaseStore, DedupStore, MemoryCaseStore, SoarStore};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub timeout: Duration,
    pub show_progress: bool,
    /// Offset used for the signed `RequestDate` header.
    pub local_offset: UtcOffset,
}

pub struct Engine {
    opts: EngineOptions,
    home_dir: PathBuf,
    config: EffectiveConfig,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PollRequest {
    pub limits: PollLimits,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollReport {
    #[serde(flatten)]
    pub summary: PollSummary,
    pub dry_run: bool,
    pub log_path: String,
}

impl Engine {
    pub fn new(config: EffectiveConfig, home_dir: PathBuf, opts: EngineOptions) -> Self {
        Self {
            opts,
            home_dir,
            config,
        }
    }

    fn bloodhound(&self) -> Result<BloodHoundClient<HttpTransport>> {
        let bh = self
            .config
            .require_bloodhound()
            .map_err(exit::invalid_args_err)?;
        let signer = RequestSigner::new(bh.token_id.trim(), bh.token_key.trim())
            .with_offset(self.opts.local_offset);
        let transport = HttpTransport::new(&bh.base_url, signer, self.opts.timeout)?;
        debug!(base_url = transport.base_url(), timeout = ?self.opts.timeout, "bloodhound client ready");
        Ok(BloodHoundClient::new(transport))
    }

    pub fn test_connectivity(&self) -> Result<Value> {
        let client = self.bloodhound()?;
        client
            .version()
            .context("接続テストに失敗しました")
            .map_err(exit::upstream_err)
    }

    pub fn poll(&self, req: PollRequest) -> Result<PollReport> {
        let client = self.bloodhound()?;
        let label = self.config.soar.container_label.clone();
        if req.dry_run {
            return self.poll_into(&client, MemoryCaseStore::default(), &label, req);
        }
        let (soar, asset_id) = self.config.require_soar().map_err(exit::invalid_args_err)?;
        let store = SoarStore::new(&soar.base_url, &soar.auth_token, asset_id, self.opts.timeout)?;
        self.poll_into(&client, store, &label, req)
    }

    fn poll_into<T: Transport, S: CaseStore>(
        &self,
        client: &BloodHoundClient<T>,
        store: S,
        label: &str,
        req: PollRequest,
    ) -> Result<PollReport> {
        let state = FileStateStore::new(crate::state::default_state_path(&self.home_dir));
        let mut dedup = DedupStore::new(store);

        let pb = self.spinner("ポーリング中...");
        let started_at = OffsetDateTime::now_utc();
        let result = run_poll(client, &mut dedup, &state, label, req.limits, pb.clone());
        let finished_at = OffsetDateTime::now_utc();
        pb.finish_and_clear();

        let outcome = match &result {
            Ok(summary) => PollRunOutcome::Finished(summary),
            Err(err) => PollRunOutcome::Failed(err),
        };
        let log_path = crate::logs::write_poll_log(
            &self.home_dir,
            started_at,
            finished_at,
            req.limits,
            req.dry_run,
            outcome,
        );

        match (result, log_path) {
            (Ok(summary), Ok(log_path)) => Ok(PollReport {
                summary,
                dry_run: req.dry_run,
                log_path: crate::logs::display_path(&log_path, &self.home_dir),
            }),
            (Ok(_), Err(log_err)) => Err(anyhow::anyhow!(
                "ポーリングは終了しましたが、ログの書き込みに失敗しました: {log_err}"
            )),
            (Err(err), Ok(log_path)) => Err(err.context(format!(
                "ポーリングに失敗しました（ログ: {}）",
                crate::logs::display_path(&log_path, &self.home_dir)
            ))),
            (Err(err), Err(log_err)) => Err(err.context(format!(
                "ポーリングに失敗しました。さらにログの書き込みにも失敗しました: {log_err}"
            ))),
        }
    }

    pub fn asset(&self, object_id: &str) -> Result<Option<AssetInformation>> {
        let client = self.bloodhound()?;
        crate::asset::fetch_asset_information(&client, object_id)
            .with_context(|| format!("オブジェクト情報の取得に失敗しました: {object_id}"))
            .map_err(exit::upstream_err)
    }

    pub fn path_exists(&self, start_node: &str, end_node: &str) -> Result<bool> {
        let client = self.bloodhound()?;
        Ok(crate::asset::does_path_exist(&client, start_node, end_node))
    }

    pub fn object_id(&self, name: &str) -> Result<Option<String>> {
        let client = self.bloodhound()?;
        crate::asset::get_object_id(&client, name)
            .with_context(|| format!("オブジェクトIDの検索に失敗しました: {name}"))
            .map_err(exit::upstream_err)
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        use std::io::IsTerminal;
        if !(self.opts.show_progress && std::io::stderr().is_terminal()) {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }
}

/// One poll against any transport and case store, bracketed by the state hooks.
/// Unreadable state starts from scratch and a failed save is only logged, so
/// neither blocks ingestion.
pub fn run_poll<T: Transport, S: CaseStore, St: StateStore>(
    client: &BloodHoundClient<T>,
    dedup: &mut DedupStore<S>,
    state_store: &St,
    container_label: &str,
    limits: PollLimits,
    progress: ProgressBar,
) -> Result<PollSummary> {
    let mut state = state_store.load().unwrap_or_else(|err| {
        warn!(error = %format!("{err:#}"), "ignoring unreadable poll state");
        Default::default()
    });
    if let Some(previous) = &state.last_poll_finished_at {
        info!(previous = %previous, "previous poll finished");
    }
    state.last_poll_started_at = Some(now_rfc3339());

    let summary = PollController::new(client, dedup, container_label)
        .with_progress(progress)
        .drive(limits)?;

    state.last_poll_finished_at = Some(now_rfc3339());
    state.last_summary = Some(summary.clone());
    if let Err(err) = state_store.save(&state) {
        warn!(error = %format!("{err:#}"), "failed to save poll state");
    }
    Ok(summary)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}
