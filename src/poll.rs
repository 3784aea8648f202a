use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{BloodHoundClient, Transport};
use crate::core::{Domain, Finding, PollSummary, SkippedUnit};
use crate::fetcher::PaginatedFetcher;
use crate::store::{CaseStore, DedupStore, UpsertStatus};
use crate::transform::FindingTransformer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollLimits {
    pub max_containers: Option<u64>,
    pub max_artifacts: Option<u64>,
}

impl PollLimits {
    pub fn reached(&self, tally: &Tally) -> bool {
        self.max_containers.is_some_and(|max| tally.created >= max)
            || self.max_artifacts.is_some_and(|max| tally.artifacts >= max)
    }
}

/// Running totals for one poll; never reset between domains or types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub created: u64,
    pub updated: u64,
    pub failed: u64,
    pub artifacts: u64,
    pub merged: u64,
}

pub struct PollController<'a, T, S> {
    client: &'a BloodHoundClient<T>,
    transformer: FindingTransformer<'a, T>,
    dedup: &'a mut DedupStore<S>,
    progress: ProgressBar,
}

impl<'a, T: Transport, S: CaseStore> PollController<'a, T, S> {
    pub fn new(
        client: &'a BloodHoundClient<T>,
        dedup: &'a mut DedupStore<S>,
        container_label: impl Into<String>,
    ) -> Self {
        Self {
            client,
            transformer: FindingTransformer::new(client, container_label),
            dedup,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Walks domains, then finding types, then findings. Only the domain listing is
    /// fatal; a failing domain or type is recorded in the summary and skipped.
    pub fn drive(&mut self, limits: PollLimits) -> Result<PollSummary> {
        let client = self.client;
        let domains = client
            .available_domains()
            .context("available-domains の取得に失敗しました")?;
        if domains.is_empty() {
            bail!("No domains found in response");
        }
        info!(domains = domains.len(), "found available domains");

        let fetcher = PaginatedFetcher::new(client);
        let mut tally = Tally::default();
        let mut skipped = Vec::new();
        let mut domains_scanned = 0;
        let mut limit_reached = false;

        'domains: for domain in &domains {
            domains_scanned += 1;
            let types = match fetcher.list_types(&domain.id) {
                Ok(types) => types,
                Err(err) => {
                    warn!(domain_id = %domain.id, error = %err, "skipping domain: type listing failed");
                    skipped.push(skipped_unit(domain, None, err.to_string()));
                    continue;
                }
            };

            for finding_type in &types {
                self.progress
                    .set_message(format!("{} / {finding_type}", domain.name));
                let findings = match fetcher.fetch_all(&domain.id, finding_type) {
                    Ok(findings) => findings,
                    Err(err) => {
                        warn!(
                            domain_id = %domain.id,
                            finding_type = %finding_type,
                            error = %err,
                            "skipping finding type: page fetch failed"
                        );
                        skipped.push(skipped_unit(domain, Some(finding_type), err.to_string()));
                        continue;
                    }
                };

                for finding in &findings {
                    self.ingest(finding, &domain.name, &mut tally);
                    self.progress.inc(1);
                    if limits.reached(&tally) {
                        limit_reached = true;
                        break 'domains;
                    }
                }
            }
        }

        if let Some(max) = limits.max_artifacts {
            if tally.artifacts > max {
                info!(
                    extra = tally.artifacts - max,
                    "extra artifacts were created to keep container details complete"
                );
            }
        }
        if tally.updated > 0 {
            info!(updated = tally.updated, "findings were already ingested and got updated");
        }

        let summary = PollSummary {
            created: tally.created,
            updated: tally.updated,
            failed: tally.failed,
            artifacts: tally.artifacts,
            artifacts_merged: tally.merged,
            domains_available: domains.len() as u64,
            domains_scanned,
            limit_reached,
            skipped,
            message: format!(
                "Found {} findings from {} available domains",
                tally.created,
                domains.len()
            ),
        };
        info!(
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed,
            domains_scanned = summary.domains_scanned,
            "finished poll"
        );
        Ok(summary)
    }

    fn ingest(&mut self, finding: &Finding, domain_name: &str, tally: &mut Tally) {
        let identifier = match self.transformer.container_identifier(finding, domain_name) {
            Ok(identifier) => identifier,
            Err(err) => {
                warn!(finding_id = %finding.id, error = %err, "skipping finding: title lookup failed");
                tally.failed += 1;
                return;
            }
        };

        let existing = self.dedup.find(&identifier);
        let outcome = self
            .transformer
            .build_container(finding, domain_name, existing.is_none())
            .map_err(anyhow::Error::from)
            .and_then(|container| {
                let artifacts = self.transformer.build_artifacts(finding);
                Ok(self.dedup.upsert_found(existing, container, artifacts)?)
            });

        match outcome {
            Ok(outcome) => {
                debug!(
                    finding_id = %finding.id,
                    container_id = outcome.container_id,
                    status = ?outcome.status,
                    artifacts = outcome.artifacts,
                    merged = outcome.merged,
                    "ingested finding"
                );
                match outcome.status {
                    UpsertStatus::Created => tally.created += 1,
                    UpsertStatus::Updated => tally.updated += 1,
                }
                tally.artifacts += outcome.artifacts;
                tally.merged += outcome.merged;
            }
            Err(err) => {
                warn!(finding_id = %finding.id, identifier = %identifier, error = %err, "failed to ingest finding");
                tally.failed += 1;
            }
        }
    }
}

fn skipped_unit(domain: &Domain, finding_type: Option<&String>, error: String) -> SkippedUnit {
    SkippedUnit {
        domain_id: domain.id.clone(),
        domain_name: domain.name.clone(),
        finding_type: finding_type.cloned(),
        error,
    }
}
