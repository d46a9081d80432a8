//! Offline Repair Pass
//!
//! Walks every stored instance in key order and brings it back in line with
//! the ownership rules: normalizes flags, deletes instances that end up
//! owning nothing, then re-runs registration and tag synchronization. Used by
//! the `pokesync-backfill` binary after rule changes or manual data fixes.

use crate::constants::DEFAULT_BACKFILL_BATCH_SIZE;
use crate::relations::RelationSync;
use pokesync_core::PipelineResult;
use pokesync_storage::IngestStore;
use std::sync::Arc;

/// Options for one repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillConfig {
    /// Instances fetched per page (default: 500)
    pub batch_size: usize,
    /// Skip normalization; only re-sync tag links
    pub tags_only: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BACKFILL_BATCH_SIZE,
            tags_only: false,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: u64,
    /// Instances whose stored flags differed from their normalized form
    pub normalized: u64,
    pub updated: u64,
    pub deleted: u64,
    pub tag_links_removed: u64,
    pub tag_links_upserted: u64,
    pub registrations_added: u64,
}

impl std::fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "scanned:             {}", self.scanned)?;
        writeln!(f, "normalized:          {}", self.normalized)?;
        writeln!(f, "updated:             {}", self.updated)?;
        writeln!(f, "deleted:             {}", self.deleted)?;
        writeln!(f, "tag links removed:   {}", self.tag_links_removed)?;
        writeln!(f, "tag links upserted:  {}", self.tag_links_upserted)?;
        write!(f, "registrations added: {}", self.registrations_added)
    }
}

/// Run the repair pass over the whole store. Stops at the first store error.
pub async fn run_backfill<S>(store: Arc<S>, config: BackfillConfig) -> PipelineResult<BackfillReport>
where
    S: IngestStore,
{
    let relations = RelationSync::new(Arc::clone(&store));
    let batch_size = config.batch_size.max(1);
    let mut report = BackfillReport::default();
    let mut after: Option<String> = None;

    loop {
        let page = store.instance_scan(after.as_deref(), batch_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.instance_id.clone());
        let page_len = page.len();

        for mut instance in page {
            report.scanned += 1;

            if config.tags_only {
                let tags = relations.sync_tags(&instance).await?;
                report.tag_links_removed += tags.links_removed;
                report.tag_links_upserted += tags.links_upserted;
                continue;
            }

            let normalized = instance.flags.normalized();
            let changed = normalized != instance.flags;
            if changed {
                report.normalized += 1;
            }

            if normalized.is_unowned() {
                store.instance_delete(&instance.instance_id).await?;
                report.tag_links_removed += relations.clear_tags(&instance.instance_id).await?;
                report.deleted += 1;
                tracing::debug!(instance_id = %instance.instance_id, "Unowned instance removed");
                continue;
            }

            if changed {
                instance.flags = normalized;
                if store.instance_replace(&instance).await? {
                    report.updated += 1;
                }
            }

            let relation = relations.sync_instance(&instance).await?;
            if relation.registration_added {
                report.registrations_added += 1;
            }
            report.tag_links_removed += relation.tags.links_removed;
            report.tag_links_upserted += relation.tags.links_upserted;
        }

        tracing::info!(scanned = report.scanned, "Backfill page processed");
        if page_len < batch_size {
            break;
        }
    }

    Ok(report)
}
