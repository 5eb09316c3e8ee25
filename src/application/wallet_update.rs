//! "Update wallets" action
//!
//! Wallet capability data is merged into the catalogs only while nothing
//! scans them: every running scope is hard-stopped first, then the resolver
//! runs over each scope's catalog and the result is saved back.

use crate::application::catalog::{CatalogError, CatalogRepository};
use crate::application::run_state::RunStateController;
use crate::application::wallet_resolver::{self, MergeReport};
use crate::domain::Scope;

#[derive(Debug, Clone, Default)]
pub struct WalletUpdateReport {
    /// Scopes that were running and got hard-stopped
    pub stopped: Vec<Scope>,
    /// Merge result per scope with a non-empty catalog
    pub merged: Vec<(Scope, MergeReport)>,
}

impl WalletUpdateReport {
    pub fn total(&self) -> MergeReport {
        let mut total = MergeReport::default();
        for (_, report) in &self.merged {
            total.merge(report.clone());
        }
        total
    }
}

pub async fn update_wallets(
    controller: &RunStateController,
    catalogs: &CatalogRepository,
) -> Result<WalletUpdateReport, CatalogError> {
    let mut report = WalletUpdateReport {
        stopped: controller.running_scopes().await,
        merged: Vec::new(),
    };

    for scope in &report.stopped {
        controller.stop_hard(scope).await;
    }

    let wallets = catalogs.load_wallet_store().await?;
    if wallets.is_empty() {
        tracing::warn!("Wallet status store is empty, nothing to merge");
        return Ok(report);
    }

    let scopes = std::iter::once(Scope::Multichain)
        .chain(controller.chains().chain_ids().map(Scope::chain));

    for scope in scopes {
        let mut tokens = catalogs.load(&scope).await?;
        if tokens.is_empty() {
            continue;
        }

        let merge = wallet_resolver::apply(&wallets, &mut tokens, controller.chains());
        catalogs.save(&scope, &tokens).await?;

        tracing::info!(
            "Wallet status merged into {}: {} matched, {} missed",
            scope,
            merge.matched_count(),
            merge.missed_count()
        );
        report.merged.push((scope, merge));
    }

    Ok(report)
}
