//! AML and KYC screening simulator.
//!
//! Each screening checks the party against every configured watchlist. A
//! partial match occurs at `hit_rate` against one list picked uniformly.
//! Matches on OFAC lists are hard hits and reject the transaction; other
//! matches are recorded for manual review and let it through.

use fnb_core::rng::SimRng;
use fnb_core::span::Attributes;
use tracing::{info, warn};

use crate::call::{BackendCallResult, BackendRequest};
use crate::capability::{Backend, Capability};
use crate::config::ScreeningConfig;
use crate::error::BackendError;
use crate::stats::SimulatorStats;

use super::{ensure_owned, server_context};

/// Watchlist match found during a screening.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistMatch {
    pub watchlist: String,
    pub score: f64,
    pub hard: bool,
}

impl WatchlistMatch {
    /// `EXACT` above 0.90, `PARTIAL` otherwise
    pub fn match_type(&self) -> &'static str {
        if self.score > 0.90 {
            "EXACT"
        } else {
            "PARTIAL"
        }
    }
}

#[derive(Debug, Default)]
pub struct ScreeningSimulator {
    config: ScreeningConfig,
    stats: SimulatorStats,
}

impl ScreeningSimulator {
    pub fn new(config: ScreeningConfig) -> Self {
        Self {
            config,
            stats: SimulatorStats::default(),
        }
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn invoke(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
    ) -> Result<BackendCallResult, BackendError> {
        ensure_owned(Backend::Screening, request.capability)?;
        let context = server_context(request)?;

        let latency = rng.latency(self.config.latency);
        let screening_id = format!("SCR{:012X}", rng.int_inclusive(0, 0xFFFF_FFFF_FFFF));
        let kyc = request.capability == Capability::KycScreen;

        let hit = self.sample_match(rng);
        let mut attributes = Attributes::new()
            .with("aml.screening_id", screening_id.as_str())
            .with("aml.screening_type", if kyc { "KYC" } else { "TRANSACTION" })
            .with("aml.watchlists_checked", self.config.watchlists.len())
            .with("aml.match_found", hit.is_some())
            .with("aml.ofac_hit", hit.as_ref().is_some_and(|m| m.hard));

        match &hit {
            Some(m) => {
                attributes
                    .set("aml.watchlist", m.watchlist.as_str())
                    .set("aml.match_score", m.score)
                    .set("aml.match_type", m.match_type());
            }
            None => {
                attributes.set("aml.watchlist", "none");
            }
        }

        if kyc {
            let pep_match = rng.bernoulli(self.config.pep_rate);
            let media_hits = if rng.bernoulli(self.config.adverse_media_rate) {
                rng.int_inclusive(1, 3)
            } else {
                0
            };
            attributes
                .set("aml.kyc.pep_match", pep_match)
                .set("aml.kyc.adverse_media_hits", media_hits)
                .set(
                    "aml.kyc.overall_clear",
                    hit.is_none() && !pep_match && media_hits == 0,
                );
        }

        let mut result = BackendCallResult::ok(&request.step, request.capability, context, latency)
            .with_attributes(attributes);

        match hit {
            Some(m) if m.hard => {
                warn!(
                    correlation_id = %request.correlation_id,
                    screening_id = %screening_id,
                    watchlist = %m.watchlist,
                    match_score = m.score,
                    "Sanctions hit, transaction blocked"
                );
                result = result.rejected();
            }
            Some(m) => {
                info!(
                    correlation_id = %request.correlation_id,
                    screening_id = %screening_id,
                    watchlist = %m.watchlist,
                    match_score = m.score,
                    "Watchlist partial match referred for review"
                );
            }
            None => {}
        }

        self.stats.record(&result);
        Ok(result)
    }

    fn sample_match(&self, rng: &mut SimRng) -> Option<WatchlistMatch> {
        if !rng.bernoulli(self.config.hit_rate) {
            return None;
        }
        let watchlist = rng.pick(&self.config.watchlists)?.clone();
        let score = (rng.uniform(0.65, 0.95) * 1000.0).round() / 1000.0;
        let hard = watchlist.starts_with(&self.config.hard_hit_prefix);
        Some(WatchlistMatch {
            watchlist,
            score,
            hard,
        })
    }
}
