//! Seed campaigns: one simulation template run over a range of seeds.
//!
//! A failing seed is replayed with [`replay_seed`] using the same
//! template, which reproduces the run exactly.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::oracle::InvariantViolation;
use crate::{SimulationConfig, SimulationResult, Simulator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Campaign {
    pub seeds: Range<u64>,
    /// Every seed runs this config with only `seed` replaced.
    pub template: SimulationConfig,
}

impl Default for Campaign {
    fn default() -> Self {
        Self::new(0..100, SimulationConfig::default())
    }
}

impl Campaign {
    #[must_use]
    pub const fn new(seeds: Range<u64>, template: SimulationConfig) -> Self {
        Self { seeds, template }
    }

    #[must_use]
    pub const fn config_for(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            ..self.template
        }
    }

    /// Reject empty ranges and templates that cannot run.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first bad parameter.
    pub fn check(&self) -> Result<()> {
        if self.seeds.is_empty() {
            bail!("seed range {:?} is empty", self.seeds);
        }
        check_template(&self.template)
    }
}

fn check_template(t: &SimulationConfig) -> Result<()> {
    if t.client_count == 0 {
        bail!("a campaign needs at least one client");
    }
    if t.rounds == 0 {
        bail!("a campaign needs at least one round");
    }
    let percents = [
        ("flush", t.flush_percent),
        ("duplicate", t.fault.duplicate_rate_percent),
        ("reorder", t.fault.reorder_rate_percent),
        ("write failure", t.fault.write_failure_percent),
    ];
    if let Some((name, pct)) = percents.into_iter().find(|(_, pct)| *pct > 100) {
        bail!("{name} rate is {pct}%, expected 0..=100");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<InvariantViolation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    /// Failed seeds in ascending seed order.
    pub failures: Vec<SeedFailure>,
    /// Seeds whose run parked an event or shuffled a delivery round.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn seeds_passed(&self) -> usize {
        self.seeds_run.saturating_sub(self.failures.len())
    }

    #[must_use]
    pub fn first_failure(&self) -> Option<u64> {
        self.failures.first().map(|f| f.seed)
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One seed's config and full result.
#[derive(Debug, Clone, Serialize)]
pub struct Replay {
    pub config: SimulationConfig,
    pub result: SimulationResult,
}

impl Replay {
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result.oracle.passed
    }

    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.result.oracle.violations
    }
}

/// Run every seed of `campaign`.
///
/// # Errors
///
/// Returns an error if the campaign fails [`Campaign::check`] or a
/// simulation cannot start. Oracle failures are reported, not returned.
pub fn run_campaign(campaign: &Campaign) -> Result<CampaignReport> {
    campaign.check()?;

    let mut report = CampaignReport::default();
    for seed in campaign.seeds.clone() {
        let result = Simulator::new(campaign.config_for(seed))?.run()?;
        report.seeds_run += 1;
        report.interesting_states_reached += usize::from(result.interesting_state_reached);

        if result.oracle.passed {
            debug!(seed, "seed converged");
            continue;
        }
        warn!(seed, violations = result.oracle.violations.len(), "seed diverged");
        report.failures.push(SeedFailure {
            seed,
            violations: result.oracle.violations,
        });
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed(),
        "campaign finished"
    );
    Ok(report)
}

/// Rerun one seed under `campaign`'s template. The seed does not have to
/// lie inside the campaign's range.
///
/// # Errors
///
/// Returns an error if the template is invalid or the simulation cannot
/// start.
pub fn replay_seed(campaign: &Campaign, seed: u64) -> Result<Replay> {
    check_template(&campaign.template)?;
    let config = campaign.config_for(seed);
    let result = Simulator::new(config)?.run()?;
    Ok(Replay { config, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TraceEventKind;
    use crate::feed::FaultConfig;
    use lanes_core::model::Table;

    fn campaign(seeds: Range<u64>, rounds: u64) -> Campaign {
        Campaign::new(
            seeds,
            SimulationConfig {
                rounds,
                ..SimulationConfig::default()
            },
        )
    }

    #[test]
    fn default_campaign_checks_out() {
        assert!(Campaign::default().check().is_ok());
    }

    #[test]
    fn bad_templates_are_rejected() {
        let empty = campaign(5..5, 10);
        assert!(format!("{:#}", empty.check().expect_err("empty")).contains("empty"));

        let mut no_clients = campaign(0..1, 10);
        no_clients.template.client_count = 0;
        assert!(no_clients.check().is_err());

        assert!(campaign(0..1, 0).check().is_err());

        let mut bad_rate = campaign(0..1, 10);
        bad_rate.template.fault.reorder_rate_percent = 101;
        let err = bad_rate.check().expect_err("over 100");
        assert!(format!("{err:#}").contains("reorder"));
    }

    #[test]
    fn config_for_only_replaces_the_seed() {
        let c = campaign(0..10, 7);
        let sim = c.config_for(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.rounds, 7);
        assert_eq!(sim.fault, c.template.fault);
    }

    #[test]
    fn every_seed_converges_under_feed_faults() {
        // Delay, reorder and duplication never lose an event, so the final
        // drain brings every client level with storage.
        let report = run_campaign(&campaign(0..25, 16)).expect("campaign runs");
        assert_eq!(report.seeds_run, 25);
        assert!(
            report.all_passed(),
            "first failure at {:?}: {:?}",
            report.first_failure(),
            report.failures.first(),
        );
        assert_eq!(report.seeds_passed(), 25);
    }

    #[test]
    fn write_failure_campaign_converges() {
        let mut c = campaign(100..110, 12);
        c.template.fault = FaultConfig {
            write_failure_percent: 30,
            ..FaultConfig::default()
        };
        let report = run_campaign(&c).expect("campaign runs");
        assert!(report.all_passed(), "{:?}", report.failures);
    }

    #[test]
    fn replay_outside_the_range_is_allowed() {
        let replay = replay_seed(&campaign(0..1, 12), 42).expect("replay runs");
        assert_eq!(replay.config.seed, 42);
        assert!(
            replay
                .result
                .trace
                .iter()
                .any(|e| matches!(e.kind, TraceEventKind::Deliver { .. }))
        );
        assert!(replay.passed(), "{:?}", replay.violations());
    }

    #[test]
    fn replays_are_identical() {
        let mut c = campaign(0..1, 16);
        c.template.client_count = 4;
        let a = replay_seed(&c, 7).expect("first");
        let b = replay_seed(&c, 7).expect("second");
        assert_eq!(a.result.trace, b.result.trace);
        assert_eq!(a.result.stats, b.result.stats);
        assert_eq!(a.result.trace_fingerprint(), b.result.trace_fingerprint());
    }

    #[test]
    fn heavy_faults_reach_interesting_states() {
        let mut c = campaign(0..20, 16);
        c.template.fault.duplicate_rate_percent = 15;
        c.template.fault.reorder_rate_percent = 40;
        let report = run_campaign(&c).expect("campaign runs");
        assert!(report.interesting_states_reached > 0);
    }

    #[test]
    fn report_serializes_structured_violations() {
        let report = CampaignReport {
            seeds_run: 3,
            failures: vec![SeedFailure {
                seed: 2,
                violations: vec![InvariantViolation::Missing {
                    client: 1,
                    table: Table::Tasks,
                    id: "t1".into(),
                }],
            }],
            interesting_states_reached: 1,
        };
        assert_eq!(report.seeds_passed(), 2);
        assert_eq!(report.first_failure(), Some(2));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["failures"][0]["violations"][0]["kind"], "missing");
        assert_eq!(json["failures"][0]["violations"][0]["table"], "tasks");
    }
}
