// src/simulator.rs
//
// One deterministic run: (scenario, seed) -> ordered series.
//
// `Simulator::new` does all validation and plan resolution (parameters,
// schedule, config overlay) up front; `run` is then a pure function of the
// seed. No I/O happens here besides what a caller-provided sink does.
//
// Day loop:
//   interventions(day) -> shock expiry(day) -> process step -> metrics
//   -> quarantine check(day) -> emit SeriesPoint

use tracing::debug;

use crate::config::Config;
use crate::error::{FabulaError, RunWarning};
use crate::metrics::evaluate;
use crate::process::{ExposureProcess, NoiseSource};
use crate::registry::{materialize_params, ModelRegistry};
use crate::scenario::{ScenarioSpec, StateSpec};
use crate::scheduler::InterventionScheduler;
use crate::state::SimulationState;
use crate::telemetry::{NoopSink, SeriesSink};
use crate::types::{Day, EntityKind, Era, ParamBindings, SeriesPoint};

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub seed: u64,
    pub series: Vec<SeriesPoint>,
    pub warnings: Vec<RunWarning>,
    /// Day on which quarantine latched, if it did.
    pub quarantined_on: Option<Day>,
}

impl RunOutput {
    pub fn last(&self) -> Option<&SeriesPoint> {
        self.series.last()
    }
}

/// A resolved, reusable run plan.
#[derive(Debug, Clone)]
pub struct Simulator {
    cfg: Config,
    title: String,
    days: Day,
    kind: EntityKind,
    era: Era,
    params: ParamBindings,
    /// The card's own bindings; schema defaults never seed the state.
    state_bindings: ParamBindings,
    schedule: InterventionScheduler,
    state_overrides: Option<StateSpec>,
    scenario_rho: Option<f64>,
    plan_warnings: Vec<RunWarning>,
}

impl Simulator {
    /// Validate `scenario` and resolve it against `cfg` and `registry`.
    ///
    /// Domain errors (negative days, repeats < 1) are returned here, before
    /// any state exists.
    pub fn new(
        cfg: &Config,
        scenario: &ScenarioSpec,
        registry: Option<&ModelRegistry>,
    ) -> Result<Self, FabulaError> {
        scenario.validate()?;
        let days =
            Day::try_from(scenario.days).map_err(|_| FabulaError::InvalidDays(scenario.days))?;

        let cfg = scenario.overlay_config(cfg);
        let (params, mut plan_warnings) = materialize_params(&scenario.entity, registry, None);
        let (schedule, schedule_warnings) =
            InterventionScheduler::build(&scenario.interventions, days);
        plan_warnings.extend(schedule_warnings);

        Ok(Self {
            cfg,
            title: scenario.title.clone(),
            days,
            kind: scenario.entity.kind,
            era: scenario.era(),
            params,
            state_bindings: scenario.entity.param_bindings.clone(),
            schedule,
            state_overrides: scenario.state.clone(),
            scenario_rho: scenario.k.as_ref().and_then(|k| k.rho),
            plan_warnings,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn days(&self) -> Day {
        self.days
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn era(&self) -> Era {
        self.era
    }

    /// Seed from the scenario's noise block, else the config default.
    pub fn default_seed(&self) -> u64 {
        self.cfg.noise.seed
    }

    pub fn default_repeats(&self) -> i64 {
        self.cfg.noise.repeats
    }

    pub fn initial_state(&self) -> SimulationState {
        SimulationState::initial(
            &self.cfg,
            &self.state_bindings,
            self.state_overrides.as_ref(),
            self.scenario_rho,
        )
    }

    pub fn run(&self, seed: u64) -> RunOutput {
        self.run_with_sink(seed, &mut NoopSink)
    }

    pub fn run_with_sink(&self, seed: u64, sink: &mut dyn SeriesSink) -> RunOutput {
        let process = ExposureProcess::new(&self.cfg);
        let mut noise = NoiseSource::new(seed, self.cfg.noise.sigma_e, self.cfg.noise.sigma_a);
        let mut st = self.initial_state();
        let mut warnings = self.plan_warnings.clone();
        let mut quarantined_on = None;
        let mut series = Vec::with_capacity(self.days as usize);

        for day in 0..self.days {
            self.schedule.apply_day(day, &mut st, &mut warnings);
            self.schedule.expire_shocks(day, &mut st);

            process.step(&mut st, &mut noise);

            let metrics = evaluate(self.kind, &st.to_params(&self.params), self.era);
            if self.schedule.check_quarantine(day, metrics.s, &mut st) {
                quarantined_on = Some(day);
            }

            let point = SeriesPoint {
                day,
                metrics,
                e: st.e,
                a: st.a,
                h: st.h,
                r: st.r,
                mw: st.mw,
                topo_state: st.topo,
                cvar: st.cvar_total(),
                input: st.last_input,
                quarantined: st.is_quarantined(),
            };
            sink.log_point(&point);
            series.push(point);
        }
        sink.flush();

        debug!(
            seed,
            days = self.days,
            warnings = warnings.len(),
            quarantined_on = ?quarantined_on,
            "run complete"
        );

        RunOutput {
            seed,
            series,
            warnings,
            quarantined_on,
        }
    }
}

/// Convenience: resolve and run once with the scenario's own seed.
pub fn simulate(
    cfg: &Config,
    scenario: &ScenarioSpec,
    registry: Option<&ModelRegistry>,
) -> Result<RunOutput, FabulaError> {
    let sim = Simulator::new(cfg, scenario, registry)?;
    Ok(sim.run(sim.default_seed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::VecSink;

    fn spec(json: &str) -> ScenarioSpec {
        ScenarioSpec::from_json_str(json).unwrap()
    }

    #[test]
    fn zero_days_yields_empty_series() {
        let out = simulate(&Config::default(), &spec(r#"{"days": 0}"#), None).unwrap();
        assert!(out.series.is_empty());
    }

    #[test]
    fn negative_days_rejected_before_run() {
        let mut s = ScenarioSpec::default();
        s.days = -4;
        assert!(matches!(
            Simulator::new(&Config::default(), &s, None),
            Err(FabulaError::InvalidDays(-4))
        ));
    }

    #[test]
    fn series_is_ordered_by_day() {
        let out = simulate(&Config::default(), &spec(r#"{"days": 15}"#), None).unwrap();
        assert_eq!(out.series.len(), 15);
        for (i, p) in out.series.iter().enumerate() {
            assert_eq!(p.day as usize, i);
        }
    }

    #[test]
    fn sink_sees_every_point() {
        let sim = Simulator::new(&Config::default(), &spec(r#"{"days": 7}"#), None).unwrap();
        let mut sink = VecSink::default();
        let out = sim.run_with_sink(3, &mut sink);
        assert_eq!(sink.points, out.series);
    }

    #[test]
    fn unknown_intervention_warns_but_completes() {
        let out = simulate(
            &Config::default(),
            &spec(r#"{"days": 4, "interventions": [{"t": 1, "kind": "levitate"}]}"#),
            None,
        )
        .unwrap();
        assert_eq!(out.series.len(), 4);
        assert!(matches!(
            out.warnings[0],
            RunWarning::UnrecognisedIntervention { index: 0, .. }
        ));
    }
}
