//! The monthly simulation cycle: select, expand, fan out, collect, record.
//!
//! Each month the engine narrows the active set through the beam, asks the
//! action oracle for candidate moves per state, submits every (state, action)
//! pair to the prediction oracle under a bounded concurrent batch, and drains
//! the results on this task alone - the tree and path map have a single
//! writer by construction.
//!
//! Failures are branch-local. A failed action or prediction call is logged
//! and its branch dropped; siblings and the month continue. A month that
//! ends with no surviving states terminates the run early instead of calling
//! oracles with nothing to expand.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::beam;
use crate::error::{OracleError, SimulationError};
use crate::metrics;
use crate::oracle::{
    ActionOracle, CompletionClient, CompletionConfig, PredictionOracle, RemoteActionOracle,
    RemotePredictionOracle,
};
use crate::types::{ActionPath, BusinessState, SimulationConfig, SimulationRun};

/// Orchestrates a branching month-by-month simulation over a pair of oracles.
pub struct SimulationEngine {
    actions: Arc<dyn ActionOracle>,
    predictor: Arc<dyn PredictionOracle>,
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(
        actions: Arc<dyn ActionOracle>,
        predictor: Arc<dyn PredictionOracle>,
        config: SimulationConfig,
    ) -> Self {
        Self {
            actions,
            predictor,
            config,
        }
    }

    /// Engine wired to the remote completion endpoint, both oracles sharing
    /// one client.
    pub fn with_remote_oracles(config: SimulationConfig, completion: CompletionConfig) -> Self {
        let client = CompletionClient::new(completion);
        Self::new(
            Arc::new(RemoteActionOracle::new(client.clone())),
            Arc::new(RemotePredictionOracle::new(client)),
            config,
        )
    }

    /// Runs the full simulation from a seed description and returns the run
    /// record: final states, full generation history, and the state tree.
    pub async fn run(&self, seed_description: &str) -> Result<SimulationRun, SimulationError> {
        self.config.validate()?;

        let seed = BusinessState::seed(seed_description);
        let mut run = SimulationRun::new(seed, self.config.beam_width);

        for month in 0..self.config.month_length {
            let active = self.active_states(&run, month);
            if active.is_empty() {
                warn!(month, "no active states remain; stopping run early");
                break;
            }

            let pairs = self.expand(&active).await;
            info!(
                month,
                active = active.len(),
                branches = pairs.len(),
                "submitting prediction batch"
            );

            let new_states = self.predict_batch(pairs, month).await;

            for state in &new_states {
                // Generated paths are never empty: every new state hangs off
                // its parent by one action label.
                if let Some((parent, label)) = state.path.parent_and_label() {
                    run.tree.insert(parent, label, &state.description)?;
                    run.paths.insert(state.id, state.path.clone());
                }
            }

            run.history.push(new_states);
            run.month_index += 1;
        }

        info!(
            months = run.month_index,
            states = run.flat_states().len(),
            "simulation complete"
        );
        Ok(run)
    }

    /// The states eligible for expansion in `month`. Month 0 is the seed
    /// singleton and skips the beam; later months are narrowed to the
    /// configured width on extracted metric scores.
    fn active_states(&self, run: &SimulationRun, month: u32) -> Vec<BusinessState> {
        let generation = run.history[month as usize].clone();
        if month == 0 {
            return generation;
        }

        let scored = generation
            .into_iter()
            .map(|state| {
                let score = metrics::extract(&state.description).score();
                (state, score)
            })
            .collect();
        beam::select(scored, self.config.beam_width)
    }

    /// Collects candidate actions per state, sequentially. A failing call
    /// skips that state's expansion for the month.
    async fn expand(&self, active: &[BusinessState]) -> Vec<(BusinessState, String)> {
        let mut pairs = Vec::new();
        for state in active {
            match self.actions.generate(&state.description).await {
                Ok(labels) => {
                    debug!(state = %state.id, candidates = labels.len(), "actions generated");
                    for label in labels {
                        pairs.push((state.clone(), label));
                    }
                }
                Err(err) => {
                    warn!(state = %state.id, error = %err, "action generation failed; skipping state");
                }
            }
        }
        pairs
    }

    /// Submits all pairs to the prediction oracle at once, bounded by the
    /// concurrency cap, and drains completions on this task. Completion
    /// order is nondeterministic and carries no meaning.
    async fn predict_batch(
        &self,
        pairs: Vec<(BusinessState, String)>,
        month: u32,
    ) -> Vec<BusinessState> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_cap));
        let mut set: JoinSet<(ActionPath, String, Result<String, OracleError>)> = JoinSet::new();

        for (parent, action) in pairs {
            let predictor = Arc::clone(&self.predictor);
            let semaphore = Arc::clone(&semaphore);
            let deadline = self.config.oracle_timeout;
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore");
                let outcome = match timeout(
                    deadline,
                    predictor.predict(&parent.description, &action, month + 1),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(OracleError::Timeout(deadline)),
                };
                (parent.path, action, outcome)
            });
        }

        let mut states = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (parent_path, action, outcome) = match joined {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "prediction task panicked; dropping branch");
                    continue;
                }
            };

            match outcome {
                Ok(description) => {
                    let path = parent_path.child(&action);
                    states.push(BusinessState::generated(description, month + 1, path));
                }
                Err(err) => {
                    warn!(action = %action, error = %err, "prediction failed; dropping branch");
                }
            }
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Prediction stub in the shape the engine contract promises: a state
    /// named after the month it lands in.
    struct MonthlyPredictor;

    #[async_trait]
    impl PredictionOracle for MonthlyPredictor {
        async fn predict(
            &self,
            _state: &str,
            _action: &str,
            month: u32,
        ) -> Result<String, OracleError> {
            Ok(format!("month{month}"))
        }
    }

    /// Fails for one specific action, succeeds for the rest, and counts
    /// every call.
    struct FlakyPredictor {
        poison: &'static str,
        calls: AtomicUsize,
    }

    impl FlakyPredictor {
        fn new(poison: &'static str) -> Self {
            Self {
                poison,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PredictionOracle for FlakyPredictor {
        async fn predict(
            &self,
            _state: &str,
            action: &str,
            month: u32,
        ) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if action == self.poison {
                return Err(OracleError::Parse("stub failure".to_string()));
            }
            Ok(format!("month{month} after {action}"))
        }
    }

    /// Tracks how many predictions are in flight at once.
    struct GaugedPredictor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl GaugedPredictor {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PredictionOracle for GaugedPredictor {
        async fn predict(
            &self,
            _state: &str,
            action: &str,
            month: u32,
        ) -> Result<String, OracleError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Keep the call open long enough for siblings to pile up on the
            // semaphore if the cap were not enforced.
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("month{month} after {action}"))
        }
    }

    /// Reports a revenue figure proportional to a per-action rank so the
    /// beam has a clear ordering.
    struct RankedPredictor;

    #[async_trait]
    impl PredictionOracle for RankedPredictor {
        async fn predict(
            &self,
            _state: &str,
            action: &str,
            month: u32,
        ) -> Result<String, OracleError> {
            let rank = match action {
                "small" => 1,
                "medium" => 2,
                "large" => 3,
                _ => 0,
            };
            Ok(format!(
                "month{month} via {action}, revenue: ${rank}00K"
            ))
        }
    }

    struct StubActions(Vec<&'static str>);

    #[async_trait]
    impl ActionOracle for StubActions {
        async fn generate(&self, _state: &str) -> Result<Vec<String>, OracleError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn config(months: u32, beam: usize) -> SimulationConfig {
        SimulationConfig {
            month_length: months,
            beam_width: beam,
            concurrency_cap: 4,
            oracle_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn two_months_single_branch() {
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["grow"])),
            Arc::new(MonthlyPredictor),
            config(2, 1),
        );

        let run = engine.run("a lemonade stand").await.unwrap();

        // Seed plus exactly one state per month.
        let flat = run.flat_states();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[1].description, "month1");
        assert_eq!(flat[2].description, "month2");
        assert_eq!(run.month_index, 2);

        // Single branch of depth 2: grow -> grow.
        assert_eq!(run.tree.depth(), 2);
        let snapshot = run.snapshot();
        assert_eq!(
            snapshot["Initial_State"]["next_steps"]["grow"]["state_description"],
            "month1"
        );
        assert_eq!(
            snapshot["Initial_State"]["next_steps"]["grow"]["next_steps"]["grow"]
                ["state_description"],
            "month2"
        );
    }

    #[tokio::test]
    async fn failed_branch_does_not_abort_siblings() {
        let predictor = Arc::new(FlakyPredictor::new("pivot"));
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["expand", "pivot", "hire"])),
            Arc::clone(&predictor) as Arc<dyn PredictionOracle>,
            config(1, 4),
        );

        let run = engine.run("seed").await.unwrap();

        assert_eq!(predictor.calls.load(Ordering::SeqCst), 3);
        let survivors: Vec<&str> = run
            .final_states()
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(survivors.len(), 2);
        assert!(survivors.contains(&"month1 after expand"));
        assert!(survivors.contains(&"month1 after hire"));

        // The failed branch is absent from the tree as well.
        let snapshot = run.snapshot();
        assert!(snapshot["Initial_State"]["next_steps"]["pivot"].is_null());
    }

    #[tokio::test]
    async fn all_branches_failing_stops_the_run_early() {
        let predictor = Arc::new(FlakyPredictor::new("only"));
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["only"])),
            Arc::clone(&predictor) as Arc<dyn PredictionOracle>,
            config(3, 2),
        );

        let run = engine.run("seed").await.unwrap();

        // One empty post-seed generation, then no further oracle calls.
        assert_eq!(run.history.len(), 2);
        assert!(run.history[1].is_empty());
        assert_eq!(run.month_index, 1);
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 1);
        assert!(run.final_states().is_empty());
    }

    #[tokio::test]
    async fn concurrency_cap_bounds_in_flight_predictions() {
        let predictor = Arc::new(GaugedPredictor::new());
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec![
                "a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8",
            ])),
            Arc::clone(&predictor) as Arc<dyn PredictionOracle>,
            SimulationConfig {
                month_length: 1,
                beam_width: 8,
                concurrency_cap: 2,
                oracle_timeout: Duration::from_secs(5),
            },
        );

        let run = engine.run("seed").await.unwrap();

        assert_eq!(run.final_states().len(), 8);
        let peak = predictor.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "observed {peak} predictions in flight");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn beam_bounds_branching_on_extracted_scores() {
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["small", "medium", "large"])),
            Arc::new(RankedPredictor),
            config(2, 2),
        );

        let run = engine.run("seed").await.unwrap();

        // Month 1 fans out to 3; only the top 2 by revenue expand again.
        assert_eq!(run.history[1].len(), 3);
        assert_eq!(run.history[2].len(), 6);
        for state in &run.history[2] {
            let first_hop = state.path.segments()[0].as_str();
            assert!(
                first_hop == "medium" || first_hop == "large",
                "low-scoring parent expanded via {first_hop}"
            );
        }
    }

    #[tokio::test]
    async fn timeout_is_a_branch_local_failure() {
        struct SlowPredictor;

        #[async_trait]
        impl PredictionOracle for SlowPredictor {
            async fn predict(
                &self,
                _state: &str,
                action: &str,
                month: u32,
            ) -> Result<String, OracleError> {
                if action == "slow" {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(format!("month{month} after {action}"))
            }
        }

        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["fast", "slow"])),
            Arc::new(SlowPredictor),
            SimulationConfig {
                month_length: 1,
                beam_width: 4,
                concurrency_cap: 4,
                oracle_timeout: Duration::from_millis(50),
            },
        );

        let run = engine.run("seed").await.unwrap();

        let survivors: Vec<&str> = run
            .final_states()
            .iter()
            .map(|s| s.description.as_str())
            .collect();
        assert_eq!(survivors, ["month1 after fast"]);
    }

    #[tokio::test]
    async fn invalid_config_rejects_before_any_oracle_call() {
        let predictor = Arc::new(FlakyPredictor::new("never"));
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["grow"])),
            Arc::clone(&predictor) as Arc<dyn PredictionOracle>,
            config(0, 1),
        );

        let err = engine.run("seed").await.unwrap_err();
        assert!(matches!(err, SimulationError::InvalidConfig(_)));
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_action_list_means_no_expansion() {
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec![])),
            Arc::new(MonthlyPredictor),
            config(2, 1),
        );

        let run = engine.run("seed").await.unwrap();

        assert_eq!(run.history.len(), 2);
        assert!(run.history[1].is_empty());
        assert_eq!(run.tree.depth(), 0);
    }

    #[tokio::test]
    async fn every_generated_state_has_a_recorded_path() {
        let engine = SimulationEngine::new(
            Arc::new(StubActions(vec!["a", "b"])),
            Arc::new(MonthlyPredictor),
            config(2, 2),
        );

        let run = engine.run("seed").await.unwrap();

        for state in run.flat_states() {
            let recorded = run.paths.get(&state.id).expect("path recorded");
            assert_eq!(recorded, &state.path);
            assert_eq!(state.path.depth() as u32, state.month);
        }
        // Seed + 2 in month 1 + 4 in month 2.
        assert_eq!(run.paths.len(), 7);
    }
}
