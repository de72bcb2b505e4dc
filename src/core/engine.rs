use rayon::prelude::*;
use tracing::debug;

use super::rng::{Generator, derive_stream_seed, standard_normal};
use super::types::{
    SimulationError, SimulationParameters, SimulationRun, Trajectory, TrajectoryPoint,
};

/// One generator is threaded through every simulation in order, and through
/// every year within a simulation, so reruns are bit-identical.
pub fn run_simulation(params: &SimulationParameters) -> Result<SimulationRun, SimulationError> {
    params.validate()?;
    debug!(
        seed = params.seed,
        years = params.years,
        simulations = params.num_simulations,
        "running sequential simulation"
    );

    let mut rng = Generator::new(params.seed);
    let mut trajectories = Vec::with_capacity(params.num_simulations as usize);
    for _ in 0..params.num_simulations {
        let (trajectory, next) = simulate_path(params, rng);
        rng = next;
        trajectories.push(trajectory);
    }

    let run = finish_run(trajectories);
    debug!(trajectories = run.len(), "sequential simulation finished");
    Ok(run)
}

/// Not bit-compatible with [`run_simulation`]: trajectory `i` draws from its
/// own stream seeded with `derive_stream_seed(params.seed, i)`.
pub fn run_simulation_parallel(
    params: &SimulationParameters,
) -> Result<SimulationRun, SimulationError> {
    params.validate()?;
    debug!(
        seed = params.seed,
        years = params.years,
        simulations = params.num_simulations,
        "running parallel simulation"
    );

    let trajectories = (0..params.num_simulations)
        .into_par_iter()
        .map(|index| {
            let rng = Generator::new(derive_stream_seed(params.seed, index));
            simulate_path(params, rng).0
        })
        .collect();

    let run = finish_run(trajectories);
    debug!(trajectories = run.len(), "parallel simulation finished");
    Ok(run)
}

fn simulate_path(params: &SimulationParameters, mut rng: Generator) -> (Trajectory, Generator) {
    let mut value = params.initial_amount;
    let mut trajectory = Vec::with_capacity(params.years as usize + 1);
    trajectory.push(TrajectoryPoint { year: 0, value });

    for year in 1..=params.years {
        let (z, next) = standard_normal(rng);
        rng = next;
        let random_return = z * params.volatility + params.annual_return;
        // no floor: returns below -100% drive the value negative
        value *= 1.0 + random_return;
        trajectory.push(TrajectoryPoint { year, value });
    }

    (trajectory, rng)
}

fn finish_run(trajectories: Vec<Trajectory>) -> SimulationRun {
    let final_values = trajectories
        .iter()
        .map(|t| t.last().map_or(f64::NAN, |point| point.value))
        .collect();
    SimulationRun {
        trajectories,
        final_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{histogram_with_default_bins, summarize, year_bands};
    use proptest::prelude::{
        any, prop_assert, prop_assert_eq, prop_assert_ne, prop_assume, proptest,
    };
    use std::collections::HashSet;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_params() -> SimulationParameters {
        SimulationParameters {
            initial_amount: 100_000.0,
            annual_return: 0.07,
            volatility: 0.15,
            years: 20,
            num_simulations: 200,
            seed: 42,
        }
    }

    fn bits(run: &SimulationRun) -> Vec<u64> {
        run.trajectories
            .iter()
            .flatten()
            .map(|point| point.value.to_bits())
            .collect()
    }

    #[test]
    fn oracle_flat_market_keeps_every_path_at_initial_amount() {
        let params = SimulationParameters {
            initial_amount: 100_000.0,
            annual_return: 0.0,
            volatility: 0.0,
            years: 5,
            num_simulations: 3,
            seed: 1,
        };
        let run = run_simulation(&params).expect("valid params");

        assert_eq!(run.trajectories.len(), 3);
        for trajectory in &run.trajectories {
            let values: Vec<f64> = trajectory.iter().map(|p| p.value).collect();
            assert_eq!(values, vec![100_000.0; 6]);
        }

        let summary = summarize(&run, &params);
        assert_eq!(summary.mean, 100_000.0);
        assert_eq!(summary.median, 100_000.0);
        assert_eq!(summary.prob_loss, 0.0);
    }

    #[test]
    fn oracle_zero_volatility_compounds_at_the_mean_return() {
        let mut params = sample_params();
        params.volatility = 0.0;
        params.years = 10;
        params.num_simulations = 4;

        let run = run_simulation(&params).expect("valid params");
        for trajectory in &run.trajectories {
            for point in trajectory {
                let expected = 100_000.0 * 1.07_f64.powi(point.year as i32);
                assert_approx(point.value, expected);
            }
        }
        assert_eq!(summarize(&run, &params).prob_loss, 0.0);

        params.annual_return = -0.03;
        let run = run_simulation(&params).expect("valid params");
        assert_eq!(summarize(&run, &params).prob_loss, 1.0);
    }

    #[test]
    fn zero_years_gives_single_point_paths() {
        let mut params = sample_params();
        params.years = 0;
        params.num_simulations = 5;

        let run = run_simulation(&params).expect("valid params");
        assert!(run.trajectories.iter().all(|t| t.len() == 1));
        assert!(run.final_values.iter().all(|&v| v == 100_000.0));
    }

    #[test]
    fn zero_simulations_gives_empty_run_and_nan_summary() {
        let mut params = sample_params();
        params.num_simulations = 0;

        let run = run_simulation(&params).expect("valid params");
        assert!(run.is_empty());
        assert!(run.trajectories.is_empty());
        assert!(summarize(&run, &params).mean.is_nan());
        assert!(histogram_with_default_bins(&run.final_values).is_empty());
        assert_eq!(year_bands(&run, params.years).len(), 21);
    }

    #[test]
    fn paths_may_go_negative_when_return_falls_below_minus_one() {
        let params = SimulationParameters {
            initial_amount: 1_000.0,
            annual_return: -1.5,
            volatility: 0.0,
            years: 1,
            num_simulations: 1,
            seed: 3,
        };
        let run = run_simulation(&params).expect("valid params");
        assert_approx(run.final_values[0], -500.0);
    }

    #[test]
    fn first_path_uses_the_first_normal_draws_of_the_seed() {
        let mut params = sample_params();
        params.years = 1;
        params.num_simulations = 2;

        let run = run_simulation(&params).expect("valid params");
        let (z0, rng) = standard_normal(Generator::new(42));
        let (z1, _) = standard_normal(rng);

        assert_eq!(
            run.final_values[0],
            100_000.0 * (1.0 + (z0 * 0.15 + 0.07))
        );
        assert_eq!(
            run.final_values[1],
            100_000.0 * (1.0 + (z1 * 0.15 + 0.07))
        );
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut params = sample_params();
        params.initial_amount = -1.0;
        let err = run_simulation(&params).expect_err("negative initial amount");
        assert!(err.to_string().contains("initial_amount"));

        let mut params = sample_params();
        params.volatility = -0.1;
        let err = run_simulation_parallel(&params).expect_err("negative volatility");
        assert!(err.to_string().contains("volatility"));

        let mut params = sample_params();
        params.annual_return = f64::NAN;
        assert!(run_simulation(&params).is_err());
    }

    #[test]
    fn extreme_compounding_does_not_panic_the_aggregator() {
        let params = SimulationParameters {
            initial_amount: 1.0e300,
            annual_return: 5.0,
            volatility: 20.0,
            years: 200,
            num_simulations: 50,
            seed: 9,
        };
        let run = run_simulation(&params).expect("valid params");
        let summary = summarize(&run, &params);
        let bins = histogram_with_default_bins(&run.final_values);

        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 50);
        assert_eq!(year_bands(&run, params.years).len(), 201);
        assert!(run.final_values.iter().any(|v| !v.is_finite()));
        assert!(summary.min <= summary.max);
        assert!(!summary.max.is_finite() || !summary.min.is_finite());
        assert_eq!(
            bins.last().map(|b| b.range_label.as_str()),
            Some("non-finite")
        );
    }

    #[test]
    fn parallel_run_is_reproducible_and_ordered_by_stream() {
        let params = sample_params();
        let first = run_simulation_parallel(&params).expect("valid params");
        let second = run_simulation_parallel(&params).expect("valid params");
        assert_eq!(bits(&first), bits(&second));

        let rng = Generator::new(derive_stream_seed(params.seed, 7));
        let (expected, _) = simulate_path(&params, rng);
        assert_eq!(first.trajectories[7], expected);
    }

    #[test]
    fn parallel_run_never_repeats_a_trajectory() {
        let mut params = sample_params();
        params.years = 2;
        params.num_simulations = 20_000;

        let run = run_simulation_parallel(&params).expect("valid params");
        let distinct: HashSet<(u64, u64)> = run
            .trajectories
            .iter()
            .map(|t| (t[1].value.to_bits(), t[2].value.to_bits()))
            .collect();
        assert_eq!(distinct.len(), 20_000);
    }

    #[test]
    fn parallel_run_is_not_bit_compatible_with_sequential() {
        let params = sample_params();
        let sequential = run_simulation(&params).expect("valid params");
        let parallel = run_simulation_parallel(&params).expect("valid params");
        assert_ne!(sequential.final_values, parallel.final_values);
    }

    proptest! {
        #[test]
        fn prop_runs_are_deterministic_and_well_shaped(
            seed in any::<u32>(),
            years in 0_u32..25,
            sims in 0_u32..40,
            initial in 1.0..1.0e7_f64,
            annual_return in -0.2..0.3_f64,
            volatility in 0.0..0.6_f64,
        ) {
            let params = SimulationParameters {
                initial_amount: initial,
                annual_return,
                volatility,
                years,
                num_simulations: sims,
                seed,
            };
            let first = run_simulation(&params).expect("valid params");
            let second = run_simulation(&params).expect("valid params");

            prop_assert_eq!(bits(&first), bits(&second));
            prop_assert_eq!(first.trajectories.len(), sims as usize);
            prop_assert_eq!(first.final_values.len(), sims as usize);
            for (trajectory, &final_value) in first.trajectories.iter().zip(&first.final_values) {
                prop_assert_eq!(trajectory.len(), years as usize + 1);
                prop_assert_eq!(trajectory[0].value, initial);
                prop_assert_eq!(trajectory[0].year, 0);
                prop_assert_eq!(trajectory[years as usize].value.to_bits(), final_value.to_bits());
            }

            let total: usize = histogram_with_default_bins(&first.final_values)
                .iter()
                .map(|b| b.count)
                .sum();
            prop_assert_eq!(total, sims as usize);
        }

        #[test]
        fn prop_different_seeds_give_different_outcomes(
            seed_a in any::<u32>(),
            seed_b in any::<u32>(),
        ) {
            prop_assume!(seed_a != seed_b);
            let mut params = sample_params();
            params.years = 5;
            params.num_simulations = 10;

            params.seed = seed_a;
            let a = run_simulation(&params).expect("valid params");
            params.seed = seed_b;
            let b = run_simulation(&params).expect("valid params");
            prop_assert_ne!(a.final_values, b.final_values);
        }

        #[test]
        fn prop_summary_bounds_are_ordered(seed in any::<u32>()) {
            let mut params = sample_params();
            params.seed = seed;
            params.num_simulations = 50;
            let run = run_simulation(&params).expect("valid params");
            let s = summarize(&run, &params);

            prop_assert!(s.min <= s.q10 && s.q10 <= s.q25 && s.q25 <= s.median);
            prop_assert!(s.median <= s.q75 && s.q75 <= s.q90 && s.q90 <= s.max);
            prop_assert!((0.0..=1.0).contains(&s.prob_loss));
        }
    }
}
