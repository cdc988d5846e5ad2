//! End-to-end solves of the cup problem with both back-ends.

use approx::assert_relative_eq;
use std::time::Duration;
use u_shapeopt::hybrid::{HybridConfig, HybridSolver};
use u_shapeopt::shape::{DEFAULT_X0, KNOWN_OPTIMUM_VOLUME, PI};
use u_shapeopt::slsqp::{SlsqpConfig, SlsqpSolver};
use u_shapeopt::{
    Backend, CupModel, ShapeOptimizer, ShapeSolution, SolveError, SolveStatus, SolverConfig,
    FEASIBILITY_TOL,
};

fn hybrid() -> HybridSolver {
    HybridSolver::new(HybridConfig::default().with_max_stall_restarts(3))
}

fn hybrid_config() -> SolverConfig {
    SolverConfig::default()
        .with_time_limit(Duration::from_secs(1))
        .with_seed(2015)
}

fn slsqp_config() -> SolverConfig {
    SolverConfig::default().with_x0(DEFAULT_X0.to_vec())
}

fn solve<B: Backend>(backend: B, config: &SolverConfig) -> ShapeSolution {
    ShapeOptimizer::new(CupModel::default(), backend)
        .unwrap()
        .solve(config)
        .unwrap()
}

fn assert_feasible(solution: &ShapeSolution) {
    assert!(
        solution.surface - PI <= FEASIBILITY_TOL + 1e-12,
        "{}: surface {} exceeds π",
        solution.backend,
        solution.surface
    );
    for v in solution.point() {
        assert!((0.0..=1.0).contains(&v), "{v} left the box");
    }
}

#[test]
fn test_both_backends_improve_on_start() {
    let cup = CupModel::default();
    let start = cup.volume(&DEFAULT_X0);

    let solutions = [
        solve(hybrid(), &hybrid_config()),
        solve(SlsqpSolver::default(), &slsqp_config()),
    ];
    for solution in solutions {
        assert_feasible(&solution);
        assert!(
            solution.volume > start,
            "{}: volume {} not above start {start}",
            solution.backend,
            solution.volume
        );
        assert_eq!(solution.status, SolveStatus::Converged, "{}", solution.backend);
    }
}

#[test]
fn test_known_optimum_reached() {
    let config = SolverConfig::default()
        .with_time_limit(Duration::from_secs(5))
        .with_seed(7);
    let a = solve(hybrid(), &config);
    let b = solve(SlsqpSolver::default(), &slsqp_config());
    for solution in [a, b] {
        assert_feasible(&solution);
        assert_relative_eq!(solution.volume, KNOWN_OPTIMUM_VOLUME, epsilon = 1e-3);
    }
}

#[test]
fn test_backends_agree() {
    let a = solve(hybrid(), &hybrid_config());
    let b = solve(SlsqpSolver::default(), &slsqp_config());
    assert_relative_eq!(a.volume, b.volume, epsilon = 2e-3);
    for (p, q) in a.point().iter().zip(b.point()) {
        assert!(
            (p - q).abs() < 0.1,
            "points differ: {:?} vs {:?}",
            a.point(),
            b.point()
        );
    }
}

#[test]
fn test_equal_radii_start() {
    let cup = CupModel::default();
    let x0 = [0.4, 0.4, 0.4];
    let config = SolverConfig::default()
        .with_x0(x0.to_vec())
        .with_seed(3)
        .with_time_limit(Duration::from_secs(1));

    for solution in [solve(hybrid(), &config), solve(SlsqpSolver::default(), &config)] {
        assert_feasible(&solution);
        assert!(solution.volume > cup.volume(&x0), "{}", solution.backend);
    }
}

#[test]
fn test_zero_radius_start() {
    let cup = CupModel::default();
    for x0 in [[0.0, 0.3, 0.3], [0.3, 0.0, 0.3], [0.0, 0.0, 0.0]] {
        let config = SolverConfig::default()
            .with_x0(x0.to_vec())
            .with_seed(11)
            .with_time_limit(Duration::from_secs(1));
        for solution in [solve(hybrid(), &config), solve(SlsqpSolver::default(), &config)] {
            assert_feasible(&solution);
            assert!(
                solution.volume >= cup.volume(&x0),
                "{} from {x0:?}",
                solution.backend
            );
        }
    }
}

#[test]
fn test_infeasible_start_inside_box_is_repaired() {
    // (1, 1, 1) has surface (1 + 2)·π
    let config = SolverConfig::default()
        .with_x0(vec![1.0, 1.0, 1.0])
        .with_seed(5)
        .with_time_limit(Duration::from_secs(1));
    for solution in [solve(hybrid(), &config), solve(SlsqpSolver::default(), &config)] {
        assert_feasible(&solution);
        assert_ne!(solution.status, SolveStatus::Infeasible);
    }
}

#[test]
fn test_hybrid_surface_never_exceeds_limit() {
    for seed in 0..3 {
        let config = SolverConfig::default()
            .with_time_limit(Duration::from_secs(1))
            .with_seed(seed);
        let solution = solve(hybrid(), &config);
        assert!(
            solution.surface <= PI,
            "seed {seed}: surface {} exceeds π by {:e}",
            solution.surface,
            solution.surface - PI
        );
        assert_relative_eq!(solution.volume, KNOWN_OPTIMUM_VOLUME, epsilon = 1e-3);
    }
}

#[test]
fn test_slsqp_leaves_degenerate_corner() {
    // R = r = 1, h = 0 is feasible with zero volume, and R = r = 1 − t,
    // h = t stays feasible while the volume grows
    let config = SolverConfig::default().with_x0(vec![1.0, 1.0, 0.0]);
    let solution = solve(SlsqpSolver::default(), &config);
    assert!(
        solution.status != SolveStatus::Converged || solution.volume > 0.5,
        "{:?} at volume {}",
        solution.status,
        solution.volume
    );
}

#[test]
fn test_out_of_box_start_is_rejected() {
    let config = SolverConfig::default().with_x0(vec![1.2, 0.3, 0.3]);
    let a = ShapeOptimizer::new(CupModel::default(), hybrid())
        .unwrap()
        .solve(&config);
    let b = ShapeOptimizer::new(CupModel::default(), SlsqpSolver::default())
        .unwrap()
        .solve(&config);
    for result in [a, b] {
        assert!(matches!(result, Err(SolveError::InfeasibleStart { .. })));
    }
}

#[test]
fn test_slsqp_iteration_cap_is_reported() {
    let solver = SlsqpSolver::new(SlsqpConfig::default().with_max_iterations(1));
    let solution = solve(solver, &slsqp_config());
    assert_ne!(solution.status, SolveStatus::Converged);
    assert_eq!(solution.iterations, 1);
}

#[test]
fn test_sign_conventions_at_solutions() {
    let optimizer = ShapeOptimizer::new(CupModel::default(), SlsqpSolver::default()).unwrap();
    let solution = optimizer.solve(&slsqp_config()).unwrap();
    let constraint = &optimizer.model().constraints()[0];
    let x = solution.point();
    let le = constraint.value(&x).unwrap() <= FEASIBILITY_TOL;
    let ge = constraint.slack(&x).unwrap() >= -FEASIBILITY_TOL;
    assert!(le && ge);
    assert_relative_eq!(
        constraint.value(&x).unwrap(),
        -constraint.slack(&x).unwrap()
    );
}
