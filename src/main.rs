use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use u_shapeopt::hybrid::{HybridConfig, HybridSolver};
use u_shapeopt::shape::DEFAULT_X0;
use u_shapeopt::slsqp::{SlsqpConfig, SlsqpSolver};
use u_shapeopt::{Backend, CupModel, ShapeOptimizer, ShapeSolution, SolveStatus, SolverConfig};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("shape-optimizer v{}", env!("CARGO_PKG_VERSION"));
    let cup = CupModel::default();

    let hybrid = HybridSolver::new(HybridConfig::default());
    let hybrid_config = SolverConfig::default().with_time_limit(Duration::from_secs(1));
    let a = run(cup, hybrid, &hybrid_config)?;

    let slsqp = SlsqpSolver::new(SlsqpConfig::default().with_disp(true));
    let slsqp_config = SolverConfig::default().with_x0(DEFAULT_X0.to_vec());
    let b = run(cup, slsqp, &slsqp_config)?;

    let failed: Vec<&str> = [&a, &b]
        .into_iter()
        .filter(|s| s.status != SolveStatus::Converged)
        .map(|s| s.backend.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("no converged feasible solution from: {}", failed.join(", "));
    }
    Ok(())
}

fn run<B: Backend>(cup: CupModel, backend: B, config: &SolverConfig) -> Result<ShapeSolution> {
    let name = backend.name();
    let optimizer = ShapeOptimizer::new(cup, backend).context("building cup model")?;
    let solution = optimizer
        .solve(config)
        .with_context(|| format!("{name} solve failed"))?;

    println!("{} {}", solution.surface, solution.volume);
    println!(
        "{} {} {}",
        solution.big_radius, solution.small_radius, solution.height
    );
    println!(
        "{name}: {:?} after {} iterations in {:.3} s",
        solution.status,
        solution.iterations,
        solution.elapsed.as_secs_f64()
    );
    Ok(solution)
}
