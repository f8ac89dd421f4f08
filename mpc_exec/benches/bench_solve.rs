//! # Solve Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use mpc_lib::{
    model::VehicleState,
    mpc_ctrl::{HorizonConfig, Params, TrajectoryOptimizer},
    nlp::SolverOptions,
    poly::RefPoly,
};

const PARAMS_TOML: &str = r#"
    profile = "walkthrough"
    horizon_steps = 10
    step_s = 0.1
    lf_m = 2.67
    ref_speed = 20.0
    max_steer_rad = 0.436332
    max_throttle = 1.0
    fallback = "hold_previous"
    min_waypoints = 4
    ref_path_inc_m = 2.5
    ref_path_num_points = 25

    [latency]
    mode = "off"
    latency_s = 0.1
"#;

fn solve_benchmark(c: &mut Criterion) {
    let params: Params = util::params::load_str(PARAMS_TOML).unwrap();
    let horizon = HorizonConfig::from_params(&params).unwrap();

    // Gentle left hand curve with the vehicle off the path
    let poly = RefPoly::from_coeffs([1.0, 0.05, 0.002, -1e-5]);
    let initial = VehicleState {
        x: 0.0,
        y: 0.0,
        psi: 0.0,
        v: 15.0,
        cte: poly.eval(0.0),
        epsi: -poly.tangent_heading(0.0),
    };

    let sparse_opts = SolverOptions {
        max_solve_time_s: 30.0,
        ..Default::default()
    };
    let dense_opts = SolverOptions {
        sparse: false,
        ..sparse_opts.clone()
    };

    let mut sparse = TrajectoryOptimizer::with_sqp(horizon, sparse_opts, false).unwrap();
    let mut dense = TrajectoryOptimizer::with_sqp(horizon, dense_opts, false).unwrap();

    c.bench_function("TrajectoryOptimizer::solve::sparse", |b| {
        b.iter(|| sparse.solve(&initial, &poly).unwrap())
    });

    c.bench_function("TrajectoryOptimizer::solve::dense", |b| {
        b.iter(|| dense.solve(&initial, &poly).unwrap())
    });

    let pts: Vec<_> = (0..6)
        .map(|i| {
            let x = 5.0 * i as f64;
            nalgebra::Vector2::new(x, poly.eval(x))
        })
        .collect();

    c.bench_function("RefPoly::fit", |b| b.iter(|| RefPoly::fit(&pts).unwrap()));
}

criterion_group!(benches, solve_benchmark);
criterion_main!(benches);
