use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::error;

use nbody_lib::bridge::ScriptBridge;
use nbody_lib::cli::{Backend, Cli, Commands};
use nbody_lib::error::SimError;
use nbody_lib::io::{self, SnapshotFile};
use nbody_lib::params::{DEMO_PRESETS, SimParams};
use nbody_lib::worker::{DeviceKind, Worker};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run {
            backend,
            demo,
            steps,
            bodies,
            dump,
        } => run(backend, demo, steps, bodies, dump),
        Commands::Devices { bodies } => devices(bodies),
        Commands::Presets => presets(),
    };

    if let Err(e) = outcome {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Steps one backend headlessly and reports wall-clock throughput.
fn run(
    backend: Backend,
    demo: usize,
    steps: u64,
    bodies: usize,
    dump: Option<std::path::PathBuf>,
) -> Result<(), SimError> {
    let params = SimParams::preset(demo);
    let bridge = Arc::new(ScriptBridge::new(bodies));
    bridge.configure(bodies, params.cluster_scale, params.velocity_scale);

    let mut worker = Worker::new(backend.device_kind(), bodies, params, bridge);
    worker.initialize()?;
    worker.reset()?;

    println!(
        "Running {steps} steps of demo {demo} on {} ({bodies} bodies)",
        worker.name()
    );

    let started = Instant::now();
    for _ in 0..steps {
        worker.step()?;
    }
    let elapsed = started.elapsed().as_secs_f64();

    println!("Completed {} steps in {elapsed:.2} s", worker.step_count());
    println!(
        "  {:.1} steps/s, {:.1} GFLOP/s, simulated years {:.3}",
        worker.updates(),
        worker.performance(),
        worker.year()
    );

    if let Some(path) = dump {
        let mut positions = vec![0.0; 4 * bodies];
        let mut velocities = vec![0.0; 4 * bodies];
        worker.position(&mut positions)?;
        worker.velocity(&mut velocities)?;
        let snapshot = SnapshotFile {
            params,
            step: worker.step_count(),
            year: worker.year(),
            positions,
            velocities,
        };
        io::save_snapshot(&path, &snapshot)?;
        println!("Snapshot written to {}", path.display());
    }

    worker.terminate();
    Ok(())
}

/// Probes every device kind the mediator would construct.
fn devices(bodies: usize) -> Result<(), SimError> {
    let params = SimParams::preset(0);
    let bridge = Arc::new(ScriptBridge::new(bodies));

    for kind in DeviceKind::ALL {
        let mut worker = Worker::new(kind, bodies, params, Arc::clone(&bridge));
        match worker.initialize() {
            Ok(()) => {
                println!("{kind:?}: {}", worker.name());
                worker.terminate();
            }
            Err(e) => println!("{kind:?}: unavailable ({e})"),
        }
    }
    Ok(())
}

/// Dumps the preset table as JSON.
fn presets() -> Result<(), SimError> {
    for (index, params) in DEMO_PRESETS.iter().enumerate() {
        println!("// preset {index}");
        println!("{}", io::params_to_json(params)?);
    }
    Ok(())
}
