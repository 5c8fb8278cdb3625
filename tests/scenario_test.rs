//! End-to-end scenarios: scripted seeding, device-loss failover and the
//! script call surface, driven through the public engine/mediator/worker
//! APIs the way the application shell drives them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nbody_lib::bridge::{ScriptBridge, ScriptValue};
use nbody_lib::error::SimError;
use nbody_lib::io;
use nbody_lib::mediator::Mediator;
use nbody_lib::params::{Config, SimParams};
use nbody_lib::worker::{DeviceKind, Worker};

fn test_params() -> SimParams {
    let mut params = SimParams::preset(0);
    params.config = Config::Shell;
    params.cluster_scale = 1.0;
    params.velocity_scale = 2.0;
    params
}

#[test]
fn scripted_ring_reproduces_the_analytic_kinetic_energy() {
    // A script seeds a ring of 512 bodies: unit masses, radius 1, tangential
    // speed 0.5. Initial kinetic energy must equal N/2 * v^2.
    let n = 512;
    let speed = 0.5_f32;
    let bridge = Arc::new(ScriptBridge::new(n));
    bridge.configure(n, 1.0, 1.0);

    for body in 0..n {
        let angle = (body as f32) / (n as f32) * std::f32::consts::TAU;
        let base = 4 * body;
        // points[1..=2048]: x, y, z, mass per body, 1-based like the script
        // runtime sees it.
        bridge.points_set(base + 1, angle.cos()).unwrap();
        bridge.points_set(base + 2, angle.sin()).unwrap();
        bridge.points_set(base + 3, 0.0).unwrap();
        bridge.points_set(base + 4, 1.0).unwrap();

        bridge.velocities_set(base + 1, -angle.sin() * speed).unwrap();
        bridge.velocities_set(base + 2, angle.cos() * speed).unwrap();
        bridge.velocities_set(base + 3, 0.0).unwrap();
        bridge.velocities_set(base + 4, 1.0).unwrap();
    }

    let mut params = test_params();
    params.config = Config::Script;
    let mut worker = Worker::new(DeviceKind::CpuSingle, n, params, bridge);
    worker.initialize().unwrap();
    worker.reset().unwrap();

    let mut positions = vec![0.0; 4 * n];
    let mut velocities = vec![0.0; 4 * n];
    worker.position(&mut positions).unwrap();
    worker.velocity(&mut velocities).unwrap();

    let kinetic: f64 = positions
        .chunks(4)
        .zip(velocities.chunks(4))
        .map(|(p, v)| {
            let speed_sq =
                (v[0] as f64).powi(2) + (v[1] as f64).powi(2) + (v[2] as f64).powi(2);
            0.5 * (p[3] as f64) * speed_sq
        })
        .sum();

    let analytic = 0.5 * (n as f64) * (speed as f64).powi(2);
    let relative = (kinetic - analytic).abs() / analytic;
    assert!(
        relative < 1e-3,
        "ring kinetic energy off by {relative:.4e} (got {kinetic}, want {analytic})"
    );
}

#[test]
fn device_loss_fails_over_without_dropping_the_snapshot_stream() {
    // The active worker dies at step 17; the mediator must keep serving
    // positions from the single-core CPU fallback on the very next poll.
    let n = 128;
    let bridge = Arc::new(ScriptBridge::new(n));
    let mut mediator = Mediator::new(test_params(), n, bridge).expect("cpu facades");

    mediator.select(DeviceKind::CpuMulti).unwrap();

    // Arm the failure 17 steps ahead while the loop is drained, so the
    // worker cannot race past the target before it is set.
    mediator.pause();
    let fail_at = mediator.active_facade().worker().step_count() + 17;
    mediator.active_facade().worker().fail_after(fail_at);
    mediator.unpause();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !mediator.active_facade().worker().has_failed() && Instant::now() < deadline {
        std::thread::yield_now();
    }
    assert!(mediator.active_facade().worker().has_failed());
    assert_eq!(mediator.active_facade().worker().step_count(), fail_at - 1);

    mediator.update();
    assert!(mediator.is_cpu_single_core());
    assert!(mediator.has_position());

    // The fallback keeps advancing from the carried-over state.
    let resumed_from = mediator.active_facade().worker().step_count();
    let deadline = Instant::now() + Duration::from_secs(10);
    while mediator.active_facade().worker().step_count() == resumed_from
        && Instant::now() < deadline
    {
        std::thread::yield_now();
    }
    assert!(mediator.active_facade().worker().step_count() > resumed_from);
}

#[test]
fn too_many_script_arguments_name_the_function() {
    let bridge = ScriptBridge::new(16);
    let err = bridge
        .call("universe.fps", &[ScriptValue::Number(42.0)])
        .unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("universe.fps"),
        "diagnostic must contain the function name: {message}"
    );

    // The zero-argument form still works.
    assert!(bridge.call("universe.fps", &[]).is_ok());
}

#[test]
fn script_bridge_surface_matches_the_registered_table() {
    let bridge = ScriptBridge::new(2048);
    bridge.configure(2048, 1.54, 8.0);

    match bridge.call("universe.particleCount", &[]).unwrap() {
        ScriptValue::Number(n) => assert_eq!(n, 2048.0),
        other => panic!("unexpected value {other:?}"),
    }
    match bridge.call("universe.scale", &[]).unwrap() {
        ScriptValue::Number(s) => assert!((s - 1.54).abs() < 1e-6),
        other => panic!("unexpected value {other:?}"),
    }
    match bridge.call("system.user", &[]).unwrap() {
        ScriptValue::Text(user) => assert!(!user.is_empty()),
        other => panic!("unexpected value {other:?}"),
    }
}

#[test]
fn headless_run_dumps_a_loadable_snapshot() {
    let n = 128;
    let params = test_params();
    let bridge = Arc::new(ScriptBridge::new(n));
    let mut worker = Worker::new(DeviceKind::CpuMulti, n, params, bridge);
    worker.initialize().unwrap();
    worker.reset().unwrap();
    for _ in 0..20 {
        worker.step().unwrap();
    }

    let mut positions = vec![0.0; 4 * n];
    let mut velocities = vec![0.0; 4 * n];
    worker.position(&mut positions).unwrap();
    worker.velocity(&mut velocities).unwrap();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("dump.bin");
    io::save_snapshot(
        &path,
        &io::SnapshotFile {
            params,
            step: worker.step_count(),
            year: worker.year(),
            positions: positions.clone(),
            velocities,
        },
    )
    .unwrap();

    let loaded = io::load_snapshot(&path).unwrap();
    assert_eq!(loaded.step, 20);
    assert_eq!(loaded.positions, positions);

    // A fresh worker accepts the snapshot as a hand-off.
    let bridge = Arc::new(ScriptBridge::new(n));
    let mut resumed = Worker::new(DeviceKind::CpuSingle, n, loaded.params, bridge);
    resumed.initialize().unwrap();
    resumed.reset().unwrap();
    resumed.set_position(&loaded.positions).unwrap();
    resumed.set_velocity(&loaded.velocities).unwrap();

    let mut check = vec![0.0; 4 * n];
    resumed.position(&mut check).unwrap();
    assert_eq!(check, loaded.positions);
    resumed.terminate();
    worker.terminate();

    let err = resumed.step().unwrap_err();
    assert!(matches!(err, SimError::State(_)));
}
