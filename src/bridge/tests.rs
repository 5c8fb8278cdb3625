#[cfg(test)]
mod units {
    use crate::bridge::{ScriptBridge, ScriptValue};
    use crate::error::SimError;

    #[test]
    fn scalars_reflect_configuration() {
        let bridge = ScriptBridge::new(64);
        bridge.configure(128, 1.5, 8.0);

        assert_eq!(bridge.particle_count(), 128);
        assert_eq!(bridge.scale(), 1.5);
        assert_eq!(bridge.vscale(), 8.0);
    }

    #[test]
    fn indexed_access_is_one_based() {
        let bridge = ScriptBridge::new(2);

        bridge.points_set(1, 3.25).expect("write first element");
        assert_eq!(bridge.points_get(1).unwrap(), 3.25);

        // Index 1 is flat element 0; the remaining elements are untouched.
        for i in 2..=8 {
            assert_eq!(bridge.points_get(i).unwrap(), 0.0);
        }
    }

    #[test]
    fn index_zero_and_past_end_are_rejected() {
        let bridge = ScriptBridge::new(2);

        assert!(bridge.points_get(0).is_err());
        assert!(bridge.points_get(9).is_err());
        assert!(bridge.velocities_set(0, 1.0).is_err());
        assert!(bridge.velocities_set(9, 1.0).is_err());
    }

    #[test]
    fn seed_arrays_require_a_script_write() {
        let bridge = ScriptBridge::new(4);
        assert!(bridge.seeded_arrays().is_none());

        bridge.velocities_set(3, -1.0).unwrap();
        let (points, velocities) = bridge.seeded_arrays().expect("seed after write");
        assert_eq!(points.len(), 16);
        assert_eq!(velocities[2], -1.0);
    }

    #[test]
    fn configure_clears_stale_seed() {
        let bridge = ScriptBridge::new(4);
        bridge.points_set(1, 9.0).unwrap();
        assert!(bridge.seeded_arrays().is_some());

        bridge.configure(4, 1.0, 1.0);
        assert!(bridge.seeded_arrays().is_none());
        assert_eq!(bridge.points_get(1).unwrap(), 0.0);
    }

    #[test]
    fn zero_arg_call_returns_value() {
        let bridge = ScriptBridge::new(512);
        let result = bridge.call("universe.particleCount", &[]).unwrap();
        assert_eq!(result, ScriptValue::Number(512.0));
    }

    #[test]
    fn extra_arguments_name_the_function() {
        let bridge = ScriptBridge::new(16);
        let err = bridge
            .call("universe.fps", &[ScriptValue::Number(42.0)])
            .unwrap_err();

        match err {
            SimError::Script(message) => {
                assert!(
                    message.contains("universe.fps"),
                    "diagnostic should name the function: {message}"
                );
            }
            other => panic!("expected script diagnostic, got {other:?}"),
        }
    }

    #[test]
    fn unknown_function_is_a_script_error() {
        let bridge = ScriptBridge::new(16);
        assert!(bridge.call("universe.mass", &[]).is_err());
    }

    #[test]
    fn frame_timing_round_trips() {
        let bridge = ScriptBridge::new(16);
        bridge.set_frame_timing(60.0, 0.016);
        assert_eq!(bridge.fps(), 60.0);
        assert!((bridge.delta_time() - 0.016).abs() < f32::EPSILON);

        let fps = bridge.call("universe.fps", &[]).unwrap();
        assert_eq!(fps, ScriptValue::Number(60.0));
    }
}
