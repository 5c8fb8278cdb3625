#[cfg(test)]
mod units {
    use crate::constants::{bodies, scale};
    use crate::params::{Config, DEMO_PRESETS, SimParams};

    #[test]
    fn preset_table_has_ten_entries() {
        assert_eq!(DEMO_PRESETS.len(), 10);
    }

    #[test]
    fn preset_lookup_wraps() {
        assert_eq!(SimParams::preset(0), SimParams::preset(10));
        assert_eq!(SimParams::preset(3), SimParams::preset(13));
    }

    #[test]
    fn presets_fold_in_time_scale() {
        // First row of the table is 0.005 before scaling.
        let p = SimParams::preset(0);
        assert!((p.time_step - scale::K_TIME * 0.005).abs() < f32::EPSILON);
        assert_eq!(p.config, Config::Shell);
    }

    #[test]
    fn softening_sq_is_square_of_softening() {
        let p = SimParams::preset(2);
        assert!((p.softening_sq() - p.softening * p.softening).abs() < f32::EPSILON);
    }

    #[test]
    fn config_cycle_visits_every_variant() {
        let mut config = Config::Random;
        let mut seen = Vec::new();
        for _ in 0..Config::COUNT {
            seen.push(config);
            config = config.next();
        }
        assert_eq!(config, Config::Random);
        assert_eq!(seen.len(), Config::COUNT);
        assert!(seen.contains(&Config::Script));
    }

    #[test]
    fn body_count_validation_requires_workgroup_multiple() {
        assert!(SimParams::valid_body_count(bodies::COUNT));
        assert!(SimParams::valid_body_count(256));
        assert!(!SimParams::valid_body_count(0));
        assert!(!SimParams::valid_body_count(1000));
    }

    #[test]
    fn params_equality_and_copy_semantics() {
        let a = SimParams::preset(1);
        let b = a;
        assert_eq!(a, b);
        let mut c = a;
        c.damping = 0.5;
        assert_ne!(a, c);
    }

    #[test]
    fn params_round_trip_through_json() {
        let p = SimParams::preset(4);
        let text = serde_json::to_string(&p).expect("serialize params");
        let back: SimParams = serde_json::from_str(&text).expect("deserialize params");
        assert_eq!(p, back);
    }
}
