use std::sync::Mutex;

use tempfile::NamedTempFile;

use signal_kernel::EngineConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SIGNAL_CONFIG",
        "SIGNAL_SOURCE",
        "SIGNAL_LINE_Y",
        "SIGNAL_CONFIDENCE",
        "SIGNAL_FRAME_SKIP",
        "SIGNAL_DB_PATH",
        "SIGNAL_APPROACH_ID",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "approach_id": "approach:north_1",
        "source": "/var/lib/signal/north.jsonl",
        "db_path": "signal_prod.db",
        "line_y": 410,
        "frame_skip": 3,
        "vehicle_class_ids": [2, 7],
        "timing": { "min_green_s": 12, "max_green_s": 75, "vehicle_unit_s": 3 },
        "density": { "low_upper": 4, "medium_upper": 12 },
        "emergency": { "confidence_floor": 0.7, "release_frames": 5 },
        "ledger": { "max_idle_frames": 300 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SIGNAL_CONFIG", file.path());
    std::env::set_var("SIGNAL_LINE_Y", "430");
    std::env::set_var("SIGNAL_CONFIDENCE", "0.55");
    std::env::set_var("SIGNAL_APPROACH_ID", "Approach:North_2");

    let cfg = EngineConfig::load().expect("load config");

    assert_eq!(cfg.approach_id, "approach:north_2");
    assert_eq!(cfg.source, "/var/lib/signal/north.jsonl");
    assert_eq!(cfg.db_path, "signal_prod.db");
    assert_eq!(cfg.line_y, 430);
    assert!((cfg.confidence_threshold - 0.55).abs() < f32::EPSILON);
    assert_eq!(cfg.frame_skip, 3);
    assert_eq!(cfg.vehicle_class_ids, vec![2, 7]);
    assert_eq!(cfg.timing.min_green_s, 12);
    assert_eq!(cfg.timing.max_green_s, 75);
    assert_eq!(cfg.timing.vehicle_unit_s, 3);
    assert_eq!(cfg.density.low_upper, 4);
    assert_eq!(cfg.density.medium_upper, 12);
    assert_eq!(cfg.emergency.release_frames, 5);
    assert_eq!(cfg.ledger.max_idle_frames, Some(300));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
source = "stub://rush_hour"
line_y = 380

[timing]
max_green_s = 90
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("SIGNAL_CONFIG", file.path());
    std::env::set_var("SIGNAL_SOURCE", "stub://overnight");

    let cfg = EngineConfig::load().expect("load config");
    assert_eq!(cfg.source, "stub://overnight");
    assert_eq!(cfg.line_y, 380);
    assert_eq!(cfg.timing.max_green_s, 90);
    assert_eq!(cfg.timing.min_green_s, 10);

    clear_env();
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EngineConfig::load().expect("load config");
    assert_eq!(cfg, {
        let mut defaults = EngineConfig::default();
        defaults.validate().unwrap();
        defaults
    });
    assert_eq!(cfg.approach_id, "approach:main");
    assert_eq!(cfg.source, "stub://intersection");
    assert_eq!(cfg.confidence_threshold, 0.4);
    assert_eq!(cfg.emergency.confidence_floor, 0.6);
    assert_eq!(cfg.ledger.max_idle_frames, None);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SIGNAL_FRAME_SKIP", "0");
    let err = EngineConfig::load().unwrap_err();
    assert!(err.to_string().contains("frame_skip"), "{}", err);
    clear_env();

    std::env::set_var("SIGNAL_LINE_Y", "middle");
    let err = EngineConfig::load().unwrap_err();
    assert!(err.to_string().contains("SIGNAL_LINE_Y"), "{}", err);
    clear_env();

    std::env::set_var("SIGNAL_CONFIDENCE", "1.5");
    assert!(EngineConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_inverted_timing_in_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "timing": { "min_green_s": 70, "max_green_s": 60 } }"#,
    )
    .expect("write config");
    std::env::set_var("SIGNAL_CONFIG", file.path());

    let err = EngineConfig::load().unwrap_err();
    assert!(err.to_string().starts_with("config:"), "{}", err);

    clear_env();
}
