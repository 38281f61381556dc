use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use line_counter::config::CounterConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "COUNTER_CONFIG",
        "COUNTER_DB_PATH",
        "COUNTER_CLASSES",
        "COUNTER_MODEL",
        "COUNTER_BACKEND",
        "COUNTER_API_ADDR",
        "COUNTER_TOLERANCE",
        "COUNTER_FRAME_SKIP",
        "COUNTER_UPLOAD_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        db_path = "counts_prod.db"
        classes_path = "rice/data.yaml"

        [model]
        backend = "scripted"
        path = "replay.json"
        min_confidence = 0.45
        iou = 0.6

        [counting]
        line_y = 300
        tolerance = 8
        frame_skip = 2

        [tracker]
        iou_threshold = 0.4
        max_missing = 12

        [api]
        addr = "0.0.0.0:9100"
        max_upload_bytes = 1048576
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("COUNTER_CONFIG", file.path());
    std::env::set_var("COUNTER_TOLERANCE", "3");
    std::env::set_var("COUNTER_UPLOAD_DIR", "/var/tmp/uploads");

    let cfg = CounterConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "counts_prod.db");
    assert_eq!(cfg.classes_path, PathBuf::from("rice/data.yaml"));
    assert_eq!(cfg.model.backend, "scripted");
    assert_eq!(cfg.model.path, Some(PathBuf::from("replay.json")));
    assert_eq!(cfg.model.min_confidence, 0.45);
    assert_eq!(cfg.model.iou, 0.6);
    assert_eq!(cfg.counting.line_y, Some(300));
    assert_eq!(cfg.counting.tolerance, 3);
    assert_eq!(cfg.counting.frame_skip, 2);
    assert_eq!(cfg.tracker.iou_threshold, 0.4);
    assert_eq!(cfg.tracker.max_missing, 12);
    assert_eq!(cfg.api.addr, "0.0.0.0:9100");
    assert_eq!(cfg.api.max_upload_bytes, 1_048_576);
    assert_eq!(cfg.api.upload_dir, Some(PathBuf::from("/var/tmp/uploads")));

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_BACKEND", "scripted");
    std::env::set_var("COUNTER_MODEL", "frames.json");
    let cfg = CounterConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "counter.db");
    assert_eq!(cfg.classes_path, PathBuf::from("data.yaml"));
    assert_eq!(cfg.model.backend, "scripted");
    assert_eq!(cfg.model.path, Some(PathBuf::from("frames.json")));
    assert_eq!(cfg.model.min_confidence, 0.3);
    assert_eq!(cfg.model.iou, 0.7);
    assert_eq!(cfg.counting.line_y, None);
    assert_eq!(cfg.counting.tolerance, 5);
    assert_eq!(cfg.counting.frame_skip, 1);
    assert_eq!(cfg.api.addr, "127.0.0.1:8800");

    clear_env();
}

#[test]
fn rejects_invalid_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("COUNTER_FRAME_SKIP", "0");
    assert!(CounterConfig::load().is_err());

    std::env::set_var("COUNTER_FRAME_SKIP", "every-other");
    assert!(CounterConfig::load().is_err());

    clear_env();
    std::env::set_var("COUNTER_TOLERANCE", "-1");
    assert!(CounterConfig::load().is_err());

    clear_env();
}
