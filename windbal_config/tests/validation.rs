use std::io::Write;

use rstest::rstest;
use windbal_config::{Orientation, load_file, load_toml};

const MINIMAL: &str = r#"
[channels]
sting = [301, 302, 303]
"#;

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(MINIMAL).expect("parse TOML");
    cfg.validate().expect("minimal config should pass");
    assert_eq!(cfg.channels.sting.channels, vec![301, 302, 303]);
    assert_eq!(cfg.channels.sting.orientation, Orientation::Normal);
    assert_eq!(cfg.acquisition.live_window, 50);
    assert_eq!(cfg.instrument.model, "DAQ970A");
    assert!(cfg.instrument.address.is_none());
    assert!(cfg.log.enabled);
}

#[test]
fn full_config_parses_every_section() {
    let toml = r#"
[instrument]
address = "10.0.0.5:5025"
timeout_ms = 500

[channels]
pressure = [101, 102]
velocity = [103]
temperature = [104]
sting = { channels = [301, 302, 303], orientation = "side" }

[acquisition]
interval_ms = 5
live_window = 20

[log]
dir = "/tmp/runs"
flush_every = 10

[logging]
level = "debug"
rotation = "daily"

[calibration.side]
cinv = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
cinv_c2 = [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.instrument.address.as_deref(), Some("10.0.0.5:5025"));
    assert_eq!(cfg.channels.total(), 7);
    assert_eq!(cfg.channels.sting.orientation, Orientation::Side);
    assert_eq!(cfg.acquisition.interval_ms, 5);
    assert!(cfg.calibration.side.is_some());
    assert!(cfg.calibration.normal.is_none());
}

#[rstest]
#[case("\"normal\"", Orientation::Normal)]
#[case("\"Side\"", Orientation::Side)]
#[case("\"SIDE\"", Orientation::Side)]
fn orientation_accepts_common_spellings(#[case] lit: &str, #[case] expected: Orientation) {
    let toml = format!("[channels]\nsting = {{ channels = [1, 2, 3], orientation = {lit} }}\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert_eq!(cfg.channels.sting.orientation, expected);
}

#[test]
fn group_order_is_fixed() {
    let toml = r#"
[channels]
sting = [9]
temperature = [7]
pressure = [1]
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let names: Vec<&str> = cfg.channels.groups().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["pressure", "velocity", "temperature", "sting"]);
}

#[rstest]
#[case("[channels]\npressure = [101]\nsting = [101, 102, 103]\n", "channel 101 appears in both pressure and sting")]
#[case("[channels]\n", "at least one channel")]
#[case("[channels]\nsting = [1]\n[acquisition]\nlive_window = 0\n", "live_window must be >= 1")]
#[case("[channels]\nsting = [1]\n[acquisition]\ninterval_ms = 120000\n", "interval_ms is unreasonably large")]
#[case("[channels]\nsting = [1]\n[acquisition]\nevent_capacity = 0\n", "event_capacity must be >= 1")]
#[case("[channels]\nsting = [1]\n[instrument]\ntimeout_ms = 0\n", "timeout_ms must be >= 1")]
#[case("[channels]\nsting = [1]\n[log]\nflush_every = 0\n", "flush_every must be >= 1")]
#[case("[channels]\nsting = [1]\n[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
#[case(
    "[channels]\nsting = [1]\n[calibration.normal]\ncinv = [[nan, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]\ncinv_c2 = [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]\n",
    "calibration.normal matrices must be finite"
)]
fn invalid_configs_are_rejected(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} missing {needle:?}");
}

#[test]
fn channels_section_is_required() {
    assert!(load_toml("[acquisition]\ninterval_ms = 1\n").is_err());
}

#[test]
fn load_file_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rig.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "[channels]\npressure = [5]\nvelocity = [5]").unwrap();
    drop(f);

    let err = load_file(&path).expect_err("duplicate channel");
    let chain = format!("{err:#}");
    assert!(chain.contains("invalid configuration"));
    assert!(chain.contains("channel 5 appears in both pressure and velocity"));
}

#[test]
fn load_file_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_file(&dir.path().join("absent.toml")).expect_err("missing");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/windbal.toml");
    let cfg = load_file(&path).expect("sample config loads");
    assert_eq!(cfg.channels.total(), 9);
    assert!(cfg.instrument.address.is_none());
}
