use feeder_config::{Config, SNAPSHOT_SCHEMA_VERSION, Snapshot};
use rstest::rstest;

#[rstest]
fn defaults_validate() {
    Config::default().validate().expect("defaults are valid");
}

#[rstest]
fn partial_toml_fills_from_defaults() {
    let cfg = Config::from_toml_str(
        r#"
        [schedule]
        mode = "daily"
        daily_hour = 7
        "#,
    )
    .expect("parse");
    assert_eq!(cfg.schedule.mode, "daily");
    assert_eq!(cfg.schedule.daily_hour, 7);
    assert_eq!(cfg.schedule.daily_minute, 30, "untouched field keeps default");
    assert_eq!(cfg.serial.port, "/dev/ttyACM0");
    assert_eq!(cfg.geometry.eject_last, 318.0);
    assert_eq!(cfg.pins.button_ok, 13);
}

#[rstest]
#[case("[serial]\nbaud = 0")]
#[case("[schedule]\nmode = \"hourly\"")]
#[case("[schedule]\ninterval_hours = 0.5")]
#[case("[schedule]\ninterval_hours = 72.0")]
#[case("[schedule]\ndaily_hour = 24")]
#[case("[schedule]\ndaily_minute = 60")]
#[case("[geometry]\ncartridge_height = 0.0")]
#[case("[limits]\nmax_cans = 0")]
fn bad_values_are_rejected(#[case] toml: &str) {
    assert!(Config::from_toml_str(toml).is_err(), "accepted: {toml}");
}

#[rstest]
fn unknown_toml_keys_are_tolerated() {
    // serde(deny_unknown_fields) is deliberately NOT set; a future key
    // must not break an old binary.
    let cfg = Config::from_toml_str("[serial]\nfuture_knob = 3");
    assert!(cfg.is_ok());
}

#[rstest]
fn snapshot_round_trips_through_json() {
    let snap = Snapshot {
        cans_loaded: 4,
        controller_state: "idle".into(),
        next_feed_at: 1_773_000_000,
        ..Default::default()
    };
    let text = serde_json::to_string(&snap).expect("serialize");
    let back: Snapshot = serde_json::from_str(&text).expect("parse");
    assert_eq!(back, snap);
    assert_eq!(back.schema_version, SNAPSHOT_SCHEMA_VERSION);
}

#[rstest]
fn snapshot_ignores_unknown_fields() {
    let text = r#"{
        "schema_version": 1,
        "phase": "idle",
        "controller_state": "idle",
        "x_position": 0.0,
        "z_position": 181.0,
        "cans_loaded": 3,
        "eject_last": 318.0,
        "schedule_mode": "interval",
        "interval_hours": 8.0,
        "daily_hour": 6,
        "daily_minute": 30,
        "next_feed_at": 0,
        "saved_at": 100,
        "added_in_v2": true
    }"#;
    let snap: Snapshot = serde_json::from_str(text).expect("parse");
    assert_eq!(snap.cans_loaded, 3);
    assert_eq!(snap.z_position, 181.0);
}
