use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use feeder_core::mocks::{MockTransportHandle, mock_transport};
use feeder_core::protocol::ControllerState;
use feeder_core::sequencer::DispensePhase;
use feeder_core::{
    Engine, FAN_COOLDOWN_SECS, FeedScheduler, FeederError, Geometry, MotionLink, NullSink,
    ScheduleMode,
};
use rstest::rstest;

const WAIT: Duration = Duration::from_secs(2);

fn at(h: u32, mi: u32, s: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 3, 10, h, mi, s)
        .single()
        .expect("unambiguous local time")
}

fn engine_with_cans(cans: u32) -> (Engine<NullSink>, MockTransportHandle) {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G90"));
    let sched = FeedScheduler::new(ScheduleMode::Interval, 8.0, 6, 30);
    let mut engine = Engine::new(link, Geometry::default(), 6, sched, NullSink);
    engine.restore(&feeder_config::Snapshot {
        cans_loaded: cans,
        ..Default::default()
    });
    (engine, handle)
}

/// Run the startup arc to completion by faking motion completions.
fn finish_startup(engine: &mut Engine<NullSink>, now: DateTime<Local>) {
    engine.begin_startup(now);
    for _ in 0..8 {
        engine.tick(now);
        if engine.link().state() != ControllerState::Idle {
            engine.link().set_state(ControllerState::Idle);
        }
        if engine.startup_complete() {
            return;
        }
    }
    panic!("startup did not complete");
}

#[rstest]
fn startup_latches_once_everything_is_at_rest() {
    let (mut engine, _handle) = engine_with_cans(2);
    assert!(!engine.startup_complete());
    finish_startup(&mut engine, at(5, 0, 0));
    assert_eq!(engine.phase(), DispensePhase::Idle);
}

#[rstest]
fn empty_magazine_startup_parks_in_loading() {
    let (mut engine, _handle) = engine_with_cans(0);
    finish_startup(&mut engine, at(5, 0, 0));
    assert_eq!(engine.phase(), DispensePhase::LoadingFirst);
    // Feeding from the loading hold is refused.
    assert!(matches!(
        engine.start_dispense(at(5, 0, 1).timestamp()),
        Err(FeederError::NoCans)
    ));
}

#[rstest]
fn dispense_spins_up_fans_before_motion() {
    let (mut engine, handle) = engine_with_cans(2);
    finish_startup(&mut engine, at(5, 0, 0));
    let _ = handle.drain_sent();

    engine.start_dispense(at(5, 0, 1).timestamp()).expect("start");
    engine.tick(at(5, 0, 1));
    let sent = handle.drain_sent();
    assert_eq!(sent[..2], ["M106 P0 S255", "M106 P1 S255"]);
    assert_eq!(sent[2], "G28 X", "fans first, then the first phase");
    assert!(engine.is_busy());
}

#[rstest]
fn second_feed_during_operation_is_rejected() {
    let (mut engine, _handle) = engine_with_cans(2);
    finish_startup(&mut engine, at(5, 0, 0));

    engine.start_dispense(at(5, 0, 1).timestamp()).expect("start");
    assert!(matches!(
        engine.start_dispense(at(5, 0, 2).timestamp()),
        Err(FeederError::Busy(_))
    ));
    // Manual feed swallows the rejection.
    engine.manual_feed(at(5, 0, 2).timestamp());
    assert!(engine.is_busy());
}

#[rstest]
fn dispense_with_no_cans_is_rejected() {
    let (mut engine, _handle) = engine_with_cans(1);
    finish_startup(&mut engine, at(5, 0, 0));
    engine.set_cans_loaded(0, at(5, 0, 1).timestamp());
    // Setting the count re-seats the stack; let that move finish.
    engine.link().set_state(ControllerState::Idle);
    assert!(matches!(
        engine.start_dispense(at(5, 0, 2).timestamp()),
        Err(FeederError::NoCans)
    ));
}

#[rstest]
fn completion_arms_the_fan_cooldown() {
    let (mut engine, handle) = engine_with_cans(2);
    finish_startup(&mut engine, at(5, 0, 0));

    let t0 = at(5, 0, 1);
    engine.start_eject(t0.timestamp()).expect("start");
    // Drive every phase to completion.
    for _ in 0..12 {
        engine.tick(t0);
        if engine.link().state() != ControllerState::Idle {
            engine.link().set_state(match engine.link().state() {
                ControllerState::HomingX => ControllerState::XHomed,
                ControllerState::MoveStarted => ControllerState::MoveCompleted,
                _ => ControllerState::Idle,
            });
        }
        if !engine.is_busy() {
            break;
        }
    }
    assert!(!engine.is_busy());
    assert_eq!(engine.cans_loaded(), 1);
    let _ = handle.drain_sent();

    // Before the cooldown elapses the fans stay on.
    engine.tick(at(5, 4, 0));
    assert!(handle.drain_sent().is_empty());

    let off = at(5, 0, 1).timestamp() + FAN_COOLDOWN_SECS;
    let off_time = at(5, 5, 30);
    assert!(off_time.timestamp() >= off);
    engine.tick(off_time);
    assert_eq!(handle.drain_sent(), ["M106 P0 S0", "M106 P1 S0"]);
}

#[rstest]
fn scheduled_feed_fires_and_rearms() {
    let (mut engine, handle) = engine_with_cans(2);
    finish_startup(&mut engine, at(5, 0, 0));
    let armed = engine.scheduler().next_feed_at().expect("armed");
    let _ = handle.drain_sent();

    // One second before the trigger nothing happens.
    let before = chrono::Local.timestamp_opt(armed - 1, 0).single().expect("ts");
    engine.tick(before);
    assert!(!engine.is_busy());

    let due = chrono::Local.timestamp_opt(armed, 0).single().expect("ts");
    engine.tick(due);
    assert!(engine.is_busy(), "feed started at the trigger");
    assert_eq!(
        engine.scheduler().next_feed_at(),
        Some(armed + 8 * 3600),
        "re-armed before the operation runs"
    );
}

#[rstest]
fn scheduled_feed_waits_for_startup() {
    let (mut engine, _handle) = engine_with_cans(2);
    // Trigger already due, startup not run.
    engine.begin_startup(at(5, 0, 0));
    let due = at(23, 0, 0);
    engine.tick(due);
    assert_eq!(engine.phase(), DispensePhase::InitialZHoming, "startup arc only");
}

#[rstest]
fn abort_stops_motion_and_fans() {
    let (mut engine, handle) = engine_with_cans(2);
    finish_startup(&mut engine, at(5, 0, 0));
    engine.start_dispense(at(5, 0, 1).timestamp()).expect("start");
    engine.tick(at(5, 0, 1));
    let _ = handle.drain_sent();

    engine.abort(at(5, 0, 2).timestamp());
    assert!(!engine.is_busy());
    assert_eq!(engine.phase(), DispensePhase::Idle);
    assert_eq!(
        handle.drain_sent(),
        ["M112", "M106 P0 S0", "M106 P1 S0"]
    );

    // No cooldown fires later; the fans are already off.
    engine.tick(at(5, 30, 0));
    assert!(handle.drain_sent().is_empty());
}

#[rstest]
fn shutdown_refuses_new_operations() {
    let (mut engine, _handle) = engine_with_cans(2);
    finish_startup(&mut engine, at(5, 0, 0));
    engine.shutdown(at(6, 0, 0).timestamp());
    assert!(matches!(
        engine.start_dispense(at(6, 0, 1).timestamp()),
        Err(FeederError::Busy(_))
    ));
}

#[rstest]
fn restore_brings_back_the_runtime_schedule() {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G90"));
    // Config seeded an 8 h interval; the machine was switched to a daily
    // 21:15 schedule before it powered down.
    let sched = FeedScheduler::new(ScheduleMode::Interval, 8.0, 6, 30);
    let mut engine = Engine::new(link, Geometry::default(), 6, sched, NullSink);

    let trigger = at(21, 15, 0).timestamp();
    engine.restore(&feeder_config::Snapshot {
        cans_loaded: 2,
        schedule_mode: "daily".to_string(),
        interval_hours: 2.5,
        daily_hour: 21,
        daily_minute: 15,
        next_feed_at: trigger,
        ..Default::default()
    });

    let s = engine.scheduler();
    assert_eq!(s.mode(), ScheduleMode::Daily);
    assert!((s.interval_hours() - 2.5).abs() < f64::EPSILON);
    assert_eq!(s.daily_time(), (21, 15));
    assert_eq!(s.next_feed_at(), Some(trigger));

    // The restored trigger is reinterpreted under the restored mode:
    // firing it advances a full day, not 8 config hours.
    finish_startup(&mut engine, at(20, 0, 0));
    engine.tick(at(21, 15, 0));
    assert_eq!(engine.scheduler().next_feed_at(), Some(trigger + 86_400));
}
