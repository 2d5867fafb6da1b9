use std::time::{Duration, Instant};

use feeder_core::mocks::mock_transport;
use feeder_core::protocol::{Axis, ControllerState};
use feeder_core::MotionLink;
use rstest::rstest;

const WAIT: Duration = Duration::from_secs(2);

fn wait_for_state(link: &MotionLink, want: ControllerState) {
    let deadline = Instant::now() + WAIT;
    while link.state() != want {
        assert!(Instant::now() < deadline, "timed out waiting for {want}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[rstest]
fn connect_enters_absolute_mode() {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G90"));
    assert_eq!(link.state(), ControllerState::Idle);
}

#[rstest]
fn x_move_runs_the_full_ack_arc() {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G90"));

    link.move_linear(Axis::X, 165.0, 600.0);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G0 X165.00 F600"));
    assert_eq!(link.state(), ControllerState::MoveStarted);
    assert_eq!(link.position().x, 165.0, "optimistic position update");

    // Request ack triggers the wait-for-moves follow-up from the reader.
    handle.respond("ok");
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("M400"));
    wait_for_state(&link, ControllerState::MoveWaitComplete);

    handle.respond("ok");
    wait_for_state(&link, ControllerState::MoveCompleted);
}

#[rstest]
fn home_completes_on_report_then_ack() {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G90"));

    link.home_axis(Axis::X);
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("G28 X"));

    handle.respond("X:0.00 Y:0.00 Z:37.00 Count X:0 Y:0 Z:0");
    handle.respond("ok");
    wait_for_state(&link, ControllerState::XHomed);
    assert_eq!(link.position().z, 37.0);
}

#[rstest]
fn lines_split_across_chunks_reassemble() {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    let _ = handle.next_sent(WAIT);

    link.set_state(ControllerState::HomingZ);
    // "ok\r\n" delivered in fragments.
    handle.respond_bytes(b"o");
    handle.respond_bytes(b"k");
    handle.respond_bytes(b"\r\n");
    wait_for_state(&link, ControllerState::Idle);
}

#[rstest]
fn fan_percent_maps_to_duty() {
    let (w, r, handle) = mock_transport();
    let link = MotionLink::connect(w, r);
    let _ = handle.next_sent(WAIT);

    link.set_fan_speed(0, 100);
    link.set_fan_speed(1, 50);
    link.set_fan_speed(0, 200); // clamped
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("M106 P0 S255"));
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("M106 P1 S127"));
    assert_eq!(handle.next_sent(WAIT).as_deref(), Some("M106 P0 S255"));
}

#[rstest]
fn disconnect_drops_further_commands() {
    let (w, r, handle) = mock_transport();
    let mut link = MotionLink::connect(w, r);
    let _ = handle.next_sent(WAIT);

    link.disconnect();
    assert!(!link.is_connected());
    link.move_linear(Axis::X, 10.0, 600.0);
    assert_eq!(handle.next_sent(Duration::from_millis(100)), None);
}
