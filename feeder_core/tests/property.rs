use feeder_core::protocol::{ControllerState, LinkEvent, LinkShared, apply_line};
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = ControllerState> {
    prop_oneof![
        Just(ControllerState::Disconnected),
        Just(ControllerState::Idle),
        Just(ControllerState::HomingZ),
        Just(ControllerState::ZMoveStarted),
        Just(ControllerState::ZMoveWaitAck1),
        Just(ControllerState::ZMoveWaitAck2),
        Just(ControllerState::HomingX),
        Just(ControllerState::XHomed),
        Just(ControllerState::MoveStarted),
        Just(ControllerState::MoveWaitComplete),
        Just(ControllerState::MoveCompleted),
        Just(ControllerState::GetPosition),
    ]
}

proptest! {
    // Arbitrary non-protocol lines never move the state machine or the
    // stored position.
    #[test]
    fn noise_never_transitions(state in any_state(), line in "[a-zA-NP-Z0-9 :.]{0,40}") {
        prop_assume!(line != "ok");
        prop_assume!(!line.starts_with("X:"));
        let mut shared = LinkShared::new();
        shared.state = state;
        let before = shared.position;
        let out = apply_line(&mut shared, &line);
        prop_assert_eq!(shared.state, state);
        prop_assert_eq!(shared.position, before);
        prop_assert_eq!(out.event, LinkEvent::Ignored);
        prop_assert_eq!(out.follow_up, None);
    }

    // Position reports with finite coordinates round-trip into the shared
    // position exactly and never advance the state machine.
    #[test]
    fn position_reports_only_touch_position(
        state in any_state(),
        x in -1000.0f64..1000.0,
        z in -1000.0f64..1000.0,
    ) {
        let mut shared = LinkShared::new();
        shared.state = state;
        let line = format!("X:{x:.2} Y:0.00 Z:{z:.2} E:0.00 Count X:0 Y:0 Z:0");
        let out = apply_line(&mut shared, &line);
        prop_assert_eq!(shared.state, state);
        match out.event {
            LinkEvent::PositionReport(p) => {
                prop_assert!((p.x - x).abs() < 0.01);
                prop_assert!((p.z - z).abs() < 0.01);
            }
            other => return Err(TestCaseError::fail(format!("expected report, got {other:?}"))),
        }
    }

    // However many acks arrive, the machine always lands in a rest state
    // and stays there.
    #[test]
    fn ack_chains_terminate(state in any_state(), extra_acks in 0usize..8) {
        let mut shared = LinkShared::new();
        shared.state = state;
        for _ in 0..8 + extra_acks {
            apply_line(&mut shared, "ok");
        }
        let terminal = matches!(
            shared.state,
            ControllerState::Disconnected
                | ControllerState::Idle
                | ControllerState::XHomed
                | ControllerState::MoveCompleted
        );
        prop_assert!(terminal, "stuck in {}", shared.state);
    }
}
