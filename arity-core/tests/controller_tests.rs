//! Per-call controller tests: channel control, DTMF, recording and a full inbound call

mod common;

use arity_core::prelude::*;
use arity_core::simulator::{events, SimulatedSwitch, SwitchRequest};
use arity_core::{CallerId, ChannelSnapshot, DialplanLocation, TerminateOn, TransportError};
use common::{connect, eventually, settle};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_channel_control_requests() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");

    call.answer().await.unwrap();
    call.ring().await.unwrap();
    call.mute(MuteDirection::In).await.unwrap();
    call.redirect("PJSIP/300").await.unwrap();

    let requests: Vec<_> = h
        .switch
        .requests()
        .into_iter()
        .filter(|r| r.name() != "subscribe")
        .collect();
    assert_eq!(
        requests,
        vec![
            SwitchRequest::Answer { channel_id: "c-1".into() },
            SwitchRequest::Ring { channel_id: "c-1".into() },
            SwitchRequest::Mute {
                channel_id: "c-1".into(),
                direction: MuteDirection::In,
            },
            SwitchRequest::Redirect {
                channel_id: "c-1".into(),
                endpoint: "PJSIP/300".into(),
            },
        ]
    );
}

#[tokio::test]
async fn test_headers_and_variables() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");

    call.set_sip_header("X-Account", "42").await.unwrap();
    assert_eq!(call.sip_header("X-Account").await.unwrap(), "42");
    call.set_pjsip_header("X-Route", "east").await.unwrap();
    assert_eq!(call.get_variable("PJSIP_HEADER(X-Route)").await.unwrap(), "east");
    call.set_talk_detect("set", "2500").await.unwrap();

    let err = call.get_variable("MISSING").await.unwrap_err();
    assert_eq!(
        err,
        ArityError::OperationFailed("Provided variable was not found".into())
    );
}

#[tokio::test]
async fn test_retries_exhausted_on_persistent_timeout() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    for _ in 0..3 {
        h.switch
            .fail_next("answer", TransportError::Timeout("no response".into()));
    }

    let err = call.answer().await.unwrap_err();
    assert!(matches!(err, ArityError::TransientTransport { attempts: 3, .. }));
    assert_eq!(h.switch.count("answer"), 3);
}

#[tokio::test]
async fn test_call_activity_follows_hangup() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");

    assert!(call.is_call_active().await);
    call.hangup_with(HangupReason::Busy).await.unwrap();
    assert!(!call.is_call_active().await);

    let err = call.hangup().await.unwrap_err();
    assert_eq!(err, ArityError::HangupFailed("Channel not found".into()));
}

#[tokio::test]
async fn test_metadata_comes_from_start_snapshot() {
    let h = connect(SimulatedSwitch::new()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.arity.register_top_level_handler(move || {
        let tx = tx.clone();
        handler_fn(move |call: CallController| async move {
            let _ = tx.send((
                call.extension().map(str::to_string),
                call.dialplan_context().map(str::to_string),
                call.priority(),
                call.caller_number().to_string(),
                call.account_code().to_string(),
                call.channel_name().to_string(),
                call.language().to_string(),
            ));
            Ok(())
        })
    });

    let channel = ChannelSnapshot {
        name: "PJSIP/alice-0001".into(),
        state: "Ring".into(),
        caller: CallerId {
            name: "Alice".into(),
            number: "5551234".into(),
        },
        accountcode: "acct-7".into(),
        dialplan: Some(DialplanLocation {
            context: "from-internal".into(),
            exten: "100".into(),
            priority: 1,
        }),
        language: Some("de".into()),
        ..ChannelSnapshot::with_id("in-1")
    };
    h.switch.emit(events::start_with(channel, Vec::new()));

    let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        seen,
        (
            Some("100".to_string()),
            Some("from-internal".to_string()),
            Some(1),
            "5551234".to_string(),
            "acct-7".to_string(),
            "PJSIP/alice-0001".to_string(),
            "de".to_string(),
        )
    );
}

#[tokio::test]
async fn test_language_falls_back_to_config() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    assert_eq!(call.language(), "en");
}

#[tokio::test]
async fn test_call_state_values() {
    let h = connect(SimulatedSwitch::new()).await;
    let mut call = h.call("c-1");

    call.put("attempts", 2u8);
    assert!(call.contains("attempts"));
    assert_eq!(call.get::<String>("attempts"), None);
    assert_eq!(call.remove::<u8>("attempts"), Some(2));
    assert!(!call.contains("attempts"));

    let state = call.into_state();
    assert_eq!(state.channel_id(), "c-1");
}

#[tokio::test]
async fn test_dtmf_stops_at_terminator() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let input = Arc::new(call.receive_dtmf().with_max_digits(4));
    let running = tokio::spawn({
        let input = Arc::clone(&input);
        async move { input.run().await }
    });
    eventually(|| !h.arity.registry().is_empty()).await;

    for digit in ['1', '2', '#', '3'] {
        h.switch.emit(events::dtmf("c-1", digit));
    }
    h.switch.emit(events::dtmf("c-2", '9'));

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Completed("12".to_string()));
    assert!(h.arity.registry().is_empty());
}

#[tokio::test]
async fn test_dtmf_stops_at_max_digits() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let input = Arc::new(call.receive_dtmf().with_terminator(None).with_max_digits(3));
    let running = tokio::spawn({
        let input = Arc::clone(&input);
        async move { input.run().await }
    });
    eventually(|| !h.arity.registry().is_empty()).await;

    for digit in ['#', '0', '7'] {
        h.switch.emit(events::dtmf("c-1", digit));
    }

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Completed("#07".to_string()));
}

#[tokio::test]
async fn test_dtmf_cancel_keeps_partial_input() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let input = Arc::new(call.receive_dtmf().with_max_digits(6));
    let running = tokio::spawn({
        let input = Arc::clone(&input);
        async move { input.run().await }
    });
    eventually(|| !h.arity.registry().is_empty()).await;

    h.switch.emit(events::dtmf("c-1", '4'));
    eventually(|| input.digits() == "4").await;
    input.cancel().await.unwrap();

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Canceled("4".to_string()));
}

#[tokio::test]
async fn test_channel_recording_finishes_on_event() {
    let h = connect(SimulatedSwitch::new().with_auto_complete()).await;
    let call = h.call("c-1");
    let options = RecordOptions::default()
        .with_name("voicemail-1")
        .with_format("wav")
        .with_max_duration(30)
        .with_beep(true)
        .with_terminate_on(TerminateOn::Any);
    let record = Arc::new(call.record(options));
    let running = tokio::spawn({
        let record = Arc::clone(&record);
        async move { record.run().await }
    });

    h.switch.wait_for("record").await;
    // A recording of the same name on another channel does not count
    h.switch
        .emit(events::recording_finished("voicemail-1", "channel:c-2"));
    settle().await;
    assert!(!running.is_finished());

    h.switch.emit(events::recording_finished("voicemail-1", "channel:c-1"));
    let report = running.await.unwrap().unwrap().into_inner();
    assert_eq!(report.recording.name, "voicemail-1");
    assert_eq!(report.recording.channel_id(), Some("c-1"));
    assert_eq!(record.state(), OperationState::Completed);
}

#[tokio::test]
async fn test_channel_recording_cancel_stops_it() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let record = Arc::new(call.record(RecordOptions::default().with_name("memo")));
    let running = tokio::spawn({
        let record = Arc::clone(&record);
        async move { record.run().await }
    });

    h.switch.wait_for("record").await;
    settle().await;
    record.cancel().await.unwrap();

    let outcome = running.await.unwrap().unwrap();
    assert!(outcome.is_canceled());
    assert_eq!(outcome.value().recording.name, "memo");
    assert_eq!(
        h.switch.requests_named("stop_recording"),
        vec![SwitchRequest::StopRecording { name: "memo".into() }]
    );
}

#[tokio::test]
async fn test_full_inbound_call() {
    let h = connect(SimulatedSwitch::new().with_auto_complete()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.arity.register_top_level_handler(move || {
        let tx = tx.clone();
        handler_fn(move |call: CallController| async move {
            call.answer().await?;
            let greeting = call.play("welcome").with_repeat(2).run().await;
            let played = greeting.map(|outcome| outcome.into_inner().played);
            let dial = call.dial("PJSIP/200");
            let report = dial.run().await.map(Outcome::into_inner);
            let result = call.end_call(played.and_then(|p| report.map(|r| (p, r)))).await;
            let _ = tx.send(result);
            Ok(())
        })
    });

    h.switch.emit(events::start("in-1"));
    let dial = match h.switch.wait_for("dial").await {
        SwitchRequest::Dial { channel_id, .. } => channel_id,
        other => panic!("unexpected request {other:?}"),
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.switch.emit(events::hangup(&dial));

    let (played, report) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(played, 2);
    assert!(report.answered());
    assert_eq!(report.ended_by, EndedBy::Callee);

    let hangups = h.switch.requests_named("hangup");
    assert_eq!(
        hangups,
        vec![SwitchRequest::Hangup {
            channel_id: "in-1".into(),
            reason: None,
        }]
    );
}
