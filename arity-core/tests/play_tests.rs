//! Playback operation tests

mod common;

use arity_core::prelude::*;
use arity_core::simulator::{events, SimulatedSwitch, SwitchRequest};
use arity_core::{MediaTarget, TransportError};
use common::{connect, eventually, settle};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn playback_id(request: &SwitchRequest) -> String {
    match request {
        SwitchRequest::Play { playback_id, .. } => playback_id.clone(),
        other => panic!("not a play request: {other:?}"),
    }
}

#[tokio::test]
async fn test_repeated_playbacks_run_one_after_another() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let play = Arc::new(call.play("hello-world").with_repeat(3));
    let running = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });

    let mut ids = Vec::new();
    for n in 1..=3 {
        let request = h.switch.wait_for_nth("play", n).await;
        settle().await;
        assert_eq!(h.switch.count("play"), n, "next playback started early");
        let id = playback_id(&request);
        assert_eq!(play.current_playback_id().as_deref(), Some(id.as_str()));
        h.switch.emit(events::playback_finished(&id, "channel:c-1"));
        ids.push(id);
    }

    let report = running.await.unwrap().unwrap().into_inner();
    assert_eq!(report.played, 3);
    assert_eq!(report.last_playback.unwrap().id, ids[2]);
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(h.arity.registry().is_empty());
}

#[tokio::test]
async fn test_zero_repeats_complete_without_requests() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");

    let outcome = call.play("hello-world").with_repeat(0).run().await.unwrap();
    assert_eq!(outcome, Outcome::Completed(PlayReport::default()));
    assert_eq!(h.switch.count("play"), 0);
}

#[tokio::test]
async fn test_play_requests_carry_media_uri() {
    let h = connect(SimulatedSwitch::new().with_auto_complete()).await;
    let call = h.call("c-1");

    call.play("hello-world").with_language("fr").run().await.unwrap();
    call.play_recording("greeting").run().await.unwrap();

    let requests = h.switch.requests_named("play");
    let uris: Vec<_> = requests
        .iter()
        .map(|r| match r {
            SwitchRequest::Play { target, media_uri, .. } => (target.clone(), media_uri.clone()),
            other => panic!("not a play request: {other:?}"),
        })
        .collect();
    assert_eq!(
        uris,
        vec![
            (MediaTarget::Channel("c-1".into()), "sound:hello-world".to_string()),
            (MediaTarget::Channel("c-1".into()), "recording:greeting".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_foreign_playback_events_are_ignored() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let play = Arc::new(call.play("hello-world"));
    let running = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });

    let id = playback_id(&h.switch.wait_for("play").await);
    h.switch.emit(events::playback_finished("someone-else", "channel:c-1"));
    settle().await;
    assert!(!running.is_finished());

    h.switch.emit(events::playback_finished(&id, "channel:c-1"));
    let report = running.await.unwrap().unwrap().into_inner();
    assert_eq!(report.played, 1);
}

#[tokio::test]
async fn test_cancel_stops_current_playback() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let play = Arc::new(call.play("hold-music").with_repeat(5));
    let running = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });

    let first = playback_id(&h.switch.wait_for("play").await);
    h.switch.emit(events::playback_finished(&first, "channel:c-1"));
    let second = playback_id(&h.switch.wait_for_nth("play", 2).await);
    eventually(|| play.current_playback_id().as_deref() == Some(second.as_str())).await;

    play.cancel().await.unwrap();
    play.cancel().await.unwrap();

    let outcome = running.await.unwrap().unwrap();
    assert!(outcome.is_canceled());
    assert_eq!(outcome.value().played, 1);
    assert_eq!(
        h.switch.requests_named("stop_playback"),
        vec![SwitchRequest::StopPlayback { playback_id: second }]
    );
    assert_eq!(h.switch.count("play"), 2);
    assert_eq!(play.state(), OperationState::Canceled);
}

#[tokio::test]
async fn test_cancel_while_starting_stops_after_acknowledgement() {
    let h = connect(SimulatedSwitch::new()).await;
    h.switch.delay_next("play", Duration::from_millis(200));
    let call = h.call("c-1");
    let play = Arc::new(call.play("hold-music"));
    let running = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });

    let started = playback_id(&h.switch.wait_for("play").await);
    eventually(|| play.current_playback_id().is_some()).await;
    let canceling = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.cancel().await }
    });

    // The start is still unanswered, so nothing is stopped yet
    settle().await;
    assert_eq!(h.switch.count("stop_playback"), 0);

    canceling.await.unwrap().unwrap();
    assert_eq!(
        h.switch.requests_named("stop_playback"),
        vec![SwitchRequest::StopPlayback { playback_id: started }]
    );

    let outcome = running.await.unwrap().unwrap();
    assert!(outcome.is_canceled());
    assert_eq!(outcome.value().played, 0);
    assert!(h.arity.registry().is_empty());
}

#[tokio::test]
async fn test_cancel_while_start_is_refused_sends_no_stop() {
    let h = connect(SimulatedSwitch::new()).await;
    h.switch.delay_next("play", Duration::from_millis(200));
    h.switch
        .fail_next("play", TransportError::rejected(404, "Channel not found"));
    let call = h.call("c-1");
    let play = Arc::new(call.play("hold-music"));
    let running = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });

    h.switch.wait_for("play").await;
    eventually(|| play.current_playback_id().is_some()).await;
    play.cancel().await.unwrap();

    assert!(running.await.unwrap().unwrap().is_canceled());
    assert_eq!(h.switch.count("stop_playback"), 0);
}

#[tokio::test]
async fn test_cancel_resolves_even_if_stop_fails() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let play = Arc::new(call.play("hold-music"));
    let running = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });

    h.switch.wait_for("play").await;
    eventually(|| play.current_playback_id().is_some()).await;
    h.switch
        .fail_next("stop_playback", TransportError::rejected(404, "Playback not found"));

    let err = play.cancel().await.unwrap_err();
    assert!(matches!(err, ArityError::PlaybackFailed { .. }));
    assert!(running.await.unwrap().unwrap().is_canceled());
}

#[tokio::test]
async fn test_rejected_playback_maps_to_playback_failed() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    h.switch
        .fail_next("play", TransportError::rejected(404, "Channel not found"));

    let err = call.play("hello-world").run().await.unwrap_err();
    assert_eq!(
        err,
        ArityError::PlaybackFailed {
            media: "hello-world".into(),
            message: "Channel not found".into(),
        }
    );
    assert!(h.arity.registry().is_empty());
}

#[tokio::test]
async fn test_second_run_is_invalid() {
    let h = connect(SimulatedSwitch::new().with_auto_complete()).await;
    let call = h.call("c-1");
    let play = call.play("hello-world");

    play.run().await.unwrap();
    let err = play.run().await.unwrap_err();
    assert!(matches!(err, ArityError::InvalidState(_)));
}
