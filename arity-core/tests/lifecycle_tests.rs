//! Call lifecycle tests: inbound routing, pending legs, hand-off and shutdown

mod common;

use arity_core::prelude::*;
use arity_core::simulator::{events, SimulatedSwitch, SwitchRequest};
use arity_core::{ChannelSnapshot, TransportError};
use common::{connect, fast_config, settle};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_new_call_reaches_top_level_handler() {
    let h = connect(SimulatedSwitch::new()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.arity.register_top_level_handler(move || {
        let tx = tx.clone();
        handler_fn(move |call: CallController| async move {
            let _ = tx.send((call.channel_id().to_string(), call.args().to_vec()));
            Ok(())
        })
    });

    h.switch.emit(events::start_with(
        ChannelSnapshot::with_id("in-1"),
        vec!["sales".to_string()],
    ));

    let (channel_id, args) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel_id, "in-1");
    assert_eq!(args, vec!["sales".to_string()]);
}

#[tokio::test]
async fn test_pending_leg_start_is_not_a_new_call() {
    let h = connect(SimulatedSwitch::new()).await;
    let invocations = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::unbounded_channel();
    {
        let invocations = Arc::clone(&invocations);
        h.arity.register_top_level_handler(move || {
            let invocations = Arc::clone(&invocations);
            let tx = tx.clone();
            handler_fn(move |call: CallController| async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(call.channel_id().to_string());
                Ok(())
            })
        });
    }

    h.arity.lifecycle().track_pending_leg("leg-42");
    h.switch.emit(events::start("leg-42"));
    h.switch.emit(events::start("in-7"));

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "in-7");
    assert!(!h.arity.lifecycle().is_pending("leg-42"));

    // Once consumed, the same id is an ordinary call again
    h.switch.emit(events::start("leg-42"));
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, "leg-42");
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_start_without_handler_is_ignored() {
    let h = connect(SimulatedSwitch::new()).await;
    h.switch.emit(events::start("in-1"));
    settle().await;

    assert!(h.arity.is_running());
    assert!(h.switch.requests_named("hangup").is_empty());
}

#[tokio::test]
async fn test_transport_failures_reach_observer_and_dispatch_continues() {
    let switch = Arc::new(SimulatedSwitch::new());
    let (failures_tx, mut failures) = mpsc::unbounded_channel();
    let (calls_tx, mut calls) = mpsc::unbounded_channel();

    let _arity = Arity::builder(switch.clone())
        .with_config(fast_config())
        .on_transport_failure(move |err| {
            let _ = failures_tx.send(err.to_string());
        })
        .with_handler(move || {
            let calls_tx = calls_tx.clone();
            handler_fn(move |call: CallController| async move {
                let _ = calls_tx.send(call.channel_id().to_string());
                Ok(())
            })
        })
        .connect()
        .await
        .unwrap();

    switch.emit_failure(TransportError::ConnectionClosed("socket reset".into()));
    switch.emit(events::start("in-1"));

    let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(failure.contains("socket reset"));
    let call = tokio::time::timeout(Duration::from_secs(2), calls.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(call, "in-1");
}

#[tokio::test]
async fn test_refused_subscription_fails_connect() {
    let switch = SimulatedSwitch::new();
    switch.refuse_subscribe();

    let err = Arity::connect(Arc::new(switch), fast_config())
        .await
        .unwrap_err();
    assert!(matches!(err, ArityError::ConnectionFailed(_)));
}

#[tokio::test]
async fn test_subscription_uses_app_name() {
    let h = connect(SimulatedSwitch::new()).await;
    assert_eq!(
        h.switch.requests_named("subscribe"),
        vec![SwitchRequest::Subscribe {
            app_name: "test".to_string()
        }]
    );
}

#[tokio::test]
async fn test_execute_hands_state_to_next_handler() {
    let h = connect(SimulatedSwitch::new()).await;
    let mut call = h.call("c-1");
    call.put("menu", 3u32);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let next = handler_fn(move |call: CallController| async move {
        let _ = tx.send(call.get::<u32>("menu").copied());
        Ok(())
    });
    call.execute(next).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), Some(3));
    assert_eq!(h.switch.count("hangup"), 0);
}

#[tokio::test]
async fn test_execute_with_hangup_resurfaces_failure() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");

    let next = handler_fn(|_call: CallController| async move {
        Err(ArityError::OperationFailed("menu broke".into()))
    });
    let err = call.execute_with_hangup(next).await.unwrap_err();

    assert_eq!(err, ArityError::OperationFailed("menu broke".into()));
    assert_eq!(
        h.switch.requests_named("hangup"),
        vec![SwitchRequest::Hangup {
            channel_id: "c-1".to_string(),
            reason: None
        }]
    );
}

#[tokio::test]
async fn test_end_call_ignores_hangup_failure() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    h.switch.fail_next("hangup", TransportError::rejected(404, "Channel not found"));

    let value = call.end_call(Ok::<_, ArityError>(7)).await.unwrap();
    assert_eq!(value, 7);
    assert_eq!(h.switch.count("hangup"), 1);
}

#[tokio::test]
async fn test_created_channel_is_not_a_new_call() {
    let switch = SimulatedSwitch::new();
    let h = connect(switch).await;
    let invocations = Arc::new(AtomicUsize::new(0));
    {
        let invocations = Arc::clone(&invocations);
        h.arity.register_top_level_handler(move || {
            let invocations = Arc::clone(&invocations);
            handler_fn(move |_call: CallController| async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
    }

    let channel = h.arity.channels().create("PJSIP/200").await.unwrap();
    assert!(h.arity.lifecycle().is_pending(&channel.id));
    h.switch.emit(events::start(&channel.id));
    settle().await;

    assert_eq!(invocations.load(Ordering::SeqCst), 0);
    assert!(!h.arity.lifecycle().is_pending(&channel.id));
}

#[tokio::test]
async fn test_failed_channel_creation_forgets_leg() {
    let h = connect(SimulatedSwitch::new()).await;
    h.switch
        .fail_next("create_channel", TransportError::rejected(400, "Invalid endpoint"));

    let err = h.arity.channels().create("bogus").await.unwrap_err();
    assert_eq!(err, ArityError::DialFailed("Invalid endpoint".into()));
    assert_eq!(h.arity.lifecycle().pending_count(), 0);
}

#[tokio::test]
async fn test_external_media_resolves_on_start() {
    let h = connect(SimulatedSwitch::new().with_auto_complete()).await;
    let invocations = Arc::new(AtomicUsize::new(0));
    {
        let invocations = Arc::clone(&invocations);
        h.arity.register_top_level_handler(move || {
            let invocations = Arc::clone(&invocations);
            handler_fn(move |_call: CallController| async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
    }

    let call = h
        .arity
        .channels()
        .external_media("127.0.0.1:4000", "rtp", "udp", "slin16")
        .await
        .unwrap();

    assert_eq!(call.channel_name(), "UnicastRTP/127.0.0.1:4000");
    assert!(h.switch.has_channel(call.channel_id()));
    settle().await;
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_abandons_pending_operations() {
    let h = connect(SimulatedSwitch::new()).await;
    let call = h.call("c-1");
    let play = Arc::new(call.play("hold-music"));
    let dial = Arc::new(call.dial("PJSIP/100"));
    let dtmf = Arc::new(call.receive_dtmf().with_max_digits(4));

    let playing = tokio::spawn({
        let play = Arc::clone(&play);
        async move { play.run().await }
    });
    let dialing = tokio::spawn({
        let dial = Arc::clone(&dial);
        async move { dial.run().await }
    });
    let collecting = tokio::spawn({
        let dtmf = Arc::clone(&dtmf);
        async move { dtmf.run().await }
    });
    let relaying = tokio::spawn({
        let channels = h.arity.channels();
        async move {
            channels
                .external_media("127.0.0.1:4000", "rtp", "udp", "slin16")
                .await
                .map(|call| call.channel_id().to_string())
        }
    });
    h.switch.wait_for("play").await;
    h.switch.wait_for("dial").await;
    h.switch.wait_for("external_media").await;
    settle().await;
    assert!(h.arity.lifecycle().is_pending(dial.callee_channel_id()));
    h.arity.shutdown();

    let timeout = Duration::from_secs(2);
    let played = tokio::time::timeout(timeout, playing).await.unwrap().unwrap();
    assert_eq!(played, Err(ArityError::Abandoned));
    let dialed = tokio::time::timeout(timeout, dialing).await.unwrap().unwrap();
    assert_eq!(dialed, Err(ArityError::Abandoned));
    let collected = tokio::time::timeout(timeout, collecting).await.unwrap().unwrap();
    assert_eq!(collected, Err(ArityError::Abandoned));
    let relayed = tokio::time::timeout(timeout, relaying).await.unwrap().unwrap();
    assert_eq!(relayed, Err(ArityError::Abandoned));

    assert!(!h.arity.is_running());
    assert!(h.arity.registry().is_empty());
    assert_eq!(h.arity.lifecycle().pending_count(), 0);
}

#[tokio::test]
async fn test_operations_after_shutdown_are_abandoned() {
    let h = connect(SimulatedSwitch::new().with_auto_complete()).await;
    let call = h.call("c-1");
    h.arity.shutdown();

    let played = call.play("hello-world").run().await;
    assert_eq!(played, Err(ArityError::Abandoned));
    assert_eq!(h.switch.count("play"), 0);
    assert!(h.arity.registry().is_empty());
}
