//! Waiter registry correlation tests

use arity_core::simulator::events;
use arity_core::{EventKind, Waiter, WaiterRegistry};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_playbacks_resolve_only_their_own_waiter() {
    let registry = WaiterRegistry::new();
    let (_, first) = registry.wait_for(EventKind::PlaybackFinished, Some("pb-1"));
    let (_, second) = registry.wait_for(EventKind::PlaybackFinished, Some("pb-2"));

    assert!(registry.dispatch(&events::playback_finished("pb-2", "channel:c-1")));
    assert_eq!(registry.len(), 1);

    let event = second.await.unwrap();
    assert_eq!(event.playback_id(), Some("pb-2"));

    assert!(registry.dispatch(&events::playback_finished("pb-1", "channel:c-1")));
    let event = first.await.unwrap();
    assert_eq!(event.playback_id(), Some("pb-1"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_unmatched_events_leave_waiters_in_place() {
    let registry = WaiterRegistry::new();
    let (_, _pending) = registry.wait_for(EventKind::PlaybackFinished, Some("pb-1"));

    assert!(!registry.dispatch(&events::playback_finished("pb-9", "channel:c-1")));
    assert!(!registry.dispatch(&events::hangup("pb-1")));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_dropping_registry_abandons_waiters() {
    let registry = WaiterRegistry::new();
    let (_, pending) = registry.wait_for(EventKind::ChannelHangupRequest, Some("c-1"));

    registry.clear();
    assert_eq!(pending.await, Err(arity_core::ArityError::Abandoned));
}

#[test]
fn test_concurrent_registration_and_dispatch() {
    let registry = Arc::new(WaiterRegistry::new());
    let hits = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let registry = Arc::clone(&registry);
            let hits = Arc::clone(&hits);
            std::thread::spawn(move || {
                for i in 0..100 {
                    let hits = Arc::clone(&hits);
                    let scope = format!("c-{worker}-{i}");
                    registry.register(Waiter::once(
                        EventKind::ChannelHangupRequest,
                        Some(&scope),
                        move |_| {
                            hits.fetch_add(1, Ordering::SeqCst);
                        },
                    ));
                    registry.dispatch(&events::hangup(&scope));
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 400);
    assert!(registry.is_empty());
}

proptest! {
    #[test]
    fn prop_one_time_waiters_fire_exactly_once(
        order in (1usize..16).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle()),
        noise in prop::collection::vec("[a-z]{1,6}", 0..12),
    ) {
        let registry = WaiterRegistry::new();
        let fired: Arc<Mutex<Vec<(usize, String)>>> = Arc::new(Mutex::new(Vec::new()));

        for index in 0..order.len() {
            let fired = Arc::clone(&fired);
            let scope = format!("pb-{index}");
            registry.register(Waiter::once(
                EventKind::PlaybackFinished,
                Some(&scope),
                move |event| {
                    let id = event.playback_id().unwrap_or_default().to_string();
                    fired.lock().push((index, id));
                },
            ));
        }

        let mut noise = noise.into_iter();
        for index in &order {
            if let Some(word) = noise.next() {
                registry.dispatch(&events::playback_finished(&format!("noise-{word}"), "channel:c-1"));
            }
            let id = format!("pb-{index}");
            registry.dispatch(&events::playback_finished(&id, "channel:c-1"));
            // Duplicates after resolution must not fire anything
            registry.dispatch(&events::playback_finished(&id, "channel:c-1"));
        }

        let fired = fired.lock();
        prop_assert_eq!(fired.len(), order.len());
        for (index, id) in fired.iter() {
            prop_assert_eq!(id, &format!("pb-{index}"));
        }
        let mut seen: Vec<_> = fired.iter().map(|(index, _)| *index).collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..order.len()).collect::<Vec<_>>());
        prop_assert!(registry.is_empty());
    }
}
