use pretty_assertions::assert_eq;

use xitouch_core::{QueueConfig, TouchConfig};
use xitouch_engine::sim::{PassiveGrab, Rect, SimEnvironment};
use xitouch_engine::{
    ClientId, DeviceDescriptor, DeviceId, EngineError, EventFlags, EventMask, EventRecord, EventType, Grab, GrabKind,
    GrabMode, InputCore, InputEnvironment, InputLevel, InputServer, ListenerKind, ListenerState, OwnershipReason,
    Point, ResourceId, Selection, TouchId, TouchPhase, TouchVerdict, WindowId, WireFlags,
};

const DEV: DeviceId = DeviceId(2);
const APP: ClientId = ClientId(10);
const OTHER: ClientId = ClientId(11);
const WM: ClientId = ClientId(20);
const APP_RES: ResourceId = ResourceId(0x100);
const OTHER_RES: ResourceId = ResourceId(0x110);
const WM_RES: ResourceId = ResourceId(0x200);

fn environment() -> SimEnvironment {
    let mut env = SimEnvironment::new(WindowId(1), ClientId(0), Rect::new(0.0, 0.0, 100.0, 100.0));
    env.add_window(WindowId(2), WindowId(1), APP, Rect::new(0.0, 0.0, 50.0, 50.0));
    env
}

fn core_with(env: SimEnvironment) -> InputCore<SimEnvironment> {
    let mut core = InputCore::new(env, &TouchConfig::default());
    core.register_device(DeviceDescriptor::touchscreen(DEV, "touchscreen"))
        .unwrap();
    core
}

fn touch(phase: TouchPhase, id: u32) -> EventRecord {
    EventRecord::touch(DEV, phase, TouchId(id), Point::new(10.0, 10.0))
}

fn emulated(phase: TouchPhase, id: u32) -> EventRecord {
    touch(phase, id).with_flags(EventFlags::POINTER_EMULATED)
}

fn selection(client: ClientId, resource: ResourceId, mask: EventMask) -> Selection {
    Selection {
        client,
        resource,
        level: InputLevel::Xi2,
        mask,
    }
}

fn touch_grab(window: WindowId) -> PassiveGrab {
    PassiveGrab {
        grab: Grab {
            resource: WM_RES,
            client: WM,
            window,
            level: InputLevel::Xi2,
            kind: GrabKind::Touch,
            owner_events: true,
            mode: GrabMode::Async,
            event_mask: EventMask::TOUCH_EVENTS,
        },
        device: None,
        detail: None,
    }
}

fn types_for(core: &InputCore<SimEnvironment>, client: ClientId) -> Vec<EventType> {
    core.env().writes_for(client).iter().map(|w| w.event_type).collect()
}

fn states(core: &InputCore<SimEnvironment>, id: u32) -> Vec<(ResourceId, ListenerState)> {
    core.touch(DEV, TouchId(id))
        .map(|t| t.listeners().iter().map(|l| (l.resource(), l.state())).collect())
        .unwrap_or_default()
}

fn assert_at_most_one_owner(core: &InputCore<SimEnvironment>, id: u32) {
    let owners = states(core, id)
        .into_iter()
        .filter(|(_, s)| matches!(s, ListenerState::IsOwner | ListenerState::HasAccepted))
        .count();
    assert!(owners <= 1, "touch {} has {} owners", id, owners);
}

/// Passive touch grab on the root plus a selection with ownership events on
/// the child window.
fn grab_and_owner_aware_selection() -> InputCore<SimEnvironment> {
    let mut env = environment();
    env.add_passive_grab(touch_grab(WindowId(1)));
    env.select(
        WindowId(2),
        selection(APP, APP_RES, EventMask::TOUCH_EVENTS | EventMask::TOUCH_OWNERSHIP),
    );
    core_with(env)
}

/// Passive touch grab on the root plus a plain touch selection on the child.
fn grab_and_plain_selection() -> InputCore<SimEnvironment> {
    let mut env = environment();
    env.add_passive_grab(touch_grab(WindowId(1)));
    env.select(WindowId(2), selection(APP, APP_RES, EventMask::TOUCH_EVENTS));
    core_with(env)
}

#[test]
fn test_single_passive_grab_becomes_owner() {
    let mut env = environment();
    env.add_passive_grab(touch_grab(WindowId(1)));
    let mut core = core_with(env);

    core.dispatch(touch(TouchPhase::Begin, 7)).unwrap();
    assert_eq!(states(&core, 7), vec![(WM_RES, ListenerState::IsOwner)]);
    let begin = core.env().writes_for(WM)[0].clone();
    assert_eq!(begin.event_type, EventType::TouchBegin);
    assert_eq!(begin.detail, 7);
    assert_eq!(begin.window, WindowId(1));

    // The grab never accepted, so the record outlives the physical end.
    core.dispatch(touch(TouchPhase::End, 7)).unwrap();
    assert_eq!(types_for(&core, WM), vec![EventType::TouchBegin, EventType::TouchEnd]);
    assert!(core.touch(DEV, TouchId(7)).unwrap().pending_finish());

    core.accept_or_reject_touch(DEV, TouchId(7), WM_RES, TouchVerdict::Accept)
        .unwrap();
    assert!(core.touch(DEV, TouchId(7)).is_none());
    assert_eq!(core.env().writes().len(), 2);
}

#[test]
fn test_shared_selections_both_see_begin_and_accept_ends_the_other() {
    let mut env = environment();
    env.select(WindowId(2), selection(APP, APP_RES, EventMask::TOUCH_EVENTS));
    env.select(WindowId(2), selection(OTHER, OTHER_RES, EventMask::TOUCH_EVENTS));
    let mut core = core_with(env);

    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin]);
    assert_eq!(types_for(&core, OTHER), vec![EventType::TouchBegin]);
    assert_eq!(
        states(&core, 1),
        vec![
            (APP_RES, ListenerState::AwaitingBegin),
            (OTHER_RES, ListenerState::AwaitingBegin)
        ]
    );

    core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Accept)
        .unwrap();
    assert_eq!(states(&core, 1), vec![(APP_RES, ListenerState::HasAccepted)]);
    assert_eq!(types_for(&core, OTHER), vec![EventType::TouchBegin, EventType::TouchEnd]);
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin]);

    core.dispatch(touch(TouchPhase::End, 1)).unwrap();
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin, EventType::TouchEnd]);
    assert!(core.touch(DEV, TouchId(1)).is_none());
}

#[test]
fn test_younger_emulated_touch_waits_for_older() {
    let mut env = environment();
    env.select(
        WindowId(2),
        Selection {
            client: APP,
            resource: APP_RES,
            level: InputLevel::Core,
            mask: EventMask::POINTER_EVENTS,
        },
    );
    let mut core = core_with(env);

    core.dispatch(emulated(TouchPhase::Begin, 3)).unwrap();
    core.dispatch(emulated(TouchPhase::Begin, 4)).unwrap();
    assert_eq!(core.find_oldest_pointer_emulated_touch(DEV), Some(TouchId(3)));
    let presses = |core: &InputCore<SimEnvironment>| {
        types_for(core, APP)
            .into_iter()
            .filter(|t| *t == EventType::ButtonPress)
            .count()
    };
    assert_eq!(presses(&core), 1);
    assert_eq!(states(&core, 4), vec![(APP_RES, ListenerState::AwaitingBegin)]);

    core.dispatch(emulated(TouchPhase::End, 3)).unwrap();
    assert!(core.touch(DEV, TouchId(3)).is_none());
    assert_eq!(core.find_oldest_pointer_emulated_touch(DEV), Some(TouchId(4)));
    assert_eq!(presses(&core), 2);

    let types = types_for(&core, APP);
    let release = types.iter().position(|t| *t == EventType::ButtonRelease).unwrap();
    let second_press = types.iter().rposition(|t| *t == EventType::ButtonPress).unwrap();
    assert!(release < second_press, "touch 4 pressed before touch 3 released: {:?}", types);
    assert!(core.env().writes_for(APP).iter().all(|w| w.flags.contains(WireFlags::POINTER_EMULATED)));
}

#[test]
fn test_end_with_unresolved_owner_becomes_pending() {
    let mut core = grab_and_owner_aware_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    assert_eq!(
        states(&core, 1),
        vec![(WM_RES, ListenerState::IsOwner), (APP_RES, ListenerState::AwaitingOwner)]
    );

    core.dispatch(touch(TouchPhase::End, 1)).unwrap();
    let point = core.touch(DEV, TouchId(1)).unwrap();
    assert!(point.pending_finish());
    assert_eq!(point.listeners().len(), 2);
    let app = core.env().writes_for(APP);
    let last = app.last().unwrap();
    assert_eq!(last.event_type, EventType::TouchUpdate);
    assert!(last.flags.contains(WireFlags::TOUCH_PENDING_END));
    // The owner is not retyped: it sees the real end right away.
    assert_eq!(types_for(&core, WM), vec![EventType::TouchBegin, EventType::TouchEnd]);

    core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Accept)
        .unwrap();
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert_eq!(
        types_for(&core, APP),
        vec![EventType::TouchBegin, EventType::TouchUpdate, EventType::TouchEnd]
    );
    assert_eq!(types_for(&core, WM), vec![EventType::TouchBegin, EventType::TouchEnd]);
}

#[test]
fn test_pending_end_completes_after_owner_rejects() {
    let mut core = grab_and_owner_aware_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    core.dispatch(touch(TouchPhase::End, 1)).unwrap();

    core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Reject)
        .unwrap();
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert_eq!(
        types_for(&core, APP),
        vec![
            EventType::TouchBegin,
            EventType::TouchUpdate,
            EventType::TouchOwnership,
            EventType::TouchEnd
        ]
    );
}

#[test]
fn test_rejected_owner_hands_over_with_history_replay() {
    let mut core = grab_and_plain_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    core.dispatch(EventRecord::touch(DEV, TouchPhase::Update, TouchId(1), Point::new(12.0, 14.0)))
        .unwrap();
    assert!(types_for(&core, APP).is_empty(), "grab may still claim the touch");

    core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Reject)
        .unwrap();
    assert_eq!(
        types_for(&core, WM),
        vec![EventType::TouchBegin, EventType::TouchUpdate, EventType::TouchEnd]
    );
    let replayed = core.env().writes_for(APP);
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].event_type, EventType::TouchBegin);
    assert_eq!(replayed[1].event_type, EventType::TouchUpdate);
    assert_eq!(replayed[1].root, Point::new(12.0, 14.0));
    assert_eq!(states(&core, 1), vec![(APP_RES, ListenerState::HasAccepted)]);

    core.dispatch(touch(TouchPhase::Update, 1)).unwrap();
    core.dispatch(touch(TouchPhase::End, 1)).unwrap();
    assert_eq!(
        types_for(&core, APP),
        vec![
            EventType::TouchBegin,
            EventType::TouchUpdate,
            EventType::TouchUpdate,
            EventType::TouchEnd
        ]
    );
    assert!(core.touch(DEV, TouchId(1)).is_none());
}

#[test]
fn test_device_removed_mid_sequence() {
    let mut core = grab_and_plain_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    core.dispatch(touch(TouchPhase::Begin, 2)).unwrap();
    assert_eq!(core.device(DEV).unwrap().touches().iter_active().count(), 2);

    core.device_removed(DEV).unwrap();
    assert!(core.device(DEV).is_none());
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert_eq!(
        core.dispatch(touch(TouchPhase::End, 1)),
        Err(EngineError::BadDevice(DEV))
    );
    assert_eq!(
        core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Accept),
        Err(EngineError::BadDevice(DEV))
    );
}

#[test]
fn test_implicit_grab_takes_over_selection_listener() {
    let mut env = environment();
    env.select(
        WindowId(2),
        Selection {
            client: APP,
            resource: APP_RES,
            level: InputLevel::Core,
            mask: EventMask::POINTER_EVENTS,
        },
    );
    let mut core = core_with(env);
    core.dispatch(emulated(TouchPhase::Begin, 1)).unwrap();

    let implicit = core.env().active_grab_for(DEV).unwrap();
    assert!(implicit.implicit);
    let point = core.touch(DEV, TouchId(1)).unwrap();
    assert_eq!(point.listeners().len(), 1);
    let listener = &point.listeners()[0];
    assert_eq!(listener.resource(), implicit.grab.resource);
    assert_eq!(listener.kind(), ListenerKind::PointerGrab);
    assert_eq!(listener.window(), WindowId(2));
    assert_eq!(listener.state(), ListenerState::HasAccepted, "async implicit grab accepts early");
    assert_eq!(point.num_grabs(), 1);

    core.dispatch(emulated(TouchPhase::End, 1)).unwrap();
    assert!(core.env().active_grab_for(DEV).is_none());
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert_eq!(
        types_for(&core, APP),
        vec![EventType::Motion, EventType::ButtonPress, EventType::Motion, EventType::ButtonRelease]
    );
}

fn core_pointer_selection() -> Selection {
    Selection {
        client: APP,
        resource: APP_RES,
        level: InputLevel::Core,
        mask: EventMask::POINTER_EVENTS,
    }
}

fn button_types(core: &InputCore<SimEnvironment>, client: ClientId) -> Vec<EventType> {
    types_for(core, client)
        .into_iter()
        .filter(|t| matches!(t, EventType::ButtonPress | EventType::ButtonRelease))
        .collect()
}

#[test]
fn test_duplicate_emulated_begin_does_not_hold_touch_button() {
    let mut env = environment();
    env.select(WindowId(2), core_pointer_selection());
    let mut core = core_with(env);

    core.dispatch(emulated(TouchPhase::Begin, 1)).unwrap();
    core.dispatch(emulated(TouchPhase::Begin, 1)).unwrap();
    assert_eq!(core.device(DEV).unwrap().state().touch_buttons_down(), 1);

    // An end for a touch that never began must not release touch 1's button.
    core.dispatch(emulated(TouchPhase::End, 9)).unwrap();
    assert_eq!(core.device(DEV).unwrap().state().touch_buttons_down(), 1);

    core.dispatch(emulated(TouchPhase::End, 1)).unwrap();
    let state = core.device(DEV).unwrap().state();
    assert_eq!(state.touch_buttons_down(), 0);
    assert_eq!(state.touch_state(), 0);
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert!(core.env().active_grab_for(DEV).is_none());
    assert_eq!(
        types_for(&core, APP),
        vec![EventType::Motion, EventType::ButtonPress, EventType::Motion, EventType::ButtonRelease]
    );
}

#[test]
fn test_explicit_pointer_grab_claims_emulated_touch() {
    let mut env = environment();
    env.select(WindowId(2), core_pointer_selection());
    env.grab_device(
        DEV,
        Grab {
            resource: WM_RES,
            client: WM,
            window: WindowId(1),
            level: InputLevel::Core,
            kind: GrabKind::Pointer,
            owner_events: false,
            mode: GrabMode::Async,
            event_mask: EventMask::POINTER_EVENTS,
        },
    );
    let mut core = core_with(env);

    core.dispatch(emulated(TouchPhase::Begin, 1)).unwrap();
    assert_eq!(
        core.touch(DEV, TouchId(1)).unwrap().listeners()[0].resource(),
        WM_RES
    );
    core.dispatch(emulated(TouchPhase::Update, 1)).unwrap();
    core.dispatch(emulated(TouchPhase::End, 1)).unwrap();

    assert_eq!(
        types_for(&core, WM),
        vec![
            EventType::Motion,
            EventType::ButtonPress,
            EventType::Motion,
            EventType::Motion,
            EventType::ButtonRelease
        ]
    );
    assert!(types_for(&core, APP).is_empty());
    assert!(core.touch(DEV, TouchId(1)).is_none());
    let active = core.env().active_grab_for(DEV).unwrap();
    assert!(!active.from_passive, "explicit grab outlives the touch");
}

#[test]
fn test_access_denied_listener_still_advances() {
    let mut env = environment();
    env.select(WindowId(2), selection(APP, APP_RES, EventMask::TOUCH_EVENTS));
    env.select(WindowId(2), selection(OTHER, OTHER_RES, EventMask::TOUCH_EVENTS));
    env.deny_access(OTHER, WindowId(2));
    let mut core = core_with(env);

    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    assert!(types_for(&core, OTHER).is_empty());
    assert_eq!(
        states(&core, 1),
        vec![
            (APP_RES, ListenerState::AwaitingBegin),
            (OTHER_RES, ListenerState::AwaitingBegin)
        ]
    );

    // The denied Begin counts as seen, so promotion needs no replay.
    core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Reject)
        .unwrap();
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin, EventType::TouchEnd]);
    assert_eq!(states(&core, 1), vec![(OTHER_RES, ListenerState::IsOwner)]);
    assert!(types_for(&core, OTHER).is_empty());

    core.dispatch(touch(TouchPhase::End, 1)).unwrap();
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert!(types_for(&core, OTHER).is_empty());
}

#[test]
fn test_younger_emulated_touch_ending_first_waits_for_older() {
    let mut env = environment();
    env.select(WindowId(2), core_pointer_selection());
    let mut core = core_with(env);

    core.dispatch(emulated(TouchPhase::Begin, 3)).unwrap();
    core.dispatch(emulated(TouchPhase::Begin, 4)).unwrap();
    core.dispatch(emulated(TouchPhase::End, 4)).unwrap();
    assert!(core.touch(DEV, TouchId(4)).unwrap().pending_finish());
    assert_eq!(button_types(&core, APP), vec![EventType::ButtonPress]);

    core.dispatch(emulated(TouchPhase::End, 3)).unwrap();
    assert_eq!(
        button_types(&core, APP),
        vec![
            EventType::ButtonPress,
            EventType::ButtonRelease,
            EventType::ButtonPress,
            EventType::ButtonRelease
        ]
    );
    assert!(core.touch(DEV, TouchId(3)).is_none());
    assert!(core.touch(DEV, TouchId(4)).is_none());
    assert_eq!(core.find_oldest_pointer_emulated_touch(DEV), None);
    assert!(core.env().active_grab_for(DEV).is_none());
}

#[test]
fn test_reject_twice_is_harmless() {
    let mut core = grab_and_owner_aware_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();

    core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Reject)
        .unwrap();
    let writes = core.env().writes().len();
    assert_eq!(
        core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Reject),
        Err(EngineError::NoSuchListener {
            device: DEV,
            touch_id: TouchId(1),
            resource: APP_RES
        })
    );
    core.dispatch(EventRecord::ownership(DEV, TouchId(1), OwnershipReason::Reject, APP_RES))
        .unwrap();
    assert_eq!(core.env().writes().len(), writes);
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin, EventType::TouchEnd]);
    assert_eq!(states(&core, 1), vec![(WM_RES, ListenerState::IsOwner)]);
}

#[test]
fn test_unknown_touch_is_bad_value() {
    let mut core = grab_and_plain_selection();
    let err = core
        .accept_or_reject_touch(DEV, TouchId(99), WM_RES, TouchVerdict::Accept)
        .unwrap_err();
    assert_eq!(err, EngineError::NoSuchTouch { device: DEV, touch_id: TouchId(99) });
    assert_eq!(err.protocol_code(), xitouch_engine::ProtocolErrorCode::BadValue);
}

#[test]
fn test_window_destroyed_truncates_trace() {
    let mut core = grab_and_plain_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    assert_eq!(
        core.touch(DEV, TouchId(1)).unwrap().spatial_trace(),
        &[WindowId(1), WindowId(2)]
    );

    core.window_destroyed(WindowId(2));
    core.env_mut().destroy_window(WindowId(2));
    assert_eq!(core.touch(DEV, TouchId(1)).unwrap().spatial_trace(), &[WindowId(1)]);

    // The selection listener's window is gone: it is skipped, not dereferenced.
    core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Reject)
        .unwrap();
    assert!(types_for(&core, APP).is_empty());
    core.dispatch(touch(TouchPhase::End, 1)).unwrap();
    assert!(core.touch(DEV, TouchId(1)).is_none());
}

#[test]
fn test_early_accept_applies_on_promotion() {
    let mut core = grab_and_owner_aware_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Accept)
        .unwrap();
    assert_eq!(
        states(&core, 1),
        vec![(WM_RES, ListenerState::IsOwner), (APP_RES, ListenerState::EarlyAccept)]
    );
    assert_at_most_one_owner(&core, 1);

    core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Reject)
        .unwrap();
    assert_eq!(states(&core, 1), vec![(APP_RES, ListenerState::HasAccepted)]);
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin, EventType::TouchOwnership]);
}

#[test]
fn test_at_most_one_owner_through_a_sequence() {
    let mut core = grab_and_owner_aware_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    assert_at_most_one_owner(&core, 1);
    core.dispatch(touch(TouchPhase::Update, 1)).unwrap();
    assert_at_most_one_owner(&core, 1);
    core.accept_or_reject_touch(DEV, TouchId(1), WM_RES, TouchVerdict::Reject)
        .unwrap();
    assert_at_most_one_owner(&core, 1);
    assert_eq!(states(&core, 1), vec![(APP_RES, ListenerState::IsOwner)]);
    core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Accept)
        .unwrap();
    assert_at_most_one_owner(&core, 1);
    core.dispatch(touch(TouchPhase::End, 1)).unwrap();
    assert!(core.touch(DEV, TouchId(1)).is_none());
}

#[test]
fn test_client_gone_rejects_its_listeners() {
    let mut core = grab_and_plain_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    core.env_mut().remove_client(WM);
    core.client_gone(WM);

    assert_eq!(states(&core, 1), vec![(APP_RES, ListenerState::HasAccepted)]);
    assert_eq!(types_for(&core, APP), vec![EventType::TouchBegin]);
}

#[test]
fn test_frozen_device_gets_no_synthesised_end() {
    let mut env = environment();
    env.select(WindowId(2), selection(APP, APP_RES, EventMask::TOUCH_EVENTS));
    env.select(WindowId(2), selection(OTHER, OTHER_RES, EventMask::TOUCH_EVENTS));
    let mut core = core_with(env);
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();

    core.env_mut().freeze_for_sync_grab(DEV);
    core.accept_or_reject_touch(DEV, TouchId(1), APP_RES, TouchVerdict::Accept)
        .unwrap();
    assert_eq!(types_for(&core, OTHER), vec![EventType::TouchBegin]);
    assert_eq!(states(&core, 1), vec![(APP_RES, ListenerState::HasAccepted)]);
}

#[test]
fn test_physically_active_touches_end_through_dispatch() {
    let mut core = grab_and_owner_aware_selection();
    core.dispatch(touch(TouchPhase::Begin, 1)).unwrap();
    core.dispatch(touch(TouchPhase::Begin, 2)).unwrap();
    assert_eq!(core.device(DEV).unwrap().physically_active_touches().len(), 2);

    core.end_physically_active_touches(DEV).unwrap();
    assert!(core.device(DEV).unwrap().physically_active_touches().is_empty());
    assert!(core.touch(DEV, TouchId(1)).unwrap().pending_finish());

    core.accept_and_end(DEV, TouchId(1)).unwrap();
    core.accept_and_end(DEV, TouchId(2)).unwrap();
    assert!(core.touch(DEV, TouchId(1)).is_none());
    assert!(core.touch(DEV, TouchId(2)).is_none());
}

#[test]
fn test_raw_events_reach_root_selections() {
    let mut env = environment();
    env.select(WindowId(1), selection(OTHER, OTHER_RES, EventMask::RAW_TOUCH_BEGIN));
    env.select(WindowId(2), selection(APP, APP_RES, EventMask::RAW_TOUCH_BEGIN));
    let mut core = core_with(env);
    core.dispatch(EventRecord::raw(DEV, EventType::RawTouchBegin, 5)).unwrap();
    assert_eq!(types_for(&core, OTHER), vec![EventType::RawTouchBegin]);
    assert!(types_for(&core, APP).is_empty());
}

#[test]
fn test_server_queue_from_producer_threads() {
    let mut env = environment();
    env.select(WindowId(2), selection(APP, APP_RES, EventMask::TOUCH_EVENTS));
    let server = InputServer::new(env, &TouchConfig::default(), &QueueConfig { capacity: 128 });
    server
        .register_device(DeviceDescriptor::touchscreen(DEV, "touchscreen"))
        .unwrap();

    std::thread::scope(|scope| {
        for base in [100u32, 200] {
            let sender = server.sender();
            scope.spawn(move || {
                for id in base..base + 10 {
                    sender.send(touch(TouchPhase::Begin, id)).unwrap();
                    sender.send(touch(TouchPhase::End, id)).unwrap();
                }
            });
        }
    });

    assert_eq!(server.drain(), 40);
    server.with_core(|core| {
        assert_eq!(core.device(DEV).unwrap().touches().iter_active().count(), 0);
        assert_eq!(core.env().writes_for(APP).len(), 40);
    });
}
