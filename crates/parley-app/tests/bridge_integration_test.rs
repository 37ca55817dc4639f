//! Bridge and App working together over a scripted server, on simulated time.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use parley_app::{App, AppAction, AppEvent, Bridge, IoRequest, KeyInput, Page};
use parley_client::{ClientConfig, ClientEvent, SessionEndReason};
use parley_harness::{SimEnv, SimInstant};
use parley_proto::{
    ClientFrame, DownloadUrl, FileAttachment, HealthResponse, MessageRecord, RoomInfo, Role,
    ServerFrame,
};

/// Feed app actions to the bridge and bridge events back to the app until
/// quiet, the way the runtime does.
fn pump(app: &mut App, bridge: &mut Bridge<SimEnv>, actions: Vec<AppAction>) {
    let mut pending = actions;
    while !pending.is_empty() {
        let mut next = Vec::new();
        for action in pending {
            for event in bridge.process_app_action(action) {
                next.extend(app.handle(event));
            }
        }
        pending = next;
    }
}

fn deliver(app: &mut App, bridge: &mut Bridge<SimEnv>, event: ClientEvent<SimInstant>) {
    for e in bridge.handle_client_event(event) {
        let actions = app.handle(e);
        pump(app, bridge, actions);
    }
}

fn type_line(app: &mut App, bridge: &mut Bridge<SimEnv>, text: &str) {
    for c in text.chars() {
        let actions = app.handle(AppEvent::Key(KeyInput::Char(c)));
        pump(app, bridge, actions);
    }
    let actions = app.handle(AppEvent::Key(KeyInput::Enter));
    pump(app, bridge, actions);
}

fn sent(io: &[IoRequest]) -> Vec<&ClientFrame> {
    io.iter()
        .filter_map(|r| match r {
            IoRequest::Send(frame) => Some(frame),
            _ => None,
        })
        .collect()
}

/// Join as alice in ABCD with an empty history.
fn joined(env: &SimEnv) -> (App, Bridge<SimEnv>) {
    let mut app = App::new("http://sim.local".into());
    let mut bridge = Bridge::new(env.clone(), ClientConfig::default());

    type_line(&mut app, &mut bridge, "alice");
    assert_eq!(app.page(), &Page::Entry);
    let actions = app.handle(AppEvent::Key(KeyInput::Tab));
    pump(&mut app, &mut bridge, actions);
    type_line(&mut app, &mut bridge, "abcd");
    assert_eq!(app.page(), &Page::Chat);

    let io = bridge.take_io();
    let [IoRequest::ProbeHealth { probe_id }] = io.as_slice() else {
        unreachable!("expected a single health probe, got {io:?}");
    };
    let health = Some(HealthResponse { status: "ok".into(), ip: Some("198.51.100.1".into()) });
    deliver(&mut app, &mut bridge, ClientEvent::ProbeCompleted { probe_id: *probe_id, health });
    assert!(matches!(bridge.take_io().as_slice(), [IoRequest::OpenChannel { attempt: 0 }]));

    deliver(&mut app, &mut bridge, ClientEvent::ChannelOpened);
    let io = bridge.take_io();
    assert!(matches!(sent(&io).as_slice(), [ClientFrame::JoinRoom(_)]));
    assert!(io.contains(&IoRequest::FetchNetworkInfo));

    deliver(&mut app, &mut bridge, ClientEvent::FrameReceived(ServerFrame::LoadMessages(vec![])));
    (app, bridge)
}

#[test]
fn join_flow_reaches_loaded_chat() {
    let env = SimEnv::new();
    let (app, bridge) = joined(&env);

    let client = bridge.client().unwrap();
    assert!(client.conversation().is_loaded());
    assert_eq!(client.session().server_ip(), Some("198.51.100.1"));
    assert!(bridge.view().is_some());
    assert_eq!(app.connection_state(), Some(parley_client::ConnectionState::Connected));
}

#[test]
fn composer_sends_and_stops_typing() {
    let env = SimEnv::new();
    let (mut app, mut bridge) = joined(&env);

    type_line(&mut app, &mut bridge, "hello");
    let io = bridge.take_io();
    let frames = sent(&io);
    assert_eq!(frames.first(), Some(&&ClientFrame::TypingStart));
    assert!(frames.contains(&&ClientFrame::SendMessage("hello".into())));
    assert!(app.composer().is_empty());
}

#[test]
fn room_info_updates_role() {
    let env = SimEnv::new();
    let (mut app, mut bridge) = joined(&env);

    let info = RoomInfo { user_role: Role::Leader, is_persistent: true, ..RoomInfo::default() };
    deliver(&mut app, &mut bridge, ClientEvent::FrameReceived(ServerFrame::RoomInfo(info)));
    assert_eq!(app.role(), Role::Leader);
}

#[test]
fn download_by_name_resolves_key() {
    let env = SimEnv::new();
    let (mut app, mut bridge) = joined(&env);

    let attachment = FileAttachment {
        key: "uploads/9-plan.txt".into(),
        name: "plan.txt".into(),
        size: 12,
        uploader_id: None,
        content_type: Some("text/plain".into()),
    };
    let message = MessageRecord::file(5u64, "bob", attachment, 1);
    deliver(&mut app, &mut bridge, ClientEvent::FrameReceived(ServerFrame::Message(message)));
    // Prefetch of the new file's location
    assert_eq!(sent(&bridge.take_io()).len(), 1);

    let resolved = DownloadUrl { key: "uploads/9-plan.txt".into(), download_url: "https://cdn/plan".into() };
    deliver(&mut app, &mut bridge, ClientEvent::FrameReceived(ServerFrame::DownloadUrl(resolved)));

    type_line(&mut app, &mut bridge, "/download plan.txt");
    assert_eq!(
        bridge.take_io(),
        vec![IoRequest::Download { filename: "plan.txt".into(), url: "https://cdn/plan".into() }]
    );

    type_line(&mut app, &mut bridge, "/download missing.txt");
    assert!(bridge.take_io().is_empty());
    assert!(app.notifications().any(|n| n.message.contains("missing.txt")));
}

#[test]
fn kicked_session_returns_to_entry() {
    let env = SimEnv::new();
    let (mut app, mut bridge) = joined(&env);

    deliver(
        &mut app,
        &mut bridge,
        ClientEvent::FrameReceived(ServerFrame::Kicked("You were removed from ABCD".into())),
    );

    assert!(bridge.client().is_none());
    assert!(bridge.take_io().contains(&IoRequest::CloseChannel));
    assert_eq!(app.page(), &Page::Entry);
    assert!(app.notifications().any(|n| n.message == "You were removed from ABCD"));
}

#[test]
fn leave_requires_confirmation() {
    let env = SimEnv::new();
    let (mut app, mut bridge) = joined(&env);

    type_line(&mut app, &mut bridge, "/leave");
    assert!(app.confirmation().is_some());
    assert!(bridge.client().is_some());

    let actions = app.handle(AppEvent::Key(KeyInput::Char('y')));
    pump(&mut app, &mut bridge, actions);

    let io = bridge.take_io();
    assert!(sent(&io).contains(&&ClientFrame::LeaveRoom));
    assert_eq!(io.last(), Some(&IoRequest::CloseChannel));
    assert!(bridge.client().is_none());
    assert_eq!(app.page(), &Page::Entry);
}

#[test]
fn typing_indicator_expires_on_tick() {
    let env = SimEnv::new();
    let (mut app, mut bridge) = joined(&env);

    deliver(&mut app, &mut bridge, ClientEvent::FrameReceived(ServerFrame::UserTyping("bob".into())));
    assert_eq!(bridge.view().unwrap().typing(), vec!["bob"]);

    let now = env.advance(Duration::from_secs(6));
    let events = bridge.handle_tick(now);
    assert!(events.contains(&AppEvent::SessionUpdated));
    assert!(bridge.view().unwrap().typing().is_empty());
}

#[test]
fn ended_reason_is_reported_once() {
    let env = SimEnv::new();
    let (_app, mut bridge) = joined(&env);

    let events = bridge.handle_client_event(ClientEvent::FrameReceived(ServerFrame::Kicked("bye".into())));
    let ended: Vec<_> = events.iter().filter(|e| matches!(e, AppEvent::SessionEnded(_))).collect();
    assert_eq!(ended, vec![&AppEvent::SessionEnded(SessionEndReason::Kicked { message: "bye".into() })]);

    assert!(bridge.handle_client_event(ClientEvent::ChannelClosed(parley_core::CloseReason::ClientRequested)).is_empty());
}
