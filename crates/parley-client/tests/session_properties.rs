//! Property tests for the session state machine.

#![allow(clippy::unwrap_used)]

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use parley_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, Environment, Identity, RoomCode,
};
use parley_core::CloseReason;
use parley_proto::{
    ClientFrame, FileAttachment, FileDeleted, MessageRecord, Role, RoomInfo, ServerFrame,
    UploadSlot,
};
use proptest::prelude::*;

#[derive(Clone)]
struct TestEnv {
    now: Arc<Mutex<Instant>>,
}

impl TestEnv {
    fn new() -> Self {
        Self { now: Arc::new(Mutex::new(Instant::now())) }
    }
}

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(7);
    }
}

fn client(name: &str) -> Client<TestEnv> {
    Client::new(
        TestEnv::new(),
        Identity::parse(name).unwrap(),
        RoomCode::parse("ABCD").unwrap(),
        ClientConfig::default(),
    )
}

fn connected(name: &str) -> Client<TestEnv> {
    let mut c = client(name);
    c.handle(ClientEvent::Connect).unwrap();
    c.handle(ClientEvent::ProbeCompleted { probe_id: 1, health: None }).unwrap();
    c.handle(ClientEvent::ChannelOpened).unwrap();
    c
}

fn frame(c: &mut Client<TestEnv>, frame: ServerFrame) -> Vec<ClientAction> {
    c.handle(ClientEvent::FrameReceived(frame)).unwrap()
}

fn sent(actions: &[ClientAction]) -> Vec<&ClientFrame> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Send(f) => Some(f),
            _ => None,
        })
        .collect()
}

const NAMES: &[&str] = &["ann", "ben", "cat", "dan"];

proptest! {
    /// The typing set holds exactly the names whose latest event was a start.
    #[test]
    fn typing_set_tracks_latest_event(events in prop::collection::vec((0..NAMES.len(), any::<bool>()), 0..40)) {
        let mut c = connected("me");
        let mut expected = BTreeSet::new();

        for (i, start) in events {
            let name = NAMES[i].to_string();
            if start {
                expected.insert(name.clone());
                frame(&mut c, ServerFrame::UserTyping(name));
            } else {
                expected.remove(&name);
                frame(&mut c, ServerFrame::UserStoppedTyping(name));
            }
        }

        let actual: BTreeSet<String> = c.conversation().typing().names().map(str::to_string).collect();
        prop_assert_eq!(actual, expected);
    }

    /// Nothing is dispatched for a message unless the channel is connected.
    #[test]
    fn send_requires_connection(text in ".{0,64}", drop_first in any::<bool>()) {
        let mut c = if drop_first {
            let mut c = connected("me");
            c.handle(ClientEvent::ChannelClosed(CloseReason::Transport("drop".into()))).unwrap();
            c
        } else {
            let mut c = client("me");
            c.handle(ClientEvent::Connect).unwrap();
            c
        };

        match c.handle(ClientEvent::SendMessage(text)) {
            Ok(actions) => prop_assert!(sent(&actions).is_empty()),
            Err(e) => prop_assert!(
                matches!(e, ClientError::NotConnected { .. } | ClientError::EmptyMessage),
                "unexpected error {e:?}"
            ),
        }
    }

    /// Deleting a file removes exactly the message carrying its key.
    #[test]
    fn file_deletion_matches_by_key(count in 1usize..12, pick in any::<prop::sample::Index>()) {
        let mut c = connected("me");
        let batch: Vec<MessageRecord> = (0..count as u64)
            .map(|i| {
                MessageRecord::file(
                    i,
                    "ann",
                    FileAttachment {
                        key: format!("files/{i}"),
                        name: format!("f{i}.txt"),
                        size: 1,
                        uploader_id: None,
                        content_type: None,
                    },
                    0,
                )
            })
            .collect();
        frame(&mut c, ServerFrame::LoadMessages(batch.clone()));

        let victim = pick.index(count);
        frame(&mut c, ServerFrame::FileDeleted(FileDeleted { key: format!("files/{victim}") }));

        let mut expected = batch;
        expected.remove(victim);
        prop_assert_eq!(c.conversation().messages(), expected.as_slice());
    }

    /// Members never produce moderation frames.
    #[test]
    fn member_cannot_moderate(target in "[a-z]{1,8}", assign in any::<bool>()) {
        let mut c = connected("me");
        frame(&mut c, ServerFrame::RoomInfo(RoomInfo { user_role: Role::Member, ..RoomInfo::default() }));

        let event = if assign {
            ClientEvent::AssignRole { target, role: Role::CoLeader }
        } else {
            ClientEvent::KickUser { target }
        };

        let result = c.handle(event);
        prop_assert!(matches!(result, Err(ClientError::PermissionDenied { .. } | ClientError::SelfTarget { .. })), "unexpected result: {:?}", result);
    }

    /// Slots bind to the upload they were issued for, with opaque keys, no
    /// file name echo, and the server answering in any order it likes.
    #[test]
    fn upload_slots_never_swap(
        count in 2usize..5,
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..8),
    ) {
        let mut c = connected("me");
        let names: Vec<String> = (0..count).map(|i| format!("file{i}.bin")).collect();

        // Requests the server has received and not yet answered.
        let mut outstanding: Vec<String> = Vec::new();
        let requests = |actions: &[ClientAction]| -> Vec<String> {
            sent(actions)
                .into_iter()
                .filter_map(|f| match f {
                    ClientFrame::RequestUploadUrl(r) => Some(r.filename.clone()),
                    _ => None,
                })
                .collect()
        };

        for name in &names {
            let actions = c.handle(ClientEvent::UploadFile {
                source: format!("/tmp/{name}"),
                filename: name.clone(),
                size: 10,
            }).unwrap();
            outstanding.extend(requests(&actions));
        }

        let mut started = 0;
        let mut round = 0;
        while !outstanding.is_empty() {
            prop_assert!(outstanding.len() <= 1, "slot requests overlap: {outstanding:?}");
            let name = outstanding.remove(picks[round % picks.len()].index(outstanding.len()));
            round += 1;

            let key = format!("uploads/{:06x}", round * 7919);
            let actions = frame(&mut c, ServerFrame::UploadUrl(UploadSlot {
                presigned_url: format!("https://store/put/{key}"),
                file_url: format!("https://store/{key}"),
                key: key.clone(),
                filename: None,
            }));
            for action in &actions {
                if let ClientAction::StartUpload { source, presigned_url, .. } = action {
                    prop_assert_eq!(source, &format!("/tmp/{name}"));
                    prop_assert_eq!(presigned_url, &format!("https://store/put/{key}"));
                    started += 1;
                }
            }
            outstanding.extend(requests(&actions));
        }
        prop_assert_eq!(started, count);
    }

    /// Repeating a presence update changes nothing.
    #[test]
    fn presence_update_is_idempotent(users in prop::collection::vec("[a-z]{1,6}", 0..8)) {
        let mut c = connected("me");
        frame(&mut c, ServerFrame::RoomUsers(users.clone()));
        let once = c.conversation().users().to_vec();
        frame(&mut c, ServerFrame::RoomUsers(users.clone()));
        prop_assert_eq!(c.conversation().users(), once.as_slice());
        prop_assert_eq!(once, users);
    }
}
