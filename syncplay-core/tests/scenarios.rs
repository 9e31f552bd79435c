//! End-to-end coverage of the seed scenarios (spec §8) against a real
//! `SyncPlayManager`, using the test doubles in `support`.

mod support;

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use syncplay_common::time::FixedClock;
use syncplay_core::group::{GroupStateKind, Visibility};
use syncplay_core::manager::{NewGroupRequest, SyncPlayManager};
use syncplay_core::requests::QueueMode;
use syncplay_core::requests::Request;

use support::{FakeCatalog, FakeDirectory, RecordingMessageSink};

fn new_manager(
    directory: Arc<FakeDirectory>,
    catalog: Arc<FakeCatalog>,
) -> (Arc<SyncPlayManager>, Arc<RecordingMessageSink>, Arc<FixedClock>) {
    let sink = Arc::new(RecordingMessageSink::new());
    let clock = Arc::new(FixedClock::new(chrono::Utc::now()));
    let manager = Arc::new(SyncPlayManager::new(
        sink.clone(),
        catalog,
        directory,
        clock.clone(),
        2000,
        500,
        Duration::zero(),
    ));
    (manager, sink, clock)
}

fn new_group_request(name: &str) -> NewGroupRequest {
    NewGroupRequest {
        name: name.to_string(),
        visibility: Visibility::Public,
        invited_users: Vec::new(),
        open_playback_access: None,
        open_playlist_access: None,
        now_playing: None,
    }
}

#[tokio::test]
async fn create_and_solo_play_reaches_playing() {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    let session_a = Uuid::new_v4();
    let user_a = Uuid::new_v4();
    directory.register(session_a, user_a);

    let (manager, _sink, _clock) = new_manager(directory, catalog);
    let group_id = manager.new_group(session_a, new_group_request("solo")).await.unwrap();

    let items: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    manager
        .handle_request(
            session_a,
            Request::Play {
                playing_queue: items,
                playing_item_position: 0,
                start_position_ticks: 0,
            },
        )
        .await;

    let pid = {
        let handle = manager.group_handle(session_a).await.unwrap();
        assert_eq!(handle.state, GroupStateKind::Waiting { resume_playing: true });
        handle.queue.playing_item().unwrap().playlist_item_id.clone()
    };

    manager
        .handle_request(
            session_a,
            Request::Ready {
                when: chrono::Utc::now(),
                position_ticks: 0,
                is_playing: true,
                playlist_item_id: pid,
            },
        )
        .await;

    let handle = manager.group_handle(session_a).await.unwrap();
    assert_eq!(handle.state, GroupStateKind::Playing);
    assert_eq!(handle.group_id, group_id);
}

async fn playing_group_with_two_members(
) -> (Arc<SyncPlayManager>, Arc<RecordingMessageSink>, Uuid, Uuid) {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    let session_a = Uuid::new_v4();
    let session_b = Uuid::new_v4();
    directory.register(session_a, Uuid::new_v4());
    directory.register(session_b, Uuid::new_v4());

    let (manager, sink, _clock) = new_manager(directory, catalog);
    let group_id = manager.new_group(session_a, new_group_request("pair")).await.unwrap();
    manager.join_group(session_b, group_id).await.unwrap();

    let items: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
    manager
        .handle_request(
            session_a,
            Request::Play {
                playing_queue: items,
                playing_item_position: 0,
                start_position_ticks: 0,
            },
        )
        .await;
    let pid = {
        let handle = manager.group_handle(session_a).await.unwrap();
        handle.queue.playing_item().unwrap().playlist_item_id.clone()
    };
    for session in [session_a, session_b] {
        manager
            .handle_request(
                session,
                Request::Ready {
                    when: chrono::Utc::now(),
                    position_ticks: 0,
                    is_playing: true,
                    playlist_item_id: pid.clone(),
                },
            )
            .await;
    }
    assert_eq!(
        manager.group_handle(session_a).await.unwrap().state,
        GroupStateKind::Playing
    );
    (manager, sink, session_a, session_b)
}

#[tokio::test]
async fn synchronized_pause_transitions_to_paused() {
    let (manager, _sink, session_a, session_b) = playing_group_with_two_members().await;
    manager.handle_request(session_b, Request::Pause).await;
    let handle = manager.group_handle(session_a).await.unwrap();
    assert_eq!(handle.state, GroupStateKind::Paused);
}

#[tokio::test]
async fn seek_while_playing_forces_buffering_then_resumes() {
    let (manager, _sink, session_a, session_b) = playing_group_with_two_members().await;
    manager
        .handle_request(session_a, Request::Seek { position_ticks: 600_000_000 })
        .await;
    let pid = {
        let handle = manager.group_handle(session_a).await.unwrap();
        assert_eq!(handle.state, GroupStateKind::Waiting { resume_playing: true });
        handle.queue.playing_item().unwrap().playlist_item_id.clone()
    };
    for session in [session_a, session_b] {
        manager
            .handle_request(
                session,
                Request::Ready {
                    when: chrono::Utc::now(),
                    position_ticks: 600_000_000,
                    is_playing: true,
                    playlist_item_id: pid.clone(),
                },
            )
            .await;
    }
    let handle = manager.group_handle(session_a).await.unwrap();
    assert_eq!(handle.state, GroupStateKind::Playing);
}

#[tokio::test]
async fn access_denied_item_rejects_without_state_change() {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    let session_a = Uuid::new_v4();
    let session_c = Uuid::new_v4();
    let user_a = Uuid::new_v4();
    let user_c = Uuid::new_v4();
    directory.register(session_a, user_a);
    directory.register(session_c, user_c);

    let restricted_item = Uuid::new_v4();
    catalog.deny(user_c, restricted_item);

    let (manager, sink, _clock) = new_manager(directory, catalog);
    let group_id = manager.new_group(session_a, new_group_request("library")).await.unwrap();

    let items = vec![Uuid::new_v4(), restricted_item];
    manager
        .handle_request(
            session_a,
            Request::Queue {
                item_ids: items.clone(),
                mode: QueueMode::Queue,
            },
        )
        .await;

    manager.join_group(session_c, group_id).await.unwrap();
    // Grant session_c playlist permission so the request reaches the library
    // check rather than being rejected earlier for lacking playlist access.
    {
        let mut handle = manager.group_handle(session_c).await.unwrap();
        handle.access_list.set_permissions(user_c, true, true);
    }

    let restricted_pid = {
        let handle = manager.group_handle(session_a).await.unwrap();
        handle.queue.items()[1].playlist_item_id.clone()
    };
    let state_before = manager.group_handle(session_a).await.unwrap().state;

    manager
        .handle_request(
            session_c,
            Request::SetPlaylistItem {
                playlist_item_id: restricted_pid,
            },
        )
        .await;

    let handle = manager.group_handle(session_a).await.unwrap();
    assert_eq!(handle.state, state_before);

    let refusals = sink.deliveries_for(session_c);
    assert!(!refusals.is_empty(), "requester should receive a LibraryAccessDenied update");
}

#[tokio::test]
async fn removing_current_item_while_playing_advances_and_waits() {
    let (manager, _sink, session_a, _session_b) = playing_group_with_two_members().await;
    let pid = {
        let handle = manager.group_handle(session_a).await.unwrap();
        handle.queue.playing_item().unwrap().playlist_item_id.clone()
    };
    manager
        .handle_request(
            session_a,
            Request::RemoveFromPlaylist {
                playlist_item_ids: vec![pid],
            },
        )
        .await;
    let handle = manager.group_handle(session_a).await.unwrap();
    assert_eq!(handle.state, GroupStateKind::Waiting { resume_playing: true });
}

#[tokio::test]
async fn webrtc_relay_reaches_only_the_named_target() {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    let session_a = Uuid::new_v4();
    let session_b = Uuid::new_v4();
    let session_c = Uuid::new_v4();
    directory.register(session_a, Uuid::new_v4());
    directory.register(session_b, Uuid::new_v4());
    directory.register(session_c, Uuid::new_v4());

    let (manager, sink, _clock) = new_manager(directory, catalog);
    let group_id = manager.new_group(session_a, new_group_request("webrtc")).await.unwrap();
    manager.join_group(session_b, group_id).await.unwrap();
    manager.join_group(session_c, group_id).await.unwrap();

    manager
        .handle_webrtc(session_a, Some(session_b), serde_json::json!({"offer": "sdp"}))
        .await;

    assert!(!sink.deliveries_for(session_b).is_empty());
    assert!(sink.deliveries_for(session_c).is_empty());
}

#[tokio::test]
async fn settings_access_list_override_grants_playlist_permission() {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    let session_a = Uuid::new_v4();
    let session_b = Uuid::new_v4();
    let user_b = Uuid::new_v4();
    directory.register(session_a, Uuid::new_v4());
    directory.register(session_b, user_b);

    let (manager, sink, _clock) = new_manager(directory, catalog);
    let group_id = manager.new_group(session_a, new_group_request("settings")).await.unwrap();
    manager.join_group(session_b, group_id).await.unwrap();

    // session_b has no explicit permissions yet: default open_playlist_access
    // is false, so a playlist edit is refused.
    manager
        .handle_request(session_b, Request::SetShuffleMode { mode: syncplay_core::queue::ShuffleMode::Shuffle })
        .await;
    assert!(!sink.deliveries_for(session_b).is_empty());
    assert_eq!(
        manager.group_handle(session_a).await.unwrap().queue.shuffle_mode(),
        syncplay_core::queue::ShuffleMode::Sorted
    );

    manager
        .update_group_settings(session_a, None, None, None, None, vec![(user_b, true, true)])
        .await
        .unwrap();

    manager
        .handle_request(session_b, Request::SetShuffleMode { mode: syncplay_core::queue::ShuffleMode::Shuffle })
        .await;
    assert_eq!(
        manager.group_handle(session_a).await.unwrap().queue.shuffle_mode(),
        syncplay_core::queue::ShuffleMode::Shuffle
    );
}

#[tokio::test]
async fn list_groups_hides_private_and_uninvited_invite_only_groups() {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    // A separate creator session per group (each still resolves to the same
    // admin user) so creating one group never tears down another via the
    // zero-grace empty-group sweep in `leave_group`.
    let admin_session_1 = Uuid::new_v4();
    let admin_session_2 = Uuid::new_v4();
    let admin_session_3 = Uuid::new_v4();
    let admin_watcher_session = Uuid::new_v4();
    let outsider_session = Uuid::new_v4();
    let invitee_session = Uuid::new_v4();
    let admin_user = Uuid::new_v4();
    let outsider_user = Uuid::new_v4();
    let invitee_user = Uuid::new_v4();
    directory.register(admin_session_1, admin_user);
    directory.register(admin_session_2, admin_user);
    directory.register(admin_session_3, admin_user);
    directory.register(admin_watcher_session, admin_user);
    directory.register(outsider_session, outsider_user);
    directory.register(invitee_session, invitee_user);

    let (manager, _sink, _clock) = new_manager(directory, catalog);

    manager.new_group(admin_session_1, new_group_request("public")).await.unwrap();

    let mut private_req = new_group_request("private");
    private_req.visibility = Visibility::Private;
    manager.new_group(admin_session_2, private_req).await.unwrap();

    let mut invite_req = new_group_request("invite-only");
    invite_req.visibility = Visibility::InviteOnly;
    invite_req.invited_users = vec![invitee_user];
    manager.new_group(admin_session_3, invite_req).await.unwrap();

    let outsider_names: Vec<String> = manager
        .list_groups(outsider_session)
        .await
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(outsider_names, vec!["public".to_string()]);

    let invitee_names: Vec<String> = manager
        .list_groups(invitee_session)
        .await
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert!(invitee_names.contains(&"public".to_string()));
    assert!(invitee_names.contains(&"invite-only".to_string()));
    assert!(!invitee_names.contains(&"private".to_string()));

    let admin_names: Vec<String> = manager
        .list_groups(admin_watcher_session)
        .await
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(admin_names.len(), 3);
}

#[tokio::test]
async fn leave_group_on_non_member_is_a_no_op() {
    let directory = Arc::new(FakeDirectory::new());
    let catalog = Arc::new(FakeCatalog::new(1_000_000));
    let (manager, sink, _clock) = new_manager(directory, catalog);
    manager.leave_group(Uuid::new_v4()).await;
    assert!(sink.deliveries().is_empty());
}
