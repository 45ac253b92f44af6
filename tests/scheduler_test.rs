mod common;

use advisor::chess_core::{resolve, Mode};
use advisor::engine::{
    EngineCommand, EngineEvent, EnginePeer, EngineSession, RequestHandle, SessionState,
};
use advisor::scheduler::{AnalysisScheduler, PrefetchConfig, RequestKind, WatchdogConfig};
use advisor::AdvisorError;
use common::*;

async fn ready_session() -> (EngineSession, EnginePeer) {
    let (launcher, mut peers) = scripted_launcher(false);
    let mut session = EngineSession::new(Box::new(launcher), session_config());
    session.start().unwrap();
    let mut peer = peers.recv().await.unwrap();
    peer.events.send(EngineEvent::Ready).unwrap();
    let wake = session.wait().await;
    session.on_wake(wake);
    drain(&mut peer);
    (session, peer)
}

fn scheduler() -> AnalysisScheduler {
    AnalysisScheduler::new(WatchdogConfig::default(), PrefetchConfig::default())
}

#[tokio::test]
async fn test_sequences_start_at_one_and_increase() {
    let (mut session, mut peer) = ready_session().await;
    let mut scheduler = scheduler();
    let profile = resolve("club", Mode::Normal);
    let position = snap(AFTER_E4_E5);

    let first = scheduler
        .request(&mut session, &position, 1, &profile, RequestKind::Primary)
        .unwrap();
    let second = scheduler
        .request(&mut session, &position, 1, &profile, RequestKind::Primary)
        .unwrap();
    assert_eq!((first, second), (1, 2));

    let commands = drain(&mut peer);
    assert_eq!(commands[2], EngineCommand::Abort);
    assert_eq!(scheduler.outstanding().unwrap().sequence, 2);
}

#[tokio::test]
async fn test_unavailable_engine_leaves_slot_free() {
    let (launcher, _peers) = scripted_launcher(false);
    let mut session = EngineSession::new(Box::new(launcher), session_config());
    let mut scheduler = scheduler();

    let result = scheduler.request(
        &mut session,
        &snap(AFTER_E4_E5),
        1,
        &resolve("club", Mode::Normal),
        RequestKind::Primary,
    );
    assert!(matches!(
        result,
        Err(AdvisorError::EngineUnavailable(SessionState::Uninitialized))
    ));
    assert!(scheduler.is_free());
    assert!(scheduler.watchdog_deadline().is_none());
}

#[tokio::test]
async fn test_only_outstanding_sequence_completes() {
    let (mut session, _peer) = ready_session().await;
    let mut scheduler = scheduler();
    let profile = resolve("club", Mode::Normal);
    let position = snap(AFTER_E4_E5);

    scheduler
        .request(&mut session, &position, 3, &profile, RequestKind::Primary)
        .unwrap();
    scheduler
        .request(&mut session, &position, 3, &profile, RequestKind::Primary)
        .unwrap();

    assert!(scheduler.complete(RequestHandle(1)).is_none());
    assert!(!scheduler.is_free());

    let request = scheduler.complete(RequestHandle(2)).unwrap();
    assert_eq!(request.epoch, 3);
    assert_eq!(request.snapshot, position);
    assert!(scheduler.is_free());
    assert!(scheduler.watchdog_deadline().is_none());

    // Already completed
    assert!(scheduler.complete(RequestHandle(2)).is_none());
}

#[tokio::test]
async fn test_prefetch_uses_cheaper_profile() {
    let (mut session, mut peer) = ready_session().await;
    let mut scheduler = scheduler();
    let profile = resolve("expert", Mode::Normal);

    scheduler
        .request(&mut session, &snap(AFTER_NF3), 1, &profile, RequestKind::Prefetch)
        .unwrap();

    let outstanding = scheduler.outstanding().unwrap();
    assert_eq!(outstanding.kind, RequestKind::Prefetch);
    assert_eq!(outstanding.profile.search_depth, 8);
    assert_eq!(outstanding.profile.time_cap_ms, Some(1000));
    assert!(drain(&mut peer).contains(&EngineCommand::Search {
        depth: 8,
        movetime_ms: Some(1000)
    }));
}

#[tokio::test]
async fn test_expire_ignores_stale_sequences() {
    let (mut session, mut peer) = ready_session().await;
    let mut scheduler = scheduler();
    let profile = resolve("club", Mode::Normal);

    scheduler
        .request(&mut session, &snap(AFTER_E4_E5), 1, &profile, RequestKind::Primary)
        .unwrap();
    drain(&mut peer);

    assert!(!scheduler.expire(&mut session, 7));
    assert!(!scheduler.is_free());
    assert!(drain(&mut peer).is_empty());

    assert!(scheduler.expire(&mut session, 1));
    assert!(scheduler.is_free());
    assert_eq!(drain(&mut peer), vec![EngineCommand::Abort]);
}

#[tokio::test]
async fn test_fail_frees_slot_only_for_own_request() {
    let (mut session, _peer) = ready_session().await;
    let mut scheduler = scheduler();
    let profile = resolve("club", Mode::Normal);

    scheduler
        .request(&mut session, &snap(AFTER_E4_E5), 1, &profile, RequestKind::Primary)
        .unwrap();

    assert!(scheduler.fail(&[RequestHandle(9)]).is_none());
    assert!(!scheduler.is_free());

    let failed = scheduler.fail(&[RequestHandle(9), RequestHandle(1)]).unwrap();
    assert_eq!(failed.sequence, 1);
    assert!(scheduler.is_free());
}

#[tokio::test]
async fn test_cancel_aborts_outstanding_search() {
    let (mut session, mut peer) = ready_session().await;
    let mut scheduler = scheduler();

    scheduler.cancel(&mut session);
    assert!(drain(&mut peer).is_empty());

    scheduler
        .request(
            &mut session,
            &snap(AFTER_E4_E5),
            1,
            &resolve("club", Mode::Normal),
            RequestKind::Primary,
        )
        .unwrap();
    drain(&mut peer);

    scheduler.cancel(&mut session);
    assert!(scheduler.is_free());
    assert_eq!(drain(&mut peer), vec![EngineCommand::Abort]);
}
