//! FSM unit tests

use deployhook::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentState::Pending);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_without_migration() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Prepared).unwrap();
    fsm.process(DeploymentEvent::Built).unwrap();

    // Built -> Tested, skipping Migrated
    fsm.process(DeploymentEvent::Tested).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Tested);

    fsm.process(DeploymentEvent::Started).unwrap();
    fsm.process(DeploymentEvent::Finished).unwrap();
    assert_eq!(fsm.state(), DeploymentState::Done);
}

#[test]
fn test_fsm_rejects_skipping_stages() {
    let mut fsm = DeploymentFsm::new();

    assert!(fsm.process(DeploymentEvent::Built).is_err());
    assert_eq!(fsm.state(), DeploymentState::Pending);

    fsm.process(DeploymentEvent::Prepared).unwrap();
    assert!(fsm.process(DeploymentEvent::Started).is_err());
    assert!(fsm.process(DeploymentEvent::Migrated).is_err());
    assert_eq!(fsm.state(), DeploymentState::Prepared);
}

#[test]
fn test_fsm_failure_is_terminal() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Prepared).unwrap();
    fsm.process(DeploymentEvent::Built).unwrap();
    fsm.process(DeploymentEvent::Failed("tests failed".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentState::Failed);
    assert_eq!(fsm.error(), Some("Built: tests failed"));
    assert!(fsm.is_terminal());

    // No way out of Failed
    assert!(fsm.process(DeploymentEvent::Tested).is_err());
    assert!(fsm
        .process(DeploymentEvent::Failed("again".to_string()))
        .is_err());
}

#[test]
fn test_fsm_done_is_terminal() {
    let mut fsm = DeploymentFsm::new();
    for event in [
        DeploymentEvent::Prepared,
        DeploymentEvent::Built,
        DeploymentEvent::Migrated,
        DeploymentEvent::Tested,
        DeploymentEvent::Started,
        DeploymentEvent::Finished,
    ] {
        fsm.process(event).unwrap();
    }
    assert!(fsm.is_terminal());
    assert!(fsm
        .process(DeploymentEvent::Failed("late".to_string()))
        .is_err());
}
