use super::common::*;
use crate::workflows::compliance::audit::Actor;
use crate::workflows::compliance::obligations::{
    DueDateState, ObligationStatus, ObligationStore, SchedulerError,
};
use crate::workflows::compliance::recurrence::Frequency;

#[test]
fn creating_from_a_match_expands_the_schedule() {
    let (scheduler, _, audit) = harness();
    let report = track(&scheduler, &candidate("quarterly_report", Frequency::Quarterly));

    let dues: Vec<_> = report.computed_due_dates.iter().map(|d| d.due).collect();
    assert_eq!(dues.first(), Some(&date(2025, 3, 31)));
    assert_eq!(dues.last(), Some(&date(2026, 12, 31)));
    assert_eq!(dues.len(), 8);
    assert_eq!(report.next_due_date, Some(date(2025, 3, 31)));
    assert_eq!(report.status, ObligationStatus::Open);
    assert_eq!(report.version, 1);
    assert!(report.source_rule.is_some());

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "create");
    assert_eq!(events[0].diff["status"]["to"], "open");
}

#[test]
fn creating_twice_leaves_the_stored_obligation_alone() {
    let (scheduler, store, audit) = harness();
    let candidate = candidate("quarterly_report", Frequency::Quarterly);
    let first = track(&scheduler, &candidate);
    let second = track(&scheduler, &candidate);

    assert_eq!(first, second);
    assert_eq!(store.list(&org()).unwrap().len(), 1);
    assert_eq!(audit.len(), 1);
}

#[test]
fn start_then_complete_satisfies_the_obligation() {
    let (scheduler, _, audit) = harness();
    track(&scheduler, &candidate("annual_audit", Frequency::Annual));

    let started = scheduler
        .start(org(), &key("annual_audit"), &analyst(), at(2025, 2, 1))
        .unwrap();
    assert_eq!(started.status, ObligationStatus::InProgress);
    assert_eq!(started.version, 2);

    let done = scheduler
        .complete(org(), &key("annual_audit"), &analyst(), at(2025, 2, 3))
        .unwrap();
    assert_eq!(done.status, ObligationStatus::Satisfied);
    assert_eq!(done.updated_at, at(2025, 2, 3));

    let actions: Vec<_> = audit.events().into_iter().map(|e| e.action).collect();
    assert_eq!(actions, vec!["create", "start", "complete"]);
}

#[test]
fn transitions_outside_the_state_machine_are_rejected() {
    let (scheduler, store, _) = harness();
    track(&scheduler, &candidate("annual_audit", Frequency::Annual));

    match scheduler.complete(org(), &key("annual_audit"), &analyst(), at(2025, 2, 1)) {
        Err(SchedulerError::InvalidTransition { from, action, .. }) => {
            assert_eq!(from, ObligationStatus::Open);
            assert_eq!(action, "complete");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let stored = store.fetch(&org(), &key("annual_audit")).unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[test]
fn waived_obligations_can_be_reopened() {
    let (scheduler, _, _) = harness();
    track(&scheduler, &candidate("board_minutes", Frequency::Quarterly));

    let waived = scheduler
        .waive(org(), &key("board_minutes"), &analyst(), at(2025, 2, 1))
        .unwrap();
    assert_eq!(waived.status, ObligationStatus::Waived);
    assert!(scheduler
        .start(org(), &key("board_minutes"), &analyst(), at(2025, 2, 2))
        .is_err());

    let reopened = scheduler
        .reopen(org(), &key("board_minutes"), &Actor::System, at(2025, 2, 3))
        .unwrap();
    assert_eq!(reopened.status, ObligationStatus::Open);
    assert_eq!(reopened.next_due_date, Some(date(2025, 3, 31)));
}

#[test]
fn resolving_the_missed_date_returns_overdue_work_to_in_progress() {
    let (scheduler, _, _) = harness();
    track(&scheduler, &candidate("quarterly_report", Frequency::Quarterly));
    scheduler.sweep(at(2025, 4, 2)).unwrap();

    let resolved = scheduler
        .resolve_date(
            org(),
            &key("quarterly_report"),
            date(2025, 3, 31),
            DueDateState::Satisfied,
            &analyst(),
            at(2025, 4, 3),
        )
        .unwrap();

    assert_eq!(resolved.status, ObligationStatus::InProgress);
    assert_eq!(resolved.next_due_date, Some(date(2025, 6, 30)));
    assert_eq!(resolved.computed_due_dates[0].state, DueDateState::Satisfied);
    assert_eq!(resolved.computed_due_dates[0].resolved_on, Some(date(2025, 4, 3)));
}

#[test]
fn resolving_an_unknown_date_fails() {
    let (scheduler, _, _) = harness();
    track(&scheduler, &candidate("quarterly_report", Frequency::Quarterly));

    for (due, state) in [
        (date(2025, 4, 15), DueDateState::Satisfied),
        (date(2025, 3, 31), DueDateState::Pending),
    ] {
        match scheduler.resolve_date(
            org(),
            &key("quarterly_report"),
            due,
            state,
            &analyst(),
            at(2025, 4, 1),
        ) {
            Err(SchedulerError::UnknownDueDate { due: missing, .. }) => assert_eq!(missing, due),
            other => panic!("expected unknown due date, got {other:?}"),
        }
    }
}

#[test]
fn missing_obligations_surface_not_found() {
    let (scheduler, _, _) = harness();
    match scheduler.start(org(), &key("unknown"), &analyst(), at(2025, 1, 1)) {
        Err(SchedulerError::NotFound { key: missing, .. }) => {
            assert_eq!(missing.as_str(), "unknown")
        }
        other => panic!("expected not found, got {other:?}"),
    }
}
