//! The local roster and its reconciliation against agent snapshots.
//!
//! The first snapshot builds the roster. Every later snapshot must list the
//! same ids in the same order; only `running` is copied across. Clicks turn
//! into fire-and-forget start/stop commands and never touch `running`: the
//! next snapshot is the only authority on whether a process runs.

use crate::collab::{CommandTransport, InputCapture};
use crate::notify::{ProcessStarted, ProcessStopped, RosterChanged, RosterNotifications};
use crate::record::{LaunchEntry, ProcessRecord};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("snapshot has {actual} items, roster has {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("snapshot item {index} has id {actual}, roster expects id {expected}")]
    IdentityMismatch {
        index: usize,
        expected: u32,
        actual: u32,
    },
    #[error("click index {index} out of range for roster of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug)]
enum RosterPhase {
    Uninitialized,
    Initialized(Vec<ProcessRecord>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    StartRequested,
    StopRequested,
}

#[derive(Debug)]
pub struct RosterSynchronizer {
    phase: RosterPhase,
    notifications: RosterNotifications,
}

impl Default for RosterSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RosterSynchronizer {
    pub fn new() -> Self {
        Self {
            phase: RosterPhase::Uninitialized,
            notifications: RosterNotifications::default(),
        }
    }

    pub fn notifications_mut(&mut self) -> &mut RosterNotifications {
        &mut self.notifications
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, RosterPhase::Initialized(_))
    }

    pub fn records(&self) -> &[ProcessRecord] {
        match &self.phase {
            RosterPhase::Uninitialized => &[],
            RosterPhase::Initialized(records) => records,
        }
    }

    pub fn record(&self, index: usize) -> Option<&ProcessRecord> {
        self.records().get(index)
    }

    pub fn position_of(&self, id: u32) -> Option<usize> {
        self.records().iter().position(|record| record.id() == id)
    }

    pub fn by_id(&self, id: u32) -> Option<&ProcessRecord> {
        self.records().iter().find(|record| record.id() == id)
    }

    pub fn on_snapshot(&mut self, items: Vec<LaunchEntry>) -> Result<RosterChanged, SyncError> {
        match self.phase {
            RosterPhase::Uninitialized => {
                let mut records = Vec::with_capacity(items.len());
                for item in items {
                    if item.running {
                        self.notifications.process_started.emit(&ProcessStarted {
                            name: item.name.clone(),
                        });
                    }
                    records.push(ProcessRecord::from_entry(item));
                }
                debug!(event = "roster_initialized", items = records.len());
                self.phase = RosterPhase::Initialized(records);
            }
            RosterPhase::Initialized(ref mut records) => {
                check_alignment(records, &items)?;
                for (record, item) in records.iter_mut().zip(&items) {
                    record.set_running(item.running);
                }
                debug!(event = "roster_reconciled", items = records.len());
            }
        }

        self.notifications.roster_changed.emit(&RosterChanged);
        Ok(RosterChanged)
    }

    /// Starts an idle record or stops a running one. The args field is read
    /// only on the start path; a missing input collaborator yields empty args.
    pub fn handle_click(
        &mut self,
        index: usize,
        transport: &dyn CommandTransport,
        inputs: Option<&dyn InputCapture>,
    ) -> Result<ClickOutcome, SyncError> {
        let RosterPhase::Initialized(records) = &mut self.phase else {
            return Err(SyncError::IndexOutOfRange { index, len: 0 });
        };
        let len = records.len();
        let record = records
            .get_mut(index)
            .ok_or(SyncError::IndexOutOfRange { index, len })?;

        if !record.is_running() {
            let args = inputs.and_then(|capture| capture.args_for(record.id()));
            record.capture_args_from(args.as_deref());
            transport.start(record.build_start_request());
            debug!(event = "start_requested", id = record.id(), name = record.name());
            let name = record.name().to_string();
            self.notifications
                .process_started
                .emit(&ProcessStarted { name });
            Ok(ClickOutcome::StartRequested)
        } else {
            transport.stop(record.build_stop_request());
            debug!(event = "stop_requested", id = record.id(), name = record.name());
            let name = record.name().to_string();
            self.notifications
                .process_stopped
                .emit(&ProcessStopped { name });
            Ok(ClickOutcome::StopRequested)
        }
    }
}

fn check_alignment(records: &[ProcessRecord], items: &[LaunchEntry]) -> Result<(), SyncError> {
    if records.len() != items.len() {
        warn!(
            event = "roster_length_mismatch",
            expected = records.len(),
            actual = items.len()
        );
        return Err(SyncError::LengthMismatch {
            expected: records.len(),
            actual: items.len(),
        });
    }
    for (index, (record, item)) in records.iter().zip(items).enumerate() {
        if record.id() != item.id {
            warn!(
                event = "roster_identity_mismatch",
                index,
                expected = record.id(),
                actual = item.id
            );
            return Err(SyncError::IdentityMismatch {
                index,
                expected: record.id(),
                actual: item.id,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{StartRequest, StopRequest};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingTransport {
        starts: RefCell<Vec<StartRequest>>,
        stops: RefCell<Vec<StopRequest>>,
    }

    impl CommandTransport for RecordingTransport {
        fn start(&self, request: StartRequest) {
            self.starts.borrow_mut().push(request);
        }

        fn stop(&self, request: StopRequest) {
            self.stops.borrow_mut().push(request);
        }
    }

    struct FixedInputs(HashMap<u32, String>);

    impl InputCapture for FixedInputs {
        fn args_for(&self, id: u32) -> Option<String> {
            self.0.get(&id).cloned()
        }
    }

    fn entry(id: u32, name: &str, running: bool) -> LaunchEntry {
        LaunchEntry {
            id,
            name: name.to_string(),
            command: format!("launch {name}"),
            working_directory: format!("/work/{name}"),
            running,
        }
    }

    fn log_names(sync: &mut RosterSynchronizer) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let notifications = sync.notifications_mut();
        let started = Rc::clone(&log);
        notifications
            .process_started
            .subscribe(move |event| started.borrow_mut().push(format!("start:{}", event.name)));
        let stopped = Rc::clone(&log);
        notifications
            .process_stopped
            .subscribe(move |event| stopped.borrow_mut().push(format!("stop:{}", event.name)));
        let changed = Rc::clone(&log);
        notifications
            .roster_changed
            .subscribe(move |_| changed.borrow_mut().push("changed".to_string()));
        log
    }

    #[test]
    fn first_snapshot_builds_roster_and_reports_running_items() {
        let mut sync = RosterSynchronizer::new();
        let log = log_names(&mut sync);

        sync.on_snapshot(vec![entry(0, "nav", false), entry(1, "map", true)])
            .expect("initialize");

        assert!(sync.is_initialized());
        assert_eq!(sync.records().len(), 2);
        assert_eq!(sync.records()[0].working_directory(), "/work/nav");
        assert_eq!(sync.records()[1].command(), "launch map");
        assert_eq!(*log.borrow(), vec!["start:map", "changed"]);
    }

    #[test]
    fn later_snapshots_only_touch_running_flags() {
        let mut sync = RosterSynchronizer::new();
        sync.on_snapshot(vec![entry(0, "nav", false), entry(1, "map", true)])
            .expect("initialize");
        let before = sync.records().to_vec();
        let storage = sync.records().as_ptr();
        let log = log_names(&mut sync);

        let mut renamed = entry(0, "renamed", true);
        renamed.command = "something else".to_string();
        sync.on_snapshot(vec![renamed, entry(1, "map", false)])
            .expect("reconcile");

        assert_eq!(sync.records().as_ptr(), storage);
        assert!(sync.records()[0].is_running());
        assert!(!sync.records()[1].is_running());
        for (after, before) in sync.records().iter().zip(&before) {
            assert_eq!(after.id(), before.id());
            assert_eq!(after.name(), before.name());
            assert_eq!(after.command(), before.command());
            assert_eq!(after.working_directory(), before.working_directory());
        }
        assert_eq!(*log.borrow(), vec!["changed"]);
    }

    #[test]
    fn length_mismatch_is_rejected_without_patching() {
        let mut sync = RosterSynchronizer::new();
        sync.on_snapshot(vec![entry(0, "nav", false), entry(1, "map", false)])
            .expect("initialize");
        let log = log_names(&mut sync);

        let err = sync
            .on_snapshot(vec![entry(0, "nav", true)])
            .expect_err("short snapshot");

        assert_eq!(
            err,
            SyncError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        );
        assert!(!sync.records()[0].is_running());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn reordered_snapshot_is_rejected() {
        let mut sync = RosterSynchronizer::new();
        sync.on_snapshot(vec![entry(0, "nav", false), entry(1, "map", false)])
            .expect("initialize");

        let err = sync
            .on_snapshot(vec![entry(1, "map", true), entry(0, "nav", false)])
            .expect_err("reordered");

        assert_eq!(
            err,
            SyncError::IdentityMismatch {
                index: 0,
                expected: 0,
                actual: 1
            }
        );
        assert!(!sync.records()[1].is_running());
    }

    #[test]
    fn click_on_idle_record_starts_with_captured_args() {
        let mut sync = RosterSynchronizer::new();
        sync.on_snapshot(vec![entry(0, "nav", false), entry(1, "map", true)])
            .expect("initialize");
        let log = log_names(&mut sync);
        let transport = RecordingTransport::default();
        let inputs = FixedInputs(HashMap::from([(0, "--debug".to_string())]));

        let outcome = sync
            .handle_click(0, &transport, Some(&inputs))
            .expect("click");

        assert_eq!(outcome, ClickOutcome::StartRequested);
        let starts = transport.starts.borrow();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].entry.id, 0);
        assert_eq!(starts[0].args, "--debug");
        assert!(transport.stops.borrow().is_empty());
        assert!(!sync.records()[0].is_running());
        assert_eq!(sync.records()[0].last_args(), "--debug");
        assert_eq!(*log.borrow(), vec!["start:nav"]);
    }

    #[test]
    fn click_on_running_record_stops_it() {
        let mut sync = RosterSynchronizer::new();
        sync.on_snapshot(vec![entry(0, "nav", false), entry(1, "map", true)])
            .expect("initialize");
        let log = log_names(&mut sync);
        let transport = RecordingTransport::default();

        let outcome = sync.handle_click(1, &transport, None).expect("click");

        assert_eq!(outcome, ClickOutcome::StopRequested);
        assert_eq!(transport.stops.borrow()[0].entry.name, "map");
        assert!(sync.records()[1].is_running());
        assert_eq!(*log.borrow(), vec!["stop:map"]);
    }

    #[test]
    fn missing_input_collaborator_starts_with_empty_args() {
        let mut sync = RosterSynchronizer::new();
        sync.on_snapshot(vec![entry(0, "nav", false)])
            .expect("initialize");
        let transport = RecordingTransport::default();

        sync.handle_click(0, &transport, None).expect("click");

        assert_eq!(transport.starts.borrow()[0].args, "");
    }

    #[test]
    fn out_of_range_click_is_an_error() {
        let mut sync = RosterSynchronizer::new();
        let transport = RecordingTransport::default();
        assert_eq!(
            sync.handle_click(0, &transport, None),
            Err(SyncError::IndexOutOfRange { index: 0, len: 0 })
        );

        sync.on_snapshot(vec![entry(0, "nav", false)])
            .expect("initialize");
        assert_eq!(
            sync.handle_click(3, &transport, None),
            Err(SyncError::IndexOutOfRange { index: 3, len: 1 })
        );
        assert!(transport.starts.borrow().is_empty());
    }

    #[test]
    fn lookups_by_id_and_position() {
        let mut sync = RosterSynchronizer::new();
        assert!(sync.by_id(1).is_none());
        sync.on_snapshot(vec![entry(4, "nav", false), entry(9, "map", true)])
            .expect("initialize");
        assert_eq!(sync.position_of(9), Some(1));
        assert_eq!(sync.by_id(4).map(ProcessRecord::name), Some("nav"));
        assert_eq!(sync.record(1).map(ProcessRecord::id), Some(9));
        assert!(sync.record(2).is_none());
    }
}
