use serde::{Deserialize, Serialize};

/// One launchable item exactly as the agent reports it in a roster snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchEntry {
    pub id: u32,
    pub name: String,
    pub command: String,
    pub working_directory: String,
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartRequest {
    pub entry: LaunchEntry,
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StopRequest {
    pub entry: LaunchEntry,
}

/// Local mirror of one roster item.
///
/// Only `running` changes after construction, and only the synchronizer
/// changes it. `last_args` is whatever the args field held the last time a
/// start was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    id: u32,
    name: String,
    working_directory: String,
    command: String,
    running: bool,
    last_args: String,
}

impl ProcessRecord {
    pub fn from_entry(entry: LaunchEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            working_directory: entry.working_directory,
            command: entry.command,
            running: entry.running,
            last_args: String::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn last_args(&self) -> &str {
        &self.last_args
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn capture_args_from(&mut self, input: Option<&str>) {
        self.last_args = input.unwrap_or_default().to_string();
    }

    pub fn build_start_request(&self) -> StartRequest {
        StartRequest {
            entry: self.entry(),
            args: self.last_args.clone(),
        }
    }

    pub fn build_stop_request(&self) -> StopRequest {
        StopRequest {
            entry: self.entry(),
        }
    }

    fn entry(&self) -> LaunchEntry {
        LaunchEntry {
            id: self.id,
            name: self.name.clone(),
            command: self.command.clone(),
            working_directory: self.working_directory.clone(),
            running: self.running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav_entry() -> LaunchEntry {
        LaunchEntry {
            id: 0,
            name: "nav".to_string(),
            command: "roslaunch nav nav.launch".to_string(),
            working_directory: "/opt/robot".to_string(),
            running: false,
        }
    }

    #[test]
    fn record_copies_entry_fields() {
        let record = ProcessRecord::from_entry(nav_entry());
        assert_eq!(record.id(), 0);
        assert_eq!(record.name(), "nav");
        assert_eq!(record.command(), "roslaunch nav nav.launch");
        assert_eq!(record.working_directory(), "/opt/robot");
        assert!(!record.is_running());
        assert_eq!(record.last_args(), "");
    }

    #[test]
    fn start_request_carries_captured_args() {
        let mut record = ProcessRecord::from_entry(nav_entry());
        record.capture_args_from(Some("--debug"));
        let request = record.build_start_request();
        assert_eq!(request.args, "--debug");
        assert_eq!(request.entry, nav_entry());
    }

    #[test]
    fn missing_input_captures_empty_args() {
        let mut record = ProcessRecord::from_entry(nav_entry());
        record.capture_args_from(Some("--stale"));
        record.capture_args_from(None);
        assert_eq!(record.build_start_request().args, "");
    }

    #[test]
    fn stop_request_snapshots_current_running_flag() {
        let mut record = ProcessRecord::from_entry(nav_entry());
        record.set_running(true);
        let request = record.build_stop_request();
        assert!(request.entry.running);
        assert_eq!(request.entry.name, "nav");
    }
}
