//! Presentation state for one visible control.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Running,
    Stopped,
}

impl DisplayState {
    pub fn label(self) -> &'static str {
        match self {
            DisplayState::Idle => "Idle",
            DisplayState::Running => "Running",
            DisplayState::Stopped => "Stopped",
        }
    }

    pub fn accent(self) -> Accent {
        match self {
            DisplayState::Idle => Accent::NeutralGray,
            DisplayState::Running => Accent::SuccessGreen,
            DisplayState::Stopped => Accent::AlertRed,
        }
    }

    pub fn appearance(self) -> Appearance {
        Appearance {
            state: self,
            label: self.label(),
            accent: self.accent(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    SuccessGreen,
    NeutralGray,
    AlertRed,
}

impl Accent {
    pub fn as_str(self) -> &'static str {
        match self {
            Accent::SuccessGreen => "success-green",
            Accent::NeutralGray => "neutral-gray",
            Accent::AlertRed => "alert-red",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appearance {
    pub state: DisplayState,
    pub label: &'static str,
    pub accent: Accent,
}

/// One-way click memory. There is no transition back to `NeverClicked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClickMemory {
    NeverClicked,
    Clicked,
}

#[derive(Debug, Clone)]
pub struct ControlStateMachine {
    state: DisplayState,
    clicks: ClickMemory,
    pressed: bool,
}

impl ControlStateMachine {
    pub fn new(is_running: bool) -> Self {
        let state = if is_running {
            DisplayState::Running
        } else {
            DisplayState::Idle
        };
        Self {
            state,
            clicks: ClickMemory::NeverClicked,
            pressed: false,
        }
    }

    /// A non-running control reads "Stopped" once it has ever been clicked,
    /// "Idle" otherwise.
    pub fn refresh(&mut self, is_running_now: bool) -> Appearance {
        self.state = match (is_running_now, self.clicks) {
            (true, _) => DisplayState::Running,
            (false, ClickMemory::NeverClicked) => DisplayState::Idle,
            (false, ClickMemory::Clicked) => DisplayState::Stopped,
        };
        self.appearance()
    }

    pub fn record_click(&mut self) {
        self.clicks = ClickMemory::Clicked;
    }

    pub fn ever_clicked(&self) -> bool {
        self.clicks == ClickMemory::Clicked
    }

    pub fn state(&self) -> DisplayState {
        self.state
    }

    pub fn appearance(&self) -> Appearance {
        self.state.appearance()
    }

    pub fn press(&mut self) {
        self.pressed = true;
    }

    /// Returns whether the control was pressed before the release.
    pub fn release(&mut self) -> bool {
        std::mem::replace(&mut self.pressed, false)
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_follows_running_flag() {
        assert_eq!(ControlStateMachine::new(true).state(), DisplayState::Running);
        assert_eq!(ControlStateMachine::new(false).state(), DisplayState::Idle);
    }

    #[test]
    fn untouched_idle_control_stays_idle() {
        let mut machine = ControlStateMachine::new(false);
        let appearance = machine.refresh(false);
        assert_eq!(appearance.state, DisplayState::Idle);
        assert_eq!(appearance.label, "Idle");
        assert_eq!(appearance.accent.as_str(), "neutral-gray");
    }

    #[test]
    fn clicked_control_reads_stopped_when_not_running() {
        let mut machine = ControlStateMachine::new(false);
        machine.record_click();
        let appearance = machine.refresh(false);
        assert_eq!(appearance.state, DisplayState::Stopped);
        assert_eq!(appearance.label, "Stopped");
        assert_eq!(appearance.accent.as_str(), "alert-red");
    }

    #[test]
    fn running_wins_regardless_of_click_history() {
        let mut machine = ControlStateMachine::new(false);
        let appearance = machine.refresh(true);
        assert_eq!(appearance.label, "Running");
        assert_eq!(appearance.accent.as_str(), "success-green");

        machine.record_click();
        assert_eq!(machine.refresh(true).state, DisplayState::Running);
    }

    #[test]
    fn click_memory_never_reverts() {
        let mut machine = ControlStateMachine::new(true);
        machine.record_click();
        machine.refresh(true);
        machine.refresh(false);
        machine.refresh(true);
        assert!(machine.ever_clicked());
        assert_eq!(machine.refresh(false).state, DisplayState::Stopped);
    }

    #[test]
    fn release_reports_prior_press() {
        let mut machine = ControlStateMachine::new(false);
        assert!(!machine.release());
        machine.press();
        assert!(machine.is_pressed());
        assert!(machine.release());
        assert!(!machine.is_pressed());
    }
}
