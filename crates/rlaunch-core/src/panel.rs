//! Binds one control per visible roster record and routes input back to the
//! synchronizer.
//!
//! Controls are created on the first roster change and only patched after
//! that, so renderer-side state (args fields, focus) survives snapshots.

use crate::collab::{
    CanvasSize, CommandTransport, ControlDirective, ControlInput, ControlRect, ControlRenderer,
    InputCapture, InputEvent, TooltipSink,
};
use crate::control::{Appearance, ControlStateMachine};
use crate::notify::{Channel, ControlClicked};
use crate::roster::{ClickOutcome, RosterSynchronizer, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub columns: u16,
    pub control_width: u16,
    pub control_height: u16,
    pub spacing: u16,
    pub margin: u16,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            columns: 3,
            control_width: 150,
            control_height: 100,
            spacing: 10,
            margin: 2,
        }
    }
}

impl LayoutConfig {
    fn columns(&self) -> u16 {
        self.columns.max(1)
    }

    /// Row-major slot for the `slot`-th visible control.
    pub fn rect_for(&self, slot: usize) -> ControlRect {
        let columns = usize::from(self.columns());
        let col = clamp_u16(slot % columns);
        let row = clamp_u16(slot / columns);
        let step_x = self.control_width.saturating_add(self.spacing);
        let step_y = self.control_height.saturating_add(self.spacing);
        ControlRect {
            x: self.margin.saturating_add(col.saturating_mul(step_x)),
            y: self.margin.saturating_add(row.saturating_mul(step_y)),
            width: self.control_width,
            height: self.control_height,
        }
    }

    /// Canvas big enough for `visible` controls: always a full row of
    /// columns wide, plus the margin on every side.
    pub fn canvas_for(&self, visible: usize) -> CanvasSize {
        let columns = self.columns();
        let rows = clamp_u16(visible.div_ceil(usize::from(columns)));
        let extent = |count: u16, size: u16| {
            count
                .saturating_mul(size.saturating_add(self.spacing))
                .saturating_sub(self.spacing)
                .saturating_add(self.margin.saturating_mul(2))
        };
        CanvasSize {
            width: extent(columns, self.control_width),
            height: if rows == 0 {
                self.margin.saturating_mul(2)
            } else {
                extent(rows, self.control_height)
            },
        }
    }
}

fn clamp_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub layout: LayoutConfig,
    /// Ids to show. `None` shows every record.
    pub only_these: Option<Vec<u32>>,
    /// Tooltip text keyed by item name.
    pub tooltips: HashMap<String, String>,
}

impl PanelConfig {
    fn shows(&self, id: u32) -> bool {
        self.only_these
            .as_ref()
            .map_or(true, |ids| ids.contains(&id))
    }
}

/// Collaborators needed while handling one input event.
pub struct PanelContext<'a> {
    pub transport: &'a dyn CommandTransport,
    pub inputs: Option<&'a dyn InputCapture>,
    pub renderer: &'a mut dyn ControlRenderer,
    pub tooltips: Option<&'a mut dyn TooltipSink>,
}

#[derive(Debug)]
struct BoundControl {
    id: u32,
    name: String,
    index: usize,
    rect: ControlRect,
    tooltip: Option<String>,
    machine: ControlStateMachine,
}

/// Read-only view of a bound control for renderers and hit testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlView<'a> {
    pub id: u32,
    pub name: &'a str,
    pub rect: ControlRect,
    pub appearance: Appearance,
    pub pressed: bool,
    pub tooltip: Option<&'a str>,
}

#[derive(Debug)]
enum GraphicsPhase {
    NotCreated,
    Created(Vec<BoundControl>),
}

#[derive(Debug)]
pub struct PanelController {
    config: PanelConfig,
    phase: GraphicsPhase,
    clicks: Channel<ControlClicked>,
}

impl PanelController {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            config,
            phase: GraphicsPhase::NotCreated,
            clicks: Channel::new(),
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn clicks_mut(&mut self) -> &mut Channel<ControlClicked> {
        &mut self.clicks
    }

    pub fn is_created(&self) -> bool {
        matches!(self.phase, GraphicsPhase::Created(_))
    }

    pub fn on_roster_changed(
        &mut self,
        roster: &RosterSynchronizer,
        renderer: &mut dyn ControlRenderer,
    ) {
        match self.phase {
            GraphicsPhase::NotCreated => {
                let controls = build_controls(&self.config, roster);
                renderer.prepare_canvas(self.config.layout.canvas_for(controls.len()));
                for control in &controls {
                    renderer.create_control(&ControlDirective {
                        id: control.id,
                        name: control.name.clone(),
                        rect: control.rect,
                        appearance: control.machine.appearance(),
                        tooltip: control.tooltip.clone(),
                    });
                }
                debug!(event = "panel_controls_created", controls = controls.len());
                self.phase = GraphicsPhase::Created(controls);
            }
            GraphicsPhase::Created(ref mut controls) => {
                for control in controls.iter_mut() {
                    let Some(record) = roster.by_id(control.id) else {
                        continue;
                    };
                    let appearance = control.machine.refresh(record.is_running());
                    renderer.update_control(control.id, appearance);
                }
            }
        }
    }

    /// Routes one renderer input event. A click is recorded on the control
    /// before the synchronizer sees it, so the next refresh already knows
    /// the control was touched.
    pub fn handle_input(
        &mut self,
        event: &InputEvent,
        roster: &mut RosterSynchronizer,
        ctx: PanelContext<'_>,
    ) -> Result<Option<ClickOutcome>, SyncError> {
        let GraphicsPhase::Created(controls) = &mut self.phase else {
            debug!(event = "panel_input_before_controls", id = event.id);
            return Ok(None);
        };
        let Some(control) = controls.iter_mut().find(|control| control.id == event.id) else {
            warn!(event = "panel_input_unknown_control", id = event.id);
            return Ok(None);
        };

        match event.kind {
            ControlInput::PointerDown => {
                control.machine.press();
                ctx.renderer.set_pressed(control.id, true);
                Ok(None)
            }
            ControlInput::PointerUp => {
                if control.machine.release() {
                    ctx.renderer.set_pressed(control.id, false);
                }
                Ok(None)
            }
            ControlInput::Click => {
                control.machine.record_click();
                let index = control.index;
                self.clicks.emit(&ControlClicked {
                    id: event.id,
                    name: event.name.clone(),
                });
                roster.handle_click(index, ctx.transport, ctx.inputs).map(Some)
            }
            ControlInput::HoverEnter => {
                if let (Some(sink), Some(text)) = (ctx.tooltips, control.tooltip.as_deref()) {
                    sink.show(text);
                }
                Ok(None)
            }
            ControlInput::HoverLeave => {
                if let Some(sink) = ctx.tooltips {
                    sink.hide();
                }
                Ok(None)
            }
        }
    }

    pub fn controls(&self) -> impl Iterator<Item = ControlView<'_>> {
        let controls: &[BoundControl] = match &self.phase {
            GraphicsPhase::NotCreated => &[],
            GraphicsPhase::Created(controls) => controls,
        };
        controls.iter().map(|control| ControlView {
            id: control.id,
            name: &control.name,
            rect: control.rect,
            appearance: control.machine.appearance(),
            pressed: control.machine.is_pressed(),
            tooltip: control.tooltip.as_deref(),
        })
    }

    pub fn control_at(&self, x: u16, y: u16) -> Option<ControlView<'_>> {
        self.controls().find(|view| view.rect.contains(x, y))
    }
}

fn build_controls(config: &PanelConfig, roster: &RosterSynchronizer) -> Vec<BoundControl> {
    roster
        .records()
        .iter()
        .enumerate()
        .filter(|(_, record)| config.shows(record.id()))
        .enumerate()
        .map(|(slot, (index, record))| BoundControl {
            id: record.id(),
            name: record.name().to_string(),
            index,
            rect: config.layout.rect_for(slot),
            tooltip: config.tooltips.get(record.name()).cloned(),
            machine: ControlStateMachine::new(record.is_running()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::DisplayState;
    use crate::record::{LaunchEntry, StartRequest, StopRequest};
    use std::cell::RefCell;

    #[derive(Default)]
    struct NullTransport {
        starts: RefCell<Vec<StartRequest>>,
        stops: RefCell<Vec<StopRequest>>,
    }

    impl CommandTransport for NullTransport {
        fn start(&self, request: StartRequest) {
            self.starts.borrow_mut().push(request);
        }

        fn stop(&self, request: StopRequest) {
            self.stops.borrow_mut().push(request);
        }
    }

    #[derive(Default)]
    struct Canvas {
        size: Option<CanvasSize>,
        created: Vec<ControlDirective>,
        updates: Vec<(u32, DisplayState)>,
        pressed: Vec<(u32, bool)>,
    }

    impl ControlRenderer for Canvas {
        fn prepare_canvas(&mut self, size: CanvasSize) {
            self.size = Some(size);
        }

        fn create_control(&mut self, directive: &ControlDirective) {
            self.created.push(directive.clone());
        }

        fn update_control(&mut self, id: u32, appearance: Appearance) {
            self.updates.push((id, appearance.state));
        }

        fn set_pressed(&mut self, id: u32, pressed: bool) {
            self.pressed.push((id, pressed));
        }
    }

    #[derive(Default)]
    struct Footer {
        shown: Option<String>,
    }

    impl TooltipSink for Footer {
        fn show(&mut self, text: &str) {
            self.shown = Some(text.to_string());
        }

        fn hide(&mut self) {
            self.shown = None;
        }
    }

    fn entry(id: u32, name: &str, running: bool) -> LaunchEntry {
        LaunchEntry {
            id,
            name: name.to_string(),
            command: format!("run {name}"),
            working_directory: "/".to_string(),
            running,
        }
    }

    fn initialized(items: Vec<LaunchEntry>) -> RosterSynchronizer {
        let mut roster = RosterSynchronizer::new();
        roster.on_snapshot(items).expect("initialize");
        roster
    }

    fn click(
        panel: &mut PanelController,
        roster: &mut RosterSynchronizer,
        transport: &NullTransport,
        canvas: &mut Canvas,
        id: u32,
        name: &str,
    ) -> Option<ClickOutcome> {
        panel
            .handle_input(
                &InputEvent::new(ControlInput::Click, id, name),
                roster,
                PanelContext {
                    transport,
                    inputs: None,
                    renderer: canvas,
                    tooltips: None,
                },
            )
            .expect("click")
    }

    #[test]
    fn layout_places_controls_row_major() {
        let layout = LayoutConfig {
            columns: 2,
            control_width: 10,
            control_height: 4,
            spacing: 1,
            margin: 2,
        };
        assert_eq!(
            layout.rect_for(0),
            ControlRect {
                x: 2,
                y: 2,
                width: 10,
                height: 4
            }
        );
        assert_eq!(layout.rect_for(1).x, 13);
        assert_eq!((layout.rect_for(2).x, layout.rect_for(2).y), (2, 7));
        assert_eq!(
            layout.canvas_for(3),
            CanvasSize {
                width: 2 * 11 - 1 + 4,
                height: 2 * 5 - 1 + 4
            }
        );
        assert_eq!(layout.canvas_for(0).height, 4);
    }

    #[test]
    fn zero_columns_behaves_like_one() {
        let layout = LayoutConfig {
            columns: 0,
            ..LayoutConfig::default()
        };
        assert_eq!(layout.rect_for(1).x, layout.rect_for(0).x);
        assert!(layout.rect_for(1).y > layout.rect_for(0).y);
    }

    #[test]
    fn first_change_creates_filtered_controls_in_roster_order() {
        let roster = initialized(vec![
            entry(0, "nav", false),
            entry(1, "map", true),
            entry(2, "cam", false),
        ]);
        let mut panel = PanelController::new(PanelConfig {
            only_these: Some(vec![2, 1]),
            tooltips: HashMap::from([("cam".to_string(), "front camera".to_string())]),
            ..PanelConfig::default()
        });
        let mut canvas = Canvas::default();

        panel.on_roster_changed(&roster, &mut canvas);

        assert!(panel.is_created());
        let names: Vec<_> = canvas.created.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["map", "cam"]);
        assert_eq!(canvas.created[0].appearance.state, DisplayState::Running);
        assert_eq!(canvas.created[1].appearance.state, DisplayState::Idle);
        assert_eq!(canvas.created[1].tooltip.as_deref(), Some("front camera"));
        assert_eq!(canvas.created[1].rect, panel.config().layout.rect_for(1));
        assert_eq!(canvas.size, Some(panel.config().layout.canvas_for(2)));
    }

    #[test]
    fn later_changes_patch_existing_controls() {
        let mut roster = initialized(vec![entry(0, "nav", false), entry(1, "map", true)]);
        let mut panel = PanelController::new(PanelConfig::default());
        let mut canvas = Canvas::default();
        panel.on_roster_changed(&roster, &mut canvas);

        roster
            .on_snapshot(vec![entry(0, "nav", true), entry(1, "map", false)])
            .expect("reconcile");
        panel.on_roster_changed(&roster, &mut canvas);

        assert_eq!(canvas.created.len(), 2);
        assert_eq!(
            canvas.updates,
            vec![(0, DisplayState::Running), (1, DisplayState::Idle)]
        );
    }

    #[test]
    fn click_marks_control_and_defers_state_to_next_snapshot() {
        let mut roster = initialized(vec![entry(0, "nav", true)]);
        let mut panel = PanelController::new(PanelConfig::default());
        let mut canvas = Canvas::default();
        let transport = NullTransport::default();
        panel.on_roster_changed(&roster, &mut canvas);

        let outcome = click(&mut panel, &mut roster, &transport, &mut canvas, 0, "nav");

        assert_eq!(outcome, Some(ClickOutcome::StopRequested));
        assert_eq!(transport.stops.borrow().len(), 1);
        assert!(canvas.updates.is_empty());
        assert_eq!(
            panel.controls().next().map(|view| view.appearance.state),
            Some(DisplayState::Running)
        );

        roster
            .on_snapshot(vec![entry(0, "nav", false)])
            .expect("reconcile");
        panel.on_roster_changed(&roster, &mut canvas);
        assert_eq!(canvas.updates, vec![(0, DisplayState::Stopped)]);
    }

    #[test]
    fn click_uses_roster_index_not_visible_slot() {
        let mut roster = initialized(vec![entry(0, "nav", false), entry(1, "map", false)]);
        let mut panel = PanelController::new(PanelConfig {
            only_these: Some(vec![1]),
            ..PanelConfig::default()
        });
        let mut canvas = Canvas::default();
        let transport = NullTransport::default();
        panel.on_roster_changed(&roster, &mut canvas);

        click(&mut panel, &mut roster, &transport, &mut canvas, 1, "map");

        assert_eq!(transport.starts.borrow()[0].entry.name, "map");
    }

    #[test]
    fn click_notifies_subscribers() {
        let mut roster = initialized(vec![entry(0, "nav", false)]);
        let mut panel = PanelController::new(PanelConfig::default());
        let seen = std::rc::Rc::new(RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&seen);
        panel
            .clicks_mut()
            .subscribe(move |event: &ControlClicked| sink.borrow_mut().push(event.clone()));
        let mut canvas = Canvas::default();
        let transport = NullTransport::default();
        panel.on_roster_changed(&roster, &mut canvas);

        click(&mut panel, &mut roster, &transport, &mut canvas, 0, "nav");

        assert_eq!(
            *seen.borrow(),
            vec![ControlClicked {
                id: 0,
                name: "nav".to_string()
            }]
        );
    }

    #[test]
    fn pointer_and_hover_events_drive_pressed_state_and_tooltips() {
        let mut roster = initialized(vec![entry(0, "nav", false)]);
        let mut panel = PanelController::new(PanelConfig {
            tooltips: HashMap::from([("nav".to_string(), "navigation stack".to_string())]),
            ..PanelConfig::default()
        });
        let mut canvas = Canvas::default();
        let mut footer = Footer::default();
        let transport = NullTransport::default();
        panel.on_roster_changed(&roster, &mut canvas);

        for kind in [
            ControlInput::PointerDown,
            ControlInput::HoverEnter,
            ControlInput::PointerUp,
            ControlInput::PointerUp,
        ] {
            let outcome = panel
                .handle_input(
                    &InputEvent::new(kind, 0, "nav"),
                    &mut roster,
                    PanelContext {
                        transport: &transport,
                        inputs: None,
                        renderer: &mut canvas,
                        tooltips: Some(&mut footer),
                    },
                )
                .expect("input");
            assert_eq!(outcome, None);
        }

        assert_eq!(canvas.pressed, vec![(0, true), (0, false)]);
        assert_eq!(footer.shown.as_deref(), Some("navigation stack"));

        panel
            .handle_input(
                &InputEvent::new(ControlInput::HoverLeave, 0, "nav"),
                &mut roster,
                PanelContext {
                    transport: &transport,
                    inputs: None,
                    renderer: &mut canvas,
                    tooltips: Some(&mut footer),
                },
            )
            .expect("leave");
        assert!(footer.shown.is_none());
        assert!(transport.starts.borrow().is_empty());
    }

    #[test]
    fn input_before_creation_is_ignored() {
        let mut roster = RosterSynchronizer::new();
        let mut panel = PanelController::new(PanelConfig::default());
        let mut canvas = Canvas::default();
        let transport = NullTransport::default();
        assert_eq!(
            click(&mut panel, &mut roster, &transport, &mut canvas, 0, "nav"),
            None
        );
    }

    #[test]
    fn hit_test_finds_control_under_point() {
        let roster = initialized(vec![entry(0, "nav", false), entry(1, "map", false)]);
        let mut panel = PanelController::new(PanelConfig::default());
        let mut canvas = Canvas::default();
        panel.on_roster_changed(&roster, &mut canvas);

        let second = panel.config().layout.rect_for(1);
        assert_eq!(panel.control_at(second.x, second.y).map(|v| v.id), Some(1));
        assert!(panel.control_at(0, 0).is_none());
    }
}
