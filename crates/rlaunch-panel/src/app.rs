use crate::agent_link::{AgentEvent, OutboundCommand, QueueTransport};
use crate::config::Config;
use crate::ui::CANVAS_TOP;
use crossterm::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use rlaunch_core::notify::{ProcessStarted, ProcessStopped};
use rlaunch_core::{
    Appearance, CanvasSize, ControlDirective, ControlInput, ControlRect, ControlRenderer,
    InputCapture, InputEvent, PanelContext, PanelController, RosterSynchronizer, TooltipSink,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const ACTIVITY_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    EditArgs,
}

/// What the panel controller has told the terminal to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceControl {
    pub id: u32,
    pub name: String,
    pub rect: ControlRect,
    pub appearance: Appearance,
    pub pressed: bool,
}

#[derive(Debug, Default)]
pub struct Surface {
    pub canvas: CanvasSize,
    pub controls: Vec<SurfaceControl>,
}

impl Surface {
    fn get_mut(&mut self, id: u32) -> Option<&mut SurfaceControl> {
        self.controls.iter_mut().find(|control| control.id == id)
    }

    fn name_of(&self, id: u32) -> Option<&str> {
        self.controls
            .iter()
            .find(|control| control.id == id)
            .map(|control| control.name.as_str())
    }
}

impl ControlRenderer for Surface {
    fn prepare_canvas(&mut self, size: CanvasSize) {
        self.canvas = size;
    }

    fn create_control(&mut self, directive: &ControlDirective) {
        self.controls.push(SurfaceControl {
            id: directive.id,
            name: directive.name.clone(),
            rect: directive.rect,
            appearance: directive.appearance,
            pressed: false,
        });
    }

    fn update_control(&mut self, id: u32, appearance: Appearance) {
        if let Some(control) = self.get_mut(id) {
            control.appearance = appearance;
        }
    }

    fn set_pressed(&mut self, id: u32, pressed: bool) {
        if let Some(control) = self.get_mut(id) {
            control.pressed = pressed;
        }
    }
}

/// Per-control args text typed by the operator.
#[derive(Debug, Default)]
pub struct ArgsFields(HashMap<u32, String>);

impl ArgsFields {
    pub fn get(&self, id: u32) -> &str {
        self.0.get(&id).map(String::as_str).unwrap_or_default()
    }

    fn edit(&mut self, id: u32) -> &mut String {
        self.0.entry(id).or_default()
    }
}

impl InputCapture for ArgsFields {
    fn args_for(&self, id: u32) -> Option<String> {
        self.0.get(&id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct Footer {
    pub tooltip: Option<String>,
}

impl TooltipSink for Footer {
    fn show(&mut self, text: &str) {
        self.tooltip = Some(text.to_string());
    }

    fn hide(&mut self) {
        self.tooltip = None;
    }
}

pub struct App {
    pub config: Config,
    roster: RosterSynchronizer,
    panel: PanelController,
    pub surface: Surface,
    pub args: ArgsFields,
    pub footer: Footer,
    transport: QueueTransport,
    activity: Rc<RefCell<VecDeque<String>>>,
    pub connected: bool,
    pub selected: usize,
    pub mode: Mode,
    pointer_down: Option<u32>,
    hovered: Option<u32>,
    pub status_note: Option<String>,
}

fn push_activity(log: &RefCell<VecDeque<String>>, line: String) {
    let mut log = log.borrow_mut();
    if log.len() == ACTIVITY_LIMIT {
        log.pop_front();
    }
    log.push_back(line);
}

impl App {
    pub fn new(config: Config, command_tx: mpsc::Sender<OutboundCommand>) -> Self {
        let mut roster = RosterSynchronizer::new();
        let activity = Rc::new(RefCell::new(VecDeque::new()));
        let notifications = roster.notifications_mut();
        let log = Rc::clone(&activity);
        notifications
            .process_started
            .subscribe(move |event: &ProcessStarted| {
                push_activity(&log, format!("started {}", event.name));
            });
        let log = Rc::clone(&activity);
        notifications
            .process_stopped
            .subscribe(move |event: &ProcessStopped| {
                push_activity(&log, format!("stopping {}", event.name));
            });

        let panel = PanelController::new(config.panel.clone());
        Self {
            config,
            roster,
            panel,
            surface: Surface::default(),
            args: ArgsFields::default(),
            footer: Footer::default(),
            transport: QueueTransport::new(command_tx),
            activity,
            connected: false,
            selected: 0,
            mode: Mode::Normal,
            pointer_down: None,
            hovered: None,
            status_note: None,
        }
    }

    pub fn latest_activity(&self) -> Option<String> {
        self.activity.borrow().back().cloned()
    }

    pub fn selected_id(&self) -> Option<u32> {
        self.surface.controls.get(self.selected).map(|control| control.id)
    }

    pub fn apply_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Connected => {
                self.connected = true;
                self.status_note = None;
            }
            AgentEvent::Disconnected => {
                self.connected = false;
                self.status_note = Some("agent offline; reconnecting".to_string());
            }
            AgentEvent::Snapshot(payload) => match self.roster.on_snapshot(payload.items) {
                Ok(_) => {
                    self.panel.on_roster_changed(&self.roster, &mut self.surface);
                    self.clamp_selection();
                }
                Err(err) => {
                    warn!(event = "snapshot_rejected", seq = payload.seq, error = %err);
                    self.status_note = Some(format!("snapshot rejected: {err}"));
                }
            },
            AgentEvent::CommandResult {
                request_id,
                payload,
            } => {
                if payload.is_ok() {
                    info!(
                        event = "command_result",
                        request_id = request_id.as_deref().unwrap_or_default(),
                        command = %payload.command,
                        message = payload.message.as_deref().unwrap_or_default()
                    );
                    self.status_note = payload.message;
                } else {
                    let detail = payload
                        .error
                        .map(|err| format!("{}: {}", err.code, err.message))
                        .unwrap_or_else(|| payload.status.clone());
                    warn!(
                        event = "command_result_error",
                        request_id = request_id.as_deref().unwrap_or_default(),
                        command = %payload.command,
                        detail = %detail
                    );
                    self.status_note = Some(format!("{} failed: {detail}", payload.command));
                }
            }
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.surface.controls.len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    fn dispatch(&mut self, kind: ControlInput, id: u32) {
        let Some(name) = self.surface.name_of(id) else {
            return;
        };
        let event = InputEvent::new(kind, id, name);
        let ctx = PanelContext {
            transport: &self.transport,
            inputs: Some(&self.args),
            renderer: &mut self.surface,
            tooltips: Some(&mut self.footer),
        };
        if let Err(err) = self.panel.handle_input(&event, &mut self.roster, ctx) {
            warn!(event = "input_rejected", id, error = %err);
            self.status_note = Some(err.to_string());
        }
    }

    fn control_at_screen(&self, column: u16, row: u16) -> Option<u32> {
        let row = row.checked_sub(CANVAS_TOP)?;
        self.panel.control_at(column, row).map(|view| view.id)
    }

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        let hit = self.control_at_screen(event.column, event.row);
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(id) = hit {
                    self.pointer_down = Some(id);
                    self.select_id(id);
                    self.dispatch(ControlInput::PointerDown, id);
                }
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(id) = self.pointer_down.take() {
                    self.dispatch(ControlInput::PointerUp, id);
                    if hit == Some(id) {
                        self.dispatch(ControlInput::Click, id);
                    }
                }
            }
            MouseEventKind::Moved | MouseEventKind::Drag(MouseButton::Left) => {
                self.update_hover(hit);
            }
            _ => {}
        }
    }

    fn update_hover(&mut self, hit: Option<u32>) {
        if hit == self.hovered {
            return;
        }
        if let Some(previous) = self.hovered.take() {
            self.dispatch(ControlInput::HoverLeave, previous);
        }
        if let Some(id) = hit {
            self.hovered = Some(id);
            self.dispatch(ControlInput::HoverEnter, id);
        }
    }

    fn select_id(&mut self, id: u32) {
        if let Some(index) = self.surface.controls.iter().position(|c| c.id == id) {
            self.selected = index;
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.surface.controls.len();
        if len == 0 {
            return;
        }
        let target = self.selected as isize + delta;
        if (0..len as isize).contains(&target) {
            self.selected = target as usize;
        }
    }

    /// Returns true when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.mode {
            Mode::EditArgs => {
                self.handle_edit_key(key);
                false
            }
            Mode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        let Some(id) = self.selected_id() else {
            self.mode = Mode::Normal;
            return;
        };
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                self.args.edit(id).pop();
            }
            KeyCode::Char(ch) => {
                self.args.edit(id).push(ch);
            }
            _ => {}
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> bool {
        let columns = self.config.panel.layout.columns.max(1) as isize;
        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Left | KeyCode::Char('h') => self.move_selection(-1),
            KeyCode::Right | KeyCode::Char('l') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-columns),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(columns),
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(id) = self.selected_id() {
                    self.dispatch(ControlInput::Click, id);
                }
            }
            KeyCode::Char('i') => {
                if self.selected_id().is_some() {
                    self.mode = Mode::EditArgs;
                }
            }
            _ => {}
        }
        false
    }
}
