use crate::app::{App, Mode, SurfaceControl};
use crate::theme;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};

/// Screen row where the control canvas starts. Mouse rows are shifted by
/// this before hit testing.
pub const CANVAS_TOP: u16 = 1;
const FOOTER_HEIGHT: u16 = 2;

pub fn render(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(CANVAS_TOP),
            Constraint::Min(0),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(size);
    frame.render_widget(render_header(app), layout[0]);
    render_canvas(frame, app, layout[1]);
    frame.render_widget(render_footer(app), layout[2]);
}

fn render_header(app: &App) -> Paragraph<'static> {
    let link = if app.connected {
        Span::styled("connected", Style::new().fg(theme::RUNNING))
    } else {
        Span::styled("offline", Style::new().fg(theme::WARN))
    };
    Paragraph::new(Line::from(vec![
        Span::styled("rlaunch", theme::HEADER_STYLE),
        Span::styled(
            format!("  session {}  ", app.config.session_id),
            Style::new().fg(theme::MUTED),
        ),
        link,
    ]))
}

fn render_canvas(frame: &mut Frame, app: &App, area: Rect) {
    if app.surface.controls.is_empty() {
        let waiting = if app.connected {
            "waiting for roster"
        } else {
            "waiting for agent"
        };
        frame.render_widget(
            Paragraph::new(Span::styled(waiting, Style::new().fg(theme::MUTED))),
            area,
        );
        return;
    }

    for (index, control) in app.surface.controls.iter().enumerate() {
        let target = Rect::new(
            area.x.saturating_add(control.rect.x),
            area.y.saturating_add(control.rect.y),
            control.rect.width,
            control.rect.height,
        )
        .intersection(area);
        if target.width < 4 || target.height < 3 {
            continue;
        }
        let selected = index == app.selected;
        let editing = selected && app.mode == Mode::EditArgs;
        frame.render_widget(render_control(app, control, selected, editing), target);
    }
}

fn render_control<'a>(
    app: &'a App,
    control: &'a SurfaceControl,
    selected: bool,
    editing: bool,
) -> Paragraph<'a> {
    let border_type = if control.pressed {
        BorderType::Thick
    } else {
        BorderType::Rounded
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(theme::border_style(control.pressed, selected))
        .title(Span::styled(
            control.name.as_str(),
            Style::new().fg(theme::TEXT).add_modifier(Modifier::BOLD),
        ));

    let appearance = control.appearance;
    let mut args = app.args.get(control.id).to_string();
    if editing {
        args.push('_');
    }
    let lines = vec![
        Line::from(Span::styled(
            appearance.label,
            Style::new()
                .fg(theme::accent_color(appearance.accent))
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("args ", Style::new().fg(theme::MUTED)),
            Span::styled(args, Style::new().fg(theme::TEXT)),
        ]),
    ];
    Paragraph::new(lines).block(block)
}

fn render_footer(app: &App) -> Paragraph<'static> {
    let info = if let Some(tooltip) = &app.footer.tooltip {
        Span::styled(tooltip.clone(), Style::new().fg(theme::TEXT))
    } else if let Some(note) = &app.status_note {
        Span::styled(note.clone(), Style::new().fg(theme::WARN))
    } else {
        Span::styled(
            app.latest_activity().unwrap_or_default(),
            Style::new().fg(theme::MUTED),
        )
    };
    let help = match app.mode {
        Mode::Normal => "click/enter start or stop   i edit args   hjkl move   q quit",
        Mode::EditArgs => "editing args   enter/esc done",
    };
    Paragraph::new(vec![
        Line::from(info),
        Line::from(Span::styled(help, Style::new().fg(theme::MUTED))),
    ])
}
