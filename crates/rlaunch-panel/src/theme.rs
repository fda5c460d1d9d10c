use ratatui::style::{Color, Modifier, Style};
use rlaunch_core::Accent;

pub const RUNNING: Color = Color::Rgb(0x00, 0xCC, 0x00);
pub const IDLE: Color = Color::Rgb(0x57, 0x63, 0x57);
pub const STOPPED: Color = Color::Rgb(0xC3, 0x36, 0x27);
pub const PRESSED_SHADOW: Color = Color::Rgb(0x33, 0x33, 0x33);

pub const BORDER: Color = Color::Rgb(71, 85, 105);
pub const TEXT: Color = Color::Rgb(226, 232, 240);
pub const MUTED: Color = Color::Rgb(148, 163, 184);
pub const FOCUS: Color = Color::Rgb(56, 189, 248);
pub const WARN: Color = Color::Rgb(245, 158, 11);

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(191, 219, 254))
    .add_modifier(Modifier::BOLD);

pub fn accent_color(accent: Accent) -> Color {
    match accent {
        Accent::SuccessGreen => RUNNING,
        Accent::NeutralGray => IDLE,
        Accent::AlertRed => STOPPED,
    }
}

pub fn border_style(pressed: bool, selected: bool) -> Style {
    if pressed {
        Style::new().fg(PRESSED_SHADOW).add_modifier(Modifier::BOLD)
    } else if selected {
        Style::new().fg(FOCUS).add_modifier(Modifier::BOLD)
    } else {
        Style::new().fg(BORDER)
    }
}
