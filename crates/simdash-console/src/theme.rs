use ratatui::style::{Color, Modifier, Style};
use simdash_core::SimulationStatus;
use simdash_sync::NoticeLevel;

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(131, 165, 152))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);
pub const TITLE_STYLE: Style = Style::new()
    .fg(Color::Rgb(250, 189, 47))
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(146, 131, 116));
pub const BORDER_STYLE: Style = Style::new().fg(Color::Rgb(80, 73, 69));
pub const SURFACE: Color = Color::Rgb(24, 27, 34);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(18, 20, 26)
    } else {
        SURFACE
    };
    Style::new().bg(bg)
}

pub fn status_color(status: SimulationStatus) -> Color {
    match status {
        SimulationStatus::NotStarted => Color::Rgb(168, 153, 132),
        SimulationStatus::Running => Color::Rgb(131, 165, 152),
        SimulationStatus::Finished => Color::Rgb(184, 187, 38),
        SimulationStatus::Error => Color::Rgb(251, 73, 52),
    }
}

pub fn notice_style(level: NoticeLevel) -> Style {
    let color = match level {
        NoticeLevel::Info => Color::Rgb(142, 192, 124),
        NoticeLevel::Warning => Color::Rgb(250, 189, 47),
        NoticeLevel::Error => Color::Rgb(251, 73, 52),
    };
    Style::new().fg(color)
}

/// Style for an action hint; disabled actions stay visible but dimmed.
pub fn action_style(enabled: bool) -> Style {
    if enabled {
        Style::new().fg(Color::Rgb(235, 219, 178)).add_modifier(Modifier::BOLD)
    } else {
        MUTED_STYLE.add_modifier(Modifier::CROSSED_OUT)
    }
}
