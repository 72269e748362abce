use crate::app::{App, Confirm};
use crate::form::{CreateForm, FIELD_LABELS};
use crate::theme::{
    action_style, notice_style, status_color, zebra_row_style, BORDER_STYLE, HEADER_STYLE,
    MUTED_STYLE, SELECTED_STYLE, SURFACE, TITLE_STYLE,
};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::Frame;
use simdash_core::Simulation;
use simdash_sync::engine::{SnapshotState, StreamState};
use simdash_sync::DetailView;

const COLUMN_WIDTHS: [Constraint; 7] = [
    Constraint::Length(6),
    Constraint::Min(14),
    Constraint::Length(12),
    Constraint::Length(9),
    Constraint::Length(8),
    Constraint::Length(10),
    Constraint::Length(6),
];

fn regions(area: Rect) -> [Rect; 4] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2], chunks[3]]
}

/// Area the simulation table occupies for a frame of `area`.
pub fn table_area(area: Rect) -> Rect {
    regions(area)[2]
}

pub fn render(frame: &mut Frame, app: &App) {
    let [stats, header, table, status] = regions(frame.size());
    render_stats(frame, app, stats);
    render_page_header(frame, app, header);
    render_table(frame, app, table);
    render_status_line(frame, app, status);

    if let Some(detail) = app.engine.detail() {
        render_detail_overlay(frame, app, &detail);
    }
    if let Some(confirm) = app.confirm() {
        render_confirm_overlay(frame, app, confirm);
    }
    if let Some(form) = app.form() {
        render_form_overlay(frame, form);
    }
    if app.help_open {
        render_help_overlay(frame);
    }
}

fn render_stats(frame: &mut Frame, app: &App, area: Rect) {
    let stats = app.engine.stats();
    let counter = |label: &'static str, value: usize, style: Style| {
        vec![
            Span::styled(format!("{value}"), style.add_modifier(Modifier::BOLD)),
            Span::styled(format!(" {label}   "), MUTED_STYLE),
        ]
    };
    let mut spans = Vec::new();
    spans.extend(counter("total", stats.total, Style::new()));
    spans.extend(counter(
        "finished",
        stats.finished,
        Style::new().fg(status_color(simdash_core::SimulationStatus::Finished)),
    ));
    spans.extend(counter(
        "running",
        stats.running,
        Style::new().fg(status_color(simdash_core::SimulationStatus::Running)),
    ));
    spans.extend(counter(
        "not started",
        stats.not_started,
        Style::new().fg(status_color(simdash_core::SimulationStatus::NotStarted)),
    ));
    spans.extend(counter(
        "error",
        stats.failed,
        Style::new().fg(status_color(simdash_core::SimulationStatus::Error)),
    ));
    spans.push(stream_badge(app.engine.stream_state()));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(BORDER_STYLE)
                .title(Span::styled("Simulations", TITLE_STYLE)),
        ),
        area,
    );
}

fn stream_badge(state: &StreamState) -> Span<'static> {
    match state {
        StreamState::Connecting => Span::styled("live: connecting", MUTED_STYLE),
        StreamState::Connected { since } => Span::styled(
            format!("live since {}", since.format("%H:%M:%S")),
            notice_style(simdash_sync::NoticeLevel::Info),
        ),
        StreamState::Disconnected { at, .. } => Span::styled(
            format!("live: offline since {}", at.format("%H:%M:%S")),
            notice_style(simdash_sync::NoticeLevel::Warning),
        ),
    }
}

fn render_page_header(frame: &mut Frame, app: &App, area: Rect) {
    let view = app.page_view();
    let mut spans = vec![
        Span::styled(format!("{} simulations in total", view.record_count), HEADER_STYLE),
        Span::raw("  "),
        Span::styled(
            format!("{} / {}", view.current_page, view.total_pages),
            MUTED_STYLE,
        ),
    ];
    match app.engine.snapshot_state() {
        SnapshotState::Loading => spans.push(Span::styled("  loading...", MUTED_STYLE)),
        SnapshotState::Failed { .. } => spans.push(Span::styled(
            "  snapshot unavailable (r to retry)",
            notice_style(simdash_sync::NoticeLevel::Error),
        )),
        SnapshotState::Loaded { .. } => {}
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn progress_cell(record: &Simulation) -> String {
    match record.progress() {
        Some(progress) => format!("{progress:>3}%"),
        None => "-".to_string(),
    }
}

fn render_table(frame: &mut Frame, app: &App, area: Rect) {
    let records = app.page_records();
    let rows: Vec<Row> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let mut status_style = Style::new().fg(status_color(record.status));
            if app.engine.is_busy(record.id) {
                status_style = status_style.add_modifier(Modifier::ITALIC);
            }
            Row::new(vec![
                Cell::from(record.id.to_string()),
                Cell::from(record.name.clone()),
                Cell::from(record.status.as_str()).style(status_style),
                Cell::from(progress_cell(record)),
                Cell::from(format!(
                    "{}/{}",
                    record.params.n_transmitter, record.params.n_receiver
                )),
                Cell::from(format!("{:.2}", record.plate_length())),
                Cell::from(record.params.attenuation.label()),
            ])
            .style(zebra_row_style(index))
        })
        .collect();

    let empty = rows.is_empty();
    let table = Table::new(rows, COLUMN_WIDTHS)
        .header(
            Row::new(vec!["ID", "Name", "Status", "Progress", "Tx/Rx", "Length", "Att."])
                .style(HEADER_STYLE),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(BORDER_STYLE),
        )
        .highlight_style(SELECTED_STYLE);

    let mut state = TableState::default();
    if !empty {
        state.select(Some(app.cursor()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_status_line(frame: &mut Frame, app: &App, area: Rect) {
    let line = match app.status_note() {
        Some((level, note)) => Line::from(Span::styled(note.to_string(), notice_style(level))),
        None => Line::from(Span::styled(
            "j/k move  h/l page  Enter details  n new  ? help  q quit",
            MUTED_STYLE,
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn field_line(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<20}"), MUTED_STYLE),
        Span::raw(value),
    ])
}

fn action_span(key: &'static str, label: &'static str, enabled: bool) -> Vec<Span<'static>> {
    vec![
        Span::styled(format!("[{key}] {label}"), action_style(enabled)),
        Span::raw("  "),
    ]
}

fn render_detail_overlay(frame: &mut Frame, app: &App, detail: &DetailView<'_>) {
    let area = centered_rect(70, 70, frame.size());
    let record = detail.record();
    let params = &record.params;
    let affordances = detail.affordances(app.engine.is_busy(record.id));

    let status_line = match detail.progress() {
        Some(progress) => format!("{} ({progress}%)", detail.status()),
        None => detail.status().to_string(),
    };
    let mut lines = vec![
        Line::from(vec![
            Span::styled(record.name.clone(), TITLE_STYLE),
            Span::raw("  "),
            Span::styled(
                status_line,
                Style::new()
                    .fg(status_color(detail.status()))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        field_line("transmitters", params.n_transmitter.to_string()),
        field_line("receivers", params.n_receiver.to_string()),
        field_line("emitters pitch", format!("{}", params.emitters_pitch)),
        field_line("receivers pitch", format!("{}", params.receivers_pitch)),
        field_line("sensor distance", format!("{}", params.sensor_distance)),
        field_line("sensor edge margin", format!("{}", params.sensor_edge_margin)),
        field_line("typical mesh size", format!("{}", params.typical_mesh_size)),
        field_line("plate thickness", format!("{}", params.plate_thickness)),
        field_line("plate length", format!("{:.3}", record.plate_length())),
        field_line("porosity", format!("{}", params.porosity)),
        field_line("attenuation", params.attenuation.label().to_string()),
        Line::from(""),
    ];

    let mut actions = Vec::new();
    actions.extend(action_span("x", "run", affordances.execute));
    actions.extend(action_span("s", "download", affordances.download));
    actions.extend(action_span("d", "delete", affordances.delete));
    if affordances.retry {
        actions.extend(action_span("-", "retry (unavailable)", false));
    }
    if affordances.re_execute {
        actions.extend(action_span("-", "run again (unavailable)", false));
    }
    lines.push(Line::from(actions));

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::new().bg(SURFACE))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(BORDER_STYLE)
                    .title(Span::styled(
                        format!("Simulation {}", record.id),
                        TITLE_STYLE,
                    )),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_confirm_overlay(frame: &mut Frame, app: &App, confirm: Confirm) {
    let area = centered_rect(50, 20, frame.size());
    let question = match confirm {
        Confirm::Delete(id) => format!("Delete simulation {id}?"),
        Confirm::DeleteAll => format!(
            "Delete all {} simulations? This cannot be undone.",
            app.engine.store().len()
        ),
    };
    let lines = vec![
        Line::from(Span::styled(question, TITLE_STYLE)),
        Line::from(""),
        Line::from(Span::styled("y confirm   n cancel", MUTED_STYLE)),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::new().bg(SURFACE))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(BORDER_STYLE)
                    .title(Span::styled("Confirm", TITLE_STYLE)),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_form_overlay(frame: &mut Frame, form: &CreateForm) {
    let area = centered_rect(60, 70, frame.size());
    let mut lines: Vec<Line> = FIELD_LABELS
        .iter()
        .enumerate()
        .map(|(index, label)| {
            let focused = index == form.focus();
            let value_style = if focused { SELECTED_STYLE } else { Style::new() };
            let cursor = if focused { "_" } else { "" };
            Line::from(vec![
                Span::styled(format!("{label:<22}"), MUTED_STYLE),
                Span::styled(format!("{}{cursor}", form.value(index)), value_style),
            ])
        })
        .collect();
    lines.push(Line::from(""));
    if let Some(error) = form.error() {
        lines.push(Line::from(Span::styled(
            error.to_string(),
            notice_style(simdash_sync::NoticeLevel::Error),
        )));
    }
    lines.push(Line::from(Span::styled(
        "Tab/Shift-Tab move  Enter create  Esc cancel",
        MUTED_STYLE,
    )));

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::new().bg(SURFACE))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(BORDER_STYLE)
                    .title(Span::styled("New simulation", TITLE_STYLE)),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect(60, 60, frame.size());
    let section = |title: &'static str| Line::from(Span::styled(title, HEADER_STYLE));
    let lines = vec![
        Line::from(Span::styled("Controls", TITLE_STYLE)),
        section("Navigation"),
        Line::from("  j/k      move row"),
        Line::from("  h/l      previous/next page"),
        Line::from("  Enter    open details"),
        Line::from("  Esc      close details or help"),
        Line::from(""),
        section("Actions"),
        Line::from("  n        new simulation (Tab next field, Enter submit)"),
        Line::from("  x        run selected simulation"),
        Line::from("  s        download result file"),
        Line::from("  d        delete selected simulation"),
        Line::from("  D        delete all simulations"),
        Line::from("  r        reload from server"),
        Line::from(""),
        section("Session"),
        Line::from("  ?        toggle this help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::new().bg(SURFACE))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(BORDER_STYLE)
                    .title(Span::styled("Help", TITLE_STYLE)),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}
