use crate::form::CreateForm;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use simdash_core::{NewSimulation, Simulation, SimulationId};
use simdash_sync::engine::SyncEvent;
use simdash_sync::{NoticeLevel, PageView, Pagination, PendingOp, Reconciler, ViewportProbe};

/// Table rows lost to borders and the header line.
pub const TABLE_CHROME_ROWS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    Delete(SimulationId),
    DeleteAll,
}

/// Work the main loop hands to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Reload,
    Create(NewSimulation),
    Execute(Simulation),
    Delete(SimulationId),
    DeleteAll,
    Download(SimulationId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Continue,
    Quit,
    Request(Request),
}

pub struct App {
    pub engine: Reconciler,
    pagination: Pagination,
    probe: ViewportProbe,
    cursor: usize,
    pub help_open: bool,
    confirm: Option<Confirm>,
    form: Option<CreateForm>,
    status_note: Option<(NoticeLevel, String)>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            engine: Reconciler::new(),
            pagination: Pagination::default(),
            probe: ViewportProbe::new(1, TABLE_CHROME_ROWS),
            cursor: 0,
            help_open: false,
            confirm: None,
            form: None,
            status_note: None,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn confirm(&self) -> Option<Confirm> {
        self.confirm
    }

    pub fn form(&self) -> Option<&CreateForm> {
        self.form.as_ref()
    }

    pub fn status_note(&self) -> Option<(NoticeLevel, &str)> {
        self.status_note
            .as_ref()
            .map(|(level, note)| (*level, note.as_str()))
    }

    pub fn page_view(&self) -> PageView {
        self.pagination.view(self.engine.store().len())
    }

    pub fn page_records(&self) -> Vec<&Simulation> {
        let range = self.page_view().range();
        self.engine
            .store()
            .window(range.start, range.len())
            .collect()
    }

    /// Feeds the measured table height. Page size only changes when the row
    /// capacity does.
    pub fn observe_viewport(&mut self, table_height: u16) {
        if let Some(rows) = self.probe.observe(u32::from(table_height)) {
            self.pagination.recompute(rows, self.engine.store().len());
        }
    }

    /// Per-frame clamp of page and cursor against the current store size.
    pub fn layout(&mut self) -> PageView {
        let view = self.pagination.layout(self.engine.store().len());
        let rows = view.range().len();
        self.cursor = self.cursor.min(rows.saturating_sub(1));
        view
    }

    pub fn start(&mut self) -> Request {
        if let Err(refusal) = self.engine.begin(PendingOp::Snapshot) {
            self.note(NoticeLevel::Warning, refusal.to_string());
        }
        Request::Reload
    }

    pub fn apply_sync_event(&mut self, event: SyncEvent) {
        self.engine.apply(event);
        if let Some(latest) = self.engine.drain_notices().pop() {
            self.status_note = Some((latest.level, latest.message));
        }
        self.layout();
    }

    fn note(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.status_note = Some((level, message.into()));
    }

    fn cursor_id(&self) -> Option<SimulationId> {
        self.page_records().get(self.cursor).map(|record| record.id)
    }

    /// The record actions apply to: the open detail, else the cursor row.
    pub fn focused_id(&self) -> Option<SimulationId> {
        self.engine.selection().selected().or_else(|| self.cursor_id())
    }

    fn begin(&mut self, op: PendingOp, request: Request) -> KeyOutcome {
        match self.engine.begin(op) {
            Ok(()) => KeyOutcome::Request(request),
            Err(refusal) => {
                self.note(NoticeLevel::Warning, refusal.to_string());
                KeyOutcome::Continue
            }
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let rows = self.page_view().range().len();
        if rows == 0 {
            self.cursor = 0;
            return;
        }
        let next = self.cursor as isize + delta;
        self.cursor = next.clamp(0, rows as isize - 1) as usize;
    }

    fn change_page(&mut self, forward: bool) {
        let count = self.engine.store().len();
        if forward {
            self.pagination.next_page(count);
        } else {
            self.pagination.prev_page(count);
        }
        self.cursor = 0;
    }

    pub fn handle_input(&mut self, event: Event) -> KeyOutcome {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            _ => KeyOutcome::Continue,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if let Some(confirm) = self.confirm {
            return self.handle_confirm(confirm, key.code);
        }
        if self.form.is_some() {
            return self.handle_form(key.code);
        }
        if key.code == KeyCode::Char('?') {
            self.help_open = !self.help_open;
            return KeyOutcome::Continue;
        }
        if self.help_open {
            if key.code == KeyCode::Esc {
                self.help_open = false;
            }
            return KeyOutcome::Continue;
        }

        match key.code {
            KeyCode::Char('q') => KeyOutcome::Quit,
            KeyCode::Esc => {
                self.engine.close();
                KeyOutcome::Continue
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_cursor(1);
                KeyOutcome::Continue
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_cursor(-1);
                KeyOutcome::Continue
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.change_page(true);
                KeyOutcome::Continue
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.change_page(false);
                KeyOutcome::Continue
            }
            KeyCode::Enter => {
                if let Some(id) = self.cursor_id() {
                    if let Err(stale) = self.engine.open(id) {
                        self.note(NoticeLevel::Warning, stale.to_string());
                    }
                }
                KeyOutcome::Continue
            }
            KeyCode::Char('n') => {
                self.form = Some(CreateForm::new());
                KeyOutcome::Continue
            }
            KeyCode::Char('r') => {
                self.begin(PendingOp::Snapshot, Request::Reload)
            }
            KeyCode::Char('x') => {
                let Some(record) = self
                    .focused_id()
                    .and_then(|id| self.engine.store().get(id))
                    .cloned()
                else {
                    return KeyOutcome::Continue;
                };
                self.begin(PendingOp::Execute(record.id), Request::Execute(record))
            }
            KeyCode::Char('s') => match self.focused_id() {
                Some(id) => self.begin(PendingOp::Download(id), Request::Download(id)),
                None => KeyOutcome::Continue,
            },
            KeyCode::Char('d') => {
                if let Some(id) = self.focused_id() {
                    if self.engine.is_busy(id) {
                        self.note(NoticeLevel::Warning, format!("simulation {id} is busy"));
                    } else {
                        self.confirm = Some(Confirm::Delete(id));
                    }
                }
                KeyOutcome::Continue
            }
            KeyCode::Char('D') => {
                if self.engine.store().is_empty() {
                    self.note(NoticeLevel::Info, "nothing to delete");
                } else {
                    self.confirm = Some(Confirm::DeleteAll);
                }
                KeyOutcome::Continue
            }
            _ => KeyOutcome::Continue,
        }
    }

    fn handle_form(&mut self, code: KeyCode) -> KeyOutcome {
        let Some(form) = self.form.as_mut() else {
            return KeyOutcome::Continue;
        };
        match code {
            KeyCode::Esc => self.form = None,
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.prev_field(),
            KeyCode::Backspace => form.pop(),
            KeyCode::Char(ch) => form.push(ch),
            KeyCode::Enter => match form.submit() {
                Ok(new_sim) => match self.engine.begin(PendingOp::Create) {
                    Ok(()) => {
                        self.form = None;
                        return KeyOutcome::Request(Request::Create(new_sim));
                    }
                    Err(refusal) => self.note(NoticeLevel::Warning, refusal.to_string()),
                },
                Err(err) => self.note(NoticeLevel::Warning, format!("not sent: {err}")),
            },
            _ => {}
        }
        KeyOutcome::Continue
    }

    fn handle_confirm(&mut self, confirm: Confirm, code: KeyCode) -> KeyOutcome {
        match code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                self.confirm = None;
                match confirm {
                    Confirm::Delete(id) => self.begin(PendingOp::Delete(id), Request::Delete(id)),
                    Confirm::DeleteAll => self.begin(PendingOp::DeleteAll, Request::DeleteAll),
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirm = None;
                KeyOutcome::Continue
            }
            _ => KeyOutcome::Continue,
        }
    }
}
