use chrono::Local;
use color_eyre::Result;
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use personal_diary::backend::{Backend, DocumentId};
use personal_diary::editor::EntryEditor;
use personal_diary::session::{AuthMode, Credentials, SessionState};
use personal_diary::{DiaryEntry, DiaryState, Identity, Notice};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::{
    io::{stdout, Stdout},
    time::{Duration, Instant},
};
use unicode_width::UnicodeWidthChar;

pub const CURSOR_BLINK: Duration = Duration::from_millis(500);

pub enum Action {
    Quit,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AuthField {
    Email,
    Password,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Content,
    Tags,
    Entries,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Content => Pane::Tags,
            Pane::Tags => Pane::Entries,
            Pane::Entries => Pane::Content,
        }
    }

    fn prev(self) -> Self {
        match self {
            Pane::Content => Pane::Entries,
            Pane::Tags => Pane::Content,
            Pane::Entries => Pane::Tags,
        }
    }
}

pub struct UI {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    cursor_visible: bool,
    last_cursor_update: Instant,
    auth_field: AuthField,
    pane: Pane,
    selected: usize,
    alert: Option<String>,
}

impl UI {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout());
        let terminal = Terminal::new(backend)?;

        Ok(UI {
            terminal,
            cursor_visible: true,
            last_cursor_update: Instant::now(),
            auth_field: AuthField::Email,
            pane: Pane::Content,
            selected: 0,
            alert: None,
        })
    }

    pub fn display<B: Backend>(&mut self, state: &DiaryState<B>) -> Result<()> {
        let now = Instant::now();
        if now.duration_since(self.last_cursor_update) >= CURSOR_BLINK {
            self.cursor_visible = !self.cursor_visible;
            self.last_cursor_update = now;
        }
        self.selected = self
            .selected
            .min(state.get_entries().len().saturating_sub(1));

        let cursor = self.cursor_visible && self.alert.is_none();
        let auth_field = self.auth_field;
        let pane = self.pane;
        let selected = self.selected;
        let alert = self.alert.as_deref();

        self.terminal.draw(|f| {
            match state.session().state() {
                SessionState::Anonymous => {
                    draw_sign_in(f, state.session().credentials(), auth_field, cursor)
                }
                SessionState::Authenticated(identity) => draw_diary(
                    f,
                    identity,
                    state.editor(),
                    state.get_entries(),
                    pane,
                    selected,
                    cursor,
                ),
            }
            if let Some(message) = alert {
                draw_alert(f, message);
            }
        })?;

        Ok(())
    }

    /// Handles one key press. Failed operations become a blocking alert that
    /// the next key press dismisses.
    pub async fn handle_key<B: Backend>(
        &mut self,
        state: &mut DiaryState<B>,
        key: KeyEvent,
    ) -> Option<Action> {
        if self.alert.take().is_some() {
            return None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            return Some(Action::Quit);
        }

        let result = if state.identity().is_some() {
            self.handle_diary_key(state, key, ctrl).await
        } else {
            self.handle_sign_in_key(state, key, ctrl).await
        };
        match result {
            Ok(action) => action,
            Err(notice) => {
                self.alert = Some(notice.to_string());
                None
            }
        }
    }

    async fn handle_sign_in_key<B: Backend>(
        &mut self,
        state: &mut DiaryState<B>,
        key: KeyEvent,
        ctrl: bool,
    ) -> Result<Option<Action>, Notice> {
        match key.code {
            KeyCode::Esc => return Ok(Some(Action::Quit)),
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.auth_field = match self.auth_field {
                    AuthField::Email => AuthField::Password,
                    AuthField::Password => AuthField::Email,
                };
            }
            KeyCode::Char('t') if ctrl => state.session_mut().toggle_mode(),
            KeyCode::Char(c) if !ctrl => self.auth_input(state).push(c),
            KeyCode::Backspace => {
                self.auth_input(state).pop();
            }
            KeyCode::Enter => {
                state.submit_credentials().await?;
                self.auth_field = AuthField::Email;
                self.pane = Pane::Content;
                self.selected = 0;
            }
            _ => {}
        }
        Ok(None)
    }

    async fn handle_diary_key<B: Backend>(
        &mut self,
        state: &mut DiaryState<B>,
        key: KeyEvent,
        ctrl: bool,
    ) -> Result<Option<Action>, Notice> {
        match key.code {
            KeyCode::Char('o') if ctrl => state.sign_out().await?,
            KeyCode::Char('s') if ctrl => self.submit(state).await?,
            KeyCode::Tab => self.pane = self.pane.next(),
            KeyCode::BackTab => self.pane = self.pane.prev(),
            KeyCode::Esc if state.editor().is_editing() => {
                state.cancel_edit();
                self.pane = Pane::Entries;
            }
            _ => match self.pane {
                Pane::Content | Pane::Tags => self.edit_field(state, key, ctrl).await?,
                Pane::Entries => self.handle_list_key(state, key).await?,
            },
        }
        Ok(None)
    }

    async fn edit_field<B: Backend>(
        &mut self,
        state: &mut DiaryState<B>,
        key: KeyEvent,
        ctrl: bool,
    ) -> Result<(), Notice> {
        match key.code {
            KeyCode::Enter if self.pane == Pane::Tags => self.submit(state).await?,
            KeyCode::Enter => self.form_input(state).push('\n'),
            KeyCode::Char(c) if !ctrl => self.form_input(state).push(c),
            KeyCode::Backspace => {
                self.form_input(state).pop();
            }
            _ => {}
        }
        Ok(())
    }

    fn auth_input<'a, B: Backend>(&self, state: &'a mut DiaryState<B>) -> &'a mut String {
        let credentials = state.session_mut().credentials_mut();
        match self.auth_field {
            AuthField::Email => &mut credentials.email,
            AuthField::Password => &mut credentials.password,
        }
    }

    fn form_input<'a, B: Backend>(&self, state: &'a mut DiaryState<B>) -> &'a mut String {
        let form = state.editor_mut().active_form_mut();
        match self.pane {
            Pane::Tags => &mut form.tags,
            _ => &mut form.content,
        }
    }

    async fn handle_list_key<B: Backend>(
        &mut self,
        state: &mut DiaryState<B>,
        key: KeyEvent,
    ) -> Result<(), Notice> {
        let count = state.get_entries().len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < count {
                    self.selected += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char('e') => {
                if let Some(id) = selected_id(state, self.selected) {
                    if state.begin_edit(&id) {
                        self.pane = Pane::Content;
                    }
                }
            }
            KeyCode::Delete | KeyCode::Char('d') => {
                if let Some(id) = selected_id(state, self.selected) {
                    state.delete_entry(&id).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn submit<B: Backend>(&mut self, state: &mut DiaryState<B>) -> Result<(), Notice> {
        if state.editor().active_form().content.is_empty() {
            self.alert = Some("Please write something before saving.".to_string());
            return Ok(());
        }
        if state.editor().is_editing() {
            state.update_entry().await?;
            self.pane = Pane::Entries;
        } else {
            state.add_entry().await?;
            self.pane = Pane::Content;
            self.selected = 0;
        }
        Ok(())
    }
}

impl Drop for UI {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }
}

fn selected_id<B: Backend>(state: &DiaryState<B>, index: usize) -> Option<DocumentId> {
    state.get_entries().get(index).map(|e| e.id.clone())
}

fn title(f: &mut Frame, area: Rect, lines: Vec<Line>) {
    let title = Paragraph::new(lines)
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, area);
}

fn instructions(f: &mut Frame, area: Rect, text: &str) {
    let paragraph = Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn input(f: &mut Frame, area: Rect, label: &str, text: String, focused: bool, cursor: bool) {
    let text = if focused && cursor {
        format!("{text}|")
    } else {
        text
    };
    let border = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(label.to_string()),
        );
    f.render_widget(paragraph, area);
}

fn draw_sign_in(f: &mut Frame, credentials: &Credentials, field: AuthField, cursor: bool) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(f.area());

    let (heading, toggle) = match credentials.mode {
        AuthMode::SignIn => ("Sign In", "Need an account? Ctrl+T to sign up"),
        AuthMode::SignUp => ("Sign Up", "Already have an account? Ctrl+T to sign in"),
    };
    title(
        f,
        chunks[0],
        vec![Line::from("Simple daily diary"), Line::from(heading)],
    );

    input(
        f,
        chunks[1],
        "Email",
        credentials.email.clone(),
        field == AuthField::Email,
        cursor,
    );
    input(
        f,
        chunks[2],
        "Password",
        "*".repeat(credentials.password.chars().count()),
        field == AuthField::Password,
        cursor,
    );

    let toggle = Paragraph::new(toggle)
        .style(Style::default().add_modifier(Modifier::UNDERLINED))
        .alignment(Alignment::Center);
    f.render_widget(toggle, chunks[3]);

    instructions(
        f,
        chunks[5],
        "Tab: Switch field, Enter: Submit, Ctrl+T: Sign in/up, Esc: Quit",
    );
}

fn draw_diary(
    f: &mut Frame,
    identity: &Identity,
    editor: &EntryEditor,
    entries: &[DiaryEntry],
    pane: Pane,
    selected: usize,
    cursor: bool,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Length(7),
                Constraint::Length(3),
                Constraint::Min(6),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(f.area());

    title(
        f,
        chunks[0],
        vec![
            Line::from("Simple daily diary"),
            Line::from(Span::styled(
                format!("Logged in as {}", identity.email),
                Style::default().fg(Color::Gray),
            )),
        ],
    );

    let (content_label, tags_label) = if editor.is_editing() {
        ("Edit your entry", "Edit tags (e.g., website, printing, webflow)")
    } else {
        (
            "Write your entry (2-5 sentences). Nothing is also legit :)",
            "Optional tags (e.g., website, printing, webflow)",
        )
    };
    let form = editor.active_form();
    input(
        f,
        chunks[1],
        content_label,
        form.content.clone(),
        pane == Pane::Content,
        cursor,
    );
    input(
        f,
        chunks[2],
        tags_label,
        form.tags.clone(),
        pane == Pane::Tags,
        cursor,
    );

    let border = if pane == Pane::Entries {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title("Entries");

    if entries.is_empty() {
        let empty = Paragraph::new("No entries yet.")
            .style(Style::default().fg(Color::Gray))
            .alignment(Alignment::Center)
            .block(block);
        f.render_widget(empty, chunks[3]);
    } else {
        let width = chunks[3].width.saturating_sub(4) as usize;
        let items: Vec<ListItem> = entries
            .iter()
            .map(|e| {
                let tags = if e.tags.is_empty() {
                    "None".to_string()
                } else {
                    e.joined_tags()
                };
                ListItem::new(vec![
                    Line::from(Span::raw(truncate_to_width(
                        e.content.lines().next().unwrap_or(""),
                        width,
                    ))),
                    Line::from(Span::styled(
                        format!(
                            "Tags: {}  Posted: {}",
                            tags,
                            e.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                        ),
                        Style::default().fg(Color::Gray),
                    )),
                ])
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        let selection = (pane == Pane::Entries).then_some(selected);
        f.render_stateful_widget(
            list,
            chunks[3],
            &mut ListState::default().with_selected(selection),
        );
    }

    let controls = match pane {
        Pane::Entries => "Up/Down: Navigate, e: Edit, d: Delete, Tab: Next pane, Ctrl+O: Sign out",
        _ if editor.is_editing() => {
            "Ctrl+S: Update entry, Esc: Cancel, Tab: Next pane, Ctrl+O: Sign out"
        }
        _ => "Ctrl+S: Add entry, Tab: Next pane, Ctrl+O: Sign out, Ctrl+Q: Quit",
    };
    instructions(f, chunks[4], controls);
}

fn draw_alert(f: &mut Frame, message: &str) {
    let area = centered(f.area(), 60, 7);
    f.render_widget(Clear, area);

    let text = vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key",
            Style::default().fg(Color::Yellow),
        )),
    ];
    let alert = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title("Alert"),
        );
    f.render_widget(alert, area);
}

fn centered(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Cuts `text` to at most `width` terminal columns, marking the cut with '…'.
fn truncate_to_width(text: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width.saturating_sub(1) {
            let rest: usize = text[out.len()..]
                .chars()
                .map(|c| c.width().unwrap_or(0))
                .sum();
            if used + rest <= width {
                out.push_str(&text[out.len()..]);
            } else {
                out.push('…');
            }
            return out;
        }
        used += w;
        out.push(c);
    }
    out
}
