use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use image::RgbaImage;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use tokio::sync::{mpsc, Mutex};

use crate::app::{
    AppCommand, AppState, EntryFocus, Message, MessageKind, OpenFocus, Preview, Tab, UiMode,
};
use crate::models::trade::{ChartSlot, OpenTrade};

const TICK_MS: u64 = 250;

pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: Arc<Mutex<AppState>>,
    cmd_tx: mpsc::Sender<AppCommand>,
}

impl Tui {
    pub fn new(state: Arc<Mutex<AppState>>, cmd_tx: mpsc::Sender<AppCommand>) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self { terminal, state, cmd_tx })
    }

    /// Loop del UI. Consume la TUI: al salir se cierra el canal de comandos
    /// y el motor termina de procesar lo pendiente.
    pub async fn run(mut self) -> Result<()> {
        let result = self.event_loop().await;
        self.cleanup()?;
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        let mut event_stream = EventStream::new();
        let tick = Duration::from_millis(TICK_MS);

        loop {
            {
                let state = self.state.lock().await;
                self.terminal.draw(|f| Self::render(f, &state))?;
            }

            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                maybe_event = event_stream.next() => {
                    match maybe_event {
                        Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                            if self.handle_key(key.code, key.modifiers).await {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("Event error: {}", e);
                        }
                        None => break,
                        _ => {}
                    }
                }
            }

            if self.state.lock().await.should_quit {
                break;
            }
        }
        Ok(())
    }

    async fn send(&self, cmd: AppCommand) {
        if self.cmd_tx.send(cmd).await.is_err() {
            tracing::warn!("Journal engine is gone, command dropped");
        }
        // el motor corre en la misma tarea: darle turno antes de la próxima tecla
        tokio::task::yield_now().await;
    }

    /// Traduce una tecla a comandos. Devuelve true si hay que salir.
    async fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        let (ui_mode, tab, entry_focus, open_focus) = {
            let s = self.state.lock().await;
            (s.ui_mode.clone(), s.tab, s.entry.focus, s.open_form.focus)
        };
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);

        match ui_mode {
            // ----------------------------------------------------------------
            UiMode::Message(_) => self.send(AppCommand::DismissMessage).await,

            // ----------------------------------------------------------------
            UiMode::Preview(_) => match code {
                KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.send(AppCommand::ConfirmScreenshot).await;
                }
                KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                    self.send(AppCommand::CancelScreenshot).await;
                }
                _ => {}
            },

            // ----------------------------------------------------------------
            UiMode::ConfirmClose(_) => match code {
                KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                    self.send(AppCommand::ConfirmCloseNow).await;
                }
                _ => self.send(AppCommand::CancelClose).await,
            },

            // ----------------------------------------------------------------
            UiMode::Normal => match code {
                KeyCode::Char('q') | KeyCode::Char('c') if ctrl => {
                    self.send(AppCommand::Quit).await;
                    return true;
                }
                KeyCode::Char('s') if ctrl => match tab {
                    Tab::NewTrade => self.send(AppCommand::AddEntry).await,
                    Tab::OpenTrades => self.send(AppCommand::UpdateOpenTrade).await,
                    Tab::Options => {}
                },
                KeyCode::Char('v') if ctrl => self.send(AppCommand::PasteScreenshot).await,
                KeyCode::Char('n') if ctrl => self.send(AppCommand::NextTab).await,
                KeyCode::F(1) => self.send(AppCommand::SelectTab(Tab::NewTrade)).await,
                KeyCode::F(2) => self.send(AppCommand::SelectTab(Tab::OpenTrades)).await,
                KeyCode::F(3) => self.send(AppCommand::SelectTab(Tab::Options)).await,
                KeyCode::Tab => self.send(AppCommand::FocusNext).await,
                KeyCode::BackTab => self.send(AppCommand::FocusPrev).await,
                KeyCode::Left => self.send(AppCommand::ChoicePrev).await,
                KeyCode::Right => self.send(AppCommand::ChoiceNext).await,
                KeyCode::Up | KeyCode::Down => {
                    let on_selector = match tab {
                        Tab::NewTrade => matches!(
                            entry_focus,
                            EntryFocus::Order | EntryFocus::Category | EntryFocus::MindState
                        ),
                        Tab::OpenTrades => open_focus == OpenFocus::Select,
                        Tab::Options => false,
                    };
                    if on_selector {
                        let cmd = if code == KeyCode::Up {
                            AppCommand::ChoicePrev
                        } else {
                            AppCommand::ChoiceNext
                        };
                        self.send(cmd).await;
                    }
                }
                KeyCode::Backspace => self.send(AppCommand::Backspace).await,
                KeyCode::Enter => {
                    if let Some(cmd) = Self::enter_command(tab, entry_focus, open_focus) {
                        self.send(cmd).await;
                    }
                }
                KeyCode::Char(c) if !ctrl => self.send(AppCommand::InputChar(c)).await,
                _ => {}
            },
        }
        false
    }

    /// Enter activa el botón con foco, agrega salto de línea en los cuadros
    /// de texto largos y en el resto pasa al campo siguiente
    fn enter_command(tab: Tab, entry_focus: EntryFocus, open_focus: OpenFocus) -> Option<AppCommand> {
        match tab {
            Tab::NewTrade => Some(match entry_focus {
                EntryFocus::AddEntry => AppCommand::AddEntry,
                EntryFocus::PasteScreenshot => AppCommand::PasteScreenshot,
                f if f.is_multiline() => AppCommand::InputChar('\n'),
                _ => AppCommand::FocusNext,
            }),
            Tab::OpenTrades => Some(match open_focus {
                OpenFocus::Update => AppCommand::UpdateOpenTrade,
                OpenFocus::PasteScreenshot => AppCommand::PasteScreenshot,
                OpenFocus::CloseTrade => AppCommand::OpenConfirmClose,
                OpenFocus::Result => AppCommand::InputChar('\n'),
                OpenFocus::Select => AppCommand::FocusNext,
            }),
            Tab::Options => None,
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    // -----------------------------------------------------------
    // Rendering principal
    // -----------------------------------------------------------

    fn render(f: &mut Frame, state: &AppState) {
        let size = f.area();

        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // header
                Constraint::Length(3), // pestañas
                Constraint::Min(12),   // contenido de la pestaña
                Constraint::Length(7), // log
                Constraint::Length(3), // footer
            ])
            .split(size);

        Self::render_header(f, state, main_chunks[0]);
        Self::render_tabs(f, state, main_chunks[1]);
        match state.tab {
            Tab::NewTrade => Self::render_new_trade(f, state, main_chunks[2]),
            Tab::OpenTrades => Self::render_open_trades(f, state, main_chunks[2]),
            Tab::Options => Self::render_options(f, state, main_chunks[2]),
        }
        Self::render_log(f, state, main_chunks[3]);
        Self::render_footer(f, state, main_chunks[4]);

        // Overlays (encima de todo)
        match &state.ui_mode {
            UiMode::Message(msg) => Self::render_message_panel(f, msg),
            UiMode::Preview(preview) => Self::render_preview_panel(f, preview),
            UiMode::ConfirmClose(trade) => Self::render_confirm_close_panel(f, trade),
            UiMode::Normal => {}
        }
    }

    // -----------------------------------------------------------
    // Header
    // -----------------------------------------------------------

    fn render_header(f: &mut Frame, state: &AppState, area: Rect) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M");
        let count_color = if state.open_trades.is_empty() { Color::DarkGray } else { Color::Cyan };

        let spans = vec![
            Span::styled(
                " TRADING JOURNAL ",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            ),
            Span::raw("│ "),
            Span::styled(
                state.open_trades_label(),
                Style::default().fg(count_color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(" │ "),
            Span::styled(now.to_string(), Style::default().fg(Color::DarkGray)),
            Span::raw(" "),
        ];

        f.render_widget(
            Paragraph::new(Line::from(spans))
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .border_style(Style::default().fg(Color::Yellow)),
                )
                .alignment(Alignment::Left),
            area,
        );
    }

    fn render_tabs(f: &mut Frame, state: &AppState, area: Rect) {
        let titles: Vec<Line> = Tab::ALL
            .iter()
            .enumerate()
            .map(|(i, t)| Line::from(format!(" F{} {} ", i + 1, t.title())))
            .collect();
        let selected = Tab::ALL.iter().position(|t| *t == state.tab).unwrap_or(0);

        f.render_widget(
            Tabs::new(titles)
                .select(selected)
                .style(Style::default().fg(Color::Gray))
                .highlight_style(
                    Style::default().fg(Color::Black).bg(Color::Yellow).add_modifier(Modifier::BOLD),
                )
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .border_style(Style::default().fg(Color::DarkGray)),
                ),
            area,
        );
    }

    // -----------------------------------------------------------
    // Helpers de formulario
    // -----------------------------------------------------------

    fn field_block(title: &str, focused: bool) -> Block<'static> {
        let color = if focused { Color::Yellow } else { Color::DarkGray };
        let mut style = Style::default().fg(color);
        if focused {
            style = style.add_modifier(Modifier::BOLD);
        }
        Block::default()
            .title(format!(" {} ", title))
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(style)
    }

    /// Campo de una línea (texto o selector)
    fn render_field(f: &mut Frame, area: Rect, title: &str, value: &str, focused: bool, selector: bool) {
        let text = match (focused, selector) {
            (true, true) => format!("◄ {} ►", value),
            (true, false) => format!("{}▌", value),
            (false, _) => value.to_string(),
        };
        let color = if focused { Color::Cyan } else { Color::White };
        f.render_widget(
            Paragraph::new(Span::styled(text, Style::default().fg(color)))
                .block(Self::field_block(title, focused)),
            area,
        );
    }

    /// Cuadro de texto multilínea; muestra siempre el final del texto
    fn render_text_box(f: &mut Frame, area: Rect, title: &str, value: &str, focused: bool) {
        let text = if focused { format!("{}▌", value) } else { value.to_string() };
        let width = area.width.saturating_sub(2).max(1) as usize;
        let visible = area.height.saturating_sub(2) as usize;
        let lines: usize = text
            .split('\n')
            .map(|l| (l.chars().count().max(1) + width - 1) / width)
            .sum();
        let offset = lines.saturating_sub(visible) as u16;

        f.render_widget(
            Paragraph::new(text)
                .style(Style::default().fg(if focused { Color::White } else { Color::Gray }))
                .wrap(Wrap { trim: false })
                .scroll((offset, 0))
                .block(Self::field_block(title, focused)),
            area,
        );
    }

    fn button<'a>(label: &'a str, focused: bool, color: Color) -> Span<'a> {
        let style = if focused {
            Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(color).add_modifier(Modifier::BOLD)
        };
        Span::styled(label, style)
    }

    fn chart_status(state: &AppState, slot: ChartSlot) -> Span<'static> {
        let label = match slot {
            ChartSlot::Before => "Chart Before",
            ChartSlot::After => "Chart After",
        };
        if state.pending_chart == Some(slot) {
            Span::styled(
                format!("  ✓ screenshot ready for {}", label),
                Style::default().fg(Color::Green),
            )
        } else {
            Span::styled("  no screenshot", Style::default().fg(Color::DarkGray))
        }
    }

    // -----------------------------------------------------------
    // Pestaña New Trade
    // -----------------------------------------------------------

    fn render_new_trade(f: &mut Frame, state: &AppState, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),      // símbolo / orden / riesgo
                Constraint::Length(3),      // categoría / mind state
                Constraint::Percentage(50), // entry analysis
                Constraint::Min(3),         // management
                Constraint::Length(1),      // botones
            ])
            .split(area);

        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40),
                Constraint::Percentage(30),
                Constraint::Percentage(30),
            ])
            .split(rows[0]);
        let mid = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let e = &state.entry;
        let pick = |list: &[String], idx: usize| list.get(idx).cloned().unwrap_or_default();

        Self::render_field(f, top[0], "Symbol", &e.symbol, e.focus == EntryFocus::Symbol, false);
        Self::render_field(f, top[1], "Order", e.order.label(), e.focus == EntryFocus::Order, true);
        Self::render_field(
            f,
            top[2],
            "Risk %",
            &e.risk,
            e.focus == EntryFocus::Risk,
            false,
        );
        Self::render_field(
            f,
            mid[0],
            "Category",
            &pick(&state.categories, e.category),
            e.focus == EntryFocus::Category,
            true,
        );
        Self::render_field(
            f,
            mid[1],
            "Mind State",
            &pick(&state.mind_states, e.mind_state),
            e.focus == EntryFocus::MindState,
            true,
        );
        Self::render_text_box(
            f,
            rows[2],
            "Entry Analysis",
            &e.entry_analysis,
            e.focus == EntryFocus::EntryAnalysis,
        );
        Self::render_text_box(
            f,
            rows[3],
            "Management Rules",
            &e.management,
            e.focus == EntryFocus::Management,
        );

        let buttons = Line::from(vec![
            Span::raw(" "),
            Self::button("[ Add Entry ]", e.focus == EntryFocus::AddEntry, Color::Green),
            Span::raw("  "),
            Self::button(
                "[ Paste Screenshot ]",
                e.focus == EntryFocus::PasteScreenshot,
                Color::Cyan,
            ),
            Self::chart_status(state, ChartSlot::Before),
        ]);
        f.render_widget(Paragraph::new(buttons), rows[4]);
    }

    // -----------------------------------------------------------
    // Pestaña Open Trades
    // -----------------------------------------------------------

    fn render_open_trades(f: &mut Frame, state: &AppState, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // selector
                Constraint::Min(5),    // result/comments
                Constraint::Length(1), // botones
            ])
            .split(area);

        let form = &state.open_form;
        let selected = match state.selected_trade() {
            Some(t) => format!(
                "{}   ({}/{} · row {})",
                t.label,
                form.selected + 1,
                state.open_trades.len(),
                t.row
            ),
            None => "None".to_string(),
        };
        Self::render_field(f, rows[0], "Select", &selected, form.focus == OpenFocus::Select, true);
        Self::render_text_box(
            f,
            rows[1],
            "Result/Comments",
            &form.result,
            form.focus == OpenFocus::Result,
        );

        let buttons = Line::from(vec![
            Span::raw(" "),
            Self::button("[ Update Open Trade ]", form.focus == OpenFocus::Update, Color::Green),
            Span::raw("  "),
            Self::button(
                "[ Paste Screenshot ]",
                form.focus == OpenFocus::PasteScreenshot,
                Color::Cyan,
            ),
            Span::raw("  "),
            Self::button("[ Close Trade ]", form.focus == OpenFocus::CloseTrade, Color::Red),
            Self::chart_status(state, ChartSlot::After),
        ]);
        f.render_widget(Paragraph::new(buttons), rows[2]);
    }

    // -----------------------------------------------------------
    // Pestaña Options (solo informativa)
    // -----------------------------------------------------------

    fn render_options(f: &mut Frame, state: &AppState, area: Rect) {
        let label = Style::default().fg(Color::DarkGray);
        let value = Style::default().fg(Color::White);
        let config = state
            .config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults, no config.toml found)".to_string());

        let lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                " Instructions:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
            Line::from(" 1. Take a screenshot (e.g., PrtSc or Snipping Tool)."),
            Line::from(" 2. Press 'Paste Screenshot' (Ctrl+V) in the New Trade or Open Trades tab."),
            Line::from(" 3. Preview and confirm to attach the screenshot."),
            Line::from(
                " 4. New Trade screenshots go to 'Chart Before'; Open Trades screenshots go to 'Chart After'.",
            ),
            Line::from(""),
            Line::from(vec![
                Span::styled(" Journal: ", label),
                Span::styled(state.journal_path.display().to_string(), value),
            ]),
            Line::from(vec![Span::styled(" Config:  ", label), Span::styled(config, value)]),
        ];

        f.render_widget(
            Paragraph::new(lines).wrap(Wrap { trim: false }).block(
                Block::default()
                    .title(" Options ")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(Color::Blue)),
            ),
            area,
        );
    }

    // -----------------------------------------------------------
    // Log
    // -----------------------------------------------------------

    fn render_log(f: &mut Frame, state: &AppState, area: Rect) {
        let log_lines: Vec<Line> = state
            .log
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|msg| {
                let color = if msg.contains("⚠") {
                    Color::Red
                } else if msg.contains("closed") {
                    Color::Yellow
                } else if msg.contains("logged") || msg.contains("updated") {
                    Color::Green
                } else {
                    Color::Gray
                };
                Line::from(Span::styled(format!(" {}", msg), Style::default().fg(color)))
            })
            .collect();

        f.render_widget(
            Paragraph::new(log_lines)
                .block(
                    Block::default()
                        .title(" Log ")
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .border_style(Style::default().fg(Color::DarkGray)),
                )
                .wrap(Wrap { trim: false }),
            area,
        );
    }

    // -----------------------------------------------------------
    // Footer de controles
    // -----------------------------------------------------------

    fn render_footer(f: &mut Frame, state: &AppState, area: Rect) {
        let key = |k: &'static str, color: Color| {
            Span::styled(k, Style::default().fg(color).add_modifier(Modifier::BOLD))
        };
        let controls = match &state.ui_mode {
            UiMode::Message(_) => vec![
                Span::raw(" "),
                key("[cualquier tecla]", Color::Yellow),
                Span::raw(" Cerrar"),
            ],
            UiMode::Preview(_) => vec![
                Span::raw(" "),
                key("[Enter / Y]", Color::Green),
                Span::raw(" Confirm  "),
                key("[Esc / N]", Color::Red),
                Span::raw(" Cancel"),
            ],
            UiMode::ConfirmClose(_) => vec![
                Span::raw(" "),
                key("[Enter / Y]", Color::Red),
                Span::raw(" Close trade  "),
                key("[Esc / N]", Color::Yellow),
                Span::raw(" Cancelar"),
            ],
            UiMode::Normal => {
                let mut spans = vec![
                    Span::raw(" "),
                    key("[F1-F3]", Color::Cyan),
                    Span::raw(" Tabs  "),
                    key("[Tab]", Color::Cyan),
                    Span::raw(" Campo  "),
                    key("[←→]", Color::Cyan),
                    Span::raw(" Opción  "),
                ];
                match state.tab {
                    Tab::NewTrade => {
                        spans.push(key("[Ctrl+S]", Color::Green));
                        spans.push(Span::raw(" Add Entry  "));
                        spans.push(key("[Ctrl+V]", Color::Cyan));
                        spans.push(Span::raw(" Screenshot  "));
                    }
                    Tab::OpenTrades => {
                        spans.push(key("[Ctrl+S]", Color::Green));
                        spans.push(Span::raw(" Update  "));
                        spans.push(key("[Ctrl+V]", Color::Cyan));
                        spans.push(Span::raw(" Screenshot  "));
                    }
                    Tab::Options => {}
                }
                spans.push(key("[Ctrl+Q]", Color::Red));
                spans.push(Span::raw(" Salir"));
                spans
            }
        };

        f.render_widget(
            Paragraph::new(Line::from(controls))
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded)
                        .border_style(Style::default().fg(Color::DarkGray)),
                )
                .alignment(Alignment::Left),
            area,
        );
    }

    // -----------------------------------------------------------
    // Overlays
    // -----------------------------------------------------------

    fn popup_area(size: Rect, w: u16, h: u16) -> Rect {
        let popup_w = w.min(size.width.saturating_sub(4));
        let popup_h = h.min(size.height.saturating_sub(4));
        let popup_x = (size.width.saturating_sub(popup_w)) / 2;
        let popup_y = (size.height.saturating_sub(popup_h)) / 2;
        Rect { x: popup_x, y: popup_y, width: popup_w, height: popup_h }
    }

    fn inner(area: Rect) -> Rect {
        Rect {
            x: area.x + 2,
            y: area.y + 1,
            width: area.width.saturating_sub(4),
            height: area.height.saturating_sub(2),
        }
    }

    fn render_message_panel(f: &mut Frame, msg: &Message) {
        let body_lines = msg.body.lines().count() as u16;
        let area = Self::popup_area(f.area(), 64, 6 + body_lines);
        let color = match msg.kind {
            MessageKind::Error => Color::Red,
            MessageKind::Info => Color::Green,
        };

        f.render_widget(Clear, area);
        f.render_widget(
            Block::default()
                .title(format!(" {} ", msg.title))
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
            area,
        );

        let mut lines = vec![Line::from("")];
        lines.extend(
            msg.body
                .lines()
                .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(Color::White)))),
        );
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  [cualquier tecla] OK",
            Style::default().fg(Color::DarkGray),
        )));

        f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), Self::inner(area));
    }

    fn render_preview_panel(f: &mut Frame, preview: &Preview) {
        let thumb_rows = (preview.thumbnail.height() + 1) / 2;
        let area = Self::popup_area(
            f.area(),
            (preview.thumbnail.width() as u16 + 6).max(50),
            thumb_rows as u16 + 8,
        );

        f.render_widget(Clear, area);
        f.render_widget(
            Block::default()
                .title(" Screenshot Preview ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            area,
        );

        let target = match preview.target {
            ChartSlot::Before => "Chart Before",
            ChartSlot::After => "Chart After",
        };
        let mut lines = vec![Line::from(vec![
            Span::styled(
                format!("{}x{} px", preview.width, preview.height),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  → {}", target), Style::default().fg(Color::DarkGray)),
        ])];
        lines.push(Line::from(""));
        lines.extend(Self::half_block_lines(&preview.thumbnail));
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("[Enter / Y] ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::styled("Confirm  ", Style::default().fg(Color::White)),
            Span::styled("[Esc / N] ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::styled("Cancel", Style::default().fg(Color::DarkGray)),
        ]));

        f.render_widget(Paragraph::new(lines), Self::inner(area));
    }

    /// Dibuja la miniatura con "▀": el color de frente es el píxel de arriba,
    /// el de fondo el de abajo (dos píxeles por celda)
    fn half_block_lines(img: &RgbaImage) -> Vec<Line<'static>> {
        let rgb = |x: u32, y: u32| {
            let p = img.get_pixel(x, y);
            Color::Rgb(p[0], p[1], p[2])
        };
        (0..img.height())
            .step_by(2)
            .map(|y| {
                let spans: Vec<Span> = (0..img.width())
                    .map(|x| {
                        let top = rgb(x, y);
                        let bottom = if y + 1 < img.height() { rgb(x, y + 1) } else { Color::Reset };
                        Span::styled("▀", Style::default().fg(top).bg(bottom))
                    })
                    .collect();
                Line::from(spans)
            })
            .collect()
    }

    fn render_confirm_close_panel(f: &mut Frame, trade: &OpenTrade) {
        let area = Self::popup_area(f.area(), 54, 9);

        f.render_widget(Clear, area);
        f.render_widget(
            Block::default()
                .title(" Close Trade ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            area,
        );

        let lines = vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("  Trade: ", Style::default().fg(Color::DarkGray)),
                Span::styled(
                    trade.label.clone(),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(Span::styled(
                format!("  Marks row {} as closed (\"X\").", trade.row),
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("  [Enter / Y] ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
                Span::styled("Close trade  ", Style::default().fg(Color::White)),
                Span::styled("[Esc / N] ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::styled("Cancelar", Style::default().fg(Color::DarkGray)),
            ]),
        ];

        f.render_widget(Paragraph::new(lines), Self::inner(area));
    }
}
