use std::collections::VecDeque;
use std::path::PathBuf;

use image::RgbaImage;

use crate::config::JournalConfig;
use crate::journal::JournalError;
use crate::models::trade::{ChartSlot, OpenTrade, OrderSide, TradeEntry};

/// Pestañas de la interfaz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    NewTrade,
    OpenTrades,
    Options,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::NewTrade, Tab::OpenTrades, Tab::Options];

    pub fn title(&self) -> &'static str {
        match self {
            Tab::NewTrade => "New Trade",
            Tab::OpenTrades => "Open Trades",
            Tab::Options => "Options",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Tab::NewTrade => Tab::OpenTrades,
            Tab::OpenTrades => Tab::Options,
            Tab::Options => Tab::NewTrade,
        }
    }

    /// Columna donde termina una captura pegada desde esta pestaña
    pub fn chart_slot(&self) -> Option<ChartSlot> {
        match self {
            Tab::NewTrade => Some(ChartSlot::Before),
            Tab::OpenTrades => Some(ChartSlot::After),
            Tab::Options => None,
        }
    }
}

/// Foco dentro de la pestaña New Trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFocus {
    Symbol,
    Order,
    Risk,
    Category,
    MindState,
    EntryAnalysis,
    Management,
    AddEntry,
    PasteScreenshot,
}

impl EntryFocus {
    const ORDER: [EntryFocus; 9] = [
        EntryFocus::Symbol,
        EntryFocus::Order,
        EntryFocus::Risk,
        EntryFocus::Category,
        EntryFocus::MindState,
        EntryFocus::EntryAnalysis,
        EntryFocus::Management,
        EntryFocus::AddEntry,
        EntryFocus::PasteScreenshot,
    ];

    pub fn is_multiline(&self) -> bool {
        matches!(self, EntryFocus::EntryAnalysis | EntryFocus::Management)
    }
}

/// Foco dentro de la pestaña Open Trades
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFocus {
    Select,
    Result,
    Update,
    PasteScreenshot,
    CloseTrade,
}

impl OpenFocus {
    const ORDER: [OpenFocus; 5] = [
        OpenFocus::Select,
        OpenFocus::Result,
        OpenFocus::Update,
        OpenFocus::PasteScreenshot,
        OpenFocus::CloseTrade,
    ];
}

fn cycle<T: Copy + PartialEq>(items: &[T], current: T, forward: bool) -> T {
    let len = items.len();
    let idx = items.iter().position(|i| *i == current).unwrap_or(0);
    let next = if forward { (idx + 1) % len } else { (idx + len - 1) % len };
    items[next]
}

/// Campos del formulario de nueva entrada
#[derive(Debug, Clone)]
pub struct EntryForm {
    pub symbol: String,
    pub order: OrderSide,
    pub risk: String,
    pub category: usize,
    pub mind_state: usize,
    pub entry_analysis: String,
    pub management: String,
    pub focus: EntryFocus,
}

/// Estado de la pestaña Open Trades
#[derive(Debug, Clone)]
pub struct OpenTradeForm {
    pub selected: usize,
    pub result: String,
    pub focus: OpenFocus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    Info,
    Error,
}

/// Diálogo modal con un mensaje
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub title: String,
    pub body: String,
}

/// Vista previa de la captura pegada, a la espera de Confirm/Cancel
#[derive(Debug, Clone)]
pub struct Preview {
    pub target: ChartSlot,
    pub width: u32,
    pub height: u32,
    pub thumbnail: RgbaImage,
}

/// Modo de la interfaz de usuario
#[derive(Debug, Clone)]
pub enum UiMode {
    Normal,
    Message(Message),
    Preview(Preview),
    /// Confirmación antes de marcar el trade como cerrado
    ConfirmClose(OpenTrade),
}

/// Mensajes que el UI envía al motor del journal
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Quit,
    SelectTab(Tab),
    NextTab,
    FocusNext,
    FocusPrev,
    InputChar(char),
    Backspace,
    ChoicePrev,
    ChoiceNext,
    AddEntry,
    PasteScreenshot,
    UpdateOpenTrade,
    OpenConfirmClose,
    ConfirmCloseNow,
    CancelClose,
    ConfirmScreenshot,
    CancelScreenshot,
    DismissMessage,
}

/// Estado compartido entre el UI y el motor del journal
pub struct AppState {
    pub tab: Tab,
    pub entry: EntryForm,
    pub open_form: OpenTradeForm,
    pub open_trades: Vec<OpenTrade>,
    pub categories: Vec<String>,
    pub mind_states: Vec<String>,
    pub journal_path: PathBuf,
    pub config_path: Option<PathBuf>,
    /// Captura confirmada a la espera de la próxima entrada/actualización
    pub pending_chart: Option<ChartSlot>,
    /// Ring buffer para mensajes de log (últimos 100)
    pub log: VecDeque<String>,
    pub should_quit: bool,
    pub ui_mode: UiMode,
}

impl AppState {
    pub fn new(journal: &JournalConfig, journal_path: PathBuf, config_path: Option<PathBuf>) -> Self {
        Self {
            tab: Tab::NewTrade,
            entry: EntryForm {
                symbol: String::new(),
                order: OrderSide::Buy,
                risk: journal.default_risk.clone(),
                category: 0,
                mind_state: 0,
                entry_analysis: String::new(),
                management: String::new(),
                focus: EntryFocus::Symbol,
            },
            open_form: OpenTradeForm {
                selected: 0,
                result: String::new(),
                focus: OpenFocus::Select,
            },
            open_trades: Vec::new(),
            categories: journal.categories.clone(),
            mind_states: journal.mind_states.clone(),
            journal_path,
            config_path,
            pending_chart: None,
            log: VecDeque::new(),
            should_quit: false,
            ui_mode: UiMode::Normal,
        }
    }

    pub fn log(&mut self, msg: &str) {
        let ts = chrono::Local::now().format("%H:%M:%S");
        let entry = format!("[{}] {}", ts, msg);
        tracing::info!("{}", msg);
        self.push_log(entry);
    }

    pub fn log_error(&mut self, msg: &str) {
        let ts = chrono::Local::now().format("%H:%M:%S");
        let entry = format!("[{}] ⚠ {}", ts, msg);
        tracing::error!("{}", msg);
        self.push_log(entry);
    }

    fn push_log(&mut self, entry: String) {
        if self.log.len() >= 100 {
            self.log.pop_front();
        }
        self.log.push_back(entry);
    }

    /// Muestra un error como diálogo modal y lo deja en el log
    pub fn show_error(&mut self, err: &JournalError) {
        let body = err.to_string();
        self.log_error(&body.replace('\n', " "));
        self.ui_mode = UiMode::Message(Message {
            kind: MessageKind::Error,
            title: err.title().to_string(),
            body,
        });
    }

    pub fn show_info(&mut self, title: &str, body: &str) {
        self.log(body);
        self.ui_mode = UiMode::Message(Message {
            kind: MessageKind::Info,
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    pub fn open_trades_label(&self) -> String {
        format!("You have {} open trades", self.open_trades.len())
    }

    pub fn selected_trade(&self) -> Option<&OpenTrade> {
        self.open_trades.get(self.open_form.selected)
    }

    /// Arma el registro con los valores actuales del formulario
    pub fn entry_from_form(&self, time: String) -> TradeEntry {
        let pick = |list: &[String], idx: usize| list.get(idx).cloned().unwrap_or_default();
        TradeEntry {
            time,
            symbol: self.entry.symbol.clone(),
            order: self.entry.order,
            risk: self.entry.risk.clone(),
            category: pick(&self.categories, self.entry.category),
            mind_state: pick(&self.mind_states, self.entry.mind_state),
            entry_analysis: self.entry.entry_analysis.clone(),
            management: self.entry.management.clone(),
        }
    }

    pub fn focus_next(&mut self, forward: bool) {
        match self.tab {
            Tab::NewTrade => {
                self.entry.focus = cycle(&EntryFocus::ORDER, self.entry.focus, forward);
            }
            Tab::OpenTrades => {
                self.open_form.focus = cycle(&OpenFocus::ORDER, self.open_form.focus, forward);
            }
            Tab::Options => {}
        }
    }

    /// Buffer de texto con foco, si lo hay (y si admite saltos de línea)
    fn focused_text_mut(&mut self) -> Option<(&mut String, bool)> {
        match self.tab {
            Tab::NewTrade => match self.entry.focus {
                EntryFocus::Symbol => Some((&mut self.entry.symbol, false)),
                EntryFocus::Risk => Some((&mut self.entry.risk, false)),
                EntryFocus::EntryAnalysis => Some((&mut self.entry.entry_analysis, true)),
                EntryFocus::Management => Some((&mut self.entry.management, true)),
                _ => None,
            },
            Tab::OpenTrades => match self.open_form.focus {
                OpenFocus::Result => Some((&mut self.open_form.result, true)),
                _ => None,
            },
            Tab::Options => None,
        }
    }

    pub fn input_char(&mut self, c: char) {
        if let Some((buf, multiline)) = self.focused_text_mut() {
            if c != '\n' || multiline {
                buf.push(c);
            }
        }
    }

    pub fn backspace(&mut self) {
        if let Some((buf, _)) = self.focused_text_mut() {
            buf.pop();
        }
    }

    /// Cambia la opción con foco en New Trade. Devuelve false si el foco no es un selector.
    pub fn cycle_entry_choice(&mut self, forward: bool) -> bool {
        let step = |idx: usize, len: usize| {
            if len == 0 {
                0
            } else if forward {
                (idx + 1) % len
            } else {
                (idx + len - 1) % len
            }
        };
        match self.entry.focus {
            EntryFocus::Order => self.entry.order = self.entry.order.toggled(),
            EntryFocus::Category => {
                self.entry.category = step(self.entry.category, self.categories.len());
            }
            EntryFocus::MindState => {
                self.entry.mind_state = step(self.entry.mind_state, self.mind_states.len());
            }
            _ => return false,
        }
        true
    }
}
