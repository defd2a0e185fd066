use chrono::{DateTime, Local};

use crate::app::{AppCommand, AppState, OpenFocus, Preview, Tab, UiMode};
use crate::capture::{self, ImageSource, ScreenshotStage};
use crate::journal::{Align, JournalError, JournalStore};
use crate::models::trade::{ChartSlot, Column, TradeEntry, CLOSED_MARK};

type Result<T> = std::result::Result<T, JournalError>;

/// Procesa un comando del UI. Los errores recuperables se muestran como diálogo.
pub fn handle_command(
    cmd: AppCommand,
    state: &mut AppState,
    store: &mut JournalStore,
    stage: &mut ScreenshotStage,
    clipboard: &mut dyn ImageSource,
) {
    if !accepts(&state.ui_mode, &cmd) {
        tracing::debug!("Ignoring {:?} while a dialog is open", cmd);
        return;
    }

    let outcome = match cmd {
        AppCommand::Quit => {
            state.should_quit = true;
            Ok(())
        }

        // --- Navegación ---
        AppCommand::SelectTab(tab) => {
            state.tab = tab;
            Ok(())
        }
        AppCommand::NextTab => {
            state.tab = state.tab.next();
            Ok(())
        }
        AppCommand::FocusNext => {
            state.focus_next(true);
            Ok(())
        }
        AppCommand::FocusPrev => {
            state.focus_next(false);
            Ok(())
        }

        // --- Edición ---
        AppCommand::InputChar(c) => {
            state.input_char(c);
            Ok(())
        }
        AppCommand::Backspace => {
            state.backspace();
            Ok(())
        }
        AppCommand::ChoicePrev | AppCommand::ChoiceNext => {
            let forward = cmd == AppCommand::ChoiceNext;
            match state.tab {
                Tab::NewTrade => {
                    state.cycle_entry_choice(forward);
                }
                Tab::OpenTrades if state.open_form.focus == OpenFocus::Select => {
                    cycle_open_trade(state, store, forward);
                }
                _ => {}
            }
            Ok(())
        }

        // --- Acciones ---
        AppCommand::AddEntry => add_entry(state, store, stage, Local::now()).map(|_| ()),
        AppCommand::UpdateOpenTrade => update_open_trade(state, store, stage).map(|_| ()),
        AppCommand::PasteScreenshot => paste_screenshot(state, stage, clipboard),

        // --- Cierre de trade ---
        AppCommand::OpenConfirmClose => {
            match state.selected_trade().cloned() {
                Some(trade) => state.ui_mode = UiMode::ConfirmClose(trade),
                None => state.log("No open trade selected."),
            }
            Ok(())
        }
        AppCommand::ConfirmCloseNow => {
            let mode = std::mem::replace(&mut state.ui_mode, UiMode::Normal);
            match mode {
                UiMode::ConfirmClose(trade) => close_trade(state, store, trade.row),
                other => {
                    state.ui_mode = other;
                    Ok(())
                }
            }
        }
        AppCommand::CancelClose => {
            state.ui_mode = UiMode::Normal;
            Ok(())
        }

        // --- Vista previa de captura ---
        AppCommand::ConfirmScreenshot => {
            confirm_screenshot(state, stage);
            Ok(())
        }
        AppCommand::CancelScreenshot => {
            cancel_screenshot(state, stage);
            Ok(())
        }
        AppCommand::DismissMessage => {
            if matches!(state.ui_mode, UiMode::Message(_)) {
                state.ui_mode = UiMode::Normal;
            }
            Ok(())
        }
    };

    if let Err(e) = outcome {
        state.show_error(&e);
    }
}

/// Con un diálogo abierto solo pasan sus propias respuestas (y Quit).
/// Teclas que la TUI tradujo antes de que se abriera el diálogo se descartan.
fn accepts(mode: &UiMode, cmd: &AppCommand) -> bool {
    match mode {
        UiMode::Normal => true,
        UiMode::Message(_) => matches!(cmd, AppCommand::DismissMessage | AppCommand::Quit),
        UiMode::Preview(_) => matches!(
            cmd,
            AppCommand::ConfirmScreenshot | AppCommand::CancelScreenshot | AppCommand::Quit
        ),
        UiMode::ConfirmClose(_) => matches!(
            cmd,
            AppCommand::ConfirmCloseNow | AppCommand::CancelClose | AppCommand::Quit
        ),
    }
}

/// Registra un trade nuevo con los valores del formulario.
/// Adjunta la captura confirmada desde New Trade en Chart Before.
pub fn add_entry(
    state: &mut AppState,
    store: &mut JournalStore,
    stage: &mut ScreenshotStage,
    now: DateTime<Local>,
) -> Result<u32> {
    let chart = stage.attachment(ChartSlot::Before)?;
    let entry = state.entry_from_form(TradeEntry::stamp(now));
    let missing = entry.missing_fields();
    if !missing.is_empty() {
        return Err(JournalError::EmptyFields(missing));
    }

    let row = store.transaction(|s| {
        let row = s.append(&entry)?;
        if let Some(path) = &chart {
            s.embed_chart(row, ChartSlot::Before, path)?;
        }
        Ok(row)
    })?;

    state.entry.entry_analysis.clear();
    state.entry.management.clear();
    stage.clear();
    state.pending_chart = None;
    state.log(&format!(
        "Trade logged: {} {} (row {}{})",
        entry.symbol,
        entry.order.label(),
        row,
        if chart.is_some() { ", chart attached" } else { "" }
    ));
    refresh_open_trades(state, store);
    Ok(row)
}

/// Guarda Result/Comments del trade seleccionado, y la captura en Chart After si hay una confirmada.
/// Devuelve la fila actualizada, o None si no hay trade seleccionado.
pub fn update_open_trade(
    state: &mut AppState,
    store: &mut JournalStore,
    stage: &mut ScreenshotStage,
) -> Result<Option<u32>> {
    let Some(row) = state.selected_trade().map(|t| t.row) else {
        state.log("No open trade selected.");
        return Ok(None);
    };
    let chart = stage.attachment(ChartSlot::After)?;
    let text = state.open_form.result.clone();

    store.transaction(|s| {
        s.set_text(row, Column::Result, &text, Align::Left)?;
        if let Some(path) = &chart {
            s.embed_chart(row, ChartSlot::After, path)?;
        }
        Ok(())
    })?;

    stage.clear();
    state.pending_chart = None;
    state.log(&format!(
        "Trade at row {} updated{}",
        row,
        if chart.is_some() { " with chart" } else { "" }
    ));
    refresh_open_trades(state, store);
    Ok(Some(row))
}

/// Marca el trade como cerrado ("X" en Closed). Repetirlo no cambia nada.
pub fn close_trade(state: &mut AppState, store: &mut JournalStore, row: u32) -> Result<()> {
    store.transaction(|s| s.set_text(row, Column::Closed, CLOSED_MARK, Align::Center))?;
    state.log(&format!("Trade at row {} closed", row));
    refresh_open_trades(state, store);
    Ok(())
}

/// Recarga la lista de trades abiertos. Mantiene la selección si la fila sigue abierta;
/// si no, selecciona el primero. Carga su Result/Comments en el editor.
pub fn refresh_open_trades(state: &mut AppState, store: &JournalStore) {
    let previous = state.selected_trade().map(|t| t.row);
    state.open_trades = store.open_trades();
    let idx = previous
        .and_then(|row| state.open_trades.iter().position(|t| t.row == row))
        .unwrap_or(0);
    select_open_trade(state, store, idx);
}

/// Selecciona un trade abierto y carga su texto de resultado
pub fn select_open_trade(state: &mut AppState, store: &JournalStore, index: usize) {
    state.open_form.selected = index.min(state.open_trades.len().saturating_sub(1));
    state.open_form.result = state
        .selected_trade()
        .map(|t| store.text(t.row, Column::Result))
        .unwrap_or_default();
}

fn cycle_open_trade(state: &mut AppState, store: &JournalStore, forward: bool) {
    let len = state.open_trades.len();
    if len == 0 {
        return;
    }
    let cur = state.open_form.selected;
    let next = if forward { (cur + 1) % len } else { (cur + len - 1) % len };
    select_open_trade(state, store, next);
}

/// Lee la imagen del portapapeles, la deja en un PNG temporal y abre la vista previa
pub fn paste_screenshot(
    state: &mut AppState,
    stage: &mut ScreenshotStage,
    clipboard: &mut dyn ImageSource,
) -> Result<()> {
    let Some(target) = state.tab.chart_slot() else {
        return Ok(());
    };
    let image = clipboard.grab_image()?.ok_or(JournalError::NoClipboardImage)?;
    let shot = stage.stage(&image, target)?;
    let (width, height) = (shot.width, shot.height);
    state.pending_chart = None;
    state.ui_mode = UiMode::Preview(Preview {
        target,
        width,
        height,
        thumbnail: capture::thumbnail(&image),
    });
    Ok(())
}

pub fn confirm_screenshot(state: &mut AppState, stage: &mut ScreenshotStage) {
    state.pending_chart = stage.confirm();
    state.show_info("Success", "Screenshot confirmed and ready to attach.");
}

pub fn cancel_screenshot(state: &mut AppState, stage: &mut ScreenshotStage) {
    stage.clear();
    state.pending_chart = None;
    state.show_info("Cancelled", "Screenshot attachment cancelled.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{EntryFocus, MessageKind};
    use crate::capture::tests::{sample_image, FakeClipboard};
    use crate::config::JournalConfig;
    use crate::journal::SheetLayout;
    use chrono::TimeZone;
    use std::path::PathBuf;

    struct Fixture {
        state: AppState,
        store: JournalStore,
        stage: ScreenshotStage,
        dir: PathBuf,
    }

    fn fixture(name: &str) -> Fixture {
        let dir = std::env::temp_dir().join(format!("journal-panel-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let cfg = JournalConfig::default();
        let path = cfg.workbook_path(&dir);
        let store = JournalStore::open_or_create(&path, SheetLayout::from(&cfg)).unwrap();
        let mut state = AppState::new(&cfg, path, None);
        refresh_open_trades(&mut state, &store);
        let stage = ScreenshotStage::new(&dir);
        Fixture { state, store, stage, dir }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 4, 14, 5, 0).unwrap()
    }

    fn fill(state: &mut AppState, symbol: &str) {
        state.entry.symbol = symbol.into();
        state.entry.entry_analysis = "Liquidity sweep into FVG".into();
        state.entry.management = "Partial at 2R".into();
    }

    impl Fixture {
        fn run(&mut self, cmd: AppCommand, clipboard: &mut dyn ImageSource) {
            handle_command(cmd, &mut self.state, &mut self.store, &mut self.stage, clipboard);
        }
    }

    #[test]
    fn add_entry_writes_one_row_and_clears_text_boxes() {
        let mut f = fixture("add");
        fill(&mut f.state, "EURUSD");
        let row = add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();
        assert_eq!(row, 2);
        assert_eq!(f.store.row_count(), 2);
        assert_eq!(f.store.text(2, Column::Time), "Mon, Mar-04 14:05");
        assert_eq!(f.store.text(2, Column::Symbol), "EURUSD");
        assert_eq!(f.store.text(2, Column::Order), "Buy");
        assert_eq!(f.store.text(2, Column::Risk), "1");
        assert_eq!(f.store.text(2, Column::Category), "Med Prob");
        assert_eq!(f.store.text(2, Column::MindState), "Normal");
        assert_eq!(f.store.text(2, Column::EntryAnalysis), "Liquidity sweep into FVG");
        assert_eq!(f.store.text(2, Column::Management), "Partial at 2R");

        assert!(f.state.entry.entry_analysis.is_empty());
        assert!(f.state.entry.management.is_empty());
        assert_eq!(f.state.entry.symbol, "EURUSD");
        assert_eq!(f.state.open_trades_label(), "You have 1 open trades");
    }

    #[test]
    fn empty_field_is_rejected_without_new_row() {
        let mut f = fixture("empty");
        fill(&mut f.state, "");
        let mut clip = FakeClipboard(None);
        f.run(AppCommand::AddEntry, &mut clip);
        assert_eq!(f.store.row_count(), 1);
        match &f.state.ui_mode {
            UiMode::Message(m) => {
                assert_eq!(m.kind, MessageKind::Error);
                assert!(m.body.contains("Symbol"));
            }
            other => panic!("expected error dialog, got {:?}", other),
        }
        // el texto no se pierde
        assert_eq!(f.state.entry.management, "Partial at 2R");
    }

    #[test]
    fn update_then_read_result_text() {
        let mut f = fixture("update");
        fill(&mut f.state, "NQ");
        add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();
        assert_eq!(f.state.open_form.result, "");

        f.state.open_form.result = "Stopped out, late entry".into();
        let row = update_open_trade(&mut f.state, &mut f.store, &mut f.stage).unwrap();
        assert_eq!(row, Some(2));
        assert_eq!(f.store.text(2, Column::Result), "Stopped out, late entry");
        assert_eq!(f.state.open_form.result, "Stopped out, late entry");
    }

    #[test]
    fn update_without_selection_is_a_no_op() {
        let mut f = fixture("noselect");
        assert_eq!(update_open_trade(&mut f.state, &mut f.store, &mut f.stage).unwrap(), None);
        assert_eq!(f.store.row_count(), 1);
    }

    #[test]
    fn close_flow_removes_trade_from_open_list() {
        let mut f = fixture("close");
        for sym in ["ES", "NQ", "CL"] {
            fill(&mut f.state, sym);
            add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();
        }
        let mut clip = FakeClipboard(None);
        f.state.tab = Tab::OpenTrades;
        f.state.open_form.focus = OpenFocus::Select;
        f.run(AppCommand::ChoiceNext, &mut clip);
        assert_eq!(f.state.selected_trade().unwrap().row, 3);

        f.run(AppCommand::OpenConfirmClose, &mut clip);
        assert!(matches!(f.state.ui_mode, UiMode::ConfirmClose(ref t) if t.row == 3));
        f.run(AppCommand::ConfirmCloseNow, &mut clip);
        assert!(matches!(f.state.ui_mode, UiMode::Normal));

        assert_eq!(f.store.text(3, Column::Closed), "X");
        let rows: Vec<u32> = f.state.open_trades.iter().map(|t| t.row).collect();
        assert_eq!(rows, vec![2, 4]);
        assert_eq!(f.state.open_trades_label(), "You have 2 open trades");

        // cerrar de nuevo la misma fila no falla
        close_trade(&mut f.state, &mut f.store, 3).unwrap();
        assert_eq!(f.store.text(3, Column::Closed), "X");
    }

    #[test]
    fn cancel_close_keeps_trade_open() {
        let mut f = fixture("cancelclose");
        fill(&mut f.state, "ZB");
        add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();
        let mut clip = FakeClipboard(None);
        f.run(AppCommand::OpenConfirmClose, &mut clip);
        f.run(AppCommand::CancelClose, &mut clip);
        assert_eq!(f.store.text(2, Column::Closed), "");
        assert_eq!(f.state.open_trades.len(), 1);
    }

    #[test]
    fn paste_without_clipboard_image_reports_error() {
        let mut f = fixture("noclip");
        let mut clip = FakeClipboard(None);
        f.run(AppCommand::PasteScreenshot, &mut clip);
        match &f.state.ui_mode {
            UiMode::Message(m) => assert!(m.body.contains("No image found in clipboard")),
            other => panic!("expected error dialog, got {:?}", other),
        }
        assert!(f.stage.staged().is_none());
    }

    #[test]
    fn confirmed_screenshot_is_embedded_and_temp_file_removed() {
        let mut f = fixture("attach");
        let mut clip = FakeClipboard(Some(sample_image()));
        f.run(AppCommand::PasteScreenshot, &mut clip);
        let staged = f.stage.staged().unwrap().path.clone();
        match &f.state.ui_mode {
            UiMode::Preview(p) => {
                assert_eq!(p.target, ChartSlot::Before);
                assert_eq!((p.width, p.height), (120, 60));
            }
            other => panic!("expected preview, got {:?}", other),
        }
        f.run(AppCommand::ConfirmScreenshot, &mut clip);
        assert_eq!(f.state.pending_chart, Some(ChartSlot::Before));
        f.run(AppCommand::DismissMessage, &mut clip);

        fill(&mut f.state, "GC");
        f.run(AppCommand::AddEntry, &mut clip);
        assert_eq!(f.store.row_count(), 2);
        assert_eq!(f.store.chart_count(), 1);
        assert!(!staged.exists());
        assert_eq!(f.state.pending_chart, None);
    }

    #[test]
    fn cancelled_screenshot_is_not_attached() {
        let mut f = fixture("cancelshot");
        let mut clip = FakeClipboard(Some(sample_image()));
        f.run(AppCommand::PasteScreenshot, &mut clip);
        let staged = f.stage.staged().unwrap().path.clone();
        f.run(AppCommand::CancelScreenshot, &mut clip);
        assert!(!staged.exists());

        fill(&mut f.state, "GC");
        add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();
        assert_eq!(f.store.chart_count(), 0);
    }

    #[test]
    fn missing_staged_file_aborts_entry() {
        let mut f = fixture("vanished");
        let mut clip = FakeClipboard(Some(sample_image()));
        f.run(AppCommand::PasteScreenshot, &mut clip);
        f.run(AppCommand::ConfirmScreenshot, &mut clip);
        let staged = f.stage.staged().unwrap().path.clone();
        std::fs::remove_file(&staged).unwrap();

        fill(&mut f.state, "SI");
        let err = add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap_err();
        assert!(matches!(err, JournalError::MissingScreenshot));
        assert_eq!(f.store.row_count(), 1);
    }

    #[test]
    fn after_chart_goes_to_open_trade() {
        let mut f = fixture("after");
        fill(&mut f.state, "6E");
        add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();

        let mut clip = FakeClipboard(Some(sample_image()));
        f.run(AppCommand::SelectTab(Tab::OpenTrades), &mut clip);
        f.run(AppCommand::PasteScreenshot, &mut clip);
        f.run(AppCommand::ConfirmScreenshot, &mut clip);
        assert_eq!(f.state.pending_chart, Some(ChartSlot::After));
        f.run(AppCommand::DismissMessage, &mut clip);

        f.state.open_form.result = "TP hit".into();
        f.run(AppCommand::UpdateOpenTrade, &mut clip);
        assert!(matches!(f.state.ui_mode, UiMode::Normal));
        assert_eq!(f.store.text(2, Column::Result), "TP hit");
        assert_eq!(f.store.chart_count(), 1);
        assert!(f.stage.staged().is_none());
    }

    #[test]
    fn form_commands_are_dropped_while_a_dialog_is_open() {
        let mut f = fixture("modal");
        let mut clip = FakeClipboard(None);
        f.run(AppCommand::AddEntry, &mut clip);
        assert!(matches!(f.state.ui_mode, UiMode::Message(_)));

        // teclas ya traducidas como entrada de formulario
        for c in "NQ".chars() {
            f.run(AppCommand::InputChar(c), &mut clip);
        }
        f.run(AppCommand::FocusNext, &mut clip);
        fill(&mut f.state, "NQ");
        f.run(AppCommand::AddEntry, &mut clip);
        assert_eq!(f.state.entry.focus, EntryFocus::Symbol);
        assert_eq!(f.store.row_count(), 1);
        assert!(matches!(f.state.ui_mode, UiMode::Message(_)));

        f.run(AppCommand::DismissMessage, &mut clip);
        assert!(matches!(f.state.ui_mode, UiMode::Normal));
        f.run(AppCommand::AddEntry, &mut clip);
        assert_eq!(f.store.row_count(), 2);
    }

    #[test]
    fn close_confirmation_only_takes_its_answers() {
        let mut f = fixture("modalclose");
        fill(&mut f.state, "ES");
        add_entry(&mut f.state, &mut f.store, &mut f.stage, now()).unwrap();
        let mut clip = FakeClipboard(Some(sample_image()));
        f.run(AppCommand::OpenConfirmClose, &mut clip);
        f.run(AppCommand::PasteScreenshot, &mut clip);
        assert!(f.stage.staged().is_none());
        assert!(matches!(f.state.ui_mode, UiMode::ConfirmClose(_)));
        f.run(AppCommand::Quit, &mut clip);
        assert!(f.state.should_quit);
    }

    #[test]
    fn typing_commands_edit_the_form() {
        let mut f = fixture("typing");
        let mut clip = FakeClipboard(None);
        for c in "ES".chars() {
            f.run(AppCommand::InputChar(c), &mut clip);
        }
        f.run(AppCommand::FocusNext, &mut clip);
        assert_eq!(f.state.entry.focus, EntryFocus::Order);
        f.run(AppCommand::ChoiceNext, &mut clip);
        assert_eq!(f.state.entry.symbol, "ES");
        assert_eq!(f.state.entry_from_form(String::new()).order.label(), "Sell");
        assert!(f.dir.exists());
    }
}
