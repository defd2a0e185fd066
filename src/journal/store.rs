use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use umya_spreadsheet::structs::drawing::spreadsheet::MarkerType;
use umya_spreadsheet::{
    HorizontalAlignmentValues, Image, Spreadsheet, VerticalAlignmentValues, Worksheet,
};

use super::error::{JournalError, Result};
use crate::config::JournalConfig;
use crate::models::trade::{ChartSlot, Column, OpenTrade, TradeEntry, CLOSED_MARK};

/// Relleno del encabezado (verde)
const HEADER_FILL: &str = "FF27E85B";
const HEADER_HEIGHT_PTS: f64 = 20.0;
const TIME_COLUMN_WIDTH: f64 = 16.0;
/// Puntos → píxeles a 96 dpi, con un margen para que la imagen no toque el borde de la celda
const PTS_TO_PX: f64 = 1.333;
const CHART_MARGIN: f64 = 0.95;

/// Alineación horizontal de una celda escrita
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
}

impl Align {
    fn value(&self) -> HorizontalAlignmentValues {
        match self {
            Align::Left => HorizontalAlignmentValues::Left,
            Align::Center => HorizontalAlignmentValues::Center,
        }
    }
}

/// Medidas fijas de la hoja
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SheetLayout {
    pub row_height_pts: f64,
    pub info_column_width: f64,
}

impl From<&JournalConfig> for SheetLayout {
    fn from(cfg: &JournalConfig) -> Self {
        Self {
            row_height_pts: cfg.row_height_pts,
            info_column_width: cfg.info_column_width,
        }
    }
}

impl SheetLayout {
    pub fn column_width(&self, col: Column) -> f64 {
        match col {
            Column::Time => TIME_COLUMN_WIDTH,
            Column::EntryAnalysis | Column::Management | Column::Result => self.info_column_width,
            Column::ChartBefore | Column::ChartAfter => self.info_column_width + 10.0,
            other => other.header().len() as f64 * 1.4,
        }
    }

    /// Tamaño en píxeles de una captura ajustada a la altura de fila, sin deformarla
    pub fn chart_size(&self, width: u32, height: u32) -> (u32, u32) {
        let target_h = (self.row_height_pts * PTS_TO_PX * CHART_MARGIN).round().max(1.0);
        let target_w = (width as f64 * target_h / height.max(1) as f64).round().max(1.0);
        (target_w as u32, target_h as u32)
    }
}

/// Referencia A1 de una celda (columna y fila 1-based)
pub fn cell_ref(col: u32, row: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect::<String>() + &row.to_string()
}

/// Libro del journal: se mantiene abierto en memoria y se persiste una vez por acción
pub struct JournalStore {
    path: PathBuf,
    layout: SheetLayout,
    book: Spreadsheet,
    /// Última fila ocupada (1 = solo encabezado)
    last_row: u32,
}

impl JournalStore {
    /// Abre el libro, o lo crea con el encabezado si no existe.
    /// Falla con `JournalError::Locked` si otra aplicación lo tiene abierto.
    pub fn open_or_create(path: impl Into<PathBuf>, layout: SheetLayout) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            let mut book = umya_spreadsheet::new_file();
            let sheet = first_sheet_mut(&mut book, &path)?;
            write_header(sheet, &layout);
            save_atomic(&book, &path)?;
            tracing::info!("Created new journal {:?}", path);
        }

        let book = load(&path)?;
        let last_row = first_sheet(&book, &path)?.get_highest_row().max(1);
        let store = Self { path, layout, book, last_row };
        tracing::info!(
            "Journal {:?} opened: {} trades, {} charts",
            store.path,
            store.last_row - 1,
            store.chart_count()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filas ocupadas, encabezado incluido
    pub fn row_count(&self) -> u32 {
        self.last_row
    }

    pub fn chart_count(&self) -> usize {
        self.sheet().map(|s| s.get_image_collection().len()).unwrap_or(0)
    }

    /// Ejecuta `f` sobre el libro en memoria y lo guarda una sola vez.
    /// Si `f` o el guardado fallan, el libro vuelve al estado previo.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = (self.book.clone(), self.last_row);
        let outcome = f(self).and_then(|value| {
            save_atomic(&self.book, &self.path)?;
            Ok(value)
        });
        if outcome.is_err() {
            (self.book, self.last_row) = snapshot;
        }
        outcome
    }

    /// Escribe los campos de entrada en la próxima fila libre y devuelve su número
    pub fn append(&mut self, entry: &TradeEntry) -> Result<u32> {
        let row = self.last_row + 1;
        let height = self.layout.row_height_pts;
        let sheet = self.sheet_mut()?;
        for (col, value) in entry.cells() {
            write_cell(sheet, col.index(), row, value, None);
        }
        sheet
            .get_row_dimension_mut(&row)
            .set_height(height)
            .set_custom_height(true);
        self.last_row = row;
        Ok(row)
    }

    /// Escribe texto en una celda de un trade existente
    pub fn set_text(&mut self, row: u32, col: Column, text: &str, align: Align) -> Result<()> {
        self.check_row(row)?;
        let sheet = self.sheet_mut()?;
        write_cell(sheet, col.index(), row, text, Some(align));
        Ok(())
    }

    /// Texto de una celda; vacío si la fila no existe o la celda está vacía
    pub fn text(&self, row: u32, col: Column) -> String {
        if row == 0 || row > self.last_row {
            return String::new();
        }
        self.sheet()
            .map(|s| s.get_value((col.index(), row)))
            .unwrap_or_default()
    }

    /// Trades sin "X" en Closed, en orden de fila
    pub fn open_trades(&self) -> Vec<OpenTrade> {
        (2..=self.last_row)
            .filter(|&row| self.text(row, Column::Closed) != CLOSED_MARK)
            .map(|row| OpenTrade {
                row,
                label: format!(
                    "{} {} {}",
                    self.text(row, Column::Time),
                    self.text(row, Column::Symbol),
                    self.text(row, Column::Order)
                ),
            })
            .collect()
    }

    /// Ancla una captura en la columna Chart Before/After de la fila.
    /// Se guarda la imagen original; solo el tamaño visible se ajusta a la altura de fila.
    /// La imagen se valida antes de tocar el libro.
    pub fn embed_chart(&mut self, row: u32, slot: ChartSlot, image_path: &Path) -> Result<()> {
        self.check_row(row)?;
        if !image_path.exists() {
            return Err(JournalError::ImageNotFound(image_path.to_path_buf()));
        }

        let bytes = fs::read(image_path)?;
        let source = image::load_from_memory(&bytes)?;
        let (w, h) = self.layout.chart_size(source.width(), source.height());

        let tag = match slot {
            ChartSlot::Before => "before",
            ChartSlot::After => "after",
        };
        let name = format!("chart_r{}_{}_{}.png", row, tag, self.chart_count() + 1);

        let mut marker = MarkerType::default();
        marker.set_coordinate(cell_ref(slot.column().index(), row));
        let mut picture = Image::default();
        picture.new_image_with_dimensions(h, w, &name, bytes, marker);

        self.sheet_mut()?.add_image(picture);
        tracing::debug!(
            "Chart {} anchored at row {} ({}x{} px shown as {}x{})",
            tag,
            row,
            source.width(),
            source.height(),
            w,
            h
        );
        Ok(())
    }

    fn check_row(&self, row: u32) -> Result<()> {
        if row < 2 || row > self.last_row {
            return Err(JournalError::workbook(
                &self.path,
                format!("row {} is not a trade row", row),
            ));
        }
        Ok(())
    }

    fn sheet(&self) -> Result<&Worksheet> {
        first_sheet(&self.book, &self.path)
    }

    fn sheet_mut(&mut self) -> Result<&mut Worksheet> {
        first_sheet_mut(&mut self.book, &self.path)
    }
}

fn first_sheet<'a>(book: &'a Spreadsheet, path: &Path) -> Result<&'a Worksheet> {
    book.get_sheet(&0)
        .ok_or_else(|| JournalError::workbook(path, "workbook has no sheets"))
}

fn first_sheet_mut<'a>(book: &'a mut Spreadsheet, path: &Path) -> Result<&'a mut Worksheet> {
    book.get_sheet_mut(&0)
        .ok_or_else(|| JournalError::workbook(path, "workbook has no sheets"))
}

fn write_header(sheet: &mut Worksheet, layout: &SheetLayout) {
    for col in Column::ALL {
        let c = col.index();
        sheet.get_cell_mut((c, 1)).set_value_string(col.header());
        let style = sheet.get_style_mut((c, 1));
        style.get_font_mut().set_bold(true);
        let alignment = style.get_alignment_mut();
        alignment.set_horizontal(HorizontalAlignmentValues::Center);
        alignment.set_vertical(VerticalAlignmentValues::Center);
        style.set_background_color(HEADER_FILL);
        sheet
            .get_column_dimension_by_number_mut(&c)
            .set_width(layout.column_width(col));
    }
    sheet
        .get_row_dimension_mut(&1)
        .set_height(HEADER_HEIGHT_PTS)
        .set_custom_height(true);
}

fn write_cell(sheet: &mut Worksheet, col: u32, row: u32, text: &str, align: Option<Align>) {
    sheet.get_cell_mut((col, row)).set_value_string(text);
    let alignment = sheet.get_style_mut((col, row)).get_alignment_mut();
    alignment.set_vertical(VerticalAlignmentValues::Top);
    alignment.set_wrap_text(true);
    if let Some(a) = align {
        alignment.set_horizontal(a.value());
    }
}

/// Lee el libro. Abrirlo en lectura/escritura primero detecta si Excel lo tiene bloqueado.
fn load(path: &Path) -> Result<Spreadsheet> {
    load_with(path, open_read_write)
}

fn open_read_write(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn load_with(path: &Path, open: impl FnOnce(&Path) -> io::Result<File>) -> Result<Spreadsheet> {
    open(path).map_err(|e| JournalError::from_io(path, e))?;
    umya_spreadsheet::reader::xlsx::read(path).map_err(|e| JournalError::workbook(path, e))
}

/// Escribe a un archivo temporal hermano y lo renombra sobre el journal
fn save_atomic(book: &Spreadsheet, path: &Path) -> Result<()> {
    save_atomic_with(book, path, |book, tmp| {
        umya_spreadsheet::writer::xlsx::write(book, tmp).map_err(|e| JournalError::workbook(tmp, e))
    })
}

fn save_atomic_with(
    book: &Spreadsheet,
    path: &Path,
    write: impl FnOnce(&Spreadsheet, &Path) -> Result<()>,
) -> Result<()> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "journal".to_string());
    let tmp = path.with_file_name(format!(".{}.saving.xlsx", stem));

    if let Err(e) = write(book, &tmp) {
        remove_partial(&tmp);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp, path) {
        remove_partial(&tmp);
        return Err(JournalError::from_io(path, e));
    }
    tracing::debug!("Journal saved to {:?}", path);
    Ok(())
}

fn remove_partial(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("Could not remove partial save {:?}: {}", tmp, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trade::OrderSide;
    use image::{Rgba, RgbaImage};

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "journal-store-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn layout() -> SheetLayout {
        SheetLayout::from(&JournalConfig::default())
    }

    fn entry(symbol: &str) -> TradeEntry {
        TradeEntry {
            time: "Tue, Mar-05 09:30".into(),
            symbol: symbol.into(),
            order: OrderSide::Buy,
            risk: "1".into(),
            category: "Med Prob".into(),
            mind_state: "Normal".into(),
            entry_analysis: "Break and retest\nof 1.0850".into(),
            management: "Trail under H1 swing".into(),
        }
    }

    fn png(dir: &Path, w: u32, h: u32) -> PathBuf {
        let path = dir.join("shot.png");
        RgbaImage::from_pixel(w, h, Rgba([30, 120, 200, 255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn cell_refs() {
        assert_eq!(cell_ref(1, 1), "A1");
        assert_eq!(cell_ref(9, 2), "I2");
        assert_eq!(cell_ref(10, 14), "J14");
        assert_eq!(cell_ref(27, 3), "AA3");
    }

    #[test]
    fn layout_widths_and_chart_size() {
        let l = layout();
        assert_eq!(l.column_width(Column::Time), 16.0);
        assert_eq!(l.column_width(Column::Result), 40.0);
        assert_eq!(l.column_width(Column::ChartAfter), 50.0);
        assert!((l.column_width(Column::Symbol) - 8.4).abs() < 1e-9);
        // 200 pt * 1.333 * 0.95 = 253.27 px
        assert_eq!(l.chart_size(800, 400), (506, 253));
        assert_eq!(l.chart_size(100, 253), (100, 253));
    }

    #[test]
    fn creates_journal_with_header() {
        let dir = test_dir("create");
        let path = dir.join("trading_journal.xlsx");
        let store = JournalStore::open_or_create(&path, layout()).unwrap();
        assert!(path.exists());
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.text(1, Column::Time), "Time");
        assert_eq!(store.text(1, Column::Result), "Result/Comments");
        assert_eq!(store.text(1, Column::Closed), "Closed");
        assert!(store.open_trades().is_empty());
    }

    #[test]
    fn append_adds_one_row_in_column_order() {
        let dir = test_dir("append");
        let path = dir.join("j.xlsx");
        let mut store = JournalStore::open_or_create(&path, layout()).unwrap();
        let e = entry("EURUSD");
        let row = store.transaction(|s| s.append(&e)).unwrap();
        assert_eq!(row, 2);
        assert_eq!(store.row_count(), 2);

        let reopened = JournalStore::open_or_create(&path, layout()).unwrap();
        assert_eq!(reopened.row_count(), 2);
        for (col, value) in e.cells() {
            assert_eq!(reopened.text(2, col), value);
        }
        assert_eq!(reopened.text(2, Column::Result), "");
        assert_eq!(
            reopened.open_trades(),
            vec![OpenTrade { row: 2, label: "Tue, Mar-05 09:30 EURUSD Buy".into() }]
        );
    }

    #[test]
    fn closed_trades_drop_out_of_open_list() {
        let dir = test_dir("closed");
        let mut store = JournalStore::open_or_create(dir.join("j.xlsx"), layout()).unwrap();
        for sym in ["ES", "NQ", "CL"] {
            store.transaction(|s| s.append(&entry(sym))).unwrap();
        }
        store
            .transaction(|s| s.set_text(3, Column::Closed, CLOSED_MARK, Align::Center))
            .unwrap();
        let rows: Vec<u32> = store.open_trades().iter().map(|t| t.row).collect();
        assert_eq!(rows, vec![2, 4]);

        // idempotente
        store
            .transaction(|s| s.set_text(3, Column::Closed, CLOSED_MARK, Align::Center))
            .unwrap();
        assert_eq!(store.text(3, Column::Closed), "X");
        assert_eq!(store.open_trades().len(), 2);
    }

    #[test]
    fn text_of_missing_rows_is_empty() {
        let dir = test_dir("missing");
        let store = JournalStore::open_or_create(dir.join("j.xlsx"), layout()).unwrap();
        assert_eq!(store.text(0, Column::Result), "");
        assert_eq!(store.text(7, Column::Result), "");
    }

    #[test]
    fn set_text_rejects_non_trade_rows() {
        let dir = test_dir("badrow");
        let mut store = JournalStore::open_or_create(dir.join("j.xlsx"), layout()).unwrap();
        assert!(store.set_text(1, Column::Result, "x", Align::Left).is_err());
        assert!(store.set_text(2, Column::Result, "x", Align::Left).is_err());
    }

    #[test]
    fn embed_chart_survives_reopen() {
        let dir = test_dir("embed");
        let path = dir.join("j.xlsx");
        let shot = png(&dir, 64, 32);
        let mut store = JournalStore::open_or_create(&path, layout()).unwrap();
        store
            .transaction(|s| {
                let row = s.append(&entry("GC"))?;
                s.embed_chart(row, ChartSlot::Before, &shot)
            })
            .unwrap();
        assert_eq!(store.chart_count(), 1);

        let reopened = JournalStore::open_or_create(&path, layout()).unwrap();
        assert_eq!(reopened.chart_count(), 1);
        assert_eq!(reopened.row_count(), 2);
    }

    #[test]
    fn failed_embed_rolls_back_the_row() {
        let dir = test_dir("rollback");
        let path = dir.join("j.xlsx");
        let mut store = JournalStore::open_or_create(&path, layout()).unwrap();
        let missing = dir.join("nope.png");
        let err = store
            .transaction(|s| {
                let row = s.append(&entry("GC"))?;
                s.embed_chart(row, ChartSlot::Before, &missing)
            })
            .unwrap_err();
        assert!(matches!(err, JournalError::ImageNotFound(_)));
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.text(2, Column::Symbol), "");

        let reopened = JournalStore::open_or_create(&path, layout()).unwrap();
        assert_eq!(reopened.row_count(), 1);
    }

    #[test]
    fn header_and_row_layout_are_persisted() {
        let dir = test_dir("header");
        let path = dir.join("j.xlsx");
        let mut store = JournalStore::open_or_create(&path, layout()).unwrap();
        store.transaction(|s| s.append(&entry("6E"))).unwrap();

        let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        for col in Column::ALL {
            let c = col.index();
            let style = sheet.get_style((c, 1));
            assert!(*style.get_font().unwrap().get_bold(), "{:?} not bold", col);
            assert_eq!(
                style.get_alignment().unwrap().get_horizontal(),
                &HorizontalAlignmentValues::Center
            );
            assert_eq!(style.get_background_color().unwrap().get_argb(), HEADER_FILL);
            let width = *sheet.get_column_dimension_by_number(&c).unwrap().get_width();
            assert!((width - layout().column_width(col)).abs() < 1e-6, "{:?} width {}", col, width);
        }
        let chart_width = *sheet
            .get_column_dimension_by_number(&ChartSlot::Before.column().index())
            .unwrap()
            .get_width();
        assert!((chart_width - 50.0).abs() < 1e-6);
        assert_eq!(*sheet.get_row_dimension(&1).unwrap().get_height(), 20.0);
        assert_eq!(*sheet.get_row_dimension(&2).unwrap().get_height(), 200.0);

        let cell = sheet.get_style((Column::EntryAnalysis.index(), 2));
        let alignment = cell.get_alignment().unwrap();
        assert_eq!(alignment.get_vertical(), &VerticalAlignmentValues::Top);
        assert!(*alignment.get_wrap_text());
    }

    #[test]
    fn permission_denied_on_open_means_locked() {
        let dir = test_dir("locked");
        let path = dir.join("j.xlsx");
        JournalStore::open_or_create(&path, layout()).unwrap();

        let err = load_with(&path, |_| Err(io::Error::from(io::ErrorKind::PermissionDenied)))
            .unwrap_err();
        assert!(matches!(&err, JournalError::Locked(p) if p == &path));
        assert_eq!(err.title(), "File Access Error");

        let err = load_with(&path, |_| Err(io::Error::from(io::ErrorKind::NotFound))).unwrap_err();
        assert!(matches!(err, JournalError::Io(_)));
        assert!(load_with(&path, open_read_write).is_ok());
    }

    #[test]
    fn chart_keeps_full_resolution_and_is_shown_at_row_height() {
        let dir = test_dir("fullres");
        let path = dir.join("j.xlsx");
        let shot = png(&dir, 640, 360);
        let mut store = JournalStore::open_or_create(&path, layout()).unwrap();
        store
            .transaction(|s| {
                let row = s.append(&entry("CL"))?;
                s.embed_chart(row, ChartSlot::After, &shot)
            })
            .unwrap();

        let sheet = store.sheet().unwrap();
        let picture = &sheet.get_image_collection()[0];
        assert_eq!(picture.get_coordinate(), "J2");
        let extent = picture.get_one_cell_anchor().unwrap().get_extent();
        assert_eq!(*extent.get_cy(), 253 * 9525);
        assert_eq!(*extent.get_cx(), 450 * 9525);

        let reopened = JournalStore::open_or_create(&path, layout()).unwrap();
        let stored = &reopened.sheet().unwrap().get_image_collection()[0];
        let decoded = image::load_from_memory(stored.get_image_data()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 360));
    }

    #[test]
    fn failed_write_removes_partial_file() {
        let dir = test_dir("partial");
        let path = dir.join("j.xlsx");
        let store = JournalStore::open_or_create(&path, layout()).unwrap();
        let tmp = dir.join(".j.saving.xlsx");

        let err = save_atomic_with(&store.book, &path, |_, tmp| {
            fs::write(tmp, b"PK\x03\x04 truncated")?;
            Err(JournalError::workbook(tmp, "disk full"))
        })
        .unwrap_err();
        assert!(matches!(err, JournalError::Workbook { .. }));
        assert!(!tmp.exists());

        // el journal anterior queda intacto
        let reopened = JournalStore::open_or_create(&path, layout()).unwrap();
        assert_eq!(reopened.text(1, Column::Time), "Time");
    }

    #[test]
    fn failed_save_rolls_back() {
        let dir = test_dir("savefail");
        let path = dir.join("j.xlsx");
        let mut store = JournalStore::open_or_create(&path, layout()).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert!(store.transaction(|s| s.append(&entry("ZN"))).is_err());
        assert_eq!(store.row_count(), 1);
        assert!(store.open_trades().is_empty());
    }
}
