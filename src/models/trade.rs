use chrono::{DateTime, Local};

/// Formato de la columna Time (ej: "Mon, Mar-04 14:05")
pub const TIME_FORMAT: &str = "%a, %b-%d %H:%M";

/// Valor de la columna Closed para un trade cerrado
pub const CLOSED_MARK: &str = "X";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSide {
    #[default]
    Buy,
    Sell,
}

impl OrderSide {
    pub fn label(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Columnas del libro, en orden (1-based en la hoja)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Time,
    Symbol,
    Order,
    Risk,
    Category,
    MindState,
    EntryAnalysis,
    Management,
    ChartBefore,
    ChartAfter,
    Result,
    Closed,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Time,
        Column::Symbol,
        Column::Order,
        Column::Risk,
        Column::Category,
        Column::MindState,
        Column::EntryAnalysis,
        Column::Management,
        Column::ChartBefore,
        Column::ChartAfter,
        Column::Result,
        Column::Closed,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::Time => "Time",
            Column::Symbol => "Symbol",
            Column::Order => "Order",
            Column::Risk => "Risk",
            Column::Category => "Category",
            Column::MindState => "MindState",
            Column::EntryAnalysis => "Entry Analysis",
            Column::Management => "Management",
            Column::ChartBefore => "Chart Before",
            Column::ChartAfter => "Chart After",
            Column::Result => "Result/Comments",
            Column::Closed => "Closed",
        }
    }

    /// Índice 1-based de la columna en la hoja
    pub fn index(&self) -> u32 {
        *self as u32 + 1
    }
}

/// Columna donde se ancla cada captura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartSlot {
    Before,
    After,
}

impl ChartSlot {
    pub fn column(&self) -> Column {
        match self {
            ChartSlot::Before => Column::ChartBefore,
            ChartSlot::After => Column::ChartAfter,
        }
    }
}

/// Los ocho campos que se cargan al abrir un trade
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEntry {
    pub time: String,
    pub symbol: String,
    pub order: OrderSide,
    pub risk: String,
    pub category: String,
    pub mind_state: String,
    pub entry_analysis: String,
    pub management: String,
}

impl TradeEntry {
    pub fn stamp(now: DateTime<Local>) -> String {
        now.format(TIME_FORMAT).to_string()
    }

    /// Pares (columna, valor) en el orden en que se escriben en la fila
    pub fn cells(&self) -> [(Column, &str); 8] {
        [
            (Column::Time, self.time.as_str()),
            (Column::Symbol, self.symbol.as_str()),
            (Column::Order, self.order.label()),
            (Column::Risk, self.risk.as_str()),
            (Column::Category, self.category.as_str()),
            (Column::MindState, self.mind_state.as_str()),
            (Column::EntryAnalysis, self.entry_analysis.as_str()),
            (Column::Management, self.management.as_str()),
        ]
    }

    /// Encabezados de los campos vacíos (espacios en blanco cuentan como vacío)
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.cells()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(col, _)| col.header())
            .collect()
    }
}

/// Trade sin marca de cierre, identificado por su fila
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTrade {
    pub row: u32,
    pub label: String,
}
