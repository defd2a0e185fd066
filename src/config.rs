use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub journal: JournalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JournalConfig {
    /// Nombre del libro sin extensión (se guarda en el directorio de trabajo)
    pub file_name: String,
    /// Niveles de probabilidad del setup
    pub categories: Vec<String>,
    /// Estados psicológicos al momento de la entrada
    pub mind_states: Vec<String>,
    /// Riesgo precargado en el formulario (en %)
    pub default_risk: String,
    /// Altura de las filas de trades, en puntos
    pub row_height_pts: f64,
    /// Ancho de las columnas con texto extendido
    pub info_column_width: f64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            file_name: "trading_journal".to_string(),
            categories: vec!["Med Prob".into(), "High Prob".into(), "Low Prob".into()],
            mind_states: vec!["Normal".into(), "Good".into(), "Bad".into()],
            default_risk: "1".to_string(),
            row_height_pts: 200.0,
            info_column_width: 40.0,
        }
    }
}

impl JournalConfig {
    /// Ruta del libro `.xlsx` dentro de `dir`
    pub fn workbook_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.xlsx", self.file_name))
    }
}

/// Devuelve el directorio donde vive el ejecutable (o el directorio actual como fallback)
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Carga la config y devuelve también el path donde fue encontrada.
    /// Sin config.toml se usan los valores por defecto (path = None).
    pub fn load() -> Result<(Self, Option<PathBuf>)> {
        let candidates = [PathBuf::from("config.toml"), exe_dir().join("config.toml")];
        let Some(path) = candidates.into_iter().find(|p| p.exists()) else {
            return Ok((Config::default(), None));
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("No se pudo leer {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Configuración inválida en {:?}", path))?;
        Ok((config, Some(path)))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Error al parsear config.toml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let j = &self.journal;
        if j.file_name.trim().is_empty() {
            anyhow::bail!("journal.file_name no puede estar vacío");
        }
        if j.categories.is_empty() {
            anyhow::bail!("journal.categories necesita al menos una opción");
        }
        if j.mind_states.is_empty() {
            anyhow::bail!("journal.mind_states necesita al menos una opción");
        }
        if j.row_height_pts <= 0.0 {
            anyhow::bail!("journal.row_height_pts debe ser mayor a 0");
        }
        if j.info_column_width <= 0.0 {
            anyhow::bail!("journal.info_column_width debe ser mayor a 0");
        }
        Ok(())
    }
}
