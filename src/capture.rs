use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::journal::JournalError;
use crate::models::trade::ChartSlot;

type Result<T> = std::result::Result<T, JournalError>;

/// Tamaño máximo de la miniatura que se dibuja en el modal de vista previa
pub const THUMB_MAX_W: u32 = 64;
pub const THUMB_MAX_H: u32 = 40;

/// Fuente de imágenes (el portapapeles del sistema, o un fake en tests)
pub trait ImageSource {
    /// `Ok(None)` si no hay imagen disponible
    fn grab_image(&mut self) -> Result<Option<RgbaImage>>;
}

/// Portapapeles del sistema vía arboard (solo lectura)
pub struct SystemClipboard;

impl ImageSource for SystemClipboard {
    fn grab_image(&mut self) -> Result<Option<RgbaImage>> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| JournalError::Clipboard(e.to_string()))?;
        match clipboard.get_image() {
            Ok(data) => {
                let (w, h) = (data.width as u32, data.height as u32);
                RgbaImage::from_raw(w, h, data.bytes.into_owned())
                    .map(Some)
                    .ok_or_else(|| {
                        JournalError::Clipboard(format!("unexpected buffer size for {}x{}", w, h))
                    })
            }
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(JournalError::Clipboard(e.to_string())),
        }
    }
}

/// Captura escrita en disco a la espera de confirmación
#[derive(Debug)]
pub struct StagedShot {
    pub path: PathBuf,
    pub target: ChartSlot,
    pub width: u32,
    pub height: u32,
    pub confirmed: bool,
}

/// Mantiene como mucho un PNG temporal por vez
pub struct ScreenshotStage {
    dir: PathBuf,
    shot: Option<StagedShot>,
    seq: u32,
}

impl ScreenshotStage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), shot: None, seq: 0 }
    }

    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn staged(&self) -> Option<&StagedShot> {
        self.shot.as_ref()
    }

    /// Guarda la imagen como PNG temporal; reemplaza (y borra) la anterior
    pub fn stage(&mut self, image: &RgbaImage, target: ChartSlot) -> Result<&StagedShot> {
        self.clear();
        self.seq += 1;
        let path = self.dir.join(format!(
            "trading-journal-{}-{}.png",
            std::process::id(),
            self.seq
        ));
        image.save_with_format(&path, image::ImageFormat::Png)?;
        tracing::debug!("Screenshot staged at {:?}", path);
        let shot = self.shot.insert(StagedShot {
            path,
            target,
            width: image.width(),
            height: image.height(),
            confirmed: false,
        });
        Ok(&*shot)
    }

    /// Marca la captura para adjuntarla en la próxima operación. Devuelve su destino.
    pub fn confirm(&mut self) -> Option<ChartSlot> {
        self.shot.as_mut().map(|s| {
            s.confirmed = true;
            s.target
        })
    }

    /// Archivo a adjuntar en una operación sobre `slot`.
    /// Error si la captura fue confirmada pero su archivo ya no existe.
    pub fn attachment(&self, slot: ChartSlot) -> Result<Option<PathBuf>> {
        match &self.shot {
            Some(s) if s.confirmed && s.target == slot => {
                if s.path.exists() {
                    Ok(Some(s.path.clone()))
                } else {
                    Err(JournalError::MissingScreenshot)
                }
            }
            _ => Ok(None),
        }
    }

    /// Borra el archivo temporal y olvida la captura
    pub fn clear(&mut self) {
        if let Some(shot) = self.shot.take() {
            remove_quietly(&shot.path);
        }
    }
}

impl Drop for ScreenshotStage {
    fn drop(&mut self) {
        self.clear();
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove temporary screenshot {:?}: {}", path, e);
        }
    }
}

/// Miniatura para la vista previa, sin deformar la imagen
pub fn thumbnail(image: &RgbaImage) -> RgbaImage {
    let (w, h) = (image.width().max(1), image.height().max(1));
    let scale = f64::min(THUMB_MAX_W as f64 / w as f64, THUMB_MAX_H as f64 / h as f64).min(1.0);
    let tw = ((w as f64 * scale).round() as u32).max(1);
    let th = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::thumbnail(image, tw, th)
}
