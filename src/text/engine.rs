use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use log::debug;
use opencv::core::Mat;
use opencv::prelude::*;
use tesseract::Tesseract;

/// OCR backend. Implementations receive a single-channel binary image.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, binary: &Mat, language: &str) -> Result<String>;
}

/// Tesseract through its C API, configured for one uniform block of text.
/// One engine is kept per language so traineddata loads once.
pub struct TesseractRecognizer {
    tessdata_dir: Option<PathBuf>,
    engines: HashMap<String, Tesseract>,
}

impl TesseractRecognizer {
    pub fn new(tessdata_dir: Option<PathBuf>) -> Self {
        Self {
            tessdata_dir,
            engines: HashMap::new(),
        }
    }

    /// Number of languages with a loaded engine.
    pub fn loaded_languages(&self) -> usize {
        self.engines.len()
    }

    fn load(&self, language: &str) -> Result<Tesseract> {
        debug!("loading tesseract language {}", language);
        let datapath = self
            .tessdata_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned());
        Ok(Tesseract::new(datapath.as_deref(), Some(language))?
            .set_variable("tessedit_pageseg_mode", "6")?)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, binary: &Mat, language: &str) -> Result<String> {
        if binary.empty() {
            return Ok(String::new());
        }
        if binary.channels() != 1 {
            return Err(anyhow!(
                "expected a single-channel image, got {} channels",
                binary.channels()
            ));
        }

        // Tesseract wants a tightly packed buffer
        let packed = if binary.is_continuous() {
            binary.try_clone()?
        } else {
            let mut packed = Mat::default();
            binary.copy_to(&mut packed)?;
            packed
        };
        let width = packed.cols();
        let height = packed.rows();
        let bytes = packed.data_bytes()?;

        // The builder consumes the engine; a failed call drops it and the next one reloads.
        let engine = match self.engines.remove(language) {
            Some(engine) => engine,
            None => self.load(language)?,
        };
        let mut engine = engine
            .set_frame(bytes, width, height, 1, width)?
            .recognize()?;
        let text = engine.get_text()?;
        self.engines.insert(language.to_string(), engine);

        Ok(text)
    }
}
