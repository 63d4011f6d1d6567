mod engine;
mod normalize;

pub use engine::{TesseractRecognizer, TextRecognizer};
pub use normalize::normalize;

use log::{debug, warn};
use opencv::core::Mat;
use unicode_segmentation::UnicodeSegmentation;

/// Runs OCR and cleans the result. Any engine failure is "no text this cycle".
pub fn read_text(recognizer: &mut dyn TextRecognizer, binary: &Mat, language: &str) -> String {
    match recognizer.recognize(binary, language) {
        Ok(raw) => {
            let text = normalize(&raw);
            debug!("ocr [{}] {:?} -> {:?}", language, raw, text);
            text
        }
        Err(e) => {
            warn!("text recognition unavailable: {:#}", e);
            String::new()
        }
    }
}

/// True if OCR text from the level readout shows a level marker.
pub fn has_level_marker(text: &str) -> bool {
    ["Lv", "LV", "Ｌｖ", "ＬＶ"]
        .iter()
        .any(|marker| text.contains(marker))
}

/// Levenshtein distance counted in grapheme clusters, so a misread kana or
/// kanji costs one edit.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<&str> = a.graphemes(true).collect();
    let b: Vec<&str> = b.graphemes(true).collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ga) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, gb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ga != gb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity in `0.0..=1.0` from the insert/delete distance over graphemes:
/// `(len_a + len_b - indel) / (len_a + len_b)`. Two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<&str> = a.graphemes(true).collect();
    let b: Vec<&str> = b.graphemes(true).collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    // Longest common subsequence; indel distance is total - 2 * lcs
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ga in &a {
        for (j, gb) in b.iter().enumerate() {
            current[j + 1] = if ga == gb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let common = previous[b.len()];

    (2 * common) as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn edit_distance_counts_graphemes() {
        assert_eq!(edit_distance("ランクバトル", "ランクバトル"), 0);
        assert_eq!(edit_distance("ランクバトル", "ランクパトル"), 1);
        assert_eq!(edit_distance("ランクバトル", "カジュアルバトル"), 5);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn similarity_ratio_weighs_length() {
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("ルカリオ", "ルカリオ"), 1.0);
        assert_eq!(similarity_ratio("ガブ", "ミュウ"), 0.0);
        assert!((similarity_ratio("kitten", "sitting") - 8.0 / 13.0).abs() < 1e-9);
        // A prefix of a long name beats an unrelated name of similar length
        assert!(similarity_ratio("ガブ", "ガブリアス") > similarity_ratio("ガブ", "ピカ"));
    }

    struct Fixed(anyhow::Result<String>);

    impl TextRecognizer for Fixed {
        fn recognize(&mut self, _binary: &Mat, _language: &str) -> anyhow::Result<String> {
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow!("{}", e)),
            }
        }
    }

    #[test]
    fn read_text_normalizes_engine_output() {
        let mut engine = Fixed(Ok("Ｌｖ．５０！\n".to_string()));
        assert_eq!(read_text(&mut engine, &Mat::default(), "eng"), "Ｌｖ５０");
    }

    #[test]
    fn engine_failure_becomes_empty_text() {
        let mut engine = Fixed(Err(anyhow!("tesseract not installed")));
        assert_eq!(read_text(&mut engine, &Mat::default(), "jpn"), "");
    }

    #[test]
    fn level_marker_detection() {
        assert!(has_level_marker("Lv50"));
        assert!(has_level_marker("Ｌｖ５０"));
        assert!(!has_level_marker("50"));
    }
}
