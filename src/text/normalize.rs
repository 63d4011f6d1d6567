use std::sync::LazyLock;

use regex::Regex;

/// ASCII punctuation, their full-width forms, CJK brackets and punctuation,
/// ASCII and ideographic spaces, and the line breaks Tesseract appends.
static DENYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r##"[!"#$%&'\\()*+,\-./:;<=>?@\[\]^_`{|}~！＂＃＄％＆＇（）＊＋，－．／：；＜＝＞？＠［＼］＾＿｀｛｜｝～￥「」〔〕“”‘’〈〉《》『』【】・。、 　\r\n\t]"##,
    )
    .expect("denylist pattern is valid")
});

/// Strips punctuation and symbol noise from OCR output, keeping letters,
/// digits and kana/kanji intact.
pub fn normalize(raw: &str) -> String {
    DENYLIST.replace_all(raw, "").into_owned()
}
