/// Lowercases `text` and strips everything except ASCII letters, whitespace,
/// and the Devanagari (U+0900..U+097F) and U+0A80..U+0AFF blocks.
///
/// Digits and punctuation are dropped. The result is trimmed.
pub fn normalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|&c| is_kept_char(c))
        .collect();
    kept.trim().to_string()
}

/// Collapses runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_kept_char(c: char) -> bool {
    c.is_ascii_alphabetic()
        || c.is_whitespace()
        || ('\u{0900}'..='\u{097F}').contains(&c)
        || ('\u{0A80}'..='\u{0AFF}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        assert_eq!(normalize("  Yellow Leaves, with PALE veins!! "), "yellow leaves with pale veins");
        assert_eq!(normalize("Root-rot (2 plants)"), "rootrot  plants");
    }

    #[test]
    fn test_preserves_devanagari() {
        assert_eq!(normalize("पत्तियां पीली हैं?"), "पत्तियां पीली हैं");
        // danda sits inside the Devanagari block
        assert_eq!(normalize("पीली हैं।"), "पीली हैं।");
    }

    #[test]
    fn test_drops_non_ascii_latin() {
        assert_eq!(normalize("café"), "caf");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  pale   veins \t yellow "), "pale veins yellow");
    }
}
