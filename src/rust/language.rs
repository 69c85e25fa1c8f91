use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages the classifier accepts input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "mr")]
    Marathi,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Hindi => "hi",
            Self::Marathi => "mr",
        }
    }

    pub fn is_english(&self) -> bool {
        matches!(self, Self::English)
    }

    /// Detects the input language from the first Indic codepoint in `text`.
    ///
    /// Hindi and Marathi share the Devanagari block, so Devanagari text is
    /// always reported as Hindi. Only the U+0A80..U+0AFF block maps to
    /// Marathi. Text without either block is English.
    pub fn detect(text: &str) -> Self {
        for ch in text.chars() {
            match ch {
                '\u{0900}'..='\u{097F}' => return Self::Hindi,
                '\u{0A80}'..='\u{0AFF}' => return Self::Marathi,
                _ => {}
            }
        }
        Self::English
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "hi" | "hindi" => Ok(Self::Hindi),
            "mr" | "marathi" => Ok(Self::Marathi),
            other => Err(format!("Unsupported language code: {}", other)),
        }
    }
}
