use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// Byte encoding of the CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsvEncoding {
    /// ISO-8859-15 ("Latin-9"), what spreadsheet tools on Western locales open cleanly.
    Latin9,
    Utf8,
}

impl FromStr for CsvEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "iso-8859-15" | "latin9" | "latin-9" => Ok(CsvEncoding::Latin9),
            "utf-8" | "utf8" => Ok(CsvEncoding::Utf8),
            other => Err(format!("Unsupported CSV encoding: {}", other)),
        }
    }
}

const REPLACEMENT: u8 = b'?';

/// Latin-9 differs from Latin-1 in eight code points.
fn latin9_byte(c: char) -> Option<u8> {
    match c {
        '€' => Some(0xA4),
        'Š' => Some(0xA6),
        'š' => Some(0xA8),
        'Ž' => Some(0xB4),
        'ž' => Some(0xB8),
        'Œ' => Some(0xBC),
        'œ' => Some(0xBD),
        'Ÿ' => Some(0xBE),
        // Latin-1 characters displaced by the ones above.
        '\u{A4}' | '\u{A6}' | '\u{A8}' | '\u{B4}' | '\u{B8}' | '\u{BC}' | '\u{BD}' | '\u{BE}' => None,
        c if (c as u32) <= 0xFF => Some(c as u32 as u8),
        _ => None,
    }
}

impl CsvEncoding {
    /// Encode text; characters with no representation become `?`.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        match self {
            CsvEncoding::Utf8 => Cow::Borrowed(text.as_bytes()),
            CsvEncoding::Latin9 if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            CsvEncoding::Latin9 => Cow::Owned(
                text.chars()
                    .map(|c| latin9_byte(c).unwrap_or(REPLACEMENT))
                    .collect(),
            ),
        }
    }
}
