//! Text decoding and the layout details needed to write a file back unchanged.

use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Character encoding of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// UTF-8 with a byte order mark.
    Utf8Bom,
    /// Legacy files written by Windows tools in the system code page.
    Windows1252,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// How a file's text was laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFormat {
    pub encoding: TextEncoding,
    pub line_ending: LineEnding,
    pub final_newline: bool,
}

impl Default for TextFormat {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            line_ending: LineEnding::Lf,
            final_newline: true,
        }
    }
}

/// Decode bytes into lines, remembering the layout.
pub fn decode(bytes: &[u8]) -> (Vec<String>, TextFormat) {
    let (text, encoding) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (String::from_utf8_lossy(rest).into_owned(), TextEncoding::Utf8Bom),
        None => match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), TextEncoding::Utf8),
            Err(_) => {
                let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
                (text.into_owned(), TextEncoding::Windows1252)
            }
        },
    };

    let line_ending = if text.contains("\r\n") {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    };
    let final_newline = text.ends_with('\n');

    let body = text.strip_suffix('\n').unwrap_or(&text);
    let lines = if text.is_empty() {
        Vec::new()
    } else {
        body.split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    };

    (
        lines,
        TextFormat {
            encoding,
            line_ending,
            final_newline,
        },
    )
}

/// Encode lines back to bytes in the given layout.
pub fn encode<S: AsRef<str>>(lines: &[S], format: TextFormat) -> Vec<u8> {
    let mut text = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            text.push_str(format.line_ending.as_str());
        }
        text.push_str(line.as_ref());
    }
    if format.final_newline && !lines.is_empty() {
        text.push_str(format.line_ending.as_str());
    }

    match format.encoding {
        TextEncoding::Utf8 => text.into_bytes(),
        TextEncoding::Utf8Bom => {
            let mut bytes = UTF8_BOM.to_vec();
            bytes.extend_from_slice(text.as_bytes());
            bytes
        }
        TextEncoding::Windows1252 => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(&text);
            if unmappable {
                tracing::warn!("characters not representable in Windows-1252 were replaced");
            }
            bytes.into_owned()
        }
    }
}
