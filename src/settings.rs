//! Typed job description decoded from one button-press frame.
//!
//! The button controller sends a small literal record:
//!
//! ```text
//! ('size' => 'letter', 'mode' => 'pdf', 'crop' => 0, 'deskew' => 1)
//! ```
//!
//! Keys are single-quoted. Values are either a single-quoted bare word
//! (an enumerator symbol) or an unquoted `0`/`1` (a boolean). Parsing is
//! deliberately literal: quotes and parentheses are stripped, entries are
//! split on `", "` and pairs on `" => "`. Duplicate keys merge with the
//! last occurrence winning.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ParseError;

/// A raw value from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unquoted `0` or `1`.
    Bool(bool),
    /// Any other text, taken as an enumerator symbol.
    Symbol(String),
}

impl Value {
    fn from_raw(raw: &str) -> Self {
        match raw {
            "0" => Self::Bool(false),
            "1" => Self::Bool(true),
            other => Self::Symbol(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Symbol(s) => write!(f, "'{}'", s),
        }
    }
}

/// Page size requested by the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageSize {
    /// US Letter, the feeder's native page size.
    #[default]
    Letter,
    /// ISO A4.
    A4,
    /// US Legal.
    Legal,
    /// Largest sheet the feeder accepts.
    Max,
}

impl PageSize {
    /// Maps a wire symbol to a page size.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "letter" => Some(Self::Letter),
            "a4" => Some(Self::A4),
            "legal" => Some(Self::Legal),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Wire symbol for this size.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::A4 => "a4",
            Self::Legal => "legal",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output mode requested by the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// One multi-page PDF per job.
    Pdf,
    /// One JPEG per page.
    Jpg,
}

impl ScanMode {
    /// Maps a wire symbol to a mode.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "pdf" => Some(Self::Pdf),
            "jpg" => Some(Self::Jpg),
            _ => None,
        }
    }

    /// Wire symbol for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpg => "jpg",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const KNOWN_KEYS: [&str; 4] = ["size", "mode", "crop", "deskew"];

/// Immutable job description, built once per frame.
///
/// `mode` has no default: `None` means "neither pdf nor jpg" and the
/// planner treats it that way. Keys the planner does not use, and known
/// keys whose value has the wrong kind, are preserved in `extras`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    /// Requested page size.
    pub size: PageSize,
    /// Requested output mode, if any.
    pub mode: Option<ScanMode>,
    /// Trim borders from each page.
    pub crop: bool,
    /// Straighten each page.
    pub deskew: bool,
    /// Entries the typed fields did not absorb.
    pub extras: BTreeMap<String, Value>,
}

impl Settings {
    /// Parses one frame of wire text.
    ///
    /// # Example
    ///
    /// ```
    /// use scanbutton::settings::{PageSize, ScanMode, Settings};
    ///
    /// let s = Settings::parse("('size' => 'a4', 'mode' => 'jpg', 'crop' => 1, 'deskew' => 0)").unwrap();
    /// assert_eq!(s.size, PageSize::A4);
    /// assert_eq!(s.mode, Some(ScanMode::Jpg));
    /// assert!(s.crop);
    /// ```
    pub fn parse(frame: &str) -> Result<Self, ParseError> {
        parse_entries(frame).map(Self::from_entries)
    }

    /// Builds typed settings from a merged key/value mapping.
    pub fn from_entries(entries: BTreeMap<String, Value>) -> Self {
        let mut settings = Self::default();

        for (key, value) in entries {
            let absorbed = match (key.as_str(), &value) {
                ("size", Value::Symbol(s)) => PageSize::from_symbol(s)
                    .map(|size| settings.size = size)
                    .is_some(),
                ("mode", Value::Symbol(s)) => ScanMode::from_symbol(s)
                    .map(|mode| settings.mode = Some(mode))
                    .is_some(),
                ("crop", Value::Bool(b)) => {
                    settings.crop = *b;
                    true
                }
                ("deskew", Value::Bool(b)) => {
                    settings.deskew = *b;
                    true
                }
                _ => false,
            };

            if !absorbed {
                if KNOWN_KEYS.contains(&key.as_str()) {
                    log::warn!("Ignoring {} => {}: unexpected value", key, value);
                }
                settings.extras.insert(key, value);
            }
        }

        settings
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={} mode={} crop={} deskew={}",
            self.size,
            self.mode.map_or("unset", ScanMode::as_str),
            self.crop,
            self.deskew
        )?;
        for (key, value) in &self.extras {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Splits a frame into its merged key/value mapping.
pub fn parse_entries(frame: &str) -> Result<BTreeMap<String, Value>, ParseError> {
    let text = frame.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let delimited = text.starts_with('(')
        && text.ends_with(')')
        && text.matches('(').count() == 1
        && text.matches(')').count() == 1;
    if !delimited {
        return Err(ParseError::Unbalanced);
    }

    let body: String = text
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '\''))
        .collect();

    let mut entries = BTreeMap::new();
    if body.trim().is_empty() {
        return Ok(entries);
    }

    // A separator after the last pair leaves empty trailing segments
    let mut segments: Vec<&str> = body.split(", ").collect();
    while segments.last() == Some(&"") {
        segments.pop();
    }

    for entry in segments {
        let parts: Vec<&str> = entry.split(" => ").collect();
        match parts.as_slice() {
            [_] => {
                return Err(ParseError::MissingSeparator {
                    entry: entry.to_string(),
                })
            }
            [key, raw] => {
                let (key, raw) = (key.trim(), raw.trim());
                if key.is_empty() || raw.is_empty() {
                    return Err(ParseError::BlankField {
                        entry: entry.to_string(),
                    });
                }
                entries.insert(key.to_string(), Value::from_raw(raw));
            }
            _ => {
                return Err(ParseError::PairCount {
                    entry: entry.to_string(),
                    parts: parts.len(),
                })
            }
        }
    }

    Ok(entries)
}
