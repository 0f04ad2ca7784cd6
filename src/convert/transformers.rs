//! Text transformers: the first pipeline step (string -> string)

use regex::Regex;

/// A string-to-string normalisation step.
pub trait Transformer: Send + Sync {
    fn transform(&self, input: &str) -> String;
}

/// Plain closures can be registered directly.
impl<F> Transformer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn transform(&self, input: &str) -> String {
        self(input)
    }
}

/// Passes text through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transformer for Identity {
    fn transform(&self, input: &str) -> String {
        input.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Trim;

impl Transformer for Trim {
    fn transform(&self, input: &str) -> String {
        input.trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl Transformer for Lowercase {
    fn transform(&self, input: &str) -> String {
        input.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

impl Transformer for Uppercase {
    fn transform(&self, input: &str) -> String {
        input.to_uppercase()
    }
}

/// Trims and folds every whitespace run into a single space.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapseWhitespace;

impl Transformer for CollapseWhitespace {
    fn transform(&self, input: &str) -> String {
        input.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Pulls a plain number out of price-like text.
///
/// `"€1.299,00"` -> `"1299.00"`, `"$19.99"` -> `"19.99"`, `"1,299 items"` -> `"1299"`.
/// The last `.` or `,` is the decimal separator when one or two digits
/// follow it; every other separator is a thousands separator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Digits;

impl Transformer for Digits {
    fn transform(&self, input: &str) -> String {
        let kept: String = input
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
            .collect();
        let kept = kept.trim_matches(|c| c == '.' || c == ',');

        let decimal_at = kept.rfind(['.', ',']).filter(|&pos| {
            let tail = kept.len() - pos - 1;
            (1..=2).contains(&tail)
        });

        let mut result = String::new();
        let negative = input
            .trim_start()
            .chars()
            .find(|c| c.is_ascii_digit() || *c == '-')
            == Some('-');
        if negative && !kept.is_empty() {
            result.push('-');
        }
        for (pos, c) in kept.char_indices() {
            if c.is_ascii_digit() {
                result.push(c);
            } else if Some(pos) == decimal_at {
                result.push('.');
            }
        }
        result
    }
}

/// Splits on a marker and keeps one segment (trimmed).
///
/// A missing segment yields an empty string.
#[derive(Debug, Clone)]
pub struct Split {
    separator: String,
    index: Option<usize>,
}

impl Split {
    pub fn new(separator: impl Into<String>, index: usize) -> Self {
        Self {
            separator: separator.into(),
            index: Some(index),
        }
    }

    /// Keep the last segment.
    pub fn last(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            index: None,
        }
    }
}

impl Transformer for Split {
    fn transform(&self, input: &str) -> String {
        let mut segments = input.split(self.separator.as_str());
        let segment = match self.index {
            Some(index) => segments.nth(index),
            None => segments.last(),
        };
        segment.map(|s| s.trim().to_string()).unwrap_or_default()
    }
}

/// Keeps one capture group of the first regex match, or an empty string.
#[derive(Debug, Clone)]
pub struct RegexCapture {
    pattern: Regex,
    group: usize,
}

impl RegexCapture {
    pub fn new(pattern: &str, group: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            group,
        })
    }
}

impl Transformer for RegexCapture {
    fn transform(&self, input: &str) -> String {
        self.pattern
            .captures(input)
            .and_then(|caps| caps.get(self.group))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}
