//! Decimal-pattern number formatting used by `@decfmt`.
//!
//! Supported pattern syntax: `0` (required digit), `#` (optional digit),
//! one `.` separating integer and fraction digits, and `,` in the integer
//! part for grouping. Anything before the first or after the last pattern
//! character is copied verbatim as prefix or suffix.

use crate::script::error::RuntimeError;

const PATTERN_CHARS: &[char] = &['0', '#', ',', '.'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalFormat {
    prefix: String,
    suffix: String,
    min_integer: usize,
    min_fraction: usize,
    max_fraction: usize,
    grouping: Option<usize>,
}

impl DecimalFormat {
    pub fn parse(pattern: &str) -> Result<Self, RuntimeError> {
        let invalid = || RuntimeError::InvalidFormat {
            pattern: pattern.to_string(),
        };

        let first = pattern.find(PATTERN_CHARS).ok_or_else(invalid)?;
        let last = pattern.rfind(PATTERN_CHARS).ok_or_else(invalid)?;
        let core = &pattern[first..=last];

        let (integer, fraction) = match core.split_once('.') {
            Some((_, fraction)) if fraction.contains('.') => return Err(invalid()),
            Some((integer, fraction)) => (integer, fraction),
            None => (core, ""),
        };
        if !integer.chars().all(|c| matches!(c, '0' | '#' | ','))
            || !fraction.chars().all(|c| matches!(c, '0' | '#'))
        {
            return Err(invalid());
        }

        let grouping = match integer.rfind(',') {
            Some(index) => {
                let size = integer.len() - index - 1;
                if size == 0 {
                    return Err(invalid());
                }
                Some(size)
            }
            None => None,
        };

        Ok(Self {
            prefix: pattern[..first].to_string(),
            suffix: pattern[last + 1..].to_string(),
            min_integer: integer.chars().filter(|&c| c == '0').count(),
            min_fraction: fraction.chars().take_while(|&c| c == '0').count(),
            max_fraction: fraction.len(),
            grouping,
        })
    }

    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return format!("{}{value}{}", self.prefix, self.suffix);
        }

        let rounded = format!("{:.*}", self.max_fraction, value.abs());
        let (integer, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));

        let mut fraction = fraction.to_string();
        while fraction.len() > self.min_fraction && fraction.ends_with('0') {
            fraction.pop();
        }

        let mut integer = integer.trim_start_matches('0').to_string();
        while integer.len() < self.min_integer {
            integer.insert(0, '0');
        }
        if integer.is_empty() && fraction.is_empty() {
            integer.push('0');
        }
        if let Some(size) = self.grouping {
            integer = group_digits(&integer, size);
        }

        let negative = value < 0.0 && rounded.chars().any(|c| c.is_ascii_digit() && c != '0');

        let mut out = String::with_capacity(self.prefix.len() + integer.len() + fraction.len() + 4);
        if negative {
            out.push('-');
        }
        out.push_str(&self.prefix);
        out.push_str(&integer);
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(&fraction);
        }
        out.push_str(&self.suffix);
        out
    }
}

fn group_digits(digits: &str, size: usize) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / size);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % size == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
