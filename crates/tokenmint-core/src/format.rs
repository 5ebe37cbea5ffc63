use crate::error::CoreError;
use crate::token::CodeToken;
use jiff::tz::TimeZone;
use jiff::Timestamp;
use typed_builder::TypedBuilder;

/// Optional date segment rendered between the prefix and the sequence
/// number, resolved from the clock at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSegment {
    /// Four-digit UTC year, e.g. `PRJ-2026-0007`.
    Year,
}

/// Configures how code tokens are rendered for one entity collection.
///
/// A format pairs a constant prefix with a zero-pad width and an optional
/// [`DateSegment`]. Rendering is a pure function over validated inputs:
/// `SUPP` at width 4 renders sequence 42 as `SUPP-0042`.
///
/// Zero-padding is what makes the store's string-descending lookup agree
/// with numeric ordering, so the width bounds the usable sequence space:
/// sequences above [`max_sequence`](Self::max_sequence) must not be
/// rendered.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CodeFormat {
    /// Constant prefix shared by every token in the collection.
    #[builder(setter(into))]
    pub prefix: String,
    /// Number of decimal digits the sequence is zero-padded to.
    #[builder(default = 4)]
    pub width: u8,
    /// Separator between prefix, date segment, and sequence digits.
    #[builder(default = '-')]
    pub separator: char,
    /// Optional date segment resolved at render time.
    #[builder(default)]
    pub date_segment: Option<DateSegment>,
}

/// Extra digits the degraded fallback suffix carries over the configured
/// width. The length difference keeps fallback codes out of the primary
/// sequence namespace entirely.
const FALLBACK_EXTRA_DIGITS: u8 = 2;

impl CodeFormat {
    /// Validates the format settings.
    ///
    /// The prefix must be non-empty `[a-zA-Z0-9_-]` (which also keeps SQL
    /// `LIKE` patterns wildcard-free), the width must be in `1..=9`, and
    /// the separator must itself be a valid token character.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prefix.is_empty() {
            return Err(CoreError::InvalidFormat("prefix must not be empty".into()));
        }
        if !self
            .prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidFormat(format!(
                "prefix must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                self.prefix
            )));
        }
        if self.width == 0 || self.width > 9 {
            return Err(CoreError::InvalidFormat(format!(
                "width must be between 1 and 9, got {}",
                self.width
            )));
        }
        if self.separator != '-' && self.separator != '_' {
            return Err(CoreError::InvalidFormat(format!(
                "separator must be '-' or '_', got '{}'",
                self.separator
            )));
        }
        Ok(())
    }

    /// Returns the prefix with any date segment resolved against `now`,
    /// e.g. `SUPP` or `PRJ-2026`.
    ///
    /// This is the string the store's last-value lookup matches against.
    pub fn effective_prefix(&self, now: Timestamp) -> String {
        match self.date_segment {
            None => self.prefix.clone(),
            Some(DateSegment::Year) => {
                let year = now.to_zoned(TimeZone::UTC).year();
                format!("{}{}{:04}", self.prefix, self.separator, year)
            }
        }
    }

    /// Returns the string the store's last-value lookup should match on:
    /// the effective prefix plus the trailing separator. The separator
    /// keeps a prefix like `SUP` from matching a sibling collection's
    /// `SUPP-…` codes.
    pub fn lookup_prefix(&self, now: Timestamp) -> String {
        format!("{}{}", self.effective_prefix(now), self.separator)
    }

    /// Largest sequence number renderable at the configured width without
    /// breaking the lexicographic-equals-numeric ordering invariant.
    pub fn max_sequence(&self) -> u32 {
        10u32.pow(u32::from(self.width)) - 1
    }

    /// Renders a sequence number into a full code token.
    pub fn render(&self, sequence: u32, now: Timestamp) -> CodeToken {
        CodeToken::new_unchecked(format!(
            "{}{}{:0width$}",
            self.effective_prefix(now),
            self.separator,
            sequence,
            width = usize::from(self.width)
        ))
    }

    /// Extracts the sequence number from a code under this format.
    ///
    /// The effective prefix and separator are stripped and the remainder
    /// must be all decimal digits; anything else (foreign code under the
    /// same prefix, fallback code, wider-than-width tail) yields `None`.
    /// Matching on the digit pattern rather than slicing by position keeps
    /// this correct when the prefix length varies with the date segment.
    pub fn parse_sequence(&self, code: &str, now: Timestamp) -> Option<u32> {
        let rest = code.strip_prefix(self.effective_prefix(now).as_str())?;
        let digits = rest.strip_prefix(self.separator)?;
        if digits.len() != usize::from(self.width) || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Renders the degraded fallback token from a truncated current
    /// timestamp.
    ///
    /// The suffix is the low `width + 2` digits of the millisecond clock.
    /// Being two digits longer than any in-width sequence rendering, a
    /// fallback token can never equal a token produced by
    /// [`render`](Self::render) under the same format.
    pub fn render_fallback(&self, now: Timestamp) -> CodeToken {
        let digits = u32::from(self.width + FALLBACK_EXTRA_DIGITS);
        let modulus = 10i64.pow(digits);
        let suffix = now.as_millisecond().rem_euclid(modulus);
        CodeToken::new_unchecked(format!(
            "{}{}{:0width$}",
            self.effective_prefix(now),
            self.separator,
            suffix,
            width = digits as usize
        ))
    }
}
