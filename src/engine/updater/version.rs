//! Firmware Version Comparison
//!
//! Compares `MAJOR.MINOR.PATCH[-SUFFIX]` identifiers the way release tags are
//! published. `Ordering::Less` means the left version is older.

use std::cmp::Ordering;

/// Version reported by devices that do not know their own firmware version
pub const UNKNOWN_VERSION: &str = "0.0.0";

/// Parsed form of a version string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIdentifier {
    pub numeric: (u64, u64, u64),
    pub suffix: Option<String>,
}

impl VersionIdentifier {
    /// Parse a version string. Never fails: missing or malformed numeric
    /// components become 0 and an empty suffix counts as absent.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (numbers, suffix) = match input.split_once('-') {
            Some((numbers, suffix)) => (numbers, Some(suffix)),
            None => (input, None),
        };

        let mut parts = numbers
            .split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0));
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);

        Self {
            numeric: (major, minor, patch),
            suffix: suffix.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Whether this is a pre-release (carries a suffix)
    pub fn is_prerelease(&self) -> bool {
        self.suffix.is_some()
    }
}

/// Whether a version string carries usable information
pub fn is_known_version(version: &str) -> bool {
    let version = version.trim();
    !version.is_empty() && version != UNKNOWN_VERSION
}

/// Compare two firmware versions.
///
/// Identical strings, empty strings and the `0.0.0` sentinel all yield
/// `Ordering::Equal` ("no actionable difference").
pub fn compare_versions(v1: &str, v2: &str) -> Ordering {
    if v1 == v2 || !is_known_version(v1) || !is_known_version(v2) {
        return Ordering::Equal;
    }

    let left = VersionIdentifier::parse(v1);
    let right = VersionIdentifier::parse(v2);

    match left.numeric.cmp(&right.numeric) {
        Ordering::Equal => {}
        other => return other,
    }

    match (&left.suffix, &right.suffix) {
        (None, None) => Ordering::Equal,
        // a final release is newer than any pre-release of the same triple
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => natural_cmp(a, b),
    }
}

/// Numeric value of an ordering (-1, 0, +1)
pub fn ordering_sign(ordering: Ordering) -> i8 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(&'a str),
    Text(&'a str),
}

fn segments(input: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;

    for (idx, ch) in input.char_indices() {
        let digit = ch.is_ascii_digit();
        match in_digits {
            Some(current) if current != digit => {
                out.push(make_segment(&input[start..idx], current));
                start = idx;
            }
            _ => {}
        }
        in_digits = Some(digit);
    }
    if let Some(current) = in_digits {
        out.push(make_segment(&input[start..], current));
    }
    out
}

fn make_segment(text: &str, digits: bool) -> Segment<'_> {
    if digits {
        Segment::Number(text)
    } else {
        Segment::Text(text)
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        // lowercase sorts before uppercase when the letters match
        .then_with(|| b.cmp(a))
}

/// Numeric-aware string ordering: digit runs compare as numbers.
///
/// Text runs compare by lowercased code point, so punctuation does not sort
/// the way a locale collator would (`"a.1"` < `"a1"` here).
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l, r) {
            (Segment::Number(x), Segment::Number(y)) => compare_numbers(x, y),
            (Segment::Text(x), Segment::Text(y)) => compare_text(x, y),
            // digits sort before letters
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    left.len().cmp(&right.len())
}
