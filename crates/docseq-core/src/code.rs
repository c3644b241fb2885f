//! # Document Codes
//!
//! Rendering and parsing of the human-readable codes handed to callers.
//!
//! ## Layout
//! ```text
//!   PO-2501-0042            SA-JKT-2501-0001
//!   ── ──── ────            ── ─── ──── ────
//!   │   │    └ sequence     │   │   │    └ sequence (min 4 digits)
//!   │   └ yymm              │   │   └ yymm
//!   └ prefix                │   └ branch initial
//!                           └ prefix
//! ```
//! Only the last two `-` tokens carry meaning when a code comes back from a
//! caller; everything before them is the head.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::Period;
use crate::SEQUENCE_WIDTH;

/// Renders a document code.
///
/// `branch_initial` is `Some` only for branch-scoped buckets.
pub fn format_code(
    prefix_code: &str,
    branch_initial: Option<&str>,
    period: Period,
    sequence_number: i64,
) -> String {
    match branch_initial {
        Some(initial) => format!(
            "{}-{}-{}-{:0width$}",
            prefix_code,
            initial,
            period.yymm(),
            sequence_number,
            width = SEQUENCE_WIDTH
        ),
        None => format!(
            "{}-{}-{:0width$}",
            prefix_code,
            period.yymm(),
            sequence_number,
            width = SEQUENCE_WIDTH
        ),
    }
}

/// A code split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCode {
    /// Everything before the period token, e.g. "SA-JKT".
    pub head: String,
    pub period: Period,
    pub sequence_number: i64,
}

/// Parses a code produced by [`format_code`].
///
/// ## Errors
/// `ValidationError::InvalidFormat` when the code does not end in
/// `-yymm-NNNN`.
pub fn parse_code(code: &str) -> Result<ParsedCode, ValidationError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    let mut tokens = code.rsplitn(3, '-');
    let sequence = tokens.next().unwrap_or_default();
    let yymm = tokens
        .next()
        .ok_or_else(|| ValidationError::invalid_format("code", "missing period"))?;
    let head = tokens
        .next()
        .filter(|head| !head.is_empty())
        .ok_or_else(|| ValidationError::invalid_format("code", "missing prefix"))?;

    if sequence.len() < SEQUENCE_WIDTH || !sequence.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::invalid_format(
            "code",
            format!("sequence '{}' is not a {}+ digit number", sequence, SEQUENCE_WIDTH),
        ));
    }
    let sequence_number: i64 = sequence
        .parse()
        .map_err(|_| ValidationError::invalid_format("code", "sequence out of range"))?;
    if sequence_number <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "code.sequence".to_string(),
        });
    }

    if yymm.len() != 4 || !yymm.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::invalid_format(
            "code",
            format!("period '{}' is not yymm", yymm),
        ));
    }
    let (yy, mm) = yymm.split_at(2);
    let year = 2000 + yy.parse::<i32>().unwrap_or_default();
    let month = mm.parse::<u32>().unwrap_or_default();
    let period = Period::new(year, month)
        .map_err(|e| ValidationError::invalid_format("code", e.to_string()))?;

    Ok(ParsedCode {
        head: head.to_string(),
        period,
        sequence_number,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
