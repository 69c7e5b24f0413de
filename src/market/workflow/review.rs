// SPDX-License-Identifier: MIT

//! Reviewer verdict parsing
//!
//! The reviewer model answers in free text. Any occurrence of
//! [`APPROVAL_MARKER`] means approval; anything else is a rejection whose
//! feedback is the text with [`REJECTION_MARKER`] removed and trimmed.
//! The feedback may end up empty and still counts as a rejection.

pub const APPROVAL_MARKER: &str = "APPROVED";
pub const REJECTION_MARKER: &str = "REJECTED";

/// Outcome of one review
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected(String),
}

impl Verdict {
    /// Interpret the reviewer's raw judgment
    pub fn parse(text: &str) -> Self {
        if text.contains(APPROVAL_MARKER) {
            return Verdict::Approved;
        }
        Verdict::Rejected(text.replace(REJECTION_MARKER, "").trim().to_string())
    }
}
