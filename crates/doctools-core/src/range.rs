//! Page-range expressions
//!
//! Turns user text like `"1-3, 5, 8-10"` into a sorted, deduplicated list of
//! 1-based page numbers bounded by the document's page count. Parsing is
//! lenient: malformed or out-of-range tokens are dropped, never reported.

use crate::error::ToolError;
use std::collections::BTreeSet;
use std::num::IntErrorKind;

/// Parse a page-range expression against a document of `total_pages` pages.
///
/// Never fails; an expression with no usable tokens yields an empty list.
pub fn parse_page_range(expression: &str, total_pages: u32) -> Vec<u32> {
    let mut pages = BTreeSet::new();
    let mut dropped = 0usize;

    for part in expression.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            // Span like "1-3"; both endpoints must be positive integers
            let (Some(start), Some(end)) = (parse_positive(start), parse_positive(end)) else {
                dropped += 1;
                continue;
            };

            // Clamp before iterating so "1-4000000000" stays cheap
            let hi = end.min(u64::from(total_pages));
            for page in start..=hi {
                pages.insert(page as u32);
            }
        } else {
            match parse_positive(part) {
                Some(page) if page <= u64::from(total_pages) => {
                    pages.insert(page as u32);
                }
                _ => dropped += 1,
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, expression, "ignored unusable page-range tokens");
    }

    pages.into_iter().collect()
}

/// Digit runs too long for `u64` saturate so they still clamp to the last page
fn parse_positive(token: &str) -> Option<u64> {
    let value = match token.trim().parse::<u64>() {
        Ok(n) => n,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => u64::MAX,
        Err(_) => return None,
    };
    (value >= 1).then_some(value)
}

/// A validated, ascending set of 1-based page numbers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageSelection {
    pages: Vec<u32>,
}

impl PageSelection {
    pub fn parse(expression: &str, total_pages: u32) -> Self {
        Self {
            pages: parse_page_range(expression, total_pages),
        }
    }

    /// Every page of a `total_pages` document
    pub fn all(total_pages: u32) -> Self {
        Self {
            pages: (1..=total_pages).collect(),
        }
    }

    pub fn pages(&self) -> &[u32] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Surface an empty selection as the user-facing validation failure
    pub fn require_non_empty(self) -> Result<Self, ToolError> {
        if self.pages.is_empty() {
            return Err(ToolError::validation("No valid pages selected"));
        }
        Ok(self)
    }
}

impl IntoIterator for PageSelection {
    type Item = u32;
    type IntoIter = std::vec::IntoIter<u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.pages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_full_span_selects_every_page() {
        assert_eq!(parse_page_range("1-5", 5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_singletons_sorted_ascending() {
        assert_eq!(parse_page_range("3,1,2", 5), vec![1, 2, 3]);
    }

    #[test]
    fn test_reversed_span_is_empty() {
        assert_eq!(parse_page_range("5-3", 5), Vec::<u32>::new());
    }

    #[test]
    fn test_overlap_collapses() {
        assert_eq!(parse_page_range("2,2,2-4", 10), vec![2, 3, 4]);
    }

    #[test]
    fn test_malformed_token_dropped() {
        assert_eq!(parse_page_range("abc,2", 5), vec![2]);
    }

    #[test]
    fn test_out_of_bounds_singleton_dropped() {
        assert_eq!(parse_page_range("100", 5), Vec::<u32>::new());
    }

    #[test]
    fn test_span_clipped_to_document() {
        assert_eq!(parse_page_range("4-9", 6), vec![4, 5, 6]);
    }

    #[test]
    fn test_whitespace_and_empty_tokens_ignored() {
        assert_eq!(parse_page_range(" 1 , , 3 - 4 ,", 10), vec![1, 3, 4]);
    }

    #[test]
    fn test_zero_and_negative_endpoints_drop_token() {
        assert_eq!(parse_page_range("0-3", 5), Vec::<u32>::new());
        assert_eq!(parse_page_range("-3", 5), Vec::<u32>::new());
        assert_eq!(parse_page_range("0", 5), Vec::<u32>::new());
    }

    #[test]
    fn test_extra_hyphen_drops_token() {
        assert_eq!(parse_page_range("1-2-3,5", 5), vec![5]);
    }

    #[test]
    fn test_huge_span_is_bounded() {
        assert_eq!(parse_page_range("2-4000000000", 3), vec![2, 3]);
    }

    #[test]
    fn test_endpoint_past_u32_still_clamps() {
        assert_eq!(parse_page_range("2-99999999999", 4), vec![2, 3, 4]);
        assert_eq!(
            parse_page_range("3-99999999999999999999999999", 4),
            vec![3, 4]
        );
        assert_eq!(parse_page_range("99999999999", 4), Vec::<u32>::new());
    }

    #[test]
    fn test_selection_require_non_empty() {
        let err = PageSelection::parse("x", 3).require_non_empty().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "No valid pages selected");

        let ok = PageSelection::parse("1,3", 3).require_non_empty().unwrap();
        assert_eq!(ok.pages(), &[1, 3]);
    }

    #[test]
    fn test_selection_all() {
        assert_eq!(PageSelection::all(4).pages(), &[1, 2, 3, 4]);
        assert!(PageSelection::all(0).is_empty());
    }

    proptest! {
        #[test]
        fn full_span_is_identity(total in 1u32..500) {
            let expected: Vec<u32> = (1..=total).collect();
            prop_assert_eq!(parse_page_range(&format!("1-{}", total), total), expected);
        }

        #[test]
        fn output_is_strictly_ascending_and_bounded(
            expr in "[0-9 ,\\-a-z]{0,40}",
            total in 0u32..60,
        ) {
            let pages = parse_page_range(&expr, total);
            prop_assert!(pages.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(pages.iter().all(|&p| p >= 1 && p <= total));
        }
    }
}
