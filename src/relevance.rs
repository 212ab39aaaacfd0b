//! Relevancy gate for handler output
//!
//! Pure string checks, no I/O. Generic answers pass on length alone;
//! answers to financial questions must also carry financial data markers.

/// Phrases that mark a candidate as a failure narration, not an answer.
const NEGATIVE_MARKERS: &[&str] = &["error", "not found", "no data", "unavailable", "failed"];

/// Query vocabulary that makes a question financial.
const FINANCIAL_QUERY_TERMS: &[&str] = &[
    "stock", "price", "market", "earnings", "revenue", "cap", "trading",
];

/// At least one of these must appear in an answer to a financial question.
const FINANCIAL_DATA_MARKERS: &[&str] = &[
    "$", "%", "trading", "market cap", "revenue", "earnings", "shares",
];

/// Minimum candidate length (chars, after trimming) to be considered at all.
const MIN_CANDIDATE_CHARS: usize = 10;

/// Whether `candidate` plausibly answers `query`.
pub fn is_relevant(query: &str, candidate: &str) -> bool {
    if candidate.trim().chars().count() < MIN_CANDIDATE_CHARS {
        return false;
    }

    let candidate_lower = candidate.to_lowercase();
    if NEGATIVE_MARKERS
        .iter()
        .any(|marker| candidate_lower.contains(marker))
    {
        return false;
    }

    let query_lower = query.to_lowercase();
    if FINANCIAL_QUERY_TERMS
        .iter()
        .any(|term| query_lower.contains(term))
    {
        return FINANCIAL_DATA_MARKERS
            .iter()
            .any(|marker| candidate_lower.contains(marker));
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_financial_answer_with_markers_is_relevant() {
        assert!(is_relevant(
            "What is Tesla's stock price?",
            "TSLA is trading at $245.10, up 1.2%"
        ));
    }

    #[test]
    fn test_financial_query_without_markers_is_rejected() {
        assert!(!is_relevant("What is Tesla's stock price?", "I like Tesla cars"));
    }

    #[test]
    fn test_short_candidates_are_rejected() {
        assert!(!is_relevant("anything", "  ok  "));
        assert!(!is_relevant("anything", ""));
    }

    #[test]
    fn test_negative_markers_are_rejected() {
        assert!(!is_relevant(
            "How did the market open?",
            "An error occurred while fetching the requested data."
        ));
        assert!(!is_relevant(
            "AAPL price?",
            "No data available for the requested symbol at this time."
        ));
    }

    #[test]
    fn test_generic_query_accepts_generic_answer() {
        assert!(is_relevant(
            "How are you today?",
            "Doing well, thanks for asking! How can I help with your finances?"
        ));
    }

    #[test]
    fn test_percent_alone_satisfies_financial_marker() {
        assert!(is_relevant(
            "How is the market doing?",
            "Major indices closed higher, with the S&P 500 gaining 0.8% on the day."
        ));
    }
}
