//! Message composition

use crate::company::CompanyRecord;

/// Longest message the platform accepts, in characters
pub const MAX_MESSAGE_LENGTH: usize = 140;

const BULLISH: &str = "\u{1F4C8}";
const BEARISH: &str = "\u{1F4C9}";
const NEUTRAL: &str = "\u{1F340}";
const ELLIPSIS: char = '\u{2026}';

/// Glyph for a sentiment score; absent and zero are neutral
pub fn sentiment_glyph(sentiment: Option<f64>) -> &'static str {
    match sentiment {
        Some(score) if score > 0.0 => BULLISH,
        Some(score) if score < 0.0 => BEARISH,
        _ => NEUTRAL,
    }
}

struct Group<'a> {
    name: &'a str,
    tickers: Vec<&'a str>,
    sentiment: Option<f64>,
}

/// Build the message for a set of companies and the post they came from
///
/// One line per company name, e.g. `Ford 📈 $F`, followed by the permalink.
/// Over-long company lines are cut and end with `…`; the permalink always
/// survives intact.
pub fn compose(companies: &[CompanyRecord], permalink: &str) -> String {
    let mut groups: Vec<Group<'_>> = Vec::new();

    for company in companies {
        let Some(ticker) = company.ticker() else {
            continue;
        };
        let name = company.name.as_deref().unwrap_or(ticker);

        match groups.iter_mut().find(|group| group.name == name) {
            Some(group) => {
                group.tickers.push(ticker);
                group.sentiment = company.sentiment;
            }
            None => groups.push(Group {
                name,
                tickers: vec![ticker],
                sentiment: company.sentiment,
            }),
        }
    }

    let lines = groups
        .iter()
        .map(|group| {
            let tickers = group
                .tickers
                .iter()
                .map(|ticker| format!("${ticker}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{} {} {}", group.name, sentiment_glyph(group.sentiment), tickers)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let link_len = permalink.chars().count();
    let lines = if lines.chars().count() + 1 + link_len > MAX_MESSAGE_LENGTH {
        let keep = MAX_MESSAGE_LENGTH.saturating_sub(link_len + 2);
        let mut cut: String = lines.chars().take(keep).collect();
        cut.push(ELLIPSIS);
        cut
    } else {
        lines
    };

    format!("{lines}\n{permalink}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://twitter.com/realDonaldTrump/status/806134244384899072";

    fn record(name: &str, ticker: &str, sentiment: Option<f64>) -> CompanyRecord {
        CompanyRecord::new(name, ticker, "New York Stock Exchange").with_sentiment(sentiment)
    }

    #[test]
    fn test_glyphs() {
        assert_eq!(sentiment_glyph(Some(0.3)), "📈");
        assert_eq!(sentiment_glyph(Some(-0.3)), "📉");
        assert_eq!(sentiment_glyph(Some(0.0)), "🍀");
        assert_eq!(sentiment_glyph(None), "🍀");
    }

    #[test]
    fn test_single_company() {
        let text = compose(&[record("Boeing", "BA", Some(-0.1))], LINK);
        assert_eq!(text, format!("Boeing 📉 $BA\n{LINK}"));
    }

    #[test]
    fn test_groups_by_name_with_last_sentiment() {
        let companies = vec![
            record("Alphabet", "GOOGL", Some(0.0)),
            record("Ford", "F", Some(0.6)),
            record("Alphabet", "GOOG", Some(0.4)),
        ];

        let text = compose(&companies, LINK);
        assert_eq!(text, format!("Alphabet 📈 $GOOGL $GOOG\nFord 📈 $F\n{LINK}"));
    }

    #[test]
    fn test_missing_name_falls_back_to_ticker() {
        let company = CompanyRecord {
            ticker: Some("XYZ".to_string()),
            ..CompanyRecord::default()
        };
        assert_eq!(compose(&[company], LINK), format!("XYZ 🍀 $XYZ\n{LINK}"));
    }

    #[test]
    fn test_truncates_to_limit_and_keeps_permalink() {
        let companies: Vec<CompanyRecord> = (0..12)
            .map(|i| record(&format!("Company Number {i}"), &format!("C{i}"), Some(0.2)))
            .collect();

        let text = compose(&companies, LINK);
        assert_eq!(text.chars().count(), MAX_MESSAGE_LENGTH);
        assert!(text.ends_with(&format!("…\n{LINK}")));
    }

    #[test]
    fn test_exact_limit_is_not_truncated() {
        // "Name 🍀 $T" style line padded so line + newline + link is exactly 140
        let prefix_len = MAX_MESSAGE_LENGTH - 1 - LINK.chars().count();
        let fixed = " 🍀 $T".chars().count();
        let name = "N".repeat(prefix_len - fixed);

        let text = compose(&[record(&name, "T", None)], LINK);
        assert_eq!(text.chars().count(), MAX_MESSAGE_LENGTH);
        assert!(!text.contains('…'));
    }
}
