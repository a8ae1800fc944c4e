//! @-mention expansion

use crate::post::Mention;
use regex::{NoExpand, RegexBuilder};
use tracing::{debug, warn};

/// Replace every `@screen_name` in `text` with the mention's display name
///
/// Matching ignores case. Mentions are applied in order, each one over the
/// output of the previous, so a display name containing another mention's
/// handle is rewritten again by the later mention.
///
/// Returns `None` only when there is no text to expand.
pub fn expand_mentions(text: Option<&str>, mentions: &[Mention]) -> Option<String> {
    let mut text = text?.to_string();

    if text.is_empty() || mentions.is_empty() {
        return Some(text);
    }

    for mention in mentions {
        let handle = format!("@{}", mention.screen_name);
        let pattern = match RegexBuilder::new(&regex::escape(&handle))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!("Skipping mention {}: {}", handle, e);
                continue;
            }
        };

        debug!("Expanding mention: {} {}", handle, mention.display_name);
        text = pattern
            .replace_all(&text, NoExpand(&mention.display_name))
            .into_owned();
    }

    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(screen_name: &str, display_name: &str) -> Mention {
        Mention {
            screen_name: screen_name.to_string(),
            display_name: display_name.to_string(),
        }
    }

    #[test]
    fn test_expands_mention() {
        let text = "Thank you @realDonaldTrump for the support!";
        let expanded =
            expand_mentions(Some(text), &[mention("realDonaldTrump", "Donald J. Trump")]);
        assert_eq!(
            expanded.as_deref(),
            Some("Thank you Donald J. Trump for the support!")
        );
    }

    #[test]
    fn test_case_insensitive() {
        let expanded = expand_mentions(
            Some("@FORD and @ford"),
            &[mention("Ford", "Ford Motor Company")],
        );
        assert_eq!(
            expanded.as_deref(),
            Some("Ford Motor Company and Ford Motor Company")
        );
    }

    #[test]
    fn test_no_mentions_is_identity() {
        let text = "Boeing is building a brand new 747";
        assert_eq!(expand_mentions(Some(text), &[]).as_deref(), Some(text));
    }

    #[test]
    fn test_no_match_is_unchanged() {
        let text = "Nothing to see here";
        assert_eq!(
            expand_mentions(Some(text), &[mention("Boeing", "Boeing")]).as_deref(),
            Some(text)
        );
    }

    #[test]
    fn test_empty_and_absent_text() {
        assert_eq!(
            expand_mentions(Some(""), &[mention("a", "b")]).as_deref(),
            Some("")
        );
        assert_eq!(expand_mentions(None, &[mention("a", "b")]), None);
    }

    #[test]
    fn test_display_name_inserted_literally() {
        let expanded = expand_mentions(Some("hi @acme"), &[mention("acme", "$1 Acme\\0")]);
        assert_eq!(expanded.as_deref(), Some("hi $1 Acme\\0"));
    }

    #[test]
    fn test_sequential_replacement_is_order_dependent() {
        let mentions = [mention("first", "see @second"), mention("second", "Second Co")];
        assert_eq!(
            expand_mentions(Some("@first"), &mentions).as_deref(),
            Some("see Second Co")
        );

        let reversed = [mention("second", "Second Co"), mention("first", "see @second")];
        assert_eq!(
            expand_mentions(Some("@first"), &reversed).as_deref(),
            Some("see @second")
        );
    }
}
