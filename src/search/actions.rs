//! Keyword-driven follow-up suggestions

use serde::Serialize;

/// A follow-up link offered alongside an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedAction {
    pub description: &'static str,
    pub url: &'static str,
}

struct ActionRule {
    phrases: &'static [&'static str],
    action: SuggestedAction,
}

const CATALOG: &[ActionRule] = &[
    ActionRule {
        phrases: &["contact"],
        action: SuggestedAction {
            description: "Visit our Contact Us page",
            url: "/contact",
        },
    },
    ActionRule {
        phrases: &["support"],
        action: SuggestedAction {
            description: "Get technical support",
            url: "/support",
        },
    },
    ActionRule {
        phrases: &["pricing"],
        action: SuggestedAction {
            description: "View pricing plans",
            url: "/pricing",
        },
    },
    ActionRule {
        phrases: &["download report", "annual report"],
        action: SuggestedAction {
            description: "Download the latest annual report",
            url: "/reports/latest.pdf",
        },
    },
    ActionRule {
        phrases: &["register"],
        action: SuggestedAction {
            description: "Register for an account",
            url: "/register",
        },
    },
    ActionRule {
        phrases: &["sign up", "newsletter"],
        action: SuggestedAction {
            description: "Sign up for our newsletter",
            url: "/newsletter",
        },
    },
    ActionRule {
        phrases: &["features"],
        action: SuggestedAction {
            description: "Explore product features",
            url: "/features",
        },
    },
    ActionRule {
        phrases: &["about us"],
        action: SuggestedAction {
            description: "Learn more About Us",
            url: "/about",
        },
    },
];

/// Suggest follow-up actions for a question and its answer.
///
/// Matching is a case-insensitive substring test over both texts. Each catalog
/// entry is offered at most once, in catalog order.
pub fn suggest_actions(question: &str, answer: &str) -> Vec<SuggestedAction> {
    let haystack = format!("{} {}", question, answer).to_lowercase();
    CATALOG
        .iter()
        .filter(|rule| rule.phrases.iter().any(|p| haystack.contains(p)))
        .map(|rule| rule.action.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match() {
        assert!(suggest_actions("What does the company do?", "It makes widgets.").is_empty());
    }

    #[test]
    fn test_matches_question_and_answer_in_catalog_order() {
        let actions = suggest_actions(
            "How much does PRICING cost?",
            "See the features page or contact sales.",
        );
        let urls: Vec<_> = actions.iter().map(|a| a.url).collect();
        assert_eq!(urls, vec!["/contact", "/pricing", "/features"]);
    }

    #[test]
    fn test_each_action_offered_once() {
        let actions = suggest_actions(
            "Where is the annual report?",
            "You can download report files from the annual report page.",
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].url, "/reports/latest.pdf");

        let actions = suggest_actions("Can I sign up for the newsletter?", "");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].description, "Sign up for our newsletter");
    }
}
