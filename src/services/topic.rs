// src/services/topic.rs
use crate::message::Message;

pub const RADIOLOGY_KEYWORDS: &[&str] = &[
    "x-ray",
    "ct",
    "mri",
    "ultrasound",
    "imaging",
    "radiograph",
    "contrast",
    "scan",
    "radiation",
    "radiology",
    "diagnostic",
    "image",
    "finding",
    "protocol",
    "interpretation",
    "report",
];

pub const WELCOME_MESSAGE: &str = "# Welcome to AI Radiology Assistant

I specialize in medical imaging interpretation and can help you with:

## Key Areas
• Imaging protocol selection
• Scan interpretation guidelines
• Radiation safety considerations
• Diagnostic recommendations

How can I assist with your medical imaging needs today?";

pub const WELCOME_SUGGESTIONS: &[&str] = &[
    "What imaging is best for suspected fractures?",
    "Explain CT scan radiation risks",
    "Compare MRI vs CT advantages",
    "Review chest X-ray protocols",
];

pub const REDIRECT_MESSAGE: &str = "I specialize in radiology and medical imaging. Please ask \
me about image interpretation, protocols, or radiation safety. How can I assist with your \
medical imaging needs?";

pub const REDIRECT_SUGGESTIONS: &[&str] = &[
    "X-ray interpretation",
    "CT protocols",
    "MRI guidelines",
    "Radiation safety",
];

pub const FALLBACK_MESSAGE: &str = "I apologize, but I'm having trouble processing your \
request. Please try rephrasing your question about medical imaging.";

pub const FALLBACK_SUGGESTIONS: &[&str] = &[
    "Basic image interpretation",
    "Imaging protocols",
    "Safety guidelines",
];

pub const FOLLOW_UP_SUGGESTIONS: &[&str] = &[
    "Detailed imaging findings",
    "Recommended follow-up",
    "Alternative imaging options",
    "Clinical correlation",
];

pub type TopicFilter = fn(&str) -> bool;
pub type SuggestionFn = fn(&str) -> Vec<String>;

/// Keywords from [`RADIOLOGY_KEYWORDS`] found in `text`, case-insensitive.
pub fn matched_keywords(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    RADIOLOGY_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect()
}

pub fn is_radiology_related(text: &str) -> bool {
    let lower = text.to_lowercase();
    RADIOLOGY_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Static follow-ups; the reply text is not inspected.
pub fn follow_up_suggestions(_reply: &str) -> Vec<String> {
    to_strings(FOLLOW_UP_SUGGESTIONS)
}

pub fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// How a chat session decides what to forward and what to suggest next.
#[derive(Clone, Copy, Debug)]
pub struct ChatPolicy {
    pub topic_filter: Option<TopicFilter>,
    pub suggestions: SuggestionFn,
}

impl Default for ChatPolicy {
    fn default() -> Self {
        Self::radiology()
    }
}

impl ChatPolicy {
    pub fn radiology() -> Self {
        Self {
            topic_filter: Some(is_radiology_related),
            suggestions: follow_up_suggestions,
        }
    }

    /// Forwards everything to the model.
    pub fn unfiltered() -> Self {
        Self {
            topic_filter: None,
            ..Self::radiology()
        }
    }

    pub fn accepts(&self, text: &str) -> bool {
        self.topic_filter.is_none_or(|filter| filter(text))
    }

    pub fn welcome(&self) -> Message {
        Message::assistant(WELCOME_MESSAGE, to_strings(WELCOME_SUGGESTIONS))
    }

    pub fn redirect(&self) -> Message {
        Message::assistant(REDIRECT_MESSAGE, to_strings(REDIRECT_SUGGESTIONS))
    }

    pub fn fallback(&self) -> Message {
        Message::assistant(FALLBACK_MESSAGE, to_strings(FALLBACK_SUGGESTIONS))
    }

    pub fn reply(&self, text: String) -> Message {
        let suggestions = (self.suggestions)(&text);
        Message::assistant(text, suggestions)
    }
}
