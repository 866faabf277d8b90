//! Placeholder social post drafting. Nothing is generated; the request is
//! echoed into a fixed template.

pub const DEFAULT_TONE: &str = "neutral";
pub const NO_KEYWORDS: &str = "none";

pub fn social_post_draft(topic: &str, tone: Option<&str>, keywords: Option<&[String]>) -> String {
    let tone = tone.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TONE);
    let keywords = keywords
        .map(|k| k.join(", "))
        .unwrap_or_else(|| NO_KEYWORDS.to_string());

    format!(
        "AI-generated draft for a social media post on \"{topic}\"\n    \
         Tone: {tone}\n    \
         Keywords: {keywords}\n\
         \n    \
         ---\n    \
         Draft Content:\n    \
         [Placeholder for AI generated social media post content based on topic, tone, and keywords.]\n    \
         ---"
    )
}
