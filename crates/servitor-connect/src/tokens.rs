//! Token cost estimation.
//!
//! Admission needs a cost before the provider reports real usage, so the
//! prompt is estimated at roughly four characters per token plus a fixed
//! per-message overhead.  The throttle lease is settled with the reported
//! figure afterwards.

/// Characters per token for English-like text.
const CHARS_PER_TOKEN: usize = 4;

/// Role and framing tokens added to every chat message.
const MESSAGE_OVERHEAD: u64 = 4;

/// Tokens that prime the assistant reply.
const REPLY_PRIMER: u64 = 3;

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

/// Estimate the input cost of sending `prompt` as one user message.
pub fn estimate_prompt_cost(prompt: &str) -> u64 {
    estimate_tokens(prompt) + MESSAGE_OVERHEAD + REPLY_PRIMER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn prompt_cost_includes_overhead() {
        assert_eq!(estimate_prompt_cost(""), 7);
        assert_eq!(estimate_prompt_cost("Q: what day is it?\nA:"), 6 + 7);
    }
}
