//! Deterministic token and cost estimation

/// Characters per token assumed by the estimator
pub const CHARS_PER_TOKEN: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl TokenEstimate {
    pub fn total(&self) -> u64 {
        self.tokens_in.saturating_add(self.tokens_out)
    }
}

/// Estimate tokens for a document. Output is assumed to be as long as input.
pub fn estimate_tokens(text: &str) -> TokenEstimate {
    let tokens_in = count_tokens(text);
    TokenEstimate {
        tokens_in,
        tokens_out: tokens_in,
    }
}

/// `ceil(chars / 4)`, counting Unicode scalar values
pub fn count_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// `ceil(tokens / 1000) * rate_per_thousand`, saturating at `i64::MAX`
pub fn cost_for_tokens(tokens: u64, rate_per_thousand: u64) -> i64 {
    let cost = tokens.div_ceil(1000).saturating_mul(rate_per_thousand);
    i64::try_from(cost).unwrap_or(i64::MAX)
}

/// Cost of actual usage, never above what was reserved
pub fn capped_cost(tokens: u64, rate_per_thousand: u64, reserved: i64) -> i64 {
    cost_for_tokens(tokens, rate_per_thousand).min(reserved)
}
