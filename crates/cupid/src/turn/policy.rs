//! Mandatory-search policy.
//!
//! The model cannot be forced to call search before answering, so the rule
//! is carried two ways: a prompt directive when search is required, and a
//! post-turn check of whether it actually happened.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::capability::SEARCH_CAPABILITY;

/// Appended to the system prompt when the message needs a search first.
pub const MANDATORY_SEARCH_DIRECTIVE: &str = "\
【重要指令】这条消息涉及具体问题。回答之前你必须先调用 `search` 工具，\
搜索最新的心理学观点、类似案例或相关数据，再结合核心知识库作答，并在回答末尾列出参考来源。";

/// Added instead when the message is only a greeting.
pub const GREETING_DIRECTIVE: &str = "用户只是在打招呼或寒暄，不需要搜索，直接温柔回应即可。";

/// Social openers and filler that carry no question on their own.
/// Longer entries must come before their prefixes.
const GREETING_TOKENS: &[&str] = &[
    // zh
    "你好吗", "你好", "您好", "哈喽", "哈啰", "嗨", "在不在", "在吗", "在么", "在嘛",
    "早上好", "中午好", "下午好", "晚上好", "早安", "午安", "晚安", "谢谢你", "谢谢",
    "多谢", "感谢", "拜拜", "再见", "哈哈", "嘿嘿", "嘻嘻", "好的", "收到", "嗯", "哦",
    "噢", "啊", "呀", "呢", "啦", "哇", "喂", "嘿", "哈",
    // en
    "goodmorning", "goodafternoon", "goodevening", "goodnight", "howareyou", "thankyou",
    "thanks", "hello", "hiya", "hey", "hi", "there", "bye", "okay", "ok", "thx", "yo",
];

/// Outcome of the post-turn check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub search_required: bool,
    pub search_invoked: bool,
}

impl PolicyVerdict {
    #[must_use]
    pub fn satisfied(&self) -> bool {
        !self.search_required || self.search_invoked
    }
}

#[derive(Default)]
pub struct TurnPolicy {
    /// Capabilities recorded per in-flight turn.
    invocations: DashMap<String, HashSet<String>>,
}

impl TurnPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the message must be answered with search.
    ///
    /// False only when the text is made up entirely of greetings and
    /// filler. Anything else, however short, counts as substantive.
    #[must_use]
    pub fn requires_capability(&self, message: &str) -> bool {
        is_substantive(message)
    }

    /// Prompt directive matching [`requires_capability`](Self::requires_capability).
    #[must_use]
    pub fn directive(&self, required: bool) -> &'static str {
        if required {
            MANDATORY_SEARCH_DIRECTIVE
        } else {
            GREETING_DIRECTIVE
        }
    }

    /// Note that `capability` ran during `turn_id`. Repeats are no-ops.
    pub fn record_invocation(&self, turn_id: &str, capability: &str) {
        let first = self
            .invocations
            .entry(turn_id.to_string())
            .or_default()
            .insert(capability.to_string());
        if first {
            debug!(turn_id, capability, "capability recorded for turn");
        }
    }

    #[must_use]
    pub fn was_invoked(&self, turn_id: &str, capability: &str) -> bool {
        self.invocations
            .get(turn_id)
            .is_some_and(|set| set.contains(capability))
    }

    /// Close the turn's record and report whether the rule held.
    pub fn finish_turn(&self, turn_id: &str, search_required: bool) -> PolicyVerdict {
        let search_invoked = self
            .invocations
            .remove(turn_id)
            .is_some_and(|(_, set)| set.contains(SEARCH_CAPABILITY));

        let verdict = PolicyVerdict {
            search_required,
            search_invoked,
        };
        if !verdict.satisfied() {
            warn!(turn_id, "turn answered without the mandatory search");
        }
        verdict
    }

    /// Turns currently holding a record.
    pub fn open_turns(&self) -> usize {
        self.invocations.len()
    }
}

fn is_substantive(message: &str) -> bool {
    let normalized: String = message
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    let mut rest = normalized.as_str();
    while !rest.is_empty() {
        match GREETING_TOKENS.iter().find(|token| rest.starts_with(**token)) {
            Some(token) => rest = &rest[token.len()..],
            None => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_do_not_require_search() {
        let policy = TurnPolicy::new();
        for greeting in [
            "你好", "你好！", "在吗?", "在吗在吗", "您好呀~", "早上好", "谢谢你啦",
            "Hi there!", "hello", "  ", "😊", "哈哈哈",
        ] {
            assert!(!policy.requires_capability(greeting), "{greeting:?} classified as substantive");
        }
    }

    #[test]
    fn questions_require_search() {
        let policy = TurnPolicy::new();
        for question in [
            "最近和对象吵架了",
            "你好，我和女朋友冷战三天了怎么办",
            "在吗？想问下异地恋怎么维持",
            "早恋怎么办",
            "hi, how do I apologize?",
            "帮我做个七夕约会计划",
        ] {
            assert!(policy.requires_capability(question), "{question:?} classified as greeting");
        }
    }

    #[test]
    fn punctuation_only_is_treated_as_silence() {
        assert!(!TurnPolicy::new().requires_capability("?!…"));
    }

    #[test]
    fn record_invocation_is_idempotent() {
        let policy = TurnPolicy::new();
        policy.record_invocation("turn_1", "search");
        policy.record_invocation("turn_1", "search");

        assert!(policy.was_invoked("turn_1", "search"));
        assert!(!policy.was_invoked("turn_2", "search"));

        let verdict = policy.finish_turn("turn_1", true);
        assert!(verdict.search_invoked);
        assert!(verdict.satisfied());
        assert_eq!(policy.open_turns(), 0);
    }

    #[test]
    fn verdict_flags_missing_search() {
        let policy = TurnPolicy::new();
        policy.record_invocation("turn_1", "create_date_plan");

        let verdict = policy.finish_turn("turn_1", true);
        assert!(!verdict.search_invoked);
        assert!(!verdict.satisfied());

        let greeting = policy.finish_turn("turn_2", false);
        assert!(greeting.satisfied());
    }

    #[test]
    fn directive_follows_requirement() {
        let policy = TurnPolicy::new();
        assert_eq!(policy.directive(true), MANDATORY_SEARCH_DIRECTIVE);
        assert_eq!(policy.directive(false), GREETING_DIRECTIVE);
    }
}
