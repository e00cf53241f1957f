//! Static instructions and knowledge loaded once at startup.
//!
//! The result is immutable and shared by reference with the engine.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

/// Persona used when no instructions file is configured.
pub const DEFAULT_PERSONA: &str = "\
你是一个专业的\"恋爱智能体\"，语气温柔、体贴，像一个知心朋友。

回答情感咨询时：
1. 先共情，再给出具体、可执行的建议。
2. 结合下方【核心知识库】中的课程和方法论；只有在相关时才推荐课程链接。
3. 如果使用了搜索结果，在回答末尾列出参考来源。

当用户需要约会计划、节日计划等文档时，调用 `create_date_plan` 生成文档，\
根据用户需求填充餐厅、活动流程和礼物清单，然后把返回的 artifact_id 告诉用户用于下载。";

/// Process-wide system instructions.
#[derive(Debug, Clone)]
pub struct Instructions {
    persona: String,
    knowledge: String,
}

impl Instructions {
    pub fn new(persona: impl Into<String>, knowledge: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            knowledge: knowledge.into(),
        }
    }

    /// Read the persona file (if any) and every knowledge document.
    ///
    /// Unreadable files are logged and skipped; startup never fails here.
    pub async fn load(persona_path: Option<&Path>, documents: &[PathBuf]) -> Self {
        let persona = match persona_path {
            Some(path) => match fs::read_to_string(path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "instructions file unreadable, using built-in persona");
                    DEFAULT_PERSONA.to_string()
                }
            },
            None => DEFAULT_PERSONA.to_string(),
        };

        let mut knowledge = String::new();
        let mut loaded = 0usize;
        for path in documents {
            match fs::read_to_string(path).await {
                Ok(text) => {
                    knowledge.push_str(&format!("\n\n--- 文档: {} ---\n{}", path.display(), text));
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "knowledge document not loaded");
                }
            }
        }

        info!(documents = loaded, chars = knowledge.chars().count(), "knowledge loaded");
        Self { persona, knowledge }
    }

    pub fn knowledge(&self) -> &str {
        &self.knowledge
    }

    /// Persona followed by the knowledge section.
    pub fn base_prompt(&self) -> String {
        if self.knowledge.trim().is_empty() {
            return self.persona.clone();
        }
        format!("{}\n\n【核心知识库内容】{}", self.persona, self.knowledge)
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn loads_present_documents_and_skips_missing() {
        let tmp = TempDir::new().unwrap();
        let single = tmp.path().join("单身篇.md");
        std::fs::write(&single, "# 单身\n如何脱单").unwrap();
        let missing = tmp.path().join("已婚篇.md");

        let instructions = Instructions::load(None, &[single, missing]).await;

        assert!(instructions.knowledge().contains("如何脱单"));
        assert!(instructions.knowledge().contains("--- 文档: "));
        assert!(!instructions.knowledge().contains("已婚篇"));
        assert!(instructions.base_prompt().starts_with(DEFAULT_PERSONA));
        assert!(instructions.base_prompt().contains("【核心知识库内容】"));
    }

    #[tokio::test]
    async fn custom_persona_replaces_default() {
        let tmp = TempDir::new().unwrap();
        let persona = tmp.path().join("persona.md");
        std::fs::write(&persona, "You are terse.").unwrap();

        let instructions = Instructions::load(Some(&persona), &[]).await;
        assert_eq!(instructions.base_prompt(), "You are terse.");
    }

    #[tokio::test]
    async fn unreadable_persona_falls_back() {
        let tmp = TempDir::new().unwrap();
        let instructions = Instructions::load(Some(&tmp.path().join("nope.md")), &[]).await;
        assert_eq!(instructions.base_prompt(), DEFAULT_PERSONA);
    }
}
