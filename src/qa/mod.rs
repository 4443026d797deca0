//! 질의응답 체인
//!
//! 질문 임베딩 → 컬렉션에서 상위 k개 청크 검색 → 프롬프트에 채워 넣기 → 채팅 모델 호출.
//! 답변과 함께 근거 청크를 반환합니다.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::QaConfig;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{SearchResult, VectorStore};
use crate::llm::ChatModel;

/// 기본 프롬프트 템플릿 (`{context}`, `{question}` 치환)
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a helpful Android Feedback Assistant. \
Use the following user comments to answer the question.
If the answer is not in the context, state that clearly.
Context provided:
{context}

Question: {question}
Answer:";

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

// ============================================================================
// PromptTemplate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// 두 자리 표시자가 모두 있어야 함
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                bail!("Prompt template is missing {}", placeholder);
            }
        }
        Ok(Self { template })
    }

    /// 템플릿을 한 번만 훑으며 치환 (삽입된 값은 다시 치환하지 않음)
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [
                (rest.find(CONTEXT_PLACEHOLDER), CONTEXT_PLACEHOLDER, context),
                (rest.find(QUESTION_PLACEHOLDER), QUESTION_PLACEHOLDER, question),
            ]
            .into_iter()
            .filter_map(|(pos, placeholder, value)| pos.map(|p| (p, placeholder, value)))
            .min_by_key(|(pos, _, _)| *pos);

            let Some((pos, placeholder, value)) = next else {
                out.push_str(rest);
                return out;
            };
            out.push_str(&rest[..pos]);
            out.push_str(value);
            rest = &rest[pos + placeholder.len()..];
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

// ============================================================================
// QaChain
// ============================================================================

/// 답변 + 근거 청크
#[derive(Debug, Clone)]
pub struct QaAnswer {
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

pub struct QaChain {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    template: PromptTemplate,
    top_k: usize,
}

impl QaChain {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        config: &QaConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            embedder,
            chat,
            template: config.template.clone(),
            top_k: config.top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn ask(&self, question: &str) -> Result<QaAnswer> {
        let query_embedding = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        let sources = self
            .store
            .search(&query_embedding, self.top_k)
            .await
            .context("Failed to retrieve context")?;

        tracing::debug!("Retrieved {} chunks for question", sources.len());

        let context = sources
            .iter()
            .map(|s| s.chunk_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.template.render(&context, question);

        let answer = self
            .chat
            .generate(&prompt)
            .await
            .with_context(|| format!("{} failed to answer", self.chat.name()))?;

        Ok(QaAnswer { answer, sources })
    }
}

// ============================================================================
// Tests
// ============================================================================
