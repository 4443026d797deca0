//! Reddit 데이터 모델
//!
//! - 도메인 타입: [`Thread`], [`Comment`] (캐시/인덱싱에 그대로 직렬화)
//! - API 경계 타입: [`Submission`], [`CommentNode`], [`MoreStub`]
//! - 원시 응답 타입: Reddit 리스팅 JSON (`kind` + `data`)
//!
//! 원시 JSON은 클라이언트 경계에서 한 번만 타입으로 변환하고,
//! 그 이후로는 타입이 정해진 값만 흘려보냅니다.

use serde::{Deserialize, Serialize};

/// 삭제/제거된 댓글 본문 표시
pub const REMOVED_MARKERS: [&str; 2] = ["[removed]", "[deleted]"];

/// 댓글이 없는 스레드의 대체 댓글 본문
pub const COMMENTS_DISABLED: &str = "Comments are disabled!";

// ============================================================================
// Domain Types
// ============================================================================

/// 스레드 댓글 (본문만 보존)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub body: String,
}

impl Comment {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// 댓글 없음 대체 댓글
    pub fn disabled() -> Self {
        Self::new(COMMENTS_DISABLED)
    }

    /// 보존 대상 본문인지 확인 (`[removed]`, `[deleted]` 제외)
    pub fn is_retained(body: &str) -> bool {
        !REMOVED_MARKERS.contains(&body)
    }
}

/// 게시물 + 평탄화된 댓글 목록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub title: String,
    pub text: String,
    pub comments: Vec<Comment>,
}

// ============================================================================
// API Boundary Types
// ============================================================================

/// 검색/조회로 얻은 게시물
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// base36 ID (예: `1abcde`)
    pub id: String,
    pub title: String,
    pub selftext: String,
    pub num_comments: u64,
    pub flair: Option<String>,
    pub permalink: String,
}

impl Submission {
    /// fullname (`t3_<id>`)
    pub fn fullname(&self) -> String {
        format!("t3_{}", self.id)
    }
}

/// 댓글 트리 노드
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentNode {
    Comment(CommentEntry),
    /// "더 보기" / "이 스레드 계속" 스텁
    More(MoreStub),
}

/// 댓글 하나와 그 답글들
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEntry {
    /// base36 ID
    pub id: String,
    /// 부모 fullname (`t1_...` 또는 `t3_...`)
    pub parent_id: String,
    pub body: Option<String>,
    pub replies: Vec<CommentNode>,
}

impl CommentEntry {
    pub fn fullname(&self) -> String {
        format!("t1_{}", self.id)
    }
}

/// 접힌 댓글 스텁
///
/// `children`이 비어 있으면 "이 스레드 계속" 링크입니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreStub {
    pub id: String,
    pub parent_id: String,
    pub count: u64,
    pub children: Vec<String>,
}

impl MoreStub {
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }
}

// ============================================================================
// Raw Reddit JSON
// ============================================================================

/// 리스팅 (`{"kind": "Listing", "data": {...}}`)
#[derive(Debug, Deserialize)]
pub(crate) struct Listing {
    pub(crate) data: ListingData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListingData {
    #[serde(default)]
    pub(crate) after: Option<String>,
    #[serde(default)]
    pub(crate) children: Vec<RawThing>,
}

/// 종류 미확정 항목 (`t1`, `t3`, `more`, ...)
#[derive(Debug, Deserialize)]
pub(crate) struct RawThing {
    pub(crate) kind: String,
    pub(crate) data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    body: Option<String>,
    /// 답글이 없으면 빈 문자열, 있으면 리스팅 객체
    #[serde(default)]
    replies: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawMore {
    id: String,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    count: u64,
    #[serde(default)]
    children: Vec<String>,
}

/// `/api/morechildren` 응답
#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenResponse {
    pub(crate) json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenJson {
    #[serde(default)]
    pub(crate) errors: Vec<serde_json::Value>,
    #[serde(default)]
    pub(crate) data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoreChildrenData {
    #[serde(default)]
    pub(crate) things: Vec<RawThing>,
}

impl RawThing {
    /// 게시물(`t3`)로 변환, 다른 종류면 `None`
    pub(crate) fn into_submission(self) -> Result<Option<Submission>, serde_json::Error> {
        if self.kind != "t3" {
            return Ok(None);
        }
        let link: RawLink = serde_json::from_value(self.data)?;
        Ok(Some(Submission {
            id: link.id,
            title: link.title,
            selftext: link.selftext,
            num_comments: link.num_comments,
            flair: link.link_flair_text,
            permalink: link.permalink,
        }))
    }

    /// 댓글 노드로 변환 (답글 재귀 포함), 다른 종류면 `None`
    pub(crate) fn into_comment_node(self) -> Result<Option<CommentNode>, serde_json::Error> {
        match self.kind.as_str() {
            "t1" => {
                let raw: RawComment = serde_json::from_value(self.data)?;
                let replies = if raw.replies.is_object() {
                    let listing: Listing = serde_json::from_value(raw.replies)?;
                    listing.into_comment_nodes()?
                } else {
                    Vec::new()
                };
                Ok(Some(CommentNode::Comment(CommentEntry {
                    id: raw.id,
                    parent_id: raw.parent_id,
                    body: raw.body,
                    replies,
                })))
            }
            "more" => {
                let raw: RawMore = serde_json::from_value(self.data)?;
                Ok(Some(CommentNode::More(MoreStub {
                    id: raw.id,
                    parent_id: raw.parent_id,
                    count: raw.count,
                    children: raw.children,
                })))
            }
            _ => Ok(None),
        }
    }
}

impl Listing {
    pub(crate) fn into_submissions(self) -> Result<Vec<Submission>, serde_json::Error> {
        let mut submissions = Vec::with_capacity(self.data.children.len());
        for thing in self.data.children {
            if let Some(submission) = thing.into_submission()? {
                submissions.push(submission);
            }
        }
        Ok(submissions)
    }

    pub(crate) fn into_comment_nodes(self) -> Result<Vec<CommentNode>, serde_json::Error> {
        let mut nodes = Vec::with_capacity(self.data.children.len());
        for thing in self.data.children {
            if let Some(node) = thing.into_comment_node()? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }
}

// ============================================================================
// Tests
// ============================================================================
