//! 댓글 평탄화
//!
//! 게시물의 댓글 트리를 끝까지 펼친 뒤 너비 우선으로 평탄화합니다.
//! 트리는 인덱스 기반 arena(`CommentForest`)에 보관하고,
//! 접힌 스텁은 발견 순서(FIFO)대로 펼칩니다.

use std::collections::{HashMap, HashSet, VecDeque};

use super::client::{RedditApi, RedditResult};
use super::model::{Comment, CommentNode, MoreStub, Submission, Thread};

/// `morechildren` 한 번에 요청할 최대 ID 수
const MORE_CHILDREN_BATCH: usize = 100;

/// 게시물 하나를 Thread로 변환
pub async fn build_thread(api: &dyn RedditApi, submission: &Submission) -> Thread {
    Thread {
        title: submission.title.clone(),
        text: submission.selftext.clone(),
        comments: fetch_comments(api, submission).await,
    }
}

/// 게시물의 전체 댓글 (너비 우선, 삭제/제거 본문 제외)
///
/// - 댓글 수가 0이면 네트워크 호출 없이 대체 댓글 하나를 반환
/// - 도중에 실패하면 그때까지 펼친 트리에서 수집한 댓글을 반환
pub async fn fetch_comments(api: &dyn RedditApi, submission: &Submission) -> Vec<Comment> {
    if submission.num_comments == 0 {
        return vec![Comment::disabled()];
    }

    let mut forest = CommentForest::default();

    match api.comments(submission).await {
        Ok(nodes) => forest.attach(nodes, None),
        Err(e) => {
            tracing::error!("Failed to fetch comments for {}: {}", submission.id, e);
            return Vec::new();
        }
    }

    if let Err(e) = expand_all(api, submission, &mut forest).await {
        tracing::error!(
            "Comment expansion stopped for {} ({} comments kept): {}",
            submission.id,
            forest.len(),
            e
        );
    }

    forest.flatten()
}

/// 대기 중인 스텁이 없어질 때까지 펼침
async fn expand_all(
    api: &dyn RedditApi,
    submission: &Submission,
    forest: &mut CommentForest,
) -> RedditResult<()> {
    while let Some(stub) = forest.pending.pop_front() {
        let parent = forest.lookup(&stub.parent_id);

        if stub.is_continue_thread() {
            let comment_id = stub.parent_id.trim_start_matches("t1_");
            tracing::debug!("Continuing thread under {}", comment_id);
            let replies = api.comment_subtree(submission, comment_id).await?;
            forest.attach(replies, parent);
            continue;
        }

        tracing::debug!(
            "Expanding {} hidden comments under {}",
            stub.count,
            stub.parent_id
        );
        for batch in stub.children.chunks(MORE_CHILDREN_BATCH) {
            let nodes = api.more_children(submission, batch).await?;
            // 응답은 평탄한 목록 - 각 노드의 parent_id로 위치 결정
            for node in nodes {
                let parent = forest.lookup(node_parent(&node));
                forest.attach(vec![node], parent);
            }
        }
    }
    Ok(())
}

fn node_parent(node: &CommentNode) -> &str {
    match node {
        CommentNode::Comment(entry) => &entry.parent_id,
        CommentNode::More(stub) => &stub.parent_id,
    }
}

// ============================================================================
// CommentForest
// ============================================================================

#[derive(Debug)]
struct ForestNode {
    body: Option<String>,
    children: Vec<usize>,
}

#[derive(Debug, Default)]
struct CommentForest {
    nodes: Vec<ForestNode>,
    roots: Vec<usize>,
    /// fullname (`t1_...`) → arena index
    index: HashMap<String, usize>,
    pending: VecDeque<MoreStub>,
    /// (parent_id, id) - "이 스레드 계속" 스텁은 id가 모두 `_`
    seen: HashSet<(String, String)>,
}

impl CommentForest {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 부모 fullname의 arena 인덱스 (게시물/미확인 부모는 최상위)
    fn lookup(&self, parent_id: &str) -> Option<usize> {
        self.index.get(parent_id).copied()
    }

    /// 노드들을 부모 아래(또는 최상위)에 붙이고, 스텁은 대기열에 추가
    fn attach(&mut self, nodes: Vec<CommentNode>, parent: Option<usize>) {
        for node in nodes {
            match node {
                CommentNode::Comment(entry) => {
                    let fullname = entry.fullname();
                    if self.index.contains_key(&fullname) {
                        continue;
                    }

                    let idx = self.nodes.len();
                    self.nodes.push(ForestNode {
                        body: entry.body,
                        children: Vec::new(),
                    });
                    self.index.insert(fullname, idx);
                    match parent {
                        Some(p) => self.nodes[p].children.push(idx),
                        None => self.roots.push(idx),
                    }

                    self.attach(entry.replies, Some(idx));
                }
                CommentNode::More(stub) => {
                    let key = (stub.parent_id.clone(), stub.id.clone());
                    if self.seen.insert(key) {
                        self.pending.push_back(stub);
                    }
                }
            }
        }
    }

    /// 너비 우선 평탄화
    fn flatten(&self) -> Vec<Comment> {
        let mut queue: VecDeque<usize> = self.roots.iter().copied().collect();
        let mut comments = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = queue.pop_front() {
            let node = &self.nodes[idx];
            if let Some(body) = node.body.as_deref() {
                if Comment::is_retained(body) {
                    comments.push(Comment::new(body));
                }
            }
            queue.extend(node.children.iter().copied());
        }

        comments
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::model::CommentEntry;
    use crate::reddit::testing::{comment, more, submission, FakeReddit};

    fn bodies(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.body.as_str()).collect()
    }

    #[tokio::test]
    async fn test_zero_comments_uses_placeholder_without_network() {
        let api = FakeReddit::default();
        let post = submission("p1", "No comments", 0);

        let comments = fetch_comments(&api, &post).await;
        assert_eq!(comments, vec![Comment::new("Comments are disabled!")]);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_breadth_first_and_removed_filtered() {
        let post = submission("p1", "Beta", 5);
        let tree = vec![
            comment("a", "t3_p1", "A", vec![comment("a1", "t1_a", "A1", vec![])]),
            comment("b", "t3_p1", "[removed]", vec![comment("b1", "t1_b", "B1", vec![])]),
            comment("c", "t3_p1", "[deleted]", vec![]),
        ];
        let api = FakeReddit::default().with_comments("p1", tree);

        let comments = fetch_comments(&api, &post).await;
        assert_eq!(bodies(&comments), vec!["A", "A1", "B1"]);
    }

    #[tokio::test]
    async fn test_missing_body_is_skipped() {
        let post = submission("p1", "Beta", 2);
        let tree = vec![CommentNode::Comment(CommentEntry {
            id: "x".to_string(),
            parent_id: "t3_p1".to_string(),
            body: None,
            replies: vec![comment("y", "t1_x", "kept", vec![])],
        })];
        let api = FakeReddit::default().with_comments("p1", tree);

        let comments = fetch_comments(&api, &post).await;
        assert_eq!(bodies(&comments), vec!["kept"]);
    }

    #[tokio::test]
    async fn test_more_stubs_are_expanded() {
        let post = submission("p1", "Beta", 4);
        let tree = vec![
            comment("a", "t3_p1", "A", vec![more("m2", "t1_a", &[])]),
            more("m1", "t3_p1", &["b", "b1"]),
        ];
        let api = FakeReddit::default()
            .with_comments("p1", tree)
            .with_more_children(vec![
                comment("b", "t3_p1", "B", vec![]),
                comment("b1", "t1_b", "B1", vec![]),
            ])
            .with_subtree("a", vec![comment("a1", "t1_a", "A1", vec![])]);

        let comments = fetch_comments(&api, &post).await;
        assert_eq!(bodies(&comments), vec!["A", "B", "A1", "B1"]);
    }

    #[tokio::test]
    async fn test_more_children_batched_by_100() {
        let post = submission("p1", "Beta", 250);
        let ids: Vec<String> = (0..250).map(|i| format!("c{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let api = FakeReddit::default().with_comments("p1", vec![more("m", "t3_p1", &id_refs)]);

        fetch_comments(&api, &post).await;
        assert_eq!(api.more_children_batches(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_tree() {
        let post = submission("p1", "Beta", 3);
        let tree = vec![
            comment("a", "t3_p1", "A", vec![]),
            more("m1", "t3_p1", &["b"]),
        ];
        let api = FakeReddit::default()
            .with_comments("p1", tree)
            .failing_more_children();

        let comments = fetch_comments(&api, &post).await;
        assert_eq!(bodies(&comments), vec!["A"]);
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_is_empty() {
        let post = submission("p1", "Beta", 3);
        let api = FakeReddit::default();

        assert!(fetch_comments(&api, &post).await.is_empty());
    }

    #[tokio::test]
    async fn test_build_thread() {
        let post = submission("p1", "Android 16 Beta 1", 1);
        let api = FakeReddit::default()
            .with_comments("p1", vec![comment("a", "t3_p1", "works", vec![])]);

        let thread = build_thread(&api, &post).await;
        assert_eq!(thread.title, "Android 16 Beta 1");
        assert_eq!(thread.text, "body of p1");
        assert_eq!(bodies(&thread.comments), vec!["works"]);
    }
}
