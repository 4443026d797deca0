//! 테스트용 인메모리 Reddit 세션

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{RedditApi, RedditError, RedditResult};
use super::model::{CommentEntry, CommentNode, MoreStub, Submission};
use super::TimeFilter;

pub(crate) fn submission(id: &str, title: &str, num_comments: u64) -> Submission {
    Submission {
        id: id.to_string(),
        title: title.to_string(),
        selftext: format!("body of {}", id),
        num_comments,
        flair: None,
        permalink: format!("/r/android_beta/comments/{}/", id),
    }
}

pub(crate) fn comment(id: &str, parent: &str, body: &str, replies: Vec<CommentNode>) -> CommentNode {
    CommentNode::Comment(CommentEntry {
        id: id.to_string(),
        parent_id: parent.to_string(),
        body: Some(body.to_string()),
        replies,
    })
}

pub(crate) fn more(id: &str, parent: &str, children: &[&str]) -> CommentNode {
    CommentNode::More(MoreStub {
        id: id.to_string(),
        parent_id: parent.to_string(),
        count: children.len() as u64,
        children: children.iter().map(|c| c.to_string()).collect(),
    })
}

/// 기록된 검색 호출
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchCall {
    pub subreddit: String,
    pub query: String,
    pub time_filter: Option<TimeFilter>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeReddit {
    search_results: Vec<Submission>,
    by_url: HashMap<String, Submission>,
    comments: HashMap<String, Vec<CommentNode>>,
    more: Vec<CommentNode>,
    subtrees: HashMap<String, Vec<CommentNode>>,
    fail_search: bool,
    fail_more: bool,

    calls: AtomicUsize,
    searches: Mutex<Vec<SearchCall>>,
    batches: Mutex<Vec<usize>>,
    closed: AtomicBool,
}

impl FakeReddit {
    pub(crate) fn with_search_results(mut self, submissions: Vec<Submission>) -> Self {
        self.search_results = submissions;
        self
    }

    pub(crate) fn with_url(mut self, url: &str, submission: Submission) -> Self {
        self.by_url.insert(url.to_string(), submission);
        self
    }

    pub(crate) fn with_comments(mut self, submission_id: &str, nodes: Vec<CommentNode>) -> Self {
        self.comments.insert(submission_id.to_string(), nodes);
        self
    }

    pub(crate) fn with_more_children(mut self, nodes: Vec<CommentNode>) -> Self {
        self.more = nodes;
        self
    }

    pub(crate) fn with_subtree(mut self, comment_id: &str, nodes: Vec<CommentNode>) -> Self {
        self.subtrees.insert(comment_id.to_string(), nodes);
        self
    }

    pub(crate) fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub(crate) fn failing_more_children(mut self) -> Self {
        self.fail_more = true;
        self
    }

    /// 네트워크 호출 수 (close 제외)
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn searches(&self) -> Vec<SearchCall> {
        self.searches.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub(crate) fn more_children_batches(&self) -> Vec<usize> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RedditApi for FakeReddit {
    async fn search(
        &self,
        subreddit: &str,
        query: &str,
        time_filter: Option<TimeFilter>,
    ) -> RedditResult<Vec<Submission>> {
        self.record();
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(SearchCall {
                subreddit: subreddit.to_string(),
                query: query.to_string(),
                time_filter,
            });
        }
        if self.fail_search {
            return Err(RedditError::Api {
                status: 500,
                body: "search unavailable".to_string(),
            });
        }
        Ok(self.search_results.clone())
    }

    async fn submission_by_url(&self, url: &str) -> RedditResult<Submission> {
        self.record();
        self.by_url
            .get(url)
            .cloned()
            .ok_or_else(|| RedditError::NotFound(url.to_string()))
    }

    async fn comments(&self, submission: &Submission) -> RedditResult<Vec<CommentNode>> {
        self.record();
        self.comments
            .get(&submission.id)
            .cloned()
            .ok_or_else(|| RedditError::NotFound(submission.id.clone()))
    }

    async fn more_children(
        &self,
        _submission: &Submission,
        children: &[String],
    ) -> RedditResult<Vec<CommentNode>> {
        self.record();
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(children.len());
        }
        if self.fail_more {
            return Err(RedditError::RateLimited);
        }
        Ok(self
            .more
            .iter()
            .filter(|node| match node {
                CommentNode::Comment(entry) => children.contains(&entry.id),
                CommentNode::More(stub) => children.contains(&stub.id),
            })
            .cloned()
            .collect())
    }

    async fn comment_subtree(
        &self,
        _submission: &Submission,
        comment_id: &str,
    ) -> RedditResult<Vec<CommentNode>> {
        self.record();
        Ok(self.subtrees.get(comment_id).cloned().unwrap_or_default())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
