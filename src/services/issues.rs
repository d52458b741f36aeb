use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, DateTime};
use tracing::{debug, info};

use super::repository::{Filter, Repository};
use super::users::UserManager;
use crate::config::IssuesConfig;
use crate::dto::comment::{CommentView, NewComment};
use crate::dto::issue::{IssueUpdate, IssueView, NewIssue};
use crate::dto::UserSummary;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::models::{comment::Comment, issue::Issue, user::User};
use crate::utils::pagination::{Page, PageRequest};

pub struct IssueManager {
    issues: Arc<dyn Repository<Issue>>,
    comments: Arc<dyn Repository<Comment>>,
    users: Arc<UserManager>,
    options: IssuesConfig,
}

impl IssueManager {
    pub fn new(
        issues: Arc<dyn Repository<Issue>>,
        comments: Arc<dyn Repository<Comment>>,
        users: Arc<UserManager>,
        options: IssuesConfig,
    ) -> Self {
        Self {
            issues,
            comments,
            users,
            options,
        }
    }

    pub async fn create_issue(&self, user: &User, issue: NewIssue) -> AppResult<IssueView> {
        debug!("create_issue by {}: {:?}", user.username, issue);

        let issue = Issue::new(user.id, issue.title, issue.content, issue.status.unwrap_or_default());
        self.issues.insert(&issue).await?;
        info!(issue_id = %issue.id, "Issue created by {}", user.username);

        Ok(IssueView::new(issue, UserSummary::from(user)))
    }

    /// Non-deleted issues in creation order.
    pub async fn list_issues(&self, page: Option<u64>, page_size: Option<u64>) -> AppResult<Page<IssueView>> {
        debug!("list_issues page={:?} page_size={:?}", page, page_size);

        let request = PageRequest::new(page, page_size, self.options.default_page_size);
        let page = self.issues.paginate(&Filter::new(), request).await?;
        let authors = self.users.summaries(page.docs.iter().map(|i| i.author).collect::<Vec<_>>()).await?;

        Ok(page.map(|issue| {
            let author = authors
                .get(&issue.author)
                .cloned()
                .unwrap_or_else(|| UserSummary::missing(&issue.author));
            IssueView::new(issue, author)
        }))
    }

    /// Returns the issue even if it was soft-deleted.
    pub async fn get_issue_by_id(&self, id: &ObjectId) -> AppResult<IssueView> {
        debug!("get_issue_by_id {}", id);

        let issue = self.find_issue(id).await?;
        let author = self.users.summary(&issue.author).await?;
        Ok(IssueView::new(issue, author))
    }

    pub async fn update_issue(&self, user: &User, id: &ObjectId, update: IssueUpdate) -> AppResult<IssueView> {
        debug!("update_issue {} by {}: {:?}", id, user.username, update);

        let mut issue = self.validate_issue_id(id).await?;
        self.check_ownership(user, &issue)?;

        if let Some(title) = update.title {
            issue.title = title;
        }
        if let Some(content) = update.content {
            issue.content = Some(content);
        }
        if let Some(status) = update.status {
            issue.status = status;
        }
        issue.updated_at = DateTime::now();

        self.issues.replace(&issue).await?;
        info!(issue_id = %issue.id, "Issue updated by {}", user.username);

        let author = self.users.summary(&issue.author).await?;
        Ok(IssueView::new(issue, author))
    }

    /// Soft delete. The record stays and remains fetchable by id.
    pub async fn delete_issue(&self, user: &User, id: &ObjectId) -> AppResult<IssueView> {
        debug!("delete_issue {} by {}", id, user.username);

        let mut issue = self.validate_issue_id(id).await?;
        self.check_ownership(user, &issue)?;

        let now = DateTime::now();
        issue.deleted_at = Some(now);
        issue.updated_at = now;
        self.issues.replace(&issue).await?;
        info!(issue_id = %issue.id, "Issue deleted by {}", user.username);

        let author = self.users.summary(&issue.author).await?;
        Ok(IssueView::new(issue, author))
    }

    /// Existing and not soft-deleted, or a 404 / 400 error.
    pub async fn validate_issue_id(&self, id: &ObjectId) -> AppResult<Issue> {
        let issue = self.find_issue(id).await?;
        if issue.is_deleted() {
            return Err(ErrorKind::IssueDeleted(id.to_hex()).into());
        }
        Ok(issue)
    }

    pub async fn add_comment(&self, user: &User, issue_id: &ObjectId, comment: NewComment) -> AppResult<CommentView> {
        debug!("add_comment on {} by {}", issue_id, user.username);

        self.validate_issue_id(issue_id).await?;

        let comment = Comment::new(*issue_id, user.id, comment.content);
        self.comments.insert(&comment).await?;
        info!(issue_id = %issue_id, comment_id = %comment.id, "Comment added by {}", user.username);

        Ok(CommentView::new(comment, UserSummary::from(user)))
    }

    pub async fn list_comments(
        &self,
        issue_id: &ObjectId,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> AppResult<Page<CommentView>> {
        debug!("list_comments {} page={:?} page_size={:?}", issue_id, page, page_size);

        self.validate_issue_id(issue_id).await?;

        let request = PageRequest::new(page, page_size, self.options.default_page_size);
        let filter = Filter::new().eq("issue", *issue_id);
        let page = self.comments.paginate(&filter, request).await?;
        let authors = self.users.summaries(page.docs.iter().map(|c| c.author).collect::<Vec<_>>()).await?;

        Ok(page.map(|comment| {
            let author = authors
                .get(&comment.author)
                .cloned()
                .unwrap_or_else(|| UserSummary::missing(&comment.author));
            CommentView::new(comment, author)
        }))
    }

    async fn find_issue(&self, id: &ObjectId) -> AppResult<Issue> {
        self.issues
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Issue", id.to_hex()))
    }

    fn check_ownership(&self, user: &User, issue: &Issue) -> AppResult<()> {
        if self.options.restrict_to_author && issue.author != user.id {
            return Err(AppError::forbidden(format!(
                "Only the author can modify issue \"{}\"",
                issue.id.to_hex()
            )));
        }
        Ok(())
    }
}
