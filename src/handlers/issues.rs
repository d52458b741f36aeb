use super::{id_param, route};
use crate::dto::comment::{CommentView, NewComment};
use crate::dto::issue::{IssueUpdate, IssueView, NewIssue};
use crate::error::AppResult;
use crate::models::issue::{IssueStatus, TITLE_MAX_LENGTH};
use crate::server::{ApiRequest, EndpointConfig, Field, Handler, ObjectSchema, Registrar};
use crate::utils::pagination::Page;
use crate::AppState;

fn issue_body(title_required: bool) -> ObjectSchema {
    let title = Field::string().max_length(TITLE_MAX_LENGTH).describe("Short summary");
    ObjectSchema::new()
        .field("title", if title_required { title.required() } else { title })
        .field("content", Field::string().describe("Full description"))
        .field("status", Field::string().one_of(IssueStatus::ALL))
}

pub fn register(registrar: &mut Registrar<AppState>) -> AppResult<()> {
    registrar.get(
        &route("/issues"),
        EndpointConfig::new()
            .describe("List issues that were not deleted")
            .tag("issues")
            .paginated()
            .response::<IssueView>(),
        Handler::value(list_issues),
    )?;

    registrar.post(
        &route("/issues"),
        EndpointConfig::new()
            .describe("Create an issue")
            .tag("issues")
            .body(issue_body(true))
            .response::<IssueView>(),
        Handler::value(create_issue),
    )?;

    registrar.get(
        &route("/issues/:id"),
        EndpointConfig::new()
            .describe("Get an issue, deleted ones included")
            .tag("issues")
            .params(id_param("Issue id"))
            .response::<IssueView>(),
        Handler::value(get_issue),
    )?;

    registrar.put(
        &route("/issues/:id"),
        EndpointConfig::new()
            .describe("Update an issue")
            .tag("issues")
            .params(id_param("Issue id"))
            .body(issue_body(false))
            .response::<IssueView>(),
        Handler::value(update_issue),
    )?;

    registrar.delete(
        &route("/issues/:id"),
        EndpointConfig::new()
            .describe("Delete an issue")
            .tag("issues")
            .params(id_param("Issue id"))
            .response::<IssueView>(),
        Handler::value(delete_issue),
    )?;

    registrar.get(
        &route("/issues/:id/comments"),
        EndpointConfig::new()
            .describe("List the comments of an issue")
            .tag("comments")
            .params(id_param("Issue id"))
            .paginated()
            .response::<CommentView>(),
        Handler::value(list_comments),
    )?;

    registrar.post(
        &route("/issues/:id/comments"),
        EndpointConfig::new()
            .describe("Comment on an issue")
            .tag("comments")
            .params(id_param("Issue id"))
            .body(ObjectSchema::new().field("content", Field::string().required()))
            .response::<CommentView>(),
        Handler::value(add_comment),
    )?;

    Ok(())
}

pub async fn list_issues(req: ApiRequest<AppState>) -> AppResult<Page<IssueView>> {
    req.state
        .issues
        .list_issues(req.query_u64("page"), req.query_u64("page_size"))
        .await
}

pub async fn create_issue(req: ApiRequest<AppState>) -> AppResult<IssueView> {
    let issue: NewIssue = req.body_as()?;
    req.state.issues.create_issue(req.user()?, issue).await
}

pub async fn get_issue(req: ApiRequest<AppState>) -> AppResult<IssueView> {
    let id = req.object_id("id")?;
    req.state.issues.get_issue_by_id(&id).await
}

pub async fn update_issue(req: ApiRequest<AppState>) -> AppResult<IssueView> {
    let id = req.object_id("id")?;
    let update: IssueUpdate = req.body_as()?;
    req.state.issues.update_issue(req.user()?, &id, update).await
}

pub async fn delete_issue(req: ApiRequest<AppState>) -> AppResult<IssueView> {
    let id = req.object_id("id")?;
    req.state.issues.delete_issue(req.user()?, &id).await
}

pub async fn list_comments(req: ApiRequest<AppState>) -> AppResult<Page<CommentView>> {
    let id = req.object_id("id")?;
    req.state
        .issues
        .list_comments(&id, req.query_u64("page"), req.query_u64("page_size"))
        .await
}

pub async fn add_comment(req: ApiRequest<AppState>) -> AppResult<CommentView> {
    let id = req.object_id("id")?;
    let comment: NewComment = req.body_as()?;
    req.state.issues.add_comment(req.user()?, &id, comment).await
}
