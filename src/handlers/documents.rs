use axum::response::Response;

use super::{id_param, route};
use crate::dto::document::DocumentView;
use crate::error::{AppError, AppResult};
use crate::server::{ApiRequest, EndpointConfig, Handler, Registrar};
use crate::utils::pagination::Page;
use crate::AppState;

pub fn register(registrar: &mut Registrar<AppState>) -> AppResult<()> {
    registrar.post(
        &route("/issues/:id/documents"),
        EndpointConfig::new()
            .describe("Attach a file to an issue (multipart/form-data, first file is kept)")
            .tag("documents")
            .params(id_param("Issue id"))
            .response::<DocumentView>(),
        Handler::value(upload_document),
    )?;

    registrar.get(
        &route("/issues/:id/documents"),
        EndpointConfig::new()
            .describe("List the documents of an issue")
            .tag("documents")
            .params(id_param("Issue id"))
            .paginated()
            .response::<DocumentView>(),
        Handler::value(list_documents),
    )?;

    registrar.get(
        &route("/documents/:id/download"),
        EndpointConfig::new()
            .describe("Download a document under its original file name")
            .tag("documents")
            .params(id_param("Document id")),
        Handler::raw(download_document),
    )?;

    Ok(())
}

pub async fn upload_document(req: ApiRequest<AppState>) -> AppResult<DocumentView> {
    let issue_id = req.object_id("id")?;
    let body = req
        .take_body()
        .ok_or_else(|| AppError::bad_upload("Request body is not available"))?;

    req.state
        .documents
        .upload_document(
            req.user()?,
            &issue_id,
            req.content_type(),
            body.into_data_stream(),
            req.uri.path(),
        )
        .await
}

pub async fn list_documents(req: ApiRequest<AppState>) -> AppResult<Page<DocumentView>> {
    let issue_id = req.object_id("id")?;
    req.state
        .documents
        .list_documents_for_issue(&issue_id, req.query_u64("page"), req.query_u64("page_size"))
        .await
}

pub async fn download_document(req: ApiRequest<AppState>) -> AppResult<Response> {
    let id = req.object_id("id")?;
    let download = req.state.documents.prepare_document_download(&id).await?;
    download.send(&req.headers, &req.uri).await
}
