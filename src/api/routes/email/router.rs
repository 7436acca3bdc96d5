//! Router for the email API
//!
//! Routes address mailboxes by email address. The session behind the
//! address is resolved first so unknown addresses fail without a call
//! to Mail.tm.

use axum::{
    Router,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use axum_extra::extract::Query;
use http::{HeaderValue, header};

use super::public;
use crate::api::public::{ApiError, Envelope};
use crate::api::rate_limit;
use crate::api::state::SharedState;
use crate::api::validation;
use crate::session::SessionRecord;

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn session_for(state: &SharedState, address: &str) -> Result<SessionRecord, ApiError> {
    let address = validation::address_param(address)?;
    Ok(state.mailbox.sessions().find_by_address(&address)?)
}

/// Create a Mail.tm account and open a session for it
async fn generate_handler(
    State(state): State<SharedState>,
    payload: Result<Json<public::GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<public::GenerateResponse>>), ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::validation(e.body_text()))?;
    let (address, password) = validation::account_creation(&payload.address, &payload.password)?;

    let account = state.mailbox.create_account(&address, &password).await?;

    let body = Envelope::ok(public::GenerateResponse::from(account))
        .with_message("Email account created successfully");
    Ok((StatusCode::CREATED, Json(body)))
}

async fn inbox_handler(
    State(state): State<SharedState>,
    Path(address): Path<String>,
    Query(params): Query<public::InboxQuery>,
) -> ApiResult<public::InboxResponse> {
    let session = session_for(&state, &address)?;
    let page = params.page.unwrap_or(1).max(1);

    let page = state
        .mailbox
        .list_messages(&session.session_id, page)
        .await?;

    Ok(Json(Envelope::ok(public::InboxResponse {
        address: session.address,
        unread: page.unread(),
        total: page.total,
        messages: page.messages,
    })))
}

async fn message_handler(
    State(state): State<SharedState>,
    Path((address, id)): Path<(String, String)>,
) -> ApiResult<public::MessageResponse> {
    let session = session_for(&state, &address)?;
    let id = validation::message_id_param(&id)?;

    let message = state.mailbox.get_message(&session.session_id, &id).await?;

    Ok(Json(Envelope::ok(public::MessageResponse {
        address: session.address,
        message,
    })))
}

/// Stream an attachment through without buffering it
async fn attachment_handler(
    State(state): State<SharedState>,
    Path((address, id, attachment_id)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let session = session_for(&state, &address)?;
    let id = validation::message_id_param(&id)?;
    let attachment_id = validation::attachment_id_param(&attachment_id)?;

    let download = state
        .mailbox
        .download_attachment(&session.session_id, &id, &attachment_id)
        .await?;

    let content_type = download
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    let content_disposition = download
        .content_disposition
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok());

    let mut response = Body::from_stream(download.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    if let Some(disposition) = content_disposition {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    if let Some(length) = download.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}

async fn delete_handler(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<public::DeleteResponse> {
    let session = session_for(&state, &address)?;

    let outcome = state.mailbox.delete_account(&session.session_id).await?;

    let upstream_deleted = outcome.upstream_error.is_none();
    let message = if upstream_deleted {
        "Email account deleted successfully"
    } else {
        "Email account removed locally, Mail.tm could not confirm the deletion"
    };
    Ok(Json(
        Envelope::ok(public::DeleteResponse {
            message: message.to_string(),
            upstream_deleted,
        })
        .with_message(message),
    ))
}

async fn info_handler(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> ApiResult<public::InfoResponse> {
    let session = session_for(&state, &address)?;

    let (info, session) = state
        .mailbox
        .get_account_info(&session.session_id)
        .await?;

    Ok(Json(Envelope::ok(public::InfoResponse {
        address: session.address,
        info,
        created_at: session.created_at,
        last_accessed: session.last_accessed_at,
    })))
}

/// Create the email router
pub fn router(state: &SharedState) -> Router<SharedState> {
    let creation_limit =
        middleware::from_fn_with_state(state.limits.creation.clone(), rate_limit::enforce);
    let message_limit =
        middleware::from_fn_with_state(state.limits.messages.clone(), rate_limit::enforce);

    Router::new()
        .route("/generate", post(generate_handler).layer(creation_limit))
        .route(
            "/{address}/inbox",
            get(inbox_handler).layer(message_limit.clone()),
        )
        .route(
            "/{address}/message/{id}",
            get(message_handler).layer(message_limit.clone()),
        )
        .route(
            "/{address}/message/{id}/attachment/{attachment_id}",
            get(attachment_handler).layer(message_limit),
        )
        .route("/{address}/info", get(info_handler))
        .route("/{address}", delete(delete_handler))
}
