use crate::auth::Caller;
use crate::error::{LedgerError, StoreError};
use crate::ledger::Ledger;
use crate::schemas::{Currency, GroupId, Role, UserId};
use crate::store::LedgerStore;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
            LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            LedgerError::AlreadyMember
            | LedgerError::LastAdmin
            | LedgerError::AlreadyDeleted
            | LedgerError::DuplicateEmail
            | LedgerError::Storage(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            LedgerError::EmptyGroup => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "store failure");
        }
        HttpResponse::build(status).json(ApiError {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error: self.kind().to_owned(),
            message: self.to_string(),
        })
    }
}

type Response = Result<HttpResponse, LedgerError>;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: UserId,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    pub payer_id: UserId,
    pub amount: Decimal,
    pub currency: Option<Currency>,
    pub description: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSettlementRequest {
    pub payer_id: UserId,
    pub payee_id: UserId,
    pub amount: Decimal,
    pub currency: Option<Currency>,
}

async fn create_user<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    json: web::Json<CreateUserRequest>,
) -> Response {
    let request = json.into_inner();
    let user = ledger.create_user(&request.email, &request.name).await?;
    Ok(HttpResponse::Created().json(user))
}

async fn list_users<S: LedgerStore>(ledger: web::Data<Ledger<S>>) -> Response {
    Ok(HttpResponse::Ok().json(ledger.list_users().await?))
}

async fn get_user<S: LedgerStore>(ledger: web::Data<Ledger<S>>, id: web::Path<UserId>) -> Response {
    Ok(HttpResponse::Ok().json(ledger.get_user(&id).await?))
}

async fn get_user_by_email<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    query: web::Query<EmailQuery>,
) -> Response {
    Ok(HttpResponse::Ok().json(ledger.get_user_by_email(&query.email).await?))
}

async fn soft_delete_user<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<UserId>,
) -> Response {
    ledger.soft_delete_user(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn create_group<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    caller: Caller,
    json: web::Json<CreateGroupRequest>,
) -> Response {
    let group = ledger.create_group(&json.name, &caller.0).await?;
    Ok(HttpResponse::Created().json(group))
}

async fn list_groups<S: LedgerStore>(ledger: web::Data<Ledger<S>>) -> Response {
    Ok(HttpResponse::Ok().json(ledger.list_groups().await?))
}

async fn get_group<S: LedgerStore>(ledger: web::Data<Ledger<S>>, id: web::Path<GroupId>) -> Response {
    Ok(HttpResponse::Ok().json(ledger.get_group(&id).await?))
}

async fn delete_group<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    caller: Caller,
    id: web::Path<GroupId>,
) -> Response {
    ledger.delete_group(&id, &caller.0).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn add_member<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
    json: web::Json<AddMemberRequest>,
) -> Response {
    let membership = ledger.add_member(&id, &json.user_id, json.role).await?;
    Ok(HttpResponse::Created().json(membership))
}

async fn list_members<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
) -> Response {
    Ok(HttpResponse::Ok().json(ledger.list_members(&id).await?))
}

async fn remove_member<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    caller: Caller,
    path: web::Path<(GroupId, UserId)>,
) -> Response {
    let (group, target) = path.into_inner();
    ledger.remove_member(&caller.0, &target, &group).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn create_expense<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
    json: web::Json<CreateExpenseRequest>,
) -> Response {
    let request = json.into_inner();
    let expense = ledger
        .create_expense(
            &id,
            &request.payer_id,
            request.amount,
            request.currency,
            request.description,
            request.occurred_at,
        )
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

async fn list_expenses<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
) -> Response {
    Ok(HttpResponse::Ok().json(ledger.list_expenses(&id).await?))
}

async fn get_balances<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
) -> Response {
    Ok(HttpResponse::Ok().json(ledger.get_balances(&id).await?))
}

async fn create_settlement<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
    json: web::Json<CreateSettlementRequest>,
) -> Response {
    let request = json.into_inner();
    let settlement = ledger
        .create_settlement(
            &id,
            &request.payer_id,
            &request.payee_id,
            request.amount,
            request.currency,
        )
        .await?;
    Ok(HttpResponse::Created().json(settlement))
}

async fn list_settlements<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
) -> Response {
    Ok(HttpResponse::Ok().json(ledger.list_settlements(&id).await?))
}

async fn suggest_settlements<S: LedgerStore>(
    ledger: web::Data<Ledger<S>>,
    id: web::Path<GroupId>,
) -> Response {
    Ok(HttpResponse::Ok().json(ledger.suggest_settlements(&id).await?))
}

/// Registers every ledger route. Expects `web::Data<Ledger<S>>` and
/// `web::Data<AuthConfig>` in the app data.
pub fn configure<S: LedgerStore>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("", web::post().to(create_user::<S>))
            .route("", web::get().to(list_users::<S>))
            .route("/by-email", web::get().to(get_user_by_email::<S>))
            .route("/{id}", web::get().to(get_user::<S>))
            .route("/{id}", web::delete().to(soft_delete_user::<S>)),
    )
    .service(
        web::scope("/groups")
            .route("", web::post().to(create_group::<S>))
            .route("", web::get().to(list_groups::<S>))
            .route("/{id}", web::get().to(get_group::<S>))
            .route("/{id}", web::delete().to(delete_group::<S>))
            .route("/{id}/members", web::post().to(add_member::<S>))
            .route("/{id}/members", web::get().to(list_members::<S>))
            .route("/{id}/members/{user_id}", web::delete().to(remove_member::<S>))
            .route("/{id}/expenses", web::post().to(create_expense::<S>))
            .route("/{id}/expenses", web::get().to(list_expenses::<S>))
            .route("/{id}/balances", web::get().to(get_balances::<S>))
            .route("/{id}/settlements", web::post().to(create_settlement::<S>))
            .route("/{id}/settlements", web::get().to(list_settlements::<S>))
            .route("/{id}/exchanges", web::get().to(suggest_settlements::<S>)),
    );
}
