// HTTP handlers for the ledger surface

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, Principal};
use crate::error::LedgerError;
use crate::events::EventFunds;
use crate::ledger::{NewTransfer, TransferLedger};
use crate::models::{
    CreateEventRequest, CreateGatewayRequest, CreateUserRequest, Event, EventView,
    FailWithdrawalRequest, Gateway, Notification, PageQuery, ScanGatewayRequest, SetRoleRequest,
    TopUpRequest, Transfer, TransferPage, TransferRequest, TransferType, User, VendorPendingSale,
    Wallet, Withdrawal, WithdrawalRequest,
};
use crate::notify::Notifier;
use crate::sales::VendorSales;
use crate::wallet::WalletStore;
use crate::withdrawals::WithdrawalProcessor;
use crate::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_health = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();

    let status = if db_health { "healthy" } else { "unhealthy" };

    Json(serde_json::json!({
        "status": status,
        "database": if db_health { "up" } else { "down" },
    }))
}

// ---- Identity ----

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, LedgerError> {
    let user = auth::create_user(&state.db, req).await?;
    Ok(Json(user))
}

pub async fn set_role(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<User>, LedgerError> {
    let user = auth::set_role(&state.db, &principal, user_id, req.role).await?;
    Ok(Json(user))
}

// ---- Wallet ----

pub async fn get_wallet(
    principal: Principal,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Wallet>, LedgerError> {
    let wallet = WalletStore::get(&state.db, principal.user_id).await?;
    Ok(Json(wallet))
}

/// Settlement callback from the payment gateway: external funds enter as a
/// sender-less completed transfer.
pub async fn top_up(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<Transfer>, LedgerError> {
    let transfer =
        TransferLedger::record_top_up(&state.db, &state.notifier, principal.user_id, req.amount)
            .await?;
    Ok(Json(transfer))
}

pub async fn transfer_history(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<TransferPage>, LedgerError> {
    let history =
        TransferLedger::history(&state.db, principal.user_id, page.limit, page.offset).await?;
    Ok(Json(history))
}

// ---- Transfers ----

pub async fn create_transfer(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Transfer>, LedgerError> {
    let transfer = TransferLedger::record_transfer(
        &state.db,
        &state.notifier,
        NewTransfer {
            sender_id: Some(principal.user_id),
            receiver_id: req.receiver_id,
            amount: req.amount,
            transfer_type: TransferType::Transfer,
            message: req.message,
            event_id: req.event_id,
        },
    )
    .await?;
    Ok(Json(transfer))
}

// ---- Events ----

pub async fn create_event(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEventRequest>,
) -> Result<Json<Event>, LedgerError> {
    let event = EventFunds::create(&state.db, &principal, &req.title).await?;
    Ok(Json(event))
}

pub async fn event_balance(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventView>, LedgerError> {
    let view = EventFunds::view(&state.db, &principal, event_id).await?;
    Ok(Json(view))
}

pub async fn mark_event_done(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Event>, LedgerError> {
    let event = EventFunds::mark_done(&state.db, &principal, event_id).await?;
    Ok(Json(event))
}

pub async fn delete_event(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    EventFunds::delete(&state.db, &principal, event_id).await?;
    Ok(Json(serde_json::json!({ "deleted": event_id })))
}

// ---- Withdrawals ----

pub async fn request_withdrawal(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<Json<Withdrawal>, LedgerError> {
    let withdrawal =
        WithdrawalProcessor::request(&state.db, &state.notifier, &principal, req).await?;
    Ok(Json(withdrawal))
}

pub async fn process_withdrawal(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<Json<Withdrawal>, LedgerError> {
    if !principal.role.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let withdrawal =
        WithdrawalProcessor::process(&state.db, &state.notifier, withdrawal_id).await?;
    Ok(Json(withdrawal))
}

pub async fn fail_withdrawal(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(withdrawal_id): Path<Uuid>,
    Json(req): Json<FailWithdrawalRequest>,
) -> Result<Json<Withdrawal>, LedgerError> {
    if !principal.role.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    let withdrawal =
        WithdrawalProcessor::fail(&state.db, &state.notifier, withdrawal_id, &req.reason).await?;
    Ok(Json(withdrawal))
}

// ---- Gateways and vendor sales ----

pub async fn create_gateway(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateGatewayRequest>,
) -> Result<Json<Gateway>, LedgerError> {
    let gateway = VendorSales::create_gateway(&state.db, &principal, req).await?;
    Ok(Json(gateway))
}

pub async fn scan_gateway(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScanGatewayRequest>,
) -> Result<Json<VendorPendingSale>, LedgerError> {
    let sale = VendorSales::scan_gateway(&state.db, &state.notifier, &principal, req).await?;
    Ok(Json(sale))
}

pub async fn confirm_sale(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(sale_id): Path<Uuid>,
) -> Result<Json<VendorPendingSale>, LedgerError> {
    let sale = VendorSales::confirm_sale(&state.db, &principal, sale_id).await?;
    Ok(Json(sale))
}

pub async fn issue_notes(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(sale_id): Path<Uuid>,
) -> Result<Json<VendorPendingSale>, LedgerError> {
    let sale = VendorSales::issue_notes(&state.db, &principal, sale_id).await?;
    Ok(Json(sale))
}

// ---- Notifications ----

pub async fn list_notifications(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Notification>>, LedgerError> {
    let rows = Notifier::list(&state.db, principal.user_id, page.limit, page.offset).await?;
    Ok(Json(rows))
}

pub async fn read_notification(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Notification>, LedgerError> {
    let row = Notifier::mark_read(&state.db, principal.user_id, notification_id).await?;
    Ok(Json(row))
}
