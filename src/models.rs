// Database models and request/response shapes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Platform role. Roles gate which ledger operations a principal may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Celebrant,
    Vendor,
    Both,
    Admin,
    SuperAdmin,
}

impl Role {
    /// May settle gateway-originated sales.
    pub fn can_vend(self) -> bool {
        matches!(self, Role::Vendor | Role::Both | Role::Admin | Role::SuperAdmin)
    }

    /// May own events and withdraw their funds.
    pub fn can_celebrate(self) -> bool {
        matches!(
            self,
            Role::Celebrant | Role::Both | Role::Admin | Role::SuperAdmin
        )
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Celebrant => "celebrant",
            Role::Vendor => "vendor",
            Role::Both => "both",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "celebrant" => Ok(Role::Celebrant),
            "vendor" => Ok(Role::Vendor),
            "both" => Ok(Role::Both),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub phone: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// One wallet per user. `naira_balance` mirrors `balance` in all current
/// flows; it exists as a display value only.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    pub naira_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferType {
    Transfer,
    GatewayQr,
    TopUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

/// Immutable once completed. `sender_id` is null for external top-ups;
/// `receiver_id` is null when the funds land in an event rather than a
/// wallet.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Transfer {
    pub id: Uuid,
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub amount: Decimal,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub message: Option<String>,
    pub event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    Done,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Event {
    pub id: Uuid,
    pub celebrant_id: Uuid,
    pub title: String,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// Derived event funds, folded from the transfer and withdrawal tables at
/// read time. Never stored.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventBalance {
    pub total_received: Decimal,
    pub total_withdrawn: Decimal,
    pub remaining: Decimal,
}

impl EventBalance {
    pub fn new(total_received: Decimal, total_withdrawn: Decimal) -> Self {
        Self {
            total_received,
            total_withdrawn,
            remaining: total_received - total_withdrawn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalType {
    Bank,
    WalletAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "withdrawal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn may_begin_processing(self) -> bool {
        matches!(self, WithdrawalStatus::Pending)
    }

    pub fn may_fail(self) -> bool {
        matches!(self, WithdrawalStatus::Pending | WithdrawalStatus::Processing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Option<Uuid>,
    pub bu_amount: Decimal,
    pub naira_amount: Decimal,
    pub withdrawal_type: WithdrawalType,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub wallet_address: Option<String>,
    pub status: WithdrawalStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gateway_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Active,
    Used,
}

/// A physical QR-bearing redemption point tied to an event and a vendor.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Gateway {
    pub id: Uuid,
    pub event_id: Uuid,
    pub vendor_id: Uuid,
    pub celebrant_unique_id: String,
    pub qr_code_data: String,
    pub status: GatewayStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sale_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Pending,
    Confirmed,
    NotesIssued,
}

impl SaleStatus {
    /// The only legal forward step from this state, if any.
    pub fn next(self) -> Option<SaleStatus> {
        match self {
            SaleStatus::Pending => Some(SaleStatus::Confirmed),
            SaleStatus::Confirmed => Some(SaleStatus::NotesIssued),
            SaleStatus::NotesIssued => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Confirmed => "confirmed",
            SaleStatus::NotesIssued => "notes_issued",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct VendorPendingSale {
    pub id: Uuid,
    pub gateway_id: Uuid,
    pub event_id: Uuid,
    pub vendor_id: Uuid,
    pub amount: Decimal,
    pub status: SaleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub amount: Option<Decimal>,
    pub metadata: Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ---- Request / response shapes ----

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub display_name: String,
    pub phone: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub receiver_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub amount: Decimal,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub event_id: Option<Uuid>,
    pub amount: Decimal,
    pub withdrawal_type: WithdrawalType,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub wallet_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailWithdrawalRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGatewayRequest {
    pub event_id: Uuid,
    pub vendor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ScanGatewayRequest {
    pub qr_code_data: String,
    pub amount: Decimal,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

pub fn default_limit() -> i64 {
    50
}

/// Response with paginated transfers
#[derive(Debug, Serialize)]
pub struct TransferPage {
    pub transfers: Vec<Transfer>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub funds: EventBalance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gates() {
        assert!(Role::Vendor.can_vend());
        assert!(Role::Both.can_vend());
        assert!(!Role::User.can_vend());
        assert!(!Role::Celebrant.can_vend());
        assert!(Role::Celebrant.can_celebrate());
        assert!(!Role::Vendor.can_celebrate());
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Both.is_admin());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            Role::User,
            Role::Celebrant,
            Role::Vendor,
            Role::Both,
            Role::Admin,
            Role::SuperAdmin,
        ] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_value(TransferType::GatewayQr).unwrap(),
            serde_json::json!("gateway_qr")
        );
        assert_eq!(
            serde_json::to_value(SaleStatus::NotesIssued).unwrap(),
            serde_json::json!("notes_issued")
        );
        assert_eq!(
            serde_json::to_value(Role::SuperAdmin).unwrap(),
            serde_json::json!("super_admin")
        );
    }

    #[test]
    fn event_balance_is_received_minus_withdrawn() {
        let funds = EventBalance::new(Decimal::from(500), Decimal::from(200));
        assert_eq!(funds.remaining, Decimal::from(300));
    }

    #[test]
    fn sale_states_step_forward_only() {
        assert_eq!(SaleStatus::Pending.next(), Some(SaleStatus::Confirmed));
        assert_eq!(SaleStatus::Confirmed.next(), Some(SaleStatus::NotesIssued));
        assert_eq!(SaleStatus::NotesIssued.next(), None);
    }

    #[test]
    fn withdrawal_transition_guards() {
        assert!(WithdrawalStatus::Pending.may_begin_processing());
        assert!(!WithdrawalStatus::Processing.may_begin_processing());
        assert!(!WithdrawalStatus::Completed.may_begin_processing());
        assert!(WithdrawalStatus::Pending.may_fail());
        assert!(WithdrawalStatus::Processing.may_fail());
        assert!(!WithdrawalStatus::Completed.may_fail());
        assert!(!WithdrawalStatus::Failed.may_fail());
    }

    #[test]
    fn page_query_defaults() {
        let page: PageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(page.limit, 50);
        assert_eq!(page.offset, 0);
    }
}
