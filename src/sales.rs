// Gateway scans and vendor sale settlement

use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::database::{Database, DbPool};
use crate::error::LedgerError;
use crate::events::EventFunds;
use crate::ledger::{NewTransfer, TransferLedger};
use crate::models::{
    CreateGatewayRequest, EventStatus, Gateway, SaleStatus, ScanGatewayRequest, TransferType,
    User, VendorPendingSale,
};
use crate::notify::{Notifier, NotificationPayload};
use crate::wallet::ensure_positive;

pub struct VendorSales;

/// Opaque token carried by a printed QR code.
pub fn new_qr_payload() -> String {
    hex::encode(Uuid::new_v4().as_bytes())
}

/// Short reference the celebrant can read out at the gateway.
pub fn new_celebrant_ref() -> String {
    format!("CEL-{}", hex::encode(&Uuid::new_v4().as_bytes()[..4]).to_uppercase())
}

/// Map the authenticated principal to a vendor row. Only the server-side
/// session identity is consulted; a caller-supplied identifier is never
/// trusted as a fallback.
pub async fn resolve_vendor(pool: &DbPool, principal: &Principal) -> Result<User, LedgerError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(principal.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::Unauthorized)?;

    if !user.role.can_vend() {
        return Err(LedgerError::Unauthorized);
    }
    Ok(user)
}

impl VendorSales {
    /// Celebrant provisions a redemption point for their event, naming the
    /// vendor who will settle it.
    pub async fn create_gateway(
        pool: &DbPool,
        principal: &Principal,
        req: CreateGatewayRequest,
    ) -> Result<Gateway, LedgerError> {
        let mut conn = pool.acquire().await?;

        let event = EventFunds::get(&mut conn, req.event_id).await?;
        if event.celebrant_id != principal.user_id {
            return Err(LedgerError::Unauthorized);
        }
        if event.status != EventStatus::Active {
            return Err(LedgerError::InvalidState("event is already done".into()));
        }

        let vendor = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(req.vendor_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(LedgerError::NotFound("vendor"))?;
        if !vendor.role.can_vend() {
            return Err(LedgerError::Validation("named user is not a vendor"));
        }

        let gateway = sqlx::query_as::<_, Gateway>(
            "INSERT INTO gateways (event_id, vendor_id, celebrant_unique_id, qr_code_data)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(req.event_id)
        .bind(req.vendor_id)
        .bind(new_celebrant_ref())
        .bind(new_qr_payload())
        .fetch_one(&mut *conn)
        .await?;

        Ok(gateway)
    }

    /// A gift-giver scans a gateway QR. The BU moves into the celebrant's
    /// event here, in the same transaction that consumes the gateway and
    /// opens the vendor's pending sale; the later settlement steps only
    /// track physical fulfillment.
    pub async fn scan_gateway(
        pool: &DbPool,
        notifier: &Notifier,
        giver: &Principal,
        req: ScanGatewayRequest,
    ) -> Result<VendorPendingSale, LedgerError> {
        ensure_positive(req.amount)?;

        let mut tx = pool.begin().await?;

        let gateway = sqlx::query_as::<_, Gateway>(
            "SELECT * FROM gateways
             WHERE qr_code_data = $1 AND status = 'active'
             FOR UPDATE",
        )
        .bind(&req.qr_code_data)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::NotFound("gateway"))?;

        // Same scope lock as withdrawals and deletion: the contribution must
        // not race a delete of the event it funds.
        Database::lock_scope(&mut tx, gateway.event_id).await?;

        let event = EventFunds::get(&mut tx, gateway.event_id).await?;
        if event.status != EventStatus::Active {
            return Err(LedgerError::InvalidState(
                "event no longer accepts contributions".into(),
            ));
        }

        let transfer = TransferLedger::record_in_tx(
            &mut tx,
            &NewTransfer {
                sender_id: Some(giver.user_id),
                receiver_id: None,
                amount: req.amount,
                transfer_type: TransferType::GatewayQr,
                message: req.message.clone(),
                event_id: Some(gateway.event_id),
            },
        )
        .await?;

        sqlx::query("UPDATE gateways SET status = 'used' WHERE id = $1")
            .bind(gateway.id)
            .execute(&mut *tx)
            .await?;

        let sale = sqlx::query_as::<_, VendorPendingSale>(
            "INSERT INTO vendor_pending_sales (gateway_id, event_id, vendor_id, amount)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(gateway.id)
        .bind(gateway.event_id)
        .bind(gateway.vendor_id)
        .bind(req.amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "gateway {} consumed: {} BU into event {}, sale {} pending",
            gateway.id, req.amount, gateway.event_id, sale.id
        );

        notifier.notify(
            event.celebrant_id,
            NotificationPayload {
                kind: "gateway_contribution",
                title: "Gateway contribution".into(),
                message: format!("{} received {} BU at a gateway", event.title, req.amount),
                amount: Some(req.amount),
                metadata: serde_json::json!({
                    "transfer_id": transfer.id,
                    "sale_id": sale.id,
                }),
            },
        );
        notifier.notify(
            gateway.vendor_id,
            NotificationPayload {
                kind: "sale_pending",
                title: "New pending sale".into(),
                message: format!("A {} BU sale awaits confirmation", req.amount),
                amount: Some(req.amount),
                metadata: serde_json::json!({ "sale_id": sale.id }),
            },
        );

        Ok(sale)
    }

    /// `pending -> confirmed`, by the owning vendor only. Anything that is
    /// not that vendor's pending sale is indistinguishable from absent.
    pub async fn confirm_sale(
        pool: &DbPool,
        principal: &Principal,
        sale_id: Uuid,
    ) -> Result<VendorPendingSale, LedgerError> {
        let vendor = resolve_vendor(pool, principal).await?;

        let sale = sqlx::query_as::<_, VendorPendingSale>(
            "UPDATE vendor_pending_sales
             SET status = 'confirmed', updated_at = NOW()
             WHERE id = $1 AND vendor_id = $2 AND status = 'pending'
             RETURNING *",
        )
        .bind(sale_id)
        .bind(vendor.id)
        .fetch_optional(pool)
        .await?;

        sale.ok_or(LedgerError::NotFound("pending sale"))
    }

    /// `confirmed -> notes_issued`: the vendor hands over physical notes.
    /// No balance moves; the underlying transfer was recorded at scan time.
    pub async fn issue_notes(
        pool: &DbPool,
        principal: &Principal,
        sale_id: Uuid,
    ) -> Result<VendorPendingSale, LedgerError> {
        let vendor = resolve_vendor(pool, principal).await?;

        let current = sqlx::query_as::<_, VendorPendingSale>(
            "SELECT * FROM vendor_pending_sales WHERE id = $1 AND vendor_id = $2",
        )
        .bind(sale_id)
        .bind(vendor.id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::NotFound("sale"))?;

        if current.status.next() != Some(SaleStatus::NotesIssued) {
            return Err(LedgerError::InvalidState(format!(
                "cannot issue notes for a {} sale",
                current.status.as_str()
            )));
        }

        let sale = sqlx::query_as::<_, VendorPendingSale>(
            "UPDATE vendor_pending_sales
             SET status = 'notes_issued', updated_at = NOW()
             WHERE id = $1 AND vendor_id = $2 AND status = 'confirmed'
             RETURNING *",
        )
        .bind(sale_id)
        .bind(vendor.id)
        .fetch_optional(pool)
        .await?;

        let sale = sale.ok_or(LedgerError::Conflict)?;
        info!("sale {}: notes issued by vendor {}", sale.id, vendor.id);
        Ok(sale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn qr_payloads_are_hex_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let payload = new_qr_payload();
            assert_eq!(payload.len(), 32);
            assert!(payload.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(payload));
        }
    }

    #[test]
    fn notes_are_issued_only_from_confirmed() {
        // The settlement guard asks the state machine for the next step.
        assert_eq!(SaleStatus::Confirmed.next(), Some(SaleStatus::NotesIssued));
        assert_ne!(SaleStatus::Pending.next(), Some(SaleStatus::NotesIssued));
        assert_eq!(SaleStatus::NotesIssued.next(), None);
    }

    #[test]
    fn celebrant_refs_are_prefixed_and_short() {
        let reference = new_celebrant_ref();
        assert!(reference.starts_with("CEL-"));
        assert_eq!(reference.len(), 4 + 8);
        assert!(reference[4..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
