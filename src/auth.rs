// Authenticated principal boundary

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::info;
use uuid::Uuid;

use crate::database::DbPool;
use crate::error::LedgerError;
use crate::models::{CreateUserRequest, Role, User};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity attached to every request by the fronting auth service. The
/// ledger trusts these gateway-injected headers and nothing in the request
/// body.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn from_parts(user_id: &str, role: &str) -> Option<Self> {
        Some(Self {
            user_id: Uuid::parse_str(user_id).ok()?,
            role: role.parse().ok()?,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(LedgerError::Unauthorized)?;
        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(LedgerError::Unauthorized)?;

        Principal::from_parts(user_id, role).ok_or(LedgerError::Unauthorized)
    }
}

/// Provisioning cannot mint privileged identities; admin roles are granted
/// only through `set_role` by an existing super admin.
pub fn validate_new_user(req: &CreateUserRequest) -> Result<(), LedgerError> {
    if req.display_name.trim().is_empty() || req.phone.trim().is_empty() {
        return Err(LedgerError::Validation("display name and phone are required"));
    }
    if req.role.is_some_and(|r| r.is_admin()) {
        return Err(LedgerError::Unauthorized);
    }
    Ok(())
}

/// Minimal identity provisioning so ledger rows have a user to reference.
/// Registration and credential handling live in the auth service.
pub async fn create_user(pool: &DbPool, req: CreateUserRequest) -> Result<User, LedgerError> {
    validate_new_user(&req)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (display_name, phone, role) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(req.display_name.trim())
    .bind(req.phone.trim())
    .bind(req.role.unwrap_or(Role::User))
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Admin-only role change. Granting an admin role takes a super admin.
pub async fn set_role(
    pool: &DbPool,
    principal: &Principal,
    user_id: Uuid,
    role: Role,
) -> Result<User, LedgerError> {
    if !principal.role.is_admin() {
        return Err(LedgerError::Unauthorized);
    }
    if role.is_admin() && principal.role != Role::SuperAdmin {
        return Err(LedgerError::Unauthorized);
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET role = $2 WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    let user = user.ok_or(LedgerError::NotFound("user"))?;
    info!("role of user {} set to {}", user.id, user.role.as_str());
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn new_user(role: Option<Role>) -> CreateUserRequest {
        CreateUserRequest {
            display_name: "Ada O.".into(),
            phone: "+2348000000001".into(),
            role,
        }
    }

    #[test]
    fn provisioning_cannot_mint_admins() {
        assert!(validate_new_user(&new_user(None)).is_ok());
        assert!(validate_new_user(&new_user(Some(Role::Vendor))).is_ok());
        assert!(validate_new_user(&new_user(Some(Role::Both))).is_ok());
        assert!(matches!(
            validate_new_user(&new_user(Some(Role::Admin))),
            Err(LedgerError::Unauthorized)
        ));
        assert!(matches!(
            validate_new_user(&new_user(Some(Role::SuperAdmin))),
            Err(LedgerError::Unauthorized)
        ));
    }

    #[test]
    fn provisioning_requires_name_and_phone() {
        let mut req = new_user(None);
        req.phone = "  ".into();
        assert!(matches!(
            validate_new_user(&req),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn principal_parses_valid_parts() {
        let id = Uuid::new_v4();
        let principal = Principal::from_parts(&id.to_string(), "vendor").unwrap();
        assert_eq!(principal.user_id, id);
        assert_eq!(principal.role, Role::Vendor);
    }

    #[test]
    fn principal_rejects_garbage() {
        assert!(Principal::from_parts("not-a-uuid", "vendor").is_none());
        assert!(Principal::from_parts(&Uuid::new_v4().to_string(), "root").is_none());
    }

    #[tokio::test]
    async fn extractor_requires_both_headers() {
        let (mut parts, _) = Request::builder()
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .unwrap()
            .into_parts();
        let result = Principal::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(LedgerError::Unauthorized)));

        let (mut parts, _) = Request::builder()
            .header(USER_ID_HEADER, Uuid::new_v4().to_string())
            .header(USER_ROLE_HEADER, "celebrant")
            .body(())
            .unwrap()
            .into_parts();
        let principal = Principal::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(principal.role, Role::Celebrant);
    }
}
