//! Tenant resolution middleware.
//!
//! Every request carries a tenant id: taken from the `x-tenant-id` header
//! when present and non-empty, otherwise the default tenant. Handlers read
//! it back through a request extension.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

pub const DEFAULT_TENANT: &str = "default-tenant";
const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug, Clone)]
pub struct TenantId(pub String);

pub async fn resolve_tenant(mut request: Request, next: Next) -> Response {
    let tenant = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_TENANT)
        .to_string();
    request.extensions_mut().insert(TenantId(tenant));
    next.run(request).await
}
