use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// Permission scopes a caller may hold. Mutating catalog or document state
/// requires the matching write scope; read scopes gate the matcher queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    CatalogRead,
    CatalogWrite,
    DocumentWrite,
}

/// Identity and permission scope for one unit of work.
///
/// Webhook-triggered operations run under [`ExecutionContext::system`]
/// instead of impersonating an administrative user through ambient state;
/// every service entry point takes the context explicitly.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    actor: String,
    scopes: HashSet<Scope>,
}

impl ExecutionContext {
    pub fn new(actor: impl Into<String>, scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            actor: actor.into(),
            scopes: scopes.into_iter().collect(),
        }
    }

    /// Context for internally triggered work (webhooks, queued jobs).
    pub fn system() -> Self {
        Self::new(
            "system",
            [Scope::CatalogRead, Scope::CatalogWrite, Scope::DocumentWrite],
        )
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn require(&self, scope: Scope) -> Result<(), ServiceError> {
        if self.scopes.contains(&scope) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "actor {} lacks {:?} scope",
                self.actor, scope
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_context_holds_all_scopes() {
        let ctx = ExecutionContext::system();
        assert!(ctx.require(Scope::CatalogWrite).is_ok());
        assert!(ctx.require(Scope::DocumentWrite).is_ok());
    }

    #[test]
    fn missing_scope_is_permission_denied() {
        let ctx = ExecutionContext::new("reporting", [Scope::CatalogRead]);
        let err = ctx.require(Scope::CatalogWrite).unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }
}
