//! Authentication outcome, the validator strategy, and the chain evaluator.
//!
//! # Chain rule: first validator wins
//!
//! A route carries an ordered list of validators. Only the **first** one is
//! consulted, exactly once:
//!
//! | Validators | First validator says | Result |
//! |---|---|---|
//! | none | - | public, handler runs with `authenticated = false` |
//! | ≥ 1 | authenticated | handler runs, outcome bound to request |
//! | ≥ 1 | not authenticated | `401` |
//!
//! Later entries are never consulted, even when the first one denies. An
//! outcome that claims authentication but names no principal still runs the
//! handler, and the missing id is reported to telemetry.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::HostContext;
use crate::request::Request;

/// Result of one validator run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthOutcome {
    pub authenticated: bool,
    pub principal_id: Option<String>,
}

impl AuthOutcome {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal_id: impl Into<String>) -> Self {
        Self { authenticated: true, principal_id: Some(principal_id.into()) }
    }

    pub fn denied() -> Self {
        Self::default()
    }
}

/// A pure authentication strategy: `(HostContext, Request) -> AuthOutcome`.
///
/// Validators may block on outbound I/O; that only holds up their own request.
#[async_trait]
pub trait AuthValidator: Send + Sync + 'static {
    async fn validate(&self, ctx: &HostContext, req: &Request) -> AuthOutcome;
}

pub type BoxedValidator = Arc<dyn AuthValidator>;

/// What the dispatcher should do after the auth gate.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Verdict {
    Public,
    Granted(AuthOutcome),
    Denied,
}

/// Applies the first-validator-wins rule described in the module docs.
pub(crate) async fn evaluate(validators: &[BoxedValidator], ctx: &HostContext, req: &Request) -> Verdict {
    let Some(first) = validators.first() else {
        return Verdict::Public;
    };
    let outcome = first.validate(ctx, req).await;
    if outcome.authenticated {
        if outcome.principal_id.is_none() {
            ctx.telemetry().capture_message(&format!(
                "{}: authenticated without a principal id on {}",
                req.id(),
                req.path()
            ));
        }
        tracing::debug!(request_id = %req.id(), principal = ?outcome.principal_id, "authenticated");
        Verdict::Granted(outcome)
    } else {
        tracing::debug!(request_id = %req.id(), "authentication denied");
        Verdict::Denied
    }
}
