//! Per-invocation orchestration of compensable methods
//!
//! The interceptor wraps each compensable business method: it resolves the
//! method's role from its propagation, the ambient transaction, and the
//! inbound context, then routes to the matching proceed path. Roots own the
//! commit/rollback decision; providers attach to the inbound context and
//! execute whichever phase it carries.

use crate::error::{BoxError, Result, TccError};
use crate::manager::TransactionManager;
use crate::method_context::{ErrorMatcher, MethodInvocation, MethodRole};
use std::future::Future;
use std::sync::Arc;
use tcc_common::TransactionStatus;

/// Orchestrates the TCC behavior of intercepted business methods
pub struct CompensableInterceptor {
    manager: Arc<TransactionManager>,
    delay_cancel_errors: Vec<ErrorMatcher>,
}

impl CompensableInterceptor {
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self {
            manager,
            delay_cancel_errors: Vec::new(),
        }
    }

    /// Add an interceptor-global delay-cancel error matcher
    ///
    /// The effective set for a call is the union of these and the
    /// declaration's own matchers.
    pub fn with_delay_cancel_error(mut self, matcher: ErrorMatcher) -> Self {
        self.delay_cancel_errors.push(matcher);
        self
    }

    /// Intercept one compensable call
    ///
    /// Establishes the chain's transaction stack when called at the
    /// outermost compensable method of a chain; nested compensable calls on
    /// the same task share it.
    pub async fn intercept<T, F, Fut>(&self, invocation: MethodInvocation, body: F) -> Result<T>
    where
        T: Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        if TransactionManager::in_scope() {
            self.dispatch(invocation, body).await
        } else {
            TransactionManager::scope(self.dispatch(invocation, body)).await
        }
    }

    async fn dispatch<T, F, Fut>(&self, invocation: MethodInvocation, body: F) -> Result<T>
    where
        T: Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        let transaction_active = self.manager.is_transaction_active();

        if !invocation.is_legal(transaction_active) {
            return Err(TccError::System(format!(
                "no active transaction while propagation is mandatory for method {}",
                invocation.method
            )));
        }

        match invocation.method_role(transaction_active) {
            MethodRole::Root => self.root_method_proceed(&invocation, body).await,
            MethodRole::Provider => self.provider_method_proceed(&invocation, body).await,
            MethodRole::Normal => body().await.map_err(TccError::Trying),
        }
    }

    /// Root path: begin, try, then commit or compensate
    async fn root_method_proceed<T, F, Fut>(
        &self,
        invocation: &MethodInvocation,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        let annotation = invocation.annotation();
        let transaction = self.manager.begin(invocation.unique_identity()).await?;

        let outcome = match body().await {
            Ok(value) => self
                .manager
                .commit(annotation.async_confirm)
                .await
                .map(|_| value),
            Err(trying_error) => {
                if self.is_delay_cancel(&trying_error, &annotation.delay_cancel_errors) {
                    // Recovery cancels this one after its timeout elapses.
                    Err(TccError::Trying(trying_error))
                } else {
                    tracing::warn!(
                        method = %invocation.method,
                        error = %trying_error,
                        "trying failed, compensating"
                    );
                    match self.manager.rollback(annotation.async_cancel).await {
                        Ok(()) => Err(TccError::Trying(trying_error)),
                        Err(rollback_error) => Err(rollback_error),
                    }
                }
            }
        };

        self.manager.clean_after_completion(Some(&transaction))?;
        outcome
    }

    /// Provider path: attach to the inbound context's phase
    async fn provider_method_proceed<T, F, Fut>(
        &self,
        invocation: &MethodInvocation,
        body: F,
    ) -> Result<T>
    where
        T: Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, BoxError>>,
    {
        let annotation = invocation.annotation();
        let context = invocation.transaction_context().ok_or_else(|| {
            TccError::System(format!(
                "provider method {} invoked without a transaction context",
                invocation.method
            ))
        })?;

        let (transaction, outcome) = match context.status {
            TransactionStatus::Trying => {
                let transaction = self.manager.propagation_new_begin(context).await?;
                let outcome = body().await.map_err(TccError::Trying);
                (Some(transaction), outcome)
            }
            TransactionStatus::Confirming => {
                match self.manager.propagation_exist_begin(context).await {
                    Ok(transaction) => {
                        let outcome = self
                            .manager
                            .commit(annotation.async_confirm)
                            .await
                            .map(|_| T::default());
                        (Some(transaction), outcome)
                    }
                    // The branch already confirmed and deleted itself.
                    Err(TccError::NoExistedTransaction(_)) => (None, Ok(T::default())),
                    Err(other) => (None, Err(other)),
                }
            }
            TransactionStatus::Cancelling => {
                match self.manager.propagation_exist_begin(context).await {
                    Ok(transaction) => {
                        let outcome = self
                            .manager
                            .rollback(annotation.async_cancel)
                            .await
                            .map(|_| T::default());
                        (Some(transaction), outcome)
                    }
                    // The branch already cancelled and deleted itself.
                    Err(TccError::NoExistedTransaction(_)) => (None, Ok(T::default())),
                    Err(other) => (None, Err(other)),
                }
            }
        };

        self.manager.clean_after_completion(transaction.as_ref())?;
        outcome
    }

    /// A throwable defers compensation when it, or its root cause, matches
    /// any matcher in the union of the global and per-declaration sets
    fn is_delay_cancel(&self, error: &BoxError, declared: &[ErrorMatcher]) -> bool {
        let error: &(dyn std::error::Error + 'static) = &**error;
        let root = root_cause(error);
        self.delay_cancel_errors
            .iter()
            .chain(declared)
            .any(|matcher| matcher(error) || matcher(root))
    }
}

fn root_cause<'a>(error: &'a (dyn std::error::Error + 'static)) -> &'a (dyn std::error::Error + 'static) {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}
