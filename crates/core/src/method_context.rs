//! Compensable declarations and per-invocation method context
//!
//! A compensable method's declarative surface (confirm/cancel names,
//! propagation, async flags, delay-cancel error set) travels as a plain
//! config value. The method context pairs it with the inbound transaction
//! context to resolve the role an invocation plays in its transaction.

use std::fmt;
use tcc_common::{Propagation, TransactionContext};

/// Matches one error type within a delay-cancel set
pub type ErrorMatcher = fn(&(dyn std::error::Error + 'static)) -> bool;

/// Build a matcher for a concrete error type
///
/// The interceptor applies matchers to a business error and to its root
/// cause, so wrapped errors still defer compensation.
pub fn delay_cancel<E: std::error::Error + 'static>() -> ErrorMatcher {
    |error| error.is::<E>()
}

/// Role a compensable invocation plays in its transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodRole {
    /// Opens a root transaction and owns the commit/rollback decision
    Root,
    /// Attaches to an inbound context as a branch
    Provider,
    /// Runs inside an existing transaction without opening one
    Normal,
}

/// Declarative surface of one compensable method
#[derive(Debug, Clone)]
pub struct Compensable {
    /// Name of the confirm method on the same component
    pub confirm_method: String,
    /// Name of the cancel method on the same component
    pub cancel_method: String,
    pub propagation: Propagation,
    /// Run the confirm phase on the worker pool instead of inline
    pub async_confirm: bool,
    /// Run the cancel phase on the worker pool instead of inline
    pub async_cancel: bool,
    /// Errors that defer compensation to recovery instead of cancelling now
    pub delay_cancel_errors: Vec<ErrorMatcher>,
}

impl Compensable {
    /// Declare a compensable method with its confirm and cancel names
    pub fn new(confirm_method: impl Into<String>, cancel_method: impl Into<String>) -> Self {
        Self {
            confirm_method: confirm_method.into(),
            cancel_method: cancel_method.into(),
            propagation: Propagation::default(),
            async_confirm: false,
            async_cancel: false,
            delay_cancel_errors: Vec::new(),
        }
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_async_confirm(mut self, async_confirm: bool) -> Self {
        self.async_confirm = async_confirm;
        self
    }

    pub fn with_async_cancel(mut self, async_cancel: bool) -> Self {
        self.async_cancel = async_cancel;
        self
    }

    /// Add a delay-cancel error matcher to this declaration
    pub fn with_delay_cancel_error(mut self, matcher: ErrorMatcher) -> Self {
        self.delay_cancel_errors.push(matcher);
        self
    }
}

/// One intercepted compensable call
#[derive(Clone)]
pub struct MethodInvocation {
    /// Method name, for diagnostics
    pub method: String,
    pub compensable: Compensable,
    /// Inbound context found among the call's arguments, if any
    pub context: Option<TransactionContext>,
    /// Annotation-designated business key seeding root idempotence
    pub unique_id: Option<String>,
}

impl MethodInvocation {
    pub fn new(method: impl Into<String>, compensable: Compensable) -> Self {
        Self {
            method: method.into(),
            compensable,
            context: None,
            unique_id: None,
        }
    }

    /// Attach the inbound transaction context extracted from the arguments
    pub fn with_context(mut self, context: TransactionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach the business key used as the root idempotence identity
    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Self {
        self.unique_id = Some(unique_id.into());
        self
    }

    /// The compensable declaration for this call
    pub fn annotation(&self) -> &Compensable {
        &self.compensable
    }

    /// The inbound transaction context, if the arguments carried one
    pub fn transaction_context(&self) -> Option<&TransactionContext> {
        self.context.as_ref()
    }

    /// Idempotence key for a root begin, stable across retries
    pub fn unique_identity(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Resolve the role this invocation plays
    pub fn method_role(&self, transaction_active: bool) -> MethodRole {
        let has_context = self.context.is_some();
        match self.compensable.propagation {
            Propagation::RequiresNew => MethodRole::Root,
            Propagation::Required if !transaction_active && !has_context => MethodRole::Root,
            Propagation::Required | Propagation::Mandatory
                if !transaction_active && has_context =>
            {
                MethodRole::Provider
            }
            _ => MethodRole::Normal,
        }
    }

    /// MANDATORY propagation requires an ambient transaction or an inbound
    /// context
    pub fn is_legal(&self, transaction_active: bool) -> bool {
        !(self.compensable.propagation == Propagation::Mandatory
            && !transaction_active
            && self.context.is_none())
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("method", &self.method)
            .field("context", &self.context)
            .field("unique_id", &self.unique_id)
            .finish_non_exhaustive()
    }
}
