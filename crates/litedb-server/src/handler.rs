//! Handler references registered per (route, operation).
//!
//! A handler either takes no payload or declares the exact [`Payload`] type
//! it expects. The payload type is captured when the handler is built, so
//! dispatch never has to inspect types at runtime.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use litedb_protocol::{CommandResult, Payload, PayloadError, TypedPayload};
use thiserror::Error;

use crate::context::{CommandContext, ParameterError};

/// Result returned by every handler.
pub type HandlerResult = Result<CommandResult, HandlerError>;

pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

type NoPayloadFn = dyn Fn(CommandContext) -> HandlerFuture + Send + Sync;
type WithPayloadFn =
    dyn Fn(CommandContext, &TypedPayload) -> Result<HandlerFuture, PayloadError> + Send + Sync;

/// Failure raised by a handler. The dispatcher reports every variant to
/// the client as `internal-server-error`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Clone)]
pub enum Handler {
    NoPayload(Arc<NoPayloadFn>),
    WithPayload {
        type_id: &'static str,
        invoke: Arc<WithPayloadFn>,
    },
}

impl Handler {
    pub fn no_payload<F, Fut>(handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::NoPayload(Arc::new(move |ctx| handler(ctx).boxed()))
    }

    /// Build a handler that requires a payload of type `T`.
    pub fn with_payload<T, F, Fut>(handler: F) -> Self
    where
        T: Payload,
        F: Fn(CommandContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::WithPayload {
            type_id: T::TYPE_ID,
            invoke: Arc::new(move |ctx, payload| {
                let data = payload.unpack::<T>()?;
                Ok(handler(ctx, data).boxed())
            }),
        }
    }

    pub fn requires_payload(&self) -> bool {
        matches!(self, Self::WithPayload { .. })
    }

    /// Expected payload type identifier, if a payload is required.
    pub fn payload_type(&self) -> Option<&'static str> {
        match self {
            Self::NoPayload(_) => None,
            Self::WithPayload { type_id, .. } => Some(type_id),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPayload(_) => f.write_str("Handler::NoPayload"),
            Self::WithPayload { type_id, .. } => {
                f.debug_struct("Handler::WithPayload").field("type_id", type_id).finish()
            }
        }
    }
}
