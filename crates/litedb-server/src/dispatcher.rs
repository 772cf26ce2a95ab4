//! Dispatcher — turns one inbound frame into one `CommandResult`.
//!
//! Every failure is reported to the client as an error code; nothing that
//! happens while serving a single command closes the connection.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use litedb_protocol::{Command, CommandResult, ErrorCode, PayloadError, decode_command, encode_result};
use litedb_transport::MessageHandler;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::context::CommandContext;
use crate::handler::{Handler, HandlerFuture};
use crate::registry::HandlerRegistry;

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Decode `frame`, run the matching handler and build the result.
    /// The command's `id`, when present, is echoed on the result.
    pub async fn dispatch(
        &self,
        client_id: &str,
        frame: &[u8],
        cancel: &CancellationToken,
    ) -> CommandResult {
        let command = match decode_command(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("Undecodable command from {client_id}: {e}");
                return CommandResult::failure(ErrorCode::DecodeFailure);
            }
        };
        let id = command.id;
        self.execute(client_id, command, cancel).await.with_id(id)
    }

    /// Route and run an already decoded command.
    pub async fn execute(
        &self,
        client_id: &str,
        command: Command,
        cancel: &CancellationToken,
    ) -> CommandResult {
        let (handler, route_match) = match self.registry.resolve(&command.path) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("{client_id}: {e}");
                return CommandResult::failure(e.error_code());
            }
        };
        debug!(
            "{client_id}: {} -> {} {:?}",
            command.path,
            route_match.operation(),
            route_match.params()
        );

        let command = Arc::new(command);
        let context = CommandContext::new(client_id, route_match, command.clone());

        let future = match start(handler, context, &command) {
            Ok(future) => future,
            Err(code) => return CommandResult::failure(code),
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("{client_id}: '{}' cancelled by shutdown", command.path);
                return CommandResult::failure(ErrorCode::ServerShuttingDown);
            }
            outcome = AssertUnwindSafe(future).catch_unwind() => outcome,
        };

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Handler for '{}' failed: {e:#}", command.path);
                CommandResult::failure(ErrorCode::InternalServerError)
            }
            Err(panic) => {
                error!("Handler for '{}' panicked: {}", command.path, panic_message(&*panic));
                CommandResult::failure(ErrorCode::InternalServerError)
            }
        }
    }
}

/// Check the payload against the handler and build its future.
fn start(handler: &Handler, context: CommandContext, command: &Command) -> Result<HandlerFuture, ErrorCode> {
    let started = match handler {
        Handler::NoPayload(invoke) => catch_unwind(AssertUnwindSafe(|| Ok::<_, PayloadError>(invoke(context)))),
        Handler::WithPayload { type_id, invoke } => {
            let Some(payload) = command.data.as_ref() else {
                debug!("'{}' requires a {type_id} payload, none given", command.path);
                return Err(ErrorCode::MissingPayload);
            };
            catch_unwind(AssertUnwindSafe(|| invoke(context, payload)))
        }
    };

    match started {
        Ok(Ok(future)) => Ok(future),
        Ok(Err(e)) => {
            debug!("'{}': {e}", command.path);
            Err(ErrorCode::PayloadTypeMismatch)
        }
        Err(panic) => {
            error!("Handler for '{}' panicked: {}", command.path, panic_message(&*panic));
            Err(ErrorCode::InternalServerError)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl MessageHandler for Dispatcher {
    async fn handle_message(
        &self,
        client_id: &str,
        frame: Bytes,
        cancel: CancellationToken,
    ) -> Option<Bytes> {
        let result = self.dispatch(client_id, &frame, &cancel).await;
        match encode_result(&result) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                error!("Failed to encode result for {client_id}: {e}");
                None
            }
        }
    }
}
