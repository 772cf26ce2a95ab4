//! HandlerRegistry — maps route templates to per-operation handlers.

use std::collections::HashMap;

use litedb_protocol::{ErrorCode, Operation};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::handler::Handler;
use crate::route::{RouteError, RouteMatch, RouteTemplate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no route matches {0:?}")]
    NotFound(String),

    #[error("route {template:?} has no handler for operation {operation}")]
    OperationNotSupported { template: String, operation: Operation },
}

impl ResolveError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::UnknownPath,
            Self::OperationNotSupported { .. } => ErrorCode::OperationNotSupported,
        }
    }
}

/// Uncompiled route declarations, in registration order.
///
/// ```ignore
/// let table = RouteTable::new()
///     .route("collections/{collectionName}", [
///         (Operation::Create, Handler::with_payload(create_collection)),
///         (Operation::Delete, Handler::no_payload(delete_collection)),
///     ]);
/// ```
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<(String, Vec<(Operation, Handler)>)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        template: impl Into<String>,
        handlers: impl IntoIterator<Item = (Operation, Handler)>,
    ) -> Self {
        self.routes.push((template.into(), handlers.into_iter().collect()));
        self
    }

    /// Append every route of `other` after the routes of `self`.
    pub fn merge(mut self, other: RouteTable) -> Self {
        self.routes.extend(other.routes);
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug)]
struct RouteEntry {
    template: RouteTemplate,
    handlers: HashMap<Operation, Handler>,
}

/// Compiled routes. Built once at startup and read-only while serving.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    routes: Vec<RouteEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every template in `table`. Fails on the first invalid one.
    pub fn from_table(table: RouteTable) -> Result<Self, RouteError> {
        let mut registry = Self::new();
        for (template, handlers) in table.routes {
            let template = RouteTemplate::compile(&template)?;
            registry.register(template, handlers);
        }
        info!("Handler registry built ({} routes)", registry.routes.len());
        Ok(registry)
    }

    /// Register `handlers` under `template`.
    ///
    /// Re-registering the same template string replaces the earlier handler
    /// set but keeps its position. Within one call, a repeated operation
    /// keeps the last handler.
    pub fn register(
        &mut self,
        template: RouteTemplate,
        handlers: impl IntoIterator<Item = (Operation, Handler)>,
    ) {
        let handlers: HashMap<Operation, Handler> = handlers.into_iter().collect();
        debug!(
            "Registering route {} for {:?}",
            template,
            handlers.keys().map(Operation::as_str).collect::<Vec<_>>()
        );

        match self.routes.iter_mut().find(|entry| entry.template == template) {
            Some(existing) => {
                warn!("Route {} registered twice, replacing earlier handlers", template);
                existing.handlers = handlers;
            }
            None => self.routes.push(RouteEntry { template, handlers }),
        }
    }

    /// Find the handler for a command string such as `collections/users:create`.
    ///
    /// When several templates match, the one with the most literal text
    /// wins; ties go to the route registered first.
    pub fn resolve(&self, command: &str) -> Result<(&Handler, RouteMatch), ResolveError> {
        let mut best: Option<(&RouteEntry, RouteMatch)> = None;
        for entry in &self.routes {
            let Some(route_match) = entry.template.matches(command) else {
                continue;
            };
            let better = best
                .as_ref()
                .is_none_or(|(current, _)| entry.template.specificity() > current.template.specificity());
            if better {
                best = Some((entry, route_match));
            }
        }

        let (entry, route_match) = best.ok_or_else(|| ResolveError::NotFound(command.to_string()))?;
        match entry.handlers.get(&route_match.operation()) {
            Some(handler) => Ok((handler, route_match)),
            None => Err(ResolveError::OperationNotSupported {
                template: entry.template.to_string(),
                operation: route_match.operation(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn templates(&self) -> impl Iterator<Item = &RouteTemplate> {
        self.routes.iter().map(|entry| &entry.template)
    }

    /// Operations registered for `template`, if it is known.
    pub fn operations(&self, template: &str) -> Option<Vec<Operation>> {
        self.routes
            .iter()
            .find(|entry| entry.template.as_str() == template)
            .map(|entry| {
                Operation::ALL
                    .into_iter()
                    .filter(|op| entry.handlers.contains_key(op))
                    .collect()
            })
    }
}
