//! LiteDB Server — routes path-addressed commands to registered handlers.
//!
//! A command string such as `collections/users/indexes/by_name:delete` is
//! matched against route templates (`collections/{collectionName}/indexes/{indexName}`),
//! the trailing operation selects the handler, and the handler's result is
//! sent back on the originating connection.

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod registry;
pub mod route;
pub mod server;

pub use context::{CommandContext, FromParameter, ParameterError};
pub use dispatcher::Dispatcher;
pub use handler::{Handler, HandlerError, HandlerResult};
pub use registry::{HandlerRegistry, ResolveError, RouteTable};
pub use route::{RouteError, RouteMatch, RouteTemplate};
pub use server::{RunningServer, Server, ServerError};
