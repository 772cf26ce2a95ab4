//! Collection, index and document handlers.

use std::future::Future;
use std::sync::Arc;

use litedb_protocol::{CommandResult, Operation, Payload, TypedPayload};
use litedb_server::{CommandContext, Handler, HandlerResult, RouteTable};
use tracing::debug;

use crate::model::{Collection, Document, IndexSpec};
use crate::store::{CollectionStore, StoreError};

pub const COLLECTION_ROUTE: &str = "collections/{collectionName}";
pub const INDEX_ROUTE: &str = "collections/{collectionName}/indexes/{indexName}";
pub const DOCUMENT_ROUTE: &str = "collections/{collectionName}/documents/{documentId}";

/// Error code for a `Collection` payload whose name differs from the path.
pub const NAME_MISMATCH: &str = "name-mismatch";

/// Routes for every collection command, bound to `store`.
pub fn collection_routes(store: Arc<CollectionStore>) -> RouteTable {
    RouteTable::new()
        .route(
            COLLECTION_ROUTE,
            [
                (Operation::Create, with_payload(&store, create_collection)),
                (Operation::Delete, no_payload(&store, drop_collection)),
                (Operation::Read, no_payload(&store, read_collection)),
            ],
        )
        .route(
            INDEX_ROUTE,
            [
                (Operation::Create, with_payload(&store, create_index)),
                (Operation::Delete, no_payload(&store, drop_index)),
            ],
        )
        .route(
            DOCUMENT_ROUTE,
            [
                (Operation::Write, with_payload(&store, write_document)),
                (Operation::Update, with_payload(&store, update_document)),
                (Operation::Read, no_payload(&store, read_document)),
                (Operation::Delete, no_payload(&store, delete_document)),
            ],
        )
}

fn no_payload<F, Fut>(store: &Arc<CollectionStore>, handler: F) -> Handler
where
    F: Fn(Arc<CollectionStore>, CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let store = store.clone();
    Handler::no_payload(move |ctx| handler(store.clone(), ctx))
}

fn with_payload<T, F, Fut>(store: &Arc<CollectionStore>, handler: F) -> Handler
where
    T: Payload,
    F: Fn(Arc<CollectionStore>, CommandContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let store = store.clone();
    Handler::with_payload(move |ctx, payload: T| handler(store.clone(), ctx, payload))
}

/// Map a store outcome to a result, packing `data` on success.
fn respond<T: Payload>(ctx: &CommandContext, outcome: Result<T, StoreError>) -> HandlerResult {
    match outcome {
        Ok(data) => Ok(CommandResult::ok_with(TypedPayload::pack(&data)?)),
        Err(e) => Ok(rejected(ctx, e)),
    }
}

fn acknowledge(ctx: &CommandContext, outcome: Result<(), StoreError>) -> HandlerResult {
    match outcome {
        Ok(()) => Ok(CommandResult::ok()),
        Err(e) => Ok(rejected(ctx, e)),
    }
}

fn rejected(ctx: &CommandContext, error: StoreError) -> CommandResult {
    debug!("{}: {} rejected: {error}", ctx.client_id(), ctx.path());
    CommandResult::failure(error.code())
}

// ─────────────────────────────────────────────────────────────────────────────
// Collections
// ─────────────────────────────────────────────────────────────────────────────

async fn create_collection(
    store: Arc<CollectionStore>,
    ctx: CommandContext,
    payload: Collection,
) -> HandlerResult {
    let name: String = ctx.param("collectionName")?;
    if payload.name != name {
        debug!("Collection payload names {:?}, path names {name:?}", payload.name);
        return Ok(CommandResult::failure(NAME_MISMATCH));
    }
    respond(&ctx, store.create_collection(&name))
}

async fn drop_collection(store: Arc<CollectionStore>, ctx: CommandContext) -> HandlerResult {
    let name: String = ctx.param("collectionName")?;
    acknowledge(&ctx, store.drop_collection(&name))
}

async fn read_collection(store: Arc<CollectionStore>, ctx: CommandContext) -> HandlerResult {
    let name: String = ctx.param("collectionName")?;
    respond(&ctx, store.collection(&name))
}

// ─────────────────────────────────────────────────────────────────────────────
// Indexes
// ─────────────────────────────────────────────────────────────────────────────

async fn create_index(
    store: Arc<CollectionStore>,
    ctx: CommandContext,
    spec: IndexSpec,
) -> HandlerResult {
    let collection: String = ctx.param("collectionName")?;
    let index: String = ctx.param("indexName")?;
    respond(&ctx, store.create_index(&collection, &index, spec))
}

async fn drop_index(store: Arc<CollectionStore>, ctx: CommandContext) -> HandlerResult {
    let collection: String = ctx.param("collectionName")?;
    let index: String = ctx.param("indexName")?;
    acknowledge(&ctx, store.drop_index(&collection, &index))
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

async fn write_document(
    store: Arc<CollectionStore>,
    ctx: CommandContext,
    document: Document,
) -> HandlerResult {
    let collection: String = ctx.param("collectionName")?;
    let id: String = ctx.param("documentId")?;
    respond(&ctx, store.write_document(&collection, &id, document.body))
}

async fn update_document(
    store: Arc<CollectionStore>,
    ctx: CommandContext,
    document: Document,
) -> HandlerResult {
    let collection: String = ctx.param("collectionName")?;
    let id: String = ctx.param("documentId")?;
    respond(&ctx, store.update_document(&collection, &id, document.body))
}

async fn read_document(store: Arc<CollectionStore>, ctx: CommandContext) -> HandlerResult {
    let collection: String = ctx.param("collectionName")?;
    let id: String = ctx.param("documentId")?;
    respond(&ctx, store.document(&collection, &id))
}

async fn delete_document(store: Arc<CollectionStore>, ctx: CommandContext) -> HandlerResult {
    let collection: String = ctx.param("collectionName")?;
    let id: String = ctx.param("documentId")?;
    acknowledge(&ctx, store.delete_document(&collection, &id))
}
