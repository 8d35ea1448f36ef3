//! In-memory directory.
//!
//! `MemoryDirectory` implements [`DirectoryClient`] over tokio channels, with
//! a server task per stream. It behaves like a real directory for the parts
//! dirx relies on: it assigns timestamps and etags on write, paginates by
//! opaque token, answers imports with statuses and counters, and can emit
//! the older counter shape. Only built for tests, or with the `test-support`
//! feature.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::category::Category;
use crate::client::{DirectoryClient, ExportStream, ImportResponses, ImportSink};
use crate::errors::TransportError;
use crate::export::{ExportEnvelope, ExportOptions, ExportRequest, Stats};
use crate::import::{
    ImportCounter, ImportMessage, ImportRequest, ImportResponse, ImportStatus, Opcode,
};
use crate::pagination::{
    GetObjectsRequest, GetObjectsResponse, GetRelationsRequest, GetRelationsResponse,
    PaginationResponse,
};
use crate::records::{Object, Record, Relation};

const INVALID_ARGUMENT: u32 = 3;
const UNAVAILABLE: u32 = 14;

/// Behaviour knobs for [`MemoryDirectory`].
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Capacity of every stream channel.
    pub channel_capacity: usize,
    /// Emit a counter snapshot every N import requests (0 = only at the end).
    pub counter_every: u64,
    /// Reply to imports with the older fixed-field counter shape.
    pub legacy_counters: bool,
    /// Delay applied before each import response is handed to the client.
    pub response_delay: Option<Duration>,
    /// Envelope kinds this client does not know, emitted before any data.
    pub unknown_kinds: Vec<String>,
    /// Fail the export stream after this many envelopes.
    pub fail_export_after: Option<usize>,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            counter_every: 0,
            legacy_counters: false,
            response_delay: None,
            unknown_kinds: Vec::new(),
            fail_export_after: None,
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<String, Object>,
    relations: BTreeMap<String, Relation>,
    version: u64,
}

impl Store {
    fn next_etag(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn apply(&mut self, request: &ImportRequest) -> Result<(), String> {
        let now = Utc::now();
        match (&request.msg, request.op_code) {
            (ImportMessage::Object(obj), op) => {
                if obj.object_type.is_empty() || obj.id.is_empty() {
                    return Err(format!("object '{}' is missing type or id", obj.key()));
                }
                let key = obj.identity();
                if op == Opcode::Delete {
                    self.objects.remove(&key);
                    return Ok(());
                }
                let mut stored = obj.clone();
                stored.created_at = self
                    .objects
                    .get(&key)
                    .and_then(|o| o.created_at)
                    .or(Some(now));
                stored.updated_at = Some(now);
                stored.etag = self.next_etag();
                self.objects.insert(key, stored);
            }
            (ImportMessage::Relation(rel), op) => {
                if [
                    &rel.object_type,
                    &rel.object_id,
                    &rel.relation,
                    &rel.subject_type,
                    &rel.subject_id,
                ]
                .iter()
                .any(|f| f.is_empty())
                {
                    return Err(format!("relation '{}' is incomplete", rel.key()));
                }
                let key = rel.key();
                if op == Opcode::Delete {
                    self.relations.remove(&key);
                    return Ok(());
                }
                let mut stored = rel.clone();
                stored.created_at = self
                    .relations
                    .get(&key)
                    .and_then(|r| r.created_at)
                    .or(Some(now));
                stored.updated_at = Some(now);
                stored.etag = self.next_etag();
                self.relations.insert(key, stored);
            }
        }
        Ok(())
    }
}

/// A directory held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    store: Arc<Mutex<Store>>,
    options: MemoryOptions,
    page_requests: Arc<AtomicU64>,
}

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(options: MemoryOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Store an object as if it had been imported.
    pub fn insert_object(&self, object: Object) {
        let _ = lock(&self.store).apply(&ImportRequest::set(object));
    }

    /// Store a relation as if it had been imported.
    pub fn insert_relation(&self, relation: Relation) {
        let _ = lock(&self.store).apply(&ImportRequest::set(relation));
    }

    /// Snapshot of all objects, ordered by `type:id`.
    #[must_use]
    pub fn objects(&self) -> Vec<Object> {
        lock(&self.store).objects.values().cloned().collect()
    }

    /// Snapshot of all relations, ordered by relation key.
    #[must_use]
    pub fn relations(&self) -> Vec<Relation> {
        lock(&self.store).relations.values().cloned().collect()
    }

    /// Number of paged read requests served so far.
    #[must_use]
    pub fn page_requests(&self) -> u64 {
        self.page_requests.load(Ordering::Relaxed)
    }

    fn export_envelopes(&self, request: &ExportRequest) -> Vec<ExportEnvelope> {
        let store = lock(&self.store);
        let changed = |updated: Option<chrono::DateTime<Utc>>| match request.start_from {
            None => true,
            Some(since) => updated.is_some_and(|ts| ts >= since),
        };

        let mut envelopes: Vec<ExportEnvelope> = self
            .options
            .unknown_kinds
            .iter()
            .map(|kind| ExportEnvelope::Unknown { kind: kind.clone() })
            .collect();

        if request.options.contains(ExportOptions::DATA_OBJECTS) {
            envelopes.extend(
                store
                    .objects
                    .values()
                    .filter(|o| changed(o.updated_at))
                    .cloned()
                    .map(ExportEnvelope::Object),
            );
        }
        if request.options.contains(ExportOptions::DATA_RELATIONS) {
            envelopes.extend(
                store
                    .relations
                    .values()
                    .filter(|r| changed(r.updated_at))
                    .cloned()
                    .map(ExportEnvelope::Relation),
            );
        }
        if request.options.contains(ExportOptions::STATS) {
            let mut stats = Stats::default();
            store.objects.values().for_each(|o| stats.record_object(o));
            store.relations.values().for_each(|r| stats.record_relation(r));
            envelopes.push(ExportEnvelope::Stats(stats));
        }
        envelopes
    }

    fn objects_page(
        &self,
        request: &GetObjectsRequest,
    ) -> Result<GetObjectsResponse, TransportError> {
        let size = page_size(request.page.size)?;
        let store = lock(&self.store);
        let token = request.page.token.as_str();
        let mut page: Vec<(&String, &Object)> = store
            .objects
            .iter()
            .filter(|(_, o)| request.object_type.is_empty() || o.object_type == request.object_type)
            .filter(|(k, _)| token.is_empty() || k.as_str() > token)
            .take(size + 1)
            .collect();

        let next_token = next_token(&mut page, size);
        Ok(GetObjectsResponse {
            results: page.into_iter().map(|(_, o)| o.clone()).collect(),
            page: PaginationResponse { next_token },
        })
    }

    fn relations_page(
        &self,
        request: &GetRelationsRequest,
    ) -> Result<GetRelationsResponse, TransportError> {
        let size = page_size(request.page.size)?;
        let store = lock(&self.store);
        let token = request.page.token.as_str();
        let mut page: Vec<(&String, &Relation)> = store
            .relations
            .iter()
            .filter(|(_, r)| request.filter.matches(r))
            .filter(|(k, _)| token.is_empty() || k.as_str() > token)
            .take(size + 1)
            .collect();

        let next_token = next_token(&mut page, size);
        let results: Vec<Relation> = page.into_iter().map(|(_, r)| r.clone()).collect();

        let mut objects = BTreeMap::new();
        if request.with_objects {
            for rel in &results {
                for key in [
                    format!("{}:{}", rel.object_type, rel.object_id),
                    format!("{}:{}", rel.subject_type, rel.subject_id),
                ] {
                    if let Some(obj) = store.objects.get(&key) {
                        objects.insert(key, obj.clone());
                    }
                }
            }
        }

        Ok(GetRelationsResponse {
            results,
            objects,
            page: PaginationResponse { next_token },
        })
    }
}

fn page_size(size: u32) -> Result<usize, TransportError> {
    if size == 0 {
        return Err(TransportError::status(
            INVALID_ARGUMENT,
            "page size must be positive",
        ));
    }
    Ok(size as usize)
}

/// Trim a page fetched with one look-ahead item and derive its token.
fn next_token<T>(page: &mut Vec<(&String, T)>, size: usize) -> String {
    if page.len() > size {
        page.truncate(size);
        page.last().map(|(k, _)| (*k).clone()).unwrap_or_default()
    } else {
        String::new()
    }
}

impl DirectoryClient for MemoryDirectory {
    type Export = MemoryExport;
    type ImportTx = MemoryImportTx;
    type ImportRx = MemoryImportRx;

    async fn export(&self, request: ExportRequest) -> Result<MemoryExport, TransportError> {
        let envelopes = self.export_envelopes(&request);
        let fail_after = self.options.fail_export_after;
        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));

        tokio::spawn(async move {
            for (sent, envelope) in envelopes.into_iter().enumerate() {
                if fail_after == Some(sent) {
                    let _ = tx
                        .send(Err(TransportError::status(UNAVAILABLE, "export interrupted")))
                        .await;
                    return;
                }
                if tx.send(Ok(envelope)).await.is_err() {
                    return;
                }
            }
        });

        Ok(MemoryExport { rx })
    }

    async fn import(&self) -> Result<(MemoryImportTx, MemoryImportRx), TransportError> {
        let capacity = self.options.channel_capacity.max(1);
        let (req_tx, req_rx) = mpsc::channel(capacity);
        let (resp_tx, resp_rx) = mpsc::channel(capacity);

        tokio::spawn(serve_import(
            Arc::clone(&self.store),
            self.options.clone(),
            req_rx,
            resp_tx,
        ));

        Ok((
            MemoryImportTx { tx: Some(req_tx) },
            MemoryImportRx {
                rx: resp_rx,
                delay: self.options.response_delay,
            },
        ))
    }

    async fn get_objects(
        &self,
        request: GetObjectsRequest,
    ) -> Result<GetObjectsResponse, TransportError> {
        self.page_requests.fetch_add(1, Ordering::Relaxed);
        self.objects_page(&request)
    }

    async fn get_relations(
        &self,
        request: GetRelationsRequest,
    ) -> Result<GetRelationsResponse, TransportError> {
        self.page_requests.fetch_add(1, Ordering::Relaxed);
        self.relations_page(&request)
    }
}

#[derive(Debug, Default)]
struct Tally {
    objects: ImportCounter,
    relations: ImportCounter,
}

impl Tally {
    fn get_mut(&mut self, category: Category) -> &mut ImportCounter {
        match category {
            Category::Objects => &mut self.objects,
            Category::Relations => &mut self.relations,
        }
    }

    fn responses(&self, legacy: bool) -> Vec<ImportResponse> {
        if legacy {
            return vec![ImportResponse::Legacy {
                object: Some(self.objects.clone()),
                relation: Some(self.relations.clone()),
            }];
        }
        vec![
            ImportResponse::Counter(ImportCounter {
                counter_type: "object".into(),
                ..self.objects.clone()
            }),
            ImportResponse::Counter(ImportCounter {
                counter_type: "relation".into(),
                ..self.relations.clone()
            }),
        ]
    }
}

type ResponseTx = mpsc::Sender<Result<ImportResponse, TransportError>>;

async fn serve_import(
    store: Arc<Mutex<Store>>,
    options: MemoryOptions,
    mut requests: mpsc::Receiver<ImportRequest>,
    responses: ResponseTx,
) {
    let mut tally = Tally::default();
    let mut seen = 0u64;

    while let Some(request) = requests.recv().await {
        let category = request.msg.category();
        let outcome = lock(&store).apply(&request);

        let counter = tally.get_mut(category);
        counter.recv += 1;
        match outcome {
            Ok(()) => match request.op_code {
                Opcode::Set => counter.set += 1,
                Opcode::Delete => counter.delete += 1,
            },
            Err(msg) => {
                counter.error += 1;
                let status = ImportResponse::Status(ImportStatus {
                    code: INVALID_ARGUMENT,
                    msg,
                    req: Some(request),
                });
                if responses.send(Ok(status)).await.is_err() {
                    return;
                }
            }
        }

        seen += 1;
        if options.counter_every > 0 && seen % options.counter_every == 0 {
            for response in tally.responses(options.legacy_counters) {
                if responses.send(Ok(response)).await.is_err() {
                    return;
                }
            }
        }
    }

    tracing::debug!(requests = seen, "memory import finished");
    for response in tally.responses(options.legacy_counters) {
        if responses.send(Ok(response)).await.is_err() {
            return;
        }
    }
}

/// Export stream of a [`MemoryDirectory`].
#[derive(Debug)]
pub struct MemoryExport {
    rx: mpsc::Receiver<Result<ExportEnvelope, TransportError>>,
}

impl ExportStream for MemoryExport {
    async fn recv(&mut self) -> Result<Option<ExportEnvelope>, TransportError> {
        self.rx.recv().await.transpose()
    }
}

/// Send half of a [`MemoryDirectory`] import.
#[derive(Debug)]
pub struct MemoryImportTx {
    tx: Option<mpsc::Sender<ImportRequest>>,
}

impl ImportSink for MemoryImportTx {
    async fn send(&mut self, request: ImportRequest) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::Closed("send after close".into()))?;
        tx.send(request)
            .await
            .map_err(|_| TransportError::Closed("import server went away".into()))
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

/// Receive half of a [`MemoryDirectory`] import.
#[derive(Debug)]
pub struct MemoryImportRx {
    rx: mpsc::Receiver<Result<ImportResponse, TransportError>>,
    delay: Option<Duration>,
}

impl ImportResponses for MemoryImportRx {
    async fn recv(&mut self) -> Result<Option<ImportResponse>, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.rx.recv().await.transpose()
    }
}
