//! Transport seam between dirx and a directory service.
//!
//! The traits mirror the four RPCs dirx consumes: a server-streaming export,
//! a bidirectional import, and two cursor-paginated reads. The import stream
//! is handed out as two halves so the sending and receiving tasks never share
//! a handle.
//!
//! All returned futures are `Send` so pipelines can run on a multi-threaded
//! runtime. Dropping a future aborts the call.

use std::future::Future;

use crate::errors::TransportError;
use crate::export::{ExportEnvelope, ExportRequest};
use crate::import::{ImportRequest, ImportResponse};
use crate::pagination::{
    GetObjectsRequest, GetObjectsResponse, GetRelationsRequest, GetRelationsResponse,
};

/// Receive half of an export call.
pub trait ExportStream: Send {
    /// Next envelope, or `None` once the server closed the stream cleanly.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<ExportEnvelope>, TransportError>> + Send;
}

/// Send half of an import call.
pub trait ImportSink: Send {
    fn send(
        &mut self,
        request: ImportRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Signal end of input. The receive half stays open until the server
    /// finishes replying.
    fn close_send(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Receive half of an import call.
pub trait ImportResponses: Send {
    /// Next response, or `None` once the server closed its side.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<ImportResponse>, TransportError>> + Send;
}

/// A connection to a directory service.
pub trait DirectoryClient: Send + Sync {
    type Export: ExportStream + 'static;
    type ImportTx: ImportSink + 'static;
    type ImportRx: ImportResponses + 'static;

    fn export(
        &self,
        request: ExportRequest,
    ) -> impl Future<Output = Result<Self::Export, TransportError>> + Send;

    fn import(
        &self,
    ) -> impl Future<Output = Result<(Self::ImportTx, Self::ImportRx), TransportError>> + Send;

    fn get_objects(
        &self,
        request: GetObjectsRequest,
    ) -> impl Future<Output = Result<GetObjectsResponse, TransportError>> + Send;

    fn get_relations(
        &self,
        request: GetRelationsRequest,
    ) -> impl Future<Output = Result<GetRelationsResponse, TransportError>> + Send;
}
