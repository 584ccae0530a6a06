// src/hal/traits.rs
//! Core HAL trait for the opened streaming session

use crate::hal::types::{Completion, EndpointInfo, SessionError, TransferRequest};
use std::time::Duration;

/// An opened device session exposing one streaming endpoint.
///
/// Discovery, firmware upload and register configuration happen before the
/// session reaches the pipeline. The acquisition stage takes exclusive
/// ownership of it; no other actor issues I/O against the endpoint.
pub trait StreamingSession: Send {
    /// Endpoint characteristics
    fn endpoint(&self) -> &EndpointInfo;

    /// Queue a request. The buffer is owned by the session until the request
    /// comes back through [`StreamingSession::wait_completion`] or
    /// [`StreamingSession::cancel_all`].
    fn submit(&mut self, request: TransferRequest) -> Result<(), SessionError>;

    /// Wait up to `timeout` for the next completed request
    fn wait_completion(&mut self, timeout: Duration) -> Result<Option<Completion>, SessionError>;

    /// Cancel every outstanding request and hand their buffers back
    fn cancel_all(&mut self) -> Vec<TransferRequest>;
}

impl<T: StreamingSession + ?Sized> StreamingSession for Box<T> {
    fn endpoint(&self) -> &EndpointInfo {
        (**self).endpoint()
    }

    fn submit(&mut self, request: TransferRequest) -> Result<(), SessionError> {
        (**self).submit(request)
    }

    fn wait_completion(&mut self, timeout: Duration) -> Result<Option<Completion>, SessionError> {
        (**self).wait_completion(timeout)
    }

    fn cancel_all(&mut self) -> Vec<TransferRequest> {
        (**self).cancel_all()
    }
}
