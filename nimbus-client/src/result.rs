/*
 * Copyright Nimbus Contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

//! The lazy result of a dispatched request.
//!
//! [`SendResult`] is handed back before any network I/O has happened. The
//! full send-sign-retry sequence runs the first time [`SendResult::resolve`]
//! (or any accessor) is awaited, and exactly once: afterwards the result holds
//! the terminal state and every further access returns the cached response or
//! re-surfaces the cached error without re-dispatching.

use crate::error::SdkError;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub(crate) type ResponseFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<Bytes>, SdkError>> + Send + 'static>>;

enum State {
    Pending(ResponseFuture),
    Resolved(http::Response<Bytes>),
    Failed(SdkError),
    Cancelled(SdkError),
}

pub struct SendResult {
    state: State,
}

impl fmt::Debug for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "Pending",
            State::Resolved(_) => "Resolved",
            State::Failed(_) => "Failed",
            State::Cancelled(_) => "Cancelled",
        };
        f.debug_struct("SendResult").field("state", &state).finish()
    }
}

impl SendResult {
    pub(crate) fn new(future: ResponseFuture) -> Self {
        SendResult {
            state: State::Pending(future),
        }
    }

    /// Drives the request to completion if it has not completed yet, then
    /// returns the terminal state. This is the only state transition; repeated
    /// calls return the cached outcome.
    pub async fn resolve(&mut self) -> Result<&http::Response<Bytes>, &SdkError> {
        let outcome = match &mut self.state {
            State::Pending(future) => Some(future.await),
            _ => None,
        };
        if let Some(outcome) = outcome {
            self.state = match outcome {
                Ok(response) => State::Resolved(response),
                Err(err) => State::Failed(err),
            };
        }
        match &self.state {
            State::Resolved(response) => Ok(response),
            State::Failed(err) | State::Cancelled(err) => Err(err),
            State::Pending(_) => unreachable!("resolve() always leaves a terminal state"),
        }
    }

    /// Aborts an in-flight request by dropping its future. Results that have
    /// already reached a terminal state are left as they are.
    pub fn cancel(&mut self) {
        if matches!(self.state, State::Pending(_)) {
            self.state = State::Cancelled(SdkError::Cancelled);
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, State::Resolved(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, State::Cancelled(_))
    }

    /// Resolves and returns the response status.
    pub async fn status(&mut self) -> Result<http::StatusCode, &SdkError> {
        self.resolve().await.map(|response| response.status())
    }

    /// Resolves and returns the response body.
    pub async fn body(&mut self) -> Result<&Bytes, &SdkError> {
        self.resolve().await.map(|response| response.body())
    }
}
