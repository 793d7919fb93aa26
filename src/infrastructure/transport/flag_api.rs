use async_trait::async_trait;
use reqwest::Method;
use serde::de::IgnoredAny;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use super::client::ResilientTransport;
use super::types::{
    BatchEvaluateFlagsRequest, BatchEvaluateGatesRequest, BatchResponse, BatchTrackEventsRequest,
    EvaluateFlagRequest, EvaluateGateRequest, FlagResponse, GateResponse,
};
use crate::domain::errors::SdkResult;
use crate::domain::models::{Event, RemoteEvaluation, UserContext};
use crate::domain::ports::FlagApi;

const EVALUATE_FLAG_PATH: &str = "/api/v1/sdk/evaluate";
const EVALUATE_FLAGS_PATH: &str = "/api/v1/sdk/evaluate/batch";
const EVALUATE_GATE_PATH: &str = "/api/v1/sdk/feature-gates/evaluate";
const EVALUATE_GATES_PATH: &str = "/api/v1/sdk/feature-gates/evaluate/batch";
const TRACK_EVENT_PATH: &str = "/api/v1/sdk/events";
const TRACK_EVENTS_PATH: &str = "/api/v1/sdk/events/batch";

/// [`FlagApi`] over the flag service's HTTP API
#[derive(Debug)]
pub struct HttpFlagApi {
    transport: ResilientTransport,
    environment: String,
}

impl HttpFlagApi {
    pub fn new(transport: ResilientTransport, environment: impl Into<String>) -> Self {
        Self {
            transport,
            environment: environment.into(),
        }
    }

    pub const fn transport(&self) -> &ResilientTransport {
        &self.transport
    }
}

#[async_trait]
impl FlagApi for HttpFlagApi {
    async fn evaluate_flag(
        &self,
        flag_key: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<RemoteEvaluation> {
        let context = user.stamped();
        let request = EvaluateFlagRequest {
            flag_key,
            context: &context,
        };
        let response: FlagResponse = self
            .transport
            .execute(Method::POST, EVALUATE_FLAG_PATH, Some(&request), cancel)
            .await?;
        Ok(response.into())
    }

    async fn evaluate_flags(
        &self,
        flag_keys: &[String],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<HashMap<String, RemoteEvaluation>> {
        let context = user.stamped();
        let request = BatchEvaluateFlagsRequest {
            flag_keys,
            context: &context,
            environment: &self.environment,
        };
        let response: BatchResponse<FlagResponse> = self
            .transport
            .execute(Method::POST, EVALUATE_FLAGS_PATH, Some(&request), cancel)
            .await?;
        Ok(response.into_evaluations())
    }

    async fn evaluate_gate(
        &self,
        gate_key: &str,
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<RemoteEvaluation> {
        let context = user.stamped();
        let request = EvaluateGateRequest {
            gate_key,
            context: &context,
        };
        let response: GateResponse = self
            .transport
            .execute(Method::POST, EVALUATE_GATE_PATH, Some(&request), cancel)
            .await?;
        Ok(response.into())
    }

    async fn evaluate_gates(
        &self,
        gate_keys: &[String],
        user: &UserContext,
        cancel: &CancellationToken,
    ) -> SdkResult<HashMap<String, RemoteEvaluation>> {
        let context = user.stamped();
        let request = BatchEvaluateGatesRequest {
            gate_keys,
            user_id: &context.user_id,
            environment: &self.environment,
            user_context: &context,
        };
        let response: BatchResponse<GateResponse> = self
            .transport
            .execute(Method::POST, EVALUATE_GATES_PATH, Some(&request), cancel)
            .await?;
        Ok(response.into_evaluations())
    }

    async fn track_event(&self, event: &Event, cancel: &CancellationToken) -> SdkResult<()> {
        let _: IgnoredAny = self
            .transport
            .execute(Method::POST, TRACK_EVENT_PATH, Some(event), cancel)
            .await?;
        Ok(())
    }

    async fn track_events(&self, events: &[Event], cancel: &CancellationToken) -> SdkResult<()> {
        let request = BatchTrackEventsRequest { events };
        let _: IgnoredAny = self
            .transport
            .execute(Method::POST, TRACK_EVENTS_PATH, Some(&request), cancel)
            .await?;
        Ok(())
    }
}
