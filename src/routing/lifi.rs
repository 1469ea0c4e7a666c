//! LI.FI REST client implementing [`RoutingEngine`].
//!
//! Itineraries sized by input come from `/advanced/routes`, itineraries sized
//! by destination output from `/quote/toAmount`, and itineraries with a
//! destination-side call from `/quote/contractCalls`. Each leg is
//! executed by populating its transaction, approving the leg's spender when
//! the input is an ERC20, submitting through the wallet, then polling
//! `/status` until the bridge reports a terminal state.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

use super::{Itinerary, ItineraryLeg, LegUpdate, RouteRequest, RoutingEngine};
use crate::chain::catalog::{explorer_tx_url, NATIVE_TOKEN};
use crate::config::Config;
use crate::error::{FundingError, RoutingError};
use crate::market::contract::approve_calldata;
use crate::signing::{TxRequest, WalletSigner};

/// Step description returned by LI.FI (only the fields we read).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiStep {
    #[serde(default)]
    tool: String,
    action: LifiAction,
    #[serde(default)]
    estimate: Option<LifiEstimate>,
    #[serde(default)]
    transaction_request: Option<LifiTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiAction {
    from_chain_id: u64,
    to_chain_id: u64,
    #[serde(default)]
    from_amount: Option<String>,
    #[serde(default)]
    from_token: Option<LifiToken>,
}

#[derive(Debug, Clone, Deserialize)]
struct LifiToken {
    address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiEstimate {
    #[serde(default)]
    approval_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LifiTransaction {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas_limit: Option<String>,
    #[serde(default)]
    chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutesResponse {
    #[serde(default)]
    routes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    substatus_message: Option<String>,
    #[serde(default)]
    receiving: Option<StatusReceiving>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusReceiving {
    #[serde(default)]
    tx_hash: Option<String>,
}

/// LI.FI routing engine.
#[derive(Debug, Clone)]
pub struct LifiRouter {
    http: reqwest::Client,
    base_url: String,
    integrator: String,
    api_key: Option<String>,
    status_poll: Duration,
    max_status_polls: u32,
}

impl LifiRouter {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, FundingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.lifi_api_url.trim_end_matches('/').to_string(),
            integrator: config.lifi_integrator.clone(),
            api_key: config.lifi_api_key.clone(),
            status_poll: Duration::from_millis(config.route_status_poll_ms),
            max_status_polls: config.route_status_max_polls,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("x-lifi-api-key", key),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header("x-lifi-api-key", key),
            None => builder,
        }
    }

    fn routes_body(&self, request: &RouteRequest, from_amount: U256) -> Value {
        json!({
            "fromChainId": request.from_chain_id,
            "fromAmount": from_amount.to_string(),
            "fromTokenAddress": request.from_token.to_string(),
            "fromAddress": request.from_address.to_string(),
            "toChainId": request.to_chain_id,
            "toTokenAddress": request.to_token.to_string(),
            "toAddress": request.to_address.to_string(),
            "options": {
                "integrator": self.integrator,
                "order": "CHEAPEST",
            },
        })
    }

    fn contract_calls_body(&self, request: &RouteRequest) -> Option<Value> {
        let call = request.embedded_call.as_ref()?;
        let to_amount = request.to_amount.unwrap_or(call.from_amount);
        Some(json!({
            "fromChain": request.from_chain_id,
            "fromToken": request.from_token.to_string(),
            "fromAddress": request.from_address.to_string(),
            "toChain": request.to_chain_id,
            "toToken": request.to_token.to_string(),
            "toAmount": to_amount.to_string(),
            "integrator": self.integrator,
            "contractCalls": [{
                "fromAmount": call.from_amount.to_string(),
                "fromTokenAddress": call.from_token.to_string(),
                "toContractAddress": call.to_contract.to_string(),
                "toContractCallData": call.calldata.to_string(),
                "toContractGasLimit": call.gas_limit.to_string(),
            }],
        }))
    }

    fn to_amount_query(&self, request: &RouteRequest, to_amount: U256) -> Vec<(&'static str, String)> {
        vec![
            ("fromChain", request.from_chain_id.to_string()),
            ("fromToken", request.from_token.to_string()),
            ("fromAddress", request.from_address.to_string()),
            ("toChain", request.to_chain_id.to_string()),
            ("toToken", request.to_token.to_string()),
            ("toAddress", request.to_address.to_string()),
            ("toAmount", to_amount.to_string()),
            ("integrator", self.integrator.clone()),
            ("order", "CHEAPEST".to_string()),
        ]
    }

    async fn fetch_route(&self, body: Value) -> Result<Option<Value>, RoutingError> {
        let response = self
            .post("/advanced/routes")
            .json(&body)
            .send()
            .await
            .map_err(|e| RoutingError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RoutingError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        let routes: RoutesResponse = response
            .json()
            .await
            .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;
        Ok(routes.routes.into_iter().next())
    }

    /// Single-step quote from `/quote/contractCalls` or `/quote/toAmount`,
    /// wrapped into route shape.
    async fn fetch_quote(&self, builder: reqwest::RequestBuilder) -> Result<Option<Value>, RoutingError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RoutingError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RoutingError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        let step: Value = response
            .json()
            .await
            .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;
        Ok(Some(quote_as_route(step)))
    }

    async fn populate_step(&self, step: &Value) -> Result<Value, RoutingError> {
        let response = self
            .post("/advanced/stepTransaction")
            .json(step)
            .send()
            .await
            .map_err(|e| RoutingError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RoutingError::RequestFailed(format!(
                "stepTransaction returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RoutingError::InvalidResponse(e.to_string()))
    }

    async fn wait_for_leg(&self, tx_hash: &str, step: &LifiStep) -> Result<Option<String>, RoutingError> {
        for attempt in 0..self.max_status_polls {
            let response = self
                .get("/status")
                .query(&[
                    ("txHash", tx_hash.to_string()),
                    ("fromChain", step.action.from_chain_id.to_string()),
                    ("toChain", step.action.to_chain_id.to_string()),
                    ("bridge", step.tool.clone()),
                ])
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let status: StatusResponse = resp
                        .json()
                        .await
                        .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;

                    debug!(attempt, status = %status.status, "Leg status");
                    match status.status.as_str() {
                        "DONE" => {
                            return Ok(status.receiving.and_then(|r| r.tx_hash));
                        }
                        "FAILED" | "INVALID" => {
                            return Err(RoutingError::RequestFailed(
                                status
                                    .substatus_message
                                    .unwrap_or_else(|| "bridge transfer failed".to_string()),
                            ));
                        }
                        _ => {}
                    }
                }
                Ok(resp) => debug!(attempt, status = %resp.status(), "Status not available yet"),
                Err(e) => warn!(attempt, error = %e, "Status request failed"),
            }

            tokio::time::sleep(self.status_poll).await;
        }

        Err(RoutingError::RequestFailed(format!(
            "transfer {} not confirmed after {} status checks",
            tx_hash, self.max_status_polls
        )))
    }

    async fn execute_leg(
        &self,
        index: usize,
        raw_step: &Value,
        wallet: &dyn WalletSigner,
        progress: &UnboundedSender<LegUpdate>,
    ) -> Result<(), RoutingError> {
        let mut raw_step = raw_step.clone();
        let mut step: LifiStep = parse_step(&raw_step)?;

        if step.transaction_request.is_none() {
            raw_step = self.populate_step(&raw_step).await?;
            step = parse_step(&raw_step)?;
        }

        let chain_id = step.action.from_chain_id;
        wallet.switch_chain(chain_id).await?;

        if let Some(approval) = approval_for(&step)? {
            debug!(leg = index, spender = %approval.0, "Approving leg input");
            wallet
                .sign_and_send(TxRequest::call(
                    chain_id,
                    approval.2,
                    approve_calldata(approval.0, approval.1),
                ))
                .await?;
        }

        let tx = transaction_for(&step, chain_id)?;
        let tx_hash = wallet.sign_and_send(tx).await?;
        let link = explorer_tx_url(chain_id, &tx_hash);
        let _ = progress.send(LegUpdate::pending(index).with_tx(tx_hash.clone(), link.clone()));

        let receiving = if step.action.from_chain_id != step.action.to_chain_id {
            self.wait_for_leg(&tx_hash, &step).await.map_err(|e| RoutingError::LegFailed {
                leg: index,
                message: e.to_string(),
            })?
        } else {
            None
        };

        if let Some(received) = &receiving {
            debug!(leg = index, receiving = %received, "Destination transfer observed");
        }

        let _ = progress.send(LegUpdate::done(index, Some(tx_hash), link));
        Ok(())
    }
}

/// Wrap a single contract-calls quote into route shape.
fn quote_as_route(step: Value) -> Value {
    let id = step.get("id").cloned().unwrap_or(Value::Null);
    let to_amount_min = step
        .pointer("/estimate/toAmountMin")
        .cloned()
        .unwrap_or(Value::Null);
    json!({ "id": id, "toAmountMin": to_amount_min, "steps": [step] })
}

fn parse_step(raw: &Value) -> Result<LifiStep, RoutingError> {
    serde_json::from_value(raw.clone()).map_err(|e| RoutingError::InvalidResponse(e.to_string()))
}

fn parse_u256(raw: &str) -> Result<U256, RoutingError> {
    U256::from_str(raw).map_err(|e| RoutingError::InvalidResponse(format!("bad number {}: {}", raw, e)))
}

fn parse_address(raw: &str) -> Result<Address, RoutingError> {
    raw.parse()
        .map_err(|e| RoutingError::InvalidResponse(format!("bad address {}: {}", raw, e)))
}

/// Spender, amount and token to approve before a leg, for ERC20 inputs.
fn approval_for(step: &LifiStep) -> Result<Option<(Address, U256, Address)>, RoutingError> {
    let Some(token) = &step.action.from_token else {
        return Ok(None);
    };
    let token = parse_address(&token.address)?;
    if token == NATIVE_TOKEN {
        return Ok(None);
    }

    let spender = step
        .estimate
        .as_ref()
        .and_then(|e| e.approval_address.as_deref());
    let (Some(spender), Some(amount)) = (spender, step.action.from_amount.as_deref()) else {
        return Ok(None);
    };

    Ok(Some((parse_address(spender)?, parse_u256(amount)?, token)))
}

fn transaction_for(step: &LifiStep, chain_id: u64) -> Result<TxRequest, RoutingError> {
    let tx = step
        .transaction_request
        .as_ref()
        .ok_or_else(|| RoutingError::InvalidResponse("step has no transaction".to_string()))?;

    let data = Bytes::from_str(&tx.data)
        .map_err(|e| RoutingError::InvalidResponse(format!("bad calldata: {}", e)))?;
    let value = match &tx.value {
        Some(v) => parse_u256(v)?,
        None => U256::ZERO,
    };
    let gas_limit = match &tx.gas_limit {
        Some(g) => Some(parse_u256(g)?.saturating_to::<u64>()),
        None => None,
    };

    Ok(TxRequest {
        chain_id: tx.chain_id.unwrap_or(chain_id),
        to: parse_address(&tx.to)?,
        data,
        value,
        gas_limit,
    })
}

/// Build an [`Itinerary`] from a LI.FI route object.
fn itinerary_from_route(route: Value, embeds_call: bool) -> Result<Itinerary, RoutingError> {
    let id = route
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("lifi-route")
        .to_string();

    let steps = route
        .get("steps")
        .and_then(Value::as_array)
        .ok_or_else(|| RoutingError::InvalidResponse("route has no steps".to_string()))?;

    let legs = steps
        .iter()
        .map(|raw| {
            parse_step(raw).map(|step| ItineraryLeg {
                from_chain_id: step.action.from_chain_id,
                to_chain_id: step.action.to_chain_id,
                tool: step.tool,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let to_amount_min = route
        .get("toAmountMin")
        .and_then(Value::as_str)
        .map(parse_u256)
        .transpose()?;

    Ok(Itinerary::new(id, legs, embeds_call, to_amount_min, route))
}

#[async_trait]
impl RoutingEngine for LifiRouter {
    fn supports_embedded_calls(&self) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(from_chain = request.from_chain_id, to_chain = request.to_chain_id))]
    async fn get_route(&self, request: &RouteRequest) -> Result<Option<Itinerary>, RoutingError> {
        let (route, embeds_call) = if let Some(body) = self.contract_calls_body(request) {
            (self.fetch_quote(self.post("/quote/contractCalls").json(&body)).await?, true)
        } else if let Some(to_amount) = request.to_amount {
            let query = self.to_amount_query(request, to_amount);
            (self.fetch_quote(self.get("/quote/toAmount").query(&query)).await?, false)
        } else if let Some(from_amount) = request.from_amount {
            (self.fetch_route(self.routes_body(request, from_amount)).await?, false)
        } else {
            return Err(RoutingError::InvalidRequest(
                "either fromAmount or toAmount is required".to_string(),
            ));
        };

        let Some(route) = route else {
            info!("No route available");
            return Ok(None);
        };

        let itinerary = itinerary_from_route(route, embeds_call)?;
        info!(route_id = %itinerary.id, legs = itinerary.legs.len(), "Route found");
        Ok(Some(itinerary))
    }

    #[instrument(skip(self, itinerary, wallet, progress), fields(route_id = %itinerary.id))]
    async fn execute(
        &self,
        itinerary: &Itinerary,
        wallet: &dyn WalletSigner,
        progress: UnboundedSender<LegUpdate>,
    ) -> Result<(), RoutingError> {
        let steps = itinerary
            .payload
            .0
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| RoutingError::InvalidResponse("route has no steps".to_string()))?;

        for (index, raw_step) in steps.iter().enumerate() {
            let _ = progress.send(LegUpdate::pending(index));
            if let Err(e) = self.execute_leg(index, raw_step, wallet, &progress).await {
                let _ = progress.send(LegUpdate::failed(index, e.to_string()));
                return Err(e);
            }
        }

        info!("Route executed");
        Ok(())
    }
}
