use super::{QuoteCandidateSet, QuoteSource};
use crate::errors::Result;
use crate::models::{ChainFamily, ExecutionPayload, QuoteCandidate, SwapRequest};
use crate::utils::decimal_to_f64;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_QUOTE_API_URL: &str = "http://bsccentral.velvetdao.xyz:3000";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BestAmountOutBody<'a> {
    amount: f64,
    token_in: &'a str,
    token_out: &'a str,
    sender: &'a str,
    receiver: &'a str,
    chain_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapDataBody<'a> {
    slippage: f64,
    amount: f64,
    token_in: &'a str,
    token_out: &'a str,
    sender: &'a str,
    amount_out: f64,
    protocol: &'a str,
    receiver: &'a str,
    chain_id: u64,
}

/// Transaction fields, either inline on a route or returned by `/swap-data`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxFields {
    to: Option<String>,
    data: Option<String>,
    value: Option<Value>,
    swap_transaction: Option<String>,
    last_valid_block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteDto {
    #[serde(alias = "protocol")]
    provider: String,
    amount_out: Value,
    #[serde(default, alias = "priceImpact")]
    price_impact_bps: Option<f64>,
    #[serde(default)]
    approval_address: Option<String>,
    #[serde(flatten)]
    tx: TxFields,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BestAmountOutResponse {
    Ranked(Vec<RouteDto>),
    Wrapped { routes: Vec<RouteDto> },
    Single(RouteDto),
}

impl BestAmountOutResponse {
    fn into_routes(self) -> Vec<RouteDto> {
        match self {
            BestAmountOutResponse::Ranked(routes) => routes,
            BestAmountOutResponse::Wrapped { routes } => routes,
            BestAmountOutResponse::Single(route) => vec![route],
        }
    }
}

/// Client for the aggregator's quoting endpoints.
#[derive(Clone)]
pub struct HttpQuoteClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpQuoteClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // A trailing slash keeps `join` from dropping the last path segment.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        Ok(Self {
            http: reqwest::Client::new(),
            base: Url::parse(&normalized)?,
        })
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base.join(path)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn best_routes(&self, request: &SwapRequest, amount: f64) -> Result<Vec<RouteDto>> {
        let body = BestAmountOutBody {
            amount,
            token_in: &request.token_in,
            token_out: &request.token_out,
            sender: &request.sender,
            receiver: &request.receiver,
            chain_id: request.chain_id,
        };
        let response: BestAmountOutResponse = self.post("best-amount-out", &body).await?;
        Ok(response.into_routes())
    }

    async fn swap_data(&self, body: &SwapDataBody<'_>) -> Result<TxFields> {
        self.post("swap-data", body).await
    }
}

/// `/swap-data` body for a route; `None` when the quoted amount is not numeric.
fn swap_data_body<'a>(
    request: &'a SwapRequest,
    amount: f64,
    protocol: &'a str,
    amount_out: &str,
) -> Option<SwapDataBody<'a>> {
    Some(SwapDataBody {
        slippage: f64::from(request.slippage_bps) / 100.0,
        amount,
        token_in: &request.token_in,
        token_out: &request.token_out,
        sender: &request.sender,
        amount_out: decimal_to_f64(amount_out)?,
        protocol,
        receiver: &request.receiver,
        chain_id: request.chain_id,
    })
}

#[async_trait]
impl QuoteSource for HttpQuoteClient {
    async fn fetch(&self, request: &SwapRequest) -> QuoteCandidateSet {
        let Some(amount) = decimal_to_f64(&request.amount_in) else {
            warn!(amount_in = %request.amount_in, "[QUOTE] amount is not a number");
            return QuoteCandidateSet::empty();
        };

        let routes = match self.best_routes(request, amount).await {
            Ok(routes) => routes,
            Err(e) => {
                warn!(error = %e, "[QUOTE] best-amount-out failed");
                return QuoteCandidateSet::empty();
            }
        };

        let family = request.chain_family();
        let mut candidates = Vec::with_capacity(routes.len());
        for route in routes {
            let amount_out = amount_to_string(&route.amount_out);
            let payload = match payload_from_fields(family, &route.tx) {
                Some(payload) => payload,
                None => {
                    let Some(body) =
                        swap_data_body(request, amount, &route.provider, &amount_out)
                    else {
                        warn!(provider = %route.provider, amount_out = %amount_out, "[QUOTE] unparseable amountOut, dropping route");
                        continue;
                    };
                    match self.swap_data(&body).await {
                        Ok(fields) => match payload_from_fields(family, &fields) {
                            Some(payload) => payload,
                            None => {
                                warn!(provider = %route.provider, "[QUOTE] swap-data response has no usable payload");
                                continue;
                            }
                        },
                        Err(e) => {
                            warn!(provider = %route.provider, error = %e, "[QUOTE] swap-data failed, dropping route");
                            continue;
                        }
                    }
                }
            };
            debug!(provider = %route.provider, amount_out = %amount_out, "[QUOTE] candidate");
            candidates.push(QuoteCandidate {
                provider: route.provider,
                amount_out,
                price_impact_bps: route.price_impact_bps.unwrap_or(0.0),
                approval_address: route.approval_address.filter(|a| !a.trim().is_empty()),
                execution_payload: payload,
            });
        }

        info!(count = candidates.len(), "[QUOTE] candidates fetched");
        QuoteCandidateSet::new(candidates)
    }
}

fn amount_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn payload_from_fields(family: ChainFamily, tx: &TxFields) -> Option<ExecutionPayload> {
    match family {
        ChainFamily::Solana => tx
            .swap_transaction
            .as_ref()
            .map(|encoded| ExecutionPayload::Versioned {
                transaction: encoded.clone(),
                last_valid_block_height: tx.last_valid_block_height,
            }),
        ChainFamily::Evm => {
            let to = tx.to.as_ref()?;
            Some(ExecutionPayload::EvmCall {
                to: to.clone(),
                data: tx.data.clone().unwrap_or_else(|| "0x".to_string()),
                value: tx.value.as_ref().map(amount_to_string).unwrap_or_else(|| "0".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_route_without_payload() {
        let raw = r#"{"protocol":"pancake","amountOut":"123.4","approvalAddress":""}"#;
        let routes = serde_json::from_str::<BestAmountOutResponse>(raw)
            .unwrap()
            .into_routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].provider, "pancake");
        assert_eq!(amount_to_string(&routes[0].amount_out), "123.4");
        assert!(payload_from_fields(ChainFamily::Evm, &routes[0].tx).is_none());
    }

    #[test]
    fn parses_ranked_routes_with_inline_payloads() {
        let raw = r#"[
            {"provider":"a","amountOut":100,"approvalAddress":"0x1111111254eeb25477b68fb85ed929f73a960582",
             "to":"0x1111111254eeb25477b68fb85ed929f73a960582","data":"0xdeadbeef","value":"0"},
            {"provider":"b","amountOut":"95","priceImpactBps":12.5,
             "to":"0x2222222222222222222222222222222222222222","data":"0x","value":1000}
        ]"#;
        let routes = serde_json::from_str::<BestAmountOutResponse>(raw)
            .unwrap()
            .into_routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(amount_to_string(&routes[0].amount_out), "100");
        assert_eq!(routes[1].price_impact_bps, Some(12.5));

        let payload = payload_from_fields(ChainFamily::Evm, &routes[1].tx).unwrap();
        assert_eq!(
            payload,
            ExecutionPayload::EvmCall {
                to: "0x2222222222222222222222222222222222222222".into(),
                data: "0x".into(),
                value: "1000".into(),
            }
        );
    }

    #[test]
    fn parses_wrapped_solana_routes() {
        let raw = r#"{"routes":[{"provider":"jupiter","amountOut":"5","swapTransaction":"AQID","lastValidBlockHeight":42}]}"#;
        let routes = serde_json::from_str::<BestAmountOutResponse>(raw)
            .unwrap()
            .into_routes();
        let payload = payload_from_fields(ChainFamily::Solana, &routes[0].tx).unwrap();
        assert_eq!(
            payload,
            ExecutionPayload::Versioned {
                transaction: "AQID".into(),
                last_valid_block_height: Some(42),
            }
        );
    }

    #[test]
    fn swap_data_body_needs_numeric_amount_out() {
        let request = SwapRequest {
            amount_in: "2".into(),
            token_in: "a".into(),
            token_out: "b".into(),
            sender: "s".into(),
            receiver: "r".into(),
            chain_id: 56,
            slippage_bps: 50,
        };
        let body = swap_data_body(&request, 2.0, "pancake", "123.5").unwrap();
        assert_eq!(body.amount_out, 123.5);
        assert_eq!(body.slippage, 0.5);

        assert!(swap_data_body(&request, 2.0, "pancake", "n/a").is_none());
        assert!(swap_data_body(&request, 2.0, "pancake", "null").is_none());
    }

    #[test]
    fn malformed_response_is_rejected() {
        assert!(serde_json::from_str::<BestAmountOutResponse>(r#"{"error":"no route"}"#).is_err());
    }

    #[test]
    fn base_url_keeps_path_prefix() {
        let client = HttpQuoteClient::new("http://localhost:3000/api").unwrap();
        assert_eq!(
            client.base.join("swap-data").unwrap().as_str(),
            "http://localhost:3000/api/swap-data"
        );
    }

    #[tokio::test]
    async fn unreachable_service_yields_empty_set() {
        let client = HttpQuoteClient::new("http://127.0.0.1:9").unwrap();
        let request = SwapRequest {
            amount_in: "1".into(),
            token_in: "a".into(),
            token_out: "b".into(),
            sender: "s".into(),
            receiver: "r".into(),
            chain_id: 56,
            slippage_bps: 50,
        };
        let set = client.fetch(&request).await;
        assert!(set.is_empty());
    }
}
