//! JSON-RPC surface over a hand-rolled HTTP/1.1 listener.
//!
//! One request per connection, POST only, 1 MiB cap. Core results
//! stay in integer satoshis; the `amount` field is the display-only
//! floating point rendering added at the JSON boundary.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Number, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use addrd_electrum::{Endpoint, Transport};
use addrd_lookup::{AddressSummary, BatchSummary, EndpointPolicy, LookupError, LookupService};

const MAX_REQUEST_BYTES: usize = 1024 * 1024;
const COIN: u64 = 100_000_000;

const RPC_INVALID_PARAMETER: i64 = -8;
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
const RPC_METHOD_NOT_FOUND: i64 = -32601;
const RPC_INVALID_REQUEST: i64 = -32600;
const RPC_PARSE_ERROR: i64 = -32700;
const RPC_INTERNAL_ERROR: i64 = -32603;

const RPC_METHODS: &[&str] = &["help", "ping", "getaddressdetails", "getbatchdetails"];

pub async fn serve_rpc<T>(addr: SocketAddr, service: LookupService<T>) -> Result<(), String>
where
    T: Transport + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| format!("rpc bind failed: {err}"))?;
    println!("RPC listening on http://{addr}");

    let service = Arc::new(service);
    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|err| format!("rpc accept failed: {err}"))?;
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, service).await {
                eprintln!("rpc error: {err}");
            }
        });
    }
}

async fn handle_connection<T: Transport>(
    mut stream: tokio::net::TcpStream,
    service: Arc<LookupService<T>>,
) -> Result<(), String> {
    let request = read_http_request(&mut stream).await?;
    if request.method != "POST" {
        let response = build_response("405 Method Not Allowed", "text/plain", "method not allowed");
        stream
            .write_all(&response)
            .await
            .map_err(|err| err.to_string())?;
        return Ok(());
    }

    let rpc_response = match handle_rpc_request(&request.body, service.as_ref()).await {
        Ok(value) => value,
        Err(value) => value,
    };
    let body = rpc_response.to_string();
    let response = build_response("200 OK", "application/json", &body);
    stream
        .write_all(&response)
        .await
        .map_err(|err| err.to_string())?;
    Ok(())
}

async fn handle_rpc_request<T: Transport>(
    body: &[u8],
    service: &LookupService<T>,
) -> Result<Value, Value> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| rpc_error(Value::Null, RPC_PARSE_ERROR, format!("parse error: {err}")))?;

    if value.is_array() {
        return Err(rpc_error(
            Value::Null,
            RPC_INVALID_REQUEST,
            "batch requests are not supported",
        ));
    }

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let method = value
        .get("method")
        .and_then(|value| value.as_str())
        .ok_or_else(|| rpc_error(id.clone(), RPC_INVALID_REQUEST, "missing method"))?;
    let params_value = value
        .get("params")
        .cloned()
        .unwrap_or(Value::Array(Vec::new()));
    let params = match params_value {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        _ => {
            return Err(rpc_error(
                id,
                RPC_INVALID_REQUEST,
                "params must be an array",
            ))
        }
    };

    match dispatch(method, params, service).await {
        Ok(value) => Ok(rpc_ok(id, value)),
        Err(err) => Err(rpc_error(id, err.code, err.message)),
    }
}

async fn dispatch<T: Transport>(
    method: &str,
    params: Vec<Value>,
    service: &LookupService<T>,
) -> Result<Value, RpcError> {
    match method {
        "help" => rpc_help(params),
        "ping" => rpc_ping(params),
        "getaddressdetails" => rpc_getaddressdetails(params, service).await,
        "getbatchdetails" => rpc_getbatchdetails(params, service).await,
        _ => Err(RpcError::new(RPC_METHOD_NOT_FOUND, "method not found")),
    }
}

fn rpc_help(params: Vec<Value>) -> Result<Value, RpcError> {
    if params.is_empty() {
        let methods = RPC_METHODS
            .iter()
            .map(|name| Value::String((*name).to_string()))
            .collect::<Vec<_>>();
        return Ok(Value::Array(methods));
    }
    if params.len() > 1 {
        return Err(RpcError::new(
            RPC_INVALID_PARAMETER,
            "help expects 0 or 1 parameter",
        ));
    }
    let name = params[0]
        .as_str()
        .ok_or_else(|| RpcError::new(RPC_INVALID_PARAMETER, "method name must be a string"))?;
    if RPC_METHODS.contains(&name) {
        Ok(Value::String(format!("{name} is supported")))
    } else {
        Err(RpcError::new(RPC_METHOD_NOT_FOUND, "method not found"))
    }
}

fn rpc_ping(params: Vec<Value>) -> Result<Value, RpcError> {
    ensure_no_params(&params)?;
    Ok(Value::Null)
}

async fn rpc_getaddressdetails<T: Transport>(
    params: Vec<Value>,
    service: &LookupService<T>,
) -> Result<Value, RpcError> {
    let request = parse_lookup_request(&params, false)?;
    let summary = service
        .address_details(
            &request.addresses[0],
            request.endpoint.as_ref(),
            &request.policy,
        )
        .await
        .map_err(map_lookup_error)?;
    Ok(summary_to_value(&summary))
}

async fn rpc_getbatchdetails<T: Transport>(
    params: Vec<Value>,
    service: &LookupService<T>,
) -> Result<Value, RpcError> {
    let request = parse_lookup_request(&params, true)?;
    let batch = service
        .batch_details(
            &request.addresses,
            request.endpoint.as_ref(),
            &request.policy,
        )
        .await
        .map_err(map_lookup_error)?;
    Ok(batch_to_value(&batch))
}

struct LookupRequest {
    addresses: Vec<String>,
    endpoint: Option<Endpoint>,
    policy: EndpointPolicy,
}

/// Accepts a bare string (or array of strings for batches) as
/// shorthand, or an object carrying `address`/`addresses` plus the
/// optional `endpoint` and `exclusive` routing fields.
fn parse_lookup_request(params: &[Value], batch: bool) -> Result<LookupRequest, RpcError> {
    if params.len() != 1 {
        let name = if batch {
            "getbatchdetails"
        } else {
            "getaddressdetails"
        };
        return Err(RpcError::new(
            RPC_INVALID_PARAMETER,
            format!("{name} expects 1 parameter"),
        ));
    }

    match &params[0] {
        Value::String(address) if !batch => Ok(LookupRequest {
            addresses: vec![address.clone()],
            endpoint: None,
            policy: EndpointPolicy::default(),
        }),
        Value::Array(values) if batch => Ok(LookupRequest {
            addresses: string_list(values)?,
            endpoint: None,
            policy: EndpointPolicy::default(),
        }),
        Value::Object(map) => {
            let addresses = if batch {
                let values = map
                    .get("addresses")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        RpcError::new(RPC_INVALID_PARAMETER, "addresses must be an array")
                    })?;
                string_list(values)?
            } else {
                let address = map.get("address").and_then(Value::as_str).ok_or_else(|| {
                    RpcError::new(RPC_INVALID_PARAMETER, "address must be a string")
                })?;
                vec![address.to_string()]
            };

            let endpoint = match map.get("endpoint") {
                None | Some(Value::Null) => None,
                Some(Value::String(text)) => Some(Endpoint::parse(text).ok_or_else(|| {
                    RpcError::new(
                        RPC_INVALID_PARAMETER,
                        format!("invalid endpoint '{text}', expected HOST:PORT"),
                    )
                })?),
                Some(_) => {
                    return Err(RpcError::new(
                        RPC_INVALID_PARAMETER,
                        "endpoint must be a string",
                    ))
                }
            };

            let exclusive = match map.get("exclusive") {
                None | Some(Value::Null) => false,
                Some(Value::Bool(flag)) => *flag,
                Some(_) => {
                    return Err(RpcError::new(
                        RPC_INVALID_PARAMETER,
                        "exclusive must be a boolean",
                    ))
                }
            };
            if exclusive && endpoint.is_none() {
                return Err(RpcError::new(
                    RPC_INVALID_PARAMETER,
                    "exclusive requires an endpoint",
                ));
            }

            let policy = if exclusive {
                EndpointPolicy::ExclusiveIfFlagged { exclusive: true }
            } else {
                EndpointPolicy::ExplicitThenFallback
            };
            Ok(LookupRequest {
                addresses,
                endpoint,
                policy,
            })
        }
        _ => Err(RpcError::new(
            RPC_INVALID_PARAMETER,
            if batch {
                "parameter must be an array of addresses or an object"
            } else {
                "parameter must be an address string or an object"
            },
        )),
    }
}

fn string_list(values: &[Value]) -> Result<Vec<String>, RpcError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let text = value
            .as_str()
            .ok_or_else(|| RpcError::new(RPC_INVALID_PARAMETER, "address must be a string"))?;
        out.push(text.to_string());
    }
    Ok(out)
}

fn ensure_no_params(params: &[Value]) -> Result<(), RpcError> {
    if params.is_empty() {
        Ok(())
    } else {
        Err(RpcError::new(
            RPC_INVALID_PARAMETER,
            "method takes no parameters",
        ))
    }
}

fn map_lookup_error(err: LookupError) -> RpcError {
    let code = match err {
        LookupError::InvalidAddress(_) => RPC_INVALID_ADDRESS_OR_KEY,
        LookupError::NoAddresses | LookupError::MissingEndpoint => RPC_INVALID_PARAMETER,
        LookupError::AllEndpointsFailed { .. } => RPC_INTERNAL_ERROR,
    };
    RpcError::new(code, err.to_string())
}

fn summary_to_value(summary: &AddressSummary) -> Value {
    json!({
        "address": summary.address,
        "balance": summary.balance,
        "amount": amount_to_value(summary.balance),
        "confirmed": summary.confirmed,
        "unconfirmed": summary.unconfirmed,
        "total": summary.total,
    })
}

fn batch_to_value(batch: &BatchSummary) -> Value {
    let addresses = batch
        .addresses
        .iter()
        .map(summary_to_value)
        .collect::<Vec<_>>();
    json!({
        "addresses": addresses,
        "balance": batch.total_balance,
        "amount": amount_to_value(batch.total_balance),
        "confirmed": batch.total_confirmed,
        "unconfirmed": batch.total_unconfirmed,
        "fetched": batch.fetched,
    })
}

fn amount_to_value(amount: u64) -> Value {
    let value = amount as f64 / COIN as f64;
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Number(0.into()))
}

fn rpc_ok(id: Value, result: Value) -> Value {
    json!({
        "result": result,
        "error": Value::Null,
        "id": id,
    })
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "result": Value::Null,
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

struct HttpRequest {
    method: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Result<HttpRequest, String> {
    let mut buffer = Vec::new();
    let mut temp = [0u8; 4096];
    let mut header_end = None;
    while buffer.len() < MAX_REQUEST_BYTES {
        let read = stream
            .read(&mut temp)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&temp[..read]);
        if let Some(pos) = find_header_end(&buffer) {
            header_end = Some(pos);
            break;
        }
    }

    let header_end = header_end.ok_or_else(|| "invalid http request".to_string())?;
    let header_bytes = &buffer[..header_end];
    let mut headers = HashMap::new();
    let mut lines = header_bytes.split(|byte| *byte == b'\n');
    let request_line = lines
        .next()
        .ok_or_else(|| "invalid http request".to_string())?;
    let request_line = String::from_utf8_lossy(request_line);
    let method = request_line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();

    for line in lines {
        let line = String::from_utf8_lossy(line).trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let mut body = buffer[header_end..].to_vec();
    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(body.len());
    if content_length > MAX_REQUEST_BYTES {
        return Err("request too large".to_string());
    }
    while body.len() < content_length {
        let read = stream
            .read(&mut temp)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&temp[..read]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        headers,
        body,
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn build_response(status: &str, content_type: &str, body: &str) -> Vec<u8> {
    let mut response = String::new();
    response.push_str("HTTP/1.1 ");
    response.push_str(status);
    response.push_str("\r\nContent-Type: ");
    response.push_str(content_type);
    response.push_str("\r\nContent-Length: ");
    response.push_str(&body.len().to_string());
    response.push_str("\r\nConnection: close\r\n\r\n");
    response.push_str(body);
    response.into_bytes()
}
