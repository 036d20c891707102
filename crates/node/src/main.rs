mod rpc;

use std::net::SocketAddr;
use std::time::Duration;

use addrd_electrum::tcp::{
    TcpTransport, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use addrd_electrum::Endpoint;
use addrd_lookup::{default_fallback_servers, LookupService};
use addrd_primitives::Network;

struct Config {
    rpc_addr: Option<SocketAddr>,
    network: Network,
    electrum: Vec<Endpoint>,
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = parse_args()?;
    let rpc_addr = config
        .rpc_addr
        .unwrap_or_else(|| default_rpc_addr(config.network));

    let fallback = if config.electrum.is_empty() {
        default_fallback_servers()
    } else {
        config.electrum.clone()
    };
    println!(
        "Initialized lookup on {:?} with {} fallback endpoint(s)",
        config.network,
        fallback.len()
    );
    for endpoint in &fallback {
        println!("  {endpoint}");
    }

    let transport = TcpTransport {
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        request_timeout: Duration::from_secs(config.request_timeout_secs),
    };
    let service = LookupService::new(transport, fallback, config.network);
    rpc::serve_rpc(rpc_addr, service).await
}

fn default_rpc_addr(network: Network) -> SocketAddr {
    let port = match network {
        Network::Mainnet => 16_224,
        Network::Testnet => 26_224,
    };
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn parse_args() -> Result<Config, String> {
    let mut rpc_addr: Option<SocketAddr> = None;
    let mut network = Network::Mainnet;
    let mut electrum: Vec<Endpoint> = Vec::new();
    let mut connect_timeout_secs: u64 = DEFAULT_CONNECT_TIMEOUT_SECS;
    let mut request_timeout_secs: u64 = DEFAULT_REQUEST_TIMEOUT_SECS;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rpc-addr" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --rpc-addr\n{}", usage()))?;
                rpc_addr = Some(
                    value
                        .parse::<SocketAddr>()
                        .map_err(|_| format!("invalid rpc addr '{value}'\n{}", usage()))?,
                );
            }
            "--network" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --network\n{}", usage()))?;
                network = match value.as_str() {
                    "mainnet" => Network::Mainnet,
                    "testnet" => Network::Testnet,
                    _ => return Err(format!("invalid network '{value}'\n{}", usage())),
                };
            }
            "--electrum" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --electrum\n{}", usage()))?;
                let endpoint = Endpoint::parse(&value)
                    .ok_or_else(|| format!("invalid endpoint '{value}'\n{}", usage()))?;
                electrum.push(endpoint);
            }
            "--connect-timeout" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --connect-timeout\n{}", usage()))?;
                connect_timeout_secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid connect timeout '{value}'\n{}", usage()))?;
                if connect_timeout_secs == 0 {
                    return Err(format!("connect timeout must be > 0\n{}", usage()));
                }
            }
            "--request-timeout" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --request-timeout\n{}", usage()))?;
                request_timeout_secs = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid request timeout '{value}'\n{}", usage()))?;
                if request_timeout_secs == 0 {
                    return Err(format!("request timeout must be > 0\n{}", usage()));
                }
            }
            "--help" | "-h" => {
                return Err(usage());
            }
            other => {
                return Err(format!("unknown argument '{other}'\n{}", usage()));
            }
        }
    }

    Ok(Config {
        rpc_addr,
        network,
        electrum,
        connect_timeout_secs,
        request_timeout_secs,
    })
}

fn usage() -> String {
    [
        "Usage: addrd [--rpc-addr IP:PORT] [--network mainnet|testnet] [--electrum HOST:PORT] [--connect-timeout SECS] [--request-timeout SECS]",
        "",
        "Options:",
        "  --rpc-addr  Bind JSON-RPC server (default: 127.0.0.1:16224 mainnet, 26224 testnet)",
        "  --network   Network selection (default: mainnet)",
        "  --electrum  Fallback indexing server HOST:PORT (repeatable; default: public roster)",
        "  --connect-timeout  Endpoint connect timeout in seconds (default: 5)",
        "  --request-timeout  Per-query timeout in seconds (default: 20)",
    ]
    .join("\n")
}
