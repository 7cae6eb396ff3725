//! JSON-RPC client behaviour against a mocked node

use chain_rpc::{ChainRpcConfig, RpcChainNode};
use explorer_common::{ChainNode, ExplorerError};
use num_bigint::BigUint;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(endpoints: Vec<String>) -> ChainRpcConfig {
    ChainRpcConfig {
        endpoints,
        request_timeout_secs: 2,
        max_retries: 3,
        ..ChainRpcConfig::default()
    }
}

async fn mount_result(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": result,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_balance_parses_hex_quantity() {
    let server = MockServer::start().await;
    mount_result(&server, "eth_getBalance", json!("0x10f0cf064dd59200000")).await;

    let node = RpcChainNode::new(&config_for(vec![server.uri()])).unwrap();
    let balance = node
        .get_balance("0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1")
        .await
        .unwrap();

    assert_eq!(balance, "5000000000000000000000".parse::<BigUint>().unwrap());
}

#[tokio::test]
async fn test_get_code_and_empty_code() {
    let server = MockServer::start().await;
    mount_result(&server, "eth_getCode", json!("0x6080604052")).await;

    let node = RpcChainNode::new(&config_for(vec![server.uri()])).unwrap();
    let code = node.get_code("0xc1").await.unwrap();
    assert_eq!(code, vec![0x60, 0x80, 0x60, 0x40, 0x52]);

    let empty_server = MockServer::start().await;
    mount_result(&empty_server, "eth_getCode", json!("0x")).await;
    let node = RpcChainNode::new(&config_for(vec![empty_server.uri()])).unwrap();
    assert!(node.get_code("0xa1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fails_over_to_second_endpoint() {
    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&broken)
        .await;

    let healthy = MockServer::start().await;
    mount_result(&healthy, "eth_blockNumber", json!("0x2a")).await;

    let node = RpcChainNode::new(&config_for(vec![broken.uri(), healthy.uri()])).unwrap();
    assert_eq!(node.block_number().await.unwrap(), 42);
}

#[tokio::test]
async fn test_rpc_error_is_surfaced_as_chain_node_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted" },
        })))
        .mount(&server)
        .await;

    let node = RpcChainNode::new(&config_for(vec![server.uri()])).unwrap();
    let err = node.call("0xc1", &[0x95, 0xd8, 0x9b, 0x41]).await.unwrap_err();
    assert!(matches!(err, ExplorerError::ChainNode(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_contract_creations_in_block() {
    let server = MockServer::start().await;
    mount_result(
        &server,
        "eth_getBlockByNumber",
        json!({ "number": "0x64", "timestamp": "0x65920080" }),
    )
    .await;
    mount_result(
        &server,
        "eth_getBlockReceipts",
        json!([
            {
                "transactionHash": "0xaaa",
                "from": "0xA1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1",
                "contractAddress": null,
                "status": "0x1"
            },
            {
                "transactionHash": "0xbbb",
                "from": "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1",
                "contractAddress": "0xC1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1C1",
                "status": "0x1"
            },
            {
                "transactionHash": "0xccc",
                "from": "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1",
                "contractAddress": "0xd1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1d1",
                "status": "0x0"
            }
        ]),
    )
    .await;

    let node = RpcChainNode::new(&config_for(vec![server.uri()])).unwrap();
    let creations = node.contract_creations_in_block(100).await.unwrap();

    assert_eq!(creations.len(), 1);
    let creation = &creations[0];
    assert_eq!(
        creation.contract_address,
        "0xc1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1c1"
    );
    assert_eq!(
        creation.provenance.creator_address,
        "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
    );
    assert_eq!(creation.provenance.creation_tx_hash, "0xbbb");
    assert_eq!(creation.provenance.creation_block, 100);
    assert_eq!(creation.provenance.creation_timestamp.timestamp(), 0x65920080);
}
