//! Feed Client Integration Tests
//!
//! Runs the exchange feed client against a local WebSocket server speaking
//! the Bybit trade protocol.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use volume_delta_service::infrastructure::exchanges::{
    BybitCodec, ConnectionState, FeedClient, FeedClientConfig, FeedClientError, ReconnectConfig,
};
use volume_delta_service::{Side, Symbol, TradeEvent};

const TRADE_FRAME: &str = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1672304486868,"data":[{"T":1672304486865,"s":"BTCUSDT","S":"Buy","v":"0.5","p":"16578.50"},{"T":1672304486866,"s":"BTCUSDT","S":"Sell","v":"0.25","p":"16578.00"}]}"#;

fn config(url: String, max_attempts: u32) -> FeedClientConfig {
    FeedClientConfig {
        url,
        symbols: vec![Symbol::new("BTCUSDT")],
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        },
        heartbeat_interval: Duration::from_secs(20),
    }
}

fn client(
    url: String,
    max_attempts: u32,
) -> (Arc<FeedClient>, mpsc::Receiver<TradeEvent>, CancellationToken) {
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let client = Arc::new(FeedClient::with_codec(
        config(url, max_attempts),
        Box::new(BybitCodec::new()),
        tx,
        cancel.clone(),
    ));
    (client, rx, cancel)
}

/// Start a server that closes the first `drop_first` connections right after
/// the subscribe request, then streams one trade frame and stays open.
///
/// Returns the URL and a channel of the subscribe requests received.
async fn start_server(drop_first: usize) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sub_tx, sub_rx) = mpsc::unbounded_channel();
    let connections = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let sub_tx = sub_tx.clone();
            let n = connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

                if let Some(Ok(Message::Text(request))) = ws.next().await {
                    let _ = sub_tx.send(request.as_str().to_owned());
                }

                if n < drop_first {
                    let _ = ws.close(None).await;
                    return;
                }

                ws.send(Message::Text(TRADE_FRAME.into())).await.unwrap();
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    (format!("ws://{addr}"), sub_rx)
}

async fn next_trade(rx: &mut mpsc::Receiver<TradeEvent>) -> TradeEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for trade")
        .expect("trade channel closed")
}

#[tokio::test]
async fn subscribes_and_forwards_trades() {
    let (url, mut subscriptions) = start_server(0).await;
    let (client, mut trades, cancel) = client(url, 0);
    let state = client.state();
    let task = tokio::spawn(Arc::clone(&client).run());

    let request = timeout(Duration::from_secs(5), subscriptions.recv())
        .await
        .unwrap()
        .unwrap();
    let request: serde_json::Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["op"], "subscribe");
    assert_eq!(request["args"][0], "publicTrade.BTCUSDT");

    let buy = next_trade(&mut trades).await;
    let sell = next_trade(&mut trades).await;
    assert_eq!(buy.source.as_str(), "bybit");
    assert_eq!((buy.side, buy.quantity), (Side::Buy, 0.5));
    assert_eq!((sell.side, sell.quantity), (Side::Sell, 0.25));

    assert!(state.is_connected());
    assert_eq!(state.trades_received(), 2);

    cancel.cancel();
    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert_eq!(state.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_server_close() {
    let (url, mut subscriptions) = start_server(1).await;
    let (client, mut trades, cancel) = client(url, 0);
    let state = client.state();
    let task = tokio::spawn(Arc::clone(&client).run());

    let trade = next_trade(&mut trades).await;
    assert_eq!(trade.symbol, Symbol::new("BTCUSDT"));

    // One subscribe per connection
    assert!(subscriptions.recv().await.is_some());
    assert!(subscriptions.recv().await.is_some());
    // A successful reconnect clears the attempt counter
    assert!(state.is_connected());
    assert_eq!(state.reconnect_attempts(), 0);

    cancel.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn gives_up_when_reconnect_budget_is_exhausted() {
    // Reserve a port, then free it so connections are refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let (client, _trades, _cancel) = client(url, 2);
    let state = client.state();

    let result = timeout(Duration::from_secs(5), Arc::clone(&client).run())
        .await
        .unwrap();

    assert!(matches!(result, Err(FeedClientError::Reconnect(_))));
    assert_eq!(state.reconnect_attempts(), 2);
    assert_eq!(state.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn stops_when_trade_channel_closes() {
    let (url, _subscriptions) = start_server(0).await;
    let (client, trades, _cancel) = client(url, 0);
    drop(trades);

    let result = timeout(Duration::from_secs(5), Arc::clone(&client).run())
        .await
        .unwrap();

    assert!(matches!(result, Err(FeedClientError::ChannelClosed)));
}
