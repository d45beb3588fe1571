/*
[INPUT]:  Dashboard fixtures over a mock transport and scripted snapshots
[OUTPUT]: Test results for feeds, widgets and shutdown
[POS]:    Integration tests - dashboard behaviour
[UPDATE]: When feed wiring or widget use cases change
*/

mod common;

use coinpulse_adapter::{ContractAddress, Money, Trade};
use coinpulse_dashboard::config::WidgetSeed;
use coinpulse_dashboard::{Position, WidgetKind};
use common::{
    BONK, ScriptedSnapshots, WIF, dashboard_fixture, dashboard_fixture_at, eventually,
    price_frame, temp_layout_path, trade_frame,
};
use tokio_test::assert_ok;

fn hashes(trades: &[Trade]) -> Vec<String> {
    trades.iter().map(|t| t.transaction_hash.clone()).collect()
}

fn cleanup_layout(path: &std::path::Path) {
    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[tokio::test]
async fn test_price_widget_seeds_then_follows_stream() {
    let fx = dashboard_fixture(ScriptedSnapshots::new(2.0, &[]));
    let widget = assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::LivePrice, BONK, Position::default())
            .await
    );
    let address = widget.contract_address.clone();

    let seeded = fx.dashboard.prices().get_price(&address).expect("snapshot price");
    assert_eq!(seeded.price_usd, Money::usd(2.0).unwrap());
    assert_eq!(seeded.metadata.symbol, "BONK");

    assert_ok!(fx.dashboard.start().await);
    let sent = fx.transport.sent_of("token-details");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["payload"]["tokens"][0]["address"], BONK);

    fx.transport.push_frame(&price_frame(BONK, 2.5));
    let expected = Money::usd(2.5).unwrap();
    assert!(
        eventually(|| {
            fx.dashboard
                .prices()
                .get_price(&address)
                .is_some_and(|price| price.price_usd == expected)
        })
        .await
    );

    fx.dashboard.shutdown().await;
    cleanup_layout(&fx.layout_path);
}

#[tokio::test]
async fn test_trade_widget_merges_stream_into_history() {
    let fx = dashboard_fixture(ScriptedSnapshots::new(1.0, &["h3", "h2", "h1"]));
    let widget = assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::TradeFeed, BONK, Position::default())
            .await
    );
    let address = widget.contract_address.clone();
    assert_eq!(
        hashes(&fx.dashboard.trades().get_trades(&address)),
        vec!["h3", "h2", "h1"]
    );

    assert_ok!(fx.dashboard.start().await);
    assert_eq!(fx.transport.sent_of("fast-trade").len(), 1);

    fx.transport.push_frame(&trade_frame(BONK, "h4"));
    fx.transport.push_frame(&trade_frame(BONK, "h4"));
    fx.transport.push_frame(&trade_frame(BONK, "h2"));

    assert!(eventually(|| fx.dashboard.trades().get_trades(&address).len() == 4).await);
    let trades = fx.dashboard.trades().get_trades(&address);
    assert_eq!(hashes(&trades), vec!["h4", "h3", "h2", "h1"]);
    assert_eq!(trades[0].amount, Money::usd(42.0).unwrap());

    fx.dashboard.shutdown().await;
    cleanup_layout(&fx.layout_path);
}

#[tokio::test]
async fn test_removing_widget_flushes_pending_trades() {
    let fx = dashboard_fixture(ScriptedSnapshots::new(1.0, &[]));
    let widget = assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::TradeFeed, BONK, Position::default())
            .await
    );
    assert_ok!(fx.dashboard.start().await);

    fx.transport.push_frame(&trade_frame(BONK, "late"));
    let removed = assert_ok!(fx.dashboard.remove_widget(widget.id).await);
    assert_eq!(removed.id, widget.id);

    let trades = fx.dashboard.trades().get_trades(&widget.contract_address);
    assert_eq!(hashes(&trades), vec!["late"]);
    assert_eq!(fx.dashboard.feed_count().await, 0);
    assert!(fx.dashboard.widgets().await.is_empty());

    fx.dashboard.shutdown().await;
    cleanup_layout(&fx.layout_path);
}

#[tokio::test]
async fn test_snapshot_failure_still_starts_feed() {
    let fx = dashboard_fixture(ScriptedSnapshots::failing());
    let widget = assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::LivePrice, BONK, Position::default())
            .await
    );
    let address = widget.contract_address.clone();
    assert!(fx.dashboard.prices().get_price(&address).is_none());
    assert_eq!(fx.dashboard.feed_count().await, 1);

    assert_ok!(fx.dashboard.start().await);
    fx.transport.push_frame(&price_frame(BONK, 3.0));
    assert!(eventually(|| fx.dashboard.prices().get_price(&address).is_some()).await);

    fx.dashboard.shutdown().await;
    cleanup_layout(&fx.layout_path);
}

#[tokio::test]
async fn test_invalid_address_is_rejected() {
    let fx = dashboard_fixture(ScriptedSnapshots::new(1.0, &[]));
    let result = fx
        .dashboard
        .add_widget(WidgetKind::LivePrice, "short", Position::default())
        .await;
    assert!(result.is_err());
    assert!(fx.dashboard.widgets().await.is_empty());
    assert!(!fx.layout_path.exists());
}

#[tokio::test]
async fn test_layout_survives_restart() {
    let path = temp_layout_path();
    let seeds = vec![
        WidgetSeed {
            kind: WidgetKind::LivePrice,
            contract_address: BONK.to_string(),
            position: Position::default(),
        },
        WidgetSeed {
            kind: WidgetKind::TradeFeed,
            contract_address: "short".to_string(),
            position: Position::default(),
        },
    ];

    let fx = dashboard_fixture_at(ScriptedSnapshots::new(1.0, &[]), path.clone());
    assert_eq!(assert_ok!(fx.dashboard.restore_layout(&seeds).await), 1);
    let added = assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::TradeFeed, WIF, Position { x: 1, y: 0 })
            .await
    );
    assert_ok!(fx.dashboard.move_widget(added.id, Position { x: 2, y: 3 }).await);
    fx.dashboard.shutdown().await;

    let again = dashboard_fixture_at(ScriptedSnapshots::new(1.0, &[]), path.clone());
    assert_eq!(assert_ok!(again.dashboard.restore_layout(&seeds).await), 2);
    let widgets = again.dashboard.widgets().await;
    assert_eq!(widgets[0].kind, WidgetKind::LivePrice);
    assert_eq!(widgets[1].id, added.id);
    assert_eq!(widgets[1].position, Position { x: 2, y: 3 });
    assert_eq!(
        widgets[1].contract_address,
        ContractAddress::new(WIF).unwrap()
    );

    cleanup_layout(&path);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let fx = dashboard_fixture(ScriptedSnapshots::new(1.0, &["h1"]));
    assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::TradeFeed, BONK, Position::default())
            .await
    );
    assert_ok!(
        fx.dashboard
            .add_widget(WidgetKind::LivePrice, BONK, Position::default())
            .await
    );
    assert_ok!(fx.dashboard.start().await);
    assert_eq!(fx.dashboard.feed_count().await, 2);

    fx.dashboard.shutdown().await;
    assert!(fx.dashboard.is_closed());
    assert!(fx.dashboard.stream().is_closed());
    assert!(!fx.dashboard.stream().is_connected());
    assert_eq!(fx.dashboard.feed_count().await, 0);
    assert_eq!(fx.transport.handler_count(), 0);

    fx.dashboard.shutdown().await;
    assert!(
        fx.dashboard
            .add_widget(WidgetKind::LivePrice, WIF, Position::default())
            .await
            .is_err()
    );
    cleanup_layout(&fx.layout_path);
}
