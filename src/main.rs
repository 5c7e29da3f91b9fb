// region:    --- Imports
use crate::database::DatabaseManager;
use crate::ledger::BidLedger;
use crate::message_broker::{KafkaManager, KafkaPublisher};
use crate::scheduler::BidScheduler;
use crate::settlement::SettlementConsumer;
use crate::store::PostgresAuctionStore;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Modules
mod bidding;
mod database;
mod error;
mod handlers;
mod ledger;
mod message_broker;
mod scheduler;
mod settlement;
mod store;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new().await);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // Kafka 매니저 생성 및 초기화
    let kafka_manager = Arc::new(KafkaManager::new());
    if let Err(e) = kafka_manager.initialize().await {
        error!("{:<12} --> Kafka 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> Kafka 초기화 성공", "Main");

    // 토픽 생성
    kafka_manager
        .create_topic(message_broker::BID_STATUS_TOPIC, 5, 1)
        .await?;
    kafka_manager
        .create_topic(message_broker::ORDER_EVENTS_TOPIC, 5, 1)
        .await?;
    kafka_manager
        .create_topic(message_broker::NOTIFICATIONS_TOPIC, 1, 1)
        .await?;

    // 입찰 원장 및 공용 컴포넌트 생성
    let bid_ledger = Arc::new(BidLedger::new());
    let auction_store = Arc::new(PostgresAuctionStore::new(Arc::clone(&db_manager)));
    let publisher = Arc::new(KafkaPublisher::new(kafka_manager.get_producer()));

    // 정산 신호 소비 시작
    let settlement_consumer = SettlementConsumer::new(
        Arc::clone(&auction_store),
        Arc::clone(&publisher),
        kafka_manager.get_consumer(),
    );
    tokio::spawn(async move {
        settlement_consumer.start().await;
    });

    // 입찰 현황 브로드캐스트 스케줄러 시작
    let bid_scheduler = BidScheduler::new(
        Arc::clone(&auction_store),
        Arc::clone(&bid_ledger),
        Arc::clone(&publisher),
    );
    let scheduler_handle = bid_scheduler.start();

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let routes_all = Router::new()
        .route("/bid", post(handlers::handle_bid))
        .route("/auction/:id", get(handlers::handle_get_auction))
        .route("/auction/:id/bids", get(handlers::handle_get_bid_status))
        .route("/auction/:id/start", post(handlers::handle_start_auction))
        .route("/auction/:id/stop", post(handlers::handle_stop_auction))
        .route("/order/:id", get(handlers::handle_get_order))
        .route(
            "/order/:id/status",
            post(handlers::handle_update_order_status),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 20)) // 동시성을 위한 바디 사이즈 10배 증가(20MB)
        .with_state((db_manager, bid_ledger, kafka_manager.get_producer()));

    // 리스너 생성
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await.unwrap();
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr().unwrap()
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("{:<12} --> Server error: {}", "Main", err);
    }

    // 진행 중인 브로드캐스트 틱이 끝난 뒤 스케줄러 종료
    scheduler_handle.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
// endregion: --- Main
