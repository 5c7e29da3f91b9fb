// region:    --- Imports
use crate::bidding::commands;
use crate::bidding::model::{
    PlaceBidCommand, StartAuctionCommand, StopAuctionCommand, UpdateOrderStatusCommand,
};
use crate::database::DatabaseManager;
use crate::error::BidError;
use crate::ledger::BidLedger;
use crate::message_broker::{KafkaProducer, KafkaPublisher, ORDER_EVENTS_TOPIC};
use crate::settlement::{self, OrderStatusChanged};
use crate::store::{AuctionStore, PostgresAuctionStore};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

pub type AppState = (Arc<DatabaseManager>, Arc<BidLedger>, Arc<KafkaProducer>);

// region:    --- Command Handlers

/// 입찰 요청 처리
pub async fn handle_bid(
    State((db_manager, ledger, _)): State<AppState>,
    Json(cmd): Json<PlaceBidCommand>,
) -> impl IntoResponse {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Handler", cmd);

    let store = PostgresAuctionStore::new(Arc::clone(&db_manager));
    let bid_price = cmd.bid_price;

    match commands::submit_bid(&store, &ledger, cmd).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "message": "입찰이 성공적으로 처리되었습니다.",
                "bid_price": bid_price
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 시작 요청 처리
pub async fn handle_start_auction(
    State((db_manager, ledger, _)): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(cmd): Json<StartAuctionCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 경매 시작 요청 처리 시작 - 경매 ID: {}",
        "Handler", auction_id
    );

    let store = PostgresAuctionStore::new(Arc::clone(&db_manager));
    match commands::start_auction(&store, &ledger, auction_id, cmd).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({ "message": "경매 시작 성공" })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 종료(낙찰) 요청 처리
pub async fn handle_stop_auction(
    State((db_manager, ledger, kafka_producer)): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(cmd): Json<StopAuctionCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 경매 종료 요청 처리 시작 - 경매 ID: {}",
        "Handler", auction_id
    );

    let store = Arc::new(PostgresAuctionStore::new(Arc::clone(&db_manager)));
    let notifier = Arc::new(KafkaPublisher::new(Arc::clone(&kafka_producer)));

    match commands::stop_auction(&store, &notifier, &ledger, auction_id, cmd).await {
        Ok(Some(winning_bid)) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "message": "경매 종료에 성공했습니다.",
                "winning_bid": winning_bid
            })),
        )
            .into_response(),
        Ok(None) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "message": "경매 종료에 성공했습니다. 입찰 내역이 존재하지 않습니다."
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 주문 상태 변경 요청 처리 - 변경 후 정산 신호를 발행한다
pub async fn handle_update_order_status(
    State((db_manager, _, kafka_producer)): State<AppState>,
    Path(order_id): Path<i64>,
    Json(cmd): Json<UpdateOrderStatusCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 주문 상태 변경 요청 - 주문 ID: {}, 변경할 상태: {:?}",
        "Handler", order_id, cmd.new_status
    );

    let store = PostgresAuctionStore::new(Arc::clone(&db_manager));
    match settlement::update_order_status(&store, order_id, cmd.new_status).await {
        Ok((order, previous)) => {
            let event = OrderStatusChanged {
                order_id: order.id,
                previous_status: Some(previous),
                new_status: order.status,
            };
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => return BidError::Broker(e.to_string()).into_response(),
            };
            // 신호 발행 실패 시 503 반환 - 호출자의 재시도는 캐스케이드가 멱등 처리
            if let Err(e) = kafka_producer
                .send_message(ORDER_EVENTS_TOPIC, &order.id.to_string(), &payload)
                .await
            {
                return BidError::Broker(e).into_response();
            }
            Json(order).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

#[derive(Debug, Deserialize)]
pub struct BidStatusQuery {
    pub limit: Option<usize>,
}

/// 입찰 현황 조회
pub async fn handle_get_bid_status(
    State((db_manager, ledger, _)): State<AppState>,
    Path(auction_id): Path<i64>,
    Query(query): Query<BidStatusQuery>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 입찰 현황 조회 id: {}",
        "HandlerQuery", auction_id
    );

    let store = PostgresAuctionStore::new(Arc::clone(&db_manager));
    let limit = query.limit.unwrap_or(10);
    match commands::get_bid_status(&store, &ledger, auction_id, limit).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 조회
pub async fn handle_get_auction(
    State((db_manager, _, _)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 조회 id: {}", "HandlerQuery", auction_id);

    let store = PostgresAuctionStore::new(Arc::clone(&db_manager));
    match store.find_auction(auction_id).await {
        Ok(Some(auction)) => Json(auction).into_response(),
        Ok(None) => BidError::AuctionNotFound(auction_id).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 주문 조회 (허용되는 다음 전환 목록 포함)
pub async fn handle_get_order(
    State((db_manager, _, _)): State<AppState>,
    Path(order_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 주문 조회 id: {}", "HandlerQuery", order_id);

    let store = PostgresAuctionStore::new(Arc::clone(&db_manager));
    match store.find_order(order_id).await {
        Ok(Some(order)) => Json(serde_json::json!({
            "order": order,
            "allowed_transitions": settlement::allowed_transitions(order.status),
        }))
        .into_response(),
        Ok(None) => BidError::OrderNotFound(order_id).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Query Handlers
