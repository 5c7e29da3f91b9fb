/// 정산 캐스케이드 처리
/// 1. 주문 생성 (낙찰 -> 주문)
/// 2. 주문 상태 전환 검증 및 변경
/// 3. 취소/환불 시 포기 처리 후 차순위 입찰자 승격
/// 4. 완료 시 가격 관측 데이터 기록
/// 부수효과(알림, 가격 데이터)는 본 상태 전이와 분리된 태스크로 실행된다.
// region:    --- Imports
use crate::bidding::model::{
    Auction, AuctionHistory, AuctionStatus, BidAction, Order, OrderStatus,
};
use crate::error::BidError;
use crate::message_broker::{KafkaConsumer, KafkaPublisher, NotificationSender, ORDER_EVENTS_TOPIC};
use crate::store::{AuctionStore, PostgresAuctionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Order Status Signal

/// 주문 상태 변경 신호 (order-events 토픽 페이로드)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: i64,
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
}

// endregion: --- Order Status Signal

// region:    --- Order Transitions

/// 현재 상태에서 허용되는 전환 목록
pub fn allowed_transitions(status: OrderStatus) -> &'static [OrderStatus] {
    match status {
        OrderStatus::Waiting => &[OrderStatus::Paid, OrderStatus::Cancelled],
        OrderStatus::Paid => &[OrderStatus::Pending, OrderStatus::Shipped, OrderStatus::Refunded],
        OrderStatus::Shipped => &[
            OrderStatus::Pending,
            OrderStatus::Completed,
            OrderStatus::Refunded,
        ],
        OrderStatus::Completed => &[OrderStatus::Pending, OrderStatus::Refunded],
        OrderStatus::Pending => &[OrderStatus::Paid, OrderStatus::Refunded],
        OrderStatus::Cancelled | OrderStatus::Refunded => &[],
    }
}

/// 주문 상태 변경. 변경된 주문과 이전 상태를 돌려준다.
pub async fn update_order_status<S: AuctionStore>(
    store: &S,
    order_id: i64,
    new_status: OrderStatus,
) -> Result<(Order, OrderStatus), BidError> {
    info!(
        "{:<12} --> 주문 상태 변경 시작 - 주문 ID: {}, 변경할 상태: {:?}",
        "Settlement", order_id, new_status
    );

    let order = store
        .find_order(order_id)
        .await?
        .ok_or(BidError::OrderNotFound(order_id))?;
    let previous = order.status;

    let allowed = allowed_transitions(previous);
    if !allowed.contains(&new_status) {
        return Err(BidError::InvalidState(format!(
            "현재 {:?}에서 {:?}로 전환할 수 없습니다. 가능한 상태: {:?}",
            previous, new_status, allowed
        )));
    }

    // 기대 상태 조건부 갱신 - 동시 변경 경합 시 재조회 유도
    if !store.change_order_status(order_id, previous, new_status).await? {
        return Err(BidError::InvalidState(
            "주문 상태가 이미 변경되었습니다. 다시 조회한 후 시도하세요.".to_string(),
        ));
    }

    info!(
        "{:<12} --> 주문 상태 변경 완료 - 주문 ID: {}, {:?} -> {:?}",
        "Settlement", order_id, previous, new_status
    );

    let mut updated = order;
    updated.status = new_status;
    Ok((updated, previous))
}

// endregion: --- Order Transitions

// region:    --- Order Creation

/// 낙찰 이력으로 주문 생성. 경매/낙찰 당 1건 제약은 저장소 경계에서 보장된다.
pub async fn create_order<S, N>(
    store: &Arc<S>,
    notifier: &Arc<N>,
    history: &AuctionHistory,
    auction: &Auction,
) -> Result<Order, BidError>
where
    S: AuctionStore + 'static,
    N: NotificationSender + 'static,
{
    info!(
        "{:<12} --> 주문 생성 시작 - 이력 ID: {}, 경매 ID: {}, 사용자 ID: {}",
        "Settlement", history.id, history.auction_id, history.user_id
    );

    let order = store.insert_order(history, auction).await?;

    // 낙찰 이력을 결제완료 대기로 태깅
    store
        .tag_history(history.id, BidAction::Won, BidAction::Settled)
        .await?;

    dispatch_order_notifications(notifier, &order);

    info!(
        "{:<12} --> 주문 생성 완료 - 주문 ID: {}, 구매자: {}, 판매자: {}",
        "Settlement", order.id, order.customer_id, order.seller_id
    );
    Ok(order)
}

/// 구매자/판매자 알림을 본 처리와 분리된 태스크로 전송
fn dispatch_order_notifications<N: NotificationSender + 'static>(
    notifier: &Arc<N>,
    order: &Order,
) {
    for user_id in [order.customer_id, order.seller_id] {
        let notifier = Arc::clone(notifier);
        let order = order.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_order_notification(user_id, &order).await {
                error!(
                    "{:<12} --> 주문 알림 전송 실패 - 주문 ID: {}, 수신자: {}, 원인: {}",
                    "Settlement", order.id, user_id, e
                );
            }
        });
    }
}

// endregion: --- Order Creation

// region:    --- Cascade

/// 차순위 입찰자 조회 및 낙찰 태깅.
/// 후보가 없으면 None (유찰), 이미 다른 처리가 승격시킨 경우 ConflictingPromotion.
pub async fn process_next_bidder<S: AuctionStore>(
    store: &S,
    auction_id: i64,
    excluded_user_id: i64,
) -> Result<Option<AuctionHistory>, BidError> {
    info!(
        "{:<12} --> 차순위 입찰자 처리 시작 - 경매 ID: {}",
        "Settlement", auction_id
    );

    let Some(candidate) = store.find_next_candidate(auction_id, excluded_user_id).await? else {
        info!(
            "{:<12} --> 차순위 입찰자 없음 - 경매 ID: {}",
            "Settlement", auction_id
        );
        return Ok(None);
    };

    // 차순위 입찰자를 낙찰로 변경 (조건부 갱신 실패 = 동시 승격 경합)
    if !store
        .tag_history(candidate.id, BidAction::Bid, BidAction::Won)
        .await?
    {
        return Err(BidError::ConflictingPromotion);
    }

    info!(
        "{:<12} --> 차순위 입찰자 낙찰 처리 완료 - 사용자 ID: {}, 가격: {}",
        "Settlement", candidate.user_id, candidate.price
    );

    let mut promoted = candidate;
    promoted.action = BidAction::Won;
    Ok(Some(promoted))
}

/// 주문 상태 변경 신호 처리.
/// 동일 (주문, 상태) 신호의 중복 전달에 대해 멱등하다.
pub async fn handle_order_status_changed<S, N>(
    store: &Arc<S>,
    notifier: &Arc<N>,
    event: &OrderStatusChanged,
) -> Result<(), BidError>
where
    S: AuctionStore + 'static,
    N: NotificationSender + 'static,
{
    info!(
        "{:<12} --> 주문 상태 변경 신호 처리 - 주문 ID: {}, {:?} -> {:?}",
        "Settlement", event.order_id, event.previous_status, event.new_status
    );

    let order = store
        .find_order(event.order_id)
        .await?
        .ok_or(BidError::OrderNotFound(event.order_id))?;

    dispatch_order_notifications(notifier, &order);

    match event.new_status {
        OrderStatus::Cancelled | OrderStatus::Refunded => {
            cascade_forfeit(store, notifier, &order).await?;
        }
        OrderStatus::Completed => {
            // 가격 관측 데이터 기록 - 실패해도 본 처리에 영향 없음
            let store = Arc::clone(store);
            let order = order.clone();
            tokio::spawn(async move {
                let result = async {
                    let auction = store
                        .find_auction(order.auction_id)
                        .await?
                        .ok_or(BidError::AuctionNotFound(order.auction_id))?;
                    store.insert_price_observation(&order, auction.product_id).await
                }
                .await;
                if let Err(e) = result {
                    error!(
                        "{:<12} --> 가격 데이터 추가 중 오류 발생 - 주문 ID: {}, 원인: {}",
                        "Settlement", order.id, e
                    );
                }
            });
        }
        _ => {}
    }

    Ok(())
}

/// 취소/환불된 주문의 포기 처리와 차순위 승격
async fn cascade_forfeit<S, N>(
    store: &Arc<S>,
    notifier: &Arc<N>,
    order: &Order,
) -> Result<(), BidError>
where
    S: AuctionStore + 'static,
    N: NotificationSender + 'static,
{
    // 1. 현재 주문의 낙찰 이력을 포기로 변경 (0건 갱신 = 중복 신호)
    let forfeited = store
        .tag_history(
            order.auction_history_id,
            BidAction::Settled,
            BidAction::Forfeited,
        )
        .await?;
    if !forfeited {
        warn!(
            "{:<12} --> 이미 포기 처리된 이력 - 중복 신호 무시 - 주문 ID: {}",
            "Settlement", order.id
        );
        return Ok(());
    }

    // 2. 차순위 입찰자 승격 (직전 포기자는 제외)
    match process_next_bidder(store.as_ref(), order.auction_id, order.customer_id).await {
        Ok(Some(next)) => {
            let auction = store
                .find_auction(order.auction_id)
                .await?
                .ok_or(BidError::AuctionNotFound(order.auction_id))?;
            match create_order(store, notifier, &next, &auction).await {
                Ok(new_order) => {
                    info!(
                        "{:<12} --> 차순위 입찰자 주문 생성 성공 - 경매 ID: {}, 주문 ID: {}",
                        "Settlement", order.auction_id, new_order.id
                    );
                }
                // 동시 승격 경합 - 활성 주문이 이미 존재하므로 무시
                Err(BidError::ConflictingPromotion) => {
                    warn!(
                        "{:<12} --> 활성 주문이 이미 존재 - 승격 중복 무시 - 경매 ID: {}",
                        "Settlement", order.auction_id
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None) => {
            // 3. 후보 없음 - 유찰 확정 및 판매자 알림
            store
                .change_auction_status(order.auction_id, AuctionStatus::Ended, AuctionStatus::Failed)
                .await?;
            info!(
                "{:<12} --> 차순위 입찰자 없음 - 유찰 처리 완료 - 경매 ID: {}",
                "Settlement", order.auction_id
            );
            let notifier = Arc::clone(notifier);
            let seller_id = order.seller_id;
            let auction_id = order.auction_id;
            tokio::spawn(async move {
                if let Err(e) = notifier.send_auction_failure(seller_id, auction_id).await {
                    error!(
                        "{:<12} --> 유찰 알림 전송 실패 - 경매 ID: {}, 원인: {}",
                        "Settlement", auction_id, e
                    );
                }
            });
        }
        Err(BidError::ConflictingPromotion) => {
            warn!(
                "{:<12} --> 승격 경합 감지 - 중복 신호 무시 - 경매 ID: {}",
                "Settlement", order.auction_id
            );
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

// endregion: --- Cascade

// region:    --- Settlement Consumer

// 일시적 저장소 장애 재시도 한도
const MAX_RETRIES: u32 = 3;

/// order-events 토픽을 구독하여 정산 캐스케이드를 구동하는 소비자
pub struct SettlementConsumer {
    store: Arc<PostgresAuctionStore>,
    notifier: Arc<KafkaPublisher>,
    kafka_consumer: Arc<KafkaConsumer>,
}

impl SettlementConsumer {
    pub fn new(
        store: Arc<PostgresAuctionStore>,
        notifier: Arc<KafkaPublisher>,
        kafka_consumer: Arc<KafkaConsumer>,
    ) -> Self {
        SettlementConsumer {
            store,
            notifier,
            kafka_consumer,
        }
    }

    /// 정산 신호 소비 시작
    pub async fn start(&self) {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        if let Err(e) = self
            .kafka_consumer
            .consume_order_events(ORDER_EVENTS_TOPIC, move |event| {
                let store = Arc::clone(&store);
                let notifier = Arc::clone(&notifier);
                Box::pin(async move {
                    if let Err(e) = Self::process_with_retry(&store, &notifier, &event).await {
                        error!(
                            "{:<12} --> 정산 신호 처리 오류 - 주문 ID: {}, 원인: {:?}",
                            "Settlement", event.order_id, e
                        );
                    }
                    Ok(())
                })
            })
            .await
        {
            error!("{:<12} --> 정산 신호 소비 오류: {:?}", "Settlement", e);
        }
    }

    /// 일시적 저장소 장애는 제한된 백오프로 재시도, 검증 에러는 즉시 종료
    async fn process_with_retry(
        store: &Arc<PostgresAuctionStore>,
        notifier: &Arc<KafkaPublisher>,
        event: &OrderStatusChanged,
    ) -> Result<(), BidError> {
        let mut attempts = 0;
        loop {
            match handle_order_status_changed(store, notifier, event).await {
                Err(e) if e.is_retryable() && attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!(
                        "{:<12} --> 정산 처리 재시도 ({}/{}) - 주문 ID: {}",
                        "Settlement", attempts, MAX_RETRIES, event.order_id
                    );
                    tokio::time::sleep(Duration::from_millis(500 * attempts as u64)).await;
                }
                other => return other,
            }
        }
    }
}

// endregion: --- Settlement Consumer

// endregion: --- Tests
