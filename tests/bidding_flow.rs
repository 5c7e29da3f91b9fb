/// 입찰 코어 통합 테스트
/// 인메모리 저장소와 기록형 발행자로 입찰 -> 브로드캐스트 -> 낙찰 -> 정산 흐름을 검증한다.
// region:    --- Imports
use async_trait::async_trait;
use bidding_service::bidding::commands::{self, MIN_BID_PRICE};
use bidding_service::bidding::model::{
    Auction, AuctionHistory, AuctionStatus, BidAction, BidStatus, Order, OrderStatus,
    PlaceBidCommand, StartAuctionCommand, StopAuctionCommand,
};
use bidding_service::error::BidError;
use bidding_service::ledger::BidLedger;
use bidding_service::message_broker::{NotificationSender, StatusPublisher};
use bidding_service::scheduler::BidScheduler;
use bidding_service::settlement::{self, OrderStatusChanged};
use bidding_service::store::AuctionStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

// endregion: --- Imports

// region:    --- In-Memory Store

/// 영속 저장소 경계의 인메모리 구현체.
/// 경매당 활성 주문 1건 제약을 실제 저장소의 유니크 제약과 동일하게 흉내낸다.
#[derive(Default)]
struct MemoryAuctionStore {
    auctions: Mutex<HashMap<i64, Auction>>,
    histories: Mutex<Vec<AuctionHistory>>,
    orders: Mutex<Vec<Order>>,
    observations: Mutex<Vec<(i64, i64)>>,
    next_id: AtomicI64,
}

impl MemoryAuctionStore {
    fn with_auction(auction: Auction) -> Arc<Self> {
        let store = Self::default();
        store.auctions.lock().unwrap().insert(auction.id, auction);
        Arc::new(store)
    }

    fn add_auction(&self, auction: Auction) {
        self.auctions.lock().unwrap().insert(auction.id, auction);
    }

    fn auction_status(&self, auction_id: i64) -> AuctionStatus {
        self.auctions.lock().unwrap()[&auction_id].status
    }

    fn orders_snapshot(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }

    fn histories_snapshot(&self) -> Vec<AuctionHistory> {
        self.histories.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuctionStore for MemoryAuctionStore {
    async fn find_auction(&self, auction_id: i64) -> Result<Option<Auction>, BidError> {
        Ok(self.auctions.lock().unwrap().get(&auction_id).cloned())
    }

    async fn change_auction_status(
        &self,
        auction_id: i64,
        from: AuctionStatus,
        to: AuctionStatus,
    ) -> Result<bool, BidError> {
        let mut auctions = self.auctions.lock().unwrap();
        match auctions.get_mut(&auction_id) {
            Some(auction) if auction.status == from => {
                auction.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_history(&self, history: &AuctionHistory) -> Result<AuctionHistory, BidError> {
        let mut stored = history.clone();
        stored.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.histories.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn insert_histories(&self, histories: &[AuctionHistory]) -> Result<(), BidError> {
        for history in histories {
            self.insert_history(history).await?;
        }
        Ok(())
    }

    async fn tag_history(
        &self,
        history_id: i64,
        from: BidAction,
        to: BidAction,
    ) -> Result<bool, BidError> {
        let mut histories = self.histories.lock().unwrap();
        match histories
            .iter_mut()
            .find(|h| h.id == history_id && h.action == from)
        {
            Some(history) => {
                history.action = to;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_history(&self, history_id: i64) -> Result<Option<AuctionHistory>, BidError> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .iter()
            .find(|h| h.id == history_id)
            .cloned())
    }

    async fn find_winning_history(
        &self,
        auction_id: i64,
    ) -> Result<Option<AuctionHistory>, BidError> {
        let mut winners: Vec<AuctionHistory> = self
            .histories
            .lock()
            .unwrap()
            .iter()
            .filter(|h| {
                h.auction_id == auction_id
                    && matches!(h.action, BidAction::Won | BidAction::Settled)
            })
            .cloned()
            .collect();
        winners.sort_by(|a, b| b.price.cmp(&a.price).then(a.action_time.cmp(&b.action_time)));
        Ok(winners.into_iter().next())
    }

    async fn find_next_candidate(
        &self,
        auction_id: i64,
        excluded_user_id: i64,
    ) -> Result<Option<AuctionHistory>, BidError> {
        let mut candidates: Vec<AuctionHistory> = self
            .histories
            .lock()
            .unwrap()
            .iter()
            .filter(|h| {
                h.auction_id == auction_id
                    && h.action == BidAction::Bid
                    && h.user_id != excluded_user_id
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.price.cmp(&a.price).then(a.action_time.cmp(&b.action_time)));
        Ok(candidates.into_iter().next())
    }

    async fn insert_order(
        &self,
        history: &AuctionHistory,
        auction: &Auction,
    ) -> Result<Order, BidError> {
        let mut orders = self.orders.lock().unwrap();
        // 유니크 제약 흉내: 경매당 활성 주문 1건, 이력당 주문 1건
        let conflict = orders.iter().any(|o| {
            (o.auction_id == auction.id && !o.status.is_terminal())
                || o.auction_history_id == history.id
        });
        if conflict {
            return Err(BidError::ConflictingPromotion);
        }

        let now = Utc::now();
        let order = Order {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            auction_history_id: history.id,
            auction_id: auction.id,
            seller_id: auction.seller_id,
            customer_id: history.user_id,
            status: OrderStatus::Waiting,
            price: history.price,
            created_at: now,
            updated_at: now,
        };
        orders.push(order.clone());
        Ok(order)
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, BidError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == order_id)
            .cloned())
    }

    async fn change_order_status(
        &self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, BidError> {
        let mut orders = self.orders.lock().unwrap();
        match orders.iter_mut().find(|o| o.id == order_id && o.status == from) {
            Some(order) => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_price_observation(
        &self,
        order: &Order,
        _product_id: i64,
    ) -> Result<(), BidError> {
        let mut observations = self.observations.lock().unwrap();
        // 중복 전달 무시
        if !observations.iter().any(|(order_id, _)| *order_id == order.id) {
            observations.push((order.id, order.price));
        }
        Ok(())
    }
}

// endregion: --- In-Memory Store

// region:    --- Recording Publisher

/// 브로드캐스트/알림 발행 기록용 구현체
#[derive(Default)]
struct RecordingPublisher {
    statuses: Mutex<Vec<(i64, BidStatus)>>,
    notifications: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish_status(&self, room_id: i64, status: &BidStatus) -> Result<(), String> {
        self.statuses.lock().unwrap().push((room_id, status.clone()));
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for RecordingPublisher {
    async fn send_order_notification(&self, user_id: i64, order: &Order) -> Result<(), String> {
        self.notifications
            .lock()
            .unwrap()
            .push((user_id, format!("order:{}", order.id)));
        Ok(())
    }

    async fn send_auction_failure(&self, seller_id: i64, auction_id: i64) -> Result<(), String> {
        self.notifications
            .lock()
            .unwrap()
            .push((seller_id, format!("failed:{}", auction_id)));
        Ok(())
    }
}

// endregion: --- Recording Publisher

// region:    --- Helpers

const SELLER_ID: i64 = 900;
const ROOM_ID: i64 = 77;

fn auction(id: i64, start_price: i64, status: AuctionStatus) -> Auction {
    Auction {
        id,
        product_id: 10,
        live_id: 20,
        seller_id: SELLER_ID,
        start_price,
        amount: 1,
        status,
        created_at: Utc::now(),
    }
}

fn bid(auction_id: i64, user_id: i64, price: i64) -> PlaceBidCommand {
    PlaceBidCommand {
        auction_id,
        user_id,
        user_nickname: format!("입찰자{}", user_id),
        bid_price: price,
    }
}

/// 경매 종료까지 진행한 뒤 (저장소, 발행자, 낙찰 주문)을 돌려준다.
async fn run_auction_to_order(
    prices: &[(i64, i64)],
    start_price: i64,
) -> (Arc<MemoryAuctionStore>, Arc<RecordingPublisher>, Order) {
    let store = MemoryAuctionStore::with_auction(auction(1, start_price, AuctionStatus::InProgress));
    let publisher = Arc::new(RecordingPublisher::default());
    let ledger = BidLedger::new();
    ledger.register_active(1, ROOM_ID);

    for (user_id, price) in prices {
        commands::submit_bid(store.as_ref(), &ledger, bid(1, *user_id, *price))
            .await
            .unwrap();
        // 동일 밀리초 복합 키 충돌 방지
        sleep(Duration::from_millis(2)).await;
    }

    commands::finalize_bid(&store, &publisher, &ledger, 1)
        .await
        .unwrap()
        .expect("낙찰자가 있어야 한다");

    let order = store
        .orders_snapshot()
        .into_iter()
        .find(|o| !o.status.is_terminal())
        .expect("활성 주문이 있어야 한다");
    (store, publisher, order)
}

/// 주문을 취소/환불 처리하고 정산 신호까지 전달한다.
async fn fail_order(
    store: &Arc<MemoryAuctionStore>,
    publisher: &Arc<RecordingPublisher>,
    order_id: i64,
    new_status: OrderStatus,
) {
    let (_, previous) = settlement::update_order_status(store.as_ref(), order_id, new_status)
        .await
        .unwrap();
    let event = OrderStatusChanged {
        order_id,
        previous_status: Some(previous),
        new_status,
    };
    settlement::handle_order_status_changed(store, publisher, &event)
        .await
        .unwrap();
}

// endregion: --- Helpers

// region:    --- Admission Tests

/// 스펙 시나리오: 시작가 10000, 최초 최소 입찰가 10001
#[tokio::test]
async fn bid_scenario_from_start_price() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let ledger = BidLedger::new();

    // U1: 10001 -> 수락
    commands::submit_bid(store.as_ref(), &ledger, bid(1, 1, 10001))
        .await
        .unwrap();

    // U2: 10001 -> 거절 (현재 최고가보다 크지 않음)
    let rejected = commands::submit_bid(store.as_ref(), &ledger, bid(1, 2, 10001)).await;
    match rejected {
        Err(BidError::PriceTooLow { minimum }) => assert_eq!(minimum, 10002),
        other => panic!("LOW_BID 거절이어야 한다: {:?}", other),
    }

    // U2: 10500 -> 수락
    commands::submit_bid(store.as_ref(), &ledger, bid(1, 2, 10500))
        .await
        .unwrap();

    let status = commands::get_bid_status(store.as_ref(), &ledger, 1, 10)
        .await
        .unwrap();
    let highest = status.highest_bid.unwrap();
    assert_eq!(highest.user_id, 2);
    assert_eq!(highest.bid_price, 10500);
    assert_eq!(status.current_highest_price, 10500);
    assert_eq!(status.bid_list.len(), 2);
}

/// 수락된 입찰의 최고가는 항상 단조 증가한다
#[tokio::test]
async fn accepted_highest_price_strictly_increases() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let ledger = BidLedger::new();

    let attempts = [
        (1, 10001, true),
        (2, 10001, false),
        (2, 10500, true),
        (1, 10500, false),
        (3, 12000, true),
        (3, 500, false), // 요청 검증 경계 미달
    ];

    let mut last_highest = 0;
    for (user_id, price, should_accept) in attempts {
        let result = commands::submit_bid(store.as_ref(), &ledger, bid(1, user_id, price)).await;
        assert_eq!(result.is_ok(), should_accept, "입찰 {:?}", (user_id, price));
        if should_accept {
            let highest = ledger.highest_for(1).unwrap().bid_price;
            assert!(highest > last_highest);
            last_highest = highest;
        }
        sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(last_highest, 12000);
}

#[tokio::test]
async fn bid_below_request_minimum_is_rejected() {
    let store = MemoryAuctionStore::with_auction(auction(1, 0, AuctionStatus::InProgress));
    let ledger = BidLedger::new();

    let rejected = commands::submit_bid(store.as_ref(), &ledger, bid(1, 1, MIN_BID_PRICE - 1)).await;
    match rejected {
        Err(BidError::PriceTooLow { minimum }) => assert_eq!(minimum, MIN_BID_PRICE),
        other => panic!("LOW_BID 거절이어야 한다: {:?}", other),
    }
}

#[tokio::test]
async fn bid_rejected_unless_auction_in_progress() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::Scheduled));
    store.add_auction(auction(2, 10000, AuctionStatus::Ended));
    let ledger = BidLedger::new();

    assert!(matches!(
        commands::submit_bid(store.as_ref(), &ledger, bid(1, 1, 20000)).await,
        Err(BidError::InvalidState(_))
    ));
    assert!(matches!(
        commands::submit_bid(store.as_ref(), &ledger, bid(2, 1, 20000)).await,
        Err(BidError::InvalidState(_))
    ));
    assert!(matches!(
        commands::submit_bid(store.as_ref(), &ledger, bid(99, 1, 20000)).await,
        Err(BidError::AuctionNotFound(99))
    ));
}

/// 스케줄러가 올린 최소 입찰가는 다음 구간의 하한으로 작동한다
#[tokio::test]
async fn floor_projection_bounds_next_bids() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let ledger = BidLedger::new();
    ledger.set_floor(1, 15000);

    let rejected = commands::submit_bid(store.as_ref(), &ledger, bid(1, 1, 14000)).await;
    match rejected {
        Err(BidError::PriceTooLow { minimum }) => assert_eq!(minimum, 15000),
        other => panic!("LOW_BID 거절이어야 한다: {:?}", other),
    }
    assert!(commands::submit_bid(store.as_ref(), &ledger, bid(1, 1, 15000))
        .await
        .is_ok());
}

// endregion: --- Admission Tests

// region:    --- Lifecycle Tests

#[tokio::test]
async fn start_auction_registers_viewer_group() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::Scheduled));
    let ledger = BidLedger::new();

    commands::start_auction(
        store.as_ref(),
        &ledger,
        1,
        StartAuctionCommand {
            seller_id: SELLER_ID,
            room_id: ROOM_ID,
        },
    )
    .await
    .unwrap();

    assert_eq!(store.auction_status(1), AuctionStatus::InProgress);
    assert_eq!(ledger.active_auctions(), vec![(1, ROOM_ID)]);

    // 판매자 불일치 시 거절
    store.add_auction(auction(2, 10000, AuctionStatus::Scheduled));
    let forbidden = commands::start_auction(
        store.as_ref(),
        &ledger,
        2,
        StartAuctionCommand {
            seller_id: SELLER_ID + 1,
            room_id: ROOM_ID,
        },
    )
    .await;
    assert!(matches!(forbidden, Err(BidError::Forbidden(_))));
}

#[tokio::test]
async fn finalize_without_bids_marks_auction_failed() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let publisher = Arc::new(RecordingPublisher::default());
    let ledger = BidLedger::new();
    ledger.register_active(1, ROOM_ID);

    let result = commands::stop_auction(
        &store,
        &publisher,
        &ledger,
        1,
        StopAuctionCommand {
            seller_id: SELLER_ID,
        },
    )
    .await
    .unwrap();

    assert!(result.is_none());
    assert_eq!(store.auction_status(1), AuctionStatus::Failed);
    assert!(ledger.active_auctions().is_empty());
    assert!(store.orders_snapshot().is_empty());
}

#[tokio::test]
async fn finalize_migrates_trail_and_creates_waiting_order() {
    let (store, _publisher, order) =
        run_auction_to_order(&[(1, 30000), (2, 40000), (3, 50000)], 10000).await;

    // 주문은 낙찰자 기준 WAITING 상태
    assert_eq!(order.customer_id, 3);
    assert_eq!(order.price, 50000);
    assert_eq!(order.status, OrderStatus::Waiting);
    assert_eq!(order.seller_id, SELLER_ID);

    // 이력: 낙찰자는 SETTLED(주문 생성 완료), 나머지는 BID로 이관
    let histories = store.histories_snapshot();
    assert_eq!(histories.len(), 3);
    let winner = histories.iter().find(|h| h.user_id == 3).unwrap();
    assert_eq!(winner.action, BidAction::Settled);
    assert!(histories
        .iter()
        .filter(|h| h.user_id != 3)
        .all(|h| h.action == BidAction::Bid));
}

#[tokio::test]
async fn finalize_is_idempotent_on_ended_auction() {
    let (store, publisher, order) = run_auction_to_order(&[(1, 30000), (2, 50000)], 10000).await;
    let ledger = BidLedger::new();

    // 이미 종료된 경매에 재호출 - 기록된 낙찰 결과만 반환
    let repeated = commands::finalize_bid(&store, &publisher, &ledger, 1)
        .await
        .unwrap()
        .expect("기존 낙찰 결과를 돌려줘야 한다");
    assert_eq!(repeated.user_id, 2);
    assert_eq!(repeated.bid_price, 50000);

    assert_eq!(store.auction_status(1), AuctionStatus::Ended);
    assert_eq!(store.orders_snapshot().len(), 1);
    assert_eq!(store.orders_snapshot()[0].id, order.id);
}

// endregion: --- Lifecycle Tests

// region:    --- Cascade Tests

/// 취소가 반복되면 가격 내림차순으로 차순위 입찰자가 승격되고,
/// 후보가 소진되면 유찰 처리된다.
#[tokio::test]
async fn cascade_exhausts_candidates_in_price_order() {
    let (store, publisher, first_order) =
        run_auction_to_order(&[(1, 30000), (2, 40000), (3, 50000)], 10000).await;
    assert_eq!(first_order.price, 50000);

    // 1차 취소 -> 40000 입찰자 승격
    fail_order(&store, &publisher, first_order.id, OrderStatus::Cancelled).await;
    let second_order = store
        .orders_snapshot()
        .into_iter()
        .find(|o| !o.status.is_terminal())
        .expect("차순위 주문이 있어야 한다");
    assert_eq!(second_order.customer_id, 2);
    assert_eq!(second_order.price, 40000);

    // 2차 취소 -> 30000 입찰자 승격
    fail_order(&store, &publisher, second_order.id, OrderStatus::Cancelled).await;
    let third_order = store
        .orders_snapshot()
        .into_iter()
        .find(|o| !o.status.is_terminal())
        .expect("차순위 주문이 있어야 한다");
    assert_eq!(third_order.customer_id, 1);
    assert_eq!(third_order.price, 30000);

    // 3차 취소 -> 후보 없음, 새 주문 없이 유찰 확정
    fail_order(&store, &publisher, third_order.id, OrderStatus::Cancelled).await;
    assert!(store
        .orders_snapshot()
        .iter()
        .all(|o| o.status.is_terminal()));
    assert_eq!(store.orders_snapshot().len(), 3);
    assert_eq!(store.auction_status(1), AuctionStatus::Failed);

    // 판매자 유찰 알림 (분리된 태스크)
    sleep(Duration::from_millis(50)).await;
    let notifications = publisher.notifications.lock().unwrap();
    assert!(notifications
        .iter()
        .any(|(user_id, message)| *user_id == SELLER_ID && message == "failed:1"));
}

/// 동일 (주문, 상태) 신호의 중복 전달은 승격을 반복하지 않는다
#[tokio::test]
async fn duplicate_cancellation_signal_is_noop() {
    let (store, publisher, first_order) =
        run_auction_to_order(&[(1, 30000), (2, 50000)], 10000).await;

    fail_order(&store, &publisher, first_order.id, OrderStatus::Cancelled).await;
    assert_eq!(store.orders_snapshot().len(), 2);

    // 같은 신호 재전달
    let duplicate = OrderStatusChanged {
        order_id: first_order.id,
        previous_status: Some(OrderStatus::Waiting),
        new_status: OrderStatus::Cancelled,
    };
    settlement::handle_order_status_changed(&store, &publisher, &duplicate)
        .await
        .unwrap();

    // 주문 수 불변, 활성 주문은 1건
    let orders = store.orders_snapshot();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders.iter().filter(|o| !o.status.is_terminal()).count(), 1);
}

/// 동시 중복 신호에서도 활성 주문은 1건만 생성된다
#[tokio::test]
async fn concurrent_duplicate_signals_promote_once() {
    let (store, publisher, first_order) =
        run_auction_to_order(&[(1, 30000), (2, 50000)], 10000).await;

    settlement::update_order_status(store.as_ref(), first_order.id, OrderStatus::Cancelled)
        .await
        .unwrap();
    let event = OrderStatusChanged {
        order_id: first_order.id,
        previous_status: Some(OrderStatus::Waiting),
        new_status: OrderStatus::Cancelled,
    };

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        let publisher = Arc::clone(&publisher);
        let event = event.clone();
        handles.push(tokio::spawn(async move {
            settlement::handle_order_status_changed(&store, &publisher, &event).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let orders = store.orders_snapshot();
    assert_eq!(orders.iter().filter(|o| !o.status.is_terminal()).count(), 1);
    assert_eq!(orders.len(), 2);
}

/// 완료 신호는 상태를 바꾸지 않고 가격 관측 데이터만 남긴다
#[tokio::test]
async fn completed_order_records_price_observation() {
    let (store, publisher, order) = run_auction_to_order(&[(1, 30000), (2, 50000)], 10000).await;

    for status in [OrderStatus::Paid, OrderStatus::Shipped] {
        settlement::update_order_status(store.as_ref(), order.id, status)
            .await
            .unwrap();
    }
    fail_order(&store, &publisher, order.id, OrderStatus::Completed).await;
    sleep(Duration::from_millis(50)).await;

    {
        let observations = store.observations.lock().unwrap();
        assert_eq!(observations.as_slice(), &[(order.id, 50000)]);
    }

    // 중복 전달 시에도 관측 데이터는 1건
    let duplicate = OrderStatusChanged {
        order_id: order.id,
        previous_status: Some(OrderStatus::Shipped),
        new_status: OrderStatus::Completed,
    };
    settlement::handle_order_status_changed(&store, &publisher, &duplicate)
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    let observations = store.observations.lock().unwrap();
    assert_eq!(observations.len(), 1);
    // 이력과 주문 상태는 그대로
    let histories = store.histories_snapshot();
    assert!(histories
        .iter()
        .any(|h| h.user_id == 2 && h.action == BidAction::Settled));
}

#[tokio::test]
async fn invalid_order_transition_is_rejected() {
    let (store, _publisher, order) = run_auction_to_order(&[(1, 30000)], 10000).await;

    // WAITING에서 COMPLETED로 바로 전환 불가
    let rejected =
        settlement::update_order_status(store.as_ref(), order.id, OrderStatus::Completed).await;
    assert!(matches!(rejected, Err(BidError::InvalidState(_))));

    let missing = settlement::update_order_status(store.as_ref(), 9999, OrderStatus::Paid).await;
    assert!(matches!(missing, Err(BidError::OrderNotFound(9999))));
}

// endregion: --- Cascade Tests

// region:    --- Scheduler Tests

type MemoryScheduler = BidScheduler<MemoryAuctionStore, RecordingPublisher>;

/// 틱마다 스냅샷을 발행하고 최소 입찰가를 최고가 + 1로 올린다
#[tokio::test]
async fn tick_publishes_masked_snapshot_and_advances_floor() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let publisher = Arc::new(RecordingPublisher::default());
    let ledger = BidLedger::new();
    ledger.register_active(1, ROOM_ID);

    commands::submit_bid(store.as_ref(), &ledger, bid(1, 42, 12000))
        .await
        .unwrap();

    MemoryScheduler::broadcast_tick(store.as_ref(), &ledger, publisher.as_ref()).await;

    assert_eq!(ledger.get_floor(1), Some(12001));

    let statuses = publisher.statuses.lock().unwrap();
    assert_eq!(statuses.len(), 1);
    let (room_id, snapshot) = &statuses[0];
    assert_eq!(*room_id, ROOM_ID);
    assert_eq!(snapshot.current_highest_price, 12000);
    // 브로드캐스트 페이로드는 입찰자 식별 정보가 마스킹된다
    assert_eq!(snapshot.highest_bid.as_ref().unwrap().user_id, 0);
    assert_eq!(snapshot.highest_bid.as_ref().unwrap().user_nickname, "입***2");
}

/// 입찰이 없으면 최소 입찰가는 시작가 + 1로 수렴한다
#[tokio::test]
async fn tick_floors_at_start_price_without_bids() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let publisher = Arc::new(RecordingPublisher::default());
    let ledger = BidLedger::new();
    ledger.register_active(1, ROOM_ID);

    MemoryScheduler::broadcast_tick(store.as_ref(), &ledger, publisher.as_ref()).await;

    assert_eq!(ledger.get_floor(1), Some(10001));
    let statuses = publisher.statuses.lock().unwrap();
    assert_eq!(statuses[0].1.current_highest_price, 10000);
    assert!(statuses[0].1.highest_bid.is_none());
}

/// 영속 저장소에서 사라진 경매는 틱에서 원장 데이터가 정리된다
#[tokio::test]
async fn tick_purges_auctions_missing_from_store() {
    let store = MemoryAuctionStore::with_auction(auction(1, 10000, AuctionStatus::InProgress));
    let publisher = Arc::new(RecordingPublisher::default());
    let ledger = BidLedger::new();
    ledger.register_active(1, ROOM_ID);
    ledger.register_active(99, 5);
    ledger.put(bidding_service::bidding::model::BidRecord::new(
        99,
        7,
        "유령".to_string(),
        20000,
    ));
    ledger.set_floor(99, 20001);

    MemoryScheduler::broadcast_tick(store.as_ref(), &ledger, publisher.as_ref()).await;

    // 경매 99의 원장/최소가/인덱스가 모두 정리되고 발행도 없다
    assert_eq!(ledger.active_auctions(), vec![(1, ROOM_ID)]);
    assert_eq!(ledger.get_floor(99), None);
    assert!(ledger.all_for(99).is_empty());
    let statuses = publisher.statuses.lock().unwrap();
    assert!(statuses.iter().all(|(room_id, _)| *room_id != 5));

    // 한 경매의 실패가 다른 경매의 발행을 막지 않는다
    assert!(statuses.iter().any(|(room_id, _)| *room_id == ROOM_ID));
}

// endregion: --- Scheduler Tests
