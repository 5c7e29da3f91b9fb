/// 영속 저장소 경계
/// 경매/이력/주문에 대한 생성-조회-갱신 연산을 트레이트로 묶고
/// Postgres 구현체를 제공한다.
// region:    --- Imports
use crate::bidding::model::{Auction, AuctionHistory, AuctionStatus, BidAction, Order, OrderStatus};
use crate::database::DatabaseManager;
use crate::error::BidError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub mod queries;

// endregion: --- Imports

// region:    --- Auction Store Trait

#[async_trait]
pub trait AuctionStore: Send + Sync {
    async fn find_auction(&self, auction_id: i64) -> Result<Option<Auction>, BidError>;

    /// 기대 상태가 일치할 때만 상태를 바꾸고, 실제로 바뀌었는지 돌려준다.
    async fn change_auction_status(
        &self,
        auction_id: i64,
        from: AuctionStatus,
        to: AuctionStatus,
    ) -> Result<bool, BidError>;

    async fn insert_history(&self, history: &AuctionHistory) -> Result<AuctionHistory, BidError>;

    async fn insert_histories(&self, histories: &[AuctionHistory]) -> Result<(), BidError>;

    /// 기대 액션이 일치할 때만 액션을 바꾸고, 실제로 바뀌었는지 돌려준다.
    /// 중복 전달된 정산 신호는 여기서 0건 갱신으로 걸러진다.
    async fn tag_history(
        &self,
        history_id: i64,
        from: BidAction,
        to: BidAction,
    ) -> Result<bool, BidError>;

    async fn find_history(&self, history_id: i64) -> Result<Option<AuctionHistory>, BidError>;

    /// 현재 낙찰자 이력 조회
    async fn find_winning_history(
        &self,
        auction_id: i64,
    ) -> Result<Option<AuctionHistory>, BidError>;

    /// 차순위 입찰자 조회 (가격 내림차순, 동가는 빠른 입찰 우선, 직전 포기자 제외)
    async fn find_next_candidate(
        &self,
        auction_id: i64,
        excluded_user_id: i64,
    ) -> Result<Option<AuctionHistory>, BidError>;

    /// 주문 생성. 경매당 활성 주문 1건 제약 위반은 ConflictingPromotion으로 돌려준다.
    async fn insert_order(
        &self,
        history: &AuctionHistory,
        auction: &Auction,
    ) -> Result<Order, BidError>;

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, BidError>;

    async fn change_order_status(
        &self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, BidError>;

    /// 주문 완료 시 가격 관측 데이터 1건 기록 (중복 전달은 무시)
    async fn insert_price_observation(
        &self,
        order: &Order,
        product_id: i64,
    ) -> Result<(), BidError>;
}

// endregion: --- Auction Store Trait

// region:    --- Postgres Store

pub struct PostgresAuctionStore {
    db: Arc<DatabaseManager>,
}

impl PostgresAuctionStore {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuctionStore for PostgresAuctionStore {
    async fn find_auction(&self, auction_id: i64) -> Result<Option<Auction>, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(BidError::from)
                })
            })
            .await
    }

    async fn change_auction_status(
        &self,
        auction_id: i64,
        from: AuctionStatus,
        to: AuctionStatus,
    ) -> Result<bool, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let result = sqlx::query(queries::CHANGE_AUCTION_STATUS)
                        .bind(auction_id)
                        .bind(from)
                        .bind(to)
                        .execute(&mut **tx)
                        .await?;
                    Ok(result.rows_affected() > 0)
                })
            })
            .await
    }

    async fn insert_history(&self, history: &AuctionHistory) -> Result<AuctionHistory, BidError> {
        let history = history.clone();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, AuctionHistory>(queries::INSERT_HISTORY)
                        .bind(history.auction_id)
                        .bind(history.user_id)
                        .bind(history.action)
                        .bind(history.action_time)
                        .bind(history.price)
                        .fetch_one(&mut **tx)
                        .await
                        .map_err(BidError::from)
                })
            })
            .await
    }

    async fn insert_histories(&self, histories: &[AuctionHistory]) -> Result<(), BidError> {
        let histories = histories.to_vec();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    for history in &histories {
                        sqlx::query(queries::INSERT_HISTORY)
                            .bind(history.auction_id)
                            .bind(history.user_id)
                            .bind(history.action)
                            .bind(history.action_time)
                            .bind(history.price)
                            .execute(&mut **tx)
                            .await?;
                    }
                    Ok(())
                })
            })
            .await
    }

    async fn tag_history(
        &self,
        history_id: i64,
        from: BidAction,
        to: BidAction,
    ) -> Result<bool, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let result = sqlx::query(queries::TAG_HISTORY)
                        .bind(history_id)
                        .bind(from)
                        .bind(to)
                        .execute(&mut **tx)
                        .await?;
                    Ok(result.rows_affected() > 0)
                })
            })
            .await
    }

    async fn find_history(&self, history_id: i64) -> Result<Option<AuctionHistory>, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, AuctionHistory>(queries::GET_HISTORY)
                        .bind(history_id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(BidError::from)
                })
            })
            .await
    }

    async fn find_winning_history(
        &self,
        auction_id: i64,
    ) -> Result<Option<AuctionHistory>, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, AuctionHistory>(queries::GET_WINNING_HISTORY)
                        .bind(auction_id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(BidError::from)
                })
            })
            .await
    }

    async fn find_next_candidate(
        &self,
        auction_id: i64,
        excluded_user_id: i64,
    ) -> Result<Option<AuctionHistory>, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, AuctionHistory>(queries::GET_NEXT_CANDIDATE)
                        .bind(auction_id)
                        .bind(excluded_user_id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(BidError::from)
                })
            })
            .await
    }

    async fn insert_order(
        &self,
        history: &AuctionHistory,
        auction: &Auction,
    ) -> Result<Order, BidError> {
        let history = history.clone();
        let auction = auction.clone();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let result = sqlx::query_as::<_, Order>(queries::INSERT_ORDER)
                        .bind(history.id)
                        .bind(auction.id)
                        .bind(auction.seller_id)
                        .bind(history.user_id)
                        .bind(history.price)
                        .fetch_one(&mut **tx)
                        .await;
                    match result {
                        Ok(order) => Ok(order),
                        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                            Err(BidError::ConflictingPromotion)
                        }
                        Err(e) => Err(BidError::Store(e)),
                    }
                })
            })
            .await
    }

    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query_as::<_, Order>(queries::GET_ORDER)
                        .bind(order_id)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(BidError::from)
                })
            })
            .await
    }

    async fn change_order_status(
        &self,
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, BidError> {
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    let result = sqlx::query(queries::CHANGE_ORDER_STATUS)
                        .bind(order_id)
                        .bind(from)
                        .bind(to)
                        .execute(&mut **tx)
                        .await?;
                    Ok(result.rows_affected() > 0)
                })
            })
            .await
    }

    async fn insert_price_observation(
        &self,
        order: &Order,
        product_id: i64,
    ) -> Result<(), BidError> {
        let order = order.clone();
        self.db
            .transaction(|tx| {
                Box::pin(async move {
                    sqlx::query(queries::INSERT_PRICE_OBSERVATION)
                        .bind(order.id)
                        .bind(order.auction_id)
                        .bind(product_id)
                        .bind(Utc::now().date_naive())
                        .bind(order.price)
                        .execute(&mut **tx)
                        .await?;
                    Ok(())
                })
            })
            .await
    }
}

// endregion: --- Postgres Store
