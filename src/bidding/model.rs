use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 모델 (영속 저장소)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub product_id: i64,
    pub live_id: i64,
    pub seller_id: i64,
    pub start_price: i64,
    pub amount: i32,
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
}

// 아래 순서대로 정렬되므로 수정시 주의
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Scheduled,
    InProgress,
    Ended,
    Failed,
}

/// 입찰/낙찰/포기/결제완료 - 원장과 이력 레코드가 공유하는 닫힌 액션 집합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidAction {
    Bid,
    Won,
    Forfeited,
    Settled,
}

// 입찰 레코드 (원장 전용, TTL 보호)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRecord {
    /// "{auction_id}:{user_id}:{timestamp_millis}" 형태의 복합 키
    pub bid_id: String,
    pub auction_id: i64,
    pub user_id: i64,
    pub user_nickname: String,
    pub bid_price: i64,
    pub bid_time: DateTime<Utc>,
    pub action: BidAction,
}

impl BidRecord {
    pub fn new(auction_id: i64, user_id: i64, user_nickname: String, bid_price: i64) -> Self {
        let bid_time = Utc::now();
        let bid_id = format!("{}:{}:{}", auction_id, user_id, bid_time.timestamp_millis());
        BidRecord {
            bid_id,
            auction_id,
            user_id,
            user_nickname,
            bid_price,
            bid_time,
            action: BidAction::Bid,
        }
    }
}

// 경매 이력 모델 (영속 저장소, 추가 전용)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuctionHistory {
    pub id: i64,
    pub auction_id: i64,
    pub user_id: i64,
    pub action: BidAction,
    pub action_time: DateTime<Utc>,
    pub price: i64,
}

impl AuctionHistory {
    /// 원장 레코드를 이력 행으로 변환 (id는 저장 시 채워짐)
    pub fn from_bid_record(record: &BidRecord) -> Self {
        AuctionHistory {
            id: 0,
            auction_id: record.auction_id,
            user_id: record.user_id,
            action: record.action,
            action_time: record.bid_time,
            price: record.bid_price,
        }
    }
}

// 주문 모델 (영속 저장소)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub auction_history_id: i64,
    pub auction_id: i64,
    pub seller_id: i64,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub price: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Waiting,
    Paid,
    Shipped,
    Completed,
    Pending,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// 경매당 활성(비종결) 주문은 최대 1건 - 종결 상태 판정
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

// region:    --- DTOs

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub user_id: i64,
    pub user_nickname: String,
    pub bid_price: i64,
}

/// 경매 시작 명령
#[derive(Debug, Serialize, Deserialize)]
pub struct StartAuctionCommand {
    pub seller_id: i64,
    /// 시청자 그룹(경매방) ID
    pub room_id: i64,
}

/// 경매 종료 명령
#[derive(Debug, Serialize, Deserialize)]
pub struct StopAuctionCommand {
    pub seller_id: i64,
}

/// 주문 상태 변경 명령
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateOrderStatusCommand {
    pub new_status: OrderStatus,
}

/// 입찰 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidResponse {
    pub bid_id: String,
    pub auction_id: i64,
    pub user_id: i64,
    pub user_nickname: String,
    pub bid_price: i64,
    pub bid_time: DateTime<Utc>,
}

impl BidResponse {
    pub fn from_record(record: &BidRecord) -> Self {
        BidResponse {
            bid_id: record.bid_id.clone(),
            auction_id: record.auction_id,
            user_id: record.user_id,
            user_nickname: record.user_nickname.clone(),
            bid_price: record.bid_price,
            bid_time: record.bid_time,
        }
    }
}

/// 입찰 현황 스냅샷 (상태 조회 및 브로드캐스트 공용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidStatus {
    pub auction_id: i64,
    pub status: AuctionStatus,
    pub current_highest_price: i64,
    pub bid_list: Vec<BidResponse>,
    pub highest_bid: Option<BidResponse>,
}

// endregion: --- DTOs
