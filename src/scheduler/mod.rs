/// 입찰 현황 브로드캐스트 스케줄러
/// 3초마다 진행 중인 경매들의 입찰 현황을 조회하여
/// 1. 다음 구간의 최소 입찰가(현재 최고가 + 1)를 원장에 기록하고
/// 2. 해당 시청자 그룹에 마스킹된 스냅샷을 발행한다.
/// 영속 저장소에 없는 경매가 원장에 남아 있으면 그 자리에서 정리한다.
// region:    --- Imports
use crate::bidding::commands;
use crate::bidding::model::{BidResponse, BidStatus};
use crate::error::BidError;
use crate::ledger::BidLedger;
use crate::message_broker::StatusPublisher;
use crate::store::AuctionStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Bid Scheduler

// 브로드캐스트 주기
const BROADCAST_PERIOD: Duration = Duration::from_secs(3);
// 스냅샷에 포함할 상위 입찰 수
const TOP_BIDS_LIMIT: usize = 10;

/// 입찰 현황 브로드캐스트 스케줄러
pub struct BidScheduler<S, P> {
    store: Arc<S>,
    ledger: Arc<BidLedger>,
    publisher: Arc<P>,
    period: Duration,
}

impl<S, P> BidScheduler<S, P>
where
    S: AuctionStore + 'static,
    P: StatusPublisher + 'static,
{
    pub fn new(store: Arc<S>, ledger: Arc<BidLedger>, publisher: Arc<P>) -> Self {
        Self {
            store,
            ledger,
            publisher,
            period: BROADCAST_PERIOD,
        }
    }

    /// 브로드캐스트 루프 시작. 반환된 핸들로 종료를 요청한다.
    pub fn start(&self) -> SchedulerHandle {
        let store = Arc::clone(&self.store);
        let ledger = Arc::clone(&self.ledger);
        let publisher = Arc::clone(&self.publisher);
        let period = self.period;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            // 틱이 주기를 넘기면 다음 틱은 겹치지 않고 건너뛴다
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        Self::broadcast_tick(&store, &ledger, &publisher).await;
                    }
                    // 종료 신호는 틱 사이에서만 확인 - 진행 중인 발행은 끝까지 간다
                    _ = shutdown_rx.changed() => {
                        info!("{:<12} --> 브로드캐스트 스케줄러 종료", "Scheduler");
                        break;
                    }
                }
            }
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// 한 틱의 브로드캐스트 처리. 경매 단위로 실패를 격리한다.
    pub async fn broadcast_tick(store: &S, ledger: &BidLedger, publisher: &P) {
        // TTL이 지난 레코드 집합 정리 (안전망)
        ledger.sweep_expired();

        let active_auctions = ledger.active_auctions();
        if active_auctions.is_empty() {
            debug!("{:<12} --> 진행 중인 경매가 없습니다.", "Scheduler");
            return;
        }

        debug!(
            "{:<12} --> 진행 중인 경매 수: {}",
            "Scheduler",
            active_auctions.len()
        );

        for (auction_id, room_id) in active_auctions {
            match commands::get_bid_status(store, ledger, auction_id, TOP_BIDS_LIMIT).await {
                Ok(status) => {
                    // 다음 구간의 최소 입찰가 갱신 - 본 프로젝션의 유일한 쓰기 지점
                    ledger.set_floor(auction_id, status.current_highest_price + 1);

                    let masked = mask_status(&status);
                    if let Err(e) = publisher.publish_status(room_id, &masked).await {
                        error!(
                            "{:<12} --> 경매 {} (룸 {}) 브로드캐스트 실패: {}",
                            "Scheduler", auction_id, room_id, e
                        );
                        continue;
                    }

                    debug!(
                        "{:<12} --> 경매 상태 브로드캐스트 완료 - 경매 ID: {}, 현재 최고가: {}",
                        "Scheduler", auction_id, status.current_highest_price
                    );
                }
                Err(BidError::AuctionNotFound(_)) => {
                    // 영속 저장소에 없는 경매 - 원장 데이터 정리
                    warn!(
                        "{:<12} --> 존재하지 않는 경매 {} (룸 {}) - 원장 데이터 정리",
                        "Scheduler", auction_id, room_id
                    );
                    ledger.remove(auction_id);
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 경매 {} 상태 조회 실패: {:?}",
                        "Scheduler", auction_id, e
                    );
                }
            }
        }
    }
}

/// 스케줄러 종료 핸들
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// 진행 중인 틱이 끝난 뒤 루프를 종료한다.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

// endregion: --- Bid Scheduler

// region:    --- Broadcast Masking

/// 브로드캐스트용 스냅샷 마스킹 (입찰자 식별 정보 제거)
pub fn mask_status(status: &BidStatus) -> BidStatus {
    BidStatus {
        auction_id: status.auction_id,
        status: status.status,
        current_highest_price: status.current_highest_price,
        bid_list: status.bid_list.iter().map(mask_bid).collect(),
        highest_bid: status.highest_bid.as_ref().map(mask_bid),
    }
}

fn mask_bid(bid: &BidResponse) -> BidResponse {
    BidResponse {
        bid_id: bid.bid_id.clone(),
        auction_id: bid.auction_id,
        user_id: 0,
        user_nickname: mask_nickname(&bid.user_nickname),
        bid_price: bid.bid_price,
        bid_time: bid.bid_time,
    }
}

/// 닉네임 마스킹 처리 (예: "홍길동" -> "홍*동")
pub fn mask_nickname(nickname: &str) -> String {
    let chars: Vec<char> = nickname.chars().collect();
    if chars.len() <= 2 {
        return nickname.to_string();
    }
    let mut masked = String::new();
    masked.push(chars[0]);
    for _ in 1..chars.len() - 1 {
        masked.push('*');
    }
    masked.push(chars[chars.len() - 1]);
    masked
}

// endregion: --- Broadcast Masking

// endregion: --- Tests
