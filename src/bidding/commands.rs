/// 입찰 관련 커맨드 처리
/// 1. 입찰
/// 2. 입찰 현황 조회
/// 3. 경매 시작/종료
/// 4. 낙찰 처리
// region:    --- Imports
use crate::bidding::model::{
    AuctionHistory, AuctionStatus, BidAction, BidRecord, BidResponse, BidStatus, PlaceBidCommand,
    StartAuctionCommand, StopAuctionCommand,
};
use crate::error::BidError;
use crate::ledger::BidLedger;
use crate::message_broker::NotificationSender;
use crate::settlement;
use crate::store::AuctionStore;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// 최소 입찰 금액 (요청 검증 경계, 원 단위)
pub const MIN_BID_PRICE: i64 = 1000;

// region:    --- Commands

/// 1. 입찰
/// 경매 조회는 원장 잠금 밖에서, 최고가 재검증과 추가는 잠금 안에서 수행된다.
pub async fn submit_bid<S: AuctionStore>(
    store: &S,
    ledger: &BidLedger,
    cmd: PlaceBidCommand,
) -> Result<(), BidError> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);

    // 요청 검증 경계: 최소 입찰 금액
    if cmd.bid_price < MIN_BID_PRICE {
        return Err(BidError::PriceTooLow {
            minimum: MIN_BID_PRICE,
        });
    }

    // 경매 존재 및 상태 확인
    let auction = store
        .find_auction(cmd.auction_id)
        .await?
        .ok_or(BidError::AuctionNotFound(cmd.auction_id))?;
    if auction.status != AuctionStatus::InProgress {
        return Err(BidError::InvalidState(
            "진행 중인 경매가 아닙니다.".to_string(),
        ));
    }

    // 현재 구간의 최소 입찰가 (스케줄러가 갱신, 없으면 시작가 + 1)
    let base_min = ledger
        .get_floor(cmd.auction_id)
        .unwrap_or(0)
        .max(auction.start_price + 1);

    // 원장 잠금 안에서 최고가 재검증 후 추가
    let record = BidRecord::new(
        cmd.auction_id,
        cmd.user_id,
        cmd.user_nickname.clone(),
        cmd.bid_price,
    );
    ledger
        .compare_and_put(record, base_min)
        .map_err(|minimum| BidError::PriceTooLow { minimum })?;

    info!(
        "{:<12} --> 입찰 생성 완료 - 경매 ID: {}, 사용자 ID: {}, 입찰가: {}",
        "Command", cmd.auction_id, cmd.user_id, cmd.bid_price
    );
    Ok(())
}

/// 2. 입찰 현황 조회 (limit == 0 이면 전체)
pub async fn get_bid_status<S: AuctionStore>(
    store: &S,
    ledger: &BidLedger,
    auction_id: i64,
    limit: usize,
) -> Result<BidStatus, BidError> {
    let auction = store
        .find_auction(auction_id)
        .await?
        .ok_or(BidError::AuctionNotFound(auction_id))?;

    let records = if limit == 0 {
        ledger.all_for(auction_id)
    } else {
        ledger.top_n(auction_id, limit)
    };

    let bid_list: Vec<BidResponse> = records.iter().map(BidResponse::from_record).collect();
    let highest_bid = bid_list.first().cloned();
    let current_highest_price = highest_bid
        .as_ref()
        .map(|bid| bid.bid_price)
        .unwrap_or(auction.start_price);

    Ok(BidStatus {
        auction_id,
        status: auction.status,
        current_highest_price,
        bid_list,
        highest_bid,
    })
}

/// 3-1. 경매 시작 (SCHEDULED -> IN_PROGRESS, 활성 경매 등록)
pub async fn start_auction<S: AuctionStore>(
    store: &S,
    ledger: &BidLedger,
    auction_id: i64,
    cmd: StartAuctionCommand,
) -> Result<(), BidError> {
    info!("{:<12} --> 경매 시작 요청 - 경매 ID: {}", "Command", auction_id);

    let auction = store
        .find_auction(auction_id)
        .await?
        .ok_or(BidError::AuctionNotFound(auction_id))?;
    if auction.seller_id != cmd.seller_id {
        return Err(BidError::Forbidden(
            "경매 상품 판매자가 일치하지 않습니다".to_string(),
        ));
    }

    if !store
        .change_auction_status(auction_id, AuctionStatus::Scheduled, AuctionStatus::InProgress)
        .await?
    {
        return Err(BidError::InvalidState(format!(
            "현재 경매 상태에서 진행할 수 없는 작업입니다. 현재 상태: {:?}",
            auction.status
        )));
    }

    // 경매-룸 매핑 등록 (스케줄러 브로드캐스트 대상)
    ledger.register_active(auction_id, cmd.room_id);

    info!(
        "{:<12} --> 경매방 생성 완료 - 경매 ID: {}, 룸 ID: {}",
        "Command", auction_id, cmd.room_id
    );
    Ok(())
}

/// 3-2. 경매 종료 (낙찰 처리 포함)
pub async fn stop_auction<S, N>(
    store: &Arc<S>,
    notifier: &Arc<N>,
    ledger: &BidLedger,
    auction_id: i64,
    cmd: StopAuctionCommand,
) -> Result<Option<BidResponse>, BidError>
where
    S: AuctionStore + 'static,
    N: NotificationSender + 'static,
{
    info!("{:<12} --> 경매 종료 요청 - 경매 ID: {}", "Command", auction_id);

    let auction = store
        .find_auction(auction_id)
        .await?
        .ok_or(BidError::AuctionNotFound(auction_id))?;
    if auction.seller_id != cmd.seller_id {
        return Err(BidError::Forbidden(
            "경매 상품 판매자가 일치하지 않습니다".to_string(),
        ));
    }

    finalize_bid(store, notifier, ledger, auction_id).await
}

/// 4. 낙찰 처리
/// 원장의 전체 입찰 내역을 영속 이력으로 이관하고 최고가 입찰자의 주문을 생성한다.
/// 이미 종료된 경매에 재호출되면 기존 낙찰 결과만 돌려준다.
pub async fn finalize_bid<S, N>(
    store: &Arc<S>,
    notifier: &Arc<N>,
    ledger: &BidLedger,
    auction_id: i64,
) -> Result<Option<BidResponse>, BidError>
where
    S: AuctionStore + 'static,
    N: NotificationSender + 'static,
{
    info!("{:<12} --> 경매 낙찰 처리 시작 - 경매 ID: {}", "Command", auction_id);

    let auction = store
        .find_auction(auction_id)
        .await?
        .ok_or(BidError::AuctionNotFound(auction_id))?;

    match auction.status {
        // 멱등: 이미 종료/유찰된 경매는 기록된 낙찰 결과 반환
        AuctionStatus::Ended | AuctionStatus::Failed => {
            let winner = store.find_winning_history(auction_id).await?;
            return Ok(winner.map(winning_response));
        }
        AuctionStatus::Scheduled => {
            return Err(BidError::InvalidState(
                "시작되지 않은 경매는 종료할 수 없습니다.".to_string(),
            ));
        }
        AuctionStatus::InProgress => {}
    }

    let records = ledger.all_for(auction_id);

    // 입찰이 없는 경매 - 유찰 처리
    if records.is_empty() {
        info!("{:<12} --> 입찰이 없는 경매 - 경매 ID: {}", "Command", auction_id);
        store
            .change_auction_status(auction_id, AuctionStatus::InProgress, AuctionStatus::Failed)
            .await?;
        ledger.remove(auction_id);
        return Ok(None);
    }

    // 상태 전환을 선점한 호출만 이관을 진행한다 (동시 종료 경합 방지)
    if !store
        .change_auction_status(auction_id, AuctionStatus::InProgress, AuctionStatus::Ended)
        .await?
    {
        let winner = store.find_winning_history(auction_id).await?;
        return Ok(winner.map(winning_response));
    }

    // 최고가 레코드를 낙찰로 태깅
    let winner = match ledger.tag_highest(auction_id, BidAction::Won) {
        Some(tagged) => tagged,
        None => {
            let mut fallback = records[0].clone();
            fallback.action = BidAction::Won;
            fallback
        }
    };

    // 최고가를 제외한 나머지 입찰 기록을 이력으로 이관
    let regular_bids: Vec<AuctionHistory> = records
        .iter()
        .filter(|record| record.bid_id != winner.bid_id)
        .map(AuctionHistory::from_bid_record)
        .collect();
    if !regular_bids.is_empty() {
        store.insert_histories(&regular_bids).await?;
    }

    // 낙찰 이력 저장 및 주문 생성
    let winning_history = store
        .insert_history(&AuctionHistory::from_bid_record(&winner))
        .await?;
    settlement::create_order(store, notifier, &winning_history, &auction).await?;

    // 원장 데이터 정리 (레코드 + 최소 입찰가 + 활성 인덱스)
    ledger.remove(auction_id);

    info!(
        "{:<12} --> 경매 낙찰 처리 완료 - 낙찰자: {}, 낙찰가: {}",
        "Command", winner.user_nickname, winner.bid_price
    );
    Ok(Some(BidResponse::from_record(&winner)))
}

/// 이력 행을 낙찰 응답으로 변환 (닉네임은 원장 만료 후 복원 불가)
fn winning_response(history: AuctionHistory) -> BidResponse {
    BidResponse {
        bid_id: history.id.to_string(),
        auction_id: history.auction_id,
        user_id: history.user_id,
        user_nickname: String::new(),
        bid_price: history.price,
        bid_time: history.action_time,
    }
}

// endregion: --- Commands
