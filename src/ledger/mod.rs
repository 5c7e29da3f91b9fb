/// 입찰 원장 (Bid Ledger)
/// 진행 중인 경매의 입찰 레코드를 경매 단위로 보관하는 인메모리 공유 저장소.
/// 1. 입찰 레코드 집합: 경매별로 묶이고 마지막 쓰기 기준 TTL로 만료
/// 2. 최소 입찰가 프로젝션: 스케줄러만 쓰고 입찰 검증이 읽음
/// 3. 활성 경매 인덱스: 경매 ID -> 시청자 그룹(룸) ID
// region:    --- Imports
use crate::bidding::model::{BidAction, BidRecord};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

// endregion: --- Imports

// region:    --- Bid Ledger

// 입찰 레코드 TTL: 10시간 (초 단위)
const BID_TTL_SECS: u64 = 36000;

/// 경매 하나의 입찰 레코드 집합. 쓰기 때마다 만료 시각이 갱신된다.
struct AuctionBids {
    entries: Vec<BidRecord>,
    expires_at: Instant,
}

impl AuctionBids {
    fn new(ttl: Duration) -> Self {
        AuctionBids {
            entries: Vec::new(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn touch(&mut self, ttl: Duration) {
        self.expires_at = Instant::now() + ttl;
    }

    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

pub struct BidLedger {
    bids: DashMap<i64, AuctionBids>,
    floors: DashMap<i64, i64>,
    /// 경매 ID -> 시청자 그룹 ID
    active: DashMap<i64, i64>,
    ttl: Duration,
}

impl Default for BidLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BidLedger {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(BID_TTL_SECS))
    }

    /// TTL을 지정해 생성 (테스트용 짧은 TTL 포함)
    pub fn with_ttl(ttl: Duration) -> Self {
        BidLedger {
            bids: DashMap::new(),
            floors: DashMap::new(),
            active: DashMap::new(),
            ttl,
        }
    }

    /// 입찰 레코드 추가. 동일 키(bid_id) 재전송은 멱등 처리.
    pub fn put(&self, record: BidRecord) {
        let mut set = self
            .bids
            .entry(record.auction_id)
            .or_insert_with(|| AuctionBids::new(self.ttl));
        if set.is_expired() {
            set.entries.clear();
        }
        if !set.entries.iter().any(|e| e.bid_id == record.bid_id) {
            set.entries.push(record);
        }
        set.touch(self.ttl);
    }

    /// 검증-추가 원자 연산. 경매 키 단위 잠금 안에서
    /// 현재 최고가를 다시 읽고 최소 유효가와 비교한 뒤 추가한다.
    /// 거절 시 현재 최소 유효가를 돌려준다.
    pub fn compare_and_put(&self, record: BidRecord, base_min: i64) -> Result<(), i64> {
        let mut set = self
            .bids
            .entry(record.auction_id)
            .or_insert_with(|| AuctionBids::new(self.ttl));
        if set.is_expired() {
            set.entries.clear();
        }

        let highest = set
            .entries
            .iter()
            .map(|e| e.bid_price)
            .max()
            .map(|h| h + 1)
            .unwrap_or(base_min);
        let min_valid = base_min.max(highest);

        if record.bid_price < min_valid {
            return Err(min_valid);
        }

        if !set.entries.iter().any(|e| e.bid_id == record.bid_id) {
            set.entries.push(record);
        }
        set.touch(self.ttl);
        Ok(())
    }

    /// 현재 최고가 입찰 조회
    pub fn highest_for(&self, auction_id: i64) -> Option<BidRecord> {
        self.sorted_for(auction_id).into_iter().next()
    }

    /// 상위 N개 입찰 조회 (가격 내림차순, 동가는 빠른 입찰 우선)
    pub fn top_n(&self, auction_id: i64, n: usize) -> Vec<BidRecord> {
        let mut records = self.sorted_for(auction_id);
        records.truncate(n);
        records
    }

    /// 경매의 전체 입찰 조회 (가격 내림차순)
    pub fn all_for(&self, auction_id: i64) -> Vec<BidRecord> {
        self.sorted_for(auction_id)
    }

    /// 최고가 레코드의 액션을 갱신하고 갱신된 레코드를 돌려준다.
    pub fn tag_highest(&self, auction_id: i64, action: BidAction) -> Option<BidRecord> {
        let top = self.highest_for(auction_id)?;
        let mut set = self.bids.get_mut(&auction_id)?;
        let entry = set.entries.iter_mut().find(|e| e.bid_id == top.bid_id)?;
        entry.action = action;
        Some(entry.clone())
    }

    fn sorted_for(&self, auction_id: i64) -> Vec<BidRecord> {
        let Some(set) = self.bids.get(&auction_id) else {
            return Vec::new();
        };
        if set.is_expired() {
            return Vec::new();
        }
        let mut records = set.entries.clone();
        drop(set);
        records.sort_by(|a, b| {
            b.bid_price
                .cmp(&a.bid_price)
                .then(a.bid_time.cmp(&b.bid_time))
        });
        records
    }

    // region:    --- 최소 입찰가 프로젝션

    /// 다음 구간의 최소 입찰가 저장 (스케줄러 전용 쓰기)
    pub fn set_floor(&self, auction_id: i64, price: i64) {
        self.floors.insert(auction_id, price);
        debug!(
            "{:<12} --> 최소 입찰가 갱신 - 경매 ID: {}, 최소 입찰가: {}",
            "Ledger", auction_id, price
        );
    }

    pub fn get_floor(&self, auction_id: i64) -> Option<i64> {
        self.floors.get(&auction_id).map(|v| *v)
    }

    // endregion: --- 최소 입찰가 프로젝션

    // region:    --- 활성 경매 인덱스

    /// 진행 중인 경매 등록 (경매 ID -> 룸 ID)
    pub fn register_active(&self, auction_id: i64, room_id: i64) {
        self.active.insert(auction_id, room_id);
        debug!(
            "{:<12} --> 활성 경매 등록 - 경매 ID: {}, 룸 ID: {}",
            "Ledger", auction_id, room_id
        );
    }

    /// 진행 중인 모든 경매와 룸 매핑 조회
    pub fn active_auctions(&self) -> Vec<(i64, i64)> {
        self.active.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    // endregion: --- 활성 경매 인덱스

    /// 경매의 원장 상태 일괄 삭제 (레코드 + 최소 입찰가 + 인덱스)
    pub fn remove(&self, auction_id: i64) {
        self.bids.remove(&auction_id);
        self.floors.remove(&auction_id);
        self.active.remove(&auction_id);
        debug!(
            "{:<12} --> 경매 원장 데이터 삭제 완료 - 경매 ID: {}",
            "Ledger", auction_id
        );
    }

    /// TTL이 지난 레코드 집합 정리. 최소 입찰가/인덱스 키는 명시적 삭제 대상이므로 남긴다.
    pub fn sweep_expired(&self) {
        self.bids.retain(|_, set| !set.is_expired());
    }
}

// endregion: --- Bid Ledger

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn record(auction_id: i64, user_id: i64, price: i64) -> BidRecord {
        BidRecord::new(auction_id, user_id, format!("user{}", user_id), price)
    }

    #[test]
    fn top_n_sorts_by_price_desc_then_time_asc() {
        let ledger = BidLedger::new();
        let first = record(1, 10, 5000);
        let mut same_price_later = record(1, 11, 5000);
        same_price_later.bid_time = first.bid_time + chrono::Duration::milliseconds(5);
        same_price_later.bid_id = "1:11:later".to_string();
        ledger.put(record(1, 12, 7000));
        ledger.put(same_price_later);
        ledger.put(first.clone());

        let top = ledger.top_n(1, 10);
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].bid_price, 7000);
        assert_eq!(top[1].bid_id, first.bid_id);
        assert_eq!(top[2].bid_id, "1:11:later");
    }

    #[test]
    fn put_is_idempotent_on_same_key() {
        let ledger = BidLedger::new();
        let r = record(1, 10, 5000);
        ledger.put(r.clone());
        ledger.put(r);
        assert_eq!(ledger.all_for(1).len(), 1);
    }

    #[test]
    fn compare_and_put_rejects_non_increasing_price() {
        let ledger = BidLedger::new();
        assert!(ledger.compare_and_put(record(1, 10, 10001), 10001).is_ok());
        // 동일 가격은 현재 최고가보다 크지 않으므로 거절
        let rejected = ledger.compare_and_put(record(1, 11, 10001), 10001);
        assert_eq!(rejected.unwrap_err(), 10002);
        assert!(ledger.compare_and_put(record(1, 11, 10500), 10001).is_ok());
        assert_eq!(ledger.highest_for(1).unwrap().bid_price, 10500);
    }

    #[test]
    fn compare_and_put_respects_floor_without_bids() {
        let ledger = BidLedger::new();
        let rejected = ledger.compare_and_put(record(1, 10, 9000), 10001);
        assert_eq!(rejected.unwrap_err(), 10001);
    }

    #[tokio::test]
    async fn concurrent_same_price_bids_accept_exactly_one() {
        use std::sync::Arc;
        let ledger = Arc::new(BidLedger::new());
        let mut handles = Vec::new();
        for user_id in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.compare_and_put(record(1, user_id, 20000), 10001).is_ok()
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(ledger.all_for(1).len(), 1);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl_window() {
        let ledger = BidLedger::with_ttl(Duration::from_millis(30));
        ledger.put(record(1, 10, 5000));
        assert!(ledger.highest_for(1).is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ledger.highest_for(1).is_none());
        assert!(ledger.top_n(1, 10).is_empty());

        // sweep은 만료된 레코드 집합만 제거하고 인덱스/최소가는 남긴다
        ledger.register_active(1, 77);
        ledger.set_floor(1, 5001);
        ledger.sweep_expired();
        assert_eq!(ledger.active_auctions(), vec![(1, 77)]);
        assert_eq!(ledger.get_floor(1), Some(5001));
    }

    #[test]
    fn remove_clears_entries_floor_and_index() {
        let ledger = BidLedger::new();
        ledger.put(record(1, 10, 5000));
        ledger.set_floor(1, 5001);
        ledger.register_active(1, 77);

        ledger.remove(1);
        assert!(ledger.all_for(1).is_empty());
        assert_eq!(ledger.get_floor(1), None);
        assert!(ledger.active_auctions().is_empty());
    }

    #[test]
    fn tag_highest_updates_action_in_place() {
        let ledger = BidLedger::new();
        ledger.put(record(1, 10, 5000));
        ledger.put(record(1, 11, 7000));

        let tagged = ledger.tag_highest(1, BidAction::Won).unwrap();
        assert_eq!(tagged.user_id, 11);
        assert_eq!(tagged.action, BidAction::Won);
        assert_eq!(ledger.highest_for(1).unwrap().action, BidAction::Won);
    }
}
// endregion: --- Tests
