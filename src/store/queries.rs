/// 경매 조회
pub const GET_AUCTION: &str =
    "SELECT id, product_id, live_id, seller_id, start_price, amount, status, created_at FROM auction WHERE id = $1";

/// 경매 상태 변경 (기대 상태가 일치할 때만)
pub const CHANGE_AUCTION_STATUS: &str =
    "UPDATE auction SET status = $3 WHERE id = $1 AND status = $2";

/// 경매 이력 저장
pub const INSERT_HISTORY: &str = r#"
    INSERT INTO auction_history (auction_id, user_id, action, action_time, price)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, auction_id, user_id, action, action_time, price
"#;

/// 경매 이력 액션 변경 (기대 액션이 일치할 때만)
pub const TAG_HISTORY: &str =
    "UPDATE auction_history SET action = $3 WHERE id = $1 AND action = $2";

/// 경매 이력 조회
pub const GET_HISTORY: &str =
    "SELECT id, auction_id, user_id, action, action_time, price FROM auction_history WHERE id = $1";

/// 현재 낙찰 이력 조회 (낙찰 직후 WON, 주문 생성 후 SETTLED)
pub const GET_WINNING_HISTORY: &str = r#"
    SELECT id, auction_id, user_id, action, action_time, price
    FROM auction_history
    WHERE auction_id = $1 AND action IN ('WON', 'SETTLED')
    ORDER BY price DESC, action_time ASC
    LIMIT 1
"#;

/// 차순위 입찰자 조회 (가격 내림차순, 동가는 빠른 입찰 우선, 포기자 제외)
pub const GET_NEXT_CANDIDATE: &str = r#"
    SELECT id, auction_id, user_id, action, action_time, price
    FROM auction_history
    WHERE auction_id = $1 AND action = 'BID' AND user_id <> $2
    ORDER BY price DESC, action_time ASC
    LIMIT 1
"#;

/// 주문 생성
pub const INSERT_ORDER: &str = r#"
    INSERT INTO "order" (auction_history_id, auction_id, seller_id, customer_id, status, price)
    VALUES ($1, $2, $3, $4, 'WAITING', $5)
    RETURNING id, auction_history_id, auction_id, seller_id, customer_id, status, price, created_at, updated_at
"#;

/// 주문 조회
pub const GET_ORDER: &str = r#"
    SELECT id, auction_history_id, auction_id, seller_id, customer_id, status, price, created_at, updated_at
    FROM "order"
    WHERE id = $1
"#;

/// 주문 상태 변경 (기대 상태가 일치할 때만)
pub const CHANGE_ORDER_STATUS: &str =
    "UPDATE \"order\" SET status = $3, updated_at = now() WHERE id = $1 AND status = $2";

/// 가격 관측 데이터 저장 (중복 전달은 무시)
pub const INSERT_PRICE_OBSERVATION: &str = r#"
    INSERT INTO price_observation (order_id, auction_id, product_id, observed_at, price)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (order_id) DO NOTHING
"#;
