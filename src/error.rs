/// 입찰 코어 공통 에러 타입
/// HTTP 응답은 {"error": ..., "code": ...} 형태로 직렬화된다.
// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

// endregion: --- Imports

// region:    --- BidError
#[derive(Debug, thiserror::Error)]
pub enum BidError {
    #[error("존재하지 않는 경매입니다: {0}")]
    AuctionNotFound(i64),

    #[error("존재하지 않는 주문입니다: {0}")]
    OrderNotFound(i64),

    /// 경매/주문이 해당 작업을 허용하지 않는 상태
    #[error("{0}")]
    InvalidState(String),

    /// 최소 입찰가 미달 (minimum = 현재 유효한 최소 입찰가)
    #[error("입찰가가 현재 최소 입찰가보다 낮습니다. 현재 최소 입찰가: {minimum}")]
    PriceTooLow { minimum: i64 },

    #[error("{0}")]
    Forbidden(String),

    /// 차순위 승격 중복 시도 - 해당 경매의 활성 주문이 이미 존재
    #[error("해당 경매에 대한 활성 주문이 이미 존재합니다")]
    ConflictingPromotion,

    #[error("저장소 오류: {0}")]
    Store(#[from] sqlx::Error),

    #[error("메시지 브로커 오류: {0}")]
    Broker(String),
}

impl BidError {
    /// 클라이언트 식별용 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            BidError::AuctionNotFound(_) | BidError::OrderNotFound(_) => "NOT_FOUND",
            BidError::InvalidState(_) => "INVALID_STATUS",
            BidError::PriceTooLow { .. } => "LOW_BID",
            BidError::Forbidden(_) => "FORBIDDEN",
            BidError::ConflictingPromotion => "CONFLICT",
            BidError::Store(_) => "STORE_UNAVAILABLE",
            BidError::Broker(_) => "BROKER_UNAVAILABLE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BidError::AuctionNotFound(_) | BidError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            BidError::InvalidState(_) | BidError::PriceTooLow { .. } => StatusCode::BAD_REQUEST,
            BidError::Forbidden(_) => StatusCode::FORBIDDEN,
            BidError::ConflictingPromotion => StatusCode::CONFLICT,
            BidError::Store(_) | BidError::Broker(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// 일시적 저장소 장애만 재시도 대상 (검증 에러는 재시도 금지)
    pub fn is_retryable(&self) -> bool {
        matches!(self, BidError::Store(_) | BidError::Broker(_))
    }
}

impl IntoResponse for BidError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let BidError::PriceTooLow { minimum } = &self {
            body["minimum"] = serde_json::json!(minimum);
        }
        (self.status_code(), Json(body)).into_response()
    }
}
// endregion: --- BidError
