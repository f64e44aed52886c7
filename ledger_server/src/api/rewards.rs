//! Reward handlers: claims, duel bot staking and affiliate referrals.
//!
//! Every operation acting for a player holds that player's guard for the
//! duration of the call.
//!
//! Claim staking rewards for two bots:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/claims/duel-bots \
//!   -H "Content-Type: application/json" \
//!   -d '{"user_id": 42, "nft_ids": ["bot-1", "bot-2"]}'
//! ```

use axum::{
    Json,
    extract::{Path, State},
};
use chip_ledger::{
    ActiveAffiliation, AffiliateAccount, ClaimReceipt, ClaimRequest, DuelBotPosition,
    LedgerEntry, LedgerStore, OwnerRef, RakebackAccount, StakeRequest, UnstakeReceipt, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiResult;
use crate::logging;

#[derive(Debug, Deserialize)]
pub struct RegisterBotsRequest {
    pub nft_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RakebackBoostRequest {
    pub additional_rate_bps: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCodeRequest {
    pub owner: UserId,
    pub code: String,
    pub custom_rate_bps: Option<i64>,
    #[serde(default)]
    pub first_deposit_bonus: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActivateAffiliationRequest {
    pub user_id: UserId,
    pub code: String,
    /// Signup time of the referred user
    pub user_created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FirstDepositRequest {
    pub user_id: UserId,
    pub deposit_amount: i64,
    pub owner: OwnerRef,
}

/// `entry` is `None` when the user has no bonus to receive
#[derive(Debug, Serialize, Deserialize)]
pub struct FirstDepositResponse {
    pub entry: Option<LedgerEntry>,
}

/// Pay out the accrued rakeback
///
/// # Errors
///
/// - `409 Conflict`: Nothing to claim, or the user is busy
pub async fn claim_rakeback<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<ClaimReceipt> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let receipt = state.ledger.claim_rakeback(None, request.user_id).await?;
    log_claim("claim_rakeback", request.user_id, &receipt);
    Ok(Json(receipt))
}

/// Pay out staking rewards of the named bots, or of all staked bots
pub async fn claim_duel_bots<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<ClaimReceipt> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let receipt = state
        .ledger
        .claim_duel_bot_rewards(None, request.user_id, request.nft_ids.as_deref())
        .await?;
    log_claim("claim_duel_bots", request.user_id, &receipt);
    Ok(Json(receipt))
}

/// Pay out affiliate rewards of the named codes, or of all owned codes
pub async fn claim_affiliate<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<ClaimRequest>,
) -> ApiResult<ClaimReceipt> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let receipt = state
        .ledger
        .claim_affiliate_rewards(None, request.user_id, request.codes.as_deref())
        .await?;
    log_claim("claim_affiliate", request.user_id, &receipt);
    Ok(Json(receipt))
}

/// Stake duel bot NFTs held by the user
///
/// # Errors
///
/// - `422 Unprocessable Entity`: NFT not held or not staking-eligible
/// - `409 Conflict`: NFT already staked
pub async fn stake<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<StakeRequest>,
) -> ApiResult<Vec<DuelBotPosition>> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let positions = state
        .ledger
        .stake_duel_bots(None, request.user_id, &request.nft_ids)
        .await?;
    logging::log_ledger_event("stake", Some(request.user_id), None, 0);
    Ok(Json(positions))
}

/// Unstake duel bots, paying out their pending rewards first
pub async fn unstake<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<StakeRequest>,
) -> ApiResult<UnstakeReceipt> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let receipt = state
        .ledger
        .unstake_duel_bots(None, request.user_id, &request.nft_ids)
        .await?;
    logging::log_ledger_event(
        "unstake",
        Some(request.user_id),
        receipt.claim.as_ref().map(|claim| claim.entry.id),
        receipt.claimed_amount,
    );
    Ok(Json(receipt))
}

/// Mark NFTs as staking-eligible duel bots
pub async fn register_duel_bots<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<RegisterBotsRequest>,
) -> ApiResult<Vec<DuelBotPosition>> {
    let positions = state
        .ledger
        .register_duel_bots(None, &request.nft_ids)
        .await?;
    Ok(Json(positions))
}

pub async fn rakeback_account<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<RakebackAccount> {
    Ok(Json(state.ledger.rakeback_account(None, user_id).await?))
}

/// Grant a temporary additional rakeback rate
pub async fn set_rakeback_boost<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<UserId>,
    Json(request): Json<RakebackBoostRequest>,
) -> ApiResult<RakebackAccount> {
    let _guard = state.user_locks.acquire(user_id).await?;
    let account = state
        .ledger
        .set_rakeback_boost(None, user_id, request.additional_rate_bps, request.expires_at)
        .await?;
    Ok(Json(account))
}

pub async fn staked_positions<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<DuelBotPosition>> {
    Ok(Json(state.ledger.staked_positions(None, user_id).await?))
}

pub async fn affiliate_codes<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Vec<AffiliateAccount>> {
    Ok(Json(state.ledger.affiliate_codes(None, user_id).await?))
}

/// Create an affiliate code
///
/// # Errors
///
/// - `400 Bad Request`: Code format or custom rate out of range
/// - `409 Conflict`: Code already taken
pub async fn create_affiliate_code<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<CreateCodeRequest>,
) -> ApiResult<AffiliateAccount> {
    let account = state
        .ledger
        .create_affiliate_code(
            None,
            request.owner,
            &request.code,
            request.custom_rate_bps,
            request.first_deposit_bonus,
        )
        .await?;
    Ok(Json(account))
}

/// Attach a user to a referral code
///
/// # Errors
///
/// - `404 Not Found`: Unknown code
/// - `409 Conflict`: User already referred
/// - `422 Unprocessable Entity`: Activation window closed
pub async fn activate_affiliation<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<ActivateAffiliationRequest>,
) -> ApiResult<ActiveAffiliation> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let affiliation = state
        .ledger
        .activate_affiliation(None, request.user_id, &request.code, request.user_created_at)
        .await?;
    Ok(Json(affiliation))
}

/// Apply the one-time first-deposit bonus of the user's referral code
pub async fn first_deposit_bonus<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<FirstDepositRequest>,
) -> ApiResult<FirstDepositResponse> {
    let _guard = state.user_locks.acquire(request.user_id).await?;
    let entry = state
        .ledger
        .apply_first_deposit_bonus(None, request.user_id, request.deposit_amount, request.owner)
        .await?;
    if let Some(entry) = &entry {
        logging::log_ledger_event(
            "first_deposit_bonus",
            Some(request.user_id),
            Some(entry.id),
            entry.amount_moved.chip,
        );
    }
    Ok(Json(FirstDepositResponse { entry }))
}

fn log_claim(event: &str, user_id: UserId, receipt: &ClaimReceipt) {
    logging::log_ledger_event(
        event,
        Some(user_id),
        Some(receipt.entry.id),
        receipt.claimed_amount(),
    );
}
