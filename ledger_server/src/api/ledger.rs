//! Transfer, settlement and wallet handlers.
//!
//! # Examples
//!
//! Pending withdrawal:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/transfers \
//!   -H "Content-Type: application/json" \
//!   -d '{"from": 42, "to": null, "load": {"chip": 500},
//!        "entry_type": "withdraw", "to_be_confirmed": true,
//!        "owner": {"kind": "payment", "id": 9001}}'
//! ```
//!
//! Decline it again:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/entries/17/decline \
//!   -H "Content-Type: application/json" \
//!   -d '{"owner": {"kind": "payment", "id": 9001}}'
//! ```

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chip_ledger::{
    BalanceLoad, DeclineReceipt, EntryId, LedgerEntry, LedgerStore, OwnerRef, SettleRequest,
    SystemWallet, TransferReceipt, TransferRequest, UserId,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiResult;
use crate::logging;

/// Body of confirm and decline requests
#[derive(Debug, Deserialize)]
pub struct SettleBody {
    pub owner: OwnerRef,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletBalance {
    pub wallet_id: UserId,
    #[serde(flatten)]
    pub balance: BalanceLoad,
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    pub limit: Option<i64>,
}

/// Move chips and/or NFTs
///
/// When a player wallet is debited the request holds that player's guard.
///
/// # Errors
///
/// - `400 Bad Request`: Malformed load, same source and destination, fee on a pending transfer
/// - `422 Unprocessable Entity`: Insufficient funds
/// - `409 Conflict`: Another request for the debited player is running
pub async fn transfer<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<TransferReceipt> {
    let _guard = match request.from {
        Some(from) if !SystemWallet::is_system(from) => {
            Some(state.user_locks.acquire(from).await?)
        }
        _ => None,
    };

    let receipt = state.ledger.transfer(None, &request).await?;
    logging::log_ledger_event(
        request.entry_type.as_str(),
        request.from.or(request.to),
        Some(receipt.entry_id()),
        request.load.chip,
    );
    Ok(Json(receipt))
}

/// Mark a pending entry as succeeded
///
/// # Errors
///
/// - `404 Not Found`: Unknown entry
/// - `403 Forbidden`: Owner does not match the entry
/// - `409 Conflict`: Entry is already finalized
pub async fn confirm<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(entry_id): Path<EntryId>,
    Json(body): Json<SettleBody>,
) -> ApiResult<LedgerEntry> {
    let request = SettleRequest {
        entry_id,
        owner: body.owner,
    };
    let entry = state.ledger.confirm(None, &request).await?;
    logging::log_ledger_event("confirm", None, Some(entry.id), entry.amount_moved.chip);
    Ok(Json(entry))
}

/// Mark a pending entry as failed and reverse its movement
///
/// # Errors
///
/// Same as [`confirm`], plus `422 Unprocessable Entity` when the credited
/// side has already spent the funds.
pub async fn decline<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(entry_id): Path<EntryId>,
    Json(body): Json<SettleBody>,
) -> ApiResult<DeclineReceipt> {
    let request = SettleRequest {
        entry_id,
        owner: body.owner,
    };
    let receipt = state.ledger.decline(None, &request).await?;
    logging::log_ledger_event(
        "decline",
        None,
        Some(receipt.reversal.id),
        receipt.reversal.amount_moved.chip,
    );
    Ok(Json(receipt))
}

/// Current balance of a wallet; unknown wallets are empty
pub async fn wallet_balance<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(wallet_id): Path<UserId>,
) -> ApiResult<WalletBalance> {
    let balance = state.ledger.balance(None, wallet_id).await?;
    Ok(Json(WalletBalance { wallet_id, balance }))
}

/// Entries touching a wallet, newest first
pub async fn wallet_entries<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(wallet_id): Path<UserId>,
    Query(query): Query<EntriesQuery>,
) -> ApiResult<Vec<LedgerEntry>> {
    let entries = state.ledger.entries(None, wallet_id, query.limit).await?;
    Ok(Json(entries))
}
