//! The inner matching algorithms: market-order sweep, limit-order cross,
//! and the per-price-level consumer they both call into.
//!
//! Price-time priority: a price level is always drained head-first
//! (insertion order) before the outer loop moves to the next best price.

use super::{Book, BookError, MarketResidualPolicy};
use crate::orderlist::Order;
use crate::quote::{Quote, Side, Trade};
use crate::store::Store;
use num_bigint::BigUint;
use num_traits::ops::checked::CheckedSub;
use tracing::error;

/// Drain the opposing side at `price` into `qty_remaining`, head order
/// first, until either the incoming quantity is exhausted or the price
/// level empties.
fn process_order_list<S: Store>(
    book: &mut Book,
    store: &mut S,
    opposing_side: Side,
    price: &BigUint,
    qty_remaining: BigUint,
) -> Result<(BigUint, Vec<Trade>), BookError> {
    let zero = BigUint::from(0u32);
    let mut remaining = qty_remaining;
    let mut trades = Vec::new();

    loop {
        if remaining == zero {
            break;
        }
        let tree = match opposing_side {
            Side::Bid => &book.bids,
            Side::Ask => &book.asks,
        };
        let Some(list) = tree.price_list(store, price)? else {
            break;
        };
        if list.item.length == 0 {
            break;
        }
        let head = list
            .get_order(store, &list.item.head_order_key)?
            .ok_or_else(|| {
                let message = "nonempty order list has no head order".to_string();
                error!(price = %price, %message, "internal invariant violation");
                BookError::Internal { message }
            })?;

        let traded_price = head.item.price.clone();
        let tree = match opposing_side {
            Side::Bid => &mut book.bids,
            Side::Ask => &mut book.asks,
        };

        let traded_qty = if remaining < head.item.quantity {
            let traded_qty = remaining.clone();
            let new_book_qty = &head.item.quantity - &remaining;
            let timestamp = head.item.timestamp;
            tree.update_order(store, head, traded_price.clone(), new_book_qty, timestamp)?;
            remaining = zero.clone();
            traded_qty
        } else {
            let traded_qty = head.item.quantity.clone();
            tree.remove_order(store, &head)?;
            remaining = remaining
                .checked_sub(&traded_qty)
                .unwrap_or_else(|| zero.clone());
            traded_qty
        };

        trades.push(Trade {
            timestamp: book.timestamp(),
            price: traded_price,
            quantity: traded_qty,
        });
    }

    Ok((remaining, trades))
}

/// Sweep the opposing side until `quote`'s quantity is exhausted or that
/// side empties.
///
/// Never rests. Under [`MarketResidualPolicy::DropRemainder`] (the
/// default) any residual is dropped without error. Under
/// [`MarketResidualPolicy::FailOnShortage`] a nonzero residual is reported
/// as [`BookError::InsufficientLiquidity`] instead — the trades already
/// produced are still returned to the caller inside that error so nothing
/// already persisted to `store` is silently hidden.
pub(super) fn process_market_order<S: Store>(
    book: &mut Book,
    store: &mut S,
    quote: &Quote,
) -> Result<Vec<Trade>, BookError> {
    let zero = BigUint::from(0u32);
    let mut remaining = quote.quantity.clone();
    let mut trades = Vec::new();

    match quote.side {
        Side::Bid => {
            while remaining > zero && book.asks.not_empty() {
                let Some(price) = book.asks.min_price(store)? else {
                    break;
                };
                let (rem, mut new_trades) =
                    process_order_list(book, store, Side::Ask, &price, remaining)?;
                remaining = rem;
                trades.append(&mut new_trades);
            }
        }
        Side::Ask => {
            while remaining > zero && book.bids.not_empty() {
                let Some(price) = book.bids.max_price(store)? else {
                    break;
                };
                let (rem, mut new_trades) =
                    process_order_list(book, store, Side::Bid, &price, remaining)?;
                remaining = rem;
                trades.append(&mut new_trades);
            }
        }
    }

    if remaining > zero
        && book.config().market_residual_policy == MarketResidualPolicy::FailOnShortage
    {
        return Err(BookError::InsufficientLiquidity {
            requested: quote.quantity.to_string(),
            filled: (&quote.quantity - &remaining).to_string(),
            trades,
        });
    }

    Ok(trades)
}

/// Cross while price allows, then rest any residual on the quote's own
/// side under a freshly assigned order-id.
pub(super) fn process_limit_order<S: Store>(
    book: &mut Book,
    store: &mut S,
    quote: &Quote,
) -> Result<(Vec<Trade>, Option<Quote>), BookError> {
    let zero = BigUint::from(0u32);
    let price = quote.price.clone().ok_or_else(|| BookError::Internal {
        message: "limit order requires a price".to_string(),
    })?;
    let mut remaining = quote.quantity.clone();
    let mut trades = Vec::new();
    let mut resting = None;

    match quote.side {
        Side::Bid => {
            loop {
                if remaining == zero || !book.asks.not_empty() {
                    break;
                }
                let Some(min_price) = book.asks.min_price(store)? else {
                    break;
                };
                if price < min_price {
                    break;
                }
                let (rem, mut new_trades) =
                    process_order_list(book, store, Side::Ask, &min_price, remaining)?;
                remaining = rem;
                trades.append(&mut new_trades);
            }
            if remaining > zero {
                let order_id = book.next_order_id();
                let key = book.order_key_from_id(order_id);
                let order = Order::new(
                    key,
                    quote.timestamp,
                    remaining.clone(),
                    price.clone(),
                    quote.trade_id.clone(),
                    Side::Bid,
                );
                book.bids.insert_order(store, order)?;
                let mut residual = quote.clone();
                residual.quantity = remaining;
                residual.order_id = Some(order_id);
                resting = Some(residual);
            }
        }
        Side::Ask => {
            loop {
                if remaining == zero || !book.bids.not_empty() {
                    break;
                }
                let Some(max_price) = book.bids.max_price(store)? else {
                    break;
                };
                if price > max_price {
                    break;
                }
                let (rem, mut new_trades) =
                    process_order_list(book, store, Side::Bid, &max_price, remaining)?;
                remaining = rem;
                trades.append(&mut new_trades);
            }
            if remaining > zero {
                let order_id = book.next_order_id();
                let key = book.order_key_from_id(order_id);
                let order = Order::new(
                    key,
                    quote.timestamp,
                    remaining.clone(),
                    price.clone(),
                    quote.trade_id.clone(),
                    Side::Ask,
                );
                book.asks.insert_order(store, order)?;
                let mut residual = quote.clone();
                residual.quantity = remaining;
                residual.order_id = Some(order_id);
                resting = Some(residual);
            }
        }
    }

    Ok((trades, resting))
}
