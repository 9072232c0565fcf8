// 3.0: margin calculation. pure functions, fixed-point integer arithmetic throughout.
// the one rule that matters: requirements round UP (never understate collateral) and
// granted base exposure rounds DOWN (never grant more than the quote amount funds).
//
// scaling factors are explicit arguments. mixing raw units of different scales without
// converting is the bug class this module exists to prevent.

use crate::order::Order;
use crate::types::{ceil_div, BaseAmount, Leverage, PairId, QuoteAmount, Scale};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

// 3.1: margin required for a candidate order: quote notional / leverage, ceiling to the
// smallest quote unit. `size_quote` is the human decimal, converted with the quote scale.
pub fn required_margin(size_quote: Decimal, leverage: Leverage, quote_scale: Scale) -> Option<QuoteAmount> {
    let raw = (size_quote * Decimal::from(quote_scale.factor()) / Decimal::from(leverage.value()))
        .ceil()
        .to_i64()?;
    Some(QuoteAmount::new(raw))
}

// 3.2: margin one pending order holds reserved. the order stores pre-scaled price
// (quote scale) and size (lot scale), so price*size carries an extra lot factor that
// is divided back out. both divisions are ceilings. i128 keeps the product from
// overflowing before the divisions land.
pub fn order_margin(order: &Order, lot_scale: Scale) -> QuoteAmount {
    let notional = order.price.raw() as i128 * order.size_base.raw() as i128;
    let per_leverage = ceil_div(notional, order.leverage.value() as i128);
    let raw = ceil_div(per_leverage, lot_scale.factor() as i128);
    QuoteAmount::new(raw as i64)
}

// 3.3: total margin committed to a user's outstanding orders, across all pairs.
// orders on pairs that cannot be resolved are skipped; the caller decides whether
// that is possible at all in its store.
pub fn reserved_margin<'a, I, F>(pending_orders: I, lot_scale_of: F) -> QuoteAmount
where
    I: IntoIterator<Item = &'a Order>,
    F: Fn(PairId) -> Option<Scale>,
{
    pending_orders
        .into_iter()
        .filter(|order| order.is_pending())
        .filter_map(|order| lot_scale_of(order.pair).map(|scale| order_margin(order, scale)))
        .sum()
}

// 3.4: quote amount -> base lots at a given price, floor rounding. a taker must never
// receive more base exposure than their quote amount pays for.
pub fn size_base(size_quote: Decimal, price: Decimal, lot_scale: Scale) -> Option<BaseAmount> {
    if price <= Decimal::ZERO {
        return None;
    }
    let lots = (size_quote / price * Decimal::from(lot_scale.factor()))
        .floor()
        .to_i64()?;
    Some(BaseAmount::new(lots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderId, OrderKind, PriceRaw, Side, Timestamp, Uid};
    use rust_decimal_macros::dec;

    fn pending_order(price: i64, size: i64, leverage: i64) -> Order {
        Order::new_pending(
            OrderId(1),
            Uid(1),
            PairId(1),
            Side::Buy,
            OrderKind::Limit,
            PriceRaw::new_unchecked(price),
            BaseAmount::new(size),
            Leverage::new(leverage).unwrap(),
            None,
            None,
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn required_margin_reference_scenario() {
        // sizeQuote 5000 at quote scale 2 (=> 500000 raw), leverage 10 => 50000 raw
        let margin = required_margin(dec!(5000), Leverage::new(10).unwrap(), Scale::from_precision(2)).unwrap();
        assert_eq!(margin.raw(), 50_000);
    }

    #[test]
    fn required_margin_rounds_up() {
        // 0.01 quote raw 1, leverage 3 => ceil(1/3) = 1, never 0
        let margin = required_margin(dec!(0.01), Leverage::new(3).unwrap(), Scale::from_precision(2)).unwrap();
        assert_eq!(margin.raw(), 1);
    }

    #[test]
    fn required_margin_1x_is_full_notional() {
        let margin = required_margin(dec!(250), Leverage::new(1).unwrap(), Scale::from_precision(2)).unwrap();
        assert_eq!(margin.raw(), 25_000);
    }

    #[test]
    fn order_margin_double_ceiling() {
        // price 10000 (100.00), size 1000 (1.0 at lot scale 1000), leverage 10
        // ceil(10000*1000/10) = 1000000, ceil(1000000/1000) = 1000 raw quote
        let order = pending_order(10000, 1000, 10);
        let margin = order_margin(&order, Scale::from_precision(3));
        assert_eq!(margin.raw(), 1000);
    }

    #[test]
    fn order_margin_never_understates() {
        // ceil(10001*999/7) = ceil(1427285.57) = 1427286, ceil(/1000) = 1428
        let order = pending_order(10001, 999, 7);
        let margin = order_margin(&order, Scale::from_precision(3));
        assert_eq!(margin.raw(), 1428);
    }

    #[test]
    fn reserved_margin_sums_pending_only() {
        let mut filled = pending_order(10000, 1000, 10);
        filled.mark_filled(Timestamp::from_millis(1)).unwrap();

        let pending = pending_order(10000, 2000, 10);
        let orders = [filled, pending];
        let reserved = reserved_margin(orders.iter(), |_| Some(Scale::from_precision(3)));

        // only the pending order contributes: ceil(10000*2000/10)/1000 = 2000
        assert_eq!(reserved.raw(), 2000);
    }

    #[test]
    fn reserved_margin_empty_is_zero() {
        let reserved = reserved_margin([].iter(), |_| Some(Scale::from_precision(3)));
        assert_eq!(reserved, QuoteAmount::zero());
    }

    #[test]
    fn size_base_floors() {
        // 5000 / 100.00 = 50 base, lot scale 1000 => 50000 lots exactly
        let size = size_base(dec!(5000), dec!(100), Scale::from_precision(3)).unwrap();
        assert_eq!(size.raw(), 50_000);

        // 100 / 30000 * 1000 = 3.33 lots => floors to 3
        let size = size_base(dec!(100), dec!(30000), Scale::from_precision(3)).unwrap();
        assert_eq!(size.raw(), 3);
    }

    #[test]
    fn size_base_rejects_non_positive_price() {
        assert!(size_base(dec!(100), dec!(0), Scale::from_precision(3)).is_none());
        assert!(size_base(dec!(100), dec!(-5), Scale::from_precision(3)).is_none());
    }
}
