//! Human-readable order number formatting.
//!
//! Order numbers are derived from the database row id: `HNG-` followed by the id zero-padded to six digits. Ids
//! beyond 999,999 simply grow wider; the padding is a floor, not a ceiling.

pub const ORDER_NUMBER_PREFIX: &str = "HNG-";

pub fn format_order_number(id: i64) -> String {
    format!("{ORDER_NUMBER_PREFIX}{id:06}")
}

/// Extract the row id from an order number. Returns `None` for anything that isn't `HNG-<digits>`.
pub fn parse_order_number(order_number: &str) -> Option<i64> {
    let digits = order_number.strip_prefix(ORDER_NUMBER_PREFIX)?;
    digits.parse::<i64>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formats_with_padding() {
        assert_eq!(format_order_number(42), "HNG-000042");
        assert_eq!(format_order_number(123), "HNG-000123");
        assert_eq!(format_order_number(1_234_567), "HNG-1234567");
    }

    #[test]
    fn parse_round_trip() {
        assert_eq!(parse_order_number("HNG-000042"), Some(42));
        assert_eq!(parse_order_number("HNG-1234567"), Some(1_234_567));
        assert_eq!(parse_order_number("ORD-000042"), None);
        assert_eq!(parse_order_number("HNG-abc"), None);
        assert_eq!(parse_order_number("HNG-000000"), None);
    }
}
