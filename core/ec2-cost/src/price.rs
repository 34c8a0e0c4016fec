//! Lossy parsing of the prices returned by EC2.
//!
//! EC2 returns the spot prices as decimal strings. A price that is absent or that
//! cannot be parsed is not worth failing a whole poll cycle for: it counts as zero.

/// Parses a price, returns `None` if it is absent, malformed or not finite.
pub fn try_parse_price(price: Option<&str>) -> Option<f64> {
    let price = price?.trim();
    match price.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        Ok(_) | Err(_) => {
            log::trace!("ignoring malformed price {price:?}");
            None
        }
    }
}

/// Parses a price, falls back to `0.0` if it is absent, malformed or not finite.
pub fn parse_price(price: Option<&str>) -> f64 {
    try_parse_price(price).unwrap_or(0.0)
}
