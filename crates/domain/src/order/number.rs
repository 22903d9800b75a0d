//! Human-readable order numbers.

use uuid::Uuid;

/// Prefix carried by every order number.
pub const ORDER_NUMBER_PREFIX: &str = "ORD-";

const TOKEN_LEN: usize = 10;

/// Generates a candidate order number such as `ORD-3F9A0C11BE`.
///
/// Candidates are random, not guaranteed unique; callers check them against
/// the store before use.
pub fn generate_order_number() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "{ORDER_NUMBER_PREFIX}{}",
        token[..TOKEN_LEN].to_ascii_uppercase()
    )
}
