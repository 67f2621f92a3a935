mod helpers;
mod rubles;
mod secret;

pub use helpers::parse_boolean_flag;
pub use rubles::{Rubles, RublesConversionError, RUB_CURRENCY_CODE, RUB_CURRENCY_CODE_LOWER};
pub use secret::Secret;
