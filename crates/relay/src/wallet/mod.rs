pub mod address;
pub mod builder;
pub mod context;
pub mod fee;

pub use address::{is_valid_address, parse_address};
pub use builder::{BuildRequest, CoinSelection, CoinSelector, TransactionBuilder};
pub use context::{SignableContext, SpentInput};
pub use fee::FeePolicy;
