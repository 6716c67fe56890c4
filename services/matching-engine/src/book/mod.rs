//! Order book infrastructure module
//!
//! Price levels, book sides and the per-market order book.

pub mod price_level;
pub mod book_side;
pub mod order_book;

pub use book_side::BookSide;
pub use order_book::OrderBook;
pub use price_level::{LevelEntry, PriceLevel};
