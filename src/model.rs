pub mod chat;
pub mod expression;
pub mod pose;
pub mod viseme;
pub mod voice;

pub use chat::*;
pub use expression::*;
pub use pose::*;
pub use viseme::*;
pub use voice::*;
