//! Dispatch policy for prefix commands and interactions.

pub mod interaction;
pub mod invoke;
pub mod prefix;

pub use interaction::InteractionHandler;
pub use prefix::CommandHandler;
