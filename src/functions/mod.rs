pub mod clock;
pub mod commands;
pub mod intake;
pub mod quota;
pub mod reminder;
pub mod resolve;
pub mod routing;
pub mod runtime;
pub mod validate;
