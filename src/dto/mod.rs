pub mod events;
pub mod health;
pub mod requests;
pub mod room;
pub mod validation;
pub mod ws;
