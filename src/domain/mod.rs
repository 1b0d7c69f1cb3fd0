pub mod inbox;
pub mod message;
pub mod notification;
pub mod settings;
pub mod viewer;
