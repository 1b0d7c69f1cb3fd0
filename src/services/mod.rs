pub mod handlers;
pub mod listener;
pub mod notification;
pub mod response;
pub mod status;
