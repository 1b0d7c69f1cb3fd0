pub mod feed;
pub mod notifier;
pub mod repositories;
