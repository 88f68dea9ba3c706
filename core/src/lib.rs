pub mod api;
pub mod cache;
pub mod category_subsystem;
pub mod clock;
pub mod commission_subsystem;
pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod event;
pub mod notifier;
pub mod payout_subsystem;
pub mod queue_subsystem;
pub mod rng;
pub mod statement_subsystem;
pub mod store;
pub mod subsystem;
pub mod types;
pub mod vendor_subsystem;
