pub mod service;

pub use service::NotificationFanout;
