pub mod body_registry;
pub mod event_log;
pub mod floor_corrector;
pub mod frame;
pub mod gesture;
pub mod label_resolver;
pub mod rule_engine;
pub mod zone;
