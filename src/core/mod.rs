// Core modules: entity model, selection, on-disk codecs, devices, and the commit engine.
pub mod device;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod mbr;
pub mod model;
pub mod selection;
pub mod store;
pub mod table;
