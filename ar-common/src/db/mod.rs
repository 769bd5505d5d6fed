//! Database access: initialization and the weekly record store

pub mod init;
pub mod records;

pub use init::init_database;
pub use records::{
    DatasetStatus, StoreSnapshot, StoreStatus, UploadLogEntry, WeeklyRecordStore,
};
