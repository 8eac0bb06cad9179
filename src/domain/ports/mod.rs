pub mod clock;
pub mod lock_provider;
pub mod storage_accessor;
