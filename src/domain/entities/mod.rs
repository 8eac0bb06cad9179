pub mod handle_state;
pub mod lock_configuration;
pub mod lock_record;
pub mod simple_lock;

pub use handle_state::HandleState;
pub use lock_configuration::LockConfiguration;
pub use lock_record::LockRecord;
pub use simple_lock::SimpleLock;
